pub mod output;
pub mod summary;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use summary::{SummaryCommand, process_summary_command};
use tracing::{info, level_filters::LevelFilter};

use crate::{
    config::{Config, IdlePolicy},
    daemon::start_monitor,
    utils::{
        dir::{create_application_default_path, ensure_dir},
        logging::{CLI_PREFIX, MONITOR_PREFIX, enable_logging},
    },
};

#[derive(Parser, Debug)]
#[command(name = "activitymon", version, long_about = None)]
#[command(about = "Records which application is in focus and summarizes where the time went", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Sample the foreground application until interrupted")]
    Monitor {},
    #[command(about = "Summarize recorded activity over a window")]
    Summary {
        #[command(flatten)]
        command: SummaryCommand,
    },
    #[command(about = "Inspect or change the configuration")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    #[command(about = "Print the effective configuration")]
    Show {},
    #[command(about = "Record activity into a different database file")]
    SetDatabase { path: PathBuf },
    #[command(about = "Choose how lock screen time is reported")]
    IdlePolicy { policy: IdlePolicy },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = match args.dir {
        Some(dir) => ensure_dir(dir)?,
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let prefix = match args.commands {
        Commands::Monitor {} => MONITOR_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &app_dir, logging_level, args.log)?;

    let config = Config::load(&app_dir)?;

    match args.commands {
        Commands::Monitor {} => start_monitor(&app_dir, &config).await,
        Commands::Summary { command } => process_summary_command(command, &app_dir, &config).await,
        Commands::Config { command } => process_config_command(command, &app_dir, config),
    }
}

fn process_config_command(command: ConfigCommand, app_dir: &Path, mut config: Config) -> Result<()> {
    match command {
        ConfigCommand::Show {} => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("database: {}", config.database_path(app_dir).display());
        }
        ConfigCommand::SetDatabase { path } => {
            let path = std::path::absolute(&path)?;
            info!("Database set to {path:?}");
            config.database_path = Some(path);
            config.save(app_dir)?;
        }
        ConfigCommand::IdlePolicy { policy } => {
            info!("Idle policy set to {policy:?}");
            config.idle_policy = policy;
            config.save(app_dir)?;
        }
    }
    Ok(())
}
