use std::{env, io, path::PathBuf};

use anyhow::{Context, Result};

pub const APPLICATION_NAME: &str = "activitymon";

/// Resolves the state directory and makes sure it exists.
pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(target_os = "macos")]
        {
            let mut path = PathBuf::from(env::var("HOME").context("HOME is not set")?);
            path.push("Library/Application Support");
            path.push(APPLICATION_NAME);
            path
        }
        #[cfg(not(target_os = "macos"))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .context("Couldn't find neither XDG_STATE_HOME nor HOME")?;
            path.push(APPLICATION_NAME);
            path
        }
    };

    ensure_dir(path)
}

pub fn ensure_dir(path: PathBuf) -> Result<PathBuf> {
    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v).with_context(|| format!("Failed to create {}", path.display())),
    }
}
