use anyhow::{Result, anyhow};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::instrument;
use xcb::{
    Connection,
    screensaver::{QueryInfo, QueryInfoReply},
    x::{self, ATOM_ANY, Atom, Drawable, GetProperty, GrabServer, InternAtom, UngrabServer, Window},
};

use crate::daemon::collection::afk::AfkEvaluator;

use super::{ForegroundProbe, ForegroundSample};

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

fn get_active_window(conn: &Connection, root: Window, active_window_atom: Atom) -> Result<Option<Window>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<Window>().first().copied())
}

fn get_name(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value::<u8>()).into_owned())
}

/// Reads the foreground window through EWMH properties and decides idleness from the time since
/// the last input event.
pub struct X11ForegroundProbe {
    connection: Connection,
    preferred_screen: usize,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
    system: System,
    afk_evaluator: AfkEvaluator,
}

impl X11ForegroundProbe {
    pub fn new(afk_evaluator: AfkEvaluator) -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern_atom(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern_atom(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            preferred_screen: preferred_screen.max(0) as usize,
            active_window_atom,
            window_name_atom,
            pid_atom,
            system: System::new_with_specifics(
                RefreshKind::nothing().with_processes(ProcessRefreshKind::everything()),
            ),
            afk_evaluator,
        })
    }

    fn root(&self) -> Result<Window> {
        // Currently only 1 x11 screen is supported.
        self.connection
            .get_setup()
            .roots()
            .nth(self.preferred_screen)
            .map(|screen| screen.root())
            .ok_or_else(|| anyhow!("Screen {} is missing", self.preferred_screen))
    }

    fn idle_ms(&self, root: Window) -> Result<u32> {
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(idle)?;
        Ok(reply.ms_since_user_input())
    }

    fn process_path(&mut self, pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .and_then(|process| process.exe())
            .and_then(|path| path.to_str())
            .map(|path| path.to_string())
    }

    #[instrument(skip(self))]
    fn sample_inner(&mut self) -> Result<ForegroundSample> {
        let root = self.root()?;
        if self.afk_evaluator.is_afk(self.idle_ms(root)?) {
            return Ok(ForegroundSample::idle());
        }

        let Some(active_window) =
            get_active_window(&self.connection, root, self.active_window_atom)?
        else {
            return Err(anyhow!("No active window"));
        };
        let window_title = get_name(&self.connection, active_window, self.window_name_atom)?;
        let pid = get_pid(&self.connection, active_window, self.pid_atom)?
            .ok_or_else(|| anyhow!("Active window has no _NET_WM_PID"))?;
        let app_name = self
            .process_path(pid)
            .ok_or_else(|| anyhow!("Process {pid} has no executable"))?;
        Ok(ForegroundSample {
            app_name: app_name.into(),
            window_title: window_title.into(),
            idle: false,
        })
    }
}

impl ForegroundProbe for X11ForegroundProbe {
    fn sample(&mut self) -> Result<ForegroundSample> {
        let _ = self.connection.send_request(&GrabServer {});
        let result = self.sample_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}
