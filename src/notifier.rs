//! Single instance handling. The running launcher leaves its pid in a file;
//! later invocations signal it with `SIGUSR1` to show the window.

use gtk4::{glib, prelude::*, Application};
use log::{debug, info, warn};
use nix::{
    errno::Errno,
    sys::signal::{kill, Signal},
    unistd::{getpid, Pid},
};
use std::{
    env, fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

const PID_FILE_NAME: &str = "poki-launcher.pid";

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Failed to access pid file {path}: {source}")]
    PidFile { path: PathBuf, source: io::Error },
    #[error("Pid file {path} holds an invalid pid: {contents:?}")]
    InvalidPid { path: PathBuf, contents: String },
    #[error("Launcher process {0} already owns the pid file")]
    AlreadyRunning(Pid),
    #[error("Failed to signal launcher process {pid}: {source}")]
    Signal { pid: Pid, source: Errno },
}

pub fn pid_file_path() -> PathBuf {
    env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join(PID_FILE_NAME)
}

fn read_pid(path: &Path) -> Result<Pid, NotifierError> {
    let contents = fs::read_to_string(path).map_err(|source| NotifierError::PidFile {
        path: path.to_owned(),
        source,
    })?;
    contents
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .map(Pid::from_raw)
        .ok_or_else(|| NotifierError::InvalidPid {
            path: path.to_owned(),
            contents,
        })
}

fn is_alive(pid: Pid) -> bool {
    // EPERM still means the process exists.
    !matches!(kill(pid, None), Err(Errno::ESRCH))
}

/// Whether the pid file at `path` names a live process.
pub fn is_running_at(path: &Path) -> bool {
    read_pid(path).map(is_alive).unwrap_or(false)
}

pub fn is_running() -> bool {
    is_running_at(&pid_file_path())
}

/// Asks the running launcher to show its window.
pub fn notify() -> Result<(), NotifierError> {
    let pid = read_pid(&pid_file_path())?;
    debug!("Notifying launcher process {}", pid);
    kill(pid, Signal::SIGUSR1).map_err(|source| NotifierError::Signal { pid, source })
}

/// The pid file of this process. Removed again on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Claims the pid file unless another live process holds it.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, NotifierError> {
        let path = path.into();
        if let Ok(pid) = read_pid(&path) {
            if pid != getpid() && is_alive(pid) {
                return Err(NotifierError::AlreadyRunning(pid));
            }
        }
        fs::write(&path, getpid().to_string()).map_err(|source| NotifierError::PidFile {
            path: path.clone(),
            source,
        })?;
        debug!("Wrote pid file {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Another instance may have taken over the file since.
        if matches!(read_pid(&self.path), Ok(pid) if pid == getpid()) {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("Failed to remove pid file {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Shows the launcher on `SIGUSR1` and quits on `SIGINT` or `SIGTERM`.
pub fn listen(app: &Application) -> Vec<glib::SourceId> {
    let show = {
        let app = app.clone();
        glib::unix_signal_add_local(Signal::SIGUSR1 as i32, move || {
            debug!("Got show request");
            app.activate();
            glib::ControlFlow::Continue
        })
    };

    let mut sources = vec![show];
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        let app = app.clone();
        sources.push(glib::unix_signal_add_local(signal as i32, move || {
            info!("Got {}, exiting", signal);
            app.quit();
            glib::ControlFlow::Break
        }));
    }
    sources
}
