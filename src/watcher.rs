use crate::launcher::expand_path;
use log::{debug, warn};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    path::PathBuf,
    sync::mpsc::{channel, Receiver},
    thread,
    time::Duration,
};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Quiet period after the last file system event before a rescan is asked
/// for. Package managers touch many files at once.
const SETTLE_TIME: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to create desktop file watcher: {0}")]
    Create(#[from] notify::Error),
}

/// Watches the app directories that exist and yields one message per burst
/// of changes in them.
pub fn watch_app_dirs(app_paths: &[String]) -> Result<UnboundedReceiver<()>, WatchError> {
    let dirs: Vec<PathBuf> = app_paths
        .iter()
        .filter_map(|path| match expand_path(path) {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .filter(|dir| dir.is_dir())
        .collect();

    let (event_tx, event_rx) = channel();
    let mut watcher = RecommendedWatcher::new(event_tx, notify::Config::default())?;
    for dir in &dirs {
        match watcher.watch(dir, RecursiveMode::Recursive) {
            Ok(()) => debug!("Watching {}", dir.display()),
            Err(e) => warn!("Failed to watch {}: {}", dir.display(), e),
        }
    }

    let (tx, rx) = unbounded_channel();
    thread::spawn(move || {
        // Dropping the watcher stops the events.
        let _watcher = watcher;
        forward_changes(&event_rx, &tx, SETTLE_TIME);
    });
    Ok(rx)
}

fn forward_changes(
    events: &Receiver<notify::Result<Event>>,
    changes: &UnboundedSender<()>,
    settle_time: Duration,
) {
    while let Ok(event) = events.recv() {
        match event {
            Ok(event) if event.kind.is_access() => continue,
            Ok(event) => debug!("Received file system event: {:?}", event),
            Err(e) => {
                warn!("Watch error: {}", e);
                continue;
            }
        }
        while events.recv_timeout(settle_time).is_ok() {}
        if changes.send(()).is_err() {
            break;
        }
    }
}
