use notify::event::CreateKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::Error;

/// Directory under observation. Subdirectories are never watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub recursive: bool,
}

impl WatchTarget {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            recursive: false,
        }
    }
}

/// "Path created" notification fed to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEvent {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Forwards create events from the platform watcher into a channel. Watching
/// stops when this value is dropped.
pub struct NotifyEventSource {
    _watcher: RecommendedWatcher,
}

impl NotifyEventSource {
    pub fn start(target: &WatchTarget, sender: mpsc::Sender<CreatedEvent>) -> Result<Self, Error> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for created in created_events(event) {
                    // The receiver is gone once the coordinator stops; drop quietly.
                    if sender.blocking_send(created).is_err() {
                        debug!("Dropping create event, coordinator stopped");
                    }
                }
            }
            Err(e) => error!("Watch error: {}", e),
        })?;

        let mode = if target.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&target.path, mode)?;
        info!("Watching directory: {}", target.path.display());

        Ok(Self { _watcher: watcher })
    }
}

fn created_events(event: Event) -> Vec<CreatedEvent> {
    let kind = match event.kind {
        EventKind::Create(kind) => kind,
        _ => return Vec::new(),
    };
    event
        .paths
        .into_iter()
        .map(|path| {
            let is_dir = match kind {
                CreateKind::Folder => true,
                CreateKind::File => false,
                _ => path.is_dir(),
            };
            CreatedEvent { path, is_dir }
        })
        .collect()
}
