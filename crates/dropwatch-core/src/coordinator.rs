//! Receives create notifications and runs one detection → transfer task per
//! accepted file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::notifier::{Alert, Notifier};
use crate::platform;
use crate::readiness::{Readiness, ReadinessDetector};
use crate::transfer::{TransferEngine, TransferOutcome};
use crate::watcher::CreatedEvent;

/// A file tracked from its first notification until a terminal outcome.
#[derive(Debug)]
pub struct PendingFile {
    path: PathBuf,
    first_seen: DateTime<Local>,
    attempts: AtomicU32,
}

impl PendingFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            first_seen: Local::now(),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn first_seen(&self) -> DateTime<Local> {
        self.first_seen
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub(crate) fn record_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

struct Shared {
    detector: ReadinessDetector,
    engine: TransferEngine,
    notifier: Arc<dyn Notifier>,
    in_flight: DashMap<PathBuf, Arc<PendingFile>>,
}

#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        detector: ReadinessDetector,
        engine: TransferEngine,
        notifier: Arc<dyn Notifier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                detector,
                engine,
                notifier,
                in_flight: DashMap::new(),
            }),
            tracker: TaskTracker::new(),
            cancel,
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.len()
    }

    pub fn is_in_flight(&self, path: &Path) -> bool {
        self.shared.in_flight.contains_key(path)
    }

    /// Accepts a create notification. Returns `true` when a new task was
    /// started for the path.
    pub fn on_created(&self, event: CreatedEvent) -> bool {
        if event.is_dir || self.cancel.is_cancelled() || self.tracker.is_closed() {
            return false;
        }
        if !is_candidate(&event.path) {
            debug!("Ignoring {}", event.path.display());
            return false;
        }

        let pending = match self.shared.in_flight.entry(event.path.clone()) {
            Entry::Occupied(_) => {
                info!("File already being processed: {}", event.path.display());
                return false;
            }
            Entry::Vacant(slot) => {
                let pending = Arc::new(PendingFile::new(event.path));
                slot.insert(Arc::clone(&pending));
                pending
            }
        };

        info!("New file detected: {}", pending.file_name());
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            shared.process(&pending, &cancel).await;
            shared.in_flight.remove(pending.path());
        });
        true
    }

    /// Dispatches events until the channel closes or shutdown is requested,
    /// then waits for every in-flight task to stop.
    pub async fn run(&self, mut events: mpsc::Receiver<CreatedEvent>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.on_created(event);
                    }
                    None => break,
                },
            }
        }

        events.close();
        self.shutdown().await;
    }

    /// Stops accepting files and waits for running tasks.
    pub async fn shutdown(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            info!("Waiting for {} in-flight file(s) to stop", self.tracker.len());
        }
        self.tracker.wait().await;
        info!("All file tasks stopped");
    }
}

/// Temporary, extensionless and probe-renamed files are never processed.
fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|f| f.to_string_lossy()) else {
        return false;
    };
    if !name.contains('.') || name.to_lowercase().ends_with(".tmp") {
        return false;
    }
    !platform::is_probe_path(path)
}

impl Shared {
    async fn process(&self, pending: &PendingFile, cancel: &CancellationToken) {
        let file_name = pending.file_name();
        info!("Processing file: {}", file_name);

        match self.detector.await_ready(pending, cancel).await {
            Ok(Readiness::Ready) => {}
            Ok(Readiness::Vanished) => {
                warn!("File disappeared before processing: {}", file_name);
                return;
            }
            Ok(Readiness::Cancelled) => {
                info!("Stopped waiting for {} (shutdown)", file_name);
                return;
            }
            Err(e) => {
                error!("Error during wait for {}: {}", file_name, e);
                self.notifier.alert(&Alert::DetectionFailed {
                    file_name,
                    reason: e.to_string(),
                });
                return;
            }
        }

        match self.engine.transfer(pending.path(), cancel).await {
            Ok(TransferOutcome::Transferred(destination)) => info!(
                "Processed {} after {} attempt(s), first seen {}: {}",
                file_name,
                pending.attempts(),
                pending.first_seen().format("%Y-%m-%d %H:%M:%S"),
                destination.full_path().display()
            ),
            Ok(TransferOutcome::Cancelled) => info!("Transfer of {} cancelled", file_name),
            Err(Error::InvalidFormat { removed, .. }) => {
                self.notifier.alert(&Alert::InvalidFormat { file_name, removed });
            }
            Err(e) => {
                error!("Failed to process {}: {}", file_name, e);
                self.notifier.alert(&Alert::TransferFailed {
                    file_name,
                    reason: e.to_string(),
                });
            }
        }
    }
}
