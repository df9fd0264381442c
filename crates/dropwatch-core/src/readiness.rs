//! Decides when a file another process is writing has been completely
//! written and released.
//!
//! A file is ready once a single pass observes all of: it exists, it is at
//! least `min_file_size` bytes, a prefix can be read, the lock probe reports
//! it deletable, and its size moves less than `stability_tolerance` across
//! `stability_interval`. Failed passes are retried every `poll_interval` with
//! no upper bound; nothing carries over from one pass to the next.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::PendingFile;
use crate::error::Error;
use crate::platform::{self, LockProbe};

const READ_PROBE_BYTES: usize = 1024;

#[derive(Debug, Clone)]
pub struct ReadinessSettings {
    pub min_file_size: u64,
    pub poll_interval: Duration,
    pub stability_interval: Duration,
    /// Largest relative size change still considered stable, e.g. `0.01`.
    pub stability_tolerance: f64,
    pub small_file_retry: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            min_file_size: 5 * 1024 * 1024,
            poll_interval: Duration::from_secs(10),
            stability_interval: Duration::from_secs(3),
            stability_tolerance: 0.01,
            small_file_retry: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Vanished,
    Cancelled,
}

/// Result of one evaluation of the unlocked predicate.
#[derive(Debug, PartialEq, Eq)]
enum Check {
    Unlocked,
    Locked(&'static str),
    Vanished,
    Cancelled,
}

pub struct ReadinessDetector {
    settings: ReadinessSettings,
    probe: Arc<dyn LockProbe>,
}

impl ReadinessDetector {
    pub fn new(settings: ReadinessSettings, probe: Arc<dyn LockProbe>) -> Self {
        Self { settings, probe }
    }

    /// Blocks until `pending` is ready, disappears, or `cancel` fires.
    pub async fn await_ready(
        &self,
        pending: &PendingFile,
        cancel: &CancellationToken,
    ) -> Result<Readiness, Error> {
        let path = pending.path();
        let started = Instant::now();

        // Undersized files are re-examined after a long delay instead of polled.
        let size = loop {
            pending.record_attempt();
            match fs::metadata(path).await {
                Ok(meta) if meta.len() >= self.settings.min_file_size => break meta.len(),
                Ok(meta) => info!(
                    "File too small ({} bytes), retrying in {:?}: {}",
                    meta.len(),
                    self.settings.small_file_retry,
                    path.display()
                ),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("File disappeared: {}", path.display());
                    return Ok(Readiness::Vanished);
                }
                Err(e) => warn!("Error checking file size of {}: {}", path.display(), e),
            }
            if !sleep_or_cancel(self.settings.small_file_retry, cancel).await {
                return Ok(Readiness::Cancelled);
            }
        };

        info!(
            "Waiting for file to be completely unlocked: {} ({})",
            path.display(),
            size_mb(size)
        );

        let mut passes = 0u32;
        loop {
            passes += 1;
            match self.check_unlocked(path, cancel).await? {
                Check::Unlocked => {
                    info!(
                        "File completely unlocked (pass {}, attempt {}, waited {}s): {}",
                        passes,
                        pending.attempts(),
                        started.elapsed().as_secs(),
                        path.display()
                    );
                    return Ok(Readiness::Ready);
                }
                Check::Vanished => {
                    warn!("File disappeared while waiting: {}", path.display());
                    return Ok(Readiness::Vanished);
                }
                Check::Cancelled => return Ok(Readiness::Cancelled),
                Check::Locked(reason) => {
                    if passes == 1 {
                        info!("File still locked ({}), waiting: {}", reason, path.display());
                    } else {
                        debug!("File still locked ({}), pass {}: {}", reason, passes, path.display());
                    }
                }
            }

            if !sleep_or_cancel(self.settings.poll_interval, cancel).await {
                return Ok(Readiness::Cancelled);
            }
            pending.record_attempt();
        }
    }

    async fn check_unlocked(&self, path: &Path, cancel: &CancellationToken) -> Result<Check, Error> {
        let size = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Check::Vanished),
            Err(_) => return Ok(Check::Locked("metadata unavailable")),
        };
        if size < self.settings.min_file_size {
            return Ok(Check::Locked("below minimum size"));
        }
        if !is_readable(path).await {
            return Ok(Check::Locked("not readable"));
        }
        if !platform::check_deletable(&self.probe, path).await? {
            return Ok(Check::Locked("delete denied"));
        }
        match self.is_stable(path, cancel).await {
            Some(true) => Ok(Check::Unlocked),
            Some(false) => Ok(Check::Locked("size still changing")),
            None => Ok(Check::Cancelled),
        }
    }

    /// `None` when cancelled between the two samples.
    async fn is_stable(&self, path: &Path, cancel: &CancellationToken) -> Option<bool> {
        let Ok(before) = fs::metadata(path).await.map(|m| m.len()) else {
            return Some(false);
        };
        if !sleep_or_cancel(self.settings.stability_interval, cancel).await {
            return None;
        }
        let Ok(after) = fs::metadata(path).await.map(|m| m.len()) else {
            return Some(false);
        };

        let stable = size_is_stable(before, after, self.settings.stability_tolerance);
        if !stable {
            info!(
                "File size change: {} -> {} ({:.2}%): {}",
                before,
                after,
                relative_change(before, after) * 100.0,
                path.display()
            );
        }
        Some(stable)
    }
}

async fn is_readable(path: &Path) -> bool {
    let mut buf = [0u8; READ_PROBE_BYTES];
    match fs::File::open(path).await {
        Ok(mut file) => file.read(&mut buf).await.is_ok(),
        Err(_) => false,
    }
}

fn relative_change(before: u64, after: u64) -> f64 {
    before.abs_diff(after) as f64 / before.max(1) as f64
}

/// True when the size moved by strictly less than `tolerance` (a fraction).
pub fn size_is_stable(before: u64, after: u64, tolerance: f64) -> bool {
    relative_change(before, after) < tolerance
}

/// Sleeps for `duration`; returns `false` if `cancel` fired first.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

pub(crate) fn size_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
