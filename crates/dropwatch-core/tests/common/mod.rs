#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dropwatch_core::readiness::ReadinessSettings;
use dropwatch_core::{Alert, LockProbe, MappingTable, Notifier};
use walkdir::WalkDir;

pub fn fast_settings(min_file_size: u64) -> ReadinessSettings {
    ReadinessSettings {
        min_file_size,
        poll_interval: Duration::from_millis(20),
        stability_interval: Duration::from_millis(20),
        stability_tolerance: 0.01,
        small_file_retry: Duration::from_millis(20),
    }
}

pub fn materials() -> MappingTable {
    MappingTable::from_entries([("KL", "KONTEN LOKAL"), ("KN", "KONTEN NASIONAL")])
}

pub fn activities() -> MappingTable {
    MappingTable::from_entries([("KHI", "KEPRI HARI INI"), ("KM", "KEPRI MENYAPA")])
}

pub fn write_file(path: &Path, len: usize) {
    fs::write(path, vec![0x5Au8; len]).unwrap();
}

/// Lock probe whose answer the test controls.
#[derive(Default)]
pub struct SwitchProbe {
    locked: AtomicBool,
}

impl SwitchProbe {
    pub fn locked() -> Arc<Self> {
        Arc::new(Self {
            locked: AtomicBool::new(true),
        })
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }
}

impl LockProbe for SwitchProbe {
    fn is_deletable(&self, path: &Path) -> bool {
        path.exists() && !self.locked.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn alert(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Every regular file below `dir`.
pub fn files_below(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}
