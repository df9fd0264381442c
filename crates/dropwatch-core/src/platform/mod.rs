#[cfg(target_os = "windows")]
pub mod windows;

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::{fs, io, process};
use tokio::task;
use tracing::{error, info, trace, warn};

use crate::error::Error;

/// Marker inserted into a file name while the rename probe holds it aside.
pub const PROBE_SUFFIX: &str = ".dropwatch-probe";

/// Attempts at finding a free aside name before the probe gives up.
const ASIDE_ATTEMPTS: usize = 8;

static PROBE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Decides whether a file can currently be deleted, i.e. no other process holds
/// a lock that denies delete access.
pub trait LockProbe: Send + Sync {
    fn is_deletable(&self, path: &Path) -> bool;
}

/// Renames the file aside and straight back. Fails whenever another process
/// holds the file open without delete sharing.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameProbe;

impl LockProbe for RenameProbe {
    fn is_deletable(&self, path: &Path) -> bool {
        let Some(aside) = free_probe_path(path) else {
            return false;
        };

        if let Err(e) = fs::rename(path, &aside) {
            trace!("Rename probe refused for {}: {}", path.display(), e);
            return false;
        }

        match fs::rename(&aside, path) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Could not restore {} after rename probe (left at {}): {}",
                    path.display(),
                    aside.display(),
                    e
                );
                false
            }
        }
    }
}

fn free_probe_path(path: &Path) -> Option<PathBuf> {
    for _ in 0..ASIDE_ATTEMPTS {
        let aside = probe_path(path);
        if !aside.exists() {
            return Some(aside);
        }
        warn!("Probe name already taken, trying another: {}", aside.display());
    }
    error!("No free probe name next to {}", path.display());
    None
}

/// Runs `probe` on the blocking pool.
pub async fn check_deletable(probe: &Arc<dyn LockProbe>, path: &Path) -> Result<bool, Error> {
    let probe = Arc::clone(probe);
    let path = path.to_path_buf();
    Ok(task::spawn_blocking(move || probe.is_deletable(&path)).await?)
}

/// A fresh aside name, `<name>.dropwatch-probe-<pid>-<n>`.
pub fn probe_path(path: &Path) -> PathBuf {
    let n = PROBE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(format!("{}-{}-{}", PROBE_SUFFIX, process::id(), n));
    PathBuf::from(name)
}

pub fn is_probe_path(path: &Path) -> bool {
    path.file_name().and_then(original_name).is_some()
}

/// Name a probe-renamed file had before it was moved aside.
fn original_name(name: &OsStr) -> Option<&OsStr> {
    let bytes = name.as_encoded_bytes();
    let marker = PROBE_SUFFIX.as_bytes();
    let at = bytes
        .windows(marker.len())
        .rposition(|window| window == marker)?;
    let rest = &bytes[at + marker.len()..];
    if at == 0 || !(rest.is_empty() || rest[0] == b'-') {
        return None;
    }
    // SAFETY: `at` is the start of the ASCII marker, a valid split point.
    Some(unsafe { OsStr::from_encoded_bytes_unchecked(&bytes[..at]) })
}

/// Moves files a crashed probe left aside in `dir` back to their own names.
/// A leftover whose original name is taken again stays where it is.
pub fn restore_leftovers(dir: &Path) -> io::Result<usize> {
    let mut restored = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(original) = original_name(&file_name) else {
            continue;
        };

        let aside = entry.path();
        let target = dir.join(original);
        if target.exists() {
            warn!(
                "Leftover probe file kept, {} exists: {}",
                target.display(),
                aside.display()
            );
            continue;
        }
        match fs::rename(&aside, &target) {
            Ok(()) => {
                info!("Restored {} from {}", target.display(), aside.display());
                restored += 1;
            }
            Err(e) => error!("Could not restore {}: {}", aside.display(), e),
        }
    }
    Ok(restored)
}

/// Probe used by the watcher on this platform.
#[cfg(target_os = "windows")]
pub fn default_probe() -> Arc<dyn LockProbe> {
    Arc::new(windows::ShareModeProbe)
}

#[cfg(not(target_os = "windows"))]
pub fn default_probe() -> Arc<dyn LockProbe> {
    Arc::new(RenameProbe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rename_probe_restores_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("KL_KHI_Episode.mp4");
        fs::write(&path, b"payload").unwrap();

        assert!(RenameProbe.is_deletable(&path));
        assert_eq!(fs::read(&path).unwrap(), b"payload");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_rename_probe_missing_file() {
        let dir = tempdir().unwrap();
        assert!(!RenameProbe.is_deletable(&dir.path().join("gone.mp4")));
    }

    #[test]
    fn test_stale_aside_does_not_block_rename_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a_b_c.mp4");
        fs::write(&path, b"new").unwrap();
        let stale = dir.path().join("a_b_c.mp4.dropwatch-probe");
        fs::write(&stale, b"other").unwrap();

        assert!(RenameProbe.is_deletable(&path));
        assert_eq!(fs::read(&stale).unwrap(), b"other");
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_aside_paths_are_unique() {
        let path = Path::new("/in/KL_KHI_x.mp4");
        assert_ne!(probe_path(path), probe_path(path));
    }

    #[test]
    fn test_is_probe_path() {
        let path = Path::new("/in/KL_KHI_x.mp4");
        assert!(is_probe_path(&probe_path(path)));
        assert!(is_probe_path(Path::new("/in/KL_KHI_x.mp4.dropwatch-probe")));
        assert!(!is_probe_path(path));
        assert!(!is_probe_path(Path::new("/in/x.dropwatch-probes")));
    }

    #[test]
    fn test_restore_leftovers() {
        let dir = tempdir().unwrap();
        let lost = dir.path().join("KL_KHI_Lost.mp4");
        fs::write(probe_path(&lost), b"lost").unwrap();
        let kept = dir.path().join("KL_KHI_Kept.mp4");
        fs::write(&kept, b"current").unwrap();
        fs::write(probe_path(&kept), b"older").unwrap();

        assert_eq!(restore_leftovers(dir.path()).unwrap(), 1);
        assert_eq!(fs::read(&lost).unwrap(), b"lost");
        assert_eq!(fs::read(&kept).unwrap(), b"current");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
