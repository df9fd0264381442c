use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::{fs, task};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::filename::{self, ParsedFilename};
use crate::mapping::MappingTable;
use crate::platform::{self, LockProbe};
use crate::readiness::{size_mb, sleep_or_cancel};

const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// `{root}/{material}/{activity}/{YYYY}/{MonthName}/{DD}` plus the new file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPath {
    pub directory: PathBuf,
    pub file_name: OsString,
}

impl DestinationPath {
    pub fn full_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Transferred(DestinationPath),
    /// Shutdown interrupted the copy; the source is untouched.
    Cancelled,
}

/// Byte-faithful copy that can be abandoned part way through.
pub trait FileCopier: Send + Sync {
    /// Copies `source` over `destination`. `Ok(false)` means `cancel` fired
    /// before the copy finished.
    fn copy(&self, source: &Path, destination: &Path, cancel: &CancellationToken) -> io::Result<bool>;
}

/// Copies in fixed-size chunks, checking for cancellation between chunks, then
/// carries over the modification time and permissions.
#[derive(Debug, Clone)]
pub struct ChunkedCopier {
    chunk_size: usize,
}

impl Default for ChunkedCopier {
    fn default() -> Self {
        Self {
            chunk_size: COPY_CHUNK_SIZE,
        }
    }
}

impl FileCopier for ChunkedCopier {
    fn copy(&self, source: &Path, destination: &Path, cancel: &CancellationToken) -> io::Result<bool> {
        let mut reader = File::open(source)?;
        let metadata = reader.metadata()?;
        let mut writer = File::create(destination)?;

        let mut buf = vec![0u8; self.chunk_size];
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            writer.write_all(&buf[..read])?;
        }

        writer.flush()?;
        writer.set_modified(metadata.modified()?)?;
        writer.set_permissions(metadata.permissions())?;
        writer.sync_all()?;
        Ok(true)
    }
}

pub struct TransferEngine {
    processed_root: PathBuf,
    materials: MappingTable,
    activities: MappingTable,
    probe: Arc<dyn LockProbe>,
    copier: Arc<dyn FileCopier>,
    invalid_file_grace: Duration,
}

impl TransferEngine {
    pub fn new(
        processed_root: PathBuf,
        materials: MappingTable,
        activities: MappingTable,
        probe: Arc<dyn LockProbe>,
    ) -> Self {
        Self {
            processed_root,
            materials,
            activities,
            probe,
            copier: Arc::new(ChunkedCopier::default()),
            invalid_file_grace: Duration::from_secs(2),
        }
    }

    pub fn with_copier(mut self, copier: Arc<dyn FileCopier>) -> Self {
        self.copier = copier;
        self
    }

    pub fn with_invalid_file_grace(mut self, grace: Duration) -> Self {
        self.invalid_file_grace = grace;
        self
    }

    /// Resolves both codes through their tables and appends the date partition.
    /// An empty code contributes no folder level.
    pub fn destination_for(
        &self,
        parsed: &ParsedFilename,
        date: NaiveDate,
    ) -> Result<DestinationPath, Error> {
        let material = self.materials.resolve(&parsed.material_code);
        let activity = self.activities.resolve(&parsed.activity_code);
        let file_name = parsed.new_file_name();
        ensure_plain_segment(&file_name)?;

        let mut directory = self.processed_root.clone();
        for folder in [&material, &activity] {
            if folder.is_empty() {
                continue;
            }
            ensure_plain_segment(OsStr::new(folder))?;
            directory.push(folder);
        }
        let directory = directory
            .join(date.format("%Y").to_string())
            .join(date.format("%B").to_string())
            .join(date.format("%d").to_string());

        Ok(DestinationPath {
            directory,
            file_name,
        })
    }

    /// Copies a ready file into its dated destination, verifies the copy and
    /// deletes the source. Invalid names are deleted without a transfer.
    pub async fn transfer(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome, Error> {
        let raw_name = path.file_name().unwrap_or_default();
        let file_name = raw_name.to_string_lossy().into_owned();
        let source_size = fs::metadata(path).await?.len();
        info!(
            "Processing completely unlocked file: {} ({})",
            file_name,
            size_mb(source_size)
        );

        let parsed = match filename::parse(raw_name) {
            Ok(parsed) => parsed,
            Err(reason) => {
                error!("Invalid filename format: {}: {}", file_name, reason);
                let removed = self.remove_invalid(path, cancel).await?;
                return Err(Error::InvalidFormat {
                    file_name,
                    reason,
                    removed,
                });
            }
        };

        let destination = self.destination_for(&parsed, Local::now().date_naive())?;
        info!("Destination folder: {}", destination.directory.display());
        info!("New filename: {}", destination.file_name.to_string_lossy());
        fs::create_dir_all(&destination.directory).await?;

        let target = destination.full_path();
        info!("Moving to: {}", target.display());

        let expected = fs::metadata(path).await?.len();
        match self.copy(path, &target, cancel).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Copy interrupted by shutdown, source kept: {}", file_name);
                discard_partial(&target).await;
                return Ok(TransferOutcome::Cancelled);
            }
            Err(e) => {
                error!("Copy failed for {}: {}", file_name, e);
                discard_partial(&target).await;
                return Err(e);
            }
        }

        self.verify_copy(&target, expected).await?;
        self.delete_source(path, &target).await?;

        info!("Complete success: {} -> {}", file_name, target.display());
        Ok(TransferOutcome::Transferred(destination))
    }

    async fn copy(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<bool, Error> {
        let copier = Arc::clone(&self.copier);
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let cancel = cancel.clone();
        let copied =
            task::spawn_blocking(move || copier.copy(&source, &destination, &cancel)).await??;
        Ok(copied)
    }

    async fn verify_copy(&self, target: &Path, expected: u64) -> Result<(), Error> {
        let actual = match fs::metadata(target).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                error!("Copy failed: destination file not created: {}", target.display());
                return Err(Error::CopyVerificationFailed {
                    destination: target.to_path_buf(),
                    expected,
                    actual: 0,
                });
            }
            Err(e) => return Err(e.into()),
        };

        if actual != expected {
            error!("Copy size mismatch: {} vs {}", expected, actual);
            discard_partial(target).await;
            return Err(Error::CopyVerificationFailed {
                destination: target.to_path_buf(),
                expected,
                actual,
            });
        }

        info!("Copy verified: {} bytes", actual);
        Ok(())
    }

    async fn delete_source(&self, source: &Path, target: &Path) -> Result<(), Error> {
        let delete_failed = |reason: String| Error::SourceDeleteFailedAfterCopy {
            source_path: source.to_path_buf(),
            destination: target.to_path_buf(),
            reason,
        };

        if !fs::try_exists(source).await.unwrap_or(true) {
            info!("Original already deleted: {}", source.display());
            return Ok(());
        }

        // Lock state may have regressed since the readiness check.
        if !platform::check_deletable(&self.probe, source).await? {
            return Err(delete_failed("file became locked again".to_string()));
        }

        fs::remove_file(source)
            .await
            .map_err(|e| delete_failed(e.to_string()))?;
        info!("Original deleted: {}", source.display());
        Ok(())
    }

    /// Returns whether the file was actually removed.
    async fn remove_invalid(&self, path: &Path, cancel: &CancellationToken) -> Result<bool, Error> {
        if !sleep_or_cancel(self.invalid_file_grace, cancel).await {
            return Ok(false);
        }
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(false);
        }
        if !platform::check_deletable(&self.probe, path).await? {
            warn!("Invalid file is locked, not deleted: {}", path.display());
            return Ok(false);
        }

        match fs::remove_file(path).await {
            Ok(()) => {
                info!("Deleted invalid file: {}", path.display());
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to delete invalid file {}: {}", path.display(), e);
                Ok(false)
            }
        }
    }
}

/// A destination segment must be one or more ordinary folder names.
fn ensure_plain_segment(segment: &OsStr) -> Result<(), Error> {
    let path = Path::new(segment);
    let plain = !segment.is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
    if plain {
        Ok(())
    } else {
        Err(Error::UnsafeDestination {
            segment: segment.to_string_lossy().into_owned(),
        })
    }
}

async fn discard_partial(target: &Path) {
    match fs::remove_file(target).await {
        Ok(()) => info!("Removed incomplete copy: {}", target.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => error!("Could not remove incomplete copy {}: {}", target.display(), e),
    }
}
