use crate::filename::FilenameError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid file name '{file_name}': {reason}")]
    InvalidFormat {
        file_name: String,
        reason: FilenameError,
        removed: bool,
    },

    #[error("Destination segment '{segment}' is not a plain folder name")]
    UnsafeDestination { segment: String },

    #[error("Copy verification failed for {}: expected {expected} bytes, found {actual}", .destination.display())]
    CopyVerificationFailed {
        destination: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Copied to {} but could not delete source {}: {reason}", .destination.display(), .source_path.display())]
    SourceDeleteFailedAfterCopy {
        source_path: PathBuf,
        destination: PathBuf,
        reason: String,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
