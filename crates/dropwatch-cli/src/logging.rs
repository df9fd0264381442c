use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info,notify=warn";
const DEFAULT_LOG_FILE: &str = "./logs/dropwatch.log";

/// Sets up stdout and file logging. Keep the returned guard alive until exit
/// or buffered file lines are lost.
pub fn init_logger() -> impl Drop {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let log_file = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());

    let (log_dir, file_name) = split_log_path(Path::new(&log_file));
    let dir_error = fs::create_dir_all(&log_dir).err();

    let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .with_line_number(false)
                .with_target(false)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(EnvFilter::new(filter))
        .init();

    match dir_error {
        None => info!("Logging to stdout and {}", log_dir.join(&file_name).display()),
        Some(e) => warn!("Cannot create log folder {}: {}", log_dir.display(), e),
    }

    guard
}

/// Folder and file name of the log file; a bare name lands in the working folder.
fn split_log_path(path: &Path) -> (PathBuf, OsString) {
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("dropwatch.log"));
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (dir, file_name)
}
