pub mod config;
pub mod coordinator;
pub mod error;
pub mod filename;
pub mod mapping;
pub mod notifier;
pub mod platform;
pub mod readiness;
pub mod transfer;
pub mod watcher;

pub use config::AppConfig;
pub use coordinator::{Coordinator, PendingFile};
pub use error::Error;
pub use filename::{FilenameError, ParsedFilename};
pub use mapping::MappingTable;
pub use notifier::{Alert, DialogNotifier, LogNotifier, Notifier};
pub use platform::LockProbe;
pub use readiness::{Readiness, ReadinessDetector};
pub use transfer::{DestinationPath, TransferEngine, TransferOutcome};
pub use watcher::{CreatedEvent, NotifyEventSource, WatchTarget};
