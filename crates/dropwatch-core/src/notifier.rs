use crate::filename::NAME_FORMAT;
use std::fmt;
use tracing::error;

/// Terminal conditions an operator should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    InvalidFormat { file_name: String, removed: bool },
    DetectionFailed { file_name: String, reason: String },
    TransferFailed { file_name: String, reason: String },
    Startup { reason: String },
}

impl Alert {
    pub fn title(&self) -> &'static str {
        match self {
            Alert::InvalidFormat { .. } => "Format Error",
            Alert::DetectionFailed { .. } | Alert::TransferFailed { .. } => "File Watcher Error",
            Alert::Startup { .. } => "File Watcher Critical Error",
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::InvalidFormat { file_name, removed } => {
                write!(f, "File '{file_name}' does not match the naming format.\n\nFormat: {NAME_FORMAT}")?;
                if *removed {
                    write!(f, "\n\nThe file has been deleted.")
                } else {
                    write!(f, "\n\nThe file could not be deleted and was left in place.")
                }
            }
            Alert::DetectionFailed { file_name, reason } => {
                write!(f, "Could not check '{file_name}' for readiness.\n\n{reason}")
            }
            Alert::TransferFailed { file_name, reason } => {
                write!(f, "Failed to process '{file_name}'.\n\n{reason}")
            }
            Alert::Startup { reason } => write!(f, "CRITICAL ERROR: {reason}"),
        }
    }
}

/// Side channel to the operator. Implementations must not panic or block the caller.
pub trait Notifier: Send + Sync {
    fn alert(&self, alert: &Alert);
}

/// Writes alerts to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, alert: &Alert) {
        error!("[{}] {}", alert.title(), alert.to_string().replace("\n\n", " "));
    }
}

/// Logs every alert and additionally pops a native dialog where the platform
/// has one. Dialogs run on their own thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogNotifier;

impl DialogNotifier {
    /// Like `alert`, but keeps the dialog on the calling thread until it is
    /// dismissed. Used right before the process exits.
    pub fn alert_and_wait(&self, alert: &Alert) {
        LogNotifier.alert(alert);
        #[cfg(target_os = "windows")]
        crate::platform::windows::show_message_box(alert.title(), &alert.to_string());
    }
}

impl Notifier for DialogNotifier {
    fn alert(&self, alert: &Alert) {
        LogNotifier.alert(alert);
        show_dialog(alert);
    }
}

#[cfg(target_os = "windows")]
fn show_dialog(alert: &Alert) {
    let title = alert.title().to_string();
    let message = alert.to_string();
    let spawned = std::thread::Builder::new()
        .name("dropwatch-alert".to_string())
        .spawn(move || crate::platform::windows::show_message_box(&title, &message));
    if let Err(e) = spawned {
        error!("Could not show alert dialog: {}", e);
    }
}

#[cfg(not(target_os = "windows"))]
fn show_dialog(_alert: &Alert) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_format_message_mentions_convention() {
        let alert = Alert::InvalidFormat {
            file_name: "Episode.mp4".to_string(),
            removed: true,
        };
        let text = alert.to_string();
        assert!(text.contains("Episode.mp4"));
        assert!(text.contains(NAME_FORMAT));
        assert!(text.contains("deleted"));
        assert_eq!(alert.title(), "Format Error");
    }

    #[test]
    fn test_notifiers_do_not_panic() {
        let alert = Alert::TransferFailed {
            file_name: "KL_KHI_x.mp4".to_string(),
            reason: "disk full".to_string(),
        };
        LogNotifier.alert(&alert);
        #[cfg(not(target_os = "windows"))]
        DialogNotifier.alert(&alert);
    }
}
