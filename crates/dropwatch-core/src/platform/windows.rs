use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use tracing::trace;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::{CreateFileW, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::winnt::{DELETE, FILE_ATTRIBUTE_NORMAL, GENERIC_READ};
use winapi::um::winuser::{MessageBoxW, MB_ICONERROR, MB_OK};

use super::LockProbe;

fn to_wide(value: &OsStr) -> Vec<u16> {
    value.encode_wide().chain(std::iter::once(0)).collect()
}

/// Opens the file for read + delete with no sharing at all. Any other open
/// handle makes this fail with a sharing violation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShareModeProbe;

impl LockProbe for ShareModeProbe {
    fn is_deletable(&self, path: &Path) -> bool {
        let wide = to_wide(path.as_os_str());

        unsafe {
            let handle = CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | DELETE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                ptr::null_mut(),
            );

            if handle == INVALID_HANDLE_VALUE {
                trace!(
                    "Exclusive open refused for {} (error {})",
                    path.display(),
                    GetLastError()
                );
                return false;
            }

            CloseHandle(handle);
        }
        true
    }
}

/// Blocking error dialog. Call from a thread that may block.
pub fn show_message_box(title: &str, message: &str) {
    let title = to_wide(OsStr::new(title));
    let message = to_wide(OsStr::new(message));
    unsafe {
        MessageBoxW(
            ptr::null_mut(),
            message.as_ptr(),
            title.as_ptr(),
            MB_OK | MB_ICONERROR,
        );
    }
}
