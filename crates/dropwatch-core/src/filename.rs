use std::ffi::{OsStr, OsString};
use std::ops::Range;

use thiserror::Error;

/// Convention every ingested file name must follow.
pub const NAME_FORMAT: &str = "MATERIAL_ACTIVITY_TITLE.ext";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilenameError {
    #[error("expected at least 3 '_' separated parts ({}), found {found}", NAME_FORMAT)]
    TooFewSegments { found: usize },

    #[error("file has no extension")]
    MissingExtension,

    #[error("material and activity codes must be valid UTF-8")]
    NonUnicodeCode,
}

/// Routing tokens split out of `MATERIAL_ACTIVITY_TITLE.ext`.
///
/// The title keeps the original bytes of the name, so a name that is not
/// valid UTF-8 reaches its destination unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub material_code: String,
    pub activity_code: String,
    /// Everything after the second `_`, extension included.
    pub title: OsString,
    pub extension: OsString,
}

impl ParsedFilename {
    /// Name the file gets at its destination.
    pub fn new_file_name(&self) -> OsString {
        self.title.clone()
    }
}

pub fn parse(file_name: impl AsRef<OsStr>) -> Result<ParsedFilename, FilenameError> {
    let file_name = file_name.as_ref();
    let bytes = file_name.as_encoded_bytes();
    let parts: Vec<&[u8]> = bytes.split(|b| *b == b'_').collect();
    if parts.len() < 3 {
        return Err(FilenameError::TooFewSegments { found: parts.len() });
    }

    let last = parts[parts.len() - 1];
    let Some(dot) = last.iter().rposition(|b| *b == b'.') else {
        return Err(FilenameError::MissingExtension);
    };

    let title_start = parts[0].len() + parts[1].len() + 2;
    let extension_start = bytes.len() - last.len() + dot + 1;

    Ok(ParsedFilename {
        material_code: code(parts[0])?,
        activity_code: code(parts[1])?,
        title: slice(file_name, title_start..bytes.len()).to_os_string(),
        extension: slice(file_name, extension_start..bytes.len()).to_os_string(),
    })
}

fn code(bytes: &[u8]) -> Result<String, FilenameError> {
    std::str::from_utf8(bytes)
        .map(str::to_uppercase)
        .map_err(|_| FilenameError::NonUnicodeCode)
}

/// `range` must start right after an ASCII `_` or `.` and run to the end.
fn slice(name: &OsStr, range: Range<usize>) -> &OsStr {
    // SAFETY: the range begins immediately after an ASCII byte of `name` and
    // ends at its end, so it is a valid split of the encoded bytes.
    unsafe { OsStr::from_encoded_bytes_unchecked(&name.as_encoded_bytes()[range]) }
}
