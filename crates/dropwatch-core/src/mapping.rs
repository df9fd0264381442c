use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{error, info};

/// Sample activity codes written when no activity mapping file exists.
pub const SAMPLE_ACTIVITIES: &[(&str, &str)] = &[
    ("KHI", "KEPRI HARI INI"),
    ("KM", "KEPRI MENYAPA"),
    ("NB", "NGAJI BARENG"),
    ("MA", "MIMBAR AGAMA"),
    ("KS", "KEPRI SEPEKAN"),
    ("RM", "RUMAH MUSIK"),
    ("HPK", "HALO PEMIRSA KEPRI"),
];

/// Sample material codes written when no material mapping file exists.
pub const SAMPLE_MATERIALS: &[(&str, &str)] = &[("KL", "KONTEN LOKAL"), ("KN", "KONTEN NASIONAL")];

/// Code → folder name dictionary. Keys are stored uppercased.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: HashMap<String, String>,
}

impl MappingTable {
    /// Loads a flat JSON object. Any failure is logged and yields an empty table.
    pub fn load(path: &Path) -> Self {
        match read_entries(path) {
            Ok(entries) => {
                info!("Mapping loaded from {}: {} entries", path.display(), entries.len());
                Self::from_entries(entries)
            }
            Err(e) => {
                error!("Error loading mapping from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_uppercase(), v.into()))
                .collect(),
        }
    }

    /// Folder name for `code`, or the uppercased code itself when unmapped.
    pub fn resolve(&self, code: &str) -> String {
        let key = code.to_uppercase();
        match self.entries.get(&key) {
            Some(folder) => folder.clone(),
            None => key,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_entries(path: &Path) -> io::Result<HashMap<String, String>> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Writes `entries` as pretty JSON to `path` unless the file already exists.
/// Returns whether a file was written.
pub fn write_sample_if_missing(path: &Path, entries: &[(&str, &str)]) -> io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let object: Map<String, Value> = entries
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    let body = serde_json::to_string_pretty(&Value::Object(object))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, body)?;

    info!("Created sample mapping file {}", path.display());
    Ok(true)
}
