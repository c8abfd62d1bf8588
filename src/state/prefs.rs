/// Lightweight key/value preferences
///
/// A flat string map kept in `preferences.json`. Reads come from memory, so
/// the UI can show the last file name before the handle store answers. Values
/// here are hints: a cached file name says nothing about current access.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub const PREFS_FILE: &str = "preferences.json";

/// Last used file name (display only)
pub const LAST_FILE_PATH: &str = "lastFilePath";
/// Serialized [`super::edit::EditorSettings`]
pub const EDITOR_SETTINGS: &str = "editorSettings";

pub trait Preferences: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// Preferences persisted as a JSON object on disk
#[derive(Debug)]
pub struct JsonPreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonPreferences {
    /// Load preferences from `data_dir`. A missing or unreadable file starts empty.
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(PREFS_FILE);
        let values = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Ignoring unreadable preferences at {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn write(&self, values: &BTreeMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

impl Preferences for JsonPreferences {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());

        // In-memory value stays updated even when the write fails
        if let Err(e) = self.write(&values) {
            warn!("Failed to save preferences to {}: {}", self.path.display(), e);
        }
    }
}
