//! Persistent user preferences (last chosen voices, flight and destination).
//!
//! Stored as a flat JSON object at ~/.config/announcer/preferences.json.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub const KOREAN_VOICE: &str = "tts-ko-voice";
pub const ENGLISH_VOICE: &str = "tts-en-voice";
pub const FLIGHT: &str = "tts-flight";
pub const DESTINATION: &str = "tts-dest";

/// String key-value store. Writes are best effort.
pub trait PreferenceStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str);
}

pub struct JsonPreferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl JsonPreferences {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("announcer/preferences.json")
    }

    /// Open the store, starting empty if the file is missing or unreadable.
    pub fn open(path: &Path) -> Self {
        let values = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring malformed preferences {}: {e}", path.display());
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path: path.to_path_buf(),
            values,
        }
    }

    fn save(&self) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                warn!("Failed to create preferences dir: {e}");
                return;
            }
        }

        match serde_json::to_string_pretty(&self.values) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    warn!("Failed to write preferences: {e}");
                } else {
                    debug!("Saved preferences to {}", self.path.display());
                }
            }
            Err(e) => warn!("Failed to serialize preferences: {e}"),
        }
    }
}

impl PreferenceStore for JsonPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
        self.save();
    }
}

/// Non-persistent store.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryPreferences {
    values: BTreeMap<String, String>,
}

#[cfg(test)]
impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}
