//! Configuration management for announcer-rs.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so a missing or partial file is fine.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::engine::Voice;
use crate::script::BroadcastConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub rate: f32,
    pub pitch: f32,
    /// Delay between the last run ending and the player resetting.
    pub grace_delay_ms: u64,
    /// Wait after cancelling a busy engine before the first run is queued.
    pub probe_settle_ms: u64,
    /// Silent wake-up interval while idle. 0 disables it.
    pub keep_alive_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            grace_delay_ms: 50,
            probe_settle_ms: 50,
            keep_alive_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceLoadConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f32,
}

impl Default for VoiceLoadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_factor: 1.5,
        }
    }
}

/// Preferred voices by name. Saved preferences take precedence.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub korean: Option<String>,
    pub english: Option<String>,
    pub load: VoiceLoadConfig,
}

/// Settings for the built-in simulated engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub chars_per_second: f32,
    /// How long the engine reports an empty voice list after startup.
    pub voice_load_delay_ms: u64,
    pub voices: Vec<Voice>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chars_per_second: 14.0,
            voice_load_delay_ms: 300,
            voices: vec![
                Voice {
                    name: "Google 한국의".into(),
                    lang: "ko-KR".into(),
                },
                Voice {
                    name: "Yuna".into(),
                    lang: "ko-KR".into(),
                },
                Voice {
                    name: "Google US English".into(),
                    lang: "en-US".into(),
                },
                Voice {
                    name: "Samantha".into(),
                    lang: "en-US".into(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub endpoint: String,
    pub langpair: String,
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.mymemory.translated.net/get".into(),
            langpair: "en|ko".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub notifications: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8780 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub voices: VoicesConfig,
    pub engine: EngineConfig,
    pub translation: TranslationConfig,
    pub feedback: FeedbackConfig,
    pub api: ApiConfig,
    /// Airport code → name read aloud.
    pub airports: BTreeMap<String, String>,
    pub flights: Vec<String>,
    pub broadcasts: Vec<BroadcastConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            voices: VoicesConfig::default(),
            engine: EngineConfig::default(),
            translation: TranslationConfig::default(),
            feedback: FeedbackConfig::default(),
            api: ApiConfig::default(),
            airports: BTreeMap::from([
                ("ICN".to_string(), "인천".to_string()),
                ("PUS".to_string(), "부산".to_string()),
            ]),
            flights: vec!["KE1101".into(), "OZ8915".into(), "7C1101".into()],
            broadcasts: crate::script::default_broadcasts(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/announcer/config.yaml
    /// 3. /etc/announcer/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::config_dir().map(|c| c.join("announcer/config.yaml")),
                Some(PathBuf::from("/etc/announcer/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "playback:\n  rate: 1.4\nvoices:\n  korean: Yuna\n";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.playback.rate, 1.4);
        assert_eq!(config.playback.pitch, 1.0);
        assert_eq!(config.playback.grace_delay_ms, 50);
        assert_eq!(config.voices.korean.as_deref(), Some("Yuna"));
        assert_eq!(config.voices.load.max_attempts, 30);
        assert_eq!(config.airports.get("ICN").map(String::as_str), Some("인천"));
        assert!(!config.broadcasts.is_empty());
    }

    #[test]
    fn test_custom_engine_voices() {
        let yaml = "engine:\n  voices:\n    - name: Heami\n      lang: ko-KR\n";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.engine.voices.len(), 1);
        assert_eq!(config.engine.voices[0].name, "Heami");
        assert_eq!(config.engine.chars_per_second, 14.0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/announcer.yaml")));
        assert_eq!(config.api.port, 8780);
    }
}
