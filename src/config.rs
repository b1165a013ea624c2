//! Configuration management for reply-reader-rs.
//!
//! Loads config from YAML files in standard locations. Settings changed at
//! runtime are written back with [`Config::save`] on explicit request only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Error, Result};
use crate::narrator::segmenter::DEFAULT_MAX_SEGMENT_CHARS;
use crate::narrator::settings::Settings;
use crate::narrator::voices::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL_MS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// Read detected responses aloud without being asked.
    pub auto_read: bool,
    pub voice: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub filter_code_blocks: bool,
    pub read_clipboard: bool,
    pub max_segment_chars: usize,
    /// Primary language for default voice selection; empty = host locale.
    pub locale: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_read: true,
            voice: String::new(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            filter_code_blocks: true,
            read_clipboard: false,
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
            locale: String::new(),
        }
    }
}

impl SpeechConfig {
    pub fn settings(&self) -> Settings {
        Settings {
            voice: self.voice.clone(),
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
            filter_code_blocks: self.filter_code_blocks,
        }
        .clamped()
    }

    pub fn store_settings(&mut self, settings: &Settings) {
        self.voice = settings.voice.clone();
        self.rate = settings.rate;
        self.pitch = settings.pitch;
        self.volume = settings.volume;
        self.filter_code_blocks = settings.filter_code_blocks;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub retry_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// espeak binary; empty = auto-detect espeak-ng, then espeak.
    pub binary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8768,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    pub poll_interval_ms: u64,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub min_chars: usize,
    pub min_words: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_chars: 10,
            min_words: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub speech: SpeechConfig,
    pub voices: VoicesConfig,
    pub engine: EngineConfig,
    pub api: ApiConfig,
    pub clipboard: ClipboardConfig,
    pub detector: DetectorConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/reply-reader/config.yaml
    /// 3. /etc/reply-reader/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let Some(config_path) = Self::find(path) else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
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

    /// The explicit path, or the first existing standard location.
    pub fn find(path: Option<&Path>) -> Option<PathBuf> {
        path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                Self::user_path(),
                Some(PathBuf::from("/etc/reply-reader/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        })
    }

    /// Per-user location, also the default target for saves.
    pub fn user_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".config/reply-reader/config.yaml"))
    }

    /// Write the whole config as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::ConfigWrite {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, yaml).map_err(|source| Error::ConfigWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Saved config to {}", path.display());
        Ok(())
    }
}
