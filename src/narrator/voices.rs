//! Voice discovery and preferred-voice resolution.
//!
//! Engines often report no voices on the first query and fill the list in
//! later. The catalog queries immediately, waits once for a
//! `VoicesChanged` notification, and is polled by the service on a fixed
//! interval until the list is populated or the attempt budget runs out.

use tracing::{debug, info, warn};

use super::engine::{NarrationEngine, Voice};
use crate::error::Error;

pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub struct VoiceCatalog {
    voices: Vec<Voice>,
    selected: Option<Voice>,
    preferred: Option<String>,
    locale_lang: String,
    attempts: u32,
    max_attempts: u32,
    awaiting_change: bool,
    gave_up: bool,
}

impl VoiceCatalog {
    pub fn new(locale_lang: impl Into<String>, preferred: Option<String>, max_attempts: u32) -> Self {
        Self {
            voices: Vec::new(),
            selected: None,
            preferred,
            locale_lang: locale_lang.into(),
            attempts: 0,
            max_attempts,
            awaiting_change: false,
            gave_up: false,
        }
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn selected(&self) -> Option<&Voice> {
        self.selected.as_ref()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Interval polling is still useful.
    pub fn needs_retry(&self) -> bool {
        self.voices.is_empty() && self.attempts < self.max_attempts
    }

    /// Query the engine once. Returns true when the voice list was replaced.
    pub fn load(&mut self, engine: &dyn NarrationEngine) -> bool {
        self.attempts += 1;
        let available = engine.voices();

        if available.is_empty() {
            debug!("No voices found on attempt {}, waiting for voices...", self.attempts);
            self.awaiting_change = true;
            if self.voices.is_empty() && self.attempts >= self.max_attempts && !self.gave_up {
                self.gave_up = true;
                warn!("{}", Error::NoVoicesAvailable { attempts: self.attempts });
            }
            return false;
        }

        info!("Loaded {} voices on attempt {}", available.len(), self.attempts);
        self.replace(available);
        true
    }

    /// Handle the engine's voices-changed notification.
    ///
    /// Only honored while a wait is armed by an empty query.
    pub fn on_voices_changed(&mut self, engine: &dyn NarrationEngine) -> bool {
        if !self.awaiting_change {
            return false;
        }
        self.awaiting_change = false;

        let available = engine.voices();
        if available.is_empty() {
            return false;
        }
        info!("Loaded {} voices from voices-changed notification", available.len());
        self.replace(available);
        true
    }

    /// One interval tick. Returns true when the voice list was replaced.
    pub fn retry_tick(&mut self, engine: &dyn NarrationEngine) -> bool {
        if !self.needs_retry() {
            return false;
        }
        self.load(engine)
    }

    /// Start discovery over, e.g. after the user asked to reload voices.
    pub fn reload(&mut self, engine: &dyn NarrationEngine) -> bool {
        self.attempts = 0;
        self.gave_up = false;
        self.load(engine)
    }

    /// Change the saved preference and re-resolve the selection.
    pub fn set_preferred(&mut self, preferred: Option<String>) {
        self.preferred = preferred;
        self.resolve();
        if let (Some(name), false) = (&self.preferred, self.voices.is_empty()) {
            if self.selected.as_ref().map(|v| &v.name) != Some(name) {
                warn!("Selected voice not found: {name}");
            }
        }
    }

    fn replace(&mut self, voices: Vec<Voice>) {
        self.voices = voices;
        self.awaiting_change = false;
        self.resolve();
    }

    fn resolve(&mut self) {
        self.selected = resolve_voice(&self.voices, self.preferred.as_deref(), &self.locale_lang);
        if let Some(voice) = &self.selected {
            debug!("Using voice: {} ({})", voice.name, voice.lang);
        }
    }
}

/// Pick the voice to narrate with.
///
/// A saved name that exists in `voices` wins; otherwise the first voice in
/// the host language, otherwise the first voice.
pub fn resolve_voice(voices: &[Voice], saved: Option<&str>, locale_lang: &str) -> Option<Voice> {
    if let Some(name) = saved {
        if let Some(voice) = voices.iter().find(|v| v.name == name) {
            return Some(voice.clone());
        }
    }

    voices
        .iter()
        .find(|v| matches_language(&v.lang, locale_lang))
        .or_else(|| voices.first())
        .cloned()
}

fn matches_language(tag: &str, lang: &str) -> bool {
    if lang.is_empty() {
        return false;
    }
    let tag = tag.to_ascii_lowercase();
    let lang = lang.to_ascii_lowercase();
    tag == lang || tag.starts_with(&format!("{lang}-"))
}

/// Primary language of the host locale, e.g. `en` for `en_US.UTF-8`.
pub fn host_language() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find_map(|value| primary_language(&value))
        .unwrap_or_else(|| "en".to_string())
}

/// Extract the primary language subtag from a locale string.
pub fn primary_language(locale: &str) -> Option<String> {
    let lang: String = locale
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase();

    // "C" and "POSIX" carry no language
    if lang.len() < 2 || lang == "posix" {
        return None;
    }
    Some(lang)
}
