//! Narration settings shared by the sequencer, the bridge and the config file.

use serde::{Deserialize, Serialize};

pub const RATE_RANGE: (f32, f32) = (0.5, 2.0);
pub const PITCH_RANGE: (f32, f32) = (0.5, 2.0);
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Preferred voice name; empty means no preference.
    pub voice: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub filter_code_blocks: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice: String::new(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            filter_code_blocks: true,
        }
    }
}

impl Settings {
    /// Clamp numeric fields into their documented ranges.
    ///
    /// Out-of-range values are pulled to the nearest bound and NaN falls back
    /// to the default instead of being rejected.
    pub fn clamped(mut self) -> Self {
        let defaults = Self::default();
        self.rate = clamp_or(self.rate, RATE_RANGE, defaults.rate);
        self.pitch = clamp_or(self.pitch, PITCH_RANGE, defaults.pitch);
        self.volume = clamp_or(self.volume, VOLUME_RANGE, defaults.volume);
        self
    }

    pub fn preferred_voice(&self) -> Option<&str> {
        let name = self.voice.trim();
        (!name.is_empty()).then_some(name)
    }

    /// Overlay the fields present in `update`.
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(voice) = update.voice {
            self.voice = voice;
        }
        if let Some(rate) = update.rate {
            self.rate = rate;
        }
        if let Some(pitch) = update.pitch {
            self.pitch = pitch;
        }
        if let Some(volume) = update.volume {
            self.volume = volume;
        }
        if let Some(filter) = update.filter_code_blocks {
            self.filter_code_blocks = filter;
        }
    }
}

/// Partial settings pushed by the host; missing fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub voice: Option<String>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
    pub filter_code_blocks: Option<bool>,
}

fn clamp_or(value: f32, (min, max): (f32, f32), fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_out_of_range_values() {
        let settings = Settings {
            rate: 5.0,
            pitch: 0.1,
            volume: -3.0,
            ..Settings::default()
        }
        .clamped();

        assert_eq!(settings.rate, 2.0);
        assert_eq!(settings.pitch, 0.5);
        assert_eq!(settings.volume, 0.0);
    }

    #[test]
    fn nan_falls_back_to_default() {
        let settings = Settings {
            rate: f32::NAN,
            ..Settings::default()
        }
        .clamped();
        assert_eq!(settings.rate, 1.0);
    }

    #[test]
    fn in_range_values_are_untouched() {
        let settings = Settings {
            rate: 1.5,
            pitch: 0.75,
            volume: 0.3,
            ..Settings::default()
        };
        assert_eq!(settings.clone().clamped(), settings);
    }

    #[test]
    fn blank_voice_is_no_preference() {
        let mut settings = Settings::default();
        assert_eq!(settings.preferred_voice(), None);
        settings.voice = "  ".into();
        assert_eq!(settings.preferred_voice(), None);
        settings.voice = "Samantha".into();
        assert_eq!(settings.preferred_voice(), Some("Samantha"));
    }

    #[test]
    fn partial_update_keeps_missing_fields() {
        let mut settings = Settings::default();
        let update: SettingsUpdate =
            serde_json::from_str(r#"{"rate": 1.4, "filterCodeBlocks": false}"#).unwrap();
        settings.apply(update);

        assert_eq!(settings.rate, 1.4);
        assert!(!settings.filter_code_blocks);
        assert_eq!(settings.pitch, 1.0);
        assert_eq!(settings.voice, "");
    }
}
