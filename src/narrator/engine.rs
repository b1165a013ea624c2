//! Narration engine interface.
//!
//! Engines are event driven: `speak` returns immediately and progress is
//! reported later through [`EngineEvent`]s carrying the utterance id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one submitted utterance. Monotonic per sequencer.
pub type UtteranceId = u64;

/// A synthesis voice as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// BCP-47-ish language tag, e.g. `en-US` or `en-gb`.
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// A single unit of narration.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    /// `None` means the engine default voice.
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Error vocabulary of speech-synthesis engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineErrorCode {
    Canceled,
    Interrupted,
    AudioBusy,
    AudioHardware,
    Network,
    SynthesisUnavailable,
    SynthesisFailed,
    LanguageUnavailable,
    VoiceUnavailable,
    TextTooLong,
    InvalidArgument,
    NotAllowed,
}

impl EngineErrorCode {
    /// Errors caused by `cancel()` rather than by a real failure.
    pub fn is_cancellation(self) -> bool {
        matches!(self, Self::Canceled | Self::Interrupted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::Interrupted => "interrupted",
            Self::AudioBusy => "audio-busy",
            Self::AudioHardware => "audio-hardware",
            Self::Network => "network",
            Self::SynthesisUnavailable => "synthesis-unavailable",
            Self::SynthesisFailed => "synthesis-failed",
            Self::LanguageUnavailable => "language-unavailable",
            Self::VoiceUnavailable => "voice-unavailable",
            Self::TextTooLong => "text-too-long",
            Self::InvalidArgument => "invalid-argument",
            Self::NotAllowed => "not-allowed",
        }
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notifications flowing from the engine back to the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Start(UtteranceId),
    End(UtteranceId),
    Error(UtteranceId, EngineErrorCode),
    VoicesChanged,
}

/// A speech-synthesis backend.
///
/// Only the sequencer submits or cancels utterances, so implementations may
/// assume a single active utterance at a time.
pub trait NarrationEngine: Send + Sync {
    /// Currently known voices. May be empty while the engine is still
    /// populating its list; an [`EngineEvent::VoicesChanged`] follows.
    fn voices(&self) -> Vec<Voice>;

    /// Queue `utterance` for playback and return immediately.
    fn speak(&self, utterance: Utterance);

    /// Stop the current utterance. Idempotent.
    fn cancel(&self);

    fn pause(&self);

    fn resume(&self);

    /// Audio is playing (or paused mid-utterance).
    fn is_speaking(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// An utterance was accepted but has not started playing yet.
    fn is_pending(&self) -> bool;
}
