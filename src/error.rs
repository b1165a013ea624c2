//! Error types for reply-reader-rs.

use std::path::PathBuf;

use crate::narrator::engine::EngineErrorCode;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable narration engine on this host.
    #[error("speech synthesis not available ({binary} not found)")]
    EngineUnavailable { binary: String },

    /// The voice catalog gave up without finding any voice.
    #[error("no voices available after {attempts} attempts, using engine default voice")]
    NoVoicesAvailable { attempts: u32 },

    /// Playback was cancelled by an explicit stop.
    #[error("playback canceled")]
    PlaybackCanceled,

    /// The engine reported a playback failure.
    #[error("{code}")]
    Playback { code: EngineErrorCode },

    /// Audio output device could not be opened or used.
    #[error("audio output failed: {0}")]
    AudioOutput(String),

    #[error("failed to write config to {}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config")]
    ConfigSerialize(#[from] serde_yml::Error),
}

impl Error {
    /// Classify an engine error code.
    pub fn from_engine(code: EngineErrorCode) -> Self {
        if code.is_cancellation() {
            Self::PlaybackCanceled
        } else {
            Self::Playback { code }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
