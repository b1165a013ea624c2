//! Read-aloud pipeline: text preparation, voice selection, the speech queue
//! and the surfaces that feed it.

pub mod api;
pub mod detector;
pub mod engine;
pub mod espeak;
pub mod filter;
pub mod segmenter;
pub mod sequencer;
pub mod settings;
pub mod transcript;
pub mod voices;
