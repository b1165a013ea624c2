//! reply-reader-rs: reads AI assistant responses aloud.

pub mod clipboard;
pub mod config;
pub mod error;
pub mod narrator;
pub mod service;
