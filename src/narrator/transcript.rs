//! Chat transcript (JSONL) parser.
//!
//! Extracts the most recent assistant text from a chat client's session
//! transcript so that hooks can hand it to the narrator.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

#[derive(Deserialize)]
struct TranscriptEntry {
    #[serde(rename = "type")]
    entry_type: Option<String>,
    message: Option<TranscriptMessage>,
}

#[derive(Deserialize)]
struct TranscriptMessage {
    content: Option<MessageContent>,
}

/// Content is either a plain string or a list of typed blocks.
#[derive(Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
    text: Option<String>,
}

/// Extract the last assistant text message from a JSONL transcript.
///
/// Walks the file backwards to find the most recent assistant entry with
/// non-empty text, truncated to `max_chars`.
pub fn extract_last_assistant_text(transcript_path: &Path, max_chars: usize) -> Option<String> {
    let contents = match fs::read_to_string(transcript_path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read transcript {}: {e}", transcript_path.display());
            return None;
        }
    };

    contents.lines().rev().find_map(|line| {
        let entry: TranscriptEntry = serde_json::from_str(line).ok()?;
        if entry.entry_type.as_deref() != Some("assistant") {
            return None;
        }

        let text = match entry.message?.content? {
            MessageContent::Text(text) => text,
            MessageContent::Blocks(blocks) => blocks
                .into_iter()
                .filter(|b| b.block_type.as_deref() == Some("text"))
                .filter_map(|b| b.text)
                .find(|t| !t.trim().is_empty())?,
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.chars().take(max_chars).collect())
    })
}
