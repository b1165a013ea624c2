//! Code region filtering before narration.

use std::sync::LazyLock;

use regex::Regex;

pub const CODE_BLOCK_PLACEHOLDER: &str = "Code block skipped.";
pub const INLINE_CODE_PLACEHOLDER: &str = "Inline code skipped.";

static FENCED_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid fenced code regex"));

static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]+`").expect("valid inline code regex"));

/// Replace fenced and inline code with short spoken placeholders.
///
/// Fenced blocks are replaced first so the inline rule never matches
/// backticks that belong to a fence.
pub fn filter(text: &str, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }

    let without_blocks = FENCED_CODE.replace_all(text, CODE_BLOCK_PLACEHOLDER);
    INLINE_CODE
        .replace_all(&without_blocks, INLINE_CODE_PLACEHOLDER)
        .into_owned()
}
