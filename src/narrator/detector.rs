//! Heuristic AI-response detection.
//!
//! Candidate text arrives from hooks, the HTTP bridge and the clipboard. A
//! classifier decides whether it looks like an assistant response; the
//! detector additionally drops candidates it has already accepted.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use tracing::debug;

use super::filter::{filter, CODE_BLOCK_PLACEHOLDER, INLINE_CODE_PLACEHOLDER};
use crate::config::DetectorConfig;

/// Capability to tell assistant responses apart from other text.
pub trait ResponseClassifier: Send {
    fn is_likely_response(&self, text: &str) -> bool;
}

/// Prefixes that mark a user turn rather than an assistant turn.
const USER_PREFIXES: &[&str] = &["user:", "you:", "human:"];

#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    min_chars: usize,
    min_words: usize,
}

impl HeuristicClassifier {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            min_chars: config.min_chars,
            min_words: config.min_words,
        }
    }
}

impl ResponseClassifier for HeuristicClassifier {
    fn is_likely_response(&self, text: &str) -> bool {
        let text = text.trim();
        if text.chars().count() < self.min_chars {
            return false;
        }

        let lower = text.to_lowercase();
        if USER_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return false;
        }

        // Words that are not code: a bare snippet or path is not a response
        let prose = filter(text, true)
            .replace(CODE_BLOCK_PLACEHOLDER, " ")
            .replace(INLINE_CODE_PLACEHOLDER, " ");
        let words = prose
            .split_whitespace()
            .filter(|w| w.chars().any(char::is_alphabetic))
            .count();

        words >= self.min_words
    }
}

/// Classifier plus de-duplication of already narrated candidates.
pub struct ResponseDetector {
    classifier: Box<dyn ResponseClassifier>,
    seen: HashSet<u64>,
}

impl ResponseDetector {
    pub fn new(classifier: Box<dyn ResponseClassifier>) -> Self {
        Self {
            classifier,
            seen: HashSet::new(),
        }
    }

    /// Returns the trimmed text when it is a new, likely response.
    pub fn accept(&mut self, text: &str) -> Option<String> {
        let text = text.trim();
        if !self.classifier.is_likely_response(text) {
            debug!("Candidate rejected by classifier ({} chars)", text.len());
            return None;
        }

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        if !self.seen.insert(hasher.finish()) {
            debug!("Candidate already processed");
            return None;
        }

        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> HeuristicClassifier {
        HeuristicClassifier::new(&DetectorConfig::default())
    }

    #[test]
    fn accepts_prose_response() {
        assert!(classifier().is_likely_response(
            "Sure! I updated the parser so that empty lines are skipped."
        ));
    }

    #[test]
    fn rejects_short_text() {
        assert!(!classifier().is_likely_response("ok"));
        assert!(!classifier().is_likely_response("   thanks   "));
    }

    #[test]
    fn rejects_user_turns() {
        assert!(!classifier().is_likely_response("User: please fix the failing test for me"));
        assert!(!classifier().is_likely_response("You: what does this function do?"));
    }

    #[test]
    fn rejects_code_only_text() {
        assert!(!classifier().is_likely_response("```\nfn main() { println!(\"hi\"); }\n```"));
        assert!(!classifier().is_likely_response("/usr/local/bin/some-tool --flag"));
    }

    #[test]
    fn response_with_some_code_is_accepted() {
        assert!(classifier().is_likely_response(
            "Run this command to build it:\n```\ncargo build\n```"
        ));
    }

    #[test]
    fn detector_drops_duplicates() {
        let mut detector = ResponseDetector::new(Box::new(classifier()));
        let text = "Here is the summary of the changes you asked for.";

        assert_eq!(detector.accept(text).as_deref(), Some(text));
        assert_eq!(detector.accept(&format!("  {text}\n")), None);
        assert!(detector.accept("A different response arrives later on.").is_some());
    }
}
