//! Sentence-respecting text segmentation.
//!
//! Long responses are narrated in chunks so that stop/pause react quickly and
//! a single failed chunk only skips a few sentences.

/// Default upper bound for a segment, in chars.
pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 200;

/// Split `text` into segments of at most `max_len` chars.
///
/// Sentences are greedily joined with a single space. A sentence that is
/// longer than `max_len` on its own is emitted whole, never split.
pub fn segment(text: &str, max_len: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut buffer_chars = 0;

    for sentence in split_sentences(text) {
        let sentence_chars = sentence.chars().count();

        if buffer.is_empty() {
            buffer.push_str(sentence);
            buffer_chars = sentence_chars;
            continue;
        }

        // +1 for the joining space; the limit itself is allowed
        if buffer_chars + 1 + sentence_chars > max_len {
            segments.push(std::mem::take(&mut buffer));
            buffer.push_str(sentence);
            buffer_chars = sentence_chars;
        } else {
            buffer.push(' ');
            buffer.push_str(sentence);
            buffer_chars += 1 + sentence_chars;
        }
    }

    if !buffer.is_empty() {
        segments.push(buffer);
    }

    segments
}

/// Split text into trimmed sentences at `.`, `!` or `?` followed by any
/// Unicode whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let terminator = matches!(c, '.' | '!' | '?');
        if terminator && chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
            let end = i + c.len_utf8();
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);

    sentences
}

fn push_trimmed<'a>(sentences: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        sentences.push(piece);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_nothing() {
        assert!(segment("", 200).is_empty());
        assert!(segment("   \n\t ", 200).is_empty());
    }

    #[test]
    fn each_sentence_gets_its_own_segment_when_pairs_overflow() {
        assert_eq!(segment("A. B. C.", 4), vec!["A.", "B.", "C."]);
    }

    #[test]
    fn limit_is_inclusive() {
        // "A. B." is exactly 5 chars
        assert_eq!(segment("A. B. C.", 5), vec!["A. B.", "C."]);
    }

    #[test]
    fn long_sentence_is_never_split() {
        let text = "A very long sentence without punctuation breaks exceeding limit.";
        assert_eq!(segment(text, 10), vec![text]);
    }

    #[test]
    fn long_sentence_flushes_buffer_first() {
        let segments = segment("Hi. This one is far too long for the limit. Ok.", 10);
        assert_eq!(
            segments,
            vec!["Hi.", "This one is far too long for the limit.", "Ok."]
        );
    }

    #[test]
    fn splits_on_all_terminators_and_collapses_whitespace() {
        assert_eq!(
            split_sentences("Really?  Yes!\nGreat.   Trailing"),
            vec!["Really?", "Yes!", "Great.", "Trailing"]
        );
    }

    #[test]
    fn punctuation_without_whitespace_does_not_split() {
        assert_eq!(split_sentences("Version 1.2.3 shipped."), vec!["Version 1.2.3 shipped."]);
    }

    #[test]
    fn non_ascii_whitespace_ends_a_sentence() {
        assert_eq!(
            split_sentences("Done.\u{a0}Next one!\u{2003}Last."),
            vec!["Done.", "Next one!", "Last."]
        );
    }

    #[test]
    fn segmentation_keeps_all_non_whitespace_content() {
        let text = "First sentence here. Second one!  Third?\n\nAnd a tail without stop";
        let joined: String = segment(text, 25).concat();
        let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(strip(&joined), strip(text));
    }

    #[test]
    fn counts_chars_not_bytes() {
        // Each sentence is 3 chars but 5+ bytes
        let segments = segment("Çà. Éé. Üü.", 7);
        assert_eq!(segments, vec!["Çà. Éé.", "Üü."]);
    }
}
