//! SentenceSegmenter (C5) — turns an incremental LLM token stream into
//! sentence-sized chunks for TTS (spec §4.5).
//!
//! Sentences end on `.`, `?`, or `!` followed by whitespace (or by
//! nothing, if the stream closes right there). A flush at stream close
//! emits whatever remains in the buffer. Empty or punctuation-only
//! sentences are never emitted.

const TERMINATORS: [char; 3] = ['.', '?', '!'];

#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next token delta. Returns zero or more complete sentences
    /// boundary-detected within the accumulated buffer.
    pub fn push(&mut self, token: &str) -> Vec<String> {
        self.buffer.push_str(token);
        let mut sentences = Vec::new();

        loop {
            match self.find_boundary() {
                Some(boundary) => {
                    let rest = self.buffer.split_off(boundary);
                    let candidate = std::mem::replace(&mut self.buffer, rest);
                    self.buffer = self.buffer.trim_start().to_string();
                    if let Some(sentence) = Self::normalize(&candidate) {
                        sentences.push(sentence);
                    }
                }
                None => break,
            }
        }

        sentences
    }

    /// Emit whatever is left in the buffer, clearing it (spec §4.5
    /// "flush on stream close").
    pub fn flush(&mut self) -> Option<String> {
        let remainder = std::mem::take(&mut self.buffer);
        Self::normalize(&remainder)
    }

    /// Index just past the first terminator-plus-whitespace run found in
    /// the buffer, or `None` if no complete boundary exists yet.
    fn find_boundary(&self) -> Option<usize> {
        let chars: Vec<(usize, char)> = self.buffer.char_indices().collect();
        for (i, &(byte_idx, c)) in chars.iter().enumerate() {
            if TERMINATORS.contains(&c) {
                if let Some(&(next_byte, next_char)) = chars.get(i + 1) {
                    if next_char.is_whitespace() {
                        return Some(next_byte + next_char.len_utf8());
                    }
                    // Terminator not followed by whitespace (e.g. "3.14")
                    // is not a boundary; keep scanning.
                } else {
                    // Terminator is the last char seen so far; wait for
                    // more input or a flush to decide.
                    let _ = byte_idx;
                }
            }
        }
        None
    }

    fn normalize(candidate: &str) -> Option<String> {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.chars().all(|c| !c.is_alphanumeric()) {
            return None;
        }
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_sentence_on_terminator_and_whitespace() {
        let mut seg = SentenceSegmenter::new();
        let mut out = seg.push("Hello there. ");
        out.extend(seg.push("How are you?"));
        assert_eq!(out, vec!["Hello there.".to_string()]);
    }

    #[test]
    fn does_not_split_on_decimal_point() {
        let mut seg = SentenceSegmenter::new();
        let out = seg.push("The price is 3.14 dollars. ");
        assert_eq!(out, vec!["The price is 3.14 dollars.".to_string()]);
    }

    #[test]
    fn flush_emits_trailing_partial_sentence() {
        let mut seg = SentenceSegmenter::new();
        seg.push("Almost done");
        let flushed = seg.flush().unwrap();
        assert_eq!(flushed, "Almost done");
    }

    #[test]
    fn flush_on_empty_buffer_emits_nothing() {
        let mut seg = SentenceSegmenter::new();
        seg.push("Complete. ");
        assert!(seg.flush().is_none());
    }

    #[test]
    fn never_emits_punctuation_only_sentence() {
        let mut seg = SentenceSegmenter::new();
        let out = seg.push("... ");
        assert!(out.is_empty());
        assert!(seg.flush().is_none());
    }

    #[test]
    fn multiple_sentences_in_one_token() {
        let out = SentenceSegmenter::new().push("One. Two! Three?");
        // Only the first two have a trailing terminator+whitespace inside
        // this single push; "Three?" needs a flush since nothing follows.
        assert_eq!(out, vec!["One.".to_string(), "Two!".to_string()]);
    }

    #[test]
    fn streams_incrementally_across_many_small_tokens() {
        let mut seg = SentenceSegmenter::new();
        let mut all = Vec::new();
        for token in ["Hi", "!", " ", "Bye", ".", " "] {
            all.extend(seg.push(token));
        }
        assert_eq!(all, vec!["Hi!".to_string(), "Bye.".to_string()]);
    }
}
