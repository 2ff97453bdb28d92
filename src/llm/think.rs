//! Splits `<think>…</think>` sections out of streamed answer text.
//!
//! Some models inline their reasoning in the content channel wrapped in
//! think tags. Tags may arrive split across deltas, so the splitter holds
//! back any trailing text that could still turn into a tag.

use super::types::StreamPart;

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Incremental think-tag splitter.
#[derive(Debug, Default)]
pub struct ThinkTagSplitter {
    in_reasoning: bool,
    pending: String,
}

impl ThinkTagSplitter {
    /// Create a splitter positioned outside any think section.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a content delta, returning the parts that are now resolved.
    pub fn push(&mut self, delta: &str) -> Vec<StreamPart> {
        self.pending.push_str(delta);
        let mut parts = Vec::new();

        loop {
            let tag = self.current_tag();
            if let Some(pos) = self.pending.find(tag) {
                let before: String = self.pending[..pos].to_string();
                self.emit(&mut parts, before);
                self.pending.drain(..pos + tag.len());
                self.in_reasoning = !self.in_reasoning;
                continue;
            }

            let keep = partial_tag_suffix(&self.pending, tag);
            let split_at = self.pending.len() - keep;
            let resolved: String = self.pending[..split_at].to_string();
            self.pending.drain(..split_at);
            self.emit(&mut parts, resolved);
            break;
        }

        parts
    }

    /// Flush whatever is still held back at end of stream.
    pub fn finish(&mut self) -> Vec<StreamPart> {
        let mut parts = Vec::new();
        let rest = std::mem::take(&mut self.pending);
        self.emit(&mut parts, rest);
        parts
    }

    fn current_tag(&self) -> &'static str {
        if self.in_reasoning {
            CLOSE_TAG
        } else {
            OPEN_TAG
        }
    }

    fn emit(&self, parts: &mut Vec<StreamPart>, text: String) {
        if text.is_empty() {
            return;
        }
        if self.in_reasoning {
            parts.push(StreamPart::ReasoningDelta(text));
        } else {
            parts.push(StreamPart::TextDelta(text));
        }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    let max = (tag.len() - 1).min(text.len());
    (1..=max)
        .rev()
        .find(|&n| {
            let start = text.len() - n;
            text.is_char_boundary(start) && tag.starts_with(&text[start..])
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> StreamPart {
        StreamPart::TextDelta(s.to_string())
    }

    fn reasoning(s: &str) -> StreamPart {
        StreamPart::ReasoningDelta(s.to_string())
    }

    #[test]
    fn test_plain_text_passes_through() {
        let mut splitter = ThinkTagSplitter::new();
        assert_eq!(splitter.push("hello"), vec![text("hello")]);
        assert!(splitter.finish().is_empty());
    }

    #[test]
    fn test_think_section_in_single_delta() {
        let mut splitter = ThinkTagSplitter::new();
        let parts = splitter.push("<think>pondering</think>{\"a\":1}");
        assert_eq!(parts, vec![reasoning("pondering"), text("{\"a\":1}")]);
    }

    #[test]
    fn test_tags_split_across_deltas() {
        let mut splitter = ThinkTagSplitter::new();
        let mut parts = Vec::new();
        for delta in ["<th", "ink>why", " not</thi", "nk>", "answer"] {
            parts.extend(splitter.push(delta));
        }
        parts.extend(splitter.finish());
        assert_eq!(
            parts,
            vec![reasoning("why"), reasoning(" not"), text("answer")]
        );
    }

    #[test]
    fn test_held_back_lookalike_is_flushed_as_text() {
        let mut splitter = ThinkTagSplitter::new();
        assert_eq!(splitter.push("a <thi"), vec![text("a ")]);
        assert_eq!(splitter.finish(), vec![text("<thi")]);
    }

    #[test]
    fn test_non_ascii_text_is_preserved() {
        let mut splitter = ThinkTagSplitter::new();
        let parts = splitter.push("données <think>é</think>ü");
        assert_eq!(parts, vec![text("données "), reasoning("é"), text("ü")]);
    }

    #[test]
    fn test_partial_tag_suffix() {
        assert_eq!(partial_tag_suffix("abc<", OPEN_TAG), 1);
        assert_eq!(partial_tag_suffix("abc<thin", OPEN_TAG), 5);
        assert_eq!(partial_tag_suffix("abc", OPEN_TAG), 0);
        assert_eq!(partial_tag_suffix("x</", CLOSE_TAG), 2);
    }
}
