use tracing::{debug, warn};

use crate::Suggestion;

/// Result of decoding a complete assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    Suggestions(Vec<Suggestion>),
    /// The payload was not a suggestion list; carries it unmodified.
    Fallback(String),
}

/// Strictly decode the full reply as a JSON array of suggestions.
///
/// Anything that is not exactly that shape falls back to the raw text. No
/// attempt is made to recover individual objects from a broken array.
pub fn parse_suggestions(raw: &str) -> ParsedReply {
    match serde_json::from_str::<Vec<Suggestion>>(raw) {
        Ok(suggestions) => ParsedReply::Suggestions(suggestions),
        Err(e) => {
            warn!(error = %e, len = raw.len(), "assistant reply is not a suggestion list");
            ParsedReply::Fallback(raw.to_string())
        }
    }
}

/// Collects streamed chunks; decoding waits for [`StreamAccumulator::finalize`].
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    chunks: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, chunk: &str) {
        self.chunks += 1;
        self.text.push_str(chunk);
        debug!(chunk = self.chunks, bytes = self.text.len(), "stream chunk");
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn finalize(self) -> ParsedReply {
        parse_suggestions(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: &str = r#"[{"title":"A","content":"B","reasoning":"C"}]"#;

    fn expected_one() -> ParsedReply {
        ParsedReply::Suggestions(vec![Suggestion {
            title: "A".to_string(),
            content: "B".to_string(),
            reasoning: "C".to_string(),
        }])
    }

    #[test]
    fn decodes_independent_of_chunk_boundaries() {
        for i in 1..ONE.len() - 1 {
            for j in i + 1..ONE.len() {
                let mut acc = StreamAccumulator::new();
                acc.append(&ONE[..i]);
                acc.append(&ONE[i..j]);
                acc.append(&ONE[j..]);
                assert_eq!(acc.chunk_count(), 3);
                assert_eq!(acc.finalize(), expected_one(), "split at {i}/{j}");
            }
        }
    }

    #[test]
    fn prose_falls_back_verbatim() {
        let raw = "sorry, I cannot help";
        assert_eq!(parse_suggestions(raw), ParsedReply::Fallback(raw.to_string()));
    }

    #[test]
    fn missing_field_falls_back() {
        let raw = r#"[{"title":"A","content":"B"}]"#;
        assert_eq!(parse_suggestions(raw), ParsedReply::Fallback(raw.to_string()));
    }

    #[test]
    fn non_string_field_falls_back() {
        let raw = r#"[{"title":"A","content":"B","reasoning":3}]"#;
        assert!(matches!(parse_suggestions(raw), ParsedReply::Fallback(_)));
    }

    #[test]
    fn object_instead_of_array_falls_back() {
        let raw = r#"{"title":"A","content":"B","reasoning":"C"}"#;
        assert!(matches!(parse_suggestions(raw), ParsedReply::Fallback(_)));
    }

    #[test]
    fn truncated_array_is_not_salvaged() {
        let raw = r#"[{"title":"A","content":"B","reasoning":"C"},{"title":"D""#;
        assert_eq!(parse_suggestions(raw), ParsedReply::Fallback(raw.to_string()));
    }

    #[test]
    fn order_is_preserved() {
        let raw = r#"[
            {"title":"Subtle","content":"1","reasoning":"r"},
            {"title":"Bold","content":"2","reasoning":"r"},
            {"title":"Wild","content":"3","reasoning":"r"}
        ]"#;
        let ParsedReply::Suggestions(list) = parse_suggestions(raw) else {
            panic!("expected suggestions");
        };
        let titles: Vec<&str> = list.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, ["Subtle", "Bold", "Wild"]);
    }

    #[test]
    fn empty_stream_falls_back_to_empty_text() {
        let acc = StreamAccumulator::new();
        assert_eq!(acc.finalize(), ParsedReply::Fallback(String::new()));
    }
}
