//! Both ends of the streaming protocol.
//!
//! Upstream: the completion API sends OpenAI-style `data: {...}` lines.
//! [`LineSplitter`] reassembles lines across arbitrary chunk boundaries and
//! [`parse_line`] turns each line into a [`Frame`]. Parsing is lenient: a
//! line that is not valid JSON is reported as [`Frame::Malformed`] and the
//! caller skips it without ending the stream.
//!
//! Downstream: [`RelayEvent`] is what the browser receives, one
//! `data: <json>\n\n` frame per event.

use axum::response::sse::Event;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::RelayError;

const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of parsing one upstream line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Blank line, `[DONE]`, or an SSE comment such as `: OPENROUTER PROCESSING`.
    Ignored,
    /// Valid JSON carrying a non-empty content delta.
    Content(String),
    /// Valid JSON without content (role-only delta, usage, ...).
    Empty,
    /// Not JSON. Holds the parser message for logging.
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

pub fn parse_line(line: &str) -> Frame {
    let line = line.trim();
    if line.starts_with(':') {
        return Frame::Ignored;
    }
    let data = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    if data.is_empty() || data == DONE_SENTINEL {
        return Frame::Ignored;
    }

    let payload: ChunkPayload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => return Frame::Malformed(e.to_string()),
    };

    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .unwrap_or_default();

    if content.is_empty() {
        Frame::Empty
    } else {
        Frame::Content(content)
    }
}

/// Splits a byte stream into lines, carrying partial lines between chunks.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    /// Feed a chunk and get back every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    /// Whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// One event sent to the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Content(String),
    Error(RelayError),
    Done,
}

impl RelayEvent {
    pub fn payload(&self) -> Value {
        match self {
            RelayEvent::Content(content) => json!({ "content": content }),
            RelayEvent::Error(err) => json!({ "error": err.to_string(), "kind": err.kind() }),
            RelayEvent::Done => json!({ "done": true }),
        }
    }

    pub fn into_sse(self) -> Event {
        Event::default().data(self.payload().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_frame() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_line(line), Frame::Content("Hel".to_string()));
    }

    #[test]
    fn test_prefix_is_optional() {
        let line = r#"{"choices":[{"delta":{"content":"lo"}}]}"#;
        assert_eq!(parse_line(line), Frame::Content("lo".to_string()));
    }

    #[test]
    fn test_done_and_blank_are_ignored() {
        assert_eq!(parse_line("data: [DONE]"), Frame::Ignored);
        assert_eq!(parse_line("[DONE]"), Frame::Ignored);
        assert_eq!(parse_line(""), Frame::Ignored);
        assert_eq!(parse_line("   \r"), Frame::Ignored);
        assert_eq!(parse_line("data: "), Frame::Ignored);
    }

    #[test]
    fn test_comment_is_ignored() {
        assert_eq!(parse_line(": OPENROUTER PROCESSING"), Frame::Ignored);
    }

    #[test]
    fn test_role_only_delta_is_empty() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_line(line), Frame::Empty);
        assert_eq!(parse_line(r#"data: {"choices":[]}"#), Frame::Empty);
        assert_eq!(parse_line(r#"data: {"usage":{"total_tokens":3}}"#), Frame::Empty);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_line("data: {not json"), Frame::Malformed(_)));
    }

    #[test]
    fn test_splitter_joins_lines_across_chunks() {
        let mut splitter = LineSplitter::default();
        assert!(splitter.push(b"data: {\"a\"").is_empty());
        let lines = splitter.push(b":1}\r\n\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}\r".to_string(), String::new()]);
        assert!(splitter.push(b"NE]").is_empty());
        assert_eq!(splitter.finish(), Some("data: [DONE]".to_string()));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_keeps_multibyte_chars_intact() {
        let text = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n";
        let bytes = text.as_bytes();
        let split = bytes.iter().position(|&b| b == 0xc3).unwrap() + 1;

        let mut splitter = LineSplitter::default();
        assert!(splitter.push(&bytes[..split]).is_empty());
        let lines = splitter.push(&bytes[split..]);
        assert_eq!(parse_line(&lines[0]), Frame::Content("héllo".to_string()));
    }

    #[test]
    fn test_event_payloads() {
        assert_eq!(RelayEvent::Content("x".into()).payload(), json!({"content": "x"}));
        assert_eq!(RelayEvent::Done.payload(), json!({"done": true}));
        assert_eq!(
            RelayEvent::Error(RelayError::RateLimit).payload(),
            json!({"error": "Rate limit exceeded. Please try again later.", "kind": "rate_limit"})
        );
    }
}
