//! Server-Sent Events line helpers.
//!
//! Frames are `data: <payload>\n\n`. Readers go line by line and ignore anything
//! that is not a `data:` line (comments, `event:`, keep-alives).

/// Sentinel the OpenAI-style chat stream sends after the last delta.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Returns the trimmed payload of a `data:` line, or `None` for any other line.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

/// Incremental line splitter for SSE byte streams.
///
/// Network chunks do not respect line boundaries; bytes are buffered until a `\n`
/// arrives. A trailing `\r` is stripped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk, returning every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(Self::decode(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Flushes a final unterminated line.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        Some(Self::decode(&raw))
    }

    fn decode(raw: &[u8]) -> String {
        String::from_utf8_lossy(raw).trim_end_matches('\r').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_payload() {
        assert_eq!(data_payload("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(data_payload("data:[DONE]"), Some("[DONE]"));
        assert_eq!(data_payload("data: "), Some(""));
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload("event: message"), None);
        assert_eq!(data_payload(""), None);
    }

    #[test]
    fn test_decoder_joins_split_lines() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: {\"content\":\"He").is_empty());
        let lines = decoder.push(b"l\"}\n\ndata: x\r\n");
        assert_eq!(lines, vec!["data: {\"content\":\"Hel\"}", "", "data: x"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_flushes_trailing_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some("data: [DONE]".to_string()));
        assert_eq!(decoder.finish(), None);
    }
}
