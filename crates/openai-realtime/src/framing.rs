//! Reassembly of inbound messages and splitting into individual JSON events.

use std::str::Utf8Error;

/// Accumulates fragments of one logical message until its final fragment.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    pending: Vec<u8>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment. Returns the decoded text once `is_final` is seen.
    ///
    /// The pending buffer is reset whether or not decoding succeeds, so one
    /// corrupt message never poisons the next.
    pub fn push(&mut self, fragment: &[u8], is_final: bool) -> Option<Result<String, Utf8Error>> {
        self.pending.extend_from_slice(fragment);
        if !is_final {
            return None;
        }
        let bytes = std::mem::take(&mut self.pending);
        Some(match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => Err(e.utf8_error()),
        })
    }

    /// Number of bytes buffered for the message currently being assembled.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Splits a text payload on newlines and keeps only lines that look like
/// JSON objects. Blank lines are skipped silently.
pub fn split_events(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').filter_map(|line| {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if line.starts_with('{') {
            Some(line)
        } else {
            tracing::debug!(len = line.len(), "skipping non-JSON inbound line");
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_fragment_message() {
        let mut assembler = MessageAssembler::new();
        let text = assembler.push(br#"{"type":"x"}"#, true).unwrap().unwrap();
        assert_eq!(text, r#"{"type":"x"}"#);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_message_split_across_reads() {
        let mut assembler = MessageAssembler::new();
        assert!(assembler.push(br#"{"type":"#, false).is_none());
        assert!(assembler.push(br#""response"#, false).is_none());
        assert_eq!(assembler.pending_len(), 17);
        let text = assembler.push(br#".done"}"#, true).unwrap().unwrap();
        assert_eq!(text, r#"{"type":"response.done"}"#);
    }

    #[test]
    fn test_multibyte_char_split_between_fragments() {
        let mut assembler = MessageAssembler::new();
        let bytes = "é".as_bytes();
        assert!(assembler.push(&bytes[..1], false).is_none());
        assert_eq!(assembler.push(&bytes[1..], true).unwrap().unwrap(), "é");
    }

    #[test]
    fn test_invalid_utf8_resets_buffer() {
        let mut assembler = MessageAssembler::new();
        assert!(assembler.push(&[0xff, 0xfe], true).unwrap().is_err());
        assert_eq!(assembler.pending_len(), 0);
        assert_eq!(assembler.push(b"{}", true).unwrap().unwrap(), "{}");
    }

    #[test]
    fn test_split_events_skips_blank_and_non_json_lines() {
        let text = "{\"a\":1}\n\n  {\"b\":2}  \nping\n";
        let lines: Vec<&str> = split_events(text).collect();
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_split_events_handles_crlf() {
        let lines: Vec<&str> = split_events("{\"a\":1}\r\n{\"b\":2}\r\n").collect();
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
    }
}
