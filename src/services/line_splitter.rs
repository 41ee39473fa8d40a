//! Incremental line assembly for child process output
//!
//! Child stdout/stderr arrives in arbitrary chunks; readiness scanning
//! needs whole lines. The splitter buffers the trailing partial line
//! between feeds.

/// Stateful byte-stream to line converter
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a chunk and return every line it completed
    ///
    /// Lines are split on `\n`; a trailing `\r` is stripped. Bytes that
    /// are not valid UTF-8 are replaced rather than dropped, since log
    /// lines must survive for readiness scanning.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Return the unterminated final line, if any
    ///
    /// Called once the stream has closed.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_complete_line() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.feed(b"hello\n"), vec!["hello".to_string()]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.feed(b"Running on http://").is_empty());
        assert!(splitter.feed(b"127.0.0.1:5000").is_empty());
        assert_eq!(
            splitter.feed(b"/\nnext"),
            vec!["Running on http://127.0.0.1:5000/".to_string()]
        );
        assert_eq!(splitter.finish(), Some("next".to_string()));
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut splitter = LineSplitter::new();
        assert_eq!(
            splitter.feed(b"a\nb\nc\n"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_crlf_endings_are_stripped() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.feed(b"one\r\ntwo\r\n"), vec!["one", "two"]);
    }

    #[test]
    fn test_empty_lines_are_preserved() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.feed(b"\n\n"), vec!["", ""]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_dropped() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.feed(b"ok \xff here\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok "));
        assert!(lines[0].ends_with(" here"));
    }

    #[test]
    fn test_finish_strips_trailing_carriage_return() {
        let mut splitter = LineSplitter::new();
        splitter.feed(b"partial\r");
        assert_eq!(splitter.finish(), Some("partial".to_string()));
        assert_eq!(splitter.finish(), None);
    }
}
