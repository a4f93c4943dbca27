// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Rolling reassembly buffer for newline-delimited frames.
///
/// Bytes arrive in arbitrary chunks; `push` yields every line completed by
/// the chunk and retains the trailing partial for the next read. Blank
/// lines are swallowed so a lone `\n` between messages is not an error.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = vec![];
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if let Some(line) = complete(&line) {
                lines.push(line);
            }
        }
        lines
    }

    /// Drains whatever is left as one final line, for connection close.
    pub fn drain_remainder(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        complete(&rest)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn complete(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_across_arbitrary_chunk_boundaries() {
        let payload = b"{\"a\":1}\n{\"b\":2}\n";
        for split in 1..payload.len() - 1 {
            let mut buffer = LineBuffer::new();
            let mut lines = buffer.push(&payload[..split]);
            lines.extend(buffer.push(&payload[split..]));
            assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"], "split at {split}");
            assert!(buffer.is_empty());
        }
    }

    #[test]
    fn multiple_lines_in_one_chunk_are_all_yielded() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"one\ntwo\nthree\n");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn blank_lines_are_swallowed() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"one\n\n\ntwo\n");
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn partial_tail_is_retained_until_completed() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"half\":").is_empty());
        assert!(!buffer.is_empty());
        assert_eq!(buffer.push(b"true}\n"), vec!["{\"half\":true}"]);
    }

    #[test]
    fn remainder_drains_as_a_final_line() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"done\nleftover");
        assert_eq!(buffer.drain_remainder(), Some("leftover".to_string()));
        assert_eq!(buffer.drain_remainder(), None);
    }
}
