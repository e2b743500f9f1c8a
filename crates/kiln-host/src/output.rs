use std::collections::VecDeque;

/// Bounded capture of one child output stream.
///
/// Chunks are appended exactly as they arrive (no line splitting) and only
/// read back when a failure report is assembled. The ring is capped in bytes;
/// the oldest chunks are evicted first, but the most recent chunk is always
/// kept even if it alone exceeds the cap.
#[derive(Debug)]
pub struct OutputBuffer {
    max_bytes: usize,
    bytes: usize,
    chunks: VecDeque<String>,
}

impl OutputBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            bytes: 0,
            chunks: VecDeque::new(),
        }
    }

    pub fn append(&mut self, chunk: String) {
        self.bytes = self.bytes.saturating_add(chunk.len());
        self.chunks.push_back(chunk);
        while self.bytes > self.max_bytes && self.chunks.len() > 1 {
            if let Some(evicted) = self.chunks.pop_front() {
                self.bytes = self.bytes.saturating_sub(evicted.len());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenated best-effort view at the time of the call; the buffer may
    /// still receive chunks afterwards.
    pub fn snapshot(&self) -> String {
        self.chunks.iter().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_preserve_arrival_order() {
        let mut buf = OutputBuffer::new(1024);
        buf.append("alpha ".to_string());
        buf.append("beta".to_string());
        assert_eq!(buf.snapshot(), "alpha beta");
    }

    #[test]
    fn evicts_oldest_chunks_past_the_cap() {
        let mut buf = OutputBuffer::new(10);
        buf.append("aaaaa".to_string());
        buf.append("bbbbb".to_string());
        buf.append("ccccc".to_string());
        assert_eq!(buf.snapshot(), "bbbbbccccc");
    }

    #[test]
    fn keeps_the_latest_chunk_even_when_oversized() {
        let mut buf = OutputBuffer::new(4);
        buf.append("tiny".to_string());
        buf.append("a-chunk-larger-than-the-cap".to_string());
        assert_eq!(buf.snapshot(), "a-chunk-larger-than-the-cap");
    }

    #[test]
    fn fresh_buffer_is_empty() {
        let buf = OutputBuffer::new(16);
        assert!(buf.is_empty());
        assert_eq!(buf.snapshot(), "");
    }
}
