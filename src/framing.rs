//! Delimiter reassembly for stream reads.
//!
//! Both client variants feed the chunks they read into a [`DelimiterBuffer`].
//! The buffer keeps every chunk that arrived without a delimiter and, once a
//! chunk containing the delimiter shows up, joins everything before it into
//! one record.
//!
//! ## Search scope
//!
//! The delimiter is only looked for inside the chunk that was just pushed,
//! never across the accumulated chunks. A multi-byte delimiter that arrives
//! split over two reads is therefore not recognized:
//!
//! ```text
//! push("ab\r")   -> pending ["ab\r"]
//! push("\ncd")   -> pending ["ab\r", "\ncd"]   (no match for "\r\n")
//! ```
//!
//! Likewise a remainder carried over from the previous record is not searched
//! again; the next record ends at the next delimiter that arrives on the wire.

use bytes::{Bytes, BytesMut};

/// Pending chunks of a byte stream awaiting their delimiter.
#[derive(Debug, Default, Clone)]
pub struct DelimiterBuffer {
    pending: Vec<Bytes>,
}

impl DelimiterBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one freshly read chunk.
    ///
    /// Returns the completed record (without the delimiter) when `chunk`
    /// contains `delimiter`. The pending chunks are then replaced by the
    /// single remainder following the first delimiter, even when that
    /// remainder is empty. Otherwise the chunk is appended and `None` is
    /// returned.
    pub fn push(&mut self, chunk: Bytes, delimiter: &[u8]) -> Option<Bytes> {
        let Some(pos) = find_delimiter(&chunk, delimiter) else {
            self.pending.push(chunk);
            return None;
        };

        let head = chunk.slice(..pos);
        let tail = chunk.slice(pos + delimiter.len()..);

        let size = self.len() + head.len();
        let mut record = BytesMut::with_capacity(size);
        for part in self.pending.drain(..) {
            record.extend_from_slice(&part);
        }
        record.extend_from_slice(&head);

        self.pending.push(tail);
        Some(record.freeze())
    }

    /// The pending chunks, earliest first.
    pub fn chunks(&self) -> &[Bytes] {
        &self.pending
    }

    /// Total number of pending bytes.
    pub fn len(&self) -> usize {
        self.pending.iter().map(Bytes::len).sum()
    }

    /// True when no bytes are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all pending chunks.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Position of the first occurrence of `delimiter` in `chunk`.
///
/// An empty delimiter never matches.
pub fn find_delimiter(chunk: &[u8], delimiter: &[u8]) -> Option<usize> {
    if delimiter.is_empty() || chunk.len() < delimiter.len() {
        return None;
    }
    chunk
        .windows(delimiter.len())
        .position(|window| window == delimiter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_delimiter() {
        assert_eq!(find_delimiter(b"Test\nmessage", b"\n"), Some(4));
        assert_eq!(find_delimiter(b"a\r\nb\r\n", b"\r\n"), Some(1));
        assert_eq!(find_delimiter(b"no newline", b"\n"), None);
        assert_eq!(find_delimiter(b"\n", b"\r\n"), None);
        assert_eq!(find_delimiter(b"anything", b""), None);
    }

    #[test]
    fn test_record_in_single_chunk() {
        let mut buffer = DelimiterBuffer::new();
        let record = buffer.push(Bytes::from_static(b"Test\nmessage"), b"\n");

        assert_eq!(record.as_deref(), Some(&b"Test"[..]));
        assert_eq!(buffer.chunks(), &[Bytes::from_static(b"message")]);
    }

    #[test]
    fn test_record_across_chunks() {
        let mut buffer = DelimiterBuffer::new();
        assert!(buffer.push(Bytes::from_static(b"Test "), b"\n").is_none());
        assert!(buffer.push(Bytes::from_static(b"mess"), b"\n").is_none());
        assert_eq!(buffer.len(), 9);

        let record = buffer.push(Bytes::from_static(b"age\nHello"), b"\n");
        assert_eq!(record.as_deref(), Some(&b"Test message"[..]));
        assert_eq!(buffer.chunks(), &[Bytes::from_static(b"Hello")]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = DelimiterBuffer::new();
        let mut record = None;
        for byte in b"Test message\nHello" {
            record = buffer.push(Bytes::copy_from_slice(&[*byte]), b"\n");
            if record.is_some() {
                break;
            }
        }

        assert_eq!(record.as_deref(), Some(&b"Test message"[..]));
        // The delimiter byte was the whole chunk, so the remainder is empty.
        assert_eq!(buffer.chunks(), &[Bytes::new()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_only_first_delimiter_splits() {
        let mut buffer = DelimiterBuffer::new();
        let record = buffer.push(Bytes::from_static(b"one\ntwo\nthree"), b"\n");

        assert_eq!(record.as_deref(), Some(&b"one"[..]));
        assert_eq!(buffer.chunks(), &[Bytes::from_static(b"two\nthree")]);
    }

    #[test]
    fn test_remainder_seeds_next_record() {
        let mut buffer = DelimiterBuffer::new();
        buffer.push(Bytes::from_static(b"first\nsec"), b"\n");

        let record = buffer.push(Bytes::from_static(b"ond\n"), b"\n");
        assert_eq!(record.as_deref(), Some(&b"second"[..]));
        assert_eq!(buffer.chunks(), &[Bytes::new()]);
    }

    #[test]
    fn test_delimiter_split_across_chunks_is_not_found() {
        let mut buffer = DelimiterBuffer::new();
        assert!(buffer.push(Bytes::from_static(b"ab\r"), b"\r\n").is_none());
        assert!(buffer.push(Bytes::from_static(b"\ncd"), b"\r\n").is_none());
        assert_eq!(buffer.chunks().len(), 2);

        // Only a delimiter wholly inside a later chunk completes the record.
        let record = buffer.push(Bytes::from_static(b"e\r\n"), b"\r\n");
        assert_eq!(record.as_deref(), Some(&b"ab\r\ncde"[..]));
    }

    #[test]
    fn test_multi_byte_delimiter() {
        let mut buffer = DelimiterBuffer::new();
        let record = buffer.push(Bytes::from_static(b"GET / HTTP/1.1\r\nHost"), b"\r\n");

        assert_eq!(record.as_deref(), Some(&b"GET / HTTP/1.1"[..]));
        assert_eq!(buffer.chunks(), &[Bytes::from_static(b"Host")]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = DelimiterBuffer::new();
        buffer.push(Bytes::from_static(b"partial"), b"\n");
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.chunks().is_empty());
    }
}
