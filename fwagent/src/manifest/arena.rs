//! Fixed-capacity byte arena for parsed manifest strings.

use crate::error::{AgentError, AgentResult};

/// A bounded view into a [`ScratchArena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    offset: usize,
    len: usize,
}

impl Span {
    /// Length of the viewed bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view is empty (field absent or empty string).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Append-only byte buffer that never grows past its capacity.
///
/// Strings extracted from a manifest are copied here once; the manifest model
/// refers to them by [`Span`].
#[derive(Debug, Clone)]
pub struct ScratchArena {
    bytes: Vec<u8>,
    capacity: usize,
    exhausted: bool,
}

impl ScratchArena {
    /// Create an empty arena holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            capacity,
            exhausted: false,
        }
    }

    /// Copy `data` into the arena.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::BufferExhausted`] if `data` does not fit; the
    /// arena is left unchanged and remembers the failure.
    pub fn push(&mut self, data: &[u8]) -> AgentResult<Span> {
        if data.len() > self.remaining() {
            self.exhausted = true;
            return Err(AgentError::BufferExhausted("manifest scratch buffer"));
        }
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(data);
        Ok(Span {
            offset,
            len: data.len(),
        })
    }

    /// Bytes behind a span; empty for spans from another arena.
    pub fn bytes(&self, span: Span) -> &[u8] {
        self.bytes
            .get(span.offset..span.offset + span.len)
            .unwrap_or_default()
    }

    /// Text behind a span.
    ///
    /// Only whole `&str` values are pushed by the parser, so views are valid
    /// UTF-8; anything else reads as empty.
    pub fn text(&self, span: Span) -> &str {
        std::str::from_utf8(self.bytes(span)).unwrap_or_default()
    }

    /// Everything stored so far.
    pub fn contents(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes used so far.
    pub fn used(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a push has been refused for lack of room.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_read_back() {
        let mut arena = ScratchArena::with_capacity(16);
        let a = arena.push(b"hello").unwrap();
        let b = arena.push(b"world").unwrap();

        assert_eq!(arena.text(a), "hello");
        assert_eq!(arena.text(b), "world");
        assert_eq!(arena.used(), 10);
        assert_eq!(arena.remaining(), 6);
    }

    #[test]
    fn test_push_past_capacity_fails_without_writing() {
        let mut arena = ScratchArena::with_capacity(4);
        arena.push(b"abc").unwrap();

        let result = arena.push(b"de");
        assert!(matches!(result, Err(AgentError::BufferExhausted(_))));
        assert!(arena.is_exhausted());
        assert_eq!(arena.used(), 3);
    }

    #[test]
    fn test_exact_fit() {
        let mut arena = ScratchArena::with_capacity(3);
        let span = arena.push(b"abc").unwrap();
        assert_eq!(arena.remaining(), 0);
        assert_eq!(arena.bytes(span), b"abc");
        assert!(!arena.is_exhausted());
    }

    #[test]
    fn test_default_span_is_empty() {
        let arena = ScratchArena::with_capacity(8);
        assert!(Span::default().is_empty());
        assert_eq!(arena.text(Span::default()), "");
    }

    #[test]
    fn test_foreign_span_reads_empty() {
        let mut big = ScratchArena::with_capacity(64);
        big.push(&[b'x'; 40]).unwrap();
        let far = big.push(b"tail").unwrap();

        let small = ScratchArena::with_capacity(8);
        assert_eq!(small.bytes(far), b"");
    }
}
