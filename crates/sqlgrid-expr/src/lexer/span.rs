//! Source location tracking for tokens and syntax nodes.

/// Byte range plus the 1-based line it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Line of `start`, counting from 1.
    pub line: u32,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: usize, end: usize, line: u32) -> Self {
        Self { start, end, line }
    }

    /// Merges two spans into one that covers both. Keeps the earlier line.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        let (start, line) = if self.start <= other.start {
            (self.start, self.line)
        } else {
            (other.start, other.line)
        };
        let end = if self.end > other.end {
            self.end
        } else {
            other.end
        };
        Self { start, end, line }
    }
}
