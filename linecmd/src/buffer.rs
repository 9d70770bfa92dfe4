//! Accumulating incoming bytes into lines.

use crate::{DEFAULT_BUFFER_SIZE, DELIMITERS};

/// A fixed-size line buffer with a write cursor.
///
/// Bytes are pushed one at a time. When a delimiter arrives, the line
/// before it is available from [LineBuffer::line()] until the next
/// [LineBuffer::clear()].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineBuffer<const SIZE: usize = DEFAULT_BUFFER_SIZE> {
    pos: usize,
    buffer: [u8; SIZE],
}

impl<const SIZE: usize> LineBuffer<SIZE> {
    pub const fn new() -> Self {
        Self {
            pos: 0,
            buffer: [0u8; SIZE],
        }
    }

    /// Returns [true] if there is no room for another byte.
    pub fn is_full(&self) -> bool {
        self.pos >= SIZE
    }

    /// The number of bytes stored since the last clear.
    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Throw away everything and start over at the front.
    pub fn clear(&mut self) {
        self.pos = 0;
    }

    /// Store a byte at the cursor.
    ///
    /// If the byte is a delimiter, the cursor does not move and this
    /// returns the length of the line before it. Otherwise the cursor
    /// advances and this returns [None].
    ///
    /// The buffer must not be full. Check [Self::is_full()] first.
    pub fn push(&mut self, byte: u8) -> Option<usize> {
        // unreachable when callers check is_full, but don't index past the end
        if self.is_full() {
            self.clear();
        }

        self.buffer[self.pos] = byte;
        if DELIMITERS.contains(&byte) {
            Some(self.pos)
        } else {
            self.pos += 1;
            None
        }
    }

    /// The first `len` bytes, as returned from [Self::push()].
    pub fn line(&self, len: usize) -> &[u8] {
        &self.buffer[..len.min(SIZE)]
    }
}

impl<const SIZE: usize> Default for LineBuffer<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
