//! Cursor-based byte parser used by the instruction decoder.
//!
//! [`Parser`] keeps a position inside a borrowed byte slice and validates every read
//! against the remaining data, so malformed or truncated instruction bytes surface as
//! errors instead of panics.
//!
//! # Examples
//!
//! ```rust
//! use symscope::image::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u16>()?, 0x0201);
//! assert_eq!(parser.pos(), 2);
//! # Ok::<(), symscope::Error>(())
//! ```

use crate::{
    image::io::{read_le_at, ByteIO},
    Error::OutOfBounds,
    Result,
};

/// A bounds-checked cursor over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Checks if unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Current offset from the start of the data.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Moves the cursor to an absolute position.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(OutOfBounds);
        }
        self.position = pos;
        Ok(())
    }

    /// Moves the cursor forward by `step` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if this would move past the end of the data.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let Some(target) = self.position.checked_add(step) else {
            return Err(OutOfBounds);
        };
        self.seek(target)
    }

    /// Returns the byte at the cursor without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if no bytes remain.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data.get(self.position).copied().ok_or(OutOfBounds)
    }

    /// Reads a little-endian value and advances past it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if the value does not fit in the remaining data.
    pub fn read_le<T: ByteIO>(&mut self) -> Result<T> {
        read_le_at(self.data, &mut self.position)
    }

    /// Reads `length` raw bytes and advances past them.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(OutOfBounds);
        }
        let bytes = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }

    /// The unread part of the data.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_reads() -> Result<()> {
        let data = [0xAA, 0x01, 0x02, 0x03, 0x04, 0xFF];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_le::<u8>()?, 0xAA);
        assert_eq!(parser.read_le::<u32>()?, 0x0403_0201);
        assert_eq!(parser.remaining(), 1);
        assert_eq!(parser.peek_byte()?, 0xFF);
        assert!(parser.has_more_data());
        assert_eq!(parser.read_le::<i8>()?, -1);
        assert!(!parser.has_more_data());
        Ok(())
    }

    #[test]
    fn test_bounds() -> Result<()> {
        let data = [0x01, 0x02, 0x03];
        let mut parser = Parser::new(&data);

        assert!(parser.read_le::<u32>().is_err());
        assert_eq!(parser.pos(), 0);
        assert!(parser.seek(4).is_err());
        parser.seek(3)?;
        assert!(parser.peek_byte().is_err());
        assert!(parser.advance_by(1).is_err());
        Ok(())
    }

    #[test]
    fn test_read_bytes() -> Result<()> {
        let data = [0x10, 0x20, 0x30, 0x40];
        let mut parser = Parser::new(&data);

        parser.advance_by(1)?;
        assert_eq!(parser.read_bytes(2)?, &[0x20, 0x30]);
        assert_eq!(parser.data(), &[0x40]);
        assert!(parser.read_bytes(2).is_err());
        Ok(())
    }
}
