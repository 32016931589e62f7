//! Per-path input streams.
//!
//! A stream models an open file descriptor (standard input, a socket, a file) as a
//! sequence of byte expressions and a read cursor. Reading never blocks; a read past
//! the end returns fewer bytes, as a short read would.

use imbl::Vector;

use crate::{symbolic::SymExpr, Result};

/// A readable byte stream whose contents may be symbolic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicStream {
    bytes: Vector<SymExpr>,
    position: usize,
}

/// Name of the free variable for byte `index` of a symbolic stream.
#[must_use]
pub fn stream_byte_name(name: &str, index: usize) -> String {
    format!("{name}[{index}]")
}

impl SymbolicStream {
    /// Creates a stream of `len` fresh 8-bit variables named `name[0]`, `name[1]`, ...
    ///
    /// # Errors
    ///
    /// Never fails for 8-bit variables; the `Result` mirrors [`SymExpr::variable`].
    pub fn symbolic(name: &str, len: usize) -> Result<Self> {
        let bytes = (0..len)
            .map(|i| SymExpr::variable(stream_byte_name(name, i), 8))
            .collect::<Result<Vector<_>>>()?;
        Ok(SymbolicStream { bytes, position: 0 })
    }

    /// Creates a stream with known contents.
    #[must_use]
    pub fn concrete(data: &[u8]) -> Self {
        SymbolicStream {
            bytes: data.iter().map(|b| SymExpr::byte(*b)).collect(),
            position: 0,
        }
    }

    /// Consumes up to `count` bytes from the cursor.
    pub fn read(&mut self, count: usize) -> Vec<SymExpr> {
        let end = self.position.saturating_add(count).min(self.bytes.len());
        let out: Vec<SymExpr> = self
            .bytes
            .iter()
            .skip(self.position)
            .take(end - self.position)
            .cloned()
            .collect();
        self.position = end;
        out
    }

    /// Every byte of the stream, read or not.
    #[must_use]
    pub fn bytes(&self) -> Vec<SymExpr> {
        self.bytes.iter().cloned().collect()
    }

    /// Total length of the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Checks if the stream holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of bytes consumed so far.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_read() -> Result<()> {
        let mut stream = SymbolicStream::symbolic("stdin", 3)?;
        let first = stream.read(2);
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].as_var(), Some("stdin[1]"));

        let rest = stream.read(10);
        assert_eq!(rest.len(), 1);
        assert_eq!(stream.remaining(), 0);
        assert!(stream.read(1).is_empty());
        Ok(())
    }

    #[test]
    fn test_concrete_stream() {
        let mut stream = SymbolicStream::concrete(b"ok");
        let bytes = stream.read(2);
        assert_eq!(bytes[0].as_const(), Some(u64::from(b'o')));
        assert_eq!(stream.position(), 2);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn test_forked_cursor_is_independent() -> Result<()> {
        let mut parent = SymbolicStream::symbolic("in", 4)?;
        parent.read(1);
        let mut child = parent.clone();
        child.read(2);
        assert_eq!(parent.position(), 1);
        assert_eq!(child.position(), 3);
        Ok(())
    }
}
