//! Sparse symbolic memory.
//!
//! Memory is byte granular. Bytes a path has written live in a persistent ordered map
//! that forks share structurally; everything else falls through to the read-only
//! program image, and finally to the configured [`UninitializedMemory`] policy.
//! Multi-byte values are little-endian.

use std::{fmt, sync::Arc};

use imbl::OrdMap;

use crate::{
    image::BinaryImage,
    symbolic::SymExpr,
    Error, Result,
};

/// How bytes that are neither written nor mapped by the image read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UninitializedMemory {
    /// Unmapped bytes read as zero.
    #[default]
    Zero,
    /// Unmapped bytes read as a free 8-bit variable named after their address.
    Symbolic,
}

/// Byte-addressed memory over a program image.
#[derive(Clone)]
pub struct Memory {
    bytes: OrdMap<u64, SymExpr>,
    image: Arc<dyn BinaryImage>,
    uninitialized: UninitializedMemory,
}

/// Name of the free variable standing for an uninitialized byte.
#[must_use]
pub fn uninitialized_name(address: u64) -> String {
    format!("mem_{address:#x}")
}

impl Memory {
    /// Creates memory backed by `image`.
    #[must_use]
    pub fn new(image: Arc<dyn BinaryImage>, uninitialized: UninitializedMemory) -> Self {
        Memory {
            bytes: OrdMap::new(),
            image,
            uninitialized,
        }
    }

    /// The program image backing unwritten bytes.
    #[must_use]
    pub fn image(&self) -> &Arc<dyn BinaryImage> {
        &self.image
    }

    /// The policy for bytes that are neither written nor mapped.
    #[must_use]
    pub fn uninitialized(&self) -> UninitializedMemory {
        self.uninitialized
    }

    /// Reads one byte.
    #[must_use]
    pub fn read_byte(&self, address: u64) -> SymExpr {
        if let Some(value) = self.bytes.get(&address) {
            return value.clone();
        }
        if let Some(byte) = self.image.read_byte(address) {
            return SymExpr::byte(byte);
        }
        match self.uninitialized {
            UninitializedMemory::Zero => SymExpr::byte(0),
            UninitializedMemory::Symbolic => SymExpr::variable(uninitialized_name(address), 8)
                .unwrap_or_else(|_| SymExpr::byte(0)),
        }
    }

    /// Writes one 8-bit value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WidthMismatch`] if `value` is not 8 bits wide.
    pub fn write_byte(&mut self, address: u64, value: SymExpr) -> Result<()> {
        if value.width() != 8 {
            return Err(Error::WidthMismatch {
                operation: "write_byte",
                expected: 8,
                found: value.width(),
            });
        }
        self.bytes.insert(address, value);
        Ok(())
    }

    /// Reads `size` bytes starting at `address` as one little-endian value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if `size` is zero or larger than 8.
    pub fn read(&self, address: u64, size: u8) -> Result<SymExpr> {
        if size == 0 || size > 8 {
            return Err(Error::InvalidWidth(u32::from(size) * 8));
        }

        let mut value = self.read_byte(address.wrapping_add(u64::from(size) - 1));
        for i in (0..u64::from(size) - 1).rev() {
            value = SymExpr::concat(value, self.read_byte(address.wrapping_add(i)))?;
        }
        Ok(value)
    }

    /// Writes `value` little-endian starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWidth`] if the width of `value` is not a whole number of bytes.
    pub fn write(&mut self, address: u64, value: &SymExpr) -> Result<()> {
        let width = value.width();
        if width % 8 != 0 {
            return Err(Error::InvalidWidth(width));
        }

        for i in 0..width / 8 {
            let byte = SymExpr::extract(i * 8 + 7, i * 8, value.clone())?;
            self.bytes.insert(address.wrapping_add(u64::from(i)), byte);
        }
        Ok(())
    }

    /// Writes concrete bytes starting at `address`.
    pub fn write_bytes(&mut self, address: u64, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            self.bytes
                .insert(address.wrapping_add(i as u64), SymExpr::byte(*byte));
        }
    }

    /// Addresses this path has written, in ascending order.
    pub fn written_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.bytes.keys().copied()
    }

    /// Number of bytes this path has written.
    #[must_use]
    pub fn written_len(&self) -> usize {
        self.bytes.len()
    }

    /// Reads `len` bytes as individual 8-bit expressions.
    #[must_use]
    pub fn read_bytes(&self, address: u64, len: usize) -> Vec<SymExpr> {
        (0..len as u64)
            .map(|i| self.read_byte(address.wrapping_add(i)))
            .collect()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("written", &self.bytes.len())
            .field("uninitialized", &self.uninitialized)
            .finish_non_exhaustive()
    }
}
