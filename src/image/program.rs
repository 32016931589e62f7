//! In-memory program image.

use std::collections::HashMap;

use crate::{
    assembly::{decode, DecodeError, Instruction},
    error::config_error,
    image::BinaryImage,
    Result,
};

/// A contiguous block of bytes mapped at a base address.
#[derive(Debug, Clone)]
pub struct Region {
    base: u64,
    bytes: Vec<u8>,
    executable: bool,
}

impl Region {
    /// First address of the region.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// One past the last address of the region.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    /// Contents of the region.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Checks if instructions may be fetched from this region.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.executable
    }

    /// Checks if `address` lies inside the region.
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    fn offset(&self, address: u64) -> Option<usize> {
        if self.contains(address) {
            usize::try_from(address - self.base).ok()
        } else {
            None
        }
    }
}

/// A program held entirely in memory: code regions, data regions and named symbols.
///
/// This is the image the [`crate::assembly::ProgramAssembler`] produces, and also a
/// convenient target for a loader that has already mapped a binary.
///
/// # Examples
///
/// ```rust
/// use symscope::image::{BinaryImage, Program};
///
/// // halt
/// let program = Program::new(0x1000)
///     .with_code(0x1000, vec![0x0C])?
///     .with_data(0x2000, b"key".to_vec())?;
///
/// assert!(program.is_code(0x1000));
/// assert_eq!(program.read_byte(0x2001), Some(b'e'));
/// assert!(program.decode(0x2000).is_err());
/// # Ok::<(), symscope::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Program {
    regions: Vec<Region>,
    entry: u64,
    symbols: HashMap<String, u64>,
}

impl Program {
    /// Creates an empty program that starts executing at `entry`.
    #[must_use]
    pub fn new(entry: u64) -> Self {
        Program {
            regions: Vec::new(),
            entry,
            symbols: HashMap::new(),
        }
    }

    /// Maps an executable region at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if the region is empty, wraps the address
    /// space or overlaps an existing region.
    pub fn with_code(mut self, base: u64, bytes: Vec<u8>) -> Result<Self> {
        self.map(base, bytes, true)?;
        Ok(self)
    }

    /// Maps a non-executable data region at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if the region is empty, wraps the address
    /// space or overlaps an existing region.
    pub fn with_data(mut self, base: u64, bytes: Vec<u8>) -> Result<Self> {
        self.map(base, bytes, false)?;
        Ok(self)
    }

    /// Names an address.
    pub fn add_symbol(&mut self, name: impl Into<String>, address: u64) {
        self.symbols.insert(name.into(), address);
    }

    /// All named addresses.
    #[must_use]
    pub fn symbols(&self) -> &HashMap<String, u64> {
        &self.symbols
    }

    /// Mapped regions, ordered by base address.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Finds the region containing `address`.
    #[must_use]
    pub fn region(&self, address: u64) -> Option<&Region> {
        let idx = self.regions.partition_point(|r| r.base <= address);
        let region = self.regions.get(idx.checked_sub(1)?)?;
        region.contains(address).then_some(region)
    }

    fn map(&mut self, base: u64, bytes: Vec<u8>, executable: bool) -> Result<()> {
        if bytes.is_empty() {
            return Err(config_error!("Region at {:#x} is empty", base));
        }
        if base.checked_add(bytes.len() as u64).is_none() {
            return Err(config_error!("Region at {:#x} wraps the address space", base));
        }

        let region = Region {
            base,
            bytes,
            executable,
        };
        if let Some(other) = self
            .regions
            .iter()
            .find(|r| r.base < region.end() && region.base < r.end())
        {
            return Err(config_error!(
                "Region {:#x}..{:#x} overlaps {:#x}..{:#x}",
                region.base,
                region.end(),
                other.base,
                other.end()
            ));
        }

        let idx = self.regions.partition_point(|r| r.base < region.base);
        self.regions.insert(idx, region);
        Ok(())
    }
}

impl BinaryImage for Program {
    fn decode(&self, address: u64) -> std::result::Result<Instruction, DecodeError> {
        let region = self
            .region(address)
            .filter(|r| r.executable)
            .ok_or(DecodeError::OutsideCode { address })?;
        let offset = region
            .offset(address)
            .ok_or(DecodeError::OutsideCode { address })?;
        decode(&region.bytes[offset..], address)
    }

    fn read_byte(&self, address: u64) -> Option<u8> {
        let region = self.region(address)?;
        region.bytes.get(region.offset(address)?).copied()
    }

    fn is_code(&self, address: u64) -> bool {
        self.region(address).is_some_and(Region::is_executable)
    }

    fn entry(&self) -> u64 {
        self.entry
    }

    fn symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }
}
