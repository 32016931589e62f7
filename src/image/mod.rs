//! Addressable code and data images.
//!
//! The engine never parses executable formats. It consumes an already mapped image
//! through the [`BinaryImage`] trait: instruction decoding at an address, raw byte
//! reads for memory that a path has not written yet, and symbol lookup to help callers
//! pick find and avoid addresses.
//!
//! # Key Components
//!
//! - [`BinaryImage`] - The interface the engine consumes
//! - [`Program`] - In-memory image of code and data regions
//! - [`Parser`] - Bounds-checked byte cursor used by the decoder
//! - [`ByteIO`] - Little-endian primitive conversions
//!
//! # Thread Safety
//!
//! Images are read-only during exploration; the trait requires `Send + Sync` so a
//! single image can be shared by every worker.

pub mod io;
mod parser;
mod program;

pub use io::ByteIO;
pub use parser::Parser;
pub use program::{Program, Region};

use crate::assembly::{DecodeError, Instruction};

/// Read-only view of a loaded program.
///
/// Implementations must be deterministic: the same address always decodes to the same
/// instruction and reads the same byte.
pub trait BinaryImage: Send + Sync {
    /// Decodes the instruction at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::OutsideCode`] when `address` is not inside executable
    /// memory, or another [`DecodeError`] when the bytes are malformed.
    fn decode(&self, address: u64) -> Result<Instruction, DecodeError>;

    /// Reads the initial value of a mapped byte, or `None` for unmapped addresses.
    fn read_byte(&self, address: u64) -> Option<u8>;

    /// Checks if `address` lies inside executable memory.
    fn is_code(&self, address: u64) -> bool;

    /// Address where execution starts.
    fn entry(&self) -> u64;

    /// Resolves a symbol name to an address.
    fn symbol(&self, name: &str) -> Option<u64>;
}
