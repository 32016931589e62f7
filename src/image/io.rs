//! Endian-aware primitive conversions for the instruction encoding.
//!
//! Every multi-byte field in an encoded instruction is little-endian. [`ByteIO`] is
//! implemented for the fixed-width integers the encoding uses, and the free functions
//! in this module read or append them with bounds checking.

use crate::{Error::OutOfBounds, Result};

/// Fixed-width integers that can be read from and written to byte buffers.
pub trait ByteIO: Sized + Copy {
    /// The byte array holding one encoded value.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decodes a value from little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Encodes a value as little-endian bytes.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_byte_io {
    ($($ty:ty),*) => {
        $(
            impl ByteIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_byte_io!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Reads a little-endian `T` at `offset`, advancing the offset past it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_le_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Reads a little-endian `T` from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: ByteIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Appends `value` to `buffer` in little-endian order.
pub fn write_le<T: ByteIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn test_read_le_widths() -> Result<()> {
        assert_eq!(read_le::<u8>(&TEST_BUFFER)?, 0x01);
        assert_eq!(read_le::<u16>(&TEST_BUFFER)?, 0x0201);
        assert_eq!(read_le::<u32>(&TEST_BUFFER)?, 0x0403_0201);
        assert_eq!(read_le::<u64>(&TEST_BUFFER)?, 0x0807_0605_0403_0201);
        Ok(())
    }

    #[test]
    fn test_read_le_at_advances() -> Result<()> {
        let mut offset = 2;
        assert_eq!(read_le_at::<u16>(&TEST_BUFFER, &mut offset)?, 0x0403);
        assert_eq!(offset, 4);
        Ok(())
    }

    #[test]
    fn test_read_past_end() {
        let mut offset = 6;
        assert!(matches!(
            read_le_at::<u32>(&TEST_BUFFER, &mut offset),
            Err(OutOfBounds)
        ));
        assert_eq!(offset, 6);

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&TEST_BUFFER, &mut offset).is_err());
    }

    #[test]
    fn test_write_le() {
        let mut buffer = Vec::new();
        write_le(&mut buffer, -2_i32);
        write_le(&mut buffer, 0xAABB_u16);
        assert_eq!(buffer, vec![0xFE, 0xFF, 0xFF, 0xFF, 0xBB, 0xAA]);
    }
}
