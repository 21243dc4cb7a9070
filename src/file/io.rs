// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Bounds-checked little-endian reads of primitive values.
//!
//! PE files and ECMA-335 metadata are little-endian throughout, so only that byte order is
//! provided. All functions fail with an out-of-bounds error instead of panicking.

use crate::Result;

/// Primitive types that can be read from a little-endian byte buffer.
pub trait CilIO: Sized {
    /// Fixed-size byte representation of the type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Builds the value from its little-endian bytes.
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Returns the little-endian bytes of the value.
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

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

impl_cil_io!(
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
);

/// Reads a value from the start of `data`.
///
/// # Errors
/// Returns an error if `data` is shorter than the value.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value at `offset` and advances `offset` past it.
///
/// # Errors
/// Returns an error if the read would go past the end of `data`.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Reads either a 2 or 4 byte index at `offset`, widened to `u32`.
///
/// Metadata table columns referencing heaps or other tables change width depending on the
/// size of their target, `is_large` selects the 4 byte form.
///
/// # Errors
/// Returns an error if the read would go past the end of `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    if is_large {
        read_le_at::<u32>(data, offset)
    } else {
        Ok(u32::from(read_le_at::<u16>(data, offset)?))
    }
}

/// Appends `value` in little-endian order.
pub fn write_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Appends an ECMA-335 compressed unsigned integer (II.23.2).
///
/// # Errors
/// Returns an error if `value` exceeds `0x1FFF_FFFF`.
pub fn write_compressed_uint(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    match value {
        0..=0x7F => buffer.push(value as u8),
        0x80..=0x3FFF => {
            buffer.push(0x80 | (value >> 8) as u8);
            buffer.push(value as u8);
        }
        0x4000..=0x1FFF_FFFF => {
            buffer.push(0xC0 | (value >> 24) as u8);
            buffer.push((value >> 16) as u8);
            buffer.push((value >> 8) as u8);
            buffer.push(value as u8);
        }
        _ => {
            return Err(malformed_error!(
                "Value too large for compressed encoding - {}",
                value
            ))
        }
    }
    Ok(())
}

/// Appends an ECMA-335 compressed signed integer (rotated sign bit).
///
/// # Errors
/// Returns an error if `value` is outside the 29 bit signed range.
#[allow(clippy::cast_sign_loss)]
pub fn write_compressed_int(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    let rotated = ((value as u32) << 1) | u32::from(value < 0);

    if (-0x40..0x40).contains(&value) {
        buffer.push((rotated & 0x7F) as u8);
    } else if (-0x2000..0x2000).contains(&value) {
        let payload = rotated & 0x3FFF;
        buffer.push(0x80 | (payload >> 8) as u8);
        buffer.push(payload as u8);
    } else if (-0x1000_0000..0x1000_0000).contains(&value) {
        let payload = rotated & 0x1FFF_FFFF;
        buffer.extend_from_slice(&(0xC000_0000 | payload).to_be_bytes());
    } else {
        return Err(malformed_error!(
            "Value too large for compressed signed encoding - {}",
            value
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_all_widths() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_le::<u8>(&data).unwrap(), 0x01);
        assert_eq!(read_le::<u16>(&data).unwrap(), 0x0201);
        assert_eq!(read_le::<u32>(&data).unwrap(), 0x0403_0201);
        assert_eq!(read_le::<u64>(&data).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_le::<i8>(&[0xFF]).unwrap(), -1);
    }

    #[test]
    fn advances_offset() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x00, 0x00];
        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&data, &mut offset).unwrap(), 1);
        assert_eq!(read_le_at::<u32>(&data, &mut offset).unwrap(), 2);
        assert_eq!(offset, 6);
    }

    #[test]
    fn dynamic_width() {
        let data = [0x01, 0x00, 0x02, 0x00];
        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&data, &mut offset, false).unwrap(), 1);
        assert_eq!(offset, 2);
        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&data, &mut offset, true).unwrap(), 0x0002_0001);
    }

    #[test]
    fn out_of_bounds() {
        let data = [0x01, 0x02];
        assert!(read_le::<u32>(&data).is_err());
        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&data, &mut offset).is_err());
    }

    #[test]
    fn compressed_writes_match_reads() {
        use crate::file::parser::Parser;

        let mut buffer = Vec::new();
        for value in [0_u32, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
            write_compressed_uint(&mut buffer, value).unwrap();
        }
        let mut parser = Parser::new(&buffer);
        for value in [0_u32, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1FFF_FFFF] {
            assert_eq!(parser.read_compressed_uint().unwrap(), value);
        }
        assert!(write_compressed_uint(&mut buffer, 0x2000_0000).is_err());

        let mut buffer = Vec::new();
        for value in [3_i32, -3, 64, -64, -0x2000, 0x1FFF, -0x1000_0000] {
            write_compressed_int(&mut buffer, value).unwrap();
        }
        let mut parser = Parser::new(&buffer);
        for value in [3_i32, -3, 64, -64, -0x2000, 0x1FFF, -0x1000_0000] {
            assert_eq!(parser.read_compressed_int().unwrap(), value);
        }
    }
}
