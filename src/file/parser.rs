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

//! Sequential, position-tracking reader for metadata blobs, signatures and bytecode.
//!
//! [`Parser`] implements the ECMA-335 compressed integer encodings (II.23.2) on top of the
//! plain little-endian reads of [`crate::file::io`].

use crate::{
    file::io::{read_le_at, CilIO},
    metadata::token::Token,
    Result,
};

/// A cursor over a byte slice.
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

    /// Length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True while the cursor has not reached the end.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Bytes left after the cursor.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Moves the cursor to an absolute position.
    ///
    /// # Errors
    /// Returns an error if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Skips a single byte.
    ///
    /// # Errors
    /// Returns an error at the end of the data.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Skips `step` bytes.
    ///
    /// # Errors
    /// Returns an error if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns the next byte without consuming it.
    ///
    /// # Errors
    /// Returns an error at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or_else(|| out_of_bounds_error!())
    }

    /// Reads a little-endian value and advances.
    ///
    /// # Errors
    /// Returns an error if not enough data is left.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Reads `len` raw bytes and advances.
    ///
    /// # Errors
    /// Returns an error if not enough data is left.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..start + len])
    }

    /// Reads a compressed unsigned integer (1, 2 or 4 bytes, big-endian payload).
    ///
    /// # Errors
    /// Returns an error on an invalid lead byte or truncated data.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Reads a compressed signed integer (II.23.2, rotated sign bit).
    ///
    /// # Errors
    /// Returns an error on an invalid lead byte or truncated data.
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let start = self.position;
        let unsigned = self.read_compressed_uint()?;
        let width = self.position - start;

        let magnitude = (unsigned >> 1) as i32;
        if unsigned & 1 == 0 {
            return Ok(magnitude);
        }

        // Negative values are sign extended from the payload width
        let sign_bits: i32 = match width {
            1 => -0x40,
            2 => -0x2000,
            _ => -0x1000_0000,
        };
        Ok(magnitude | sign_bits)
    }

    /// Reads a compressed `TypeDefOrRefOrSpecEncoded` token.
    ///
    /// # Errors
    /// Returns an error if the tag does not name TypeDef, TypeRef or TypeSpec.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let compressed_token = self.read_compressed_uint()?;

        let table: u32 = match compressed_token & 0x3 {
            0x0 => 0x0200_0000, // TypeDef
            0x1 => 0x0100_0000, // TypeRef
            0x2 => 0x1B00_0000, // TypeSpec
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {}",
                    compressed_token
                ))
            }
        };

        Ok(Token::new(table | (compressed_token >> 2)))
    }

    /// Reads a `SerString`: compressed length followed by UTF-8, `0xFF` encodes null.
    ///
    /// # Errors
    /// Returns an error on truncated data or invalid UTF-8.
    pub fn read_ser_string(&mut self) -> Result<Option<String>> {
        if self.peek_byte()? == 0xFF {
            self.advance()?;
            return Ok(None);
        }

        let length = self.read_compressed_uint()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(length)?;
        match std::str::from_utf8(bytes) {
            Ok(value) => Ok(Some(value.to_string())),
            Err(error) => Err(malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                start + length,
                error
            )),
        }
    }

    /// Reads a NUL-terminated UTF-8 string.
    ///
    /// # Errors
    /// Returns an error on invalid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let end = self.data[start..]
            .iter()
            .position(|byte| *byte == 0)
            .map_or(self.data.len(), |len| start + len);

        self.position = (end + 1).min(self.data.len());

        String::from_utf8(self.data[start..end].to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                end,
                e.utf8_error()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_uint() {
        let cases: [(&[u8], u32); 6] = [
            (&[0x03], 0x03),
            (&[0x7F], 0x7F),
            (&[0x80, 0x80], 0x80),
            (&[0xAE, 0x57], 0x2E57),
            (&[0xBF, 0xFF], 0x3FFF),
            (&[0xC0, 0x00, 0x40, 0x00], 0x4000),
        ];

        for (bytes, expected) in cases {
            let mut parser = Parser::new(bytes);
            assert_eq!(parser.read_compressed_uint().unwrap(), expected);
            assert!(!parser.has_more_data());
        }
    }

    #[test]
    fn compressed_int() {
        // Examples from ECMA-335 II.23.2
        let cases: [(&[u8], i32); 6] = [
            (&[0x06], 3),
            (&[0x7B], -3),
            (&[0x80, 0x80], 64),
            (&[0x01], -64),
            (&[0xC0, 0x00, 0x40, 0x00], 8192),
            (&[0x80, 0x01], -8192),
        ];

        for (bytes, expected) in cases {
            let mut parser = Parser::new(bytes);
            assert_eq!(parser.read_compressed_int().unwrap(), expected, "{bytes:?}");
        }
    }

    #[test]
    fn compressed_token() {
        let mut parser = Parser::new(&[0x49]);
        assert_eq!(parser.read_compressed_token().unwrap().value(), 0x0100_0012);

        let mut parser = Parser::new(&[0x03]);
        assert!(parser.read_compressed_token().is_err());
    }

    #[test]
    fn ser_string() {
        let mut parser = Parser::new(&[0x02, b'h', b'i', 0xFF]);
        assert_eq!(parser.read_ser_string().unwrap().as_deref(), Some("hi"));
        assert_eq!(parser.read_ser_string().unwrap(), None);
    }

    #[test]
    fn bounds() {
        let mut parser = Parser::new(&[0x01]);
        assert!(parser.advance_by(2).is_err());
        assert!(parser.read_le::<u16>().is_err());
        assert_eq!(parser.read_le::<u8>().unwrap(), 1);
        assert!(parser.peek_byte().is_err());
    }
}
