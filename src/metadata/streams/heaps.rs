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

//! The four metadata heaps: `#Strings`, `#Blob`, `#US` and `#GUID`.

use std::ffi::CStr;

use widestring::U16String;

use crate::{file::parser::Parser, Result};

/// `#Strings` - NUL-terminated UTF-8 identifiers.
#[derive(Clone, Copy)]
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wraps the heap. The first byte must be the empty string.
    ///
    /// # Errors
    /// Returns an error if the heap does not start with a NUL byte.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Provided #Strings heap is invalid"));
        }
        Ok(Strings { data })
    }

    /// String at byte offset `index`.
    ///
    /// # Errors
    /// Returns an error if the index is out of range or the string is not valid UTF-8.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        let Some(tail) = self.data.get(index..) else {
            return Err(out_of_bounds_error!());
        };

        CStr::from_bytes_until_nul(tail)
            .ok()
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| malformed_error!("Invalid string at index - {}", index))
    }
}

/// `#Blob` - length-prefixed binary values.
#[derive(Clone, Copy)]
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wraps the heap. The first byte must be the empty blob.
    ///
    /// # Errors
    /// Returns an error if the heap does not start with a zero length byte.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }
        Ok(Blob { data })
    }

    /// Blob at byte offset `index`.
    ///
    /// # Errors
    /// Returns an error if the length prefix or contents lie outside the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        let Some(tail) = self.data.get(index..) else {
            return Err(out_of_bounds_error!());
        };

        let mut parser = Parser::new(tail);
        let len = parser.read_compressed_uint()? as usize;
        parser.read_bytes(len)
    }
}

/// `#US` - UTF-16 string literals referenced by `ldstr`.
#[derive(Clone, Copy)]
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Wraps the heap.
    ///
    /// # Errors
    /// Returns an error if the heap does not start with a zero length byte.
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.first() != Some(&0) {
            return Err(malformed_error!("Invalid memory for #US heap"));
        }
        Ok(UserStrings { data })
    }

    /// String literal at byte offset `index` (the row part of a `0x70` token).
    ///
    /// The length prefix counts bytes including the trailing flag byte.
    ///
    /// # Errors
    /// Returns an error if the entry lies outside the heap.
    pub fn get(&self, index: usize) -> Result<String> {
        let Some(tail) = self.data.get(index..) else {
            return Err(out_of_bounds_error!());
        };

        let mut parser = Parser::new(tail);
        let len = parser.read_compressed_uint()? as usize;
        let bytes = parser.read_bytes(len)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(U16String::from_vec(units).to_string_lossy())
    }
}

/// `#GUID` - 16 byte GUIDs, indexed from 1.
#[derive(Clone, Copy)]
pub struct Guid<'a> {
    data: &'a [u8],
}

impl<'a> Guid<'a> {
    /// Wraps the heap.
    #[must_use]
    pub fn from(data: &'a [u8]) -> Guid<'a> {
        Guid { data }
    }

    /// GUID number `index` (1-based).
    ///
    /// # Errors
    /// Returns an error if the index is 0 or past the end of the heap.
    pub fn get(&self, index: usize) -> Result<uguid::Guid> {
        if index == 0 {
            return Err(malformed_error!("GUID heap index 0 is the null GUID"));
        }

        let start = (index - 1) * 16;
        let Some(bytes) = self.data.get(start..start + 16) else {
            return Err(out_of_bounds_error!());
        };

        let mut buffer = [0_u8; 16];
        buffer.copy_from_slice(bytes);
        Ok(uguid::Guid::from_bytes(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings() {
        let data = b"\0<Module>\0System.Console\0";
        let strings = Strings::from(data).unwrap();
        assert_eq!(strings.get(0).unwrap(), "");
        assert_eq!(strings.get(1).unwrap(), "<Module>");
        assert_eq!(strings.get(10).unwrap(), "System.Console");
        assert!(strings.get(100).is_err());
        assert!(Strings::from(b"x\0").is_err());
    }

    #[test]
    fn blobs() {
        let data = [0x00, 0x03, 0x20, 0x00, 0x08, 0x05];
        let blob = Blob::from(&data).unwrap();
        assert_eq!(blob.get(1).unwrap(), &[0x20, 0x00, 0x08]);
        assert!(blob.get(5).is_err());
    }

    #[test]
    fn user_strings() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x0B,
            b'H', 0x00, b'e', 0x00, b'l', 0x00, b'l', 0x00, b'o', 0x00, 0x00,
        ];
        let heap = UserStrings::from(&data).unwrap();
        assert_eq!(heap.get(1).unwrap(), "Hello");
    }

    #[test]
    fn guids() {
        let mut data = [0_u8; 32];
        data[16..].copy_from_slice(&[0xAA; 16]);
        let guids = Guid::from(&data);
        assert_eq!(
            guids.get(2).unwrap(),
            uguid::guid!("AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA")
        );
        assert!(guids.get(0).is_err());
        assert!(guids.get(3).is_err());
    }
}
