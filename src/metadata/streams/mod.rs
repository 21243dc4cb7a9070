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

//! Metadata streams and the stream headers of the metadata root.

mod heaps;

pub use heaps::{Blob, Guid, Strings, UserStrings};

use crate::{file::parser::Parser, Result};

/// Stream names a metadata root may contain.
pub const KNOWN_STREAMS: [&str; 7] = ["#~", "#-", "#Strings", "#US", "#Blob", "#GUID", "#Pdb"];

/// One entry of the stream directory following the metadata root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset relative to the metadata root
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
    /// Stream name, e.g. `#~`
    pub name: String,
}

impl StreamHeader {
    /// Reads a stream header at the parser's position; the name is padded to 4 bytes.
    ///
    /// # Errors
    /// Returns an error if the header is truncated or names an unknown stream.
    pub fn read(parser: &mut Parser<'_>) -> Result<StreamHeader> {
        let offset = parser.read_le::<u32>()?;
        let size = parser.read_le::<u32>()?;

        let start = parser.pos();
        let name = parser.read_string_utf8()?;
        if name.len() > 32 || !KNOWN_STREAMS.contains(&name.as_str()) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        let padded = (name.len() + 1 + 3) & !3;
        parser.seek(start + padded)?;

        Ok(StreamHeader { offset, size, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_padded_name() {
        #[rustfmt::skip]
        let data = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,
            0xFF,
        ];
        let mut parser = Parser::new(&data);
        let header = StreamHeader::read(&mut parser).unwrap();
        assert_eq!(header.offset, 0x6C);
        assert_eq!(header.size, 0x45A4);
        assert_eq!(header.name, "#~");
        assert_eq!(parser.pos(), 12);
    }

    #[test]
    fn rejects_unknown_name() {
        let data = [0, 0, 0, 0, 0, 0, 0, 0, 0x24, 0x7E, 0x00, 0x00];
        assert!(StreamHeader::read(&mut Parser::new(&data)).is_err());
    }
}
