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

//! The metadata root: the `BSJB` signature, runtime version string and stream directory.

use crate::{file::parser::Parser, metadata::streams::StreamHeader, Result};

/// Magic signature of a metadata root, `BSJB`.
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// The metadata root (ECMA-335 II.24.2.1) and its stream directory.
#[derive(Debug, Clone)]
pub struct Root {
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Runtime version string, e.g. `v4.0.30319`
    pub version: String,
    /// Stream headers in directory order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parses the root at the start of `data`.
    ///
    /// # Errors
    /// Returns an error on a bad signature, a truncated directory, or streams that do not
    /// fit inside `data`.
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut parser = Parser::new(data);
        let signature = parser.read_le::<u32>()?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - 0x{:08x}",
                signature
            ));
        }

        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        parser.advance_by(4)?;

        let version_length = parser.read_le::<u32>()? as usize;
        let version_bytes = parser.read_bytes(version_length)?;
        let version = String::from_utf8_lossy(version_bytes)
            .trim_end_matches('\0')
            .to_string();

        parser.advance_by(2)?; // flags
        let stream_count = parser.read_le::<u16>()?;
        if stream_count == 0 {
            return Err(malformed_error!("Metadata root declares no streams"));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        for _ in 0..stream_count {
            let header = StreamHeader::read(&mut parser)?;
            let fits = header
                .offset
                .checked_add(header.size)
                .is_some_and(|end| end as usize <= data.len());
            if !fits {
                return Err(malformed_error!(
                    "Stream {} does not fit into the metadata - {} + {}",
                    header.name,
                    header.offset,
                    header.size
                ));
            }
            stream_headers.push(header);
        }

        Ok(Root {
            major_version,
            minor_version,
            version,
            stream_headers,
        })
    }

    /// Contents of the stream called `name`, if present.
    #[must_use]
    pub fn stream<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        self.stream_headers
            .iter()
            .find(|header| header.name == name)
            .and_then(|header| {
                data.get(header.offset as usize..(header.offset + header.size) as usize)
            })
    }
}
