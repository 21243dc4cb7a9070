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

//! The CLI header that turns a PE image into a .NET module.

use crate::{file::parser::Parser, metadata::token::Token, Result};

/// The CLI header (ECMA-335 II.25.3.3), located through the CLR runtime data directory.
///
/// Only the fields the compiler consumes are kept.
#[derive(Debug, Clone)]
pub struct Cor20Header {
    /// Runtime version the module targets
    pub major_runtime_version: u16,
    /// Runtime minor version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// `COMIMAGE_FLAGS_*`
    pub flags: u32,
    /// Entry point MethodDef token, or a File token for multi-module assemblies
    pub entry_point_token: Token,
}

impl Cor20Header {
    /// Flag set when the entry point token refers to a native RVA.
    pub const NATIVE_ENTRYPOINT: u32 = 0x0000_0010;

    /// Parses the 72 byte header.
    ///
    /// # Errors
    /// Returns an error if the header is truncated, has the wrong size field or an empty
    /// metadata directory.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < 72 {
            return Err(out_of_bounds_error!());
        }

        let mut parser = Parser::new(data);
        let cb = parser.read_le::<u32>()?;
        if cb != 72 {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;
        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Metadata directory is empty"));
        }

        let flags = parser.read_le::<u32>()?;
        let entry_point_token = Token::new(parser.read_le::<u32>()?);

        Ok(Cor20Header {
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
        })
    }

    /// Managed entry point, if the module has one.
    #[must_use]
    pub fn managed_entry_point(&self) -> Option<Token> {
        if self.flags & Self::NATIVE_ENTRYPOINT != 0 || self.entry_point_token.is_null() {
            None
        } else {
            Some(self.entry_point_token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(flags: u32, entry: u32) -> Vec<u8> {
        let mut data = vec![0_u8; 72];
        data[0..4].copy_from_slice(&72_u32.to_le_bytes());
        data[4..6].copy_from_slice(&2_u16.to_le_bytes());
        data[6..8].copy_from_slice(&5_u16.to_le_bytes());
        data[8..12].copy_from_slice(&0x2000_u32.to_le_bytes());
        data[12..16].copy_from_slice(&0x400_u32.to_le_bytes());
        data[16..20].copy_from_slice(&flags.to_le_bytes());
        data[20..24].copy_from_slice(&entry.to_le_bytes());
        data
    }

    #[test]
    fn entry_point() {
        let parsed = Cor20Header::read(&header(1, 0x0600_0001)).unwrap();
        assert_eq!(parsed.meta_data_rva, 0x2000);
        assert_eq!(parsed.managed_entry_point(), Some(Token::new(0x0600_0001)));

        let library = Cor20Header::read(&header(1, 0)).unwrap();
        assert_eq!(library.managed_entry_point(), None);
    }

    #[test]
    fn invalid_size() {
        let mut data = header(1, 0);
        data[0] = 70;
        assert!(Cor20Header::read(&data).is_err());
        assert!(Cor20Header::read(&data[..40]).is_err());
    }
}
