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

//! A parsed metadata image: the root, its heaps and the tables stream.
//!
//! [`MetadataImage`] borrows the bytes starting at the metadata root. It is used both for the
//! metadata of a PE module (located through the CLI header) and for standalone Portable PDB
//! files, whose contents are a bare metadata image.

use crate::{
    metadata::{
        root::Root,
        streams::{Blob, Guid, Strings, UserStrings},
        tables::{TablesHeader, TABLE_SLOTS},
    },
    Result,
};

/// Heap contents used when a stream is absent.
const EMPTY_HEAP: &[u8] = &[0];

/// Borrowed view over every stream of one metadata image.
pub struct MetadataImage<'a> {
    /// The metadata root and stream directory
    pub root: Root,
    /// The `#~` (or `#-`) tables stream
    pub tables: TablesHeader<'a>,
    /// `#Strings`
    pub strings: Strings<'a>,
    /// `#Blob`
    pub blobs: Blob<'a>,
    /// `#US`
    pub user_strings: UserStrings<'a>,
    /// `#GUID`
    pub guids: Guid<'a>,
    data: &'a [u8],
}

impl<'a> MetadataImage<'a> {
    /// Parses the image starting at the metadata root in `data`.
    ///
    /// # Errors
    /// Returns an error if the root, a heap or the tables stream is malformed.
    pub fn parse(data: &'a [u8]) -> Result<MetadataImage<'a>> {
        Self::parse_with_external(data, &[0; TABLE_SLOTS])
    }

    /// Parses an image whose tables reference rows of another image.
    ///
    /// # Errors
    /// Returns an error if the root, a heap or the tables stream is malformed.
    pub fn parse_with_external(
        data: &'a [u8],
        external: &[u32; TABLE_SLOTS],
    ) -> Result<MetadataImage<'a>> {
        let root = Root::read(data)?;

        let Some(tables_data) = root
            .stream(data, "#~")
            .or_else(|| root.stream(data, "#-"))
        else {
            return Err(malformed_error!("Metadata image has no tables stream"));
        };

        let tables = TablesHeader::read_with_external(tables_data, external)?;
        let strings = Strings::from(root.stream(data, "#Strings").unwrap_or(EMPTY_HEAP))?;
        let blobs = Blob::from(root.stream(data, "#Blob").unwrap_or(EMPTY_HEAP))?;
        let user_strings = UserStrings::from(root.stream(data, "#US").unwrap_or(EMPTY_HEAP))?;
        let guids = Guid::from(root.stream(data, "#GUID").unwrap_or(&[]));

        Ok(MetadataImage {
            root,
            tables,
            strings,
            blobs,
            user_strings,
            guids,
            data,
        })
    }

    /// Raw contents of the stream called `name`.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&'a [u8]> {
        self.root.stream(self.data, name)
    }
}

/// Assembles a metadata image from stream contents, for tests that need real bytes.
#[cfg(test)]
pub(crate) fn build_image(streams: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let version = b"v4.0.30319\0\0";
    let mut directory_size = 0;
    for (name, _) in streams {
        directory_size += 8 + ((name.len() + 1 + 3) & !3);
    }

    let mut data = Vec::new();
    data.extend_from_slice(&crate::metadata::root::CIL_HEADER_MAGIC.to_le_bytes());
    data.extend_from_slice(&1_u16.to_le_bytes());
    data.extend_from_slice(&1_u16.to_le_bytes());
    data.extend_from_slice(&0_u32.to_le_bytes());
    data.extend_from_slice(&(version.len() as u32).to_le_bytes());
    data.extend_from_slice(version);
    data.extend_from_slice(&0_u16.to_le_bytes());
    data.extend_from_slice(&(streams.len() as u16).to_le_bytes());

    let mut offset = data.len() + directory_size;
    for (name, contents) in streams {
        let padded = (contents.len() + 3) & !3;
        data.extend_from_slice(&(offset as u32).to_le_bytes());
        data.extend_from_slice(&(padded as u32).to_le_bytes());
        data.extend_from_slice(name.as_bytes());
        let name_padded = (name.len() + 1 + 3) & !3;
        data.resize(data.len() + name_padded - name.len(), 0);
        offset += padded;
    }

    for (_, contents) in streams {
        data.extend_from_slice(contents);
        data.resize((data.len() + 3) & !3, 0);
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::TableId;

    fn tables_stream() -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0, 2, 0, 0, 1];
        data.extend_from_slice(&(1_u64 << TableId::Module as u8).to_le_bytes());
        data.extend_from_slice(&0_u64.to_le_bytes());
        data.extend_from_slice(&1_u32.to_le_bytes());
        data.extend_from_slice(&[0, 0, 1, 0, 1, 0, 0, 0, 0, 0]);
        data
    }

    #[test]
    fn parses_streams() {
        let data = build_image(&[
            ("#~", tables_stream()),
            ("#Strings", b"\0App.dll\0".to_vec()),
            ("#GUID", vec![0x11; 16]),
        ]);

        let image = MetadataImage::parse(&data).unwrap();
        let module = image.tables.row(TableId::Module, 1).unwrap();
        assert_eq!(image.strings.get(module.get(1) as usize).unwrap(), "App.dll");
        assert!(image.guids.get(module.get(2) as usize).is_ok());
        assert!(image.blobs.get(0).unwrap().is_empty());
        assert!(image.stream("#Pdb").is_none());
    }

    #[test]
    fn requires_tables() {
        let data = build_image(&[("#Strings", b"\0".to_vec())]);
        assert!(MetadataImage::parse(&data).is_err());
    }
}
