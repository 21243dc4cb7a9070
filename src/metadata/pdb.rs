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

//! Standalone Portable PDB files.
//!
//! A Portable PDB is a metadata image holding a `#Pdb` stream and the debug tables. Its table
//! indexes into the type system tables are sized by the row counts recorded in `#Pdb`, which
//! mirror the owning module. Row `n` of `MethodDebugInformation` describes `MethodDef` row `n`.

use rustc_hash::FxHashMap;

use crate::{
    file::parser::Parser,
    metadata::{
        image::MetadataImage,
        sequencepoints::{parse_sequence_points, SequencePoints},
        streams::Blob,
        tables::{TableId, TABLE_SLOTS},
        token::Token,
    },
    Result,
};

/// Debug information read from a Portable PDB.
#[derive(Debug, Clone, Default)]
pub struct PortablePdb {
    /// PDB id shared with the module's debug directory
    pub id: [u8; 20],
    /// Entry point MethodDef token, null if absent
    pub entry_point: Token,
    documents: Vec<String>,
    methods: FxHashMap<u32, SequencePoints>,
}

impl PortablePdb {
    /// Parses a Portable PDB held in `data`.
    ///
    /// # Errors
    /// Returns an error if the image is not a Portable PDB or a sequence point blob is
    /// malformed.
    pub fn read(data: &[u8]) -> Result<PortablePdb> {
        let root = crate::metadata::root::Root::read(data)?;
        let Some(pdb_stream) = root.stream(data, "#Pdb") else {
            return Err(malformed_error!("Metadata image has no #Pdb stream"));
        };

        let mut parser = Parser::new(pdb_stream);
        let mut id = [0_u8; 20];
        id.copy_from_slice(parser.read_bytes(20)?);
        let entry_point = Token::new(parser.read_le::<u32>()?);
        let referenced = parser.read_le::<u64>()?;

        let mut external = [0_u32; TABLE_SLOTS];
        for (slot, rows) in external.iter_mut().enumerate() {
            if referenced & (1_u64 << slot) != 0 {
                *rows = parser.read_le::<u32>()?;
            }
        }

        let image = MetadataImage::parse_with_external(data, &external)?;

        let mut documents = Vec::new();
        for row in image.tables.rows(TableId::Document) {
            let row = row?;
            let name = image.blobs.get(row.get(0) as usize)?;
            documents.push(document_name(name, &image.blobs)?);
        }

        let mut methods = FxHashMap::default();
        for row in image.tables.rows(TableId::MethodDebugInformation) {
            let row = row?;
            let blob_index = row.get(1) as usize;
            if blob_index == 0 {
                continue;
            }

            let points = parse_sequence_points(image.blobs.get(blob_index)?, row.get(0))?;
            if !points.is_empty() {
                methods.insert(row.rid, points);
            }
        }

        log::debug!(
            "Read Portable PDB with {} documents and {} methods with sequence points",
            documents.len(),
            methods.len()
        );

        Ok(PortablePdb {
            id,
            entry_point,
            documents,
            methods,
        })
    }

    /// Name of document row `rid`.
    #[must_use]
    pub fn document(&self, rid: u32) -> Option<&str> {
        let index = rid.checked_sub(1)? as usize;
        self.documents.get(index).map(String::as_str)
    }

    /// All document names in row order.
    #[must_use]
    pub fn documents(&self) -> Vec<String> {
        self.documents.clone()
    }

    /// Sequence points of the method with the given `MethodDef` token.
    #[must_use]
    pub fn sequence_points(&self, method: Token) -> Option<&SequencePoints> {
        if !method.is_table(TableId::MethodDef) {
            return None;
        }
        self.methods.get(&method.row())
    }

    /// Number of methods carrying sequence points.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

/// Decodes a document name blob: a separator followed by blob indexes of the name parts.
fn document_name(blob: &[u8], heap: &Blob<'_>) -> Result<String> {
    let mut parser = Parser::new(blob);
    if !parser.has_more_data() {
        return Ok(String::new());
    }

    let separator = parser.read_le::<u8>()?;
    let mut name = String::new();
    let mut first = true;
    while parser.has_more_data() {
        if !first && separator != 0 {
            name.push(char::from(separator));
        }
        first = false;

        let part = parser.read_compressed_uint()? as usize;
        if part != 0 {
            name.push_str(&String::from_utf8_lossy(heap.get(part)?));
        }
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::image::build_image;

    fn pdb_stream(method_rows: u32) -> Vec<u8> {
        let mut data = vec![0xAB; 20];
        data.extend_from_slice(&0x0600_0001_u32.to_le_bytes());
        data.extend_from_slice(&(1_u64 << TableId::MethodDef as u8).to_le_bytes());
        data.extend_from_slice(&method_rows.to_le_bytes());
        data
    }

    fn tables_stream() -> Vec<u8> {
        let valid =
            (1_u64 << TableId::Document as u8) | (1_u64 << TableId::MethodDebugInformation as u8);
        let mut data = vec![0, 0, 0, 0, 2, 0, 0, 1];
        data.extend_from_slice(&valid.to_le_bytes());
        data.extend_from_slice(&0_u64.to_le_bytes());
        data.extend_from_slice(&1_u32.to_le_bytes());
        data.extend_from_slice(&2_u32.to_le_bytes());
        // Document: name blob 1, hash algorithm 0, hash 0, language 0
        data.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);
        // MethodDebugInformation 1: document 1, sequence points blob 15
        data.extend_from_slice(&[1, 0, 15, 0]);
        // MethodDebugInformation 2: no sequence points
        data.extend_from_slice(&[0, 0, 0, 0]);
        data
    }

    fn blob_heap() -> Vec<u8> {
        #[rustfmt::skip]
        let heap = vec![
            0x00,
            // 1: document name "/src/a.cs" as separator + parts "", 6, 10
            0x04, b'/', 0x00, 0x06, 0x0A,
            // 6: "src"
            0x03, b's', b'r', b'c',
            // 10: "a.cs"
            0x04, b'a', b'.', b'c', b's',
            // 15: IL 0 line 7 columns 1..5, IL 6 hidden
            0x09, 0x00, 0x00, 0x00, 0x04, 0x07, 0x01, 0x06, 0x00, 0x00,
        ];
        heap
    }

    #[test]
    fn reads_methods_and_documents() {
        let data = build_image(&[
            ("#Pdb", pdb_stream(2)),
            ("#~", tables_stream()),
            ("#Blob", blob_heap()),
        ]);
        let pdb = PortablePdb::read(&data).unwrap();

        assert_eq!(pdb.entry_point, Token::new(0x0600_0001));
        assert_eq!(pdb.document(1), Some("/src/a.cs"));
        assert_eq!(pdb.document(2), None);
        assert_eq!(pdb.method_count(), 1);

        let points = pdb.sequence_points(Token::new(0x0600_0001)).unwrap();
        assert_eq!(points.line_for(0), Some(7));
        assert_eq!(points.0[0].end_col, 5);
        assert_eq!(points.line_for(6), None);
        assert!(pdb.sequence_points(Token::new(0x0600_0002)).is_none());
    }

    #[test]
    fn requires_pdb_stream() {
        let data = build_image(&[("#~", tables_stream())]);
        assert!(PortablePdb::read(&data).is_err());
    }
}
