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

//! The compressed metadata tables stream (`#~`, ECMA-335 II.24.2.6).
//!
//! [`TablesHeader`] parses the stream header, computes the row size of every present table
//! through [`TableInfo`] and hands out [`Row`]s decoded according to the table's
//! [`Column`] layout. Coded index columns are returned as full tokens, simple table indexes
//! as row ids, heap indexes as offsets into their heap.
//!
//! Portable PDB images reference rows of the type system tables that live in the main
//! module; their row counts are passed in through [`TablesHeader::read_with_external`].

mod codedindex;
mod schema;
mod tableid;

pub use codedindex::CodedIndexType;
pub use schema::{Column, MAX_COLUMNS};
pub use tableid::TableId;

use strum::IntoEnumIterator;

use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::token::Token,
    Result,
};

/// Number of table slots in the `valid` bit vector.
pub const TABLE_SLOTS: usize = 64;

/// Sizing information shared by all tables of one image.
#[derive(Debug, Clone)]
pub struct TableInfo {
    rows: [u32; TABLE_SLOTS],
    large_strings: bool,
    large_guids: bool,
    large_blobs: bool,
}

impl TableInfo {
    /// Builds sizing information from row counts and the `HeapSizes` flags.
    #[must_use]
    pub fn new(rows: [u32; TABLE_SLOTS], heap_sizes: u8) -> Self {
        TableInfo {
            rows,
            large_strings: heap_sizes & 0x01 != 0,
            large_guids: heap_sizes & 0x02 != 0,
            large_blobs: heap_sizes & 0x04 != 0,
        }
    }

    /// Row count of `table`.
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// True if indexes into `table` need 4 bytes.
    #[must_use]
    pub fn is_large_table(&self, table: TableId) -> bool {
        self.rows(table) > u32::from(u16::MAX)
    }

    /// True if a coded index of this kind needs 4 bytes.
    #[must_use]
    pub fn is_large_coded(&self, kind: CodedIndexType) -> bool {
        let limit = 1_u32 << (16 - kind.tag_bits());
        kind.tables()
            .iter()
            .any(|table| self.rows(*table) >= limit)
    }

    /// Width of a column in bytes.
    #[must_use]
    pub fn column_size(&self, column: Column) -> usize {
        let large = match column {
            Column::U8 => return 1,
            Column::U16 => return 2,
            Column::U32 => return 4,
            Column::Str => self.large_strings,
            Column::Guid => self.large_guids,
            Column::Blob => self.large_blobs,
            Column::Table(table) => self.is_large_table(table),
            Column::Coded(kind) => self.is_large_coded(kind),
        };

        if large {
            4
        } else {
            2
        }
    }

    /// Size of one row of `table` in bytes.
    #[must_use]
    pub fn row_size(&self, table: TableId) -> usize {
        table
            .columns()
            .iter()
            .map(|column| self.column_size(*column))
            .sum()
    }
}

/// One decoded table row.
#[derive(Debug, Clone, Copy)]
pub struct Row {
    /// 1-based row id
    pub rid: u32,
    /// Table the row belongs to
    pub table: TableId,
    values: [u32; MAX_COLUMNS],
}

impl Row {
    /// Raw value of column `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> u32 {
        self.values[index]
    }

    /// Column `index` interpreted as a token (coded index columns).
    #[must_use]
    pub fn token(&self, index: usize) -> Token {
        Token::new(self.values[index])
    }

    /// Token of this row.
    #[must_use]
    pub fn self_token(&self) -> Token {
        Token::from_parts(self.table, self.rid)
    }
}

/// Parsed header of the `#~` stream plus access to its tables.
pub struct TablesHeader<'a> {
    data: &'a [u8],
    info: TableInfo,
    offsets: [usize; TABLE_SLOTS],
    /// Major schema version
    pub major_version: u8,
    /// Minor schema version
    pub minor_version: u8,
    /// Bit vector of present tables
    pub valid: u64,
    /// Bit vector of sorted tables
    pub sorted: u64,
}

impl<'a> TablesHeader<'a> {
    /// Parses the tables stream of a module.
    ///
    /// # Errors
    /// Returns an error if the stream is truncated or references unknown tables.
    pub fn read(data: &'a [u8]) -> Result<TablesHeader<'a>> {
        Self::read_with_external(data, &[0; TABLE_SLOTS])
    }

    /// Parses a tables stream whose indexes may reference rows of another image.
    ///
    /// Row counts in `external` are used for tables absent from this stream, which is how
    /// Portable PDB images size their references into the type system tables.
    ///
    /// # Errors
    /// Returns an error if the stream is truncated or references unknown tables.
    pub fn read_with_external(
        data: &'a [u8],
        external: &[u32; TABLE_SLOTS],
    ) -> Result<TablesHeader<'a>> {
        if data.len() < 24 {
            return Err(out_of_bounds_error!());
        }

        let mut offset = 4_usize;
        let major_version = read_le_at::<u8>(data, &mut offset)?;
        let minor_version = read_le_at::<u8>(data, &mut offset)?;
        let heap_sizes = read_le_at::<u8>(data, &mut offset)?;
        offset += 1;
        let valid = read_le_at::<u64>(data, &mut offset)?;
        let sorted = read_le_at::<u64>(data, &mut offset)?;

        let mut rows = *external;
        for slot in 0..TABLE_SLOTS {
            if valid & (1_u64 << slot) == 0 {
                continue;
            }

            let Ok(slot_u8) = u8::try_from(slot) else {
                return Err(malformed_error!("Invalid table slot - {}", slot));
            };
            if TableId::from_u8(slot_u8).is_none() {
                return Err(malformed_error!("Unknown metadata table present - 0x{:02x}", slot));
            }
            rows[slot] = read_le_at::<u32>(data, &mut offset)?;
        }

        // Some producers write an extra dword after the row counts
        if heap_sizes & 0x40 != 0 {
            offset += 4;
        }

        let info = TableInfo::new(rows, heap_sizes);
        let mut offsets = [0_usize; TABLE_SLOTS];
        for table in TableId::iter() {
            if valid & (1_u64 << (table as u8)) == 0 {
                continue;
            }
            offsets[table as usize] = offset;
            offset += info.row_size(table) * info.rows(table) as usize;
        }

        if offset > data.len() {
            return Err(malformed_error!(
                "Tables stream is truncated - needs {} bytes, has {}",
                offset,
                data.len()
            ));
        }

        Ok(TablesHeader {
            data,
            info,
            offsets,
            major_version,
            minor_version,
            valid,
            sorted,
        })
    }

    /// Sizing information of this stream.
    #[must_use]
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// True if `table` is present in this stream.
    #[must_use]
    pub fn has_table(&self, table: TableId) -> bool {
        self.valid & (1_u64 << (table as u8)) != 0
    }

    /// Number of rows of `table` stored in this stream.
    #[must_use]
    pub fn row_count(&self, table: TableId) -> u32 {
        if self.has_table(table) {
            self.info.rows(table)
        } else {
            0
        }
    }

    /// Reads row `rid` (1-based) of `table`.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or a coded index is invalid.
    pub fn row(&self, table: TableId, rid: u32) -> Result<Row> {
        if rid == 0 || rid > self.row_count(table) {
            return Err(malformed_error!(
                "Row {} out of range for table {:?} ({} rows)",
                rid,
                table,
                self.row_count(table)
            ));
        }

        let mut offset =
            self.offsets[table as usize] + (rid as usize - 1) * self.info.row_size(table);
        let mut values = [0_u32; MAX_COLUMNS];
        for (index, column) in table.columns().iter().enumerate() {
            values[index] = match column {
                schema::Column::U8 => u32::from(read_le_at::<u8>(self.data, &mut offset)?),
                schema::Column::U16 => u32::from(read_le_at::<u16>(self.data, &mut offset)?),
                schema::Column::U32 => read_le_at::<u32>(self.data, &mut offset)?,
                schema::Column::Coded(kind) => {
                    let raw =
                        read_le_at_dyn(self.data, &mut offset, self.info.is_large_coded(*kind))?;
                    kind.decode(raw)?.value()
                }
                other => read_le_at_dyn(self.data, &mut offset, self.info.column_size(*other) == 4)?,
            };
        }

        Ok(Row { rid, table, values })
    }

    /// Iterates over all rows of `table`.
    pub fn rows(&self, table: TableId) -> impl Iterator<Item = Result<Row>> + '_ {
        (1..=self.row_count(table)).map(move |rid| self.row(table, rid))
    }

    /// Range of child rows owned by row `rid` through a list column (`FieldList`,
    /// `MethodList`, `ParamList`).
    ///
    /// The range runs up to the next row's list start or to the end of the child table.
    ///
    /// # Errors
    /// Returns an error if a row cannot be read.
    pub fn list_range(
        &self,
        table: TableId,
        rid: u32,
        column: usize,
        child: TableId,
    ) -> Result<std::ops::Range<u32>> {
        let start = self.row(table, rid)?.get(column);
        let end = if rid < self.row_count(table) {
            self.row(table, rid + 1)?.get(column)
        } else {
            self.row_count(child) + 1
        };

        let start = start.max(1);
        Ok(start..end.max(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(valid: u64, rows: &[u32], heap_sizes: u8) -> Vec<u8> {
        let mut data = vec![0, 0, 0, 0, 2, 0, heap_sizes, 1];
        data.extend_from_slice(&valid.to_le_bytes());
        data.extend_from_slice(&0_u64.to_le_bytes());
        for count in rows {
            data.extend_from_slice(&count.to_le_bytes());
        }
        data
    }

    #[test]
    fn reads_module_and_typeref_rows() {
        // Module + TypeRef present, small heaps
        let valid = (1 << TableId::Module as u8) | (1 << TableId::TypeRef as u8);
        let mut data = header_bytes(valid, &[1, 2], 0);
        // Module: generation, name, mvid, encid, encbaseid
        data.extend_from_slice(&[0, 0, 0x0A, 0, 1, 0, 0, 0, 0, 0]);
        // TypeRef 1: scope = AssemblyRef 1 (1 << 2 | 2), name 0x10, namespace 0x20
        data.extend_from_slice(&[0x06, 0, 0x10, 0, 0x20, 0]);
        // TypeRef 2: scope = TypeRef 1 (1 << 2 | 3)
        data.extend_from_slice(&[0x07, 0, 0x30, 0, 0, 0]);

        let header = TablesHeader::read(&data).unwrap();
        assert_eq!(header.row_count(TableId::TypeRef), 2);
        assert_eq!(header.info().row_size(TableId::Module), 10);

        let module = header.row(TableId::Module, 1).unwrap();
        assert_eq!(module.get(1), 0x0A);

        let typeref = header.row(TableId::TypeRef, 1).unwrap();
        assert_eq!(typeref.token(0), Token::new(0x2300_0001));
        assert_eq!(typeref.get(1), 0x10);

        let nested = header.row(TableId::TypeRef, 2).unwrap();
        assert_eq!(nested.token(0), Token::new(0x0100_0001));
        assert_eq!(nested.self_token(), Token::new(0x0100_0002));

        assert!(header.row(TableId::TypeRef, 3).is_err());
        assert_eq!(header.rows(TableId::TypeRef).count(), 2);
    }

    #[test]
    fn heap_flags_widen_columns() {
        let info = TableInfo::new([0; TABLE_SLOTS], 0x07);
        assert_eq!(info.column_size(Column::Str), 4);
        assert_eq!(info.column_size(Column::Guid), 4);
        assert_eq!(info.column_size(Column::Blob), 4);
        assert_eq!(info.row_size(TableId::Field), 10);
    }

    #[test]
    fn coded_index_width_depends_on_target_rows() {
        let mut rows = [0; TABLE_SLOTS];
        rows[TableId::TypeRef as usize] = 0x3FFF;
        let info = TableInfo::new(rows, 0);
        assert!(!info.is_large_coded(CodedIndexType::TypeDefOrRef));

        rows[TableId::TypeRef as usize] = 0x4000;
        let info = TableInfo::new(rows, 0);
        assert!(info.is_large_coded(CodedIndexType::TypeDefOrRef));
        assert!(!info.is_large_table(TableId::TypeRef));
    }

    #[test]
    fn rejects_truncated_stream() {
        let valid = 1 << TableId::TypeRef as u8;
        let data = header_bytes(valid, &[4], 0);
        assert!(TablesHeader::read(&data).is_err());
    }
}
