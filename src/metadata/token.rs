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

//! Metadata tokens: a table id in the high byte and a 1-based row id in the low 24 bits.

use std::fmt;

use crate::metadata::tables::TableId;

/// A metadata token as it appears in bytecode operands and signatures.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Wraps a raw token value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Token(value)
    }

    /// Builds a token from a table and row id.
    #[must_use]
    pub const fn from_parts(table: TableId, row: u32) -> Self {
        Token(((table as u32) << 24) | (row & 0x00FF_FFFF))
    }

    /// Raw token value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Table byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Table of this token, if the table byte names a known table.
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        TableId::from_u8(self.table())
    }

    /// Row id (1-based, 0 means null).
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// True if the row part is zero.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }

    /// True if this token points at `table`.
    #[must_use]
    pub fn is_table(&self, table: TableId) -> bool {
        self.table() == table as u8
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::new(0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert_eq!(token.table_id(), Some(TableId::MethodDef));
        assert!(token.is_table(TableId::MethodDef));
        assert_eq!(Token::from_parts(TableId::TypeRef, 5), Token::new(0x0100_0005));
    }

    #[test]
    fn null_and_display() {
        assert!(Token::new(0x0200_0000).is_null());
        assert_eq!(Token::new(0x0A00_0003).to_string(), "0x0a000003");
    }
}
