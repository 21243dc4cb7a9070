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

//! Coded indexes (ECMA-335 II.24.2.6).
//!
//! A coded index packs a table tag into the low bits and a row id into the remaining bits.
//! The number of tag bits is `ceil(log2(n))` for `n` candidate tables.

use strum::{EnumCount, EnumIter};

use crate::{
    metadata::{tables::TableId, token::Token},
    Result,
};

/// The kinds of coded index used by metadata table columns.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[allow(missing_docs)]
pub enum CodedIndexType {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
    HasCustomDebugInformation,
}

const HAS_CUSTOM_ATTRIBUTE: [TableId; 22] = [
    TableId::MethodDef,
    TableId::Field,
    TableId::TypeRef,
    TableId::TypeDef,
    TableId::Param,
    TableId::InterfaceImpl,
    TableId::MemberRef,
    TableId::Module,
    TableId::DeclSecurity,
    TableId::Property,
    TableId::Event,
    TableId::StandAloneSig,
    TableId::ModuleRef,
    TableId::TypeSpec,
    TableId::Assembly,
    TableId::AssemblyRef,
    TableId::File,
    TableId::ExportedType,
    TableId::ManifestResource,
    TableId::GenericParam,
    TableId::GenericParamConstraint,
    TableId::MethodSpec,
];

const HAS_CUSTOM_DEBUG_INFORMATION: [TableId; 27] = [
    TableId::MethodDef,
    TableId::Field,
    TableId::TypeRef,
    TableId::TypeDef,
    TableId::Param,
    TableId::InterfaceImpl,
    TableId::MemberRef,
    TableId::Module,
    TableId::DeclSecurity,
    TableId::Property,
    TableId::Event,
    TableId::StandAloneSig,
    TableId::ModuleRef,
    TableId::TypeSpec,
    TableId::Assembly,
    TableId::AssemblyRef,
    TableId::File,
    TableId::ExportedType,
    TableId::ManifestResource,
    TableId::GenericParam,
    TableId::GenericParamConstraint,
    TableId::MethodSpec,
    TableId::Document,
    TableId::LocalScope,
    TableId::LocalVariable,
    TableId::LocalConstant,
    TableId::ImportScope,
];

impl CodedIndexType {
    /// Candidate tables, indexed by tag value.
    ///
    /// `CustomAttributeType` has unused tags 0, 1 and 4; they are filled with the nearest
    /// valid table so that the tag width stays 3 bits.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &HAS_CUSTOM_ATTRIBUTE,
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
            CodedIndexType::HasCustomDebugInformation => &HAS_CUSTOM_DEBUG_INFORMATION,
        }
    }

    /// Number of low bits holding the tag.
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        let count = self.tables().len() as u32;
        u32::BITS - (count - 1).leading_zeros()
    }

    /// Decodes a raw coded index value into a token.
    ///
    /// # Errors
    /// Returns an error if the tag does not name a candidate table.
    pub fn decode(&self, value: u32) -> Result<Token> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let row = value >> bits;

        match self.tables().get(tag) {
            Some(table) => Ok(Token::from_parts(*table, row)),
            None => Err(malformed_error!(
                "Invalid tag {} for coded index {:?}",
                tag,
                self
            )),
        }
    }

    /// Encodes a token as a coded index of this kind.
    ///
    /// # Errors
    /// Returns an error if the token's table is not a candidate.
    pub fn encode(&self, token: Token) -> Result<u32> {
        let tag = if *self == CodedIndexType::CustomAttributeType {
            match token.table_id() {
                Some(TableId::MethodDef) => Some(2),
                Some(TableId::MemberRef) => Some(3),
                _ => None,
            }
        } else {
            self.tables()
                .iter()
                .position(|table| token.is_table(*table))
        };

        let Some(tag) = tag else {
            return Err(malformed_error!(
                "Token {} cannot be encoded as {:?}",
                token,
                self
            ));
        };

        Ok((token.row() << self.tag_bits()) | tag as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::MethodDefOrRef.tag_bits(), 1);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasCustomDebugInformation.tag_bits(), 5);
    }

    #[test]
    fn decode_encode() {
        // TypeRef row 3 as TypeDefOrRef: (3 << 2) | 1
        let token = CodedIndexType::TypeDefOrRef.decode(0x0D).unwrap();
        assert_eq!(token, Token::new(0x0100_0003));
        assert_eq!(CodedIndexType::TypeDefOrRef.encode(token).unwrap(), 0x0D);

        // MemberRef row 7 as CustomAttributeType: (7 << 3) | 3
        let token = CodedIndexType::CustomAttributeType.decode(0x3B).unwrap();
        assert_eq!(token, Token::new(0x0A00_0007));

        assert!(CodedIndexType::TypeDefOrRef.decode(0x03).is_err());
    }
}
