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

//! Column layout of every metadata table.
//!
//! Row sizes of all present tables are needed to locate any single table inside the tables
//! stream, so the schema covers every table even though the compiler only consumes a subset.

use crate::metadata::tables::{CodedIndexType, TableId};

/// Storage class of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// 1 byte constant (stored as part of a 2 byte pair in `Constant.Type`)
    U8,
    /// 2 byte constant
    U16,
    /// 4 byte constant
    U32,
    /// Index into #Strings
    Str,
    /// Index into #GUID
    Guid,
    /// Index into #Blob
    Blob,
    /// Simple index into another table
    Table(TableId),
    /// Coded index
    Coded(CodedIndexType),
}

/// Maximum number of columns of any table.
pub const MAX_COLUMNS: usize = 9;

use Column::{Blob, Coded, Guid, Str, Table, U16, U32, U8};
use CodedIndexType as C;
use TableId as T;

impl TableId {
    /// Columns of this table in storage order.
    #[must_use]
    pub fn columns(&self) -> &'static [Column] {
        match self {
            T::Module => &[U16, Str, Guid, Guid, Guid],
            T::TypeRef => &[Coded(C::ResolutionScope), Str, Str],
            T::TypeDef => &[
                U32,
                Str,
                Str,
                Coded(C::TypeDefOrRef),
                Table(T::Field),
                Table(T::MethodDef),
            ],
            T::FieldPtr => &[Table(T::Field)],
            T::Field => &[U16, Str, Blob],
            T::MethodPtr => &[Table(T::MethodDef)],
            T::MethodDef => &[U32, U16, U16, Str, Blob, Table(T::Param)],
            T::ParamPtr => &[Table(T::Param)],
            T::Param => &[U16, U16, Str],
            T::InterfaceImpl => &[Table(T::TypeDef), Coded(C::TypeDefOrRef)],
            T::MemberRef => &[Coded(C::MemberRefParent), Str, Blob],
            T::Constant => &[U8, U8, Coded(C::HasConstant), Blob],
            T::CustomAttribute => &[
                Coded(C::HasCustomAttribute),
                Coded(C::CustomAttributeType),
                Blob,
            ],
            T::FieldMarshal => &[Coded(C::HasFieldMarshal), Blob],
            T::DeclSecurity => &[U16, Coded(C::HasDeclSecurity), Blob],
            T::ClassLayout => &[U16, U32, Table(T::TypeDef)],
            T::FieldLayout => &[U32, Table(T::Field)],
            T::StandAloneSig => &[Blob],
            T::EventMap => &[Table(T::TypeDef), Table(T::Event)],
            T::EventPtr => &[Table(T::Event)],
            T::Event => &[U16, Str, Coded(C::TypeDefOrRef)],
            T::PropertyMap => &[Table(T::TypeDef), Table(T::Property)],
            T::PropertyPtr => &[Table(T::Property)],
            T::Property => &[U16, Str, Blob],
            T::MethodSemantics => &[U16, Table(T::MethodDef), Coded(C::HasSemantics)],
            T::MethodImpl => &[
                Table(T::TypeDef),
                Coded(C::MethodDefOrRef),
                Coded(C::MethodDefOrRef),
            ],
            T::ModuleRef => &[Str],
            T::TypeSpec => &[Blob],
            T::ImplMap => &[U16, Coded(C::MemberForwarded), Str, Table(T::ModuleRef)],
            T::FieldRVA => &[U32, Table(T::Field)],
            T::EncLog => &[U32, U32],
            T::EncMap => &[U32],
            T::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
            T::AssemblyProcessor => &[U32],
            T::AssemblyOS => &[U32, U32, U32],
            T::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
            T::AssemblyRefProcessor => &[U32, Table(T::AssemblyRef)],
            T::AssemblyRefOS => &[U32, U32, U32, Table(T::AssemblyRef)],
            T::File => &[U32, Str, Blob],
            T::ExportedType => &[U32, U32, Str, Str, Coded(C::Implementation)],
            T::ManifestResource => &[U32, U32, Str, Coded(C::Implementation)],
            T::NestedClass => &[Table(T::TypeDef), Table(T::TypeDef)],
            T::GenericParam => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
            T::MethodSpec => &[Coded(C::MethodDefOrRef), Blob],
            T::GenericParamConstraint => &[Table(T::GenericParam), Coded(C::TypeDefOrRef)],
            T::Document => &[Blob, Guid, Blob, Guid],
            T::MethodDebugInformation => &[Table(T::Document), Blob],
            T::LocalScope => &[
                Table(T::MethodDef),
                Table(T::ImportScope),
                Table(T::LocalVariable),
                Table(T::LocalConstant),
                U32,
                U32,
            ],
            T::LocalVariable => &[U16, U16, Str],
            T::LocalConstant => &[Str, Blob],
            T::ImportScope => &[Table(T::ImportScope), Blob],
            T::StateMachineMethod => &[Table(T::MethodDef), Table(T::MethodDef)],
            T::CustomDebugInformation => &[Coded(C::HasCustomDebugInformation), Guid, Blob],
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn column_counts_fit() {
        for table in TableId::iter() {
            let count = table.columns().len();
            assert!(count > 0 && count <= MAX_COLUMNS, "{table:?}");
        }
        assert_eq!(TableId::TypeDef.columns().len(), 6);
        assert_eq!(TableId::AssemblyRef.columns().len(), 9);
    }
}
