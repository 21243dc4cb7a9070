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

//! Owned metadata records of a loaded module set.
//!
//! Records keep the module-local form of everything they reference (tokens and
//! [`TypeSignature`]s); [`ModuleSet`](crate::model::ModuleSet) resolves them on demand.

use std::{fmt, path::PathBuf};

use rustc_hash::FxHashMap;

use crate::{
    disassembler::Instruction,
    metadata::{
        flags::{FieldAttributes, TypeAttributes},
        method::{ExceptionHandler, MethodAttributes, MethodImplAttributes},
        sequencepoints::SequencePoints,
        signatures::{SignatureField, SignatureMethod, TypeSignature},
        token::Token,
    },
};

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the owning arena.
            #[must_use]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

arena_id!(
    /// Index of a [`Module`] in its module set.
    ModuleId
);
arena_id!(
    /// Index of a [`TypeRecord`] in its module set.
    TypeId
);
arena_id!(
    /// Index of a [`MethodRecord`] in its module set.
    MethodId
);
arena_id!(
    /// Index of a [`FieldRecord`] in its module set.
    FieldId
);

/// A custom attribute as stored in metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    /// `MethodDef` or `MemberRef` token of the constructor
    pub constructor: Token,
    /// Raw value blob
    pub blob: Vec<u8>,
}

/// Scope a `TypeRef` is resolved in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionScope {
    /// The referencing module itself
    Module,
    /// Another module of the same assembly, by name
    ModuleRef(String),
    /// Row of the `AssemblyRef` table
    AssemblyRef(u32),
    /// Enclosing type of a nested type, row of the `TypeRef` table
    TypeRef(u32),
    /// Resolved through the `ExportedType` table
    Exported,
}

/// A `TypeRef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRefRecord {
    /// Where to look for the type
    pub scope: ResolutionScope,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name
    pub name: String,
}

/// Signature of a `MemberRef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRefSignature {
    /// Method reference
    Method(SignatureMethod),
    /// Field reference
    Field(SignatureField),
}

/// A `MemberRef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRefRecord {
    /// `MemberRefParent` token
    pub parent: Token,
    /// Member name
    pub name: String,
    /// Parsed signature
    pub signature: MemberRefSignature,
}

/// A `MethodSpec` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpecRecord {
    /// `MethodDefOrRef` token of the generic method
    pub method: Token,
    /// Method generic arguments
    pub instantiation: Vec<TypeSignature>,
}

/// An `ExportedType` row (type forwarder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedTypeRecord {
    /// Namespace of the forwarded type
    pub namespace: String,
    /// Name of the forwarded type
    pub name: String,
    /// `Implementation` token: `AssemblyRef`, `File` or enclosing `ExportedType`
    pub implementation: Token,
}

/// An `AssemblyRef` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRefRecord {
    /// Simple assembly name
    pub name: String,
    /// Version as `major.minor.build.revision`
    pub version: [u16; 4],
    /// Public key token, derived from the full key if needed
    pub public_key_token: Option<u64>,
    /// Culture, empty for neutral
    pub culture: String,
}

/// One loaded module.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Identity in the module set
    pub id: ModuleId,
    /// Assembly name, or the module name for assemblies without manifest
    pub name: String,
    /// File the module was read from; `None` for in-memory modules
    pub path: Option<PathBuf>,
    /// Assembly version
    pub version: [u16; 4],
    /// `AssemblyRef` rows
    pub assembly_refs: Vec<AssemblyRefRecord>,
    /// `ModuleRef` names
    pub module_refs: Vec<String>,
    /// Types indexed by `TypeDef` row - 1
    pub type_defs: Vec<TypeId>,
    /// Methods indexed by `MethodDef` row - 1
    pub method_defs: Vec<MethodId>,
    /// Fields indexed by `Field` row - 1
    pub field_defs: Vec<FieldId>,
    /// `TypeRef` rows
    pub type_refs: Vec<TypeRefRecord>,
    /// `TypeSpec` signatures
    pub type_specs: Vec<TypeSignature>,
    /// `MemberRef` rows
    pub member_refs: Vec<MemberRefRecord>,
    /// `MethodSpec` rows
    pub method_specs: Vec<MethodSpecRecord>,
    /// `ExportedType` rows
    pub exported_types: Vec<ExportedTypeRecord>,
    /// String literals by `#US` offset
    pub user_strings: FxHashMap<u32, String>,
    /// Managed entry point
    pub entry_point: Option<MethodId>,
    /// Source document names from the debug symbols, indexed by `Document` row - 1
    pub documents: Vec<String>,
}

impl Default for ModuleId {
    fn default() -> Self {
        ModuleId(0)
    }
}

impl Module {
    /// Name of source document row `rid`.
    #[must_use]
    pub fn document(&self, rid: u32) -> Option<&str> {
        let index = rid.checked_sub(1)? as usize;
        self.documents.get(index).map(String::as_str)
    }

    /// Type defined by `TypeDef` row `rid`.
    #[must_use]
    pub fn type_def(&self, rid: u32) -> Option<TypeId> {
        rid.checked_sub(1)
            .and_then(|index| self.type_defs.get(index as usize).copied())
    }

    /// Method defined by `MethodDef` row `rid`.
    #[must_use]
    pub fn method_def(&self, rid: u32) -> Option<MethodId> {
        rid.checked_sub(1)
            .and_then(|index| self.method_defs.get(index as usize).copied())
    }

    /// Field defined by `Field` row `rid`.
    #[must_use]
    pub fn field_def(&self, rid: u32) -> Option<FieldId> {
        rid.checked_sub(1)
            .and_then(|index| self.field_defs.get(index as usize).copied())
    }

    /// Row `rid` of a one-based table stored as a vector.
    pub(crate) fn row<T>(rows: &[T], rid: u32) -> Option<&T> {
        rid.checked_sub(1).and_then(|index| rows.get(index as usize))
    }
}

/// A `TypeDef` row with its members.
#[derive(Debug, Clone)]
pub struct TypeRecord {
    /// Identity in the module set
    pub id: TypeId,
    /// Defining module
    pub module: ModuleId,
    /// `TypeDef` token
    pub token: Token,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Simple name including the generic arity suffix
    pub name: String,
    /// `TypeAttributes`
    pub flags: u32,
    /// `TypeDefOrRef` token of the base type
    pub extends: Option<Token>,
    /// `TypeDefOrRef` tokens of implemented interfaces
    pub interfaces: Vec<Token>,
    /// Declared fields in declaration order
    pub fields: Vec<FieldId>,
    /// Declared methods in declaration order
    pub methods: Vec<MethodId>,
    /// Names of the generic parameters
    pub generic_params: Vec<String>,
    /// Enclosing type of a nested type
    pub enclosing: Option<TypeId>,
    /// Custom attributes
    pub attributes: Vec<AttributeRecord>,
    /// Explicit overrides as (`body`, `declaration`) `MethodDefOrRef` tokens
    pub method_impls: Vec<(Token, Token)>,
    /// Packing size and class size from `ClassLayout`
    pub class_layout: Option<(u16, u32)>,
}

impl TypeRecord {
    /// Namespace-qualified name. Nested types have no namespace, see
    /// [`ModuleSet::type_full_name`](crate::model::ModuleSet::type_full_name) for the
    /// `Outer/Inner` form.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Number of generic parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.generic_params.len()
    }

    /// True for interfaces.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::CLASS_SEMANTICS_MASK == TypeAttributes::INTERFACE
    }

    /// True for abstract classes and interfaces.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags & TypeAttributes::ABSTRACT != 0
    }

    /// True for sealed types.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags & TypeAttributes::SEALED != 0
    }

    /// True if the type is visible outside its assembly.
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(
            self.flags & TypeAttributes::VISIBILITY_MASK,
            TypeAttributes::PUBLIC | TypeAttributes::NESTED_PUBLIC
        )
    }

    /// True for the `<Module>` type holding global members.
    #[must_use]
    pub fn is_module_type(&self) -> bool {
        self.name == "<Module>" && self.namespace.is_empty()
    }
}

/// A parsed method body.
#[derive(Debug, Clone)]
pub struct MethodBodyRecord {
    /// Declared maximum stack depth
    pub max_stack: usize,
    /// Locals are zero-initialized
    pub init_locals: bool,
    /// Local variable types
    pub locals: Vec<TypeSignature>,
    /// Exception clauses
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Decoded instructions in offset order
    pub instructions: Vec<Instruction>,
    /// Size of the IL code in bytes
    pub code_size: usize,
}

impl MethodBodyRecord {
    /// Index of the instruction starting at `offset`.
    #[must_use]
    pub fn instruction_at(&self, offset: u64) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |instruction| instruction.offset)
            .ok()
    }
}

/// A `MethodDef` row.
#[derive(Debug, Clone)]
pub struct MethodRecord {
    /// Identity in the module set
    pub id: MethodId,
    /// Defining module
    pub module: ModuleId,
    /// Declaring type
    pub declaring_type: TypeId,
    /// `MethodDef` token
    pub token: Token,
    /// Method name
    pub name: String,
    /// `MethodAttributes`
    pub flags: MethodAttributes,
    /// `MethodImplAttributes`
    pub impl_flags: MethodImplAttributes,
    /// Parsed signature
    pub signature: SignatureMethod,
    /// Parameter names, by position
    pub param_names: Vec<String>,
    /// Names of the method's generic parameters
    pub generic_params: Vec<String>,
    /// Body, absent for abstract, extern and runtime provided methods
    pub body: Option<MethodBodyRecord>,
    /// Custom attributes
    pub attributes: Vec<AttributeRecord>,
    /// Source mapping read from debug symbols
    pub sequence_points: Option<SequencePoints>,
}

impl MethodRecord {
    /// True for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// True for virtual methods.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodAttributes::VIRTUAL)
    }

    /// True for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAttributes::ABSTRACT)
    }

    /// True for instance constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }

    /// True for static constructors.
    #[must_use]
    pub fn is_static_constructor(&self) -> bool {
        self.name == ".cctor" && self.is_static()
    }

    /// Number of method generic parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.generic_params.len()
    }
}

/// A `Field` row.
#[derive(Debug, Clone)]
pub struct FieldRecord {
    /// Identity in the module set
    pub id: FieldId,
    /// Defining module
    pub module: ModuleId,
    /// Declaring type
    pub declaring_type: TypeId,
    /// `Field` token
    pub token: Token,
    /// Field name
    pub name: String,
    /// `FieldAttributes`
    pub flags: u32,
    /// Declared type
    pub signature: TypeSignature,
    /// Custom attributes
    pub attributes: Vec<AttributeRecord>,
}

impl FieldRecord {
    /// True for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }

    /// True for compile time constants, which have no storage.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.flags & FieldAttributes::LITERAL != 0
    }
}
