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

use crate::metadata::token::Token;

/// A type as written in a signature blob.
///
/// Custom modifiers carry no meaning for code generation and are skipped by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSignature {
    /// void
    #[default]
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// System.String
    String,
    /// System.Object
    Object,
    /// System.TypedReference
    TypedByRef,
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// Managed pointer
    ByRef(Box<TypeSignature>),
    /// Pinned local
    Pinned(Box<TypeSignature>),
    /// Value type - `TypeDefOrRef` token
    ValueType(Token),
    /// Reference type - `TypeDefOrRef` token
    Class(Token),
    /// Generic parameter of the enclosing type
    GenericParamType(u32),
    /// Generic parameter of the enclosing method
    GenericParamMethod(u32),
    /// Multi-dimensional array
    Array(SignatureArray),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSignature>),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
}

impl TypeSignature {
    /// True for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSignature::Void)
    }

    /// True if the signature mentions a `Var` or `MVar` anywhere.
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            TypeSignature::GenericParamType(_) | TypeSignature::GenericParamMethod(_) => true,
            TypeSignature::Ptr(inner)
            | TypeSignature::ByRef(inner)
            | TypeSignature::Pinned(inner)
            | TypeSignature::SzArray(inner) => inner.is_open(),
            TypeSignature::Array(array) => array.base.is_open(),
            TypeSignature::GenericInst(base, args) => {
                base.is_open() || args.iter().any(TypeSignature::is_open)
            }
            TypeSignature::FnPtr(method) => {
                method.return_type.is_open() || method.params.iter().any(TypeSignature::is_open)
            }
            _ => false,
        }
    }
}

/// Multi-dimensional array shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureArray {
    /// Element type
    pub base: Box<TypeSignature>,
    /// Number of dimensions
    pub rank: u32,
    /// Declared sizes, may be shorter than `rank`
    pub sizes: Vec<u32>,
    /// Declared lower bounds, may be shorter than `rank`
    pub lower_bounds: Vec<i32>,
}

/// Calling convention kind, the low nibble of the signature header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallingConvention {
    /// Managed default
    #[default]
    Default,
    /// Unmanaged cdecl
    C,
    /// Unmanaged stdcall
    StdCall,
    /// Unmanaged thiscall
    ThisCall,
    /// Unmanaged fastcall
    FastCall,
    /// Managed vararg
    VarArg,
}

/// Method signature (II.23.2.1 - II.23.2.3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethod {
    /// Instance method
    pub has_this: bool,
    /// `this` is passed explicitly as the first parameter
    pub explicit_this: bool,
    /// Calling convention
    pub calling_convention: CallingConvention,
    /// Number of generic parameters of the method
    pub generic_param_count: u32,
    /// Return type
    pub return_type: TypeSignature,
    /// Fixed parameters; by-reference parameters are wrapped in `ByRef`
    pub params: Vec<TypeSignature>,
    /// Parameters following the vararg sentinel
    pub varargs: Vec<TypeSignature>,
}

/// Field signature (II.23.2.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureField {
    /// Type of the field
    pub base: TypeSignature,
}

/// One local variable slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureLocalVariable {
    /// Pinned for the lifetime of the method
    pub is_pinned: bool,
    /// Type of the slot, by-reference locals wrapped in `ByRef`
    pub base: TypeSignature,
}

/// Local variable signature (II.23.2.6).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureLocalVariables {
    /// The local variables in slot order
    pub locals: Vec<SignatureLocalVariable>,
}

/// Generic method instantiation (II.23.2.15).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMethodSpec {
    /// Types of the generic arguments
    pub generic_args: Vec<TypeSignature>,
}
