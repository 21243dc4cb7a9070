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

//! Resolved, module independent types and method instances.
//!
//! A [`TypeSignature`](crate::metadata::signatures::TypeSignature) is only meaningful inside
//! the module whose tokens it uses. [`TypeSig`] replaces every token with the [`TypeId`] of
//! the defining record, so values coming from different modules can be compared, hashed and
//! ordered. Well-known core library types (`System.Int32`, `System.String`, ...) are always
//! represented by their primitive variant.

use crate::model::records::{MethodId, TypeId};

/// A fully resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum TypeSig {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    I,
    U,
    String,
    Object,
    TypedByRef,
    /// A type definition and its generic arguments (empty for non-generic types)
    Named(TypeId, Vec<TypeSig>),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSig>),
    /// Multi-dimensional array of the given rank
    Array(Box<TypeSig>, u32),
    /// Unmanaged pointer
    Ptr(Box<TypeSig>),
    /// Managed pointer
    ByRef(Box<TypeSig>),
    /// Function pointer
    FnPtr,
    /// Generic parameter of the declaring type
    Var(u32),
    /// Generic parameter of the method
    MVar(u32),
}

/// Well-known types with a primitive representation, by full name.
pub const PRIMITIVE_NAMES: [(&str, TypeSig); 18] = [
    ("System.Void", TypeSig::Void),
    ("System.Boolean", TypeSig::Boolean),
    ("System.Char", TypeSig::Char),
    ("System.SByte", TypeSig::I1),
    ("System.Byte", TypeSig::U1),
    ("System.Int16", TypeSig::I2),
    ("System.UInt16", TypeSig::U2),
    ("System.Int32", TypeSig::I4),
    ("System.UInt32", TypeSig::U4),
    ("System.Int64", TypeSig::I8),
    ("System.UInt64", TypeSig::U8),
    ("System.Single", TypeSig::R4),
    ("System.Double", TypeSig::R8),
    ("System.IntPtr", TypeSig::I),
    ("System.UIntPtr", TypeSig::U),
    ("System.String", TypeSig::String),
    ("System.Object", TypeSig::Object),
    ("System.TypedReference", TypeSig::TypedByRef),
];

impl TypeSig {
    /// Primitive representation of a well-known type.
    #[must_use]
    pub fn primitive(full_name: &str) -> Option<TypeSig> {
        PRIMITIVE_NAMES
            .iter()
            .find(|(name, _)| *name == full_name)
            .map(|(_, sig)| sig.clone())
    }

    /// Full name of a primitive variant (`System.Int32`), `None` for composite types.
    #[must_use]
    pub fn primitive_name(&self) -> Option<&'static str> {
        PRIMITIVE_NAMES
            .iter()
            .find(|(_, sig)| sig == self)
            .map(|(name, _)| *name)
    }

    /// True for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        *self == TypeSig::Void
    }

    /// True for primitive value types (numbers, `bool`, `char`, native integers).
    #[must_use]
    pub fn is_primitive_value(&self) -> bool {
        matches!(
            self,
            TypeSig::Boolean
                | TypeSig::Char
                | TypeSig::I1
                | TypeSig::U1
                | TypeSig::I2
                | TypeSig::U2
                | TypeSig::I4
                | TypeSig::U4
                | TypeSig::I8
                | TypeSig::U8
                | TypeSig::R4
                | TypeSig::R8
                | TypeSig::I
                | TypeSig::U
        )
    }

    /// True for floating point types.
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, TypeSig::R4 | TypeSig::R8)
    }

    /// True for unsigned integer types, including `char` and `bool`.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            TypeSig::Boolean
                | TypeSig::Char
                | TypeSig::U1
                | TypeSig::U2
                | TypeSig::U4
                | TypeSig::U8
                | TypeSig::U
        )
    }

    /// True if a `Var` or `MVar` occurs anywhere.
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            TypeSig::Var(_) | TypeSig::MVar(_) => true,
            TypeSig::Named(_, args) => args.iter().any(TypeSig::is_open),
            TypeSig::SzArray(inner)
            | TypeSig::Array(inner, _)
            | TypeSig::Ptr(inner)
            | TypeSig::ByRef(inner) => inner.is_open(),
            _ => false,
        }
    }

    /// Definition id of a named type.
    #[must_use]
    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            TypeSig::Named(id, _) => Some(*id),
            _ => None,
        }
    }

    /// Generic arguments of a named type, empty otherwise.
    #[must_use]
    pub fn generic_args(&self) -> &[TypeSig] {
        match self {
            TypeSig::Named(_, args) => args,
            _ => &[],
        }
    }

    /// Element type of an array.
    #[must_use]
    pub fn element_type(&self) -> Option<&TypeSig> {
        match self {
            TypeSig::SzArray(inner) | TypeSig::Array(inner, _) => Some(inner),
            _ => None,
        }
    }

    /// Replaces generic parameters with the arguments of `ctx`.
    ///
    /// Parameters without a matching argument are left in place.
    #[must_use]
    pub fn substitute(&self, ctx: &GenericContext<'_>) -> TypeSig {
        match self {
            TypeSig::Var(index) => ctx
                .type_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSig::MVar(index) => ctx
                .method_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSig::Named(id, args) if !args.is_empty() => TypeSig::Named(
                *id,
                args.iter().map(|arg| arg.substitute(ctx)).collect(),
            ),
            TypeSig::SzArray(inner) => TypeSig::SzArray(Box::new(inner.substitute(ctx))),
            TypeSig::Array(inner, rank) => TypeSig::Array(Box::new(inner.substitute(ctx)), *rank),
            TypeSig::Ptr(inner) => TypeSig::Ptr(Box::new(inner.substitute(ctx))),
            TypeSig::ByRef(inner) => TypeSig::ByRef(Box::new(inner.substitute(ctx))),
            _ => self.clone(),
        }
    }
}

/// Generic arguments in scope while resolving a signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericContext<'a> {
    /// Arguments of the declaring type
    pub type_args: &'a [TypeSig],
    /// Arguments of the method
    pub method_args: &'a [TypeSig],
}

impl<'a> GenericContext<'a> {
    /// Context without any arguments; generic parameters stay open.
    #[must_use]
    pub fn empty() -> Self {
        GenericContext::default()
    }

    /// Context of a method instance.
    #[must_use]
    pub fn of(method: &'a MethodInst) -> Self {
        GenericContext {
            type_args: &method.type_args,
            method_args: &method.method_args,
        }
    }

    /// Context of a type instance.
    #[must_use]
    pub fn of_type(ty: &'a TypeSig) -> Self {
        GenericContext {
            type_args: ty.generic_args(),
            method_args: &[],
        }
    }
}

/// A method together with the generic arguments it is instantiated over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodInst {
    /// The method definition
    pub method: MethodId,
    /// Arguments of the declaring type
    pub type_args: Vec<TypeSig>,
    /// Arguments of the method itself
    pub method_args: Vec<TypeSig>,
}

impl MethodInst {
    /// A method of a non-generic type without method arguments.
    #[must_use]
    pub fn plain(method: MethodId) -> Self {
        MethodInst {
            method,
            type_args: Vec::new(),
            method_args: Vec::new(),
        }
    }

    /// True if any argument is still a generic parameter.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.type_args.iter().any(TypeSig::is_open)
            || self.method_args.iter().any(TypeSig::is_open)
    }

    /// Applies `ctx` to all arguments.
    #[must_use]
    pub fn substitute(&self, ctx: &GenericContext<'_>) -> MethodInst {
        MethodInst {
            method: self.method,
            type_args: self.type_args.iter().map(|arg| arg.substitute(ctx)).collect(),
            method_args: self
                .method_args
                .iter()
                .map(|arg| arg.substitute(ctx))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives() {
        assert_eq!(TypeSig::primitive("System.Int32"), Some(TypeSig::I4));
        assert_eq!(TypeSig::primitive("System.Console"), None);
        assert_eq!(TypeSig::String.primitive_name(), Some("System.String"));
        assert!(TypeSig::Char.is_unsigned());
        assert!(!TypeSig::Object.is_primitive_value());
    }

    #[test]
    fn substitution() {
        let list = TypeSig::Named(TypeId(4), vec![TypeSig::Var(0)]);
        let array = TypeSig::SzArray(Box::new(TypeSig::MVar(1)));
        let type_args = [TypeSig::I4];
        let method_args = [TypeSig::String, TypeSig::R8];
        let ctx = GenericContext {
            type_args: &type_args,
            method_args: &method_args,
        };

        assert!(list.is_open());
        assert_eq!(list.substitute(&ctx), TypeSig::Named(TypeId(4), vec![TypeSig::I4]));
        assert_eq!(array.substitute(&ctx), TypeSig::SzArray(Box::new(TypeSig::R8)));
        assert_eq!(TypeSig::Var(3).substitute(&ctx), TypeSig::Var(3));
        assert!(!list.substitute(&ctx).is_open());
    }

    #[test]
    fn ordering_is_structural() {
        let a = MethodInst::plain(MethodId(1));
        let mut b = MethodInst::plain(MethodId(1));
        b.type_args.push(TypeSig::I4);
        assert!(a < b);
        assert!(MethodInst::plain(MethodId(0)) < a);
    }
}
