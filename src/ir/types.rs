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

//! Types, fields and method shells of an IR module.
//!
//! Shells are stored in arenas and addressed by [`IrTypeId`] / [`IrMethodId`]. They are
//! complete before any body is lowered; bodies are attached later through a write-once cell.

use std::{fmt, sync::OnceLock};

use rustc_hash::FxHashMap;

use crate::{
    ir::{attributes::IrAttribute, body::IrBody, StubReason},
    model::{FieldId, MethodInst, TypeId, TypeSig},
};

macro_rules! ir_id {
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

ir_id!(
    /// Index of an [`IrType`] in its module.
    IrTypeId
);
ir_id!(
    /// Index of an [`IrMethod`] in its module.
    IrMethodId
);

/// The lowered program.
#[derive(Debug, Default)]
pub struct IrModule {
    /// Name of the root module
    pub name: String,
    /// Types in deterministic order
    pub types: Vec<IrType>,
    /// Methods in deterministic order
    pub methods: Vec<IrMethod>,
    /// Program entry, `None` for libraries
    pub entry_point: Option<IrMethodId>,
    pub(crate) type_index: FxHashMap<TypeSig, IrTypeId>,
    pub(crate) method_index: FxHashMap<MethodInst, IrMethodId>,
}

impl IrModule {
    /// The type with id `id`.
    #[must_use]
    pub fn ty(&self, id: IrTypeId) -> &IrType {
        &self.types[id.index()]
    }

    /// The method with id `id`.
    #[must_use]
    pub fn method(&self, id: IrMethodId) -> &IrMethod {
        &self.methods[id.index()]
    }

    /// IR type of a resolved type.
    #[must_use]
    pub fn type_of(&self, sig: &TypeSig) -> Option<IrTypeId> {
        self.type_index.get(sig).copied()
    }

    /// IR method of a method instance.
    #[must_use]
    pub fn method_of(&self, inst: &MethodInst) -> Option<IrMethodId> {
        self.method_index.get(inst).copied()
    }

    /// Looks a type up by its readable name, e.g. ``App.Holder`1<System.Int32>``.
    #[must_use]
    pub fn find_type(&self, name: &str) -> Option<&IrType> {
        self.types.iter().find(|ty| ty.name == name)
    }

    /// Looks a method up by its readable name, see [`ModuleSet::method_name`].
    ///
    /// [`ModuleSet::method_name`]: crate::model::ModuleSet::method_name
    #[must_use]
    pub fn find_method(&self, full_name: &str) -> Option<&IrMethod> {
        self.methods.iter().find(|method| method.full_name == full_name)
    }

    /// Methods whose body is a stub.
    pub fn stubs(&self) -> impl Iterator<Item = &IrMethod> {
        self.methods.iter().filter(|method| method.body().is_stub())
    }

    /// Counters describing the module.
    #[must_use]
    pub fn stats(&self) -> IrStats {
        let mut stats = IrStats {
            types: self.types.len(),
            methods: self.methods.len(),
            ..IrStats::default()
        };
        for method in &self.methods {
            match method.body() {
                IrBody::Lowered(body) => {
                    stats.lowered += 1;
                    stats.blocks += body.blocks.len();
                    stats.instructions += body
                        .blocks
                        .iter()
                        .map(|block| block.instructions.len())
                        .sum::<usize>();
                }
                IrBody::Stub(_) => stats.stubs += 1,
            }
        }
        stats
    }
}

/// Counters describing an IR module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IrStats {
    /// Types
    pub types: usize,
    /// Methods
    pub methods: usize,
    /// Methods with a lowered body
    pub lowered: usize,
    /// Methods with a stub body
    pub stubs: usize,
    /// Basic blocks over all lowered bodies
    pub blocks: usize,
    /// Instructions over all lowered bodies
    pub instructions: usize,
}

/// One concrete type.
#[derive(Debug, Clone)]
pub struct IrType {
    /// Id in the module
    pub id: IrTypeId,
    /// Resolved identity
    pub sig: TypeSig,
    /// Definition
    pub def: TypeId,
    /// Readable name, ``System.Collections.Generic.List`1<System.Int32>``
    pub name: String,
    /// Namespace of the definition
    pub namespace: String,
    /// Simple name of the definition
    pub simple_name: String,
    /// Native identifier
    pub mangled: String,
    /// Value type (struct, enum or primitive)
    pub is_value_type: bool,
    /// Interface
    pub is_interface: bool,
    /// Abstract class
    pub is_abstract: bool,
    /// Sealed class
    pub is_sealed: bool,
    /// Underlying type of an enumeration
    pub enum_underlying: Option<TypeSig>,
    /// Direct base type
    pub base: Option<IrTypeId>,
    /// Every implemented interface, transitively, in order
    pub interfaces: Vec<IrTypeId>,
    /// Instance fields declared by this type, in declaration order
    pub instance_fields: Vec<IrField>,
    /// Static fields declared by this type
    pub static_fields: Vec<IrField>,
    /// Reachable methods declared by this type
    pub methods: Vec<IrMethodId>,
    /// Virtual method table, inherited slots first
    pub vtable: Vec<VtableSlot>,
    /// Implementations of every interface in [`IrType::interfaces`]
    pub interface_maps: Vec<InterfaceMap>,
    /// Static constructor, if reachable
    pub static_constructor: Option<IrMethodId>,
    /// Packing and size from `ClassLayout`
    pub class_layout: Option<(u16, u32)>,
    /// Collected custom attributes
    pub attributes: Vec<IrAttribute>,
}

impl IrType {
    /// True for reference types, which carry the object header.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        !self.is_value_type
    }

    /// How this type implements `interface`.
    #[must_use]
    pub fn interface_map(&self, interface: IrTypeId) -> Option<&InterfaceMap> {
        self.interface_maps
            .iter()
            .find(|map| map.interface == interface)
    }

    /// Vtable slot introduced by or overridden with the method definition `inst`.
    #[must_use]
    pub fn vtable_slot_of(&self, inst: &MethodInst) -> Option<usize> {
        self.vtable
            .iter()
            .position(|slot| slot.declaration == *inst)
    }
}

/// One field.
#[derive(Debug, Clone)]
pub struct IrField {
    /// Definition
    pub field: FieldId,
    /// Declared name
    pub name: String,
    /// Native member identifier
    pub mangled: String,
    /// Field type, with the declaring type's arguments substituted
    pub ty: TypeSig,
    /// Static field
    pub is_static: bool,
    /// Collected custom attributes
    pub attributes: Vec<IrAttribute>,
}

/// One virtual method slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtableSlot {
    /// Method instance that introduced the slot
    pub declaration: MethodInst,
    /// Method name, for diagnostics
    pub name: String,
    /// Most derived implementation, `None` for abstract slots and unreachable overrides
    pub implementation: Option<IrMethodId>,
}

/// How a type implements one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMap {
    /// The interface
    pub interface: IrTypeId,
    /// Implementation of each interface slot, in interface slot order
    pub slots: Vec<Option<IrMethodId>>,
}

/// One parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrParam {
    /// Declared name, `argN` when the metadata has none
    pub name: String,
    /// Parameter type
    pub ty: TypeSig,
}

/// A method shell and its body.
#[derive(Debug)]
pub struct IrMethod {
    /// Id in the module
    pub id: IrMethodId,
    /// Instantiated definition
    pub inst: MethodInst,
    /// Declaring type
    pub declaring: IrTypeId,
    /// Declared name, `.ctor` for constructors
    pub name: String,
    /// Readable, overload distinguishing name
    pub full_name: String,
    /// Native function identifier
    pub mangled: String,
    /// Type of `this`; `None` for static methods
    pub this_type: Option<TypeSig>,
    /// Parameters, without `this`
    pub params: Vec<IrParam>,
    /// Return type
    pub return_type: TypeSig,
    /// Static method
    pub is_static: bool,
    /// Virtual method
    pub is_virtual: bool,
    /// Abstract method
    pub is_abstract: bool,
    /// Instance constructor
    pub is_constructor: bool,
    /// Static constructor
    pub is_static_constructor: bool,
    /// Vtable slot of the declaring type this method occupies
    pub vtable_slot: Option<usize>,
    /// Collected custom attributes
    pub attributes: Vec<IrAttribute>,
    pub(crate) body: OnceLock<IrBody>,
}

static UNLOWERED: IrBody = IrBody::Stub(StubReason::NoBody);

impl IrMethod {
    /// The lowered body or stub.
    ///
    /// Before the body pass ran every method reads as a stub without body.
    #[must_use]
    pub fn body(&self) -> &IrBody {
        self.body.get().unwrap_or(&UNLOWERED)
    }

    /// Attaches the body. Only the first call has an effect.
    pub(crate) fn set_body(&self, body: IrBody) -> bool {
        self.body.set(body).is_ok()
    }

    /// Number of arguments including `this`.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.this_type.is_some())
    }

    /// Type of argument `index`, where index 0 is `this` for instance methods.
    #[must_use]
    pub fn arg_type(&self, index: usize) -> Option<&TypeSig> {
        match &self.this_type {
            Some(this) if index == 0 => Some(this),
            Some(_) => self.params.get(index - 1).map(|param| &param.ty),
            None => self.params.get(index).map(|param| &param.ty),
        }
    }
}
