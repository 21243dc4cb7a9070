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

//! The loaded program: a root module plus its transitive reference closure.
//!
//! A [`ModuleSet`] owns every type, method and field record in flat arenas addressed by
//! [`TypeId`], [`MethodId`] and [`FieldId`]. It never changes after construction; all
//! queries take `&self`, and the resolution caches are concurrent maps so the set can be
//! shared across worker threads.

use std::path::Path;

use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    config::BuildConfig,
    metadata::token::Token,
    model::{
        loader::ModuleLoader,
        records::{
            FieldId, FieldRecord, MethodId, MethodRecord, Module, ModuleId, TypeId, TypeRecord,
        },
        typesig::{GenericContext, MethodInst, TypeSig},
    },
    Result,
};

/// A resolved field reference: the field and the (possibly generic) type it is accessed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef {
    /// Field definition
    pub field: FieldId,
    /// Instantiated declaring type
    pub owner: TypeSig,
}

/// A method signature with every type resolved and substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSignature {
    /// Instance method
    pub has_this: bool,
    /// Parameter types, without `this`
    pub params: Vec<TypeSig>,
    /// Return type
    pub return_type: TypeSig,
}

/// Record arenas filled by the loader and the in-memory builder.
#[derive(Debug, Default)]
pub(crate) struct Arenas {
    pub modules: Vec<Module>,
    pub types: Vec<TypeRecord>,
    pub methods: Vec<MethodRecord>,
    pub fields: Vec<FieldRecord>,
}

impl Arenas {
    pub fn next_module(&self) -> ModuleId {
        ModuleId(self.modules.len() as u32)
    }

    pub fn next_type(&self) -> TypeId {
        TypeId(self.types.len() as u32)
    }

    pub fn next_method(&self) -> MethodId {
        MethodId(self.methods.len() as u32)
    }

    pub fn next_field(&self) -> FieldId {
        FieldId(self.fields.len() as u32)
    }

    /// Freezes the arenas into a module set rooted at `root`.
    pub fn into_set(self, root: ModuleId) -> ModuleSet {
        ModuleSet::from_parts(self.modules, self.types, self.methods, self.fields, root)
    }
}

/// The immutable module set.
#[derive(Debug)]
pub struct ModuleSet {
    pub(crate) modules: Vec<Module>,
    pub(crate) types: Vec<TypeRecord>,
    pub(crate) methods: Vec<MethodRecord>,
    pub(crate) fields: Vec<FieldRecord>,
    root: ModuleId,
    module_names: FxHashMap<String, ModuleId>,
    /// Nested-aware full name per module
    type_names: FxHashMap<(ModuleId, String), TypeId>,
    /// First definition of a full name in module order, root module first
    global_names: FxHashMap<String, TypeId>,
    /// Full names defined by more than one module
    shared_names: FxHashSet<String>,
    nested: FxHashMap<(TypeId, String), TypeId>,
    pub(crate) type_ref_cache: DashMap<(ModuleId, u32), TypeId>,
    pub(crate) member_cache: DashMap<(ModuleId, u32), MethodInst>,
}

impl ModuleSet {
    /// Loads `path` and every module it references.
    ///
    /// Referenced modules are probed next to the root module; see [`ModuleLoader`] for
    /// additional search locations.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleNotFound`] if a referenced module cannot be located, or
    /// a parsing error if a module is malformed.
    pub fn load(path: impl AsRef<Path>, config: &BuildConfig) -> Result<ModuleSet> {
        ModuleLoader::new(path.as_ref()).load(config)
    }

    /// Assembles a set from arenas. Module 0 is not required to be the root.
    pub(crate) fn from_parts(
        modules: Vec<Module>,
        types: Vec<TypeRecord>,
        methods: Vec<MethodRecord>,
        fields: Vec<FieldRecord>,
        root: ModuleId,
    ) -> ModuleSet {
        let mut set = ModuleSet {
            modules,
            types,
            methods,
            fields,
            root,
            module_names: FxHashMap::default(),
            type_names: FxHashMap::default(),
            global_names: FxHashMap::default(),
            shared_names: FxHashSet::default(),
            nested: FxHashMap::default(),
            type_ref_cache: DashMap::new(),
            member_cache: DashMap::new(),
        };
        set.build_indexes();
        set
    }

    fn build_indexes(&mut self) {
        for module in &self.modules {
            self.module_names
                .entry(module.name.to_ascii_lowercase())
                .or_insert(module.id);
        }

        for record in &self.types {
            if let Some(enclosing) = record.enclosing {
                self.nested.insert((enclosing, record.name.clone()), record.id);
            }
        }

        let mut order: Vec<ModuleId> = self.modules.iter().map(|module| module.id).collect();
        order.sort_by_key(|id| (*id != self.root, *id));

        for module in order {
            for &id in &self.modules[module.index()].type_defs {
                let name = self.type_full_name(id);
                if self.global_names.contains_key(&name) {
                    self.shared_names.insert(name.clone());
                } else {
                    self.global_names.insert(name.clone(), id);
                }
                self.type_names.insert((module, name), id);
            }
        }
    }

    /// The module compilation started from.
    #[must_use]
    pub fn root_module(&self) -> &Module {
        &self.modules[self.root.index()]
    }

    /// All loaded modules, in load order.
    #[must_use]
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Module by id.
    #[must_use]
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    /// Module by assembly name, ignoring case.
    #[must_use]
    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.module_names
            .get(&name.to_ascii_lowercase())
            .map(|id| self.module(*id))
    }

    /// Every type of every module.
    pub fn types(&self) -> impl Iterator<Item = &TypeRecord> {
        self.types.iter()
    }

    /// Every method of every module.
    pub fn methods(&self) -> impl Iterator<Item = &MethodRecord> {
        self.methods.iter()
    }

    /// Type record by id.
    #[must_use]
    pub fn type_record(&self, id: TypeId) -> &TypeRecord {
        &self.types[id.index()]
    }

    /// Method record by id.
    #[must_use]
    pub fn method(&self, id: MethodId) -> &MethodRecord {
        &self.methods[id.index()]
    }

    /// Field record by id.
    #[must_use]
    pub fn field(&self, id: FieldId) -> &FieldRecord {
        &self.fields[id.index()]
    }

    /// Looks a type up by its full name (`Namespace.Name`, nested types as `Outer/Inner`).
    ///
    /// The root module wins over referenced modules defining the same name.
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<TypeId> {
        self.global_names.get(full_name).copied()
    }

    /// Looks a type up inside one module.
    #[must_use]
    pub fn find_type_in(&self, module: ModuleId, full_name: &str) -> Option<TypeId> {
        self.type_names.get(&(module, full_name.to_string())).copied()
    }

    /// Nested type `name` of `enclosing`.
    #[must_use]
    pub fn find_nested(&self, enclosing: TypeId, name: &str) -> Option<TypeId> {
        self.nested.get(&(enclosing, name.to_string())).copied()
    }

    /// Method `name` declared directly on `ty`, the first one if overloaded.
    #[must_use]
    pub fn find_method(&self, ty: TypeId, name: &str) -> Option<MethodId> {
        self.type_record(ty)
            .methods
            .iter()
            .copied()
            .find(|id| self.method(*id).name == name)
    }

    /// Field `name` declared directly on `ty`.
    #[must_use]
    pub fn find_field(&self, ty: TypeId, name: &str) -> Option<FieldId> {
        self.type_record(ty)
            .fields
            .iter()
            .copied()
            .find(|id| self.field(*id).name == name)
    }

    /// Managed entry point of the root module.
    #[must_use]
    pub fn entry_point(&self) -> Option<MethodId> {
        self.root_module().entry_point
    }

    /// String literal of an `ldstr` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the module has no literal at that offset.
    pub fn user_string(&self, module: ModuleId, token: Token) -> Result<&str> {
        self.module(module)
            .user_strings
            .get(&token.row())
            .map(String::as_str)
            .ok_or(crate::Error::InvalidToken(token))
    }

    /// True if a type with the full name of `id` is also defined by another module.
    #[must_use]
    pub fn is_name_shared(&self, id: TypeId) -> bool {
        self.shared_names.contains(&self.type_full_name(id))
    }

    /// Full name including enclosing types, `Outer/Inner` for nested types.
    #[must_use]
    pub fn type_full_name(&self, id: TypeId) -> String {
        let record = self.type_record(id);
        match record.enclosing {
            Some(enclosing) => format!("{}/{}", self.type_full_name(enclosing), record.name),
            None => record.full_name(),
        }
    }

    /// Resolved type of a definition instantiated over `args`.
    ///
    /// Well-known core library types collapse to their primitive variant.
    #[must_use]
    pub fn def_sig(&self, id: TypeId, args: Vec<TypeSig>) -> TypeSig {
        if args.is_empty() && self.type_record(id).enclosing.is_none() {
            if let Some(primitive) = TypeSig::primitive(&self.type_record(id).full_name()) {
                return primitive;
            }
        }
        TypeSig::Named(id, args)
    }

    /// The definition behind a resolved type.
    ///
    /// Primitive variants map to their core library definition, arrays to `System.Array`.
    #[must_use]
    pub fn type_def_of(&self, ty: &TypeSig) -> Option<TypeId> {
        match ty {
            TypeSig::Named(id, _) => Some(*id),
            TypeSig::SzArray(_) | TypeSig::Array(..) => self.find_type("System.Array"),
            other => other.primitive_name().and_then(|name| self.find_type(name)),
        }
    }

    /// Static constructor of a type, if it declares one.
    #[must_use]
    pub fn static_constructor(&self, id: TypeId) -> Option<MethodId> {
        self.type_record(id)
            .methods
            .iter()
            .copied()
            .find(|method| self.method(*method).is_static_constructor())
    }

    /// Full name of the direct base type of a definition, ignoring generic arguments.
    #[must_use]
    pub fn base_type_name(&self, id: TypeId) -> Option<String> {
        let record = self.type_record(id);
        let extends = record.extends?;
        self.resolve_type_def_or_ref(record.module, extends)
            .ok()
            .map(|base| self.type_full_name(base))
    }

    /// True for enumerations.
    #[must_use]
    pub fn is_enum(&self, id: TypeId) -> bool {
        self.base_type_name(id).as_deref() == Some("System.Enum")
    }

    /// Underlying integer type of an enumeration.
    #[must_use]
    pub fn enum_underlying(&self, id: TypeId) -> Option<TypeSig> {
        if !self.is_enum(id) {
            return None;
        }
        let record = self.type_record(id);
        record
            .fields
            .iter()
            .map(|field| self.field(*field))
            .find(|field| !field.is_static())
            .and_then(|field| {
                self.resolve_signature(record.module, &field.signature, &GenericContext::empty())
                    .ok()
            })
    }

    /// True for value types: primitives, pointers, enums and structs.
    #[must_use]
    pub fn is_value_type(&self, ty: &TypeSig) -> bool {
        match ty {
            TypeSig::Named(id, _) => {
                let name = self.type_full_name(*id);
                if name == "System.Enum" {
                    return false;
                }
                matches!(
                    self.base_type_name(*id).as_deref(),
                    Some("System.ValueType" | "System.Enum")
                )
            }
            TypeSig::Ptr(_) | TypeSig::FnPtr | TypeSig::TypedByRef => true,
            other => other.is_primitive_value(),
        }
    }

    /// True for interfaces.
    #[must_use]
    pub fn is_interface(&self, ty: &TypeSig) -> bool {
        ty.type_id()
            .is_some_and(|id| self.type_record(id).is_interface())
    }

    /// Readable name of a resolved type, e.g. ``System.Collections.Generic.List`1<System.Int32>``.
    #[must_use]
    pub fn type_name(&self, ty: &TypeSig) -> String {
        match ty {
            TypeSig::Named(id, args) => {
                let name = self.type_full_name(*id);
                if args.is_empty() {
                    name
                } else {
                    let args: Vec<String> = args.iter().map(|arg| self.type_name(arg)).collect();
                    format!("{}<{}>", name, args.join(","))
                }
            }
            TypeSig::SzArray(inner) => format!("{}[]", self.type_name(inner)),
            TypeSig::Array(inner, rank) => format!(
                "{}[{}]",
                self.type_name(inner),
                ",".repeat((*rank as usize).saturating_sub(1))
            ),
            TypeSig::Ptr(inner) => format!("{}*", self.type_name(inner)),
            TypeSig::ByRef(inner) => format!("{}&", self.type_name(inner)),
            TypeSig::FnPtr => "method*".to_string(),
            TypeSig::Var(index) => format!("!{index}"),
            TypeSig::MVar(index) => format!("!!{index}"),
            other => other.primitive_name().unwrap_or("?").to_string(),
        }
    }

    /// Readable, overload-distinguishing name of a method instance,
    /// e.g. `System.Int32 Demo.Calc::Add(System.Int32,System.Int32)`.
    ///
    /// # Errors
    /// Returns an error if a parameter type cannot be resolved.
    pub fn method_name(&self, method: &MethodInst) -> Result<String> {
        let record = self.method(method.method);
        let owner = self.def_sig(record.declaring_type, method.type_args.clone());
        let signature = self.method_signature(method)?;

        let mut name = format!(
            "{} {}::{}",
            self.type_name(&signature.return_type),
            self.type_name(&owner),
            record.name
        );
        if !method.method_args.is_empty() {
            let args: Vec<String> = method
                .method_args
                .iter()
                .map(|arg| self.type_name(arg))
                .collect();
            name.push('<');
            name.push_str(&args.join(","));
            name.push('>');
        }
        let params: Vec<String> = signature
            .params
            .iter()
            .map(|param| self.type_name(param))
            .collect();
        name.push('(');
        name.push_str(&params.join(","));
        name.push(')');
        Ok(name)
    }
}
