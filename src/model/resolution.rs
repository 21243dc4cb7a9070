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

//! Cross-module resolution of tokens and signatures.
//!
//! `TypeRef`s follow their resolution scope (the module itself, another module of the
//! assembly, an assembly reference, or an enclosing `TypeRef`) and chase `ExportedType`
//! forwarders up to [`MAX_RESOLUTION_DEPTH`] hops. `MemberRef`s are matched by name and by
//! comparing the open signatures of candidates on the parent type and its base types.
//! Every failure is an [`Error::UnresolvedReference`]; callers decide whether that is fatal.

use std::collections::BTreeSet;

use crate::{
    metadata::{
        customattributes::EnumResolver,
        method::MethodAttributes,
        signatures::{SignatureMethod, TypeSignature},
        tables::TableId,
        token::Token,
    },
    model::{
        moduleset::{FieldRef, ModuleSet, ResolvedSignature},
        records::{MemberRefSignature, MethodId, Module, ModuleId, ResolutionScope, TypeId},
        typesig::{GenericContext, MethodInst, TypeSig},
    },
    Error, Result,
};

/// Maximum number of scope hops and forwarders followed while resolving one type.
pub const MAX_RESOLUTION_DEPTH: usize = 32;

fn unresolved(module: &Module, what: impl std::fmt::Display) -> Error {
    Error::UnresolvedReference(format!("{} (referenced from '{}')", what, module.name))
}

impl ModuleSet {
    /// Resolves a `TypeDef` or `TypeRef` token to its definition.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if the definition cannot be found and
    /// [`Error::InvalidToken`] for tokens of other tables.
    pub fn resolve_type_def_or_ref(&self, module: ModuleId, token: Token) -> Result<TypeId> {
        match token.table_id() {
            Some(TableId::TypeDef) => self
                .module(module)
                .type_def(token.row())
                .ok_or(Error::InvalidToken(token)),
            Some(TableId::TypeRef) => self.resolve_type_ref(module, token.row(), 0),
            _ => Err(Error::InvalidToken(token)),
        }
    }

    fn resolve_type_ref(&self, module: ModuleId, rid: u32, depth: usize) -> Result<TypeId> {
        if depth > MAX_RESOLUTION_DEPTH {
            return Err(Error::RecursionLimit(MAX_RESOLUTION_DEPTH));
        }
        if let Some(cached) = self.type_ref_cache.get(&(module, rid)) {
            return Ok(*cached);
        }

        let owner = self.module(module);
        let Some(reference) = Module::row(&owner.type_refs, rid) else {
            return Err(Error::InvalidToken(Token::from_parts(TableId::TypeRef, rid)));
        };
        let full_name = if reference.namespace.is_empty() {
            reference.name.clone()
        } else {
            format!("{}.{}", reference.namespace, reference.name)
        };

        let resolved = match &reference.scope {
            ResolutionScope::Module => self.find_type_in(module, &full_name),
            ResolutionScope::ModuleRef(name) => {
                let simple = name.trim_end_matches(".dll").trim_end_matches(".netmodule");
                self.module_by_name(simple)
                    .and_then(|target| self.find_type_in(target.id, &full_name))
            }
            ResolutionScope::AssemblyRef(assembly) => {
                let target = self.module_for_assembly_ref(module, *assembly)?;
                Some(self.find_in_assembly(
                    target,
                    &reference.namespace,
                    &reference.name,
                    depth + 1,
                )?)
            }
            ResolutionScope::TypeRef(enclosing) => {
                let enclosing = self.resolve_type_ref(module, *enclosing, depth + 1)?;
                self.find_nested(enclosing, &reference.name)
            }
            ResolutionScope::Exported => self.find_type(&full_name),
        };

        let Some(resolved) = resolved else {
            return Err(unresolved(owner, format!("type '{full_name}'")));
        };
        self.type_ref_cache.insert((module, rid), resolved);
        Ok(resolved)
    }

    /// Module loaded for `AssemblyRef` row `rid` of `module`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if the referenced assembly is not loaded.
    pub fn module_for_assembly_ref(&self, module: ModuleId, rid: u32) -> Result<ModuleId> {
        let owner = self.module(module);
        let Some(reference) = Module::row(&owner.assembly_refs, rid) else {
            return Err(Error::InvalidToken(Token::from_parts(TableId::AssemblyRef, rid)));
        };
        self.module_by_name(&reference.name)
            .map(|target| target.id)
            .ok_or_else(|| unresolved(owner, format!("assembly '{}'", reference.name)))
    }

    /// Finds a top-level type in an assembly, following its type forwarders.
    fn find_in_assembly(
        &self,
        target: ModuleId,
        namespace: &str,
        name: &str,
        depth: usize,
    ) -> Result<TypeId> {
        if depth > MAX_RESOLUTION_DEPTH {
            return Err(Error::RecursionLimit(MAX_RESOLUTION_DEPTH));
        }

        let full_name = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        };
        if let Some(found) = self.find_type_in(target, &full_name) {
            return Ok(found);
        }

        let module = self.module(target);
        let forwarder = module.exported_types.iter().find(|exported| {
            exported.namespace == namespace
                && exported.name == name
                && !exported.implementation.is_table(TableId::ExportedType)
        });
        let Some(forwarder) = forwarder else {
            return Err(unresolved(module, format!("type '{full_name}'")));
        };

        match forwarder.implementation.table_id() {
            Some(TableId::AssemblyRef) => {
                let next = self.module_for_assembly_ref(target, forwarder.implementation.row())?;
                log::trace!("'{}' forwarded from '{}'", full_name, module.name);
                self.find_in_assembly(next, namespace, name, depth + 1)
            }
            _ => self
                .find_type(&full_name)
                .ok_or_else(|| unresolved(module, format!("type '{full_name}'"))),
        }
    }

    /// Resolves a `TypeDef`, `TypeRef` or `TypeSpec` token to a type in context `ctx`.
    ///
    /// Generic definitions referenced by plain token are instantiated over their own
    /// parameters, then substituted with `ctx`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if the type cannot be found.
    pub fn resolve_type(
        &self,
        module: ModuleId,
        token: Token,
        ctx: &GenericContext<'_>,
    ) -> Result<TypeSig> {
        if token.is_table(TableId::TypeSpec) {
            let owner = self.module(module);
            let Some(spec) = Module::row(&owner.type_specs, token.row()) else {
                return Err(Error::InvalidToken(token));
            };
            return self.resolve_signature(module, spec, ctx);
        }

        let id = self.resolve_type_def_or_ref(module, token)?;
        Ok(self.open_instance(id).substitute(ctx))
    }

    /// A definition instantiated over its own generic parameters.
    #[must_use]
    pub fn open_instance(&self, id: TypeId) -> TypeSig {
        let arity = self.type_record(id).arity() as u32;
        self.def_sig(id, (0..arity).map(TypeSig::Var).collect())
    }

    /// Resolves a module-local signature type in context `ctx`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if a referenced type cannot be found.
    pub fn resolve_signature(
        &self,
        module: ModuleId,
        signature: &TypeSignature,
        ctx: &GenericContext<'_>,
    ) -> Result<TypeSig> {
        let boxed = |inner: &TypeSignature| -> Result<Box<TypeSig>> {
            Ok(Box::new(self.resolve_signature(module, inner, ctx)?))
        };

        Ok(match signature {
            TypeSignature::Void => TypeSig::Void,
            TypeSignature::Boolean => TypeSig::Boolean,
            TypeSignature::Char => TypeSig::Char,
            TypeSignature::I1 => TypeSig::I1,
            TypeSignature::U1 => TypeSig::U1,
            TypeSignature::I2 => TypeSig::I2,
            TypeSignature::U2 => TypeSig::U2,
            TypeSignature::I4 => TypeSig::I4,
            TypeSignature::U4 => TypeSig::U4,
            TypeSignature::I8 => TypeSig::I8,
            TypeSignature::U8 => TypeSig::U8,
            TypeSignature::R4 => TypeSig::R4,
            TypeSignature::R8 => TypeSig::R8,
            TypeSignature::I => TypeSig::I,
            TypeSignature::U => TypeSig::U,
            TypeSignature::String => TypeSig::String,
            TypeSignature::Object => TypeSig::Object,
            TypeSignature::TypedByRef => TypeSig::TypedByRef,
            TypeSignature::Ptr(inner) => TypeSig::Ptr(boxed(inner)?),
            TypeSignature::ByRef(inner) => TypeSig::ByRef(boxed(inner)?),
            TypeSignature::Pinned(inner) => self.resolve_signature(module, inner, ctx)?,
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => {
                self.resolve_type(module, *token, ctx)?
            }
            TypeSignature::GenericParamType(index) => TypeSig::Var(*index).substitute(ctx),
            TypeSignature::GenericParamMethod(index) => TypeSig::MVar(*index).substitute(ctx),
            TypeSignature::Array(array) => TypeSig::Array(boxed(&array.base)?, array.rank),
            TypeSignature::SzArray(inner) => TypeSig::SzArray(boxed(inner)?),
            TypeSignature::GenericInst(base, args) => {
                let (TypeSignature::Class(token) | TypeSignature::ValueType(token)) = base.as_ref()
                else {
                    return Err(malformed_error!("Generic instantiation of a non-class type"));
                };
                let id = self.resolve_type_def_or_ref(module, *token)?;
                let args = args
                    .iter()
                    .map(|arg| self.resolve_signature(module, arg, ctx))
                    .collect::<Result<Vec<_>>>()?;
                TypeSig::Named(id, args)
            }
            TypeSignature::FnPtr(_) => TypeSig::FnPtr,
        })
    }

    /// Signature of a method instance with all generic parameters substituted.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if a parameter type cannot be found.
    pub fn method_signature(&self, method: &MethodInst) -> Result<ResolvedSignature> {
        let record = self.method(method.method);
        self.resolve_method_signature(
            record.module,
            &record.signature,
            &GenericContext::of(method),
        )
    }

    fn resolve_method_signature(
        &self,
        module: ModuleId,
        signature: &SignatureMethod,
        ctx: &GenericContext<'_>,
    ) -> Result<ResolvedSignature> {
        Ok(ResolvedSignature {
            has_this: signature.has_this,
            params: signature
                .params
                .iter()
                .map(|param| self.resolve_signature(module, param, ctx))
                .collect::<Result<Vec<_>>>()?,
            return_type: self.resolve_signature(module, &signature.return_type, ctx)?,
        })
    }

    /// Resolves a `MethodDef`, `MemberRef` or `MethodSpec` token in context `ctx`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if no matching method exists.
    pub fn resolve_method(
        &self,
        module: ModuleId,
        token: Token,
        ctx: &GenericContext<'_>,
    ) -> Result<MethodInst> {
        let owner = self.module(module);
        match token.table_id() {
            Some(TableId::MethodDef) => {
                let id = owner.method_def(token.row()).ok_or(Error::InvalidToken(token))?;
                Ok(self.open_method(id).substitute(ctx))
            }
            Some(TableId::MemberRef) => {
                if let Some(cached) = self.member_cache.get(&(module, token.row())) {
                    return Ok(cached.substitute(ctx));
                }
                let open = self.resolve_member_method(module, token)?;
                self.member_cache.insert((module, token.row()), open.clone());
                Ok(open.substitute(ctx))
            }
            Some(TableId::MethodSpec) => {
                let Some(spec) = Module::row(&owner.method_specs, token.row()) else {
                    return Err(Error::InvalidToken(token));
                };
                let mut method = self.resolve_method(module, spec.method, ctx)?;
                method.method_args = spec
                    .instantiation
                    .iter()
                    .map(|arg| self.resolve_signature(module, arg, ctx))
                    .collect::<Result<Vec<_>>>()?;
                Ok(method)
            }
            _ => Err(Error::InvalidToken(token)),
        }
    }

    /// A method instantiated over its own type and method parameters.
    #[must_use]
    pub fn open_method(&self, id: MethodId) -> MethodInst {
        let record = self.method(id);
        let type_arity = self.type_record(record.declaring_type).arity() as u32;
        MethodInst {
            method: id,
            type_args: (0..type_arity).map(TypeSig::Var).collect(),
            method_args: (0..record.arity() as u32).map(TypeSig::MVar).collect(),
        }
    }

    fn resolve_member_method(&self, module: ModuleId, token: Token) -> Result<MethodInst> {
        let owner = self.module(module);
        let Some(member) = Module::row(&owner.member_refs, token.row()) else {
            return Err(Error::InvalidToken(token));
        };
        let MemberRefSignature::Method(signature) = &member.signature else {
            return Err(unresolved(
                owner,
                format!("method '{}' has a field signature", member.name),
            ));
        };

        match member.parent.table_id() {
            Some(TableId::MethodDef) => {
                let id = owner
                    .method_def(member.parent.row())
                    .ok_or(Error::InvalidToken(member.parent))?;
                return Ok(self.open_method(id));
            }
            Some(TableId::ModuleRef) => {
                let name = Module::row(&owner.module_refs, member.parent.row())
                    .ok_or(Error::InvalidToken(member.parent))?;
                let target = self
                    .module_by_name(name.trim_end_matches(".dll"))
                    .ok_or_else(|| unresolved(owner, format!("module '{name}'")))?;
                let global = self
                    .find_type_in(target.id, "<Module>")
                    .ok_or_else(|| unresolved(owner, format!("global '{}'", member.name)))?;
                let found = self.match_method(global, module, &member.name, signature)?;
                return found
                    .map(|id| self.open_method(id))
                    .ok_or_else(|| unresolved(owner, format!("method '{}'", member.name)));
            }
            _ => {}
        }

        let parent = self.resolve_type(module, member.parent, &GenericContext::empty())?;
        let mut current = Some(parent.clone());
        let mut depth = 0;
        while let Some(ty) = current {
            let Some(def) = self.type_def_of(&ty) else {
                break;
            };
            if let Some(found) = self.match_method(def, module, &member.name, signature)? {
                let arity = self.method(found).arity() as u32;
                return Ok(MethodInst {
                    method: found,
                    type_args: ty.generic_args().to_vec(),
                    method_args: (0..arity).map(TypeSig::MVar).collect(),
                });
            }
            depth += 1;
            if depth > MAX_RESOLUTION_DEPTH {
                return Err(Error::RecursionLimit(MAX_RESOLUTION_DEPTH));
            }
            current = self.base_type(&ty)?;
        }

        Err(unresolved(
            owner,
            format!("method '{}::{}'", self.type_name(&parent), member.name),
        ))
    }

    /// Finds a method of `ty` by name whose open signature equals `signature`, which is
    /// expressed in `module`'s tokens.
    fn match_method(
        &self,
        ty: TypeId,
        module: ModuleId,
        name: &str,
        signature: &SignatureMethod,
    ) -> Result<Option<MethodId>> {
        let mut wanted = None;
        for &candidate in &self.type_record(ty).methods {
            let record = self.method(candidate);
            if record.name != name
                || record.signature.has_this != signature.has_this
                || record.signature.generic_param_count != signature.generic_param_count
                || record.signature.params.len() != signature.params.len()
            {
                continue;
            }

            if wanted.is_none() {
                wanted = Some(self.resolve_method_signature(
                    module,
                    signature,
                    &GenericContext::empty(),
                )?);
            }
            let Some(wanted) = &wanted else {
                continue;
            };
            let actual = self.resolve_method_signature(
                record.module,
                &record.signature,
                &GenericContext::empty(),
            )?;
            if actual.params == wanted.params && actual.return_type == wanted.return_type {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Resolves a `Field` or `MemberRef` token in context `ctx`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if no field of that name exists on the
    /// parent type or its bases.
    pub fn resolve_field(
        &self,
        module: ModuleId,
        token: Token,
        ctx: &GenericContext<'_>,
    ) -> Result<FieldRef> {
        let owner = self.module(module);
        match token.table_id() {
            Some(TableId::Field) => {
                let field = owner.field_def(token.row()).ok_or(Error::InvalidToken(token))?;
                let declaring = self.field(field).declaring_type;
                Ok(FieldRef {
                    field,
                    owner: self.open_instance(declaring).substitute(ctx),
                })
            }
            Some(TableId::MemberRef) => {
                let Some(member) = Module::row(&owner.member_refs, token.row()) else {
                    return Err(Error::InvalidToken(token));
                };
                if !matches!(member.signature, MemberRefSignature::Field(_)) {
                    return Err(unresolved(
                        owner,
                        format!("field '{}' has a method signature", member.name),
                    ));
                }

                let parent = self.resolve_type(module, member.parent, ctx)?;
                let mut current = Some(parent.clone());
                let mut depth = 0;
                while let Some(ty) = current {
                    if let Some(field) = self
                        .type_def_of(&ty)
                        .and_then(|def| self.find_field(def, &member.name))
                    {
                        return Ok(FieldRef { field, owner: ty });
                    }
                    depth += 1;
                    if depth > MAX_RESOLUTION_DEPTH {
                        return Err(Error::RecursionLimit(MAX_RESOLUTION_DEPTH));
                    }
                    current = self.base_type(&ty)?;
                }
                Err(unresolved(
                    owner,
                    format!("field '{}::{}'", self.type_name(&parent), member.name),
                ))
            }
            _ => Err(Error::InvalidToken(token)),
        }
    }

    /// Type of a field accessed through `owner`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if the field type cannot be found.
    pub fn field_type(&self, field: &FieldRef) -> Result<TypeSig> {
        let record = self.field(field.field);
        self.resolve_signature(
            record.module,
            &record.signature,
            &GenericContext::of_type(&field.owner),
        )
    }

    /// Direct base type, instantiated for `ty`.
    ///
    /// Arrays derive from `System.Array`, strings and `System.ValueType` from `System.Object`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if the base type reference cannot be resolved.
    pub fn base_type(&self, ty: &TypeSig) -> Result<Option<TypeSig>> {
        if matches!(ty, TypeSig::SzArray(_) | TypeSig::Array(..)) {
            return Ok(self
                .find_type("System.Array")
                .map(|array| TypeSig::Named(array, Vec::new())));
        }
        if *ty == TypeSig::Object {
            return Ok(None);
        }

        let Some(def) = self.type_def_of(ty) else {
            return Ok(None);
        };
        let record = self.type_record(def);
        match record.extends {
            Some(extends) if !extends.is_null() => Ok(Some(self.resolve_type(
                record.module,
                extends,
                &GenericContext::of_type(ty),
            )?)),
            _ => Ok(None),
        }
    }

    /// Interfaces declared directly on `ty`, instantiated for `ty`.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if an interface reference cannot be resolved.
    pub fn interfaces(&self, ty: &TypeSig) -> Result<Vec<TypeSig>> {
        let Some(def) = self.type_def_of(ty) else {
            return Ok(Vec::new());
        };
        let record = self.type_record(def);
        let ctx = GenericContext::of_type(ty);
        record
            .interfaces
            .iter()
            .map(|token| self.resolve_type(record.module, *token, &ctx))
            .collect()
    }

    /// Every interface `ty` implements, directly, through base types or through interface
    /// inheritance, in sorted order.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if a reference cannot be resolved.
    pub fn all_interfaces(&self, ty: &TypeSig) -> Result<BTreeSet<TypeSig>> {
        let mut found = BTreeSet::new();
        let mut pending: Vec<TypeSig> = Vec::new();

        let mut current = Some(ty.clone());
        let mut depth = 0;
        while let Some(level) = current {
            pending.extend(self.interfaces(&level)?);
            depth += 1;
            if depth > MAX_RESOLUTION_DEPTH {
                return Err(Error::RecursionLimit(MAX_RESOLUTION_DEPTH));
            }
            current = self.base_type(&level)?;
        }

        while let Some(interface) = pending.pop() {
            if found.insert(interface.clone()) {
                pending.extend(self.interfaces(&interface)?);
            }
        }
        Ok(found)
    }

    /// True if a value of `sub` is assignable to `sup` through inheritance or interfaces.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if a reference cannot be resolved.
    pub fn is_subtype(&self, sub: &TypeSig, sup: &TypeSig) -> Result<bool> {
        if sub == sup || *sup == TypeSig::Object {
            return Ok(true);
        }

        if self.is_interface(sup) {
            return Ok(self.all_interfaces(sub)?.contains(sup));
        }

        let mut current = self.base_type(sub)?;
        let mut depth = 0;
        while let Some(level) = current {
            if level == *sup {
                return Ok(true);
            }
            depth += 1;
            if depth > MAX_RESOLUTION_DEPTH {
                return Err(Error::RecursionLimit(MAX_RESOLUTION_DEPTH));
            }
            current = self.base_type(&level)?;
        }
        Ok(false)
    }

    /// Implementation of virtual `slot` that a call on an object of exact type `receiver`
    /// dispatches to.
    ///
    /// Explicit overrides (`MethodImpl`) win over name and signature matches; `newslot`
    /// methods start a new slot and never override a class method. A default interface
    /// method with a body is its own implementation. Returns `None` if nothing but abstract
    /// declarations exist.
    ///
    /// # Errors
    /// Returns [`Error::UnresolvedReference`] if a reference cannot be resolved.
    pub fn find_override(
        &self,
        receiver: &TypeSig,
        slot: &MethodInst,
    ) -> Result<Option<MethodInst>> {
        let slot_record = self.method(slot.method);
        let slot_on_interface = self.type_record(slot_record.declaring_type).is_interface();
        let slot_signature = self.method_signature(slot)?;

        let mut current = Some(receiver.clone());
        let mut depth = 0;
        while let Some(ty) = current {
            let Some(def) = self.type_def_of(&ty) else {
                break;
            };
            let record = self.type_record(def);
            let ctx = GenericContext::of_type(&ty);

            for (body, declaration) in &record.method_impls {
                let declared = self.resolve_method(record.module, *declaration, &ctx)?;
                if declared.method == slot.method && declared.type_args == slot.type_args {
                    let mut target = self.resolve_method(record.module, *body, &ctx)?;
                    target.method_args.clone_from(&slot.method_args);
                    return Ok(Some(target));
                }
            }

            for &candidate in &record.methods {
                let method = self.method(candidate);
                if method.name != slot_record.name
                    || !method.is_virtual()
                    || method.is_abstract()
                    || method.arity() != slot_record.arity()
                {
                    continue;
                }
                if candidate != slot.method
                    && !slot_on_interface
                    && method.flags.contains(MethodAttributes::NEW_SLOT)
                {
                    continue;
                }

                let instance = MethodInst {
                    method: candidate,
                    type_args: ty.generic_args().to_vec(),
                    method_args: slot.method_args.clone(),
                };
                let signature = self.method_signature(&instance)?;
                if signature.params == slot_signature.params
                    && signature.return_type == slot_signature.return_type
                {
                    return Ok(Some(instance));
                }
            }

            depth += 1;
            if depth > MAX_RESOLUTION_DEPTH {
                return Err(Error::RecursionLimit(MAX_RESOLUTION_DEPTH));
            }
            current = self.base_type(&ty)?;
        }

        if slot_on_interface && !slot_record.is_abstract() && slot_record.body.is_some() {
            return Ok(Some(slot.clone()));
        }
        Ok(None)
    }
}

/// Resolves enum types met while decoding custom attribute blobs of one module.
///
/// Failures are reported as "not an enum" rather than as errors.
pub struct AttributeTypeResolver<'a> {
    set: &'a ModuleSet,
    module: ModuleId,
}

impl<'a> AttributeTypeResolver<'a> {
    /// Resolver for blobs stored in `module`.
    #[must_use]
    pub fn new(set: &'a ModuleSet, module: ModuleId) -> Self {
        AttributeTypeResolver { set, module }
    }
}

impl EnumResolver for AttributeTypeResolver<'_> {
    fn type_name(&self, token: Token) -> Option<String> {
        self.set
            .resolve_type_def_or_ref(self.module, token)
            .ok()
            .map(|id| self.set.type_full_name(id))
    }

    fn enum_underlying(&self, full_name: &str) -> Option<TypeSignature> {
        // Serialized names may be assembly qualified and use '+' for nesting
        let name = full_name.split(',').next().unwrap_or(full_name).trim();
        let id = self.set.find_type(&name.replace('+', "/"))?;
        let underlying = self.set.enum_underlying(id)?;
        Some(match underlying {
            TypeSig::Boolean => TypeSignature::Boolean,
            TypeSig::Char => TypeSignature::Char,
            TypeSig::I1 => TypeSignature::I1,
            TypeSig::U1 => TypeSignature::U1,
            TypeSig::I2 => TypeSignature::I2,
            TypeSig::U2 => TypeSignature::U2,
            TypeSig::I4 => TypeSignature::I4,
            TypeSig::U4 => TypeSignature::U4,
            TypeSig::I8 => TypeSignature::I8,
            TypeSig::U8 => TypeSignature::U8,
            _ => return None,
        })
    }
}
