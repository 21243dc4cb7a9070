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

//! In-memory construction of module sets.
//!
//! [`ModuleSetBuilder`] creates the same records the PE loader produces, without going
//! through a binary image. Tokens handed out by the builder behave exactly like metadata
//! tokens: a reference to a member of another module becomes a `TypeRef`/`MemberRef` row
//! of the referencing module, so cross-module resolution is exercised the same way.
//!
//! # Example
//!
//! ```rust
//! use dotnative::metadata::signatures::TypeSignature;
//! use dotnative::model::{MethodBuilder, ModuleSetBuilder, TypeBuilder};
//!
//! let mut builder = ModuleSetBuilder::new();
//! let core = builder.module("System.Runtime");
//! let object = builder.add_type(core, TypeBuilder::class("System", "Object"))?;
//!
//! let app = builder.module("App");
//! builder.set_root(app);
//! let program = builder.add_type(app, TypeBuilder::class("App", "Program").extends(object))?;
//! let main = builder.add_method(
//!     program,
//!     MethodBuilder::static_method("Main").implementation(|asm| {
//!         asm.ret()?;
//!         Ok(())
//!     }),
//! )?;
//! builder.set_entry_point(main);
//!
//! let set = builder.build()?;
//! assert_eq!(set.entry_point(), Some(main));
//! # Ok::<(), dotnative::Error>(())
//! ```

use rustc_hash::FxHashMap;

use crate::{
    disassembler::{decode_stream, InstructionAssembler},
    file::parser::Parser,
    metadata::{
        flags::{FieldAttributes, TypeAttributes},
        method::{ExceptionHandler, MethodAttributes, MethodImplAttributes},
        signatures::{SignatureField, SignatureMethod, TypeSignature},
        tables::TableId,
        token::Token,
    },
    model::{
        moduleset::{Arenas, ModuleSet},
        records::{
            AssemblyRefRecord, AttributeRecord, ExportedTypeRecord, FieldId, FieldRecord,
            MemberRefRecord, MemberRefSignature, MethodBodyRecord, MethodId, MethodRecord,
            MethodSpecRecord, Module, ModuleId, ResolutionScope, TypeId, TypeRecord,
            TypeRefRecord,
        },
    },
    Error, Result,
};

/// Table byte of `ldstr` tokens.
const USER_STRING_TABLE: u32 = 0x7000_0000;

type ImplementationFn = Box<dyn FnOnce(&mut InstructionAssembler) -> Result<()>>;

/// Base type of a [`TypeBuilder`].
enum BaseType {
    Definition(TypeId),
    Token(Token),
}

/// Description of a type definition.
pub struct TypeBuilder {
    namespace: String,
    name: String,
    flags: u32,
    extends: Option<BaseType>,
    interfaces: Vec<BaseType>,
    generic_params: Vec<String>,
    enclosing: Option<TypeId>,
    class_layout: Option<(u16, u32)>,
}

impl TypeBuilder {
    /// A public class.
    #[must_use]
    pub fn class(namespace: &str, name: &str) -> Self {
        TypeBuilder {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags: TypeAttributes::PUBLIC,
            extends: None,
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            enclosing: None,
            class_layout: None,
        }
    }

    /// A public interface.
    #[must_use]
    pub fn interface(namespace: &str, name: &str) -> Self {
        let mut builder = Self::class(namespace, name);
        builder.flags |= TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT;
        builder
    }

    /// Replaces the `TypeAttributes`.
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Derives from a type of the module set.
    #[must_use]
    pub fn extends(mut self, base: TypeId) -> Self {
        self.extends = Some(BaseType::Definition(base));
        self
    }

    /// Derives from a `TypeDefOrRef` or `TypeSpec` token of the defining module.
    #[must_use]
    pub fn extends_token(mut self, base: Token) -> Self {
        self.extends = Some(BaseType::Token(base));
        self
    }

    /// Implements an interface of the module set.
    #[must_use]
    pub fn implements(mut self, interface: TypeId) -> Self {
        self.interfaces.push(BaseType::Definition(interface));
        self
    }

    /// Implements an interface given as a token of the defining module.
    #[must_use]
    pub fn implements_token(mut self, interface: Token) -> Self {
        self.interfaces.push(BaseType::Token(interface));
        self
    }

    /// Declares a generic parameter.
    #[must_use]
    pub fn generic_param(mut self, name: &str) -> Self {
        self.generic_params.push(name.to_string());
        self
    }

    /// Nests the type inside `enclosing`.
    #[must_use]
    pub fn nested_in(mut self, enclosing: TypeId) -> Self {
        self.enclosing = Some(enclosing);
        self.namespace.clear();
        self.flags =
            (self.flags & !TypeAttributes::VISIBILITY_MASK) | TypeAttributes::NESTED_PUBLIC;
        self
    }

    /// Explicit packing and class size.
    #[must_use]
    pub fn class_layout(mut self, packing: u16, size: u32) -> Self {
        self.class_layout = Some((packing, size));
        self
    }
}

/// Description of a method definition.
pub struct MethodBuilder {
    name: String,
    flags: MethodAttributes,
    impl_flags: MethodImplAttributes,
    signature: SignatureMethod,
    param_names: Vec<String>,
    generic_params: Vec<String>,
    locals: Vec<TypeSignature>,
    max_stack: usize,
    init_locals: bool,
    exception_handlers: Vec<ExceptionHandler>,
    implementation: Option<ImplementationFn>,
}

impl MethodBuilder {
    fn new(name: &str, flags: MethodAttributes, has_this: bool) -> Self {
        MethodBuilder {
            name: name.to_string(),
            flags,
            impl_flags: MethodImplAttributes::empty(),
            signature: SignatureMethod {
                has_this,
                ..SignatureMethod::default()
            },
            param_names: Vec::new(),
            generic_params: Vec::new(),
            locals: Vec::new(),
            max_stack: 8,
            init_locals: true,
            exception_handlers: Vec::new(),
            implementation: None,
        }
    }

    /// A public static method returning `void`.
    #[must_use]
    pub fn static_method(name: &str) -> Self {
        Self::new(
            name,
            MethodAttributes::PUBLIC | MethodAttributes::STATIC | MethodAttributes::HIDE_BY_SIG,
            false,
        )
    }

    /// A public instance method returning `void`.
    #[must_use]
    pub fn instance_method(name: &str) -> Self {
        Self::new(
            name,
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
            true,
        )
    }

    /// A public virtual method starting a new slot.
    #[must_use]
    pub fn virtual_method(name: &str) -> Self {
        Self::new(
            name,
            MethodAttributes::PUBLIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::VIRTUAL
                | MethodAttributes::NEW_SLOT,
            true,
        )
    }

    /// A public virtual method reusing the slot of a base class method.
    #[must_use]
    pub fn override_method(name: &str) -> Self {
        Self::new(
            name,
            MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG | MethodAttributes::VIRTUAL,
            true,
        )
    }

    /// An abstract virtual method, as declared on interfaces.
    #[must_use]
    pub fn abstract_method(name: &str) -> Self {
        Self::new(
            name,
            MethodAttributes::PUBLIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::VIRTUAL
                | MethodAttributes::NEW_SLOT
                | MethodAttributes::ABSTRACT,
            true,
        )
    }

    /// A public instance constructor.
    #[must_use]
    pub fn constructor() -> Self {
        Self::new(
            ".ctor",
            MethodAttributes::PUBLIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RTSPECIAL_NAME,
            true,
        )
    }

    /// The static constructor.
    #[must_use]
    pub fn static_constructor() -> Self {
        Self::new(
            ".cctor",
            MethodAttributes::PRIVATE
                | MethodAttributes::STATIC
                | MethodAttributes::HIDE_BY_SIG
                | MethodAttributes::SPECIAL_NAME
                | MethodAttributes::RTSPECIAL_NAME,
            false,
        )
    }

    /// Replaces the `MethodAttributes`.
    #[must_use]
    pub fn flags(mut self, flags: MethodAttributes) -> Self {
        self.flags = flags;
        self.signature.has_this = !flags.contains(MethodAttributes::STATIC);
        self
    }

    /// Sets the `MethodImplAttributes`.
    #[must_use]
    pub fn impl_flags(mut self, flags: MethodImplAttributes) -> Self {
        self.impl_flags = flags;
        self
    }

    /// Appends a parameter.
    #[must_use]
    pub fn param(mut self, name: &str, ty: TypeSignature) -> Self {
        self.signature.params.push(ty);
        self.param_names.push(name.to_string());
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn returns(mut self, ty: TypeSignature) -> Self {
        self.signature.return_type = ty;
        self
    }

    /// Declares a method generic parameter.
    #[must_use]
    pub fn generic_param(mut self, name: &str) -> Self {
        self.generic_params.push(name.to_string());
        self.signature.generic_param_count += 1;
        self
    }

    /// Appends a local variable slot.
    #[must_use]
    pub fn local(mut self, ty: TypeSignature) -> Self {
        self.locals.push(ty);
        self
    }

    /// Declared maximum stack depth (default 8).
    #[must_use]
    pub fn max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }

    /// Adds an exception clause; offsets are IL offsets of the assembled body.
    #[must_use]
    pub fn exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handlers.push(handler);
        self
    }

    /// Supplies the body. Methods without one are abstract or external.
    #[must_use]
    pub fn implementation<F>(mut self, implementation: F) -> Self
    where
        F: FnOnce(&mut InstructionAssembler) -> Result<()> + 'static,
    {
        self.implementation = Some(Box::new(implementation));
        self
    }
}

/// Member an attribute can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeTarget {
    /// A type definition
    Type(TypeId),
    /// A method definition
    Method(MethodId),
    /// A field definition
    Field(FieldId),
}

/// Builds a [`ModuleSet`] in memory.
#[derive(Default)]
pub struct ModuleSetBuilder {
    arenas: Arenas,
    root: Option<ModuleId>,
    type_refs: FxHashMap<(ModuleId, TypeId), Token>,
    /// Types behind every `TypeRef` handed out
    ref_targets: FxHashMap<(ModuleId, Token), TypeId>,
    next_user_string: FxHashMap<ModuleId, u32>,
}

impl ModuleSetBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty module. The first module added is the root unless
    /// [`ModuleSetBuilder::set_root`] says otherwise.
    pub fn module(&mut self, name: &str) -> ModuleId {
        let id = self.arenas.next_module();
        self.arenas.modules.push(Module {
            id,
            name: name.to_string(),
            version: [1, 0, 0, 0],
            ..Module::default()
        });
        id
    }

    /// Selects the root module.
    pub fn set_root(&mut self, module: ModuleId) {
        self.root = Some(module);
    }

    /// Marks the entry point; its module becomes the root.
    pub fn set_entry_point(&mut self, method: MethodId) {
        let module = self.arenas.methods[method.index()].module;
        self.arenas.modules[module.index()].entry_point = Some(method);
        self.root = Some(module);
    }

    /// Defines a type in `module`.
    ///
    /// # Errors
    /// Returns an error if a base or interface token cannot be translated.
    pub fn add_type(&mut self, module: ModuleId, builder: TypeBuilder) -> Result<TypeId> {
        let id = self.arenas.next_type();
        let rid = self.arenas.modules[module.index()].type_defs.len() as u32 + 1;

        let extends = builder
            .extends
            .map(|base| self.base_token(module, base))
            .transpose()?;
        let interfaces = builder
            .interfaces
            .into_iter()
            .map(|interface| self.base_token(module, interface))
            .collect::<Result<Vec<_>>>()?;

        self.arenas.types.push(TypeRecord {
            id,
            module,
            token: Token::from_parts(TableId::TypeDef, rid),
            namespace: builder.namespace,
            name: builder.name,
            flags: builder.flags,
            extends,
            interfaces,
            fields: Vec::new(),
            methods: Vec::new(),
            generic_params: builder.generic_params,
            enclosing: builder.enclosing,
            attributes: Vec::new(),
            method_impls: Vec::new(),
            class_layout: builder.class_layout,
        });
        self.arenas.modules[module.index()].type_defs.push(id);
        Ok(id)
    }

    fn base_token(&mut self, module: ModuleId, base: BaseType) -> Result<Token> {
        match base {
            BaseType::Definition(id) => self.type_token(module, id),
            BaseType::Token(token) => Ok(token),
        }
    }

    /// Defines a method on `ty`.
    ///
    /// # Errors
    /// Returns an error if the body cannot be assembled or decoded.
    pub fn add_method(&mut self, ty: TypeId, builder: MethodBuilder) -> Result<MethodId> {
        let module = self.arenas.types[ty.index()].module;
        let id = self.arenas.next_method();
        let rid = self.arenas.modules[module.index()].method_defs.len() as u32 + 1;

        let body = match builder.implementation {
            Some(implementation) => {
                let mut assembler = InstructionAssembler::new();
                implementation(&mut assembler)?;
                let code = assembler.finish()?;
                let instructions = decode_stream(&mut Parser::new(&code), 0)?;
                Some(MethodBodyRecord {
                    max_stack: builder.max_stack,
                    init_locals: builder.init_locals,
                    locals: builder.locals,
                    exception_handlers: builder.exception_handlers,
                    instructions,
                    code_size: code.len(),
                })
            }
            None => None,
        };

        self.arenas.methods.push(MethodRecord {
            id,
            module,
            declaring_type: ty,
            token: Token::from_parts(TableId::MethodDef, rid),
            name: builder.name,
            flags: builder.flags,
            impl_flags: builder.impl_flags,
            signature: builder.signature,
            param_names: builder.param_names,
            generic_params: builder.generic_params,
            body,
            attributes: Vec::new(),
            sequence_points: None,
        });
        self.arenas.types[ty.index()].methods.push(id);
        self.arenas.modules[module.index()].method_defs.push(id);
        Ok(id)
    }

    /// Defines a field on `ty`. `signature` uses tokens of the declaring module.
    pub fn add_field(
        &mut self,
        ty: TypeId,
        name: &str,
        flags: u32,
        signature: TypeSignature,
    ) -> FieldId {
        let module = self.arenas.types[ty.index()].module;
        let id = self.arenas.next_field();
        let rid = self.arenas.modules[module.index()].field_defs.len() as u32 + 1;

        self.arenas.fields.push(FieldRecord {
            id,
            module,
            declaring_type: ty,
            token: Token::from_parts(TableId::Field, rid),
            name: name.to_string(),
            flags,
            signature,
            attributes: Vec::new(),
        });
        self.arenas.types[ty.index()].fields.push(id);
        self.arenas.modules[module.index()].field_defs.push(id);
        id
    }

    /// Public instance field shorthand.
    pub fn add_instance_field(
        &mut self,
        ty: TypeId,
        name: &str,
        signature: TypeSignature,
    ) -> FieldId {
        self.add_field(ty, name, FieldAttributes::PUBLIC, signature)
    }

    /// Public static field shorthand.
    pub fn add_static_field(
        &mut self,
        ty: TypeId,
        name: &str,
        signature: TypeSignature,
    ) -> FieldId {
        self.add_field(
            ty,
            name,
            FieldAttributes::PUBLIC | FieldAttributes::STATIC,
            signature,
        )
    }

    /// Token of `ty` as seen from module `from`: a `TypeDef` token for local types,
    /// otherwise a `TypeRef` row that is created on first use.
    ///
    /// # Errors
    /// Returns an error if an enclosing type reference cannot be created.
    pub fn type_token(&mut self, from: ModuleId, ty: TypeId) -> Result<Token> {
        let record = &self.arenas.types[ty.index()];
        if record.module == from {
            return Ok(record.token);
        }
        if let Some(token) = self.type_refs.get(&(from, ty)) {
            return Ok(*token);
        }

        let (namespace, name, enclosing, target) = (
            record.namespace.clone(),
            record.name.clone(),
            record.enclosing,
            record.module,
        );
        let scope = match enclosing {
            Some(outer) => ResolutionScope::TypeRef(self.type_token(from, outer)?.row()),
            None => ResolutionScope::AssemblyRef(self.assembly_ref(from, target)),
        };

        let refs = &mut self.arenas.modules[from.index()].type_refs;
        refs.push(TypeRefRecord {
            scope,
            namespace,
            name,
        });
        let token = Token::from_parts(TableId::TypeRef, refs.len() as u32);
        self.type_refs.insert((from, ty), token);
        self.ref_targets.insert((from, token), ty);
        Ok(token)
    }

    /// `AssemblyRef` row of `from` naming module `to`, created on first use.
    pub fn assembly_ref(&mut self, from: ModuleId, to: ModuleId) -> u32 {
        let (name, version) = {
            let target = &self.arenas.modules[to.index()];
            (target.name.clone(), target.version)
        };
        let refs = &mut self.arenas.modules[from.index()].assembly_refs;
        if let Some(index) = refs.iter().position(|reference| reference.name == name) {
            return index as u32 + 1;
        }
        refs.push(AssemblyRefRecord {
            name,
            version,
            public_key_token: None,
            culture: String::new(),
        });
        refs.len() as u32
    }

    /// Adds a `TypeSpec` row to `module`.
    pub fn type_spec(&mut self, module: ModuleId, signature: TypeSignature) -> Token {
        let specs = &mut self.arenas.modules[module.index()].type_specs;
        specs.push(signature);
        Token::from_parts(TableId::TypeSpec, specs.len() as u32)
    }

    /// `Class` signature of `ty` as seen from `from`, or `ValueType` for value types.
    ///
    /// # Errors
    /// Returns an error if a reference row cannot be created.
    pub fn type_signature(&mut self, from: ModuleId, ty: TypeId) -> Result<TypeSignature> {
        let token = self.type_token(from, ty)?;
        if self.is_value_type_def(ty) {
            Ok(TypeSignature::ValueType(token))
        } else {
            Ok(TypeSignature::Class(token))
        }
    }

    fn is_value_type_def(&self, ty: TypeId) -> bool {
        let record = &self.arenas.types[ty.index()];
        let Some(base) = record.extends else {
            return false;
        };
        let base_id = if base.is_table(TableId::TypeDef) {
            self.arenas.modules[record.module.index()].type_def(base.row())
        } else {
            self.ref_targets.get(&(record.module, base)).copied()
        };
        base_id.is_some_and(|base| {
            let base = &self.arenas.types[base.index()];
            base.namespace == "System" && (base.name == "ValueType" || base.name == "Enum")
        })
    }

    /// Rewrites a signature of module `source` into one valid in module `target`.
    fn translate(
        &mut self,
        source: ModuleId,
        target: ModuleId,
        signature: &TypeSignature,
    ) -> Result<TypeSignature> {
        if source == target {
            return Ok(signature.clone());
        }

        Ok(match signature {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                let translated = self.translate_token(source, target, *token)?;
                if matches!(signature, TypeSignature::Class(_)) {
                    TypeSignature::Class(translated)
                } else {
                    TypeSignature::ValueType(translated)
                }
            }
            TypeSignature::Ptr(inner) => {
                TypeSignature::Ptr(Box::new(self.translate(source, target, inner)?))
            }
            TypeSignature::ByRef(inner) => {
                TypeSignature::ByRef(Box::new(self.translate(source, target, inner)?))
            }
            TypeSignature::Pinned(inner) => {
                TypeSignature::Pinned(Box::new(self.translate(source, target, inner)?))
            }
            TypeSignature::SzArray(inner) => {
                TypeSignature::SzArray(Box::new(self.translate(source, target, inner)?))
            }
            TypeSignature::Array(array) => {
                let mut array = array.clone();
                array.base = Box::new(self.translate(source, target, &array.base)?);
                TypeSignature::Array(array)
            }
            TypeSignature::GenericInst(base, args) => TypeSignature::GenericInst(
                Box::new(self.translate(source, target, base)?),
                args.iter()
                    .map(|arg| self.translate(source, target, arg))
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => other.clone(),
        })
    }

    fn translate_token(
        &mut self,
        source: ModuleId,
        target: ModuleId,
        token: Token,
    ) -> Result<Token> {
        let source_module = &self.arenas.modules[source.index()];
        let ty = match token.table_id() {
            Some(TableId::TypeDef) => source_module.type_def(token.row()),
            Some(TableId::TypeRef) => self.ref_targets.get(&(source, token)).copied(),
            Some(TableId::TypeSpec) => {
                let Some(spec) = Module::row(&source_module.type_specs, token.row()).cloned() else {
                    return Err(Error::InvalidToken(token));
                };
                let translated = self.translate(source, target, &spec)?;
                return Ok(self.type_spec(target, translated));
            }
            _ => None,
        };
        let ty = ty.ok_or(Error::InvalidToken(token))?;
        self.type_token(target, ty)
    }

    /// Token of `method` as seen from `from`: a `MethodDef` token for local methods of
    /// non-generic types, otherwise a `MemberRef` on the declaring type.
    ///
    /// # Errors
    /// Returns an error if the signature references an unknown token.
    pub fn method_token(&mut self, from: ModuleId, method: MethodId) -> Result<Token> {
        let record = &self.arenas.methods[method.index()];
        let declaring = record.declaring_type;
        if record.module == from && self.arenas.types[declaring.index()].arity() == 0 {
            return Ok(record.token);
        }

        let parent = self.type_token(from, declaring)?;
        self.member_ref(from, parent, method)
    }

    /// `MemberRef` to `method` on an explicit parent token of `from`, e.g. a `TypeSpec`
    /// of a generic instantiation.
    ///
    /// # Errors
    /// Returns an error if the signature references an unknown token.
    pub fn member_ref(
        &mut self,
        from: ModuleId,
        parent: Token,
        method: MethodId,
    ) -> Result<Token> {
        let record = &self.arenas.methods[method.index()];
        let (source, name, signature) =
            (record.module, record.name.clone(), record.signature.clone());

        let mut translated = signature.clone();
        translated.return_type = self.translate(source, from, &signature.return_type)?;
        translated.params = signature
            .params
            .iter()
            .map(|param| self.translate(source, from, param))
            .collect::<Result<Vec<_>>>()?;

        let refs = &mut self.arenas.modules[from.index()].member_refs;
        refs.push(MemberRefRecord {
            parent,
            name,
            signature: MemberRefSignature::Method(translated),
        });
        Ok(Token::from_parts(TableId::MemberRef, refs.len() as u32))
    }

    /// Token of `field` as seen from `from`.
    ///
    /// # Errors
    /// Returns an error if the field type references an unknown token.
    pub fn field_token(&mut self, from: ModuleId, field: FieldId) -> Result<Token> {
        let record = &self.arenas.fields[field.index()];
        let declaring = record.declaring_type;
        if record.module == from && self.arenas.types[declaring.index()].arity() == 0 {
            return Ok(record.token);
        }

        let parent = self.type_token(from, declaring)?;
        self.field_ref(from, parent, field)
    }

    /// `MemberRef` to `field` on an explicit parent token of `from`.
    ///
    /// # Errors
    /// Returns an error if the field type references an unknown token.
    pub fn field_ref(&mut self, from: ModuleId, parent: Token, field: FieldId) -> Result<Token> {
        let record = &self.arenas.fields[field.index()];
        let (source, name, signature) =
            (record.module, record.name.clone(), record.signature.clone());
        let base = self.translate(source, from, &signature)?;

        let refs = &mut self.arenas.modules[from.index()].member_refs;
        refs.push(MemberRefRecord {
            parent,
            name,
            signature: MemberRefSignature::Field(SignatureField { base }),
        });
        Ok(Token::from_parts(TableId::MemberRef, refs.len() as u32))
    }

    /// `MethodSpec` instantiating the generic method behind `method` (a token of
    /// `module`) over `args`.
    pub fn method_spec(
        &mut self,
        module: ModuleId,
        method: Token,
        args: Vec<TypeSignature>,
    ) -> Token {
        let specs = &mut self.arenas.modules[module.index()].method_specs;
        specs.push(MethodSpecRecord {
            method,
            instantiation: args,
        });
        Token::from_parts(TableId::MethodSpec, specs.len() as u32)
    }

    /// Adds a string literal to `module` and returns its `ldstr` token.
    pub fn user_string(&mut self, module: ModuleId, value: &str) -> Token {
        let next = self.next_user_string.entry(module).or_insert(1);
        let offset = *next;
        // Length prefix, UTF-16 code units and the terminal flag byte
        let units = value.encode_utf16().count() as u32;
        *next += 1 + units * 2 + 1;

        self.arenas.modules[module.index()]
            .user_strings
            .insert(offset, value.to_string());
        Token::new(USER_STRING_TABLE | offset)
    }

    /// Attaches a custom attribute built by `constructor` with the encoded `blob`.
    ///
    /// # Errors
    /// Returns an error if the constructor cannot be referenced from the target's module.
    pub fn add_attribute(
        &mut self,
        target: AttributeTarget,
        constructor: MethodId,
        blob: Vec<u8>,
    ) -> Result<()> {
        let module = match target {
            AttributeTarget::Type(id) => self.arenas.types[id.index()].module,
            AttributeTarget::Method(id) => self.arenas.methods[id.index()].module,
            AttributeTarget::Field(id) => self.arenas.fields[id.index()].module,
        };
        let attribute = AttributeRecord {
            constructor: self.method_token(module, constructor)?,
            blob,
        };

        match target {
            AttributeTarget::Type(id) => self.arenas.types[id.index()].attributes.push(attribute),
            AttributeTarget::Method(id) => {
                self.arenas.methods[id.index()].attributes.push(attribute);
            }
            AttributeTarget::Field(id) => self.arenas.fields[id.index()].attributes.push(attribute),
        }
        Ok(())
    }

    /// Records that `body` explicitly implements `declaration` on `ty`.
    ///
    /// # Errors
    /// Returns an error if either method cannot be referenced from `ty`'s module.
    pub fn add_method_impl(
        &mut self,
        ty: TypeId,
        body: MethodId,
        declaration: MethodId,
    ) -> Result<()> {
        let module = self.arenas.types[ty.index()].module;
        let body = self.method_token(module, body)?;
        let declaration = self.method_token(module, declaration)?;
        self.arenas.types[ty.index()]
            .method_impls
            .push((body, declaration));
        Ok(())
    }

    /// Forwards `namespace.name` of `module` to the assembly `to`.
    pub fn forward_type(&mut self, module: ModuleId, namespace: &str, name: &str, to: ModuleId) {
        let rid = self.assembly_ref(module, to);
        self.arenas.modules[module.index()]
            .exported_types
            .push(ExportedTypeRecord {
                namespace: namespace.to_string(),
                name: name.to_string(),
                implementation: Token::from_parts(TableId::AssemblyRef, rid),
            });
    }

    /// Freezes the builder.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if no module was added.
    pub fn build(self) -> Result<ModuleSet> {
        let Some(root) = self.root.or_else(|| self.arenas.modules.first().map(|module| module.id))
        else {
            return Err(Error::Configuration("module set has no modules".to_string()));
        };
        Ok(self.arenas.into_set(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GenericContext, TypeSig};

    fn corlib(builder: &mut ModuleSetBuilder) -> (ModuleId, TypeId, TypeId) {
        let core = builder.module("System.Runtime");
        let object = builder
            .add_type(core, TypeBuilder::class("System", "Object"))
            .unwrap();
        let value_type = builder
            .add_type(core, TypeBuilder::class("System", "ValueType").extends(object))
            .unwrap();
        (core, object, value_type)
    }

    #[test]
    fn cross_module_references_resolve() {
        let mut builder = ModuleSetBuilder::new();
        let (core, object, value_type) = corlib(&mut builder);
        let point = builder
            .add_type(core, TypeBuilder::class("System", "Point").extends(value_type))
            .unwrap();

        let app = builder.module("App");
        let program = builder
            .add_type(app, TypeBuilder::class("App", "Program").extends(object))
            .unwrap();
        let point_sig = builder.type_signature(app, point).unwrap();
        assert!(matches!(point_sig, TypeSignature::ValueType(_)));

        let field = builder.add_static_field(program, "origin", point_sig);
        builder.set_root(app);
        let set = builder.build().unwrap();

        assert_eq!(set.root_module().name, "App");
        assert_eq!(set.root_module().assembly_refs.len(), 1);
        let record = set.field(field);
        let ty = set
            .resolve_signature(app, &record.signature, &GenericContext::empty())
            .unwrap();
        assert_eq!(ty, TypeSig::Named(point, Vec::new()));
        assert!(set.is_value_type(&ty));
    }

    #[test]
    fn method_refs_match_definitions() {
        let mut builder = ModuleSetBuilder::new();
        let (core, object, _) = corlib(&mut builder);
        let console = builder
            .add_type(core, TypeBuilder::class("System", "Console").extends(object))
            .unwrap();
        let write_line = builder
            .add_method(
                console,
                MethodBuilder::static_method("WriteLine").param("value", TypeSignature::String),
            )
            .unwrap();
        builder
            .add_method(
                console,
                MethodBuilder::static_method("WriteLine").param("value", TypeSignature::I4),
            )
            .unwrap();

        let app = builder.module("App");
        let token = builder.method_token(app, write_line).unwrap();
        assert!(token.is_table(TableId::MemberRef));
        let literal = builder.user_string(app, "hi");
        builder.set_root(app);
        let set = builder.build().unwrap();

        let resolved = set
            .resolve_method(app, token, &GenericContext::empty())
            .unwrap();
        assert_eq!(resolved.method, write_line);
        assert_eq!(set.user_string(app, literal).unwrap(), "hi");
    }

    #[test]
    fn bodies_are_decoded() {
        let mut builder = ModuleSetBuilder::new();
        let (core, object, _) = corlib(&mut builder);
        let math = builder
            .add_type(core, TypeBuilder::class("System", "Calc").extends(object))
            .unwrap();
        let add = builder
            .add_method(
                math,
                MethodBuilder::static_method("Add")
                    .param("a", TypeSignature::I4)
                    .param("b", TypeSignature::I4)
                    .returns(TypeSignature::I4)
                    .implementation(|asm| {
                        asm.ldarg(0)?.ldarg(1)?.add()?.ret()?;
                        Ok(())
                    }),
            )
            .unwrap();
        let set = builder.build().unwrap();

        let body = set.method(add).body.as_ref().unwrap();
        assert_eq!(body.instructions.len(), 4);
        assert_eq!(body.code_size, 4);
        assert_eq!(set.method(add).param_names, vec!["a", "b"]);
    }

    #[test]
    fn empty_builder_is_rejected() {
        assert!(matches!(
            ModuleSetBuilder::new().build(),
            Err(Error::Configuration(_))
        ));
    }
}
