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


//! Native data layout: type spelling, structs, statics and type descriptors.
//!
//! Reference types become structs starting with the object header
//!
//! ```text
//! struct App_N_Circle {
//!     cil2cpp::TypeInfo* __type_info;
//!     void* __sync_block;
//!     int32_t f_radius;          // inherited fields first, in declaration order
//! };
//! ```
//!
//! Value types are plain structs, enumerations aliases of their underlying integer, and
//! primitives map to the fixed width C++ types. Objects, strings and arrays use the runtime's
//! own structs and descriptors.

use std::collections::BTreeSet;

use crate::{
    codegen::{
        abi::{self, RuntimeType},
        mangle::mangle_type,
        writer::{cpp_string, CodeWriter},
    },
    ir::{IrBody, IrMethod, IrMethodId, IrModule, IrType, IrTypeId, StubReason},
    model::{FieldId, ModuleSet, TypeSig},
};

/// Native spelling of primitive types.
const PRIMITIVES: [(TypeSig, &str); 15] = [
    (TypeSig::Void, "void"),
    (TypeSig::Boolean, "bool"),
    (TypeSig::Char, "char16_t"),
    (TypeSig::I1, "int8_t"),
    (TypeSig::U1, "uint8_t"),
    (TypeSig::I2, "int16_t"),
    (TypeSig::U2, "uint16_t"),
    (TypeSig::I4, "int32_t"),
    (TypeSig::U4, "uint32_t"),
    (TypeSig::I8, "int64_t"),
    (TypeSig::U8, "uint64_t"),
    (TypeSig::R4, "float"),
    (TypeSig::R8, "double"),
    (TypeSig::I, "intptr_t"),
    (TypeSig::U, "uintptr_t"),
];

/// Native spelling of a primitive type.
#[must_use]
pub fn primitive_type(sig: &TypeSig) -> Option<&'static str> {
    PRIMITIVES
        .iter()
        .find(|(primitive, _)| primitive == sig)
        .map(|(_, native)| *native)
}

/// Unsigned type of the same width as the integer stack type `sig`.
#[must_use]
pub fn unsigned_type(sig: &TypeSig) -> &'static str {
    match sig {
        TypeSig::I8 | TypeSig::U8 => "uint64_t",
        TypeSig::I | TypeSig::U => "uintptr_t",
        TypeSig::I1 | TypeSig::U1 | TypeSig::Boolean => "uint8_t",
        TypeSig::I2 | TypeSig::U2 | TypeSig::Char => "uint16_t",
        _ => "uint32_t",
    }
}

/// Answers layout questions about the types of one IR module.
pub(crate) struct Layout<'a> {
    set: &'a ModuleSet,
    module: &'a IrModule,
}

impl<'a> Layout<'a> {
    pub fn new(set: &'a ModuleSet, module: &'a IrModule) -> Self {
        Layout { set, module }
    }

    pub fn module(&self) -> &'a IrModule {
        self.module
    }

    /// Runtime provided layout of `ty`, if any.
    pub fn runtime_type(ty: &IrType) -> Option<&'static RuntimeType> {
        abi::runtime_type(&ty.name)
    }

    /// True if the generator defines a struct for `ty`.
    pub fn has_struct(ty: &IrType) -> bool {
        !ty.is_interface
            && ty.enum_underlying.is_none()
            && !ty.sig.is_primitive_value()
            && Self::runtime_type(ty).is_none()
    }

    /// True if a native function is emitted for `method`.
    pub fn is_emitted(method: &IrMethod) -> bool {
        !matches!(method.body(), IrBody::Stub(StubReason::Abstract))
    }

    /// Native type of a value of type `sig`.
    pub fn native(&self, sig: &TypeSig) -> String {
        if let Some(primitive) = primitive_type(sig) {
            return primitive.to_string();
        }
        match sig {
            TypeSig::String => "cil2cpp::String*".to_string(),
            TypeSig::Object | TypeSig::Var(_) | TypeSig::MVar(_) => format!("{}*", abi::OBJECT),
            TypeSig::TypedByRef => "cil2cpp::TypedReference".to_string(),
            TypeSig::SzArray(_) | TypeSig::Array(..) => "cil2cpp::Array*".to_string(),
            TypeSig::Ptr(inner) | TypeSig::ByRef(inner) => format!("{}*", self.native(inner)),
            TypeSig::FnPtr => "void*".to_string(),
            TypeSig::Named(..) => match self.module.type_of(sig) {
                Some(id) => self.native_of(self.module.ty(id)),
                None if self.set.is_value_type(sig) => mangle_type(self.set, sig),
                None => format!("{}*", abi::OBJECT),
            },
            _ => format!("{}*", abi::OBJECT),
        }
    }

    fn native_of(&self, ty: &IrType) -> String {
        if let Some(runtime) = Self::runtime_type(ty) {
            format!("{}*", runtime.native)
        } else if let Some(primitive) = primitive_type(&ty.sig) {
            primitive.to_string()
        } else if ty.is_interface {
            format!("{}*", abi::OBJECT)
        } else if ty.is_value_type {
            ty.mangled.clone()
        } else {
            format!("{}*", ty.mangled)
        }
    }

    /// Struct spelling of `sig`: the type itself for values, the pointee for references.
    pub fn record(&self, sig: &TypeSig) -> String {
        let native = self.native(sig);
        if self.set.is_value_type(sig) || sig.is_primitive_value() {
            native
        } else {
            native.strip_suffix('*').map_or(native.clone(), str::to_string)
        }
    }

    /// True for value types, primitives included.
    pub fn is_value(&self, sig: &TypeSig) -> bool {
        sig.is_primitive_value() || self.set.is_value_type(sig)
    }

    /// True if values of `sig` are native pointers.
    pub fn is_pointer(&self, sig: &TypeSig) -> bool {
        self.native(sig).ends_with('*')
    }

    /// Address of the type descriptor of `sig`, `nullptr` if it has none.
    pub fn type_info(&self, sig: &TypeSig) -> String {
        if let Some(id) = self.module.type_of(sig) {
            return self.type_info_of(self.module.ty(id));
        }
        let runtime = if sig.element_type().is_some() {
            abi::runtime_type("System.Array")
        } else {
            sig.primitive_name().and_then(abi::runtime_type)
        };
        runtime.map_or("nullptr".to_string(), |runtime| format!("&{}", runtime.type_info))
    }

    pub fn type_info_of(&self, ty: &IrType) -> String {
        match Self::runtime_type(ty) {
            Some(runtime) => format!("&{}", runtime.type_info),
            None => format!("&{}_TypeInfo", ty.mangled),
        }
    }

    /// Zero value of `sig`.
    pub fn default_value(&self, sig: &TypeSig) -> String {
        if self.is_pointer(sig) {
            "nullptr".to_string()
        } else {
            format!("{}{{}}", self.native(sig))
        }
    }

    /// Member name of instance field `field` declared by `owner`.
    ///
    /// A field hiding one of the same name in a base type is suffixed with the depth of its
    /// declaring type, so flattened structs never repeat a member.
    pub fn field_member(&self, owner: IrTypeId, field: FieldId) -> String {
        let ty = self.module.ty(owner);
        let Some(declared) = ty
            .instance_fields
            .iter()
            .chain(&ty.static_fields)
            .find(|candidate| candidate.field == field)
        else {
            return format!("f_{}", field.0);
        };
        if declared.is_static {
            return declared.mangled.clone();
        }

        let mut depth = 0;
        let mut hidden = false;
        let mut current = ty.base;
        while let Some(base) = current {
            let base = self.module.ty(base);
            hidden |= base
                .instance_fields
                .iter()
                .any(|other| other.mangled == declared.mangled);
            depth += 1;
            current = base.base;
        }
        if hidden {
            format!("{}_{depth}", declared.mangled)
        } else {
            declared.mangled.clone()
        }
    }

    /// Instance members of `ty` as (native type, member name), inherited ones first.
    pub fn members(&self, ty: &IrType) -> Vec<(String, String)> {
        let mut chain = vec![ty];
        if !ty.is_value_type {
            let mut current = ty.base;
            while let Some(base) = current {
                let base = self.module.ty(base);
                chain.push(base);
                current = base.base;
            }
        }
        chain
            .iter()
            .rev()
            .flat_map(|owner| {
                owner.instance_fields.iter().map(|field| {
                    (
                        self.native(&field.ty),
                        self.field_member(owner.id, field.field),
                    )
                })
            })
            .collect()
    }

    /// Struct types ordered so every type embedded by value is defined first.
    pub fn struct_order(&self) -> Vec<&'a IrType> {
        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        for ty in &self.module.types {
            self.visit(ty, &mut done, &mut order);
        }
        order
    }

    fn visit(&self, ty: &'a IrType, done: &mut BTreeSet<IrTypeId>, order: &mut Vec<&'a IrType>) {
        if !Self::has_struct(ty) || !done.insert(ty.id) {
            return;
        }
        let mut owners = vec![ty];
        let mut current = ty.base;
        while let Some(base) = current {
            let base = self.module.ty(base);
            owners.push(base);
            current = base.base;
        }
        for owner in owners {
            for field in &owner.instance_fields {
                if let Some(dependency) = self.module.type_of(&field.ty) {
                    let dependency = self.module.ty(dependency);
                    if dependency.is_value_type {
                        self.visit(dependency, done, order);
                    }
                }
            }
        }
        order.push(ty);
    }

    /// Header part: type declarations, statics and descriptors.
    pub fn declarations(&self, out: &mut CodeWriter) {
        out.line("// Types");
        for ty in self.module.types.iter().filter(|ty| Self::has_struct(ty)) {
            out.line(format!("struct {};", ty.mangled));
        }
        for ty in &self.module.types {
            if let Some(underlying) = &ty.enum_underlying {
                out.line(format!("using {} = {};", ty.mangled, self.native(underlying)));
            }
        }
        out.blank();

        for ty in self.struct_order() {
            out.line(format!("// {}", ty.name));
            out.open(format!("struct {} {{", ty.mangled));
            if ty.is_reference() {
                out.line(format!("{}* __type_info;", abi::TYPE_INFO));
                out.line("void* __sync_block;");
            }
            let members = self.members(ty);
            for (native, member) in &members {
                out.line(format!("{native} {member};"));
            }
            if let Some((_, size)) = ty.class_layout {
                if members.is_empty() && size > 0 {
                    out.line(format!("uint8_t __data[{size}];"));
                }
            }
            out.close("};");
            out.blank();
        }

        for ty in self.module.types.iter().filter(|ty| !ty.static_fields.is_empty()) {
            out.open(format!("struct {}_Statics {{", ty.mangled));
            for field in &ty.static_fields {
                out.line(format!("{} {};", self.native(&field.ty), field.mangled));
            }
            out.close("};");
            out.line(format!("extern {0}_Statics {0}_statics;", ty.mangled));
            out.blank();
        }

        out.line("// Type descriptors");
        for ty in self.module.types.iter().filter(|ty| Self::runtime_type(ty).is_none()) {
            out.line(format!("extern {} {}_TypeInfo;", abi::TYPE_INFO, ty.mangled));
        }
        out.blank();

        let initialized: Vec<&IrType> = self
            .module
            .types
            .iter()
            .filter(|ty| ty.static_constructor.is_some())
            .collect();
        if !initialized.is_empty() {
            out.line("// Class initialization");
            for ty in initialized {
                out.line(format!("void {}_ensure_cctor();", ty.mangled));
            }
            out.blank();
        }
    }

    /// Implementation part: statics storage, method tables, descriptors and guards.
    pub fn definitions(&self, out: &mut CodeWriter) {
        for ty in self.module.types.iter().filter(|ty| !ty.static_fields.is_empty()) {
            out.line(format!("{0}_Statics {0}_statics{{}};", ty.mangled));
        }
        out.blank();

        for ty in &self.module.types {
            if ty.static_constructor.is_some() {
                self.class_init_guard(ty, out);
            }
            if Self::runtime_type(ty).is_none() {
                self.type_descriptor(ty, out);
            }
        }
    }

    fn class_init_guard(&self, ty: &IrType, out: &mut CodeWriter) {
        let Some(cctor) = ty.static_constructor else {
            return;
        };
        out.line(format!(
            "static {} {}_cctor_state;",
            abi::CLASS_INIT_STATE,
            ty.mangled
        ));
        out.open(format!("void {}_ensure_cctor() {{", ty.mangled));
        out.line(format!(
            "{}(&{}_cctor_state, &{});",
            abi::ENSURE_CLASS_INITIALIZED,
            ty.mangled,
            self.module.method(cctor).mangled
        ));
        out.close("}");
        out.blank();
    }

    /// Function pointer stored in a method table for `method`.
    fn slot_entry(&self, method: Option<IrMethodId>) -> String {
        match method.map(|method| self.module.method(method)) {
            Some(method) if Self::is_emitted(method) => {
                if method.this_type.is_some() && self.module.ty(method.declaring).is_value_type {
                    format!("(void*)&{}_U_", method.mangled)
                } else {
                    format!("(void*)&{}", method.mangled)
                }
            }
            _ => "nullptr".to_string(),
        }
    }

    fn type_descriptor(&self, ty: &IrType, out: &mut CodeWriter) {
        let name = &ty.mangled;
        out.line(format!("// {}", ty.name));

        let vtable = if ty.vtable.is_empty() {
            "nullptr".to_string()
        } else {
            let entries: Vec<String> = ty
                .vtable
                .iter()
                .map(|slot| self.slot_entry(slot.implementation))
                .collect();
            out.line(format!(
                "static void* {name}_vtable_methods[] = {{ {} }};",
                entries.join(", ")
            ));
            out.line(format!(
                "static {} {name}_vtable = {{ .type = &{name}_TypeInfo, .methods = {name}_vtable_methods, .method_count = {} }};",
                abi::VTABLE,
                entries.len()
            ));
            format!("&{name}_vtable")
        };

        let interfaces = if ty.interfaces.is_empty() {
            "nullptr".to_string()
        } else {
            let entries: Vec<String> = ty
                .interfaces
                .iter()
                .map(|interface| self.type_info_of(self.module.ty(*interface)))
                .collect();
            out.line(format!(
                "static {}* {name}_interfaces[] = {{ {} }};",
                abi::TYPE_INFO,
                entries.join(", ")
            ));
            format!("{name}_interfaces")
        };

        let interface_vtables = if ty.interface_maps.is_empty() {
            "nullptr".to_string()
        } else {
            let mut tables = Vec::with_capacity(ty.interface_maps.len());
            for (index, map) in ty.interface_maps.iter().enumerate() {
                let methods = if map.slots.is_empty() {
                    "nullptr".to_string()
                } else {
                    let entries: Vec<String> =
                        map.slots.iter().map(|slot| self.slot_entry(*slot)).collect();
                    out.line(format!(
                        "static void* {name}_iv{index}[] = {{ {} }};",
                        entries.join(", ")
                    ));
                    format!("{name}_iv{index}")
                };
                tables.push(format!(
                    "{{ .interface_type = {}, .methods = {methods}, .method_count = {} }}",
                    self.type_info_of(self.module.ty(map.interface)),
                    map.slots.len()
                ));
            }
            out.line(format!(
                "static {} {name}_interface_vtables[] = {{ {} }};",
                abi::INTERFACE_VTABLE,
                tables.join(", ")
            ));
            format!("{name}_interface_vtables")
        };

        let native = self.native(&ty.sig);
        let (instance_size, element_size) = if ty.is_interface {
            ("0".to_string(), "sizeof(void*)".to_string())
        } else if ty.is_value_type {
            (
                format!("sizeof({}) + sizeof({native})", abi::OBJECT),
                format!("sizeof({native})"),
            )
        } else {
            (format!("sizeof({})", ty.mangled), "sizeof(void*)".to_string())
        };

        let mut flags = Vec::new();
        if ty.is_interface {
            flags.push("Interface");
        }
        if ty.is_value_type {
            flags.push("ValueType");
        }
        if ty.sig.is_primitive_value() {
            flags.push("Primitive");
        }
        if flags.is_empty() {
            flags.push("None");
        }
        let flags: Vec<String> = flags
            .iter()
            .map(|flag| format!("{}::{flag}", abi::TYPE_FLAGS))
            .collect();

        let base = ty
            .base
            .map_or("nullptr".to_string(), |base| {
                self.type_info_of(self.module.ty(base))
            });

        out.open(format!("{} {name}_TypeInfo = {{", abi::TYPE_INFO));
        out.line(format!(".name = {},", cpp_string(&ty.simple_name)));
        out.line(format!(".namespace_name = {},", cpp_string(&ty.namespace)));
        out.line(format!(".full_name = {},", cpp_string(&ty.name)));
        out.line(format!(".base_type = {base},"));
        out.line(format!(".interfaces = {interfaces},"));
        out.line(format!(".interface_count = {},", ty.interfaces.len()));
        out.line(format!(".instance_size = {instance_size},"));
        out.line(format!(".element_size = {element_size},"));
        out.line(format!(".flags = {},", flags.join(" | ")));
        out.line(format!(".vtable = {vtable},"));
        out.line(".fields = nullptr,");
        out.line(".field_count = 0,");
        out.line(".methods = nullptr,");
        out.line(".method_count = 0,");
        out.line(".default_ctor = nullptr,");
        out.line(".finalizer = nullptr,");
        out.line(format!(".interface_vtables = {interface_vtables},"));
        out.line(format!(
            ".interface_vtable_count = {},",
            ty.interface_maps.len()
        ));
        out.close("};");
        out.blank();
    }
}
