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

//! Native identifiers for types, methods and fields.
//!
//! Names are built from the readable identity so they are stable across runs and
//! independent of processing order. The encoding is prefix free, which keeps it injective:
//!
//! | Source                    | Encoding                 |
//! |---------------------------|--------------------------|
//! | `A`-`Z`, `a`-`z`, `0`-`9` | unchanged                |
//! | `_`                       | `__`                     |
//! | `.` (namespace)           | `_N_`                    |
//! | `/` (nesting)             | `_S_`                    |
//! | any other character       | `_x{hex}_`               |
//! | generic arguments         | `_G{n}_` a `_C_` b `_E_` |
//! | `T[]`, `T[,]`             | `_A_`, `_M{rank}_`       |
//! | `T*`, `T&`, `method*`     | `_K_`, `_B_`, `_F_`      |
//! | `!n`, `!!n`               | `_V{n}_`, `_W{n}_`       |
//! | defining assembly         | `{assembly}_Y_` prefix   |
//!
//! The assembly prefix is only written for full names that more than one loaded module
//! defines, so the common case keeps the readable `Namespace_N_Name` form.
//!
//! A method is `{type}_D_{name}`, its generic arguments, then `_P{n}` followed by the
//! parameter types and `_R_` with the return type:
//!
//! ```text
//! uint System.Numerics.BitOperations::PopCount(uint) -> int
//!   System_N_Numerics_N_BitOperations_D_PopCount_P1_System_N_UInt32_R_System_N_Int32
//! ```
//!
//! Fields follow the runtime's member naming instead: `f_` plus the name with its leading
//! underscores removed, so `_stringLength` becomes `f_stringLength`. They only need to be
//! unique inside their declaring type, see [`FieldNames`].

use std::fmt::Write;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    model::{MethodInst, ModuleSet, TypeSig},
    Error, Result,
};

/// Escapes one identifier.
#[must_use]
pub fn escape(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len() + 8);
    for c in identifier.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' => out.push(c),
            '_' => out.push_str("__"),
            '.' => out.push_str("_N_"),
            '/' => out.push_str("_S_"),
            other => {
                let _ = write!(out, "_x{:x}_", u32::from(other));
            }
        }
    }
    out
}

/// Native name of a resolved type.
#[must_use]
pub fn mangle_type(set: &ModuleSet, ty: &TypeSig) -> String {
    let mut out = String::new();
    write_type(set, ty, &mut out);
    out
}

fn write_type(set: &ModuleSet, ty: &TypeSig, out: &mut String) {
    match ty {
        TypeSig::Named(id, args) => {
            if set.is_name_shared(*id) {
                let module = set.type_record(*id).module;
                out.push_str(&escape(&set.module(module).name));
                out.push_str("_Y_");
            }
            out.push_str(&escape(&set.type_full_name(*id)));
            write_args(set, args, out);
        }
        TypeSig::SzArray(inner) => {
            write_type(set, inner, out);
            out.push_str("_A_");
        }
        TypeSig::Array(inner, rank) => {
            write_type(set, inner, out);
            let _ = write!(out, "_M{rank}_");
        }
        TypeSig::Ptr(inner) => {
            write_type(set, inner, out);
            out.push_str("_K_");
        }
        TypeSig::ByRef(inner) => {
            write_type(set, inner, out);
            out.push_str("_B_");
        }
        TypeSig::FnPtr => out.push_str("_F_"),
        TypeSig::Var(index) => {
            let _ = write!(out, "_V{index}_");
        }
        TypeSig::MVar(index) => {
            let _ = write!(out, "_W{index}_");
        }
        primitive => out.push_str(&escape(primitive.primitive_name().unwrap_or("?"))),
    }
}

fn write_args(set: &ModuleSet, args: &[TypeSig], out: &mut String) {
    if args.is_empty() {
        return;
    }
    let _ = write!(out, "_G{}_", args.len());
    for (index, arg) in args.iter().enumerate() {
        if index > 0 {
            out.push_str("_C_");
        }
        write_type(set, arg, out);
    }
    out.push_str("_E_");
}

/// Native name of a method instance, unique per overload.
///
/// # Errors
/// Returns an error if a parameter type cannot be resolved.
pub fn mangle_method(set: &ModuleSet, method: &MethodInst) -> Result<String> {
    let record = set.method(method.method);
    let owner = set.def_sig(record.declaring_type, method.type_args.clone());
    let signature = set.method_signature(method)?;

    let mut out = mangle_type(set, &owner);
    out.push_str("_D_");
    out.push_str(&escape(&record.name));
    write_args(set, &method.method_args, &mut out);
    let _ = write!(out, "_P{}", signature.params.len());
    for (index, param) in signature.params.iter().enumerate() {
        out.push_str(if index == 0 { "_" } else { "_C_" });
        write_type(set, param, &mut out);
    }
    out.push_str("_R_");
    write_type(set, &signature.return_type, &mut out);
    Ok(out)
}

/// Native member name of a field, as the runtime headers spell it.
#[must_use]
pub fn mangle_field(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push_str("f_");
    for c in name.trim_start_matches('_').chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '_' => out.push(c),
            other => {
                let _ = write!(out, "_x{:x}_", u32::from(other));
            }
        }
    }
    out
}

/// Hands out field member names that are unique within one type.
///
/// A field whose runtime name is already taken (`x` next to `_x`) gets the first free
/// `_{n}` suffix, in declaration order.
#[derive(Debug, Default)]
pub struct FieldNames {
    taken: FxHashSet<String>,
}

impl FieldNames {
    /// Starts an empty scope for one declaring type.
    #[must_use]
    pub fn new() -> Self {
        FieldNames::default()
    }

    /// Member name for the next field called `name`.
    pub fn next(&mut self, name: &str) -> String {
        let base = mangle_field(name);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// What a global native name stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A type instance
    Type(TypeSig),
    /// A method instance
    Method(MethodInst),
}

/// Registry of every global name handed out, detecting two entities sharing one name.
#[derive(Debug, Default)]
pub struct Mangler {
    owners: FxHashMap<String, (Entity, String)>,
}

impl Mangler {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Mangler::default()
    }

    /// Records that `mangled` names `entity`, displayed as `readable` in errors.
    ///
    /// # Errors
    /// Returns [`Error::NameCollision`] if a different entity already holds `mangled`.
    pub fn register(&mut self, mangled: &str, entity: Entity, readable: &str) -> Result<()> {
        match self.owners.get(mangled) {
            Some((owner, _)) if *owner == entity => Ok(()),
            Some((_, first)) => Err(Error::NameCollision {
                mangled: mangled.to_string(),
                first: first.clone(),
                second: readable.to_string(),
            }),
            None => {
                self.owners
                    .insert(mangled.to_string(), (entity, readable.to_string()));
                Ok(())
            }
        }
    }

    /// Number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// True if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        model::{MethodBuilder, MethodInst, ModuleSetBuilder, TypeBuilder},
        test::{calculator, calculator_set},
    };

    #[test]
    fn escaping_is_prefix_free() {
        assert_eq!(escape("System.Int32"), "System_N_Int32");
        assert_eq!(escape("List`1"), "List_x60_1");
        assert_eq!(escape("Outer/Inner"), "Outer_S_Inner");
        assert_eq!(escape("a_N"), "a__N");
        assert_eq!(escape("<Main>$"), "_x3c_Main_x3e__x24_");
        // "a." and "a_N_" must differ
        assert_ne!(escape("a."), escape("a_N_"));
    }

    #[test]
    fn types_and_methods() {
        let (set, ids) = calculator_set().unwrap();
        let calc = set.def_sig(ids.calc, Vec::new());
        assert_eq!(mangle_type(&set, &calc), "App_N_Calc");
        assert_eq!(
            mangle_type(&set, &TypeSig::SzArray(Box::new(TypeSig::I4))),
            "System_N_Int32_A_"
        );
        assert_eq!(
            mangle_type(&set, &TypeSig::Named(ids.calc, vec![TypeSig::I4, TypeSig::String])),
            "App_N_Calc_G2_System_N_Int32_C_System_N_String_E_"
        );

        assert_eq!(
            mangle_method(&set, &MethodInst::plain(ids.add)).unwrap(),
            "App_N_Calc_D_Add_P2_System_N_Int32_C_System_N_Int32_R_System_N_Int32"
        );
        assert_eq!(
            mangle_method(&set, &MethodInst::plain(ids.ctor)).unwrap(),
            "App_N_Calc_D__N_ctor_P0_R_System_N_Void"
        );
        assert_eq!(
            mangle_method(&set, &MethodInst::plain(ids.corlib.pop_count)).unwrap(),
            "System_N_Numerics_N_BitOperations_D_PopCount_P1_System_N_UInt32_R_System_N_Int32"
        );
    }

    #[test]
    fn fields_follow_runtime_names() {
        assert_eq!(mangle_field("_stringLength"), "f_stringLength");
        assert_eq!(mangle_field("m_taskId"), "f_m_taskId");
        assert_eq!(mangle_field("handle"), "f_handle");
        assert_eq!(
            mangle_field("<Name>k__BackingField"),
            "f__x3c_Name_x3e_k__BackingField"
        );

        let mut names = FieldNames::new();
        assert_eq!(names.next("_x"), "f_x");
        assert_eq!(names.next("x"), "f_x_2");
        assert_eq!(names.next("__x"), "f_x_3");
        assert_eq!(names.next("x_2"), "f_x_2_2");
    }

    #[test]
    fn shared_type_names_are_qualified() {
        let mut builder = ModuleSetBuilder::new();
        let ids = calculator(&mut builder).unwrap();
        let other = builder.module("Other.Lib");
        let twin = builder
            .add_type(other, TypeBuilder::class("App", "Calc").extends(ids.corlib.object))
            .unwrap();
        let twin_add = builder
            .add_method(
                twin,
                MethodBuilder::static_method("Add").implementation(|asm| {
                    asm.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        builder.set_root(ids.app);
        let set = builder.build().unwrap();

        assert!(set.is_name_shared(ids.calc));
        assert!(!set.is_name_shared(ids.corlib.object));
        assert_eq!(
            mangle_type(&set, &set.def_sig(ids.calc, Vec::new())),
            "App_Y_App_N_Calc"
        );
        assert_eq!(
            mangle_type(&set, &set.def_sig(twin, Vec::new())),
            "Other_N_Lib_Y_App_N_Calc"
        );
        assert_eq!(
            mangle_method(&set, &MethodInst::plain(twin_add)).unwrap(),
            "Other_N_Lib_Y_App_N_Calc_D_Add_P0_R_System_N_Void"
        );
        assert_ne!(
            mangle_method(&set, &MethodInst::plain(ids.add)).unwrap(),
            mangle_method(&set, &MethodInst::plain(twin_add)).unwrap()
        );
    }

    #[test]
    fn collisions_are_reported() {
        let (set, ids) = calculator_set().unwrap();
        let calc = Entity::Type(set.def_sig(ids.calc, Vec::new()));
        let object = Entity::Type(set.def_sig(ids.corlib.object, Vec::new()));

        let mut mangler = Mangler::new();
        mangler.register("A", calc.clone(), "App.Calc").unwrap();
        mangler.register("A", calc, "App.Calc").unwrap();
        // same readable name, different entity
        assert!(matches!(
            mangler.register("A", object, "App.Calc"),
            Err(Error::NameCollision { .. })
        ));
        assert_eq!(mangler.len(), 1);
    }
}
