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

//! Whole-program reachability.
//!
//! Starting from the entry point (or from explicit roots for libraries) the analyzer
//! computes the closed set of method instances and types a program can touch. Virtual and
//! interface calls are resolved with class hierarchy analysis restricted to reachable types,
//! so an override only becomes reachable once its declaring type does.
//!
//! # Key Types
//!
//! - [`ReachabilityAnalyzer`] - builder and fixed point driver
//! - [`ReachabilityResult`] - sorted sets of reachable types and method instances
//! - [`CallKind`] / [`Reference`] - per-instruction classification

mod analyzer;
mod site;

use std::collections::BTreeSet;

pub use analyzer::ReachabilityAnalyzer;
pub use site::{classify, CallKind, DispatchSite, Reference};

use crate::{
    model::{MethodId, MethodInst, ModuleSet, TypeSig},
    Result,
};

/// Counters describing one analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReachabilityStats {
    /// Reachable method instances
    pub methods: usize,
    /// Reachable types
    pub types: usize,
    /// Distinct virtual dispatch sites
    pub dispatch_sites: usize,
    /// Worklist items processed
    pub steps: usize,
    /// Body references that could not be resolved
    pub skipped_references: usize,
}

/// The reachable subset of a module set.
///
/// Both sets are ordered, so iteration order is a function of the input alone.
#[derive(Debug, Clone, Default)]
pub struct ReachabilityResult {
    /// Reachable, fully instantiated types
    pub types: BTreeSet<TypeSig>,
    /// Reachable method instances
    pub methods: BTreeSet<MethodInst>,
    /// The program entry, `None` for libraries
    pub entry_point: Option<MethodInst>,
    /// Counters
    pub stats: ReachabilityStats,
}

impl ReachabilityResult {
    /// True if `method` is reachable with exactly these generic arguments.
    #[must_use]
    pub fn contains(&self, method: &MethodInst) -> bool {
        self.methods.contains(method)
    }

    /// True if any instance of the definition `method` is reachable.
    #[must_use]
    pub fn contains_definition(&self, method: MethodId) -> bool {
        self.methods.iter().any(|instance| instance.method == method)
    }

    /// True if `ty` is reachable.
    #[must_use]
    pub fn contains_type(&self, ty: &TypeSig) -> bool {
        self.types.contains(ty)
    }

    /// Readable names of all reachable types.
    #[must_use]
    pub fn type_names(&self, set: &ModuleSet) -> BTreeSet<String> {
        self.types.iter().map(|ty| set.type_name(ty)).collect()
    }

    /// Readable names of all reachable methods.
    ///
    /// # Errors
    /// Returns an error if a signature cannot be resolved.
    pub fn method_names(&self, set: &ModuleSet) -> Result<BTreeSet<String>> {
        self.methods
            .iter()
            .map(|method| set.method_name(method))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::signatures::TypeSignature,
        model::{MethodBuilder, ModuleSetBuilder, TypeBuilder},
        test::{calculator_set, corlib, shapes},
    };

    #[test]
    fn calculator_reaches_three_methods() {
        let (set, ids) = calculator_set().unwrap();
        let result = ReachabilityAnalyzer::new(&set).analyze().unwrap();

        assert_eq!(result.methods.len(), 3);
        assert!(result.contains_definition(ids.main));
        assert!(result.contains_definition(ids.ctor));
        assert!(result.contains_definition(ids.add));
        assert!(result.contains_type(&TypeSig::Named(ids.calc, Vec::new())));
        assert!(result.contains_type(&TypeSig::Object));
        assert!(result.contains_type(&TypeSig::I4));
        assert_eq!(result.entry_point, Some(MethodInst::plain(ids.main)));
    }

    #[test]
    fn overrides_follow_reachable_receivers() {
        let mut builder = ModuleSetBuilder::new();
        let ids = shapes(&mut builder).unwrap();
        let set = builder.build().unwrap();
        let result = ReachabilityAnalyzer::new(&set).analyze().unwrap();

        assert!(result.contains_definition(ids.circle_area));
        // Square is constructed after the call site was seen
        assert!(result.contains_definition(ids.square_area));
        assert!(!result.contains_definition(ids.unused_area));
        assert!(!result.contains_definition(ids.area));
        assert!(!result.contains_type(&TypeSig::Named(ids.unused, Vec::new())));
        assert!(result.stats.dispatch_sites >= 1);
    }

    #[test]
    fn names_are_deterministic() {
        let mut builder = ModuleSetBuilder::new();
        shapes(&mut builder).unwrap();
        let set = builder.build().unwrap();

        let first = ReachabilityAnalyzer::new(&set).analyze().unwrap();
        let second = ReachabilityAnalyzer::new(&set).analyze().unwrap();
        assert_eq!(first.type_names(&set), second.type_names(&set));
        assert_eq!(
            first.method_names(&set).unwrap(),
            second.method_names(&set).unwrap()
        );
    }

    #[test]
    fn static_constructor_of_referenced_type() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let config = builder
            .add_type(app, TypeBuilder::class("App", "Config").extends(corlib.object))
            .unwrap();
        let limit = builder.add_static_field(config, "Limit", TypeSignature::I4);
        let limit_token = builder.field_token(app, limit).unwrap();
        let cctor = builder
            .add_method(
                config,
                MethodBuilder::static_constructor().implementation(move |asm| {
                    asm.ldc_i4(10)?.emit_token("stsfld", limit_token)?.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        let program = builder
            .add_type(app, TypeBuilder::class("App", "Program").extends(corlib.object))
            .unwrap();
        let main = builder
            .add_method(
                program,
                MethodBuilder::static_method("Main").implementation(move |asm| {
                    asm.emit_token("ldsfld", limit_token)?
                        .pop()?
                        .emit_token("ldsfld", limit_token)?
                        .pop()?
                        .ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        builder.set_entry_point(main);
        let set = builder.build().unwrap();

        let result = ReachabilityAnalyzer::new(&set).analyze().unwrap();
        let cctors: Vec<_> = result
            .methods
            .iter()
            .filter(|method| method.method == cctor)
            .collect();
        assert_eq!(cctors.len(), 1);
    }

    #[test]
    fn interface_calls_reach_implementations() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let greeter = builder
            .add_type(app, TypeBuilder::interface("App", "IGreeter"))
            .unwrap();
        let greet = builder
            .add_method(greeter, MethodBuilder::abstract_method("Greet"))
            .unwrap();
        let english = builder
            .add_type(
                app,
                TypeBuilder::class("App", "English")
                    .extends(corlib.object)
                    .implements(greeter),
            )
            .unwrap();
        let hello = builder.user_string(app, "hello");
        let write = builder.method_token(app, corlib.write_line_string).unwrap();
        let english_greet = builder
            .add_method(
                english,
                MethodBuilder::virtual_method("Greet").implementation(move |asm| {
                    asm.ldstr(hello)?.call(write)?.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        let english_ctor = builder
            .add_method(
                english,
                MethodBuilder::constructor().implementation(|asm| {
                    asm.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        let ctor_token = builder.method_token(app, english_ctor).unwrap();
        let greet_token = builder.method_token(app, greet).unwrap();
        let program = builder
            .add_type(app, TypeBuilder::class("App", "Program").extends(corlib.object))
            .unwrap();
        let main = builder
            .add_method(
                program,
                MethodBuilder::static_method("Main").implementation(move |asm| {
                    asm.newobj(ctor_token)?.callvirt(greet_token)?.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        builder.set_entry_point(main);
        let set = builder.build().unwrap();

        let result = ReachabilityAnalyzer::new(&set).analyze().unwrap();
        assert!(result.contains_definition(english_greet));
        assert!(result.contains_definition(corlib.write_line_string));
        assert!(result.contains_type(&TypeSig::String));
        assert!(result.contains_type(&TypeSig::Named(greeter, Vec::new())));
    }

    #[test]
    fn generic_members_are_instantiated() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let holder = builder
            .add_type(
                app,
                TypeBuilder::class("App", "Holder`1")
                    .generic_param("T")
                    .extends(corlib.object),
            )
            .unwrap();
        let value = builder.add_instance_field(holder, "value", TypeSignature::GenericParamType(0));
        let value_token = builder.field_token(app, value).unwrap();
        let get = builder
            .add_method(
                holder,
                MethodBuilder::instance_method("Get")
                    .returns(TypeSignature::GenericParamType(0))
                    .implementation(move |asm| {
                        asm.ldarg(0)?.emit_token("ldfld", value_token)?.ret()?;
                        Ok(())
                    }),
            )
            .unwrap();

        let holder_token = builder.type_token(app, holder).unwrap();
        let spec = builder.type_spec(
            app,
            TypeSignature::GenericInst(
                Box::new(TypeSignature::Class(holder_token)),
                vec![TypeSignature::I4],
            ),
        );
        let get_token = builder.member_ref(app, spec, get).unwrap();
        let program = builder
            .add_type(app, TypeBuilder::class("App", "Program").extends(corlib.object))
            .unwrap();
        let main = builder
            .add_method(
                program,
                MethodBuilder::static_method("Main").implementation(move |asm| {
                    asm.emit("ldnull")?.call(get_token)?.pop()?.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        builder.set_entry_point(main);
        let set = builder.build().unwrap();

        let result = ReachabilityAnalyzer::new(&set).analyze().unwrap();
        let instance = MethodInst {
            method: get,
            type_args: vec![TypeSig::I4],
            method_args: Vec::new(),
        };
        assert!(result.contains(&instance));
        assert!(result.contains_type(&TypeSig::Named(holder, vec![TypeSig::I4])));
        assert!(result.types.iter().all(|ty| !ty.is_open()));
        assert!(result
            .method_names(&set)
            .unwrap()
            .contains("System.Int32 App.Holder`1<System.Int32>::Get()"));
    }

    #[test]
    fn library_roots_cover_public_surface() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let lib = builder.module("Lib");
        let api = builder
            .add_type(lib, TypeBuilder::class("Lib", "Api").extends(corlib.object))
            .unwrap();
        let run = builder
            .add_method(
                api,
                MethodBuilder::static_method("Run").implementation(|asm| {
                    asm.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        let hidden = builder
            .add_method(
                api,
                MethodBuilder::static_method("Hidden")
                    .flags(
                        crate::metadata::method::MethodAttributes::PRIVATE
                            | crate::metadata::method::MethodAttributes::STATIC,
                    )
                    .implementation(|asm| {
                        asm.ret()?;
                        Ok(())
                    }),
            )
            .unwrap();
        builder.set_root(lib);
        let set = builder.build().unwrap();

        let result = ReachabilityAnalyzer::new(&set)
            .library_roots()
            .analyze()
            .unwrap();
        assert!(result.entry_point.is_none());
        assert!(result.contains_definition(run));
        assert!(!result.contains_definition(hidden));
    }
}
