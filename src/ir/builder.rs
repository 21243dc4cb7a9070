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

//! Construction of an [`IrModule`] from a reachability result.
//!
//! The build runs in three passes:
//!
//! 1. **Shells** - one [`IrType`] per reachable type and one [`IrMethod`] per reachable method
//!    instance, with field layout, vtables and interface maps. Failures here are fatal.
//! 2. **Attributes** - custom attributes of every type, field and method.
//! 3. **Bodies** - every method is lowered in parallel against the frozen shells. Bodies
//!    that cannot be lowered become stubs, so this pass never fails.

use std::{sync::OnceLock, time::Instant};

use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::{
    codegen::mangle::{mangle_method, mangle_type, Entity, FieldNames, Mangler},
    config::BuildConfig,
    ir::{
        attributes::collect_attributes,
        lower::lower_method,
        types::{
            InterfaceMap, IrField, IrMethod, IrMethodId, IrModule, IrParam, IrType, IrTypeId,
            VtableSlot,
        },
    },
    metadata::method::MethodAttributes,
    model::{FieldRef, MethodId, MethodInst, ModuleSet, TypeId, TypeSig},
    reachability::ReachabilityResult,
    Result,
};

/// Builds the IR module of a reachable program.
///
/// # Example
///
/// ```rust,no_run
/// use dotnative::{
///     ir::IrBuilder, model::ModuleSet, reachability::ReachabilityAnalyzer, BuildConfig,
/// };
///
/// let config = BuildConfig::default();
/// let set = ModuleSet::load("bin/App.dll", &config)?;
/// let reachable = ReachabilityAnalyzer::new(&set).analyze()?;
/// let module = IrBuilder::new(&set, &reachable, &config).build()?;
/// println!("{} stubs", module.stubs().count());
/// # Ok::<(), dotnative::Error>(())
/// ```
pub struct IrBuilder<'a> {
    set: &'a ModuleSet,
    reachable: &'a ReachabilityResult,
    config: &'a BuildConfig,
}

impl<'a> IrBuilder<'a> {
    /// Creates a builder over `reachable`, which must have been computed on `set`.
    #[must_use]
    pub fn new(
        set: &'a ModuleSet,
        reachable: &'a ReachabilityResult,
        config: &'a BuildConfig,
    ) -> Self {
        IrBuilder {
            set,
            reachable,
            config,
        }
    }

    /// Runs all passes.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedReference`] if a type, field or signature of a shell
    /// cannot be resolved, and [`crate::Error::NameCollision`] if two entities mangle to the
    /// same native name.
    pub fn build(self) -> Result<IrModule> {
        let started = Instant::now();
        let mut module = IrModule {
            name: self.set.root_module().name.clone(),
            ..IrModule::default()
        };
        let mut mangler = Mangler::new();

        self.declare_types(&mut module, &mut mangler)?;
        self.declare_methods(&mut module, &mut mangler)?;
        self.link_types(&mut module)?;
        self.build_vtables(&mut module)?;
        self.build_interface_maps(&mut module)?;
        self.attach_attributes(&mut module);

        module.entry_point = self
            .reachable
            .entry_point
            .as_ref()
            .and_then(|entry| module.method_of(entry));

        let shells = started.elapsed();
        let set = self.set;
        let config = self.config;
        let frozen = &module;
        frozen.methods.par_iter().for_each(|method| {
            method.set_body(lower_method(set, frozen, config, method));
        });

        let stats = module.stats();
        log::info!(
            "IR for '{}': {} types, {} methods ({} lowered, {} stubs), {} blocks, shells in {:?}, total {:?}",
            module.name,
            stats.types,
            stats.methods,
            stats.lowered,
            stats.stubs,
            stats.blocks,
            shells,
            started.elapsed()
        );
        Ok(module)
    }

    /// Creates one shell per reachable type, so ids exist before anything links to them.
    fn declare_types(&self, module: &mut IrModule, mangler: &mut Mangler) -> Result<()> {
        for sig in &self.reachable.types {
            let Some(def) = self.set.type_def_of(sig) else {
                continue;
            };
            let record = self.set.type_record(def);
            let name = self.set.type_name(sig);
            let mangled = mangle_type(self.set, sig);
            mangler.register(&mangled, Entity::Type(sig.clone()), &name)?;

            let id = IrTypeId(module.types.len() as u32);
            module.types.push(IrType {
                id,
                sig: sig.clone(),
                def,
                name,
                namespace: record.namespace.clone(),
                simple_name: record.name.clone(),
                mangled,
                is_value_type: self.set.is_value_type(sig),
                is_interface: record.is_interface(),
                is_abstract: record.is_abstract(),
                is_sealed: record.is_sealed(),
                enum_underlying: match sig {
                    TypeSig::Named(id, _) => self.set.enum_underlying(*id),
                    _ => None,
                },
                base: None,
                interfaces: Vec::new(),
                instance_fields: Vec::new(),
                static_fields: Vec::new(),
                methods: Vec::new(),
                vtable: Vec::new(),
                interface_maps: Vec::new(),
                static_constructor: None,
                class_layout: record.class_layout,
                attributes: Vec::new(),
            });
            module.type_index.insert(sig.clone(), id);
        }
        Ok(())
    }

    fn declare_methods(&self, module: &mut IrModule, mangler: &mut Mangler) -> Result<()> {
        for inst in &self.reachable.methods {
            let record = self.set.method(inst.method);
            let owner = self.set.def_sig(record.declaring_type, inst.type_args.clone());
            let Some(declaring) = module.type_of(&owner) else {
                log::debug!(
                    "Skipping '{}': declaring type is not reachable",
                    record.name
                );
                continue;
            };

            let signature = self.set.method_signature(inst)?;
            let params = signature
                .params
                .into_iter()
                .enumerate()
                .map(|(index, ty)| IrParam {
                    name: record
                        .param_names
                        .get(index)
                        .filter(|name| !name.is_empty())
                        .cloned()
                        .unwrap_or_else(|| format!("arg{index}")),
                    ty,
                })
                .collect();
            let this_type = (!record.is_static()).then(|| {
                if module.ty(declaring).is_value_type {
                    TypeSig::ByRef(Box::new(owner.clone()))
                } else {
                    owner.clone()
                }
            });

            let full_name = self.set.method_name(inst)?;
            let mangled = mangle_method(self.set, inst)?;
            mangler.register(&mangled, Entity::Method(inst.clone()), &full_name)?;

            let id = IrMethodId(module.methods.len() as u32);
            module.methods.push(IrMethod {
                id,
                inst: inst.clone(),
                declaring,
                name: record.name.clone(),
                full_name,
                mangled,
                this_type,
                params,
                return_type: signature.return_type,
                is_static: record.is_static(),
                is_virtual: record.is_virtual(),
                is_abstract: record.is_abstract(),
                is_constructor: record.is_constructor(),
                is_static_constructor: record.is_static_constructor(),
                vtable_slot: None,
                attributes: Vec::new(),
                body: OnceLock::new(),
            });
            module.types[declaring.index()].methods.push(id);
            module.method_index.insert(inst.clone(), id);
        }
        Ok(())
    }

    /// Base types, interfaces, fields and static constructors.
    fn link_types(&self, module: &mut IrModule) -> Result<()> {
        for index in 0..module.types.len() {
            let sig = module.types[index].sig.clone();
            let def = module.types[index].def;

            let base = self
                .set
                .base_type(&sig)?
                .and_then(|base| module.type_of(&base));
            let interfaces = self
                .set
                .all_interfaces(&sig)?
                .iter()
                .filter_map(|interface| module.type_of(interface))
                .collect();

            let mut instance_fields = Vec::new();
            let mut static_fields = Vec::new();
            let mut names = FieldNames::new();
            for &field in &self.set.type_record(def).fields {
                let record = self.set.field(field);
                if record.is_literal() {
                    continue;
                }
                let ty = self.set.field_type(&FieldRef {
                    field,
                    owner: sig.clone(),
                })?;
                let ir_field = IrField {
                    field,
                    name: record.name.clone(),
                    mangled: names.next(&record.name),
                    ty,
                    is_static: record.is_static(),
                    attributes: Vec::new(),
                };
                if record.is_static() {
                    static_fields.push(ir_field);
                } else {
                    instance_fields.push(ir_field);
                }
            }

            let static_constructor = self.set.static_constructor(def).and_then(|cctor| {
                module.method_of(&MethodInst {
                    method: cctor,
                    type_args: sig.generic_args().to_vec(),
                    method_args: Vec::new(),
                })
            });

            let ty = &mut module.types[index];
            ty.base = base;
            ty.interfaces = interfaces;
            ty.instance_fields = instance_fields;
            ty.static_fields = static_fields;
            ty.static_constructor = static_constructor;
        }
        Ok(())
    }

    /// Lays out vtables base first: inherited slots keep their position, overrides replace
    /// the implementation, `newslot` and non-overriding virtual methods append.
    fn build_vtables(&self, module: &mut IrModule) -> Result<()> {
        let mut order: Vec<(usize, IrTypeId)> = module
            .types
            .iter()
            .filter(|ty| !ty.is_interface)
            .map(|ty| (inheritance_depth(module, ty.id), ty.id))
            .collect();
        order.sort_unstable();

        for (_, id) in order {
            let ty = module.ty(id);
            let sig = ty.sig.clone();
            let mut vtable = ty
                .base
                .map(|base| module.ty(base).vtable.clone())
                .unwrap_or_default();

            let mut overriding: FxHashSet<MethodId> = FxHashSet::default();
            for slot in &mut vtable {
                let target = self.set.find_override(&sig, &slot.declaration)?;
                if let Some(target) = &target {
                    if self.set.method(target.method).declaring_type == ty.def {
                        overriding.insert(target.method);
                    }
                }
                slot.implementation = target.and_then(|target| module.method_of(&target));
            }

            for &method in &self.set.type_record(ty.def).methods {
                let record = self.set.method(method);
                if !record.is_virtual() || record.is_static() || record.arity() != 0 {
                    continue;
                }
                if !record.flags.contains(MethodAttributes::NEW_SLOT)
                    && overriding.contains(&method)
                {
                    continue;
                }
                let declaration = MethodInst {
                    method,
                    type_args: sig.generic_args().to_vec(),
                    method_args: Vec::new(),
                };
                let implementation = if record.is_abstract() {
                    None
                } else {
                    module.method_of(&declaration)
                };
                vtable.push(VtableSlot {
                    declaration,
                    name: record.name.clone(),
                    implementation,
                });
            }

            module.types[id.index()].vtable = vtable;
        }

        for method in &mut module.methods {
            let ty = &module.types[method.declaring.index()];
            method.vtable_slot = ty.vtable_slot_of(&method.inst).or_else(|| {
                ty.vtable
                    .iter()
                    .position(|slot| slot.implementation == Some(method.id))
            });
        }
        Ok(())
    }

    fn build_interface_maps(&self, module: &mut IrModule) -> Result<()> {
        for index in 0..module.types.len() {
            let ty = &module.types[index];
            if ty.is_interface {
                continue;
            }

            let mut maps = Vec::with_capacity(ty.interfaces.len());
            for &interface in &ty.interfaces {
                let interface_type = module.ty(interface);
                let mut slots = Vec::new();
                for method in interface_slots(self.set, interface_type.def) {
                    let slot = MethodInst {
                        method,
                        type_args: interface_type.sig.generic_args().to_vec(),
                        method_args: Vec::new(),
                    };
                    let implementation = self
                        .set
                        .find_override(&ty.sig, &slot)?
                        .and_then(|target| module.method_of(&target));
                    slots.push(implementation);
                }
                maps.push(InterfaceMap { interface, slots });
            }
            module.types[index].interface_maps = maps;
        }
        Ok(())
    }

    fn attach_attributes(&self, module: &mut IrModule) {
        for ty in &mut module.types {
            let record = self.set.type_record(ty.def);
            ty.attributes = collect_attributes(self.set, record.module, &record.attributes);
            for field in ty.instance_fields.iter_mut().chain(&mut ty.static_fields) {
                let record = self.set.field(field.field);
                field.attributes =
                    collect_attributes(self.set, record.module, &record.attributes);
            }
        }
        for method in &mut module.methods {
            let record = self.set.method(method.inst.method);
            method.attributes = collect_attributes(self.set, record.module, &record.attributes);
        }
    }
}

fn inheritance_depth(module: &IrModule, id: IrTypeId) -> usize {
    let mut depth = 0;
    let mut current = module.ty(id).base;
    while let Some(base) = current {
        depth += 1;
        current = module.ty(base).base;
    }
    depth
}

/// Slots of an interface: its virtual, non-generic instance methods in declaration order.
pub(crate) fn interface_slots(set: &ModuleSet, interface: TypeId) -> Vec<MethodId> {
    set.type_record(interface)
        .methods
        .iter()
        .copied()
        .filter(|&method| {
            let record = set.method(method);
            record.is_virtual() && !record.is_static() && record.arity() == 0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        model::{MethodBuilder, ModuleSetBuilder, TypeBuilder},
        reachability::ReachabilityAnalyzer,
        test::{calculator_set, corlib, shapes},
    };

    fn build(set: &ModuleSet) -> IrModule {
        let reachable = ReachabilityAnalyzer::new(set).analyze().unwrap();
        IrBuilder::new(set, &reachable, &BuildConfig::default())
            .build()
            .unwrap()
    }

    #[test]
    fn calculator_shells() {
        let (set, ids) = calculator_set().unwrap();
        let module = build(&set);

        assert_eq!(module.name, "App");
        let calc = module.find_type("App.Calc").unwrap();
        assert!(calc.is_reference());
        assert_eq!(calc.mangled, "App_N_Calc");
        assert!(calc.base.is_some());

        let add = module.method(module.method_of(&MethodInst::plain(ids.add)).unwrap());
        assert_eq!(
            add.full_name,
            "System.Int32 App.Calc::Add(System.Int32,System.Int32)"
        );
        let names: Vec<&str> = add.params.iter().map(|param| param.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(add.this_type, Some(set.def_sig(ids.calc, Vec::new())));
        assert_eq!(add.arg_count(), 3);
        assert_eq!(add.declaring, calc.id);
        assert!(calc.methods.contains(&add.id));

        let main = module.entry_point.unwrap();
        assert_eq!(module.method(main).inst.method, ids.main);
        assert!(module.method(main).is_static);
        assert!(module.methods.iter().all(|method| method.body.get().is_some()));
    }

    #[test]
    fn vtables_inherit_and_override() {
        let mut builder = ModuleSetBuilder::new();
        let ids = shapes(&mut builder).unwrap();
        let set = builder.build().unwrap();
        let module = build(&set);

        let shape = module.find_type("App.Shape").unwrap();
        let circle = module.find_type("App.Circle").unwrap();
        let square = module.find_type("App.Square").unwrap();
        assert!(module.find_type("App.Unused").is_none());

        let area = shape.vtable_slot_of(&MethodInst::plain(ids.area)).unwrap();
        assert_eq!(shape.vtable.len(), circle.vtable.len());
        assert_eq!(shape.vtable[area].implementation, None);
        assert_eq!(
            circle.vtable[area].implementation,
            module.method_of(&MethodInst::plain(ids.circle_area))
        );
        assert_eq!(circle.vtable[area].declaration, MethodInst::plain(ids.area));

        let circle_area = module
            .method(module.method_of(&MethodInst::plain(ids.circle_area)).unwrap());
        assert_eq!(circle_area.vtable_slot, Some(area));
        // the abstract declaration only names the slot
        assert!(module.method_of(&MethodInst::plain(ids.area)).is_none());
        // Object.ToString is inherited in the same slot everywhere
        let to_string = MethodInst::plain(ids.corlib.object_to_string);
        assert_eq!(
            shape.vtable_slot_of(&to_string),
            square.vtable_slot_of(&to_string)
        );
    }

    #[test]
    fn interface_maps_point_at_implementations() {
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
        let english_greet = builder
            .add_method(
                english,
                MethodBuilder::virtual_method("Greet").implementation(|asm| {
                    asm.ret()?;
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
        let module = build(&set);

        assert_eq!(interface_slots(&set, greeter), vec![greet]);
        let interface = module.find_type("App.IGreeter").unwrap();
        assert!(interface.vtable.is_empty());
        assert!(interface.interface_maps.is_empty());

        let english = module.find_type("App.English").unwrap();
        assert_eq!(english.interfaces, vec![interface.id]);
        let map = english.interface_map(interface.id).unwrap();
        assert_eq!(
            map.slots,
            vec![module.method_of(&MethodInst::plain(english_greet))]
        );
    }
}
