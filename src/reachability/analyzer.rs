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

//! Worklist fixed point over methods, types and dispatch sites.

use std::collections::{BTreeSet, VecDeque};

use crate::{
    metadata::method::{MethodAttributes, METHOD_ACCESS_MASK},
    model::{GenericContext, MethodInst, ModuleSet, TypeSig},
    reachability::{
        site::{classify, DispatchSite, Reference},
        ReachabilityResult, ReachabilityStats,
    },
    Result,
};

/// Computes the reachable subset of a module set.
///
/// Three queues feed each other until all are empty:
///
/// - a reachable **method** contributes the references of its body and its signature types
/// - a reachable **type** contributes its base type, interfaces, generic arguments and
///   static constructor, and is matched against every known dispatch site
/// - a new **dispatch site** is matched against every known type
///
/// Every (type, site) pair is matched at least once, so the result is the least fixed point
/// and does not depend on queue order.
///
/// # Examples
///
/// ```rust,no_run
/// use dotnative::{model::ModuleSet, reachability::ReachabilityAnalyzer, BuildConfig};
///
/// let set = ModuleSet::load("bin/App.exe", &BuildConfig::default())?;
/// let result = ReachabilityAnalyzer::new(&set).analyze()?;
/// println!("{} methods", result.methods.len());
/// # Ok::<(), dotnative::Error>(())
/// ```
pub struct ReachabilityAnalyzer<'a> {
    set: &'a ModuleSet,
    roots: Vec<MethodInst>,
    library: bool,
}

impl<'a> ReachabilityAnalyzer<'a> {
    /// Analyzer seeded with the module set's entry point, if it has one.
    #[must_use]
    pub fn new(set: &'a ModuleSet) -> Self {
        ReachabilityAnalyzer {
            set,
            roots: set.entry_point().map(MethodInst::plain).into_iter().collect(),
            library: false,
        }
    }

    /// Adds an extra root method.
    #[must_use]
    pub fn root(mut self, method: MethodInst) -> Self {
        self.roots.push(method);
        self
    }

    /// Roots every public, non-generic, non-abstract method of every public, non-generic
    /// type of the root module. The result then has no entry point.
    #[must_use]
    pub fn library_roots(mut self) -> Self {
        self.library = true;
        self
    }

    /// Runs the analysis.
    ///
    /// Resolution failures inside method bodies are not fatal: the instruction is skipped
    /// here and lowered to a stub later.
    ///
    /// # Errors
    /// Returns an error if a root method's signature cannot be resolved.
    pub fn analyze(self) -> Result<ReachabilityResult> {
        let mut state = State::new(self.set);

        for root in &self.roots {
            self.set.method_signature(root)?;
            state.add_method(root.clone());
        }
        if self.library {
            for root in library_roots(self.set) {
                state.add_method(root);
            }
        }

        state.run();

        let stats = ReachabilityStats {
            methods: state.methods.len(),
            types: state.types.len(),
            dispatch_sites: state.sites.len(),
            steps: state.steps,
            skipped_references: state.skipped,
        };
        log::info!(
            "Reachability: {} types, {} methods, {} dispatch sites in {} steps",
            stats.types,
            stats.methods,
            stats.dispatch_sites,
            stats.steps
        );
        if stats.skipped_references > 0 {
            log::debug!(
                "Reachability: {} unresolvable references left to lowering",
                stats.skipped_references
            );
        }

        Ok(ReachabilityResult {
            types: state.types,
            methods: state.methods,
            entry_point: if self.library {
                None
            } else {
                self.set.entry_point().map(MethodInst::plain)
            },
            stats,
        })
    }
}

/// Public, non-generic methods of public, non-generic root module types.
fn library_roots(set: &ModuleSet) -> Vec<MethodInst> {
    let root = set.root_module().id;
    set.types()
        .filter(|ty| ty.module == root && ty.is_public() && ty.arity() == 0)
        .flat_map(|ty| ty.methods.iter().copied())
        .filter(|&id| {
            let method = set.method(id);
            method.flags.bits() & METHOD_ACCESS_MASK == MethodAttributes::PUBLIC.bits()
                && method.arity() == 0
                && !method.is_abstract()
        })
        .map(MethodInst::plain)
        .collect()
}

struct State<'a> {
    set: &'a ModuleSet,
    methods: BTreeSet<MethodInst>,
    types: BTreeSet<TypeSig>,
    sites: BTreeSet<DispatchSite>,
    pending_methods: VecDeque<MethodInst>,
    pending_types: VecDeque<TypeSig>,
    pending_sites: VecDeque<DispatchSite>,
    steps: usize,
    skipped: usize,
}

impl<'a> State<'a> {
    fn new(set: &'a ModuleSet) -> Self {
        State {
            set,
            methods: BTreeSet::new(),
            types: BTreeSet::new(),
            sites: BTreeSet::new(),
            pending_methods: VecDeque::new(),
            pending_types: VecDeque::new(),
            pending_sites: VecDeque::new(),
            steps: 0,
            skipped: 0,
        }
    }

    fn run(&mut self) {
        loop {
            if let Some(method) = self.pending_methods.pop_front() {
                self.steps += 1;
                if let Err(error) = self.scan_method(&method) {
                    self.skip(&error);
                }
            } else if let Some(ty) = self.pending_types.pop_front() {
                self.steps += 1;
                self.expand_type(&ty);
            } else if let Some(site) = self.pending_sites.pop_front() {
                self.steps += 1;
                let known: Vec<TypeSig> = self.types.iter().cloned().collect();
                for ty in &known {
                    self.dispatch(ty, &site);
                }
            } else {
                break;
            }
        }
    }

    fn skip(&mut self, error: &crate::Error) {
        self.skipped += 1;
        log::trace!("Reachability skipped a reference - {error}");
    }

    fn add_method(&mut self, method: MethodInst) {
        if self.methods.contains(&method) {
            return;
        }
        let record = self.set.method(method.method);
        let owner = self
            .set
            .def_sig(record.declaring_type, method.type_args.clone());
        self.methods.insert(method.clone());
        self.pending_methods.push_back(method);
        self.add_type(&owner);
    }

    /// Records `ty` and the definitions it is made of.
    fn add_type(&mut self, ty: &TypeSig) {
        match ty {
            TypeSig::Void | TypeSig::FnPtr | TypeSig::Var(_) | TypeSig::MVar(_) => {}
            TypeSig::Ptr(inner) | TypeSig::ByRef(inner) => self.add_type(inner),
            TypeSig::SzArray(inner) | TypeSig::Array(inner, _) => {
                self.add_type(inner);
                if let Some(array) = self.set.find_type("System.Array") {
                    self.add_type(&TypeSig::Named(array, Vec::new()));
                }
            }
            _ if ty.is_open() => {}
            _ => {
                if self.types.insert(ty.clone()) {
                    self.pending_types.push_back(ty.clone());
                }
            }
        }
    }

    fn add_site(&mut self, slot: MethodInst) {
        let record = self.set.method(slot.method);
        let declaring = self
            .set
            .def_sig(record.declaring_type, slot.type_args.clone());
        self.add_type(&declaring);
        let site = DispatchSite { slot, declaring };
        if self.sites.insert(site.clone()) {
            self.pending_sites.push_back(site);
        }
    }

    fn scan_method(&mut self, method: &MethodInst) -> Result<()> {
        let set = self.set;
        let signature = set.method_signature(method)?;
        for param in &signature.params {
            self.add_type(param);
        }
        self.add_type(&signature.return_type);

        let record = set.method(method.method);
        let Some(body) = &record.body else {
            return Ok(());
        };
        let ctx = GenericContext::of(method);

        for local in &body.locals {
            match set.resolve_signature(record.module, local, &ctx) {
                Ok(local) => self.add_type(&local),
                Err(error) => self.skip(&error),
            }
        }
        for handler in &body.exception_handlers {
            if let Some(token) = handler.class_token() {
                match set.resolve_type(record.module, token, &ctx) {
                    Ok(ty) => self.add_type(&ty),
                    Err(error) => self.skip(&error),
                }
            }
        }

        let mut constraint: Option<TypeSig> = None;
        for instruction in &body.instructions {
            // constrained.
            if instruction.prefix == 0xFE && instruction.opcode == 0x16 {
                constraint = instruction
                    .token()
                    .and_then(|token| set.resolve_type(record.module, token, &ctx).ok());
                continue;
            }
            if instruction.is_prefix() {
                continue;
            }

            let reference = classify(set, record.module, instruction, constraint.as_ref(), &ctx);
            constraint = None;
            match reference {
                Ok(Some(reference)) => self.apply(reference),
                Ok(None) => {}
                Err(error) => self.skip(&error),
            }
        }
        Ok(())
    }

    fn apply(&mut self, reference: Reference) {
        match reference {
            Reference::Direct(method) => self.add_method(method),
            Reference::Dispatch(slot) => {
                let record = self.set.method(slot.method);
                if !record.is_abstract() {
                    self.add_method(slot.clone());
                }
                self.add_site(slot);
            }
            Reference::Constrained { receiver, slot } => {
                self.add_type(&receiver);
                match self.set.find_override(&receiver, &slot) {
                    Ok(Some(target)) => self.add_method(target),
                    Ok(None) => {
                        // reference types fall back to virtual dispatch
                        if !self.set.method(slot.method).is_static() {
                            self.add_site(slot);
                        }
                    }
                    Err(error) => self.skip(&error),
                }
            }
            Reference::Field { field, .. } => {
                self.add_type(&field.owner);
                match self.set.field_type(&field) {
                    Ok(ty) => self.add_type(&ty),
                    Err(error) => self.skip(&error),
                }
            }
            Reference::Type(ty) => self.add_type(&ty),
            Reference::String => self.add_type(&TypeSig::String),
        }
    }

    fn expand_type(&mut self, ty: &TypeSig) {
        let set = self.set;
        for arg in ty.generic_args() {
            self.add_type(arg);
        }
        match set.base_type(ty) {
            Ok(Some(base)) => self.add_type(&base),
            Ok(None) => {}
            Err(error) => self.skip(&error),
        }
        match set.interfaces(ty) {
            Ok(interfaces) => {
                for interface in &interfaces {
                    self.add_type(interface);
                }
            }
            Err(error) => self.skip(&error),
        }

        if let Some(def) = set.type_def_of(ty) {
            if let Some(cctor) = set.static_constructor(def) {
                let instance = MethodInst {
                    method: cctor,
                    type_args: ty.generic_args().to_vec(),
                    method_args: Vec::new(),
                };
                self.add_method(instance);
            }
        }

        let known: Vec<DispatchSite> = self.sites.iter().cloned().collect();
        for site in &known {
            self.dispatch(ty, site);
        }
    }

    /// Adds the implementation `ty` provides for `site`, if `ty` is a receiver of it.
    fn dispatch(&mut self, ty: &TypeSig, site: &DispatchSite) {
        if self.set.is_interface(ty) {
            return;
        }
        match self.set.is_subtype(ty, &site.declaring) {
            Ok(true) => {}
            Ok(false) => return,
            Err(error) => {
                self.skip(&error);
                return;
            }
        }
        match self.set.find_override(ty, &site.slot) {
            Ok(Some(target)) => self.add_method(target),
            Ok(None) => {}
            Err(error) => self.skip(&error),
        }
    }
}
