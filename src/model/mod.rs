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

//! The queryable program model every later stage works on.
//!
//! # Architecture
//!
//! - **Records** ([`TypeRecord`], [`MethodRecord`], [`FieldRecord`], [`Module`]) - owned
//!   copies of the metadata rows, in module-local form
//! - **Resolved types** ([`TypeSig`], [`MethodInst`]) - module independent values used as
//!   identities by reachability, IR and code generation
//! - **[`ModuleSet`]** - arenas plus cross-module resolution with concurrent caches
//! - **[`ModuleLoader`]** - reads PE files and probes for referenced assemblies
//! - **[`ModuleSetBuilder`]** - constructs module sets in memory
//!
//! # Example
//!
//! ```rust,no_run
//! use dotnative::{model::ModuleSet, BuildConfig};
//!
//! let set = ModuleSet::load("bin/App.dll", &BuildConfig::default())?;
//! for ty in set.types().filter(|ty| ty.module == set.root_module().id) {
//!     println!("{}", set.type_full_name(ty.id));
//! }
//! # Ok::<(), dotnative::Error>(())
//! ```

mod builder;
mod loader;
mod moduleset;
mod probing;
mod records;
mod resolution;
mod typesig;

pub use builder::{AttributeTarget, MethodBuilder, ModuleSetBuilder, TypeBuilder};
pub use loader::ModuleLoader;
pub use moduleset::{FieldRef, ModuleSet, ResolvedSignature};
pub use probing::{private_paths, public_key_token, ProbePaths};
pub use records::{
    AssemblyRefRecord, AttributeRecord, ExportedTypeRecord, FieldId, FieldRecord,
    MemberRefRecord, MemberRefSignature, MethodBodyRecord, MethodId, MethodRecord,
    MethodSpecRecord, Module, ModuleId, ResolutionScope, TypeId, TypeRecord, TypeRefRecord,
};
pub use resolution::{AttributeTypeResolver, MAX_RESOLUTION_DEPTH};
pub use typesig::{GenericContext, MethodInst, TypeSig, PRIMITIVE_NAMES};
