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


//! Intermediate representation between the managed program and native code.
//!
//! # Architecture
//!
//! - **Shells** ([`IrType`], [`IrMethod`]) - arena allocated, one per reachable type and
//!   method instance, with field layout, vtables and interface maps
//! - **Bodies** ([`IrBody`]) - either a [`LoweredBody`] of basic blocks over explicit values,
//!   or a stub carrying its [`StubReason`]
//! - **Attributes** ([`IrAttribute`]) - decoded custom attributes with internal ones filtered
//! - **[`IrBuilder`]** - runs the shell, attribute and body passes
//!
//! Shells are complete and immutable before any body is lowered; the body pass then runs in
//! parallel and writes each body exactly once.
//!
//! # Example
//!
//! ```rust,no_run
//! use dotnative::{
//!     ir::IrBuilder, model::ModuleSet, reachability::ReachabilityAnalyzer, BuildConfig,
//! };
//!
//! let config = BuildConfig::default();
//! let set = ModuleSet::load("bin/App.dll", &config)?;
//! let reachable = ReachabilityAnalyzer::new(&set).analyze()?;
//! let module = IrBuilder::new(&set, &reachable, &config).build()?;
//! for stub in module.stubs() {
//!     println!("{}: {}", stub.full_name, stub.body().stub_reason().unwrap());
//! }
//! # Ok::<(), dotnative::Error>(())
//! ```

pub mod attributes;
pub mod body;
mod builder;
mod lower;
mod types;

pub use attributes::{collect_attributes, is_internal_attribute, IrAttribute, IrAttributeArg};
pub use body::{
    BasicBlock, BinaryOp, CallSignature, CallTarget, CompareOp, ExceptionRegion, FieldAccess,
    IrBody, IrInstr, IrValue, LoweredBody, Marker, Overflow, RegionKind, StubReason, UnaryOp,
};
pub use builder::IrBuilder;
pub use types::{
    InterfaceMap, IrField, IrMethod, IrMethodId, IrModule, IrParam, IrStats, IrType, IrTypeId,
    VtableSlot,
};
