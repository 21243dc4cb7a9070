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

//! # dotnative Prelude
//!
//! Glob-importable re-exports of the types needed to drive a compilation, inspect its
//! intermediate results and build module sets in memory.
//!
//! ```rust,no_run
//! use dotnative::prelude::*;
//!
//! let config = BuildConfig::release();
//! let set = ModuleSet::load("bin/App.dll", &config)?;
//! let output = Compiler::new(config).compile(&set)?;
//! for (category, count) in output.analysis.counts() {
//!     println!("{category}: {count}");
//! }
//! # Ok::<(), dotnative::Error>(())
//! ```

// ================================================================================================
// Core
// ================================================================================================

/// Crate error and result types
pub use crate::{Error, Result};

/// Build configuration
pub use crate::config::{BuildConfig, BuildConfigBuilder};

/// Pipeline driver
pub use crate::compiler::{CompilationOutput, Compiler};

// ================================================================================================
// Front End
// ================================================================================================

/// Loaded modules and their arena ids
pub use crate::model::{
    FieldId, MethodId, MethodInst, Module, ModuleId, ModuleLoader, ModuleSet, TypeId, TypeSig,
};

/// In-memory module construction
pub use crate::model::{MethodBuilder, ModuleSetBuilder, TypeBuilder};

/// Instruction decoding and encoding
pub use crate::disassembler::{decode_instruction, decode_stream, Instruction, InstructionAssembler};

/// Metadata tokens
pub use crate::metadata::token::Token;

// ================================================================================================
// Pipeline Stages
// ================================================================================================

/// Reachability
pub use crate::reachability::{ReachabilityAnalyzer, ReachabilityResult, ReachabilityStats};

/// Intermediate representation
pub use crate::ir::{IrBody, IrBuilder, IrMethod, IrModule, IrStats, IrType, StubReason};

/// Code generation
pub use crate::codegen::{
    Artifact, GeneratedOutput, Generator, StubAnalysis, StubCategory, StubEntry,
};
