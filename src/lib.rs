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

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'streams/userstrings.rs' reinterprets a &[u8] heap entry as UTF-16 code units
// - 'file/backend.rs' uses mmap to map a module into memory

//! # dotnative
//!
//! An ahead-of-time compiler translating CIL (ECMA-335) programs and libraries into C++
//! source code that links against the `cil2cpp` runtime. The whole reachable program,
//! including the parts of the base class library it touches, is compiled into one native
//! build; no JIT and no managed runtime is involved at execution time.
//!
//! ## Pipeline
//!
//! 1. **Front end** ([`model`]) - loads the root module and probes for every module it
//!    references, then exposes types, methods, fields, signatures and decoded bodies
//!    through one arena indexed [`model::ModuleSet`]
//! 2. **Reachability** ([`reachability`]) - computes the closed set of method instances and
//!    types starting from the entry point or the library surface
//! 3. **IR** ([`ir`]) - builds type and method shells, then lowers every reachable body
//!    into basic blocks over explicit values, or into a stub carrying the reason
//! 4. **Code generation** ([`codegen`]) - emits the header, source, entry point and build
//!    description, filling known stubs from a table of hand-written bodies
//!
//! [`Compiler`] runs the four stages in order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotnative::prelude::*;
//!
//! let output = Compiler::new(BuildConfig::release()).compile_path("bin/App.dll")?;
//! output.generated.write_to("native")?;
//! println!(
//!     "{} methods, {} stubs",
//!     output.ir.methods,
//!     output.analysis.len()
//! );
//! # Ok::<(), dotnative::Error>(())
//! ```
//!
//! ## Running the stages separately
//!
//! ```rust,no_run
//! use dotnative::prelude::*;
//!
//! let config = BuildConfig::debug();
//! let set = ModuleSet::load("bin/App.dll", &config)?;
//! let reachable = ReachabilityAnalyzer::new(&set).analyze()?;
//! let module = IrBuilder::new(&set, &reachable, &config).build()?;
//! for stub in module.stubs() {
//!     println!("{}", stub.full_name);
//! }
//! let output = Generator::new(&set, &module, &config).generate()?;
//! # Ok::<(), dotnative::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`Result<T>`]. Unsupported constructs inside method
//! bodies are not errors: they become stubs, are logged and show up in the
//! [`codegen::StubAnalysis`]. Only problems that make the whole build meaningless, such as
//! a missing module or a malformed metadata table, abort a compilation.
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and never installs a logger.

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use dotnative::prelude::*;
///
/// let set = ModuleSet::load("bin/App.dll", &BuildConfig::default())?;
/// println!("{} modules", set.modules().len());
/// # Ok::<(), dotnative::Error>(())
/// ```
pub mod prelude;

pub mod config;

/// CIL instruction decoding and assembling based on ECMA-335.
///
/// # Key Types
///
/// - [`disassembler::Instruction`] - one decoded instruction with operand and flow data
/// - [`disassembler::InstructionAssembler`] - fluent encoder used to build bodies in memory
///
/// # Examples
///
/// ```rust,no_run
/// use dotnative::{disassembler::decode_instruction, Parser};
///
/// let bytecode = &[0x00, 0x2A]; // nop, ret
/// let mut parser = Parser::new(bytecode);
/// let instruction = decode_instruction(&mut parser, 0)?;
/// println!("{} {:?}", instruction.mnemonic, instruction.flow_type);
/// # Ok::<(), dotnative::Error>(())
/// ```
pub mod disassembler;

/// Reading of ECMA-335 metadata: the CLR header, the metadata root, heaps, tables,
/// signatures, method bodies, custom attribute blobs and portable PDB sequence points.
pub mod metadata;

pub mod codegen;
pub mod compiler;
pub mod ir;
pub mod model;
pub mod reachability;

/// `dotnative` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotnative` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use dotnative::{BuildConfig, Compiler, Error};
///
/// match Compiler::new(BuildConfig::default()).compile_path("bin/App.dll") {
///     Ok(output) => println!("{} files", output.generated.files.len()),
///     Err(Error::ModuleNotFound { name, searched }) => {
///         println!("{name} not found in {searched:?}")
///     }
///     Err(e) => println!("Error: {e}"),
/// }
/// ```
pub use error::Error;

pub use compiler::{CompilationOutput, Compiler};
pub use config::{BuildConfig, BuildConfigBuilder};

/// Low-level file parsing utilities
pub use file::{parser::Parser, File};
