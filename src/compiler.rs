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

//! The compilation pipeline.
//!
//! [`Compiler`] runs the stages strictly in order: load the module set, compute
//! reachability, build the IR and generate the native sources. Any fatal error ends the run
//! before an artifact exists, so a failed compilation never leaves partial output behind.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotnative::{BuildConfig, Compiler};
//!
//! let output = Compiler::new(BuildConfig::debug()).compile_path("bin/App.dll")?;
//! output.generated.write_to("out")?;
//! println!("{}", output.analysis);
//! # Ok::<(), dotnative::Error>(())
//! ```

use std::{path::Path, time::Instant};

use crate::{
    codegen::{GeneratedOutput, Generator, StubAnalysis},
    ir::{IrBuilder, IrStats},
    model::ModuleSet,
    reachability::{ReachabilityAnalyzer, ReachabilityStats},
    BuildConfig, Result,
};

/// Result of one successful compilation.
#[derive(Debug, Clone)]
pub struct CompilationOutput {
    /// Name of the root module
    pub module: String,
    /// True if the program has an entry method
    pub has_entry_point: bool,
    /// Counters of the reachability pass
    pub reachability: ReachabilityStats,
    /// Counters of the IR
    pub ir: IrStats,
    /// Generated artifacts
    pub generated: GeneratedOutput,
    /// Root-cause analysis of every stub emitted with a default body
    pub analysis: StubAnalysis,
}

/// Drives a module set through every stage.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: BuildConfig,
    library: bool,
}

impl Compiler {
    /// Creates a compiler using `config` for every stage.
    #[must_use]
    pub fn new(config: BuildConfig) -> Self {
        Compiler {
            config,
            library: false,
        }
    }

    /// Compiles as a library even if the root module has an entry point.
    ///
    /// Every public, non-generic method of the root module becomes a root.
    #[must_use]
    pub fn library(mut self) -> Self {
        self.library = true;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Loads the module at `path` with its dependencies and compiles it.
    ///
    /// # Errors
    /// Returns [`crate::Error::ModuleNotFound`] if a referenced module cannot be located,
    /// or any error of [`Compiler::compile`].
    pub fn compile_path(&self, path: impl AsRef<Path>) -> Result<CompilationOutput> {
        let started = Instant::now();
        let set = ModuleSet::load(path, &self.config)?;
        log::info!(
            "Loaded '{}' with {} module(s) in {:?}",
            set.root_module().name,
            set.modules().len(),
            started.elapsed()
        );
        self.compile(&set)
    }

    /// Compiles an already loaded module set.
    ///
    /// A set without an entry point is compiled as a library.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedReference`] if a root or a type shell cannot be
    /// resolved, and [`crate::Error::NameCollision`] if two entities share a native name.
    pub fn compile(&self, set: &ModuleSet) -> Result<CompilationOutput> {
        let started = Instant::now();

        let library = self.library || set.entry_point().is_none();
        let mut analyzer = ReachabilityAnalyzer::new(set);
        if library {
            analyzer = analyzer.library_roots();
        }
        let reachable = analyzer.analyze()?;
        let reachability_time = started.elapsed();

        let module = IrBuilder::new(set, &reachable, &self.config).build()?;
        let ir_time = started.elapsed() - reachability_time;

        let generated = Generator::new(set, &module, &self.config).generate()?;
        let codegen_time = started.elapsed() - reachability_time - ir_time;

        log::info!(
            "Compiled '{}' as {}: reachability {:?}, ir {:?}, codegen {:?}, total {:?}",
            module.name,
            if library { "library" } else { "program" },
            reachability_time,
            ir_time,
            codegen_time,
            started.elapsed()
        );

        Ok(CompilationOutput {
            module: module.name.clone(),
            has_entry_point: module.entry_point.is_some(),
            reachability: reachable.stats,
            ir: module.stats(),
            analysis: generated.analysis().clone(),
            generated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        model::ModuleSetBuilder,
        test::{calculator_set, shapes},
    };

    #[test]
    fn program_pipeline() {
        let (set, _) = calculator_set().unwrap();
        let output = Compiler::new(BuildConfig::release()).compile(&set).unwrap();

        assert_eq!(output.module, "App");
        assert!(output.has_entry_point);
        assert!(output.generated.file("main.cpp").is_some());
        assert_eq!(output.ir.methods, output.reachability.methods);
        assert_eq!(output.ir.lowered + output.ir.stubs, output.ir.methods);
    }

    #[test]
    fn library_mode_has_no_entry_artifact() {
        let mut builder = ModuleSetBuilder::new();
        shapes(&mut builder).unwrap();
        let set = builder.build().unwrap();

        let output = Compiler::new(BuildConfig::release())
            .library()
            .compile(&set)
            .unwrap();
        assert!(output.generated.file("main.cpp").is_none());
        assert!(output.generated.file("App.h").is_some());
    }
}
