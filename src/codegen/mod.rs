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


//! Native code generation.
//!
//! Turns a fully built [`IrModule`] into C++ sources linking against the `cil2cpp` runtime.
//! The output is a set of in-memory [`Artifact`]s; writing them to disk is up to the caller
//! (see [`GeneratedOutput::write_to`]).
//!
//! # Artifacts
//!
//! - `{module}.h`: runtime include, type layouts, statics, type descriptor declarations and
//!   one prototype per emitted function
//! - `{module}.cpp`: statics storage, class initialization guards, method tables, type
//!   descriptors and every function body
//! - `main.cpp`: only for programs, invokes the entry method through `CIL2CPP_MAIN`
//! - `CMakeLists.txt`: when [`BuildConfig::emit_build_description`] is set
//! - `stub_report.txt`: when [`BuildConfig::stub_analysis`] is set
//!
//! # Stubs
//!
//! A method whose body could not be lowered is never emitted verbatim. If its mangled name
//! has a hand-written body in the [`knowledge`] table, that body is used. Otherwise the
//! function returns the default value of its return type and the method is recorded in the
//! [`StubAnalysis`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotnative::prelude::*;
//!
//! let config = BuildConfig::release();
//! let set = ModuleSet::load("App.dll", &config)?;
//! let reachable = ReachabilityAnalyzer::new(&set).analyze()?;
//! let module = IrBuilder::new(&set, &reachable, &config).build()?;
//! let output = Generator::new(&set, &module, &config).generate()?;
//! output.write_to("out")?;
//! # Ok::<(), dotnative::Error>(())
//! ```

pub mod abi;
mod analysis;
mod emit;
pub mod knowledge;
mod layout;
pub mod mangle;
mod writer;

use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
    time::Instant,
};

use rayon::prelude::*;

pub use analysis::{StubAnalysis, StubCategory, StubEntry};

use crate::{
    codegen::{
        analysis::StubDiagnostics,
        emit::{emit_stub, emit_thunk, needs_thunk, signature, thunk_signature, FunctionEmitter},
        layout::Layout,
        writer::CodeWriter,
    },
    ir::{IrBody, IrMethod, IrModule, IrType},
    model::{ModuleSet, TypeSig},
    BuildConfig, Result,
};

/// One generated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name, relative to the output directory
    pub name: String,
    /// File contents
    pub contents: String,
}

/// Everything the generator produced.
#[derive(Debug, Clone)]
pub struct GeneratedOutput {
    /// Generated files in a fixed order: header, source, entry point, build description,
    /// stub report
    pub files: Vec<Artifact>,
    /// Stubs emitted with a hand-written body
    pub known_stubs: usize,
    /// Stubs emitted with a default body
    pub unknown_stubs: usize,
    analysis: StubAnalysis,
}

impl GeneratedOutput {
    /// The artifact named `name`.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&Artifact> {
        self.files.iter().find(|file| file.name == name)
    }

    /// Root-cause analysis of every stub emitted with a default body.
    #[must_use]
    pub fn analysis(&self) -> &StubAnalysis {
        &self.analysis
    }

    /// Writes every artifact into `directory`, creating it if needed.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if a directory or file cannot be written.
    pub fn write_to(&self, directory: impl AsRef<Path>) -> Result<()> {
        let directory = directory.as_ref();
        std::fs::create_dir_all(directory)?;
        for file in &self.files {
            std::fs::write(directory.join(&file.name), &file.contents)?;
        }
        Ok(())
    }
}

/// Base name of the generated sources of `module`.
fn file_stem(module: &str) -> String {
    let stem: String = module
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "module".to_string()
    } else {
        stem
    }
}

/// Generates C++ for one IR module.
pub struct Generator<'a> {
    set: &'a ModuleSet,
    module: &'a IrModule,
    config: &'a BuildConfig,
}

impl<'a> Generator<'a> {
    /// Creates a generator for `module`, which must have been built from `set`.
    #[must_use]
    pub fn new(set: &'a ModuleSet, module: &'a IrModule, config: &'a BuildConfig) -> Self {
        Generator {
            set,
            module,
            config,
        }
    }

    /// Produces every artifact.
    ///
    /// # Errors
    /// Returns an error if writing the optional analysis report fails to format.
    pub fn generate(&self) -> Result<GeneratedOutput> {
        let start = Instant::now();
        let layout = Layout::new(self.set, self.module);
        let stem = file_stem(&self.module.name);
        let diagnostics = StubDiagnostics::new();
        let known = AtomicUsize::new(0);

        let header = self.header(&layout);
        let source = self.source(&layout, &stem, &diagnostics, &known);

        let mut files = vec![
            Artifact {
                name: format!("{stem}.h"),
                contents: header,
            },
            Artifact {
                name: format!("{stem}.cpp"),
                contents: source,
            },
        ];
        if let Some(entry) = self.entry_point(&layout, &stem) {
            files.push(Artifact {
                name: "main.cpp".to_string(),
                contents: entry,
            });
        }
        if self.config.emit_build_description() {
            files.push(Artifact {
                name: "CMakeLists.txt".to_string(),
                contents: self.build_description(&stem),
            });
        }

        let analysis = diagnostics.freeze();
        if self.config.stub_analysis() {
            files.push(Artifact {
                name: "stub_report.txt".to_string(),
                contents: analysis.report(),
            });
        }

        let known_stubs = known.load(Ordering::Relaxed);
        log::info!(
            "Generated {} file(s) for '{}' in {:?}: {} known and {} unknown stub(s)",
            files.len(),
            self.module.name,
            start.elapsed(),
            known_stubs,
            analysis.len()
        );
        Ok(GeneratedOutput {
            files,
            known_stubs,
            unknown_stubs: analysis.len(),
            analysis,
        })
    }

    fn preamble(&self, out: &mut CodeWriter) {
        out.line(format!(
            "// Generated by dotnative from '{}'. Do not edit.",
            self.module.name
        ));
    }

    fn header(&self, layout: &Layout<'_>) -> String {
        let mut out = CodeWriter::new();
        self.preamble(&mut out);
        out.line("#pragma once");
        out.blank();
        if self.config.stack_trace_capture() {
            out.line(format!("#define {}", abi::STACK_TRACES));
        }
        out.line(format!("#include \"{}\"", abi::RUNTIME_HEADER));
        for include in ["bit", "cmath", "cstdint", "cstring", "limits"] {
            out.line(format!("#include <{include}>"));
        }
        out.blank();

        layout.declarations(&mut out);

        out.line("// Methods");
        for ty in &self.module.types {
            for &method in &ty.methods {
                let method = self.module.method(method);
                if !Layout::is_emitted(method) {
                    continue;
                }
                out.line(format!("{};", signature(layout, method)));
                if needs_thunk(layout, method) {
                    out.line(format!("{};", thunk_signature(layout, method)));
                }
            }
        }
        out.finish()
    }

    fn source(
        &self,
        layout: &Layout<'_>,
        stem: &str,
        diagnostics: &StubDiagnostics,
        known: &AtomicUsize,
    ) -> String {
        let mut out = CodeWriter::new();
        self.preamble(&mut out);
        out.line(format!("#include \"{stem}.h\""));
        out.blank();
        layout.definitions(&mut out);

        let fragments = boxcar::Vec::new();
        self.module.types.par_iter().for_each(|ty| {
            let text = self.emit_type(layout, ty, diagnostics, known);
            if !text.is_empty() {
                fragments.push((ty.id, text));
            }
        });

        let mut fragments: Vec<_> = fragments.iter().map(|(_, (id, text))| (*id, text)).collect();
        fragments.sort_by_key(|(id, _)| *id);
        for (_, text) in &fragments {
            out.append(text);
        }
        out.finish()
    }

    fn emit_type(
        &self,
        layout: &Layout<'_>,
        ty: &IrType,
        diagnostics: &StubDiagnostics,
        known: &AtomicUsize,
    ) -> String {
        let mut out = CodeWriter::new();
        for &method in &ty.methods {
            let method = self.module.method(method);
            if !Layout::is_emitted(method) {
                continue;
            }
            if self.config.il_offset_comments() {
                out.line(format!("// {}", method.full_name));
            }
            match method.body() {
                IrBody::Lowered(body) => {
                    match FunctionEmitter::new(layout, self.config, method, body).emit() {
                        Ok(text) => out.append(&text),
                        Err(unstructured) => {
                            log::debug!(
                                "Stub {}: unstructured regions - {}",
                                method.full_name,
                                unstructured.0
                            );
                            self.stub(
                                layout,
                                method,
                                StubCategory::Unknown,
                                unstructured.0,
                                diagnostics,
                                known,
                                &mut out,
                            );
                        }
                    }
                }
                IrBody::Stub(reason) => self.stub(
                    layout,
                    method,
                    StubCategory::of(reason),
                    reason.to_string(),
                    diagnostics,
                    known,
                    &mut out,
                ),
            }
            if needs_thunk(layout, method) {
                emit_thunk(layout, method, &mut out);
            }
        }
        out.finish()
    }

    #[allow(clippy::too_many_arguments)]
    fn stub(
        &self,
        layout: &Layout<'_>,
        method: &IrMethod,
        category: StubCategory,
        detail: String,
        diagnostics: &StubDiagnostics,
        known: &AtomicUsize,
        out: &mut CodeWriter,
    ) {
        match knowledge::known_body(&method.mangled) {
            Some(body) => {
                log::debug!("Known body for {}", method.full_name);
                known.fetch_add(1, Ordering::Relaxed);
                emit_stub(layout, method, Some(body), out);
            }
            None => {
                diagnostics.record(StubEntry {
                    mangled: method.mangled.clone(),
                    method: method.full_name.clone(),
                    category,
                    detail,
                });
                emit_stub(layout, method, None, out);
            }
        }
    }

    fn entry_point(&self, layout: &Layout<'_>, stem: &str) -> Option<String> {
        let entry = self.module.method(self.module.entry_point?);
        let owner = self.module.ty(entry.declaring);

        let mut out = CodeWriter::new();
        self.preamble(&mut out);
        out.line(format!("#include \"{stem}.h\""));
        out.blank();
        out.open("static void dotnative_entry() {");
        let args = if entry.params.is_empty() {
            String::new()
        } else {
            format!(
                "{}({}, 0)",
                abi::ARRAY_CREATE,
                layout.type_info(&TypeSig::String)
            )
        };
        out.line(format!("{}({args});", entry.mangled));
        out.close("}");
        out.blank();
        out.line(format!("{}({}, dotnative_entry)", abi::MAIN, owner.mangled));
        Some(out.finish())
    }

    fn build_description(&self, stem: &str) -> String {
        let target: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let mut out = CodeWriter::new();
        out.line("cmake_minimum_required(VERSION 3.20)");
        out.line(format!("project({target} LANGUAGES CXX)"));
        out.blank();
        out.line("set(CMAKE_CXX_STANDARD 20)");
        out.line("set(CMAKE_CXX_STANDARD_REQUIRED ON)");
        out.blank();
        out.line(format!("find_package({} REQUIRED)", abi::RUNTIME_PACKAGE));
        out.blank();
        if self.module.entry_point.is_some() {
            out.line(format!("add_executable({target} {stem}.cpp main.cpp)"));
        } else {
            out.line(format!("add_library({target} STATIC {stem}.cpp)"));
        }
        out.line(format!(
            "target_link_libraries({target} PRIVATE {})",
            abi::RUNTIME_TARGET
        ));
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        ir::IrBuilder,
        reachability::ReachabilityAnalyzer,
        model::ModuleSetBuilder,
        test::{calculator_set, shapes},
    };

    fn generate(set: &ModuleSet, config: &BuildConfig) -> GeneratedOutput {
        let reachable = ReachabilityAnalyzer::new(set).analyze().unwrap();
        let module = IrBuilder::new(set, &reachable, config).build().unwrap();
        Generator::new(set, &module, config).generate().unwrap()
    }

    #[test]
    fn program_artifacts() {
        let (set, _) = calculator_set().unwrap();
        let output = generate(&set, &BuildConfig::release());

        let names: Vec<&str> = output.files.iter().map(|file| file.name.as_str()).collect();
        assert_eq!(names, ["App.h", "App.cpp", "main.cpp", "CMakeLists.txt"]);

        let header = &output.file("App.h").unwrap().contents;
        assert!(header.contains("#pragma once"));
        assert!(header.contains("#include \"cil2cpp/cil2cpp.h\""));
        assert!(header.contains(
            "int32_t App_N_Calc_D_Add_P2_System_N_Int32_C_System_N_Int32_R_System_N_Int32(App_N_Calc* arg0, int32_t arg1, int32_t arg2);"
        ));

        let main = &output.file("main.cpp").unwrap().contents;
        assert!(main.contains("App_N_Program_D_Main_P0_R_System_N_Void();"));
        assert!(main.contains("CIL2CPP_MAIN(App_N_Program, dotnative_entry)"));

        let cmake = &output.file("CMakeLists.txt").unwrap().contents;
        assert!(cmake.contains("add_executable(App App.cpp main.cpp)"));
        assert!(cmake.contains("target_link_libraries(App PRIVATE cil2cpp::runtime)"));
    }

    #[test]
    fn stubs_get_default_bodies_and_diagnostics() {
        let mut builder = ModuleSetBuilder::new();
        shapes(&mut builder).unwrap();
        let set = builder.build().unwrap();
        let config = BuildConfig::builder().stub_analysis(true).build();
        let output = generate(&set, &config);

        let source = &output.file("App.cpp").unwrap().contents;
        // abstract methods have no definition
        assert!(!source.contains("App_N_Shape_D_Area_P0_R_System_N_Int32("));
        assert!(source.contains("App_N_Circle_D_Area_P0_R_System_N_Int32(App_N_Circle* arg0) {"));
        assert!(output.file("stub_report.txt").is_some());
        assert_eq!(output.unknown_stubs, output.analysis().len());
    }

    #[test]
    fn file_stems() {
        assert_eq!(file_stem("System.Runtime"), "System.Runtime");
        assert_eq!(file_stem("My App"), "My_App");
        assert_eq!(file_stem(""), "module");
    }
}
