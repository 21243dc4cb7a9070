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

//! Build configuration shared by every pipeline stage.
//!
//! A [`BuildConfig`] is created once per compilation run and handed down by reference. It is
//! immutable: there are no setters, only the [`BuildConfigBuilder`] used to create it.
//!
//! # Examples
//!
//! ```rust
//! use dotnative::BuildConfig;
//!
//! let config = BuildConfig::builder()
//!     .debug_line_mapping(true)
//!     .il_offset_comments(true)
//!     .build();
//!
//! assert!(config.debug_line_mapping());
//! assert!(!config.stack_trace_capture());
//! ```

/// Immutable set of switches controlling front-end reading and code generation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuildConfig {
    debug_line_mapping: bool,
    il_offset_comments: bool,
    stack_trace_capture: bool,
    read_debug_symbols: bool,
    emit_build_description: bool,
    stub_analysis: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self::release()
    }
}

impl BuildConfig {
    /// Returns a builder starting from the release preset.
    #[must_use]
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder {
            config: Self::release(),
        }
    }

    /// Release preset: no debug information, no diagnostics in the output.
    #[must_use]
    pub fn release() -> Self {
        BuildConfig {
            debug_line_mapping: false,
            il_offset_comments: false,
            stack_trace_capture: false,
            read_debug_symbols: false,
            emit_build_description: true,
            stub_analysis: false,
        }
    }

    /// Debug preset: line mapping, IL comments, stack traces and debug symbols enabled.
    #[must_use]
    pub fn debug() -> Self {
        BuildConfig {
            debug_line_mapping: true,
            il_offset_comments: true,
            stack_trace_capture: true,
            read_debug_symbols: true,
            emit_build_description: true,
            stub_analysis: true,
        }
    }

    /// Emit `#line` directives mapping generated code back to source positions.
    #[must_use]
    pub fn debug_line_mapping(&self) -> bool {
        self.debug_line_mapping
    }

    /// Emit `// IL_xxxx` comments before the statements of each instruction.
    #[must_use]
    pub fn il_offset_comments(&self) -> bool {
        self.il_offset_comments
    }

    /// Generated code records managed stack frames for exception stack traces.
    #[must_use]
    pub fn stack_trace_capture(&self) -> bool {
        self.stack_trace_capture
    }

    /// Read Portable PDB files next to the loaded modules.
    #[must_use]
    pub fn read_debug_symbols(&self) -> bool {
        self.read_debug_symbols
    }

    /// Produce a `CMakeLists.txt` next to the generated sources.
    #[must_use]
    pub fn emit_build_description(&self) -> bool {
        self.emit_build_description
    }

    /// Run the stub root-cause analysis and emit its report.
    #[must_use]
    pub fn stub_analysis(&self) -> bool {
        self.stub_analysis
    }
}

/// Builder for [`BuildConfig`].
#[derive(Debug, Clone)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    /// See [`BuildConfig::debug_line_mapping`].
    #[must_use]
    pub fn debug_line_mapping(mut self, enabled: bool) -> Self {
        self.config.debug_line_mapping = enabled;
        self
    }

    /// See [`BuildConfig::il_offset_comments`].
    #[must_use]
    pub fn il_offset_comments(mut self, enabled: bool) -> Self {
        self.config.il_offset_comments = enabled;
        self
    }

    /// See [`BuildConfig::stack_trace_capture`].
    #[must_use]
    pub fn stack_trace_capture(mut self, enabled: bool) -> Self {
        self.config.stack_trace_capture = enabled;
        self
    }

    /// See [`BuildConfig::read_debug_symbols`].
    #[must_use]
    pub fn read_debug_symbols(mut self, enabled: bool) -> Self {
        self.config.read_debug_symbols = enabled;
        self
    }

    /// See [`BuildConfig::emit_build_description`].
    #[must_use]
    pub fn emit_build_description(mut self, enabled: bool) -> Self {
        self.config.emit_build_description = enabled;
        self
    }

    /// See [`BuildConfig::stub_analysis`].
    #[must_use]
    pub fn stub_analysis(mut self, enabled: bool) -> Self {
        self.config.stub_analysis = enabled;
        self
    }

    /// Freezes the configuration.
    #[must_use]
    pub fn build(self) -> BuildConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let release = BuildConfig::release();
        assert!(!release.debug_line_mapping());
        assert!(!release.read_debug_symbols());
        assert_eq!(release, BuildConfig::default());

        let debug = BuildConfig::debug();
        assert!(debug.debug_line_mapping());
        assert!(debug.il_offset_comments());
        assert!(debug.stack_trace_capture());
        assert!(debug.read_debug_symbols());
    }

    #[test]
    fn builder_overrides_single_flag() {
        let config = BuildConfig::builder().stub_analysis(true).build();
        assert!(config.stub_analysis());
        assert!(!config.il_offset_comments());
    }
}
