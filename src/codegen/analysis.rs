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


//! Root-cause analysis of stubs without a hand-written body.
//!
//! Emission records every such stub in a [`StubDiagnostics`] accumulator while types are
//! emitted in parallel. The frozen [`StubAnalysis`] groups the entries by the construct that
//! blocked lowering and renders a plain text report. None of this feeds back into the
//! generated code.

use std::{
    collections::BTreeMap,
    fmt::{self, Write},
};

use crossbeam_skiplist::SkipMap;
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use crate::ir::StubReason;

/// The construct a stub is attributed to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount, strum::Display,
)]
pub enum StubCategory {
    /// `constrained.` call to a static abstract interface member
    #[strum(to_string = "static abstract interface dispatch")]
    StaticAbstractDispatch,
    /// Generic virtual methods and instances left open
    #[strum(to_string = "generic specialization")]
    GenericSpecialization,
    /// Placeholder IL of a method the JIT replaces
    #[strum(to_string = "JIT intrinsic")]
    JitIntrinsic,
    /// Runtime implemented or bodiless method
    #[strum(to_string = "internal call")]
    InternalCall,
    /// An instruction without translation
    #[strum(to_string = "unsupported instruction")]
    UnsupportedInstruction,
    /// Filter handler
    #[strum(to_string = "exception filter")]
    ExceptionFilter,
    /// A reference inside the body that does not resolve
    #[strum(to_string = "unresolved reference")]
    UnresolvedReference,
    /// Anything else
    #[strum(to_string = "unknown")]
    Unknown,
}

impl StubCategory {
    /// Category of a lowering failure.
    #[must_use]
    pub fn of(reason: &StubReason) -> Self {
        match reason {
            StubReason::StaticAbstractDispatch { .. } => StubCategory::StaticAbstractDispatch,
            StubReason::GenericVirtualCall { .. } | StubReason::OpenGeneric => {
                StubCategory::GenericSpecialization
            }
            StubReason::JitIntrinsic => StubCategory::JitIntrinsic,
            StubReason::InternalCall | StubReason::NoBody => StubCategory::InternalCall,
            StubReason::Unsupported { .. } => StubCategory::UnsupportedInstruction,
            StubReason::ExceptionFilter => StubCategory::ExceptionFilter,
            StubReason::Unresolved { .. } => StubCategory::UnresolvedReference,
            StubReason::StackMismatch { .. } | StubReason::Abstract => StubCategory::Unknown,
        }
    }
}

/// One method emitted with a default body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubEntry {
    /// Native name
    pub mangled: String,
    /// Readable name
    pub method: String,
    /// Attributed cause
    pub category: StubCategory,
    /// What exactly failed
    pub detail: String,
}

/// Concurrent accumulator of [`StubEntry`]s, ordered by native name.
#[derive(Debug, Default)]
pub(crate) struct StubDiagnostics {
    entries: SkipMap<String, StubEntry>,
}

impl StubDiagnostics {
    pub fn new() -> Self {
        StubDiagnostics::default()
    }

    pub fn record(&self, entry: StubEntry) {
        self.entries.insert(entry.mangled.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn freeze(&self) -> StubAnalysis {
        StubAnalysis {
            entries: self
                .entries
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
        }
    }
}

/// Every stub without a hand-written body, by native name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StubAnalysis {
    entries: Vec<StubEntry>,
}

impl StubAnalysis {
    /// Entries sorted by native name.
    #[must_use]
    pub fn entries(&self) -> &[StubEntry] {
        &self.entries
    }

    /// Number of stubs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if every stub had a hand-written body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry of the method named `mangled`.
    #[must_use]
    pub fn find(&self, mangled: &str) -> Option<&StubEntry> {
        self.entries
            .binary_search_by(|entry| entry.mangled.as_str().cmp(mangled))
            .ok()
            .map(|index| &self.entries[index])
    }

    /// Number of stubs per category, categories without stubs omitted.
    #[must_use]
    pub fn counts(&self) -> BTreeMap<StubCategory, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.category).or_insert(0) += 1;
        }
        counts
    }

    /// Number of stubs attributed to `category`.
    #[must_use]
    pub fn count(&self, category: StubCategory) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.category == category)
            .count()
    }

    /// Plain text report: a per-category summary followed by every method.
    #[must_use]
    pub fn report(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for StubAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stub analysis: {} method(s) without implementation", self.len())?;
        writeln!(f)?;
        writeln!(f, "By category ({} categories):", StubCategory::COUNT)?;
        for category in StubCategory::iter() {
            let count = self.count(category);
            if count > 0 {
                writeln!(f, "  {:<40}{count:>6}", category.to_string())?;
            }
        }

        if self.entries.is_empty() {
            return Ok(());
        }
        writeln!(f)?;
        writeln!(f, "Methods:")?;
        let mut line = String::new();
        for entry in &self.entries {
            line.clear();
            let _ = write!(line, "  [{}] {}", entry.category, entry.method);
            if !entry.detail.is_empty() {
                let _ = write!(line, " - {}", entry.detail);
            }
            writeln!(f, "{line}")?;
            writeln!(f, "      {}", entry.mangled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(mangled: &str, reason: &StubReason) -> StubEntry {
        StubEntry {
            mangled: mangled.to_string(),
            method: format!("System.Void App.X::{mangled}()"),
            category: StubCategory::of(reason),
            detail: reason.to_string(),
        }
    }

    #[test]
    fn categories() {
        assert_eq!(
            StubCategory::of(&StubReason::StaticAbstractDispatch { offset: 4 }),
            StubCategory::StaticAbstractDispatch
        );
        assert_eq!(
            StubCategory::of(&StubReason::GenericVirtualCall { offset: 0 }),
            StubCategory::GenericSpecialization
        );
        assert_eq!(
            StubCategory::of(&StubReason::NoBody),
            StubCategory::InternalCall
        );
        assert_eq!(
            StubCategory::of(&StubReason::StackMismatch { offset: 0 }),
            StubCategory::Unknown
        );
        assert_eq!(StubCategory::COUNT, 8);
    }

    #[test]
    fn entries_are_sorted_and_counted() {
        let diagnostics = StubDiagnostics::new();
        diagnostics.record(entry("b", &StubReason::InternalCall));
        diagnostics.record(entry("a", &StubReason::StaticAbstractDispatch { offset: 2 }));
        diagnostics.record(entry("c", &StubReason::InternalCall));
        diagnostics.record(entry("c", &StubReason::InternalCall));
        assert_eq!(diagnostics.len(), 3);

        let analysis = diagnostics.freeze();
        let names: Vec<&str> = analysis
            .entries()
            .iter()
            .map(|entry| entry.mangled.as_str())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(analysis.count(StubCategory::InternalCall), 2);
        assert_eq!(analysis.counts().len(), 2);
        assert_eq!(
            analysis.find("a").map(|entry| entry.category),
            Some(StubCategory::StaticAbstractDispatch)
        );

        let report = analysis.report();
        assert!(report.starts_with("Stub analysis: 3 method(s)"));
        assert!(report.contains("static abstract interface dispatch"));
        assert!(report.contains("[internal call] System.Void App.X::b() - internal call"));
    }
}
