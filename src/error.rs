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

//! Error types for the whole compilation pipeline.
//!
//! Every stage reports failures through [`Error`]. The variants follow the three failure
//! classes of the compiler:
//!
//! - **Input errors** - malformed PE files, metadata or bytecode ([`Error::Malformed`],
//!   [`Error::OutOfBounds`], ...)
//! - **Fatal pipeline errors** - a module that cannot be located ([`Error::ModuleNotFound`]),
//!   a reference that cannot be resolved while building shells ([`Error::UnresolvedReference`]),
//!   or a mangled name collision ([`Error::NameCollision`])
//! - **Configuration errors** - contradictory loader or build options
//!
//! Degraded output (stubs, dropped attribute arguments) is never reported through this type;
//! those conditions are collected as diagnostics instead.
//!
//! The [`malformed_error!`] and [`out_of_bounds_error!`] macros capture the source location
//! where a parsing problem was detected, which makes tracking down bad input much easier.

use thiserror::Error;

use crate::metadata::token::Token;

/// Creates a [`crate::Error::Malformed`] carrying the current source location.
///
/// Accepts either a single message expression or a format string with arguments.
macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Creates a [`crate::Error::OutOfBounds`] carrying the current source location.
macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic error type for everything the compiler can report.
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged or does not follow ECMA-335.
    ///
    /// Carries the location in this crate where the problem was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// Description of the problem
        message: String,
        /// Source file that raised the error
        file: &'static str,
        /// Source line that raised the error
        line: u32,
    },

    /// A read would have gone past the end of the available data.
    #[error("Out of bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// Source file that raised the error
        file: &'static str,
        /// Source line that raised the error
        line: u32,
    },

    /// This file type or construct is not supported.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O failed.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error with a message.
    #[error("{0}")]
    Error(String),

    /// The PE parser rejected the input.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Recursion limit hit while parsing nested structures (signatures, forwarders).
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// A module referenced by the program could not be located in any search location.
    ///
    /// This is fatal: the whole compilation aborts before producing output.
    #[error("Module '{name}' could not be located (searched: {searched:?})")]
    ModuleNotFound {
        /// Simple name of the missing module
        name: String,
        /// Every path that was probed
        searched: Vec<String>,
    },

    /// A type, method or field reference could not be resolved to its definition.
    #[error("Unresolved reference - {0}")]
    UnresolvedReference(String),

    /// A token does not point at a row of the expected table.
    #[error("Invalid token for this context - {0}")]
    InvalidToken(Token),

    /// Two different members mangled to the same native identifier.
    ///
    /// Mangling is injective by construction, so this signals an internal invariant violation.
    #[error("Mangled name collision on '{mangled}' between '{first}' and '{second}'")]
    NameCollision {
        /// The colliding native identifier
        mangled: String,
        /// Original name of the first member
        first: String,
        /// Original name of the second member
        second: String,
    },

    /// Contradictory or invalid configuration.
    #[error("Invalid configuration - {0}")]
    Configuration(String),
}
