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

//! ECMA-335 metadata reading.
//!
//! Everything below this module works on borrowed bytes and knows nothing about other
//! modules. Cross-module resolution and the owned object model live in [`crate::model`].
//!
//! # Key Components
//!
//! - [`cor20header`] - the CLI header of a PE image
//! - [`root`] / [`streams`] / [`image`] - the metadata root, its heaps and a combined view
//! - [`tables`] - schema-driven reading of every metadata table
//! - [`signatures`] - method, field, local and type specification signatures
//! - [`method`] - method body headers and exception clauses
//! - [`customattributes`] - custom attribute blob decoding
//! - [`sequencepoints`] / [`pdb`] - Portable PDB debug information

pub mod cor20header;
pub mod customattributes;
pub mod flags;
pub mod image;
pub mod method;
pub mod pdb;
pub mod root;
pub mod sequencepoints;
pub mod signatures;
pub mod streams;
pub mod tables;
pub mod token;
