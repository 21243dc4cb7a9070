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

//! Custom attribute blobs (ECMA-335 II.23.3).
//!
//! A blob starts with the prolog `0x0001`, followed by the constructor's fixed arguments in
//! parameter order and a count-prefixed list of named field/property arguments. Fixed
//! arguments carry no type tags, so decoding is driven by the constructor signature; enum
//! parameters are recognized through an [`EnumResolver`].
//!
//! An argument that cannot be decoded is reported as
//! [`CustomAttributeArgument::Unsupported`]. Its width is unknown, so every argument after it
//! is reported as unsupported as well and named arguments are skipped.

mod encoder;
mod parser;
mod types;

pub use encoder::CustomAttributeEncoder;
pub use parser::{parse_custom_attribute, CustomAttributeParser, EnumResolver};
pub use types::*;
