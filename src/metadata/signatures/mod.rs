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

//! Method and type signature parsing (ECMA-335 II.23.2).
//!
//! Signatures are stored in the `#Blob` heap and describe the types of fields, locals,
//! method parameters and generic instantiations. Types referenced from a signature are kept
//! as module-relative tokens; [`crate::model`] resolves them across modules.
//!
//! ```rust
//! use dotnative::metadata::signatures::{parse_method_signature, TypeSignature};
//!
//! // instance string (int32)
//! let sig = parse_method_signature(&[0x20, 0x01, 0x0E, 0x08])?;
//! assert!(sig.has_this);
//! assert_eq!(sig.return_type, TypeSignature::String);
//! assert_eq!(sig.params, vec![TypeSignature::I4]);
//! # Ok::<(), dotnative::Error>(())
//! ```

mod encoder;
mod parser;
mod types;

pub use encoder::SignatureEncoder;
pub use parser::SignatureParser;
pub use types::*;

use crate::Result;

/// Element type constants used in signatures (ECMA-335 II.23.1.16).
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1b;
    pub const OBJECT: u8 = 0x1c;
    pub const SZARRAY: u8 = 0x1d;
    pub const MVAR: u8 = 0x1e;
    pub const CMOD_REQD: u8 = 0x1f;
    pub const CMOD_OPT: u8 = 0x20;
    pub const INTERNAL: u8 = 0x21;
    pub const MODIFIER: u8 = 0x40;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

/// Parse a `MethodDefSig`, `MethodRefSig` or `StandAloneMethodSig`.
///
/// # Errors
/// Returns an error if the signature data is malformed.
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Parse a `FieldSig`.
///
/// # Errors
/// Returns an error if the signature data is malformed.
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Parse a `LocalVarSig`.
///
/// # Errors
/// Returns an error if the signature data is malformed.
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    SignatureParser::new(data).parse_local_var_signature()
}

/// Parse a `TypeSpec` blob.
///
/// # Errors
/// Returns an error if the signature data is malformed.
pub fn parse_type_spec_signature(data: &[u8]) -> Result<TypeSignature> {
    SignatureParser::new(data).parse_type_spec_signature()
}

/// Parse a `MethodSpec` instantiation blob.
///
/// # Errors
/// Returns an error if the signature data is malformed.
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    SignatureParser::new(data).parse_method_spec_signature()
}
