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

use crate::{
    file::io::{write_compressed_int, write_compressed_uint},
    metadata::{
        signatures::{
            CallingConvention, SignatureLocalVariables, SignatureMethod, TypeSignature,
            ELEMENT_TYPE,
        },
        tables::CodedIndexType,
        token::Token,
    },
    Result,
};

/// Writes signature blobs, the inverse of [`crate::metadata::signatures::SignatureParser`].
///
/// Used by the in-memory module builder.
#[derive(Default)]
pub struct SignatureEncoder {
    buffer: Vec<u8>,
}

impl SignatureEncoder {
    /// Encodes a method signature.
    ///
    /// # Errors
    /// Returns an error if a type token cannot be encoded.
    pub fn method(signature: &SignatureMethod) -> Result<Vec<u8>> {
        let mut encoder = SignatureEncoder::default();
        let mut head = match signature.calling_convention {
            CallingConvention::Default => 0x00,
            CallingConvention::C => 0x01,
            CallingConvention::StdCall => 0x02,
            CallingConvention::ThisCall => 0x03,
            CallingConvention::FastCall => 0x04,
            CallingConvention::VarArg => 0x05,
        };
        if signature.has_this {
            head |= 0x20;
        }
        if signature.explicit_this {
            head |= 0x40;
        }
        if signature.generic_param_count > 0 {
            head |= 0x10;
        }

        encoder.buffer.push(head);
        if signature.generic_param_count > 0 {
            write_compressed_uint(&mut encoder.buffer, signature.generic_param_count)?;
        }

        let count = signature.params.len() + signature.varargs.len();
        write_compressed_uint(&mut encoder.buffer, count as u32)?;
        encoder.write_type(&signature.return_type)?;
        for param in &signature.params {
            encoder.write_type(param)?;
        }
        if !signature.varargs.is_empty() {
            encoder.buffer.push(ELEMENT_TYPE::SENTINEL);
            for param in &signature.varargs {
                encoder.write_type(param)?;
            }
        }

        Ok(encoder.buffer)
    }

    /// Encodes a field signature.
    ///
    /// # Errors
    /// Returns an error if a type token cannot be encoded.
    pub fn field(base: &TypeSignature) -> Result<Vec<u8>> {
        let mut encoder = SignatureEncoder::default();
        encoder.buffer.push(0x06);
        encoder.write_type(base)?;
        Ok(encoder.buffer)
    }

    /// Encodes a local variable signature.
    ///
    /// # Errors
    /// Returns an error if a type token cannot be encoded.
    pub fn locals(signature: &SignatureLocalVariables) -> Result<Vec<u8>> {
        let mut encoder = SignatureEncoder::default();
        encoder.buffer.push(0x07);
        write_compressed_uint(&mut encoder.buffer, signature.locals.len() as u32)?;
        for local in &signature.locals {
            if local.is_pinned {
                encoder.buffer.push(ELEMENT_TYPE::PINNED);
            }
            encoder.write_type(&local.base)?;
        }
        Ok(encoder.buffer)
    }

    /// Encodes a type specification blob.
    ///
    /// # Errors
    /// Returns an error if a type token cannot be encoded.
    pub fn type_spec(base: &TypeSignature) -> Result<Vec<u8>> {
        let mut encoder = SignatureEncoder::default();
        encoder.write_type(base)?;
        Ok(encoder.buffer)
    }

    /// Encodes a method instantiation blob.
    ///
    /// # Errors
    /// Returns an error if a type token cannot be encoded.
    pub fn method_spec(generic_args: &[TypeSignature]) -> Result<Vec<u8>> {
        let mut encoder = SignatureEncoder::default();
        encoder.buffer.push(0x0A);
        write_compressed_uint(&mut encoder.buffer, generic_args.len() as u32)?;
        for arg in generic_args {
            encoder.write_type(arg)?;
        }
        Ok(encoder.buffer)
    }

    fn write_token(&mut self, token: Token) -> Result<()> {
        let coded = CodedIndexType::TypeDefOrRef.encode(token)?;
        write_compressed_uint(&mut self.buffer, coded)
    }

    fn write_type(&mut self, signature: &TypeSignature) -> Result<()> {
        let element = match signature {
            TypeSignature::Void => ELEMENT_TYPE::VOID,
            TypeSignature::Boolean => ELEMENT_TYPE::BOOLEAN,
            TypeSignature::Char => ELEMENT_TYPE::CHAR,
            TypeSignature::I1 => ELEMENT_TYPE::I1,
            TypeSignature::U1 => ELEMENT_TYPE::U1,
            TypeSignature::I2 => ELEMENT_TYPE::I2,
            TypeSignature::U2 => ELEMENT_TYPE::U2,
            TypeSignature::I4 => ELEMENT_TYPE::I4,
            TypeSignature::U4 => ELEMENT_TYPE::U4,
            TypeSignature::I8 => ELEMENT_TYPE::I8,
            TypeSignature::U8 => ELEMENT_TYPE::U8,
            TypeSignature::R4 => ELEMENT_TYPE::R4,
            TypeSignature::R8 => ELEMENT_TYPE::R8,
            TypeSignature::I => ELEMENT_TYPE::I,
            TypeSignature::U => ELEMENT_TYPE::U,
            TypeSignature::String => ELEMENT_TYPE::STRING,
            TypeSignature::Object => ELEMENT_TYPE::OBJECT,
            TypeSignature::TypedByRef => ELEMENT_TYPE::TYPEDBYREF,
            TypeSignature::Ptr(inner) => return self.write_wrapped(ELEMENT_TYPE::PTR, inner),
            TypeSignature::ByRef(inner) => return self.write_wrapped(ELEMENT_TYPE::BYREF, inner),
            TypeSignature::Pinned(inner) => {
                return self.write_wrapped(ELEMENT_TYPE::PINNED, inner)
            }
            TypeSignature::SzArray(inner) => {
                return self.write_wrapped(ELEMENT_TYPE::SZARRAY, inner)
            }
            TypeSignature::ValueType(token) => {
                self.buffer.push(ELEMENT_TYPE::VALUETYPE);
                return self.write_token(*token);
            }
            TypeSignature::Class(token) => {
                self.buffer.push(ELEMENT_TYPE::CLASS);
                return self.write_token(*token);
            }
            TypeSignature::GenericParamType(index) => {
                self.buffer.push(ELEMENT_TYPE::VAR);
                return write_compressed_uint(&mut self.buffer, *index);
            }
            TypeSignature::GenericParamMethod(index) => {
                self.buffer.push(ELEMENT_TYPE::MVAR);
                return write_compressed_uint(&mut self.buffer, *index);
            }
            TypeSignature::Array(array) => {
                self.buffer.push(ELEMENT_TYPE::ARRAY);
                self.write_type(&array.base)?;
                write_compressed_uint(&mut self.buffer, array.rank)?;
                write_compressed_uint(&mut self.buffer, array.sizes.len() as u32)?;
                for size in &array.sizes {
                    write_compressed_uint(&mut self.buffer, *size)?;
                }
                write_compressed_uint(&mut self.buffer, array.lower_bounds.len() as u32)?;
                for bound in &array.lower_bounds {
                    write_compressed_int(&mut self.buffer, *bound)?;
                }
                return Ok(());
            }
            TypeSignature::GenericInst(base, args) => {
                self.buffer.push(ELEMENT_TYPE::GENERICINST);
                self.write_type(base)?;
                write_compressed_uint(&mut self.buffer, args.len() as u32)?;
                for arg in args {
                    self.write_type(arg)?;
                }
                return Ok(());
            }
            TypeSignature::FnPtr(method) => {
                self.buffer.push(ELEMENT_TYPE::FNPTR);
                let encoded = SignatureEncoder::method(method)?;
                self.buffer.extend_from_slice(&encoded);
                return Ok(());
            }
        };

        self.buffer.push(element);
        Ok(())
    }

    fn write_wrapped(&mut self, element: u8, inner: &TypeSignature) -> Result<()> {
        self.buffer.push(element);
        self.write_type(inner)
    }
}
