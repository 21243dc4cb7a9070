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
    file::parser::Parser,
    metadata::signatures::{
        CallingConvention, SignatureArray, SignatureField, SignatureLocalVariable,
        SignatureLocalVariables, SignatureMethod, SignatureMethodSpec, TypeSignature,
        ELEMENT_TYPE,
    },
    Error::RecursionLimit,
    Result,
};

/// Maximum nesting depth of a single type in a signature
const MAX_RECURSION_DEPTH: usize = 50;

/// Signature parser for all signature kinds of ECMA-335.
///
/// A parser instance reads exactly one signature; create a new one per blob.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a new `SignatureParser` over a blob.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    fn parse_type(&mut self) -> Result<TypeSignature> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let result = self.parse_type_inner();
        self.depth -= 1;
        result
    }

    fn parse_type_inner(&mut self) -> Result<TypeSignature> {
        self.skip_custom_mods()?;

        let current_byte = self.parser.read_le::<u8>()?;
        match current_byte {
            ELEMENT_TYPE::VOID => Ok(TypeSignature::Void),
            ELEMENT_TYPE::BOOLEAN => Ok(TypeSignature::Boolean),
            ELEMENT_TYPE::CHAR => Ok(TypeSignature::Char),
            ELEMENT_TYPE::I1 => Ok(TypeSignature::I1),
            ELEMENT_TYPE::U1 => Ok(TypeSignature::U1),
            ELEMENT_TYPE::I2 => Ok(TypeSignature::I2),
            ELEMENT_TYPE::U2 => Ok(TypeSignature::U2),
            ELEMENT_TYPE::I4 => Ok(TypeSignature::I4),
            ELEMENT_TYPE::U4 => Ok(TypeSignature::U4),
            ELEMENT_TYPE::I8 => Ok(TypeSignature::I8),
            ELEMENT_TYPE::U8 => Ok(TypeSignature::U8),
            ELEMENT_TYPE::R4 => Ok(TypeSignature::R4),
            ELEMENT_TYPE::R8 => Ok(TypeSignature::R8),
            ELEMENT_TYPE::I => Ok(TypeSignature::I),
            ELEMENT_TYPE::U => Ok(TypeSignature::U),
            ELEMENT_TYPE::STRING => Ok(TypeSignature::String),
            ELEMENT_TYPE::OBJECT => Ok(TypeSignature::Object),
            ELEMENT_TYPE::TYPEDBYREF => Ok(TypeSignature::TypedByRef),
            ELEMENT_TYPE::PTR => Ok(TypeSignature::Ptr(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::BYREF => Ok(TypeSignature::ByRef(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::PINNED => Ok(TypeSignature::Pinned(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::VALUETYPE => Ok(TypeSignature::ValueType(
                self.parser.read_compressed_token()?,
            )),
            ELEMENT_TYPE::CLASS => Ok(TypeSignature::Class(self.parser.read_compressed_token()?)),
            ELEMENT_TYPE::VAR => Ok(TypeSignature::GenericParamType(
                self.parser.read_compressed_uint()?,
            )),
            ELEMENT_TYPE::MVAR => Ok(TypeSignature::GenericParamMethod(
                self.parser.read_compressed_uint()?,
            )),
            ELEMENT_TYPE::SZARRAY => Ok(TypeSignature::SzArray(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::ARRAY => {
                let base = self.parse_type()?;
                let rank = self.parser.read_compressed_uint()?;

                let num_sizes = self.parser.read_compressed_uint()?;
                let mut sizes = Vec::with_capacity(num_sizes.min(32) as usize);
                for _ in 0..num_sizes {
                    sizes.push(self.parser.read_compressed_uint()?);
                }

                let num_lo_bounds = self.parser.read_compressed_uint()?;
                let mut lower_bounds = Vec::with_capacity(num_lo_bounds.min(32) as usize);
                for _ in 0..num_lo_bounds {
                    lower_bounds.push(self.parser.read_compressed_int()?);
                }

                Ok(TypeSignature::Array(SignatureArray {
                    base: Box::new(base),
                    rank,
                    sizes,
                    lower_bounds,
                }))
            }
            ELEMENT_TYPE::GENERICINST => {
                let peek_byte = self.parser.peek_byte()?;
                if peek_byte != ELEMENT_TYPE::CLASS && peek_byte != ELEMENT_TYPE::VALUETYPE {
                    return Err(malformed_error!(
                        "GENERICINST - Next byte is not TYPE_CLASS or TYPE_VALUE - {}",
                        peek_byte
                    ));
                }

                let base_type = self.parse_type()?;
                let arg_count = self.parser.read_compressed_uint()?;

                let mut type_args = Vec::with_capacity(arg_count.min(32) as usize);
                for _ in 0..arg_count {
                    type_args.push(self.parse_type()?);
                }

                Ok(TypeSignature::GenericInst(Box::new(base_type), type_args))
            }
            ELEMENT_TYPE::FNPTR => Ok(TypeSignature::FnPtr(Box::new(
                self.parse_method_signature()?,
            ))),
            _ => Err(malformed_error!(
                "Unsupported ELEMENT_TYPE - {}",
                current_byte
            )),
        }
    }

    fn skip_custom_mods(&mut self) -> Result<()> {
        while self.parser.has_more_data() {
            let next_byte = self.parser.peek_byte()?;
            if next_byte != ELEMENT_TYPE::CMOD_OPT && next_byte != ELEMENT_TYPE::CMOD_REQD {
                break;
            }

            self.parser.advance()?;
            self.parser.read_compressed_token()?;
        }

        Ok(())
    }

    /// Parse a method signature - `MethodDefSig`, `MethodRefSig`, `StandAloneMethodSig`.
    ///
    /// # Errors
    /// Returns an error if the signature data is malformed or truncated.
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        let convention_byte = self.parser.read_le::<u8>()?;
        let calling_convention = match convention_byte & 0x0F {
            0x0 => CallingConvention::Default,
            0x1 => CallingConvention::C,
            0x2 => CallingConvention::StdCall,
            0x3 => CallingConvention::ThisCall,
            0x4 => CallingConvention::FastCall,
            0x5 => CallingConvention::VarArg,
            other => {
                return Err(malformed_error!(
                    "Invalid calling convention in method signature - {}",
                    other
                ))
            }
        };

        let generic_param_count = if convention_byte & 0x10 != 0 {
            self.parser.read_compressed_uint()?
        } else {
            0
        };
        let param_count = self.parser.read_compressed_uint()?;

        let mut method = SignatureMethod {
            has_this: convention_byte & 0x20 != 0,
            explicit_this: convention_byte & 0x40 != 0,
            calling_convention,
            generic_param_count,
            return_type: self.parse_type()?,
            params: Vec::with_capacity(param_count.min(64) as usize),
            varargs: Vec::new(),
        };

        let mut after_sentinel = false;
        for _ in 0..param_count {
            if self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                self.parser.advance()?;
                after_sentinel = true;
            }

            let param = self.parse_type()?;
            if after_sentinel {
                method.varargs.push(param);
            } else {
                method.params.push(param);
            }
        }

        Ok(method)
    }

    /// Parse a field signature (II.23.2.4).
    ///
    /// # Errors
    /// Returns an error if the header is not `FIELD` or the type cannot be parsed.
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != 0x06 {
            return Err(malformed_error!(
                "SignatureField - invalid start - {}",
                head_byte
            ));
        }

        Ok(SignatureField {
            base: self.parse_type()?,
        })
    }

    /// Parse a local variable signature (II.23.2.6).
    ///
    /// # Errors
    /// Returns an error if the header is not `LOCAL_SIG` or a local cannot be parsed.
    pub fn parse_local_var_signature(&mut self) -> Result<SignatureLocalVariables> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != 0x07 {
            return Err(malformed_error!(
                "SignatureLocalVar - invalid start - {}",
                head_byte
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            // custom modifiers and the PINNED constraint may be interleaved
            let mut is_pinned = false;
            while self.parser.has_more_data() {
                match self.parser.peek_byte()? {
                    ELEMENT_TYPE::CMOD_OPT | ELEMENT_TYPE::CMOD_REQD => {
                        self.parser.advance()?;
                        self.parser.read_compressed_token()?;
                    }
                    ELEMENT_TYPE::PINNED => {
                        self.parser.advance()?;
                        is_pinned = true;
                    }
                    _ => break,
                }
            }

            locals.push(SignatureLocalVariable {
                is_pinned,
                base: self.parse_type()?,
            });
        }

        Ok(SignatureLocalVariables { locals })
    }

    /// Parse a type specification blob (II.23.2.14).
    ///
    /// # Errors
    /// Returns an error if the type cannot be parsed.
    pub fn parse_type_spec_signature(&mut self) -> Result<TypeSignature> {
        self.parse_type()
    }

    /// Parse a method instantiation blob (II.23.2.15).
    ///
    /// # Errors
    /// Returns an error if the header is not `GENERICINST` or an argument cannot be parsed.
    pub fn parse_method_spec_signature(&mut self) -> Result<SignatureMethodSpec> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != 0x0A {
            return Err(malformed_error!(
                "SignatureMethodSpec - invalid start - {}",
                head_byte
            ));
        }

        let arg_count = self.parser.read_compressed_uint()?;
        let mut generic_args = Vec::with_capacity(arg_count.min(32) as usize);
        for _ in 0..arg_count {
            generic_args.push(self.parse_type()?);
        }

        Ok(SignatureMethodSpec { generic_args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    #[test]
    fn primitive_types() {
        let test_cases = [
            (vec![0x01], TypeSignature::Void),
            (vec![0x02], TypeSignature::Boolean),
            (vec![0x03], TypeSignature::Char),
            (vec![0x08], TypeSignature::I4),
            (vec![0x0B], TypeSignature::U8),
            (vec![0x0D], TypeSignature::R8),
            (vec![0x0E], TypeSignature::String),
            (vec![0x18], TypeSignature::I),
            (vec![0x1C], TypeSignature::Object),
        ];

        for (input, expected) in test_cases {
            let mut parser = SignatureParser::new(&input);
            assert_eq!(parser.parse_type_spec_signature().unwrap(), expected);
        }
    }

    #[test]
    fn class_and_generic_instance() {
        // List<int32> where List is TypeRef row 0x12
        let data = [0x15, 0x12, 0x49, 0x01, 0x08];
        let mut parser = SignatureParser::new(&data);
        let sig = parser.parse_type_spec_signature().unwrap();
        assert_eq!(
            sig,
            TypeSignature::GenericInst(
                Box::new(TypeSignature::Class(Token::new(0x0100_0012))),
                vec![TypeSignature::I4],
            )
        );
        assert!(!sig.is_open());

        let open = TypeSignature::SzArray(Box::new(TypeSignature::GenericParamMethod(0)));
        assert!(open.is_open());
    }

    #[test]
    fn method_signature() {
        // instance void (int32&, string)
        let data = [0x20, 0x02, 0x01, 0x10, 0x08, 0x0E];
        let sig = parse_method(&data);
        assert!(sig.has_this);
        assert_eq!(sig.return_type, TypeSignature::Void);
        assert_eq!(
            sig.params,
            vec![
                TypeSignature::ByRef(Box::new(TypeSignature::I4)),
                TypeSignature::String
            ]
        );

        // generic static !!0 (!!0) with one method parameter
        let data = [0x10, 0x01, 0x01, 0x1E, 0x00, 0x1E, 0x00];
        let sig = parse_method(&data);
        assert_eq!(sig.generic_param_count, 1);
        assert_eq!(sig.return_type, TypeSignature::GenericParamMethod(0));
    }

    #[test]
    fn vararg_sentinel() {
        // vararg void (int32, ..., string)
        let data = [0x05, 0x02, 0x01, 0x08, 0x41, 0x0E];
        let sig = parse_method(&data);
        assert_eq!(sig.calling_convention, CallingConvention::VarArg);
        assert_eq!(sig.params, vec![TypeSignature::I4]);
        assert_eq!(sig.varargs, vec![TypeSignature::String]);
    }

    #[test]
    fn modifiers_are_skipped() {
        // modreq(TypeRef 1) int32
        let data = [0x06, 0x1F, 0x05, 0x08];
        let field = SignatureParser::new(&data).parse_field_signature().unwrap();
        assert_eq!(field.base, TypeSignature::I4);
    }

    #[test]
    fn locals() {
        let data = [0x07, 0x02, 0x45, 0x10, 0x08, 0x0E];
        let locals = SignatureParser::new(&data)
            .parse_local_var_signature()
            .unwrap();
        assert!(locals.locals[0].is_pinned);
        assert_eq!(
            locals.locals[0].base,
            TypeSignature::ByRef(Box::new(TypeSignature::I4))
        );
        assert_eq!(locals.locals[1].base, TypeSignature::String);
    }

    #[test]
    fn recursion_limit() {
        let data = vec![0x1D; 100];
        let result = SignatureParser::new(&data).parse_type_spec_signature();
        assert!(matches!(result, Err(RecursionLimit(_))));
    }

    #[test]
    fn wrong_headers() {
        assert!(SignatureParser::new(&[0x07, 0x08])
            .parse_field_signature()
            .is_err());
        assert!(SignatureParser::new(&[0x06, 0x00])
            .parse_method_spec_signature()
            .is_err());
    }

    fn parse_method(data: &[u8]) -> SignatureMethod {
        SignatureParser::new(data).parse_method_signature().unwrap()
    }
}
