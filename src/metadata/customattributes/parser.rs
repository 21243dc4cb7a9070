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
    metadata::{
        customattributes::{
            CustomAttributeArgument, CustomAttributeNamedArgument, CustomAttributeValue,
            SERIALIZATION_TYPE,
        },
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
    },
    Error::RecursionLimit,
    Result,
};

/// Maximum nesting of arrays and boxed values
const MAX_NESTING_DEPTH: usize = 50;

/// Answers the type questions a custom attribute blob cannot answer by itself.
///
/// Both lookups swallow resolution failures to `None`; an unresolvable parameter type is
/// treated as "not an enum".
pub trait EnumResolver {
    /// Full name (`Namespace.Name`, nested types as `Outer/Inner`) of a `TypeDefOrRef`
    /// token of the attribute's module.
    fn type_name(&self, token: Token) -> Option<String>;

    /// Underlying integer type of the enum called `full_name`, `None` if the type is not an
    /// enum or cannot be resolved.
    fn enum_underlying(&self, full_name: &str) -> Option<TypeSignature>;
}

/// Decodes one custom attribute blob against its constructor signature.
///
/// # Errors
/// Returns an error if the prolog is wrong or the blob is truncated inside an argument whose
/// shape is known.
pub fn parse_custom_attribute(
    data: &[u8],
    constructor: &SignatureMethod,
    resolver: &dyn EnumResolver,
) -> Result<CustomAttributeValue> {
    CustomAttributeParser::new(data, resolver).parse(constructor)
}

/// Stateful reader over one custom attribute blob.
pub struct CustomAttributeParser<'a, 'r> {
    parser: Parser<'a>,
    resolver: &'r dyn EnumResolver,
    depth: usize,
}

impl<'a, 'r> CustomAttributeParser<'a, 'r> {
    /// Creates a parser over `data`.
    #[must_use]
    pub fn new(data: &'a [u8], resolver: &'r dyn EnumResolver) -> Self {
        CustomAttributeParser {
            parser: Parser::new(data),
            resolver,
            depth: 0,
        }
    }

    /// Decodes the blob.
    ///
    /// # Errors
    /// Returns an error on a bad prolog or truncated data.
    pub fn parse(&mut self, constructor: &SignatureMethod) -> Result<CustomAttributeValue> {
        if self.parser.is_empty() {
            // An empty blob is valid for a parameterless constructor
            return Ok(CustomAttributeValue {
                fixed_args: Vec::new(),
                named_args: Vec::new(),
            });
        }

        let prolog = self.parser.read_le::<u16>()?;
        if prolog != 0x0001 {
            return Err(malformed_error!(
                "Invalid custom attribute prolog - expected 0x0001, got 0x{:04x}",
                prolog
            ));
        }

        let mut fixed_args = Vec::with_capacity(constructor.params.len());
        let mut poisoned = false;
        for param in &constructor.params {
            if poisoned {
                fixed_args.push(CustomAttributeArgument::Unsupported(
                    "follows an undecodable argument".to_string(),
                ));
                continue;
            }

            let argument = self.parse_fixed_argument(param)?;
            poisoned = argument.is_unsupported();
            fixed_args.push(argument);
        }

        let mut named_args = Vec::new();
        if !poisoned && self.parser.remaining() >= 2 {
            let count = self.parser.read_le::<u16>()?;
            for _ in 0..count {
                match self.parse_named_argument()? {
                    Some(argument) => {
                        let stop = argument.value.is_unsupported();
                        named_args.push(argument);
                        if stop {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }

        Ok(CustomAttributeValue {
            fixed_args,
            named_args,
        })
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(RecursionLimit(MAX_NESTING_DEPTH));
        }
        Ok(())
    }

    fn parse_fixed_argument(&mut self, param: &TypeSignature) -> Result<CustomAttributeArgument> {
        self.enter()?;
        let result = self.parse_fixed_argument_inner(param);
        self.depth -= 1;
        result
    }

    fn parse_fixed_argument_inner(
        &mut self,
        param: &TypeSignature,
    ) -> Result<CustomAttributeArgument> {
        let argument = match param {
            TypeSignature::Boolean => self.read_primitive(SERIALIZATION_TYPE::BOOLEAN)?,
            TypeSignature::Char => self.read_primitive(SERIALIZATION_TYPE::CHAR)?,
            TypeSignature::I1 => self.read_primitive(SERIALIZATION_TYPE::I1)?,
            TypeSignature::U1 => self.read_primitive(SERIALIZATION_TYPE::U1)?,
            TypeSignature::I2 => self.read_primitive(SERIALIZATION_TYPE::I2)?,
            TypeSignature::U2 => self.read_primitive(SERIALIZATION_TYPE::U2)?,
            TypeSignature::I4 => self.read_primitive(SERIALIZATION_TYPE::I4)?,
            TypeSignature::U4 => self.read_primitive(SERIALIZATION_TYPE::U4)?,
            TypeSignature::I8 => self.read_primitive(SERIALIZATION_TYPE::I8)?,
            TypeSignature::U8 => self.read_primitive(SERIALIZATION_TYPE::U8)?,
            TypeSignature::R4 => self.read_primitive(SERIALIZATION_TYPE::R4)?,
            TypeSignature::R8 => self.read_primitive(SERIALIZATION_TYPE::R8)?,
            TypeSignature::String => self.read_primitive(SERIALIZATION_TYPE::STRING)?,
            TypeSignature::Object => self.parse_tagged_object()?,
            TypeSignature::SzArray(element) => {
                let length = self.parser.read_le::<i32>()?;
                if length < -1 {
                    return Err(malformed_error!("Invalid array length: {}", length));
                }

                let mut elements = Vec::with_capacity(length.clamp(0, 1024) as usize);
                for _ in 0..length.max(0) {
                    let value = self.parse_fixed_argument(element)?;
                    if value.is_unsupported() {
                        return Ok(value);
                    }
                    elements.push(value);
                }
                CustomAttributeArgument::Array(elements)
            }
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                self.parse_named_type(*token)?
            }
            other => CustomAttributeArgument::Unsupported(format!("{other:?}")),
        };

        Ok(argument)
    }

    fn parse_named_type(&mut self, token: Token) -> Result<CustomAttributeArgument> {
        let Some(type_name) = self.resolver.type_name(token) else {
            return Ok(CustomAttributeArgument::Unsupported(format!(
                "unresolved parameter type {token}"
            )));
        };

        match type_name.as_str() {
            "System.Type" => self.read_primitive(SERIALIZATION_TYPE::TYPE),
            "System.String" => self.read_primitive(SERIALIZATION_TYPE::STRING),
            "System.Object" => self.parse_tagged_object(),
            _ => match self.resolver.enum_underlying(&type_name) {
                Some(underlying) => self.read_enum(type_name, &underlying),
                None => {
                    log::trace!("custom attribute parameter of type {type_name} is not decodable");
                    Ok(CustomAttributeArgument::Unsupported(type_name))
                }
            },
        }
    }

    fn read_enum(
        &mut self,
        type_name: String,
        underlying: &TypeSignature,
    ) -> Result<CustomAttributeArgument> {
        let tag = match underlying {
            TypeSignature::Boolean => SERIALIZATION_TYPE::BOOLEAN,
            TypeSignature::Char => SERIALIZATION_TYPE::CHAR,
            TypeSignature::I1 => SERIALIZATION_TYPE::I1,
            TypeSignature::U1 => SERIALIZATION_TYPE::U1,
            TypeSignature::I2 => SERIALIZATION_TYPE::I2,
            TypeSignature::U2 => SERIALIZATION_TYPE::U2,
            TypeSignature::I4 => SERIALIZATION_TYPE::I4,
            TypeSignature::U4 => SERIALIZATION_TYPE::U4,
            TypeSignature::I8 => SERIALIZATION_TYPE::I8,
            TypeSignature::U8 => SERIALIZATION_TYPE::U8,
            other => {
                return Ok(CustomAttributeArgument::Unsupported(format!(
                    "enum {type_name} with underlying type {other:?}"
                )))
            }
        };

        Ok(CustomAttributeArgument::Enum {
            type_name,
            value: Box::new(self.read_primitive(tag)?),
        })
    }

    fn parse_tagged_object(&mut self) -> Result<CustomAttributeArgument> {
        let tag = self.parser.read_le::<u8>()?;
        self.parse_tagged(tag)
    }

    /// Reads a value whose type is given by a serialization tag (named arguments and boxed
    /// values).
    fn parse_tagged(&mut self, tag: u8) -> Result<CustomAttributeArgument> {
        self.enter()?;
        let result = match tag {
            SERIALIZATION_TYPE::TAGGED_OBJECT => self.parse_tagged_object(),
            SERIALIZATION_TYPE::ENUM => {
                let type_name = self.parser.read_ser_string()?.unwrap_or_default();
                match self.resolver.enum_underlying(&type_name) {
                    Some(underlying) => self.read_enum(type_name, &underlying),
                    None => Ok(CustomAttributeArgument::Unsupported(type_name)),
                }
            }
            SERIALIZATION_TYPE::SZARRAY => {
                let element_tag = self.parser.read_le::<u8>()?;
                // an enum element type names the enum once, before the length
                let enum_name = if element_tag == SERIALIZATION_TYPE::ENUM {
                    self.parser.read_ser_string()?
                } else {
                    None
                };

                let length = self.parser.read_le::<i32>()?;
                if length < -1 {
                    return Err(malformed_error!("Invalid array length: {}", length));
                }

                let mut elements = Vec::with_capacity(length.clamp(0, 1024) as usize);
                for _ in 0..length.max(0) {
                    let value = match &enum_name {
                        Some(name) => match self.resolver.enum_underlying(name) {
                            Some(underlying) => self.read_enum(name.clone(), &underlying)?,
                            None => CustomAttributeArgument::Unsupported(name.clone()),
                        },
                        None => self.parse_tagged(element_tag)?,
                    };
                    if value.is_unsupported() {
                        self.depth -= 1;
                        return Ok(value);
                    }
                    elements.push(value);
                }
                Ok(CustomAttributeArgument::Array(elements))
            }
            _ => self.read_primitive(tag),
        };
        self.depth -= 1;
        result
    }

    fn read_primitive(&mut self, tag: u8) -> Result<CustomAttributeArgument> {
        Ok(match tag {
            SERIALIZATION_TYPE::BOOLEAN => {
                CustomAttributeArgument::Bool(self.parser.read_le::<u8>()? != 0)
            }
            SERIALIZATION_TYPE::CHAR => CustomAttributeArgument::Char(self.parser.read_le()?),
            SERIALIZATION_TYPE::I1 => CustomAttributeArgument::I1(self.parser.read_le()?),
            SERIALIZATION_TYPE::U1 => CustomAttributeArgument::U1(self.parser.read_le()?),
            SERIALIZATION_TYPE::I2 => CustomAttributeArgument::I2(self.parser.read_le()?),
            SERIALIZATION_TYPE::U2 => CustomAttributeArgument::U2(self.parser.read_le()?),
            SERIALIZATION_TYPE::I4 => CustomAttributeArgument::I4(self.parser.read_le()?),
            SERIALIZATION_TYPE::U4 => CustomAttributeArgument::U4(self.parser.read_le()?),
            SERIALIZATION_TYPE::I8 => CustomAttributeArgument::I8(self.parser.read_le()?),
            SERIALIZATION_TYPE::U8 => CustomAttributeArgument::U8(self.parser.read_le()?),
            SERIALIZATION_TYPE::R4 => CustomAttributeArgument::R4(self.parser.read_le()?),
            SERIALIZATION_TYPE::R8 => CustomAttributeArgument::R8(self.parser.read_le()?),
            SERIALIZATION_TYPE::STRING => {
                CustomAttributeArgument::String(self.parser.read_ser_string()?.unwrap_or_default())
            }
            SERIALIZATION_TYPE::TYPE => {
                CustomAttributeArgument::Type(self.parser.read_ser_string()?.unwrap_or_default())
            }
            other => CustomAttributeArgument::Unsupported(format!("serialization tag 0x{other:02x}")),
        })
    }

    fn parse_named_argument(&mut self) -> Result<Option<CustomAttributeNamedArgument>> {
        if !self.parser.has_more_data() {
            return Ok(None);
        }

        let is_field = match self.parser.read_le::<u8>()? {
            SERIALIZATION_TYPE::FIELD => true,
            SERIALIZATION_TYPE::PROPERTY => false,
            other => {
                return Err(malformed_error!(
                    "Invalid field/property indicator: 0x{:02X}",
                    other
                ))
            }
        };

        let tag = self.parser.read_le::<u8>()?;
        // the type of an enum-typed named argument precedes its name
        let enum_name = if tag == SERIALIZATION_TYPE::ENUM {
            self.parser.read_ser_string()?
        } else {
            None
        };
        let name = self.parser.read_ser_string()?.unwrap_or_default();

        let value = match enum_name {
            Some(type_name) => match self.resolver.enum_underlying(&type_name) {
                Some(underlying) => self.read_enum(type_name, &underlying)?,
                None => CustomAttributeArgument::Unsupported(type_name),
            },
            None => self.parse_tagged(tag)?,
        };

        Ok(Some(CustomAttributeNamedArgument {
            is_field,
            name,
            value,
        }))
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::*;

    struct Types {
        names: FxHashMap<u32, &'static str>,
        enums: FxHashMap<&'static str, TypeSignature>,
    }

    impl EnumResolver for Types {
        fn type_name(&self, token: Token) -> Option<String> {
            self.names.get(&token.value()).map(|name| (*name).to_string())
        }

        fn enum_underlying(&self, full_name: &str) -> Option<TypeSignature> {
            self.enums.get(full_name).cloned()
        }
    }

    fn types() -> Types {
        let mut names = FxHashMap::default();
        names.insert(0x0100_0001, "System.Type");
        names.insert(0x0100_0002, "Demo.Color");
        names.insert(0x0100_0003, "Demo.Opaque");
        let mut enums = FxHashMap::default();
        enums.insert("Demo.Color", TypeSignature::U1);
        Types { names, enums }
    }

    fn ctor(params: Vec<TypeSignature>) -> SignatureMethod {
        SignatureMethod {
            has_this: true,
            params,
            ..SignatureMethod::default()
        }
    }

    #[test]
    fn fixed_arguments_of_each_kind() {
        #[rustfmt::skip]
        let blob = [
            0x01, 0x00,
            0x2A, 0x00, 0x00, 0x00,                     // 42
            0x05, b'h', b'e', b'l', b'l', b'o',          // "hello"
            0x02,                                       // Color (u1) 2
            0x0C, b'D', b'e', b'm', b'o', b'.', b'O', b't', b'h', b'e', b'r', b',', b'X',
            0x00, 0x00,
        ];
        let constructor = ctor(vec![
            TypeSignature::I4,
            TypeSignature::String,
            TypeSignature::ValueType(Token::new(0x0100_0002)),
            TypeSignature::Class(Token::new(0x0100_0001)),
        ]);

        let value = parse_custom_attribute(&blob, &constructor, &types()).unwrap();
        assert_eq!(
            value.fixed_args,
            vec![
                CustomAttributeArgument::I4(42),
                CustomAttributeArgument::String("hello".to_string()),
                CustomAttributeArgument::Enum {
                    type_name: "Demo.Color".to_string(),
                    value: Box::new(CustomAttributeArgument::U1(2)),
                },
                CustomAttributeArgument::Type("Demo.Other,X".to_string()),
            ]
        );
        assert!(value.named_args.is_empty());
    }

    #[test]
    fn undecodable_argument_poisons_the_rest() {
        let blob = [0x01, 0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0x00];
        let constructor = ctor(vec![
            TypeSignature::I4,
            TypeSignature::ValueType(Token::new(0x0100_0003)),
            TypeSignature::I2,
        ]);

        let value = parse_custom_attribute(&blob, &constructor, &types()).unwrap();
        assert_eq!(value.fixed_args[0], CustomAttributeArgument::I4(7));
        assert!(value.fixed_args[1].is_unsupported());
        assert!(value.fixed_args[2].is_unsupported());
    }

    #[test]
    fn arrays_and_boxed_values() {
        #[rustfmt::skip]
        let blob = [
            0x01, 0x00,
            0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00,   // short[] { 1, 2 }
            0xFF, 0xFF, 0xFF, 0xFF,                           // null int[]
            0x51, 0x08, 0x05, 0x00, 0x00, 0x00,               // (object)5
            0x00, 0x00,
        ];
        let constructor = ctor(vec![
            TypeSignature::SzArray(Box::new(TypeSignature::I2)),
            TypeSignature::SzArray(Box::new(TypeSignature::I4)),
            TypeSignature::Object,
        ]);

        let value = parse_custom_attribute(&blob, &constructor, &types()).unwrap();
        assert_eq!(
            value.fixed_args[0],
            CustomAttributeArgument::Array(vec![
                CustomAttributeArgument::I2(1),
                CustomAttributeArgument::I2(2)
            ])
        );
        assert_eq!(value.fixed_args[1], CustomAttributeArgument::Array(vec![]));
        assert_eq!(value.fixed_args[2], CustomAttributeArgument::I4(5));
    }

    #[test]
    fn named_arguments() {
        #[rustfmt::skip]
        let blob = [
            0x01, 0x00,
            0x02, 0x00,
            0x54, 0x02, 0x07, b'E', b'n', b'a', b'b', b'l', b'e', b'd', 0x01,
            0x53, 0x55, 0x0A, b'D', b'e', b'm', b'o', b'.', b'C', b'o', b'l', b'o', b'r',
            0x04, b'T', b'i', b'n', b't', 0x03,
        ];

        let value = parse_custom_attribute(&blob, &ctor(vec![]), &types()).unwrap();
        assert_eq!(value.named_args.len(), 2);
        assert!(!value.named_args[0].is_field);
        assert_eq!(value.named_args[0].name, "Enabled");
        assert_eq!(value.named_args[0].value, CustomAttributeArgument::Bool(true));
        assert!(value.named_args[1].is_field);
        assert_eq!(
            value.named_args[1].value,
            CustomAttributeArgument::Enum {
                type_name: "Demo.Color".to_string(),
                value: Box::new(CustomAttributeArgument::U1(3)),
            }
        );
    }

    #[test]
    fn prolog_and_truncation() {
        let constructor = ctor(vec![TypeSignature::I4]);
        assert!(parse_custom_attribute(&[0x02, 0x00], &constructor, &types()).is_err());
        assert!(parse_custom_attribute(&[0x01, 0x00, 0x01], &constructor, &types()).is_err());
        let empty = parse_custom_attribute(&[], &ctor(vec![]), &types()).unwrap();
        assert!(empty.fixed_args.is_empty());
    }
}
