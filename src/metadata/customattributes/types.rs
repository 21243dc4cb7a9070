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

use std::fmt;

/// A decoded custom attribute blob.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeValue {
    /// Constructor arguments in parameter order
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Field and property assignments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

/// One argument value.
///
/// Null strings, types and arrays decode to empty values.
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Bool(bool),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 8-bit integer
    I1(i8),
    /// Unsigned 8-bit integer
    U1(u8),
    /// Signed 16-bit integer
    I2(i16),
    /// Unsigned 16-bit integer
    U2(u16),
    /// Signed 32-bit integer
    I4(i32),
    /// Unsigned 32-bit integer
    U4(u32),
    /// Signed 64-bit integer
    I8(i64),
    /// Unsigned 64-bit integer
    U8(u64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// String
    String(String),
    /// `System.Type`, stored as a serialized type name
    Type(String),
    /// Enum value with the enum's full name and the underlying integer
    Enum {
        /// Full name of the enum type
        type_name: String,
        /// Underlying value
        value: Box<CustomAttributeArgument>,
    },
    /// Single-dimensional array
    Array(Vec<CustomAttributeArgument>),
    /// Argument whose shape could not be decoded, with a short description
    Unsupported(String),
}

impl CustomAttributeArgument {
    /// Integer value of integral, boolean and char arguments.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CustomAttributeArgument::Bool(value) => Some(i64::from(*value)),
            CustomAttributeArgument::Char(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I1(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U1(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I2(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U2(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I4(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U4(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I8(value) => Some(*value),
            #[allow(clippy::cast_possible_wrap)]
            CustomAttributeArgument::U8(value) => Some(*value as i64),
            _ => None,
        }
    }

    /// True for [`CustomAttributeArgument::Unsupported`].
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CustomAttributeArgument::Unsupported(_))
    }
}

impl fmt::Display for CustomAttributeArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomAttributeArgument::R4(value) => write!(f, "{value}"),
            CustomAttributeArgument::R8(value) => write!(f, "{value}"),
            CustomAttributeArgument::String(value) => write!(f, "{value:?}"),
            CustomAttributeArgument::Type(value) => write!(f, "typeof({value})"),
            CustomAttributeArgument::Enum { type_name, value } => {
                write!(f, "({type_name}){value}")
            }
            CustomAttributeArgument::Array(values) => {
                write!(f, "[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            CustomAttributeArgument::Unsupported(what) => write!(f, "<unsupported {what}>"),
            other => match other.as_i64() {
                Some(value) => write!(f, "{value}"),
                None => write!(f, "?"),
            },
        }
    }
}

/// A named field or property assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// Field (`0x53`) or property (`0x54`)
    pub is_field: bool,
    /// Name of the field or property
    pub name: String,
    /// Value of the argument
    pub value: CustomAttributeArgument,
}

/// `CorSerializationType` tags of named arguments and boxed values.
#[allow(non_snake_case, missing_docs)]
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const SZARRAY: u8 = 0x1D;
    pub const TYPE: u8 = 0x50;
    pub const TAGGED_OBJECT: u8 = 0x51;
    pub const FIELD: u8 = 0x53;
    pub const PROPERTY: u8 = 0x54;
    pub const ENUM: u8 = 0x55;
}
