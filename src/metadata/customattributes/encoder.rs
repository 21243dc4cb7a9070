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
    file::io::{write_compressed_uint, write_le},
    metadata::customattributes::{CustomAttributeArgument, SERIALIZATION_TYPE},
    Result,
};

/// Builds custom attribute blobs; the inverse of
/// [`crate::metadata::customattributes::CustomAttributeParser`].
///
/// ```rust
/// use dotnative::metadata::customattributes::{CustomAttributeArgument, CustomAttributeEncoder};
///
/// let blob = CustomAttributeEncoder::new()
///     .fixed(&CustomAttributeArgument::I4(42))?
///     .finish()?;
/// assert_eq!(blob, vec![0x01, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x00, 0x00]);
/// # Ok::<(), dotnative::Error>(())
/// ```
pub struct CustomAttributeEncoder {
    fixed: Vec<u8>,
    named: Vec<u8>,
    named_count: u16,
}

impl Default for CustomAttributeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomAttributeEncoder {
    /// Starts a blob with the standard prolog.
    #[must_use]
    pub fn new() -> Self {
        CustomAttributeEncoder {
            fixed: vec![0x01, 0x00],
            named: Vec::new(),
            named_count: 0,
        }
    }

    /// Appends a fixed argument in its untagged form.
    ///
    /// # Errors
    /// Returns an error for [`CustomAttributeArgument::Unsupported`] values.
    pub fn fixed(mut self, argument: &CustomAttributeArgument) -> Result<Self> {
        write_value(&mut self.fixed, argument)?;
        Ok(self)
    }

    /// Appends a fixed argument for an `object` parameter (tag + value).
    ///
    /// # Errors
    /// Returns an error for values without a serialization tag.
    pub fn boxed(mut self, argument: &CustomAttributeArgument) -> Result<Self> {
        write_tag(&mut self.fixed, argument)?;
        write_value(&mut self.fixed, argument)?;
        Ok(self)
    }

    /// Appends a named field or property assignment.
    ///
    /// # Errors
    /// Returns an error for values without a serialization tag.
    pub fn named(
        mut self,
        is_field: bool,
        name: &str,
        argument: &CustomAttributeArgument,
    ) -> Result<Self> {
        self.named.push(if is_field {
            SERIALIZATION_TYPE::FIELD
        } else {
            SERIALIZATION_TYPE::PROPERTY
        });
        write_tag(&mut self.named, argument)?;
        write_ser_string(&mut self.named, name)?;
        write_value(&mut self.named, argument)?;
        self.named_count += 1;
        Ok(self)
    }

    /// Finishes the blob.
    ///
    /// # Errors
    /// Never fails today; kept fallible for symmetry with the other encoders.
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut blob = self.fixed;
        write_le(&mut blob, self.named_count);
        blob.extend_from_slice(&self.named);
        Ok(blob)
    }
}

fn write_ser_string(buffer: &mut Vec<u8>, value: &str) -> Result<()> {
    write_compressed_uint(buffer, value.len() as u32)?;
    buffer.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_tag(buffer: &mut Vec<u8>, argument: &CustomAttributeArgument) -> Result<()> {
    let tag = match argument {
        CustomAttributeArgument::Bool(_) => SERIALIZATION_TYPE::BOOLEAN,
        CustomAttributeArgument::Char(_) => SERIALIZATION_TYPE::CHAR,
        CustomAttributeArgument::I1(_) => SERIALIZATION_TYPE::I1,
        CustomAttributeArgument::U1(_) => SERIALIZATION_TYPE::U1,
        CustomAttributeArgument::I2(_) => SERIALIZATION_TYPE::I2,
        CustomAttributeArgument::U2(_) => SERIALIZATION_TYPE::U2,
        CustomAttributeArgument::I4(_) => SERIALIZATION_TYPE::I4,
        CustomAttributeArgument::U4(_) => SERIALIZATION_TYPE::U4,
        CustomAttributeArgument::I8(_) => SERIALIZATION_TYPE::I8,
        CustomAttributeArgument::U8(_) => SERIALIZATION_TYPE::U8,
        CustomAttributeArgument::R4(_) => SERIALIZATION_TYPE::R4,
        CustomAttributeArgument::R8(_) => SERIALIZATION_TYPE::R8,
        CustomAttributeArgument::String(_) => SERIALIZATION_TYPE::STRING,
        CustomAttributeArgument::Type(_) => SERIALIZATION_TYPE::TYPE,
        CustomAttributeArgument::Enum { type_name, .. } => {
            buffer.push(SERIALIZATION_TYPE::ENUM);
            return write_ser_string(buffer, type_name);
        }
        CustomAttributeArgument::Array(elements) => {
            buffer.push(SERIALIZATION_TYPE::SZARRAY);
            return match elements.first() {
                Some(first) => write_tag(buffer, first),
                None => {
                    buffer.push(SERIALIZATION_TYPE::I4);
                    Ok(())
                }
            };
        }
        CustomAttributeArgument::Unsupported(what) => {
            return Err(malformed_error!("Cannot encode unsupported argument - {}", what))
        }
    };

    buffer.push(tag);
    Ok(())
}

fn write_value(buffer: &mut Vec<u8>, argument: &CustomAttributeArgument) -> Result<()> {
    match argument {
        CustomAttributeArgument::Bool(value) => buffer.push(u8::from(*value)),
        CustomAttributeArgument::Char(value) => write_le(buffer, *value),
        CustomAttributeArgument::I1(value) => write_le(buffer, *value),
        CustomAttributeArgument::U1(value) => write_le(buffer, *value),
        CustomAttributeArgument::I2(value) => write_le(buffer, *value),
        CustomAttributeArgument::U2(value) => write_le(buffer, *value),
        CustomAttributeArgument::I4(value) => write_le(buffer, *value),
        CustomAttributeArgument::U4(value) => write_le(buffer, *value),
        CustomAttributeArgument::I8(value) => write_le(buffer, *value),
        CustomAttributeArgument::U8(value) => write_le(buffer, *value),
        CustomAttributeArgument::R4(value) => write_le(buffer, *value),
        CustomAttributeArgument::R8(value) => write_le(buffer, *value),
        CustomAttributeArgument::String(value) | CustomAttributeArgument::Type(value) => {
            write_ser_string(buffer, value)?;
        }
        CustomAttributeArgument::Enum { value, .. } => write_value(buffer, value)?,
        CustomAttributeArgument::Array(elements) => {
            let Ok(length) = i32::try_from(elements.len()) else {
                return Err(malformed_error!("Array too large - {}", elements.len()));
            };
            write_le(buffer, length);
            for element in elements {
                write_value(buffer, element)?;
            }
        }
        CustomAttributeArgument::Unsupported(what) => {
            return Err(malformed_error!("Cannot encode unsupported argument - {}", what))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        customattributes::{parse_custom_attribute, EnumResolver},
        signatures::{SignatureMethod, TypeSignature},
        token::Token,
    };

    struct NoTypes;

    impl EnumResolver for NoTypes {
        fn type_name(&self, _token: Token) -> Option<String> {
            None
        }

        fn enum_underlying(&self, _full_name: &str) -> Option<TypeSignature> {
            None
        }
    }

    #[test]
    fn encoded_blob_decodes() {
        let blob = CustomAttributeEncoder::new()
            .fixed(&CustomAttributeArgument::String("x".into()))
            .unwrap()
            .boxed(&CustomAttributeArgument::R8(1.5))
            .unwrap()
            .named(false, "Level", &CustomAttributeArgument::U2(3))
            .unwrap()
            .finish()
            .unwrap();

        let constructor = SignatureMethod {
            has_this: true,
            params: vec![TypeSignature::String, TypeSignature::Object],
            ..SignatureMethod::default()
        };
        let value = parse_custom_attribute(&blob, &constructor, &NoTypes).unwrap();
        assert_eq!(
            value.fixed_args,
            vec![
                CustomAttributeArgument::String("x".into()),
                CustomAttributeArgument::R8(1.5)
            ]
        );
        assert_eq!(value.named_args[0].name, "Level");
        assert_eq!(value.named_args[0].value, CustomAttributeArgument::U2(3));
    }

    #[test]
    fn unsupported_is_rejected() {
        let result =
            CustomAttributeEncoder::new().fixed(&CustomAttributeArgument::Unsupported("x".into()));
        assert!(result.is_err());
    }
}
