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
    file::io::{read_le, read_le_at, write_le},
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
        token::Token,
    },
    Result,
};

/// Header and exception sections of one method body.
///
/// The code itself starts at `size_header` and spans `size_code` bytes.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Size of the code in bytes, not counting the header
    pub size_code: usize,
    /// Size of the method header in bytes
    pub size_header: usize,
    /// `StandAloneSig` token of the locals signature, null if there are no locals
    pub local_var_sig_token: Token,
    /// Maximum number of items on the operand stack
    pub max_stack: usize,
    /// Fat header
    pub is_fat: bool,
    /// Zero-initialize locals
    pub is_init_local: bool,
    /// Exception handling clauses in declaration order
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Parses a method header starting at `data[0]`.
    ///
    /// # Errors
    /// Returns an error if the data is empty, truncated or has an unknown header format.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_0000_0011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(out_of_bounds_error!());
                }

                Ok(MethodBody {
                    size_code,
                    size_header: 1,
                    local_var_sig_token: Token::new(0),
                    max_stack: 8,
                    is_fat: false,
                    is_init_local: false,
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < 12 {
                    return Err(out_of_bounds_error!());
                }

                let first_duo = read_le::<u16>(data)?;
                let size_header = ((first_duo >> 12) * 4) as usize;
                let size_code = read_le::<u32>(&data[4..])? as usize;
                if size_header < 12 || data.len() < size_code + size_header {
                    return Err(out_of_bounds_error!());
                }

                let local_var_sig_token = Token::new(read_le::<u32>(&data[8..])?);
                let flags_header = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);
                let max_stack = read_le::<u16>(&data[2..])? as usize;

                let mut exception_handlers = Vec::new();
                if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    let cursor = (size_header + size_code + 3) & !3;
                    Self::read_sections(data, cursor, &mut exception_handlers)?;
                }

                Ok(MethodBody {
                    size_code,
                    size_header,
                    local_var_sig_token,
                    max_stack,
                    is_fat: true,
                    is_init_local: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    fn read_sections(
        data: &[u8],
        mut cursor: usize,
        handlers: &mut Vec<ExceptionHandler>,
    ) -> Result<()> {
        while data.len() >= cursor + 4 {
            let section_flags = SectionFlags::from_bits_truncate(data[cursor]);
            if !section_flags.contains(SectionFlags::EHTABLE) {
                break;
            }

            let is_fat = section_flags.contains(SectionFlags::FAT_FORMAT);
            let section_size = if is_fat {
                (read_le::<u32>(&data[cursor..])? >> 8) as usize
            } else {
                data[cursor + 1] as usize
            };
            if section_size < 4 || data.len() < cursor + section_size {
                return Err(malformed_error!(
                    "Exception section of {} bytes exceeds the method body",
                    section_size
                ));
            }

            let mut offset = cursor + 4;
            if is_fat {
                for _ in 0..(section_size - 4) / 24 {
                    #[allow(clippy::cast_possible_truncation)]
                    let flags = read_le_at::<u32>(data, &mut offset)? as u16;
                    handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(flags),
                        try_offset: read_le_at::<u32>(data, &mut offset)?,
                        try_length: read_le_at::<u32>(data, &mut offset)?,
                        handler_offset: read_le_at::<u32>(data, &mut offset)?,
                        handler_length: read_le_at::<u32>(data, &mut offset)?,
                        class_token_or_filter: read_le_at::<u32>(data, &mut offset)?,
                    });
                }
            } else {
                for _ in 0..(section_size - 4) / 12 {
                    handlers.push(ExceptionHandler {
                        flags: ExceptionHandlerFlags::from_bits_truncate(read_le_at::<u16>(
                            data,
                            &mut offset,
                        )?),
                        try_offset: u32::from(read_le_at::<u16>(data, &mut offset)?),
                        try_length: u32::from(read_le_at::<u8>(data, &mut offset)?),
                        handler_offset: u32::from(read_le_at::<u16>(data, &mut offset)?),
                        handler_length: u32::from(read_le_at::<u8>(data, &mut offset)?),
                        class_token_or_filter: read_le_at::<u32>(data, &mut offset)?,
                    });
                }
            }

            if !section_flags.contains(SectionFlags::MORE_SECTS) {
                break;
            }
            cursor = (cursor + section_size + 3) & !3;
        }

        Ok(())
    }

    /// Full size of header and code.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size_code + self.size_header
    }

    /// The IL code of a body whose header starts at `data[0]`.
    ///
    /// # Errors
    /// Returns an error if `data` is shorter than the body.
    pub fn code<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        data.get(self.size_header..self.size())
            .ok_or_else(|| out_of_bounds_error!())
    }
}

/// Serializes method bodies, always with a fat header.
///
/// Used by the in-memory module builder; the output parses back through
/// [`MethodBody::from`].
pub struct MethodBodyEncoder {
    max_stack: u16,
    init_locals: bool,
    local_var_sig_token: Token,
    handlers: Vec<ExceptionHandler>,
}

impl MethodBodyEncoder {
    /// A body with the given stack limit and no locals.
    #[must_use]
    pub fn new(max_stack: u16) -> Self {
        MethodBodyEncoder {
            max_stack,
            init_locals: true,
            local_var_sig_token: Token::new(0),
            handlers: Vec::new(),
        }
    }

    /// Sets the locals signature token.
    #[must_use]
    pub fn locals(mut self, token: Token, init_locals: bool) -> Self {
        self.local_var_sig_token = token;
        self.init_locals = init_locals;
        self
    }

    /// Adds an exception clause.
    #[must_use]
    pub fn handler(mut self, handler: ExceptionHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Writes header, code and exception section.
    ///
    /// # Errors
    /// Returns an error if the code is larger than 4 GiB.
    pub fn encode(&self, code: &[u8]) -> Result<Vec<u8>> {
        let Ok(code_size) = u32::try_from(code.len()) else {
            return Err(malformed_error!("Method body too large - {}", code.len()));
        };

        let mut flags = MethodBodyFlags::FAT_FORMAT.bits() | (3 << 12);
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS.bits();
        }
        if !self.handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS.bits();
        }

        let mut buffer = Vec::with_capacity(12 + code.len());
        write_le(&mut buffer, flags);
        write_le(&mut buffer, self.max_stack);
        write_le(&mut buffer, code_size);
        write_le(&mut buffer, self.local_var_sig_token.value());
        buffer.extend_from_slice(code);

        if !self.handlers.is_empty() {
            while buffer.len() % 4 != 0 {
                buffer.push(0);
            }

            let section_size = 4 + 24 * self.handlers.len() as u32;
            let kind = SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT;
            write_le(&mut buffer, u32::from(kind.bits()) | (section_size << 8));
            for handler in &self.handlers {
                write_le(&mut buffer, u32::from(handler.flags.bits()));
                write_le(&mut buffer, handler.try_offset);
                write_le(&mut buffer, handler.try_length);
                write_le(&mut buffer, handler.handler_offset);
                write_le(&mut buffer, handler.handler_length);
                write_le(&mut buffer, handler.class_token_or_filter);
            }
        }

        Ok(buffer)
    }
}
