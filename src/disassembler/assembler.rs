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

//! Fluent CIL assembler.
//!
//! Used to build method bodies in memory. Branches to labels are always encoded in their
//! long form, so no relaxation pass is needed.
//!
//! ```rust
//! use dotnative::disassembler::InstructionAssembler;
//!
//! let mut asm = InstructionAssembler::new();
//! asm.ldarg(0)?.ldarg(1)?.add()?.ret()?;
//! assert_eq!(asm.finish()?, vec![0x02, 0x03, 0x58, 0x2A]);
//! # Ok::<(), dotnative::Error>(())
//! ```

use crate::{
    disassembler::{instruction::OperandType, instructions::lookup_mnemonic},
    file::io::write_le,
    metadata::token::Token,
    Result,
};

/// A branch target created by [`InstructionAssembler::define_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

enum AsmOperand<'a> {
    None,
    Int(i64),
    Float(f64),
    Token(Token),
    Label(Label),
    Switch(&'a [Label]),
}

struct Fixup {
    /// Position of the 4 byte displacement
    at: usize,
    /// Offset the displacement is relative to
    base: usize,
    label: Label,
}

/// Builds a CIL instruction stream.
#[derive(Default)]
pub struct InstructionAssembler {
    code: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl InstructionAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current offset in the stream.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Creates a label to be placed later with [`Self::mark_label`].
    pub fn define_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Places `label` at the current offset.
    ///
    /// # Errors
    /// Returns an error if the label is unknown or already placed.
    pub fn mark_label(&mut self, label: Label) -> Result<&mut Self> {
        match self.labels.get_mut(label.0) {
            Some(slot @ None) => {
                *slot = Some(self.code.len());
                Ok(self)
            }
            Some(Some(_)) => Err(malformed_error!("Label {} placed twice", label.0)),
            None => Err(malformed_error!("Unknown label {}", label.0)),
        }
    }

    /// Emits an instruction without operand.
    ///
    /// # Errors
    /// Returns an error if the mnemonic is unknown or requires an operand.
    pub fn emit(&mut self, mnemonic: &str) -> Result<&mut Self> {
        self.encode(mnemonic, AsmOperand::None)
    }

    /// Emits an instruction with an integer operand.
    ///
    /// # Errors
    /// Returns an error if the mnemonic is unknown, takes another operand kind, or the value
    /// does not fit.
    pub fn emit_int(&mut self, mnemonic: &str, value: i64) -> Result<&mut Self> {
        self.encode(mnemonic, AsmOperand::Int(value))
    }

    /// Emits an instruction with a floating point operand.
    ///
    /// # Errors
    /// Returns an error if the mnemonic is unknown or takes another operand kind.
    pub fn emit_float(&mut self, mnemonic: &str, value: f64) -> Result<&mut Self> {
        self.encode(mnemonic, AsmOperand::Float(value))
    }

    /// Emits an instruction with a token operand.
    ///
    /// # Errors
    /// Returns an error if the mnemonic is unknown or takes another operand kind.
    pub fn emit_token(&mut self, mnemonic: &str, token: Token) -> Result<&mut Self> {
        self.encode(mnemonic, AsmOperand::Token(token))
    }

    /// Emits a long-form branch (`br`, `brtrue`, `leave`, ...) to `label`.
    ///
    /// # Errors
    /// Returns an error if the mnemonic is not a long branch.
    pub fn emit_branch(&mut self, mnemonic: &str, label: Label) -> Result<&mut Self> {
        self.encode(mnemonic, AsmOperand::Label(label))
    }

    /// Emits a `switch` over `labels`.
    ///
    /// # Errors
    /// Returns an error if a label is unknown.
    pub fn switch(&mut self, labels: &[Label]) -> Result<&mut Self> {
        self.encode("switch", AsmOperand::Switch(labels))
    }

    /// `ldarg` using the shortest encoding.
    ///
    /// # Errors
    /// Never fails for valid indexes.
    pub fn ldarg(&mut self, index: u16) -> Result<&mut Self> {
        self.indexed(index, ["ldarg.0", "ldarg.1", "ldarg.2", "ldarg.3"], "ldarg.s", "ldarg")
    }

    /// `ldloc` using the shortest encoding.
    ///
    /// # Errors
    /// Never fails for valid indexes.
    pub fn ldloc(&mut self, index: u16) -> Result<&mut Self> {
        self.indexed(index, ["ldloc.0", "ldloc.1", "ldloc.2", "ldloc.3"], "ldloc.s", "ldloc")
    }

    /// `stloc` using the shortest encoding.
    ///
    /// # Errors
    /// Never fails for valid indexes.
    pub fn stloc(&mut self, index: u16) -> Result<&mut Self> {
        self.indexed(index, ["stloc.0", "stloc.1", "stloc.2", "stloc.3"], "stloc.s", "stloc")
    }

    /// `ldc.i4` using the shortest encoding.
    ///
    /// # Errors
    /// Never fails.
    pub fn ldc_i4(&mut self, value: i32) -> Result<&mut Self> {
        const SHORT: [&str; 10] = [
            "ldc.i4.m1", "ldc.i4.0", "ldc.i4.1", "ldc.i4.2", "ldc.i4.3", "ldc.i4.4", "ldc.i4.5",
            "ldc.i4.6", "ldc.i4.7", "ldc.i4.8",
        ];
        match value {
            #[allow(clippy::cast_sign_loss)]
            -1..=8 => self.emit(SHORT[(value + 1) as usize]),
            -128..=127 => self.emit_int("ldc.i4.s", i64::from(value)),
            _ => self.emit_int("ldc.i4", i64::from(value)),
        }
    }

    /// `ldc.i8`
    ///
    /// # Errors
    /// Never fails.
    pub fn ldc_i8(&mut self, value: i64) -> Result<&mut Self> {
        self.emit_int("ldc.i8", value)
    }

    /// `ldc.r8`
    ///
    /// # Errors
    /// Never fails.
    pub fn ldc_r8(&mut self, value: f64) -> Result<&mut Self> {
        self.emit_float("ldc.r8", value)
    }

    /// `ldstr` of a `#US` token.
    ///
    /// # Errors
    /// Never fails.
    pub fn ldstr(&mut self, token: Token) -> Result<&mut Self> {
        self.emit_token("ldstr", token)
    }

    /// `call`
    ///
    /// # Errors
    /// Never fails.
    pub fn call(&mut self, method: Token) -> Result<&mut Self> {
        self.emit_token("call", method)
    }

    /// `callvirt`
    ///
    /// # Errors
    /// Never fails.
    pub fn callvirt(&mut self, method: Token) -> Result<&mut Self> {
        self.emit_token("callvirt", method)
    }

    /// `newobj`
    ///
    /// # Errors
    /// Never fails.
    pub fn newobj(&mut self, ctor: Token) -> Result<&mut Self> {
        self.emit_token("newobj", ctor)
    }

    /// `add`
    ///
    /// # Errors
    /// Never fails.
    pub fn add(&mut self) -> Result<&mut Self> {
        self.emit("add")
    }

    /// `pop`
    ///
    /// # Errors
    /// Never fails.
    pub fn pop(&mut self) -> Result<&mut Self> {
        self.emit("pop")
    }

    /// `ret`
    ///
    /// # Errors
    /// Never fails.
    pub fn ret(&mut self) -> Result<&mut Self> {
        self.emit("ret")
    }

    /// `br` to `label`.
    ///
    /// # Errors
    /// Never fails.
    pub fn br(&mut self, label: Label) -> Result<&mut Self> {
        self.emit_branch("br", label)
    }

    /// `brtrue` to `label`.
    ///
    /// # Errors
    /// Never fails.
    pub fn brtrue(&mut self, label: Label) -> Result<&mut Self> {
        self.emit_branch("brtrue", label)
    }

    /// `brfalse` to `label`.
    ///
    /// # Errors
    /// Never fails.
    pub fn brfalse(&mut self, label: Label) -> Result<&mut Self> {
        self.emit_branch("brfalse", label)
    }

    /// `leave` to `label`.
    ///
    /// # Errors
    /// Never fails.
    pub fn leave(&mut self, label: Label) -> Result<&mut Self> {
        self.emit_branch("leave", label)
    }

    /// Resolves all label references and returns the code.
    ///
    /// # Errors
    /// Returns an error if a referenced label was never placed.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        for fixup in &self.fixups {
            let Some(Some(target)) = self.labels.get(fixup.label.0) else {
                return Err(malformed_error!("Label {} was never placed", fixup.label.0));
            };

            let displacement = i32::try_from(*target as i64 - fixup.base as i64)
                .map_err(|_| malformed_error!("Branch displacement out of range"))?;
            self.code[fixup.at..fixup.at + 4].copy_from_slice(&displacement.to_le_bytes());
        }

        Ok(self.code)
    }

    fn indexed(
        &mut self,
        index: u16,
        short: [&str; 4],
        byte_form: &str,
        long_form: &str,
    ) -> Result<&mut Self> {
        match index {
            0..=3 => self.emit(short[index as usize]),
            4..=255 => self.emit_int(byte_form, i64::from(index)),
            _ => self.emit_int(long_form, i64::from(index)),
        }
    }

    fn encode(&mut self, mnemonic: &str, operand: AsmOperand<'_>) -> Result<&mut Self> {
        let Some((prefix, opcode, description)) = lookup_mnemonic(mnemonic) else {
            return Err(malformed_error!("Unknown mnemonic - {}", mnemonic));
        };

        // Operand bytes and label references, positions relative to the operand start
        let mut bytes = Vec::new();
        let mut references = Vec::new();
        match (description.op_type, operand) {
            (OperandType::None, AsmOperand::None) => {}
            (OperandType::Int8, AsmOperand::Int(value)) => {
                write_le(&mut bytes, narrow::<i8>(mnemonic, value)?);
            }
            (OperandType::UInt8, AsmOperand::Int(value)) => {
                write_le(&mut bytes, narrow::<u8>(mnemonic, value)?);
            }
            (OperandType::UInt16, AsmOperand::Int(value)) => {
                write_le(&mut bytes, narrow::<u16>(mnemonic, value)?);
            }
            (OperandType::Int32, AsmOperand::Int(value)) => {
                write_le(&mut bytes, narrow::<i32>(mnemonic, value)?);
            }
            (OperandType::Int64, AsmOperand::Int(value)) => write_le(&mut bytes, value),
            #[allow(clippy::cast_possible_truncation)]
            (OperandType::Float32, AsmOperand::Float(value)) => write_le(&mut bytes, value as f32),
            (OperandType::Float64, AsmOperand::Float(value)) => write_le(&mut bytes, value),
            (OperandType::Token, AsmOperand::Token(token)) => write_le(&mut bytes, token.value()),
            (OperandType::Int32, AsmOperand::Label(label)) => {
                bytes.extend_from_slice(&[0; 4]);
                references.push((0, 4, label));
            }
            (OperandType::Switch, AsmOperand::Switch(labels)) => {
                let count = u32::try_from(labels.len())
                    .map_err(|_| malformed_error!("Switch table too large"))?;
                write_le(&mut bytes, count);

                let base = 4 + labels.len() * 4;
                for (index, label) in labels.iter().enumerate() {
                    bytes.extend_from_slice(&[0; 4]);
                    references.push((4 + index * 4, base, *label));
                }
            }
            _ => {
                return Err(malformed_error!(
                    "Operand does not match the encoding of {}",
                    mnemonic
                ))
            }
        }

        if let Some((_, _, label)) = references.iter().find(|(_, _, l)| l.0 >= self.labels.len()) {
            return Err(malformed_error!("Unknown label {}", label.0));
        }

        if prefix != 0 {
            self.code.push(prefix);
        }
        self.code.push(opcode);

        let start = self.code.len();
        self.code.extend_from_slice(&bytes);
        self.fixups
            .extend(references.into_iter().map(|(at, base, label)| Fixup {
                at: start + at,
                base: start + base,
                label,
            }));

        Ok(self)
    }
}

fn narrow<T: TryFrom<i64>>(mnemonic: &str, value: i64) -> Result<T> {
    T::try_from(value)
        .map_err(|_| malformed_error!("Operand {} out of range for {}", value, mnemonic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        disassembler::{decode_stream, FlowType},
        file::parser::Parser,
    };

    #[test]
    fn short_forms() -> crate::Result<()> {
        let mut asm = InstructionAssembler::new();
        asm.ldarg(2)?.ldarg(9)?.ldloc(300)?.ldc_i4(-1)?.ldc_i4(100)?.ldc_i4(1000)?;
        assert_eq!(
            asm.finish()?,
            vec![0x04, 0x0E, 0x09, 0xFE, 0x0C, 0x2C, 0x01, 0x15, 0x1F, 0x64, 0x20, 0xE8, 0x03, 0, 0]
        );
        Ok(())
    }

    #[test]
    fn labels_resolve() -> crate::Result<()> {
        let mut asm = InstructionAssembler::new();
        let done = asm.define_label();
        asm.ldarg(0)?.brfalse(done)?.ldc_i4(1)?.ret()?;
        asm.mark_label(done)?.ldc_i4(0)?.ret()?;
        let code = asm.finish()?;

        let instructions = decode_stream(&mut Parser::new(&code), 0)?;
        assert_eq!(instructions[1].flow_type, FlowType::ConditionalBranch);
        assert_eq!(instructions[1].branch_targets, vec![instructions[4].offset]);
        Ok(())
    }

    #[test]
    fn switch_table() -> crate::Result<()> {
        let mut asm = InstructionAssembler::new();
        let first = asm.define_label();
        let second = asm.define_label();
        asm.ldarg(0)?.switch(&[first, second])?;
        asm.mark_label(first)?.ret()?;
        asm.mark_label(second)?.ret()?;
        let code = asm.finish()?;

        let instructions = decode_stream(&mut Parser::new(&code), 0)?;
        assert_eq!(instructions[1].branch_targets, vec![14, 15]);
        Ok(())
    }

    #[test]
    fn errors() {
        let mut asm = InstructionAssembler::new();
        assert!(asm.emit("bogus").is_err());
        assert!(asm.emit_int("ldc.i4.s", 1000).is_err());
        assert!(asm.emit("ldstr").is_err());
        assert_eq!(asm.offset(), 0);

        let mut asm = InstructionAssembler::new();
        let label = asm.define_label();
        asm.br(label).unwrap();
        assert!(asm.finish().is_err());
    }
}
