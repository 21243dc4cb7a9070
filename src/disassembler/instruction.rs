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

//! Decoded CIL instructions and their static classification.

use std::fmt;

use crate::metadata::token::Token;

/// Marker for a stack effect that depends on the callee signature.
pub const VAR: u8 = u8::MAX;

/// Encoding of an instruction's inline operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed 8-bit value (short branches, `ldc.i4.s`)
    Int8,
    /// Unsigned 8-bit index (`ldarg.s`, `unaligned.`)
    UInt8,
    /// Unsigned 16-bit index (`ldarg`, `ldloc`)
    UInt16,
    /// Signed 32-bit value (long branches, `ldc.i4`)
    Int32,
    /// Signed 64-bit value
    Int64,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Metadata token
    Token,
    /// Jump table of `switch`
    Switch,
}

/// An immediate operand value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum Immediate {
    Int8(i8),
    UInt8(u8),
    UInt16(u16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl Immediate {
    /// Integer value, sign-extended. `None` for floats.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Immediate::Int8(value) => Some(i64::from(value)),
            Immediate::UInt8(value) => Some(i64::from(value)),
            Immediate::UInt16(value) => Some(i64::from(value)),
            Immediate::Int32(value) => Some(i64::from(value)),
            Immediate::Int64(value) => Some(value),
            Immediate::Float32(_) | Immediate::Float64(_) => None,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::UInt16(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value:?}"),
            Immediate::Float64(value) => write!(f, "{value:?}"),
        }
    }
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Literal, index or branch displacement
    Immediate(Immediate),
    /// Metadata token
    Token(Token),
    /// Displacements of a `switch` table
    Switch(Vec<i32>),
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Multi-way jump table
    Switch,
    /// Calls a method and continues
    Call,
    /// Returns from the method
    Return,
    /// Raises an exception
    Throw,
    /// Ends a `finally`, `fault` or filter block
    EndFinally,
    /// Leaves a protected region
    Leave,
}

impl FlowType {
    /// True if the instruction ends a basic block.
    #[must_use]
    pub fn ends_block(&self) -> bool {
        !matches!(self, FlowType::Sequential | FlowType::Call)
    }

    /// True if execution may continue at the next instruction.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            FlowType::Sequential | FlowType::Call | FlowType::ConditionalBranch
        )
    }
}

/// Operation family of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionCategory {
    /// `add`, `mul.ovf`, `neg`, `ckfinite`, ...
    Arithmetic,
    /// `and`, `or`, `shl`, `not`, ...
    BitwiseLogical,
    /// `ceq`, `clt`, ...
    Comparison,
    /// Branches, calls, returns, throws
    ControlFlow,
    /// `conv.*`
    Conversion,
    /// Arguments, locals, constants, fields, elements, indirections
    LoadStore,
    /// Allocation, boxing, casts, value type operations
    ObjectModel,
    /// `constrained.`, `volatile.`, `tail.`, ...
    Prefix,
    /// `nop`, `dup`, `pop`, `localloc`, block operations
    Misc,
}

/// Static stack effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Values popped, [`VAR`] if signature dependent
    pub pops: u8,
    /// Values pushed, [`VAR`] if signature dependent
    pub pushes: u8,
}

impl StackBehavior {
    /// True if either count depends on the callee signature.
    #[must_use]
    pub fn is_variable(&self) -> bool {
        self.pops == VAR || self.pushes == VAR
    }

    /// Net stack change, `None` if signature dependent.
    #[must_use]
    pub fn net_effect(&self) -> Option<i32> {
        if self.is_variable() {
            None
        } else {
            Some(i32::from(self.pushes) - i32::from(self.pops))
        }
    }
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy)]
pub struct CilInstruction {
    /// Textual mnemonic, empty for unused opcodes
    pub mnemonic: &'static str,
    /// Operand encoding
    pub op_type: OperandType,
    /// Operation family
    pub category: InstructionCategory,
    /// Control flow effect
    pub flow: FlowType,
    /// Values popped
    pub stack_pops: u8,
    /// Values pushed
    pub stack_pushes: u8,
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Offset inside the method's code
    pub offset: u64,
    /// Virtual address (equal to the offset for bodies decoded standalone)
    pub rva: u64,
    /// Encoded size including prefix and operand
    pub size: u64,
    /// Opcode byte (second byte for `0xFE` instructions)
    pub opcode: u8,
    /// `0xFE` for two-byte opcodes, otherwise 0
    pub prefix: u8,
    /// Textual mnemonic
    pub mnemonic: &'static str,
    /// Operation family
    pub category: InstructionCategory,
    /// Control flow effect
    pub flow_type: FlowType,
    /// Static stack effect
    pub stack_behavior: StackBehavior,
    /// Decoded operand
    pub operand: Operand,
    /// Branch targets in the same address space as `rva`
    pub branch_targets: Vec<u64>,
}

impl Instruction {
    /// Token operand, if any.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// Integer immediate operand, if any.
    #[must_use]
    pub fn immediate(&self) -> Option<i64> {
        match &self.operand {
            Operand::Immediate(value) => value.as_i64(),
            _ => None,
        }
    }

    /// Offset of the following instruction.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.offset + self.size
    }

    /// True for `constrained.`, `volatile.` and the other prefixes.
    #[must_use]
    pub fn is_prefix(&self) -> bool {
        self.category == InstructionCategory::Prefix
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04x}: {}", self.offset, self.mnemonic)?;
        match (&self.operand, self.flow_type) {
            (Operand::None, _) => Ok(()),
            (Operand::Switch(_), _) => {
                let targets: Vec<String> = self
                    .branch_targets
                    .iter()
                    .map(|target| format!("IL_{target:04x}"))
                    .collect();
                write!(f, " ({})", targets.join(", "))
            }
            (_, FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave) => {
                match self.branch_targets.first() {
                    Some(target) => write!(f, " IL_{target:04x}"),
                    None => Ok(()),
                }
            }
            (Operand::Immediate(value), _) => write!(f, " {value}"),
            (Operand::Token(token), _) => write!(f, " 0x{:08X}", token.value()),
        }
    }
}
