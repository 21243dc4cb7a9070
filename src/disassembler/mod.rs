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

//! CIL instruction decoding, classification and assembly.
//!
//! # Key Types
//! - [`Instruction`] - a decoded instruction with operand, stack effect and flow class
//! - [`INSTRUCTIONS`] / [`INSTRUCTIONS_FE`] - static opcode tables
//! - [`InstructionAssembler`] - builds instruction streams with labels
//!
//! # Main Functions
//! - [`decode_instruction`] - decode a single instruction
//! - [`decode_stream`] - decode a whole method body

mod assembler;
mod decoder;
mod instruction;
mod instructions;

pub use assembler::{InstructionAssembler, Label};
pub use decoder::{decode_instruction, decode_stream};
pub use instruction::{
    CilInstruction, FlowType, Immediate, Instruction, InstructionCategory, Operand, OperandType,
    StackBehavior, VAR,
};
pub use instructions::{lookup_mnemonic, INSTRUCTIONS, INSTRUCTIONS_FE};
