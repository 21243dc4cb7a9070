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

//! CIL instruction decoding.
//!
//! # Example
//!
//! ```rust
//! use dotnative::{disassembler::decode_stream, Parser};
//!
//! let code = [0x00, 0x2A]; // nop, ret
//! let mut parser = Parser::new(&code);
//! let instructions = decode_stream(&mut parser, 0)?;
//! assert_eq!(instructions.len(), 2);
//! assert_eq!(instructions[1].to_string(), "IL_0001: ret");
//! # Ok::<(), dotnative::Error>(())
//! ```

use crate::{
    disassembler::{
        instruction::{FlowType, Immediate, Instruction, Operand, OperandType, StackBehavior},
        instructions::{INSTRUCTIONS, INSTRUCTIONS_FE},
    },
    file::parser::Parser,
    metadata::token::Token,
    Result,
};

/// Decodes instructions until the parser is exhausted.
///
/// The first instruction is placed at `rva`; later ones follow by size.
///
/// # Errors
/// Returns an error on an unknown opcode or a truncated operand.
pub fn decode_stream(parser: &mut Parser, rva: u64) -> Result<Vec<Instruction>> {
    let mut current_rva = rva;
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        let instruction = decode_instruction(parser, current_rva)?;
        current_rva += instruction.size;
        instructions.push(instruction);
    }

    Ok(instructions)
}

/// Decodes the instruction at the parser's position.
///
/// Branch targets are computed as the address of the next instruction plus the signed
/// displacement, in the address space of `rva`.
///
/// # Errors
/// Returns an error on an unknown or reserved opcode or a truncated operand.
pub fn decode_instruction(parser: &mut Parser, rva: u64) -> Result<Instruction> {
    let offset = parser.pos() as u64;
    let first_byte = parser.read_le::<u8>()?;

    let (cil_instruction, prefix, opcode) = match first_byte {
        0xFE => {
            let second_byte = parser.read_le::<u8>()?;
            match INSTRUCTIONS_FE.get(second_byte as usize) {
                Some(instr) => (instr, 0xFE, second_byte),
                None => return Err(malformed_error!("Invalid opcode: FE {:02X}", second_byte)),
            }
        }
        _ => match INSTRUCTIONS.get(first_byte as usize) {
            Some(instr) => (instr, 0, first_byte),
            None => return Err(malformed_error!("Invalid opcode: {:02X}", first_byte)),
        },
    };

    if cil_instruction.mnemonic.is_empty() {
        return Err(malformed_error!(
            "Reserved opcode: {:02X}{:02X}",
            prefix,
            opcode
        ));
    }

    let operand = match cil_instruction.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()? as usize;
            if case_count > parser.remaining() / 4 {
                return Err(out_of_bounds_error!());
            }

            let mut targets = Vec::with_capacity(case_count);
            for _ in 0..case_count {
                targets.push(parser.read_le::<i32>()?);
            }
            Operand::Switch(targets)
        }
    };
    let size = parser.pos() as u64 - offset;

    let mut instruction = Instruction {
        offset,
        rva,
        size,
        opcode,
        prefix,
        mnemonic: cil_instruction.mnemonic,
        category: cil_instruction.category,
        flow_type: cil_instruction.flow,
        stack_behavior: StackBehavior {
            pops: cil_instruction.stack_pops,
            pushes: cil_instruction.stack_pushes,
        },
        operand,
        branch_targets: Vec::new(),
    };

    let next_rva = rva + size;
    match (&instruction.operand, instruction.flow_type) {
        (
            Operand::Immediate(value),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave,
        ) => {
            if let Some(displacement) = value.as_i64() {
                instruction
                    .branch_targets
                    .push(next_rva.wrapping_add_signed(displacement));
            }
        }
        (Operand::Switch(targets), FlowType::Switch) => {
            instruction.branch_targets = targets
                .iter()
                .map(|target| next_rva.wrapping_add_signed(i64::from(*target)))
                .collect();
        }
        _ => {}
    }

    Ok(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::InstructionCategory;

    #[test]
    fn decode_instruction_basic() {
        // ldloc.s 10
        let mut parser = Parser::new(&[0x11, 0x10]);
        let result = decode_instruction(&mut parser, 0x1000).unwrap();

        assert_eq!(result.rva, 0x1000);
        assert_eq!(result.offset, 0);
        assert_eq!(result.size, 2);
        assert_eq!(result.opcode, 0x11);
        assert_eq!(result.prefix, 0);
        assert_eq!(result.mnemonic, "ldloc.s");
        assert_eq!(result.category, InstructionCategory::LoadStore);
        assert_eq!(result.flow_type, FlowType::Sequential);
        assert_eq!(result.operand, Operand::Immediate(Immediate::UInt8(0x10)));
    }

    #[test]
    fn decode_instruction_two_byte() {
        let mut parser = Parser::new(&[0xFE, 0x01]);
        let result = decode_instruction(&mut parser, 0).unwrap();

        assert_eq!(result.opcode, 0x01);
        assert_eq!(result.prefix, 0xFE);
        assert_eq!(result.mnemonic, "ceq");
        assert_eq!(result.category, InstructionCategory::Comparison);
    }

    #[test]
    fn branch_targets() {
        // br.s +10
        let mut parser = Parser::new(&[0x2B, 0x0A]);
        let result = decode_instruction(&mut parser, 0x1000).unwrap();
        assert_eq!(result.flow_type, FlowType::UnconditionalBranch);
        assert_eq!(result.branch_targets, vec![0x100C]);

        // brtrue.s -4 at offset 6
        let mut parser = Parser::new(&[0x2D, 0xFC]);
        let result = decode_instruction(&mut parser, 6).unwrap();
        assert_eq!(result.branch_targets, vec![4]);
        assert_eq!(result.to_string(), "IL_0000: brtrue.s IL_0004");
    }

    #[test]
    fn switch_targets() {
        #[rustfmt::skip]
        let mut parser = Parser::new(&[
            0x45, 0x02, 0x00, 0x00, 0x00,
            0x0A, 0x00, 0x00, 0x00,
            0x14, 0x00, 0x00, 0x00,
        ]);
        let result = decode_instruction(&mut parser, 0x1000).unwrap();

        assert_eq!(result.flow_type, FlowType::Switch);
        assert_eq!(result.branch_targets, vec![0x1017, 0x1021]);
    }

    #[test]
    fn invalid_and_reserved_opcodes() {
        assert!(decode_instruction(&mut Parser::new(&[0xFF]), 0).is_err());
        assert!(decode_instruction(&mut Parser::new(&[0x24]), 0).is_err());
        assert!(decode_instruction(&mut Parser::new(&[0xFE, 0x08]), 0).is_err());
        assert!(decode_instruction(&mut Parser::new(&[0x20, 0x01]), 0).is_err());
    }

    #[test]
    fn token_operand_display() {
        let mut parser = Parser::new(&[0x00, 0x00, 0x00, 0x00, 0x28, 0x03, 0x00, 0x00, 0x0A]);
        let result = decode_stream(&mut parser, 0).unwrap();
        assert_eq!(result[4].token(), Some(Token::new(0x0A00_0003)));
        assert_eq!(result[4].to_string(), "IL_0004: call 0x0A000003");
    }

    #[test]
    fn decode_stream_offsets() {
        #[rustfmt::skip]
        let code = [
            0x00,       // nop
            0x2C, 0x05, // brfalse.s 5
            0x00,       // nop
            0x2B, 0x03, // br.s 3
            0x00,       // nop
            0x2A,       // ret
            0x00,       // nop
            0x2A,       // ret
        ];

        let result = decode_stream(&mut Parser::new(&code), 0).unwrap();
        assert_eq!(result.len(), 8);
        assert_eq!(result[1].branch_targets, vec![8]);
        assert_eq!(result[7].offset, 9);
    }
}
