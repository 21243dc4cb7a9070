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

//! Basic block partitioning.
//!
//! Leaders are the first instruction, every branch and switch target, every instruction
//! following a block ending instruction, and every boundary of a protected block or handler.

use std::{collections::BTreeSet, ops::Range};

use rustc_hash::FxHashMap;

use crate::{ir::StubReason, model::MethodBodyRecord};

/// Instruction ranges of the basic blocks of one body.
#[derive(Debug, Clone)]
pub(crate) struct BlockLayout {
    /// Instruction index range of each block
    pub ranges: Vec<Range<usize>>,
    /// IL offset of each block
    pub offsets: Vec<u64>,
    by_offset: FxHashMap<u64, usize>,
    code_size: u64,
}

impl BlockLayout {
    /// Partitions `body` into blocks.
    ///
    /// A leader that does not start an instruction makes the body unlowerable.
    pub fn build(body: &MethodBodyRecord) -> Result<Self, StubReason> {
        let code_size = body.code_size as u64;
        let mut leaders = BTreeSet::new();
        if !body.instructions.is_empty() {
            leaders.insert(0u64);
        }

        for instruction in &body.instructions {
            leaders.extend(instruction.branch_targets.iter().copied());
            if instruction.flow_type.ends_block() {
                leaders.insert(instruction.next_offset());
            }
        }
        for handler in &body.exception_handlers {
            leaders.insert(u64::from(handler.try_offset));
            leaders.insert(u64::from(handler.try_offset) + u64::from(handler.try_length));
            leaders.insert(u64::from(handler.handler_offset));
            leaders.insert(u64::from(handler.handler_offset) + u64::from(handler.handler_length));
        }
        leaders.retain(|&offset| offset < code_size);

        let starts: FxHashMap<u64, usize> = body
            .instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| (instruction.offset, index))
            .collect();

        let mut first_instructions = Vec::with_capacity(leaders.len());
        for &leader in &leaders {
            match starts.get(&leader) {
                Some(&index) => first_instructions.push(index),
                None => {
                    return Err(StubReason::Unresolved {
                        offset: leader,
                        detail: "branch into the middle of an instruction".to_string(),
                    })
                }
            }
        }

        let mut ranges = Vec::with_capacity(first_instructions.len());
        for (position, &start) in first_instructions.iter().enumerate() {
            let end = first_instructions
                .get(position + 1)
                .copied()
                .unwrap_or(body.instructions.len());
            ranges.push(start..end);
        }

        let offsets: Vec<u64> = leaders.iter().copied().collect();
        let by_offset = offsets
            .iter()
            .enumerate()
            .map(|(index, &offset)| (offset, index))
            .collect();

        Ok(BlockLayout {
            ranges,
            offsets,
            by_offset,
            code_size,
        })
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Block starting at `offset`.
    pub fn block_at(&self, offset: u64) -> Option<usize> {
        self.by_offset.get(&offset).copied()
    }

    /// Block starting at `offset`, or one past the last block for the end of the code.
    pub fn boundary(&self, offset: u64) -> Option<usize> {
        if offset == self.code_size {
            Some(self.len())
        } else {
            self.block_at(offset)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        disassembler::{decode_stream, InstructionAssembler},
        file::parser::Parser,
        metadata::method::{ExceptionHandler, ExceptionHandlerFlags},
    };

    fn body(code: &[u8], handlers: Vec<ExceptionHandler>) -> MethodBodyRecord {
        MethodBodyRecord {
            max_stack: 8,
            init_locals: true,
            locals: Vec::new(),
            exception_handlers: handlers,
            instructions: decode_stream(&mut Parser::new(code), 0).unwrap(),
            code_size: code.len(),
        }
    }

    #[test]
    fn straight_line_is_one_block() {
        let mut asm = InstructionAssembler::new();
        asm.ldarg(1).unwrap().ldarg(2).unwrap().add().unwrap().ret().unwrap();
        let layout = BlockLayout::build(&body(&asm.finish().unwrap(), Vec::new())).unwrap();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.ranges[0], 0..4);
    }

    #[test]
    fn branches_split_blocks() {
        let mut asm = InstructionAssembler::new();
        let done = asm.define_label();
        asm.ldarg(0).unwrap().brtrue(done).unwrap();
        asm.ldc_i4(1).unwrap().pop().unwrap();
        asm.mark_label(done).unwrap().ret().unwrap();
        let layout = BlockLayout::build(&body(&asm.finish().unwrap(), Vec::new())).unwrap();

        assert_eq!(layout.len(), 3);
        assert_eq!(layout.offsets[0], 0);
        assert_eq!(layout.block_at(layout.offsets[2]), Some(2));
    }

    #[test]
    fn protected_regions_are_boundaries() {
        // try { nop; leave end } finally { endfinally } end: ret
        let code = [0x00, 0xDE, 0x01, 0xDC, 0x2A];
        let handler = ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: 3,
            handler_offset: 3,
            handler_length: 1,
            class_token_or_filter: 0,
        };
        let layout = BlockLayout::build(&body(&code, vec![handler])).unwrap();
        assert_eq!(layout.offsets, vec![0, 3, 4]);
        assert_eq!(layout.boundary(5), Some(3));
    }

    #[test]
    fn clause_ends_past_the_code_are_ignored() {
        let handler = ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: u32::MAX,
            handler_offset: u32::MAX,
            handler_length: u32::MAX,
            class_token_or_filter: 0,
        };
        let layout = BlockLayout::build(&body(&[0x00, 0x2A], vec![handler])).unwrap();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.boundary(u64::from(u32::MAX)), None);
    }
}
