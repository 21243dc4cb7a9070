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

//! Stack simulation and per-opcode translation.
//!
//! Blocks are visited in worklist order starting at the entry and at every handler. The
//! evaluation stack holds [`IrValue`]s; every value produced by an instruction gets a fresh
//! temporary. When control moves to another block the live stack is copied into that block's
//! entry slots, which the block reads back into temporaries before its first instruction.

use std::{collections::VecDeque, fmt::Display};

use rustc_hash::FxHashSet;

use crate::{
    config::BuildConfig,
    disassembler::{Immediate, Instruction, Operand},
    ir::{
        body::{
            BasicBlock, BinaryOp, CallSignature, CallTarget, CompareOp, ExceptionRegion,
            FieldAccess, IrInstr, IrValue, LoweredBody, Marker, Overflow, RegionKind, StubReason,
            UnaryOp,
        },
        builder::interface_slots,
        lower::blocks::BlockLayout,
        types::{IrMethod, IrMethodId, IrModule, IrTypeId},
    },
    metadata::{method::MethodAttributes, tables::TableId, token::Token},
    model::{GenericContext, MethodBodyRecord, MethodInst, MethodRecord, ModuleSet, TypeSig},
};

type Step<T = ()> = std::result::Result<T, StubReason>;

/// `beq` .. `blt.un`, in opcode order.
const BRANCH_COMPARISONS: [CompareOp; 10] = [
    CompareOp::Eq,
    CompareOp::Ge,
    CompareOp::Gt,
    CompareOp::Le,
    CompareOp::Lt,
    CompareOp::Ne,
    CompareOp::GeUn,
    CompareOp::GtUn,
    CompareOp::LeUn,
    CompareOp::LtUn,
];

/// `add` .. `shr.un`, in opcode order.
const ARITHMETIC: [BinaryOp; 13] = [
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::DivUn,
    BinaryOp::Rem,
    BinaryOp::RemUn,
    BinaryOp::And,
    BinaryOp::Or,
    BinaryOp::Xor,
    BinaryOp::Shl,
    BinaryOp::Shr,
    BinaryOp::ShrUn,
];

/// `ldind.i1` .. `ldind.r8` and `ldelem.i1` .. `ldelem.r8`, in opcode order.
const LOAD_TYPES: [TypeSig; 10] = [
    TypeSig::I1,
    TypeSig::U1,
    TypeSig::I2,
    TypeSig::U2,
    TypeSig::I4,
    TypeSig::U4,
    TypeSig::I8,
    TypeSig::I,
    TypeSig::R4,
    TypeSig::R8,
];

/// `stind.i1` .. `stind.r8`, in opcode order.
const STORE_TYPES: [TypeSig; 6] = [
    TypeSig::I1,
    TypeSig::I2,
    TypeSig::I4,
    TypeSig::I8,
    TypeSig::R4,
    TypeSig::R8,
];

/// `stelem.i` .. `stelem.r8`, in opcode order.
const STORE_ELEMENT_TYPES: [TypeSig; 7] = [
    TypeSig::I,
    TypeSig::I1,
    TypeSig::I2,
    TypeSig::I4,
    TypeSig::I8,
    TypeSig::R4,
    TypeSig::R8,
];

/// `conv.ovf.i1.un` .. `conv.ovf.u.un`, in opcode order.
const UNSIGNED_CHECKED: [TypeSig; 10] = [
    TypeSig::I1,
    TypeSig::I2,
    TypeSig::I4,
    TypeSig::I8,
    TypeSig::U1,
    TypeSig::U2,
    TypeSig::U4,
    TypeSig::U8,
    TypeSig::I,
    TypeSig::U,
];

/// `conv.ovf.i1` .. `conv.ovf.u8`, in opcode order.
const SIGNED_CHECKED: [TypeSig; 8] = [
    TypeSig::I1,
    TypeSig::U1,
    TypeSig::I2,
    TypeSig::U2,
    TypeSig::I4,
    TypeSig::U4,
    TypeSig::I8,
    TypeSig::U8,
];

#[derive(Debug, Clone)]
struct StackValue {
    value: IrValue,
    ty: TypeSig,
}

#[derive(Debug, Default)]
struct BlockState {
    index: usize,
    stack: Vec<StackValue>,
    out: Vec<IrInstr>,
    /// Types whose class initialization already ran in this block
    guarded: FxHashSet<IrTypeId>,
    /// Operand of a pending `constrained.` prefix
    constraint: Option<TypeSig>,
}

/// Translates one method body.
pub(crate) struct Lowerer<'a> {
    set: &'a ModuleSet,
    ir: &'a IrModule,
    config: &'a BuildConfig,
    method: &'a IrMethod,
    record: &'a MethodRecord,
    body: &'a MethodBodyRecord,
    layout: BlockLayout,
    locals: Vec<TypeSig>,
    temps: Vec<TypeSig>,
    slots: Vec<TypeSig>,
    /// Entry slots of every block, `None` until a predecessor is translated
    entry: Vec<Option<Vec<u32>>>,
    /// Caught type of blocks starting a catch handler
    catch_entry: Vec<Option<TypeSig>>,
    blocks: Vec<BasicBlock>,
    pending: VecDeque<usize>,
    offset: u64,
}

impl<'a> Lowerer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        set: &'a ModuleSet,
        ir: &'a IrModule,
        config: &'a BuildConfig,
        method: &'a IrMethod,
        record: &'a MethodRecord,
        body: &'a MethodBodyRecord,
        layout: BlockLayout,
        locals: Vec<TypeSig>,
    ) -> Self {
        let count = layout.len();
        let blocks = layout
            .offsets
            .iter()
            .map(|&offset| BasicBlock {
                offset,
                instructions: Vec::new(),
                reachable: false,
            })
            .collect();

        Lowerer {
            set,
            ir,
            config,
            method,
            record,
            body,
            layout,
            locals,
            temps: Vec::new(),
            slots: Vec::new(),
            entry: vec![None; count],
            catch_entry: vec![None; count],
            blocks,
            pending: VecDeque::new(),
            offset: 0,
        }
    }

    /// Translates every block reachable from the entry or a handler.
    pub(crate) fn run(mut self, regions: Vec<ExceptionRegion>) -> Step<LoweredBody> {
        if self.layout.len() > 0 {
            self.enter_empty(0)?;
        }
        for region in &regions {
            if region.handler_start >= self.layout.len() {
                continue;
            }
            if let RegionKind::Catch(ty) = &region.kind {
                self.catch_entry[region.handler_start] = Some(ty.clone());
            }
            self.enter_empty(region.handler_start)?;
        }

        while let Some(index) = self.pending.pop_front() {
            self.translate_block(index)?;
        }

        Ok(LoweredBody {
            blocks: self.blocks,
            locals: self.locals,
            temps: self.temps,
            slots: self.slots,
            regions,
            init_locals: self.body.init_locals,
        })
    }

    fn ctx(&self) -> GenericContext<'a> {
        GenericContext::of(&self.method.inst)
    }

    fn translate_block(&mut self, index: usize) -> Step {
        let mut state = BlockState {
            index,
            ..BlockState::default()
        };

        if let Some(caught) = self.catch_entry[index].clone() {
            let dest = self.result(&mut state, caught);
            state.out.push(IrInstr::LoadException { dest });
        }
        for slot in self.entry[index].clone().unwrap_or_default() {
            let ty = self.slots[slot as usize].clone();
            let dest = self.result(&mut state, ty);
            state.out.push(IrInstr::Move {
                dest,
                value: IrValue::Slot(slot),
            });
        }

        let body = self.body;
        let range = self.layout.ranges[index].clone();
        for instruction in &body.instructions[range] {
            self.offset = instruction.offset;
            self.markers(&mut state, instruction);
            self.translate(&mut state, instruction)?;
        }

        if !state.out.last().is_some_and(IrInstr::is_terminator) {
            let next = index + 1;
            if next >= self.layout.len() {
                return Err(StubReason::StackMismatch {
                    offset: self.layout.offsets[index],
                });
            }
            self.transfer(&mut state, next)?;
        }

        self.blocks[index] = BasicBlock {
            offset: self.layout.offsets[index],
            instructions: state.out,
            reachable: true,
        };
        Ok(())
    }

    fn markers(&self, state: &mut BlockState, instruction: &Instruction) {
        if self.config.il_offset_comments() {
            state
                .out
                .push(IrInstr::Marker(Marker::IlOffset(instruction.offset)));
        }
        if !self.config.debug_line_mapping() {
            return;
        }
        let Some(points) = &self.record.sequence_points else {
            return;
        };
        let Some(point) = points
            .find_by_il_offset(instruction.offset as u32)
            .filter(|point| u64::from(point.il_offset) == instruction.offset)
        else {
            return;
        };
        if let Some(line) = point.line() {
            let document = self
                .set
                .module(self.record.module)
                .document(point.document)
                .unwrap_or("<unknown>")
                .to_string();
            state
                .out
                .push(IrInstr::Marker(Marker::Source { document, line }));
        }
    }

    #[allow(clippy::too_many_lines)]
    fn translate(&mut self, state: &mut BlockState, instruction: &Instruction) -> Step {
        let opcode = instruction.opcode;
        match (instruction.prefix, opcode) {
            // nop, break
            (0, 0x00 | 0x01) => {}
            // ldarg.0 - ldarg.3
            (0, 0x02..=0x05) => self.load_arg(state, u32::from(opcode - 0x02))?,
            // ldloc.0 - ldloc.3
            (0, 0x06..=0x09) => self.load_local(state, u32::from(opcode - 0x06))?,
            // stloc.0 - stloc.3
            (0, 0x0A..=0x0D) => self.store_local(state, u32::from(opcode - 0x0A))?,
            // ldarg.s, ldarg
            (0, 0x0E) | (0xFE, 0x09) => {
                let index = self.index(instruction)?;
                self.load_arg(state, index)?;
            }
            // ldarga.s, ldarga
            (0, 0x0F) | (0xFE, 0x0A) => {
                let index = self.index(instruction)?;
                let ty = self.arg_type(index)?;
                self.address_of(state, IrValue::Arg(index), ty);
            }
            // starg.s, starg
            (0, 0x10) | (0xFE, 0x0B) => {
                let index = self.index(instruction)?;
                let value = self.pop(state)?;
                state.out.push(IrInstr::Move {
                    dest: IrValue::Arg(index),
                    value: value.value,
                });
            }
            // ldloc.s, ldloc
            (0, 0x11) | (0xFE, 0x0C) => {
                let index = self.index(instruction)?;
                self.load_local(state, index)?;
            }
            // ldloca.s, ldloca
            (0, 0x12) | (0xFE, 0x0D) => {
                let index = self.index(instruction)?;
                let ty = self.local_type(index)?;
                self.address_of(state, IrValue::Local(index), ty);
            }
            // stloc.s, stloc
            (0, 0x13) | (0xFE, 0x0E) => {
                let index = self.index(instruction)?;
                self.store_local(state, index)?;
            }
            // ldnull
            (0, 0x14) => Self::push(state, IrValue::Null, TypeSig::Object),
            // ldc.i4.m1 - ldc.i4.8
            (0, 0x15..=0x1E) => {
                Self::push(state, IrValue::Int32(i32::from(opcode) - 0x16), TypeSig::I4);
            }
            // ldc.i4.s, ldc.i4
            (0, 0x1F | 0x20) => {
                let value = self.immediate(instruction)? as i32;
                Self::push(state, IrValue::Int32(value), TypeSig::I4);
            }
            // ldc.i8
            (0, 0x21) => {
                let value = self.immediate(instruction)?;
                Self::push(state, IrValue::Int64(value), TypeSig::I8);
            }
            // ldc.r4
            (0, 0x22) => match instruction.operand {
                Operand::Immediate(Immediate::Float32(value)) => {
                    Self::push(state, IrValue::Float32(value), TypeSig::R4);
                }
                _ => return Err(self.unresolved("missing float operand")),
            },
            // ldc.r8
            (0, 0x23) => match instruction.operand {
                Operand::Immediate(Immediate::Float64(value)) => {
                    Self::push(state, IrValue::Float64(value), TypeSig::R8);
                }
                _ => return Err(self.unresolved("missing float operand")),
            },
            // dup
            (0, 0x25) => {
                let top = self.pop(state)?;
                state.stack.push(top.clone());
                state.stack.push(top);
            }
            // pop
            (0, 0x26) => {
                self.pop(state)?;
            }
            // call
            (0, 0x28) => self.call(state, instruction, false)?,
            // callvirt
            (0, 0x6F) => self.call(state, instruction, true)?,
            // ret
            (0, 0x2A) => {
                let value = if self.method.return_type.is_void() {
                    None
                } else {
                    Some(self.pop(state)?.value)
                };
                if !state.stack.is_empty() {
                    return Err(StubReason::StackMismatch {
                        offset: instruction.offset,
                    });
                }
                state.out.push(IrInstr::Return { value });
            }
            // br.s, br
            (0, 0x2B | 0x38) => {
                let target = self.branch_target(instruction)?;
                self.transfer(state, target)?;
                state.out.push(IrInstr::Branch { target });
            }
            // brfalse.s, brfalse, brtrue.s, brtrue
            (0, 0x2C | 0x39 | 0x2D | 0x3A) => {
                let cond = self.pop(state)?;
                let negate = matches!(opcode, 0x2C | 0x39);
                self.branch_if(state, instruction, cond.value, negate)?;
            }
            // beq.s .. blt.un.s
            (0, 0x2E..=0x37) => {
                let op = BRANCH_COMPARISONS[usize::from(opcode - 0x2E)];
                let cond = self.compare(state, op)?;
                self.pop(state)?;
                self.branch_if(state, instruction, cond, false)?;
            }
            // beq .. blt.un
            (0, 0x3B..=0x44) => {
                let op = BRANCH_COMPARISONS[usize::from(opcode - 0x3B)];
                let cond = self.compare(state, op)?;
                self.pop(state)?;
                self.branch_if(state, instruction, cond, false)?;
            }
            // switch
            (0, 0x45) => {
                let value = self.pop(state)?;
                let mut targets = Vec::with_capacity(instruction.branch_targets.len());
                for &offset in &instruction.branch_targets {
                    targets.push(self.block_of(offset)?);
                }
                for &target in &targets {
                    self.transfer(state, target)?;
                }
                let next = state.index + 1;
                self.transfer(state, next)?;
                state.out.push(IrInstr::Switch {
                    value: value.value,
                    targets,
                });
            }
            // ldind.i1 .. ldind.r8
            (0, 0x46..=0x4F) => {
                let ty = LOAD_TYPES[usize::from(opcode - 0x46)].clone();
                self.load_indirect(state, ty)?;
            }
            // ldind.ref
            (0, 0x50) => {
                let address = self.peek(state)?;
                let ty = pointee(&address.ty).unwrap_or(TypeSig::Object);
                self.load_indirect(state, ty)?;
            }
            // stind.ref
            (0, 0x51) => {
                let value = self.pop(state)?;
                let address = self.pop(state)?;
                let ty = pointee(&address.ty).unwrap_or(TypeSig::Object);
                state.out.push(IrInstr::StoreIndirect {
                    address: address.value,
                    value: value.value,
                    ty,
                });
            }
            // stind.i1 .. stind.r8
            (0, 0x52..=0x57) => {
                let ty = STORE_TYPES[usize::from(opcode - 0x52)].clone();
                self.store_indirect(state, ty)?;
            }
            // stind.i
            (0, 0xDF) => self.store_indirect(state, TypeSig::I)?,
            // add .. shr.un
            (0, 0x58..=0x64) => self.binary(state, ARITHMETIC[usize::from(opcode - 0x58)])?,
            // neg
            (0, 0x65) => self.unary(state, UnaryOp::Neg)?,
            // not
            (0, 0x66) => self.unary(state, UnaryOp::Not)?,
            // conv.i1, conv.i2, conv.i4, conv.i8
            (0, 0x67) => self.convert(state, TypeSig::I1, Overflow::None, false)?,
            (0, 0x68) => self.convert(state, TypeSig::I2, Overflow::None, false)?,
            (0, 0x69) => self.convert(state, TypeSig::I4, Overflow::None, false)?,
            (0, 0x6A) => self.convert(state, TypeSig::I8, Overflow::None, false)?,
            // conv.r4, conv.r8
            (0, 0x6B) => self.convert(state, TypeSig::R4, Overflow::None, false)?,
            (0, 0x6C) => self.convert(state, TypeSig::R8, Overflow::None, false)?,
            // conv.u4, conv.u8
            (0, 0x6D) => self.convert(state, TypeSig::U4, Overflow::None, false)?,
            (0, 0x6E) => self.convert(state, TypeSig::U8, Overflow::None, false)?,
            // conv.u2, conv.u1, conv.i, conv.u
            (0, 0xD1) => self.convert(state, TypeSig::U2, Overflow::None, false)?,
            (0, 0xD2) => self.convert(state, TypeSig::U1, Overflow::None, false)?,
            (0, 0xD3) => self.convert(state, TypeSig::I, Overflow::None, false)?,
            (0, 0xE0) => self.convert(state, TypeSig::U, Overflow::None, false)?,
            // conv.r.un
            (0, 0x76) => self.convert(state, TypeSig::R8, Overflow::None, true)?,
            // conv.ovf.i1.un .. conv.ovf.u.un
            (0, 0x82..=0x8B) => {
                let to = UNSIGNED_CHECKED[usize::from(opcode - 0x82)].clone();
                self.convert(state, to, Overflow::Unsigned, false)?;
            }
            // conv.ovf.i1 .. conv.ovf.u8
            (0, 0xB3..=0xBA) => {
                let to = SIGNED_CHECKED[usize::from(opcode - 0xB3)].clone();
                self.convert(state, to, Overflow::Signed, false)?;
            }
            // conv.ovf.i, conv.ovf.u
            (0, 0xD4) => self.convert(state, TypeSig::I, Overflow::Signed, false)?,
            (0, 0xD5) => self.convert(state, TypeSig::U, Overflow::Signed, false)?,
            // add.ovf, add.ovf.un, mul.ovf, mul.ovf.un, sub.ovf, sub.ovf.un
            (0, 0xD6) => self.binary(state, BinaryOp::AddOvf)?,
            (0, 0xD7) => self.binary(state, BinaryOp::AddOvfUn)?,
            (0, 0xD8) => self.binary(state, BinaryOp::MulOvf)?,
            (0, 0xD9) => self.binary(state, BinaryOp::MulOvfUn)?,
            (0, 0xDA) => self.binary(state, BinaryOp::SubOvf)?,
            (0, 0xDB) => self.binary(state, BinaryOp::SubOvfUn)?,
            // cpobj
            (0, 0x70) => {
                let ty = self.type_operand(instruction)?;
                let source = self.pop(state)?;
                let dest = self.pop(state)?;
                state.out.push(IrInstr::CopyObject {
                    dest: dest.value,
                    source: source.value,
                    ty,
                });
            }
            // ldobj
            (0, 0x71) => {
                let ty = self.type_operand(instruction)?;
                self.load_indirect(state, ty)?;
            }
            // stobj
            (0, 0x81) => {
                let ty = self.type_operand(instruction)?;
                self.store_indirect(state, ty)?;
            }
            // ldstr
            (0, 0x72) => {
                let token = self.token(instruction)?;
                let literal = self
                    .set
                    .user_string(self.record.module, token)
                    .map_err(|error| self.unresolved(error))?
                    .to_string();
                Self::push(state, IrValue::String(literal), TypeSig::String);
            }
            // newobj
            (0, 0x73) => self.new_object(state, instruction)?,
            // castclass, isinst
            (0, 0x74 | 0x75) => {
                let ty = self.type_operand(instruction)?;
                let object = self.pop(state)?;
                let result_type = if self.set.is_value_type(&ty) {
                    TypeSig::Object
                } else {
                    ty.clone()
                };
                let dest = self.result(state, result_type);
                state.out.push(if opcode == 0x74 {
                    IrInstr::CastClass {
                        dest,
                        object: object.value,
                        ty,
                    }
                } else {
                    IrInstr::IsInst {
                        dest,
                        object: object.value,
                        ty,
                    }
                });
            }
            // unbox
            (0, 0x79) => {
                let ty = self.type_operand(instruction)?;
                let object = self.pop(state)?;
                let dest = self.result(state, TypeSig::ByRef(Box::new(ty.clone())));
                state.out.push(IrInstr::Unbox {
                    dest,
                    object: object.value,
                    ty,
                });
            }
            // unbox.any
            (0, 0xA5) => {
                let ty = self.type_operand(instruction)?;
                let object = self.pop(state)?;
                if self.set.is_value_type(&ty) {
                    let result_type = self.stack_type(&ty);
                    let dest = self.result(state, result_type);
                    state.out.push(IrInstr::UnboxAny {
                        dest,
                        object: object.value,
                        ty,
                    });
                } else {
                    let dest = self.result(state, ty.clone());
                    state.out.push(IrInstr::CastClass {
                        dest,
                        object: object.value,
                        ty,
                    });
                }
            }
            // throw
            (0, 0x7A) => {
                let value = self.pop(state)?;
                state.stack.clear();
                state.out.push(IrInstr::Throw { value: value.value });
            }
            // ldfld, ldflda
            (0, 0x7B | 0x7C) => {
                let field = self.field_operand(instruction)?;
                let object = self.pop(state)?;
                if opcode == 0x7B {
                    let result_type = self.stack_type(&field.ty);
                    let dest = self.result(state, result_type);
                    state.out.push(IrInstr::LoadField {
                        dest,
                        object: object.value,
                        field,
                    });
                } else {
                    let dest = self.result(state, TypeSig::ByRef(Box::new(field.ty.clone())));
                    state.out.push(IrInstr::LoadFieldAddress {
                        dest,
                        object: object.value,
                        field,
                    });
                }
            }
            // stfld
            (0, 0x7D) => {
                let field = self.field_operand(instruction)?;
                let value = self.pop(state)?;
                let object = self.pop(state)?;
                state.out.push(IrInstr::StoreField {
                    object: object.value,
                    field,
                    value: value.value,
                });
            }
            // ldsfld, ldsflda
            (0, 0x7E | 0x7F) => {
                let field = self.field_operand(instruction)?;
                self.ensure_initialized(state, field.owner);
                if opcode == 0x7E {
                    let result_type = self.stack_type(&field.ty);
                    let dest = self.result(state, result_type);
                    state.out.push(IrInstr::LoadStatic { dest, field });
                } else {
                    let dest = self.result(state, TypeSig::ByRef(Box::new(field.ty.clone())));
                    state.out.push(IrInstr::LoadStaticAddress { dest, field });
                }
            }
            // stsfld
            (0, 0x80) => {
                let field = self.field_operand(instruction)?;
                self.ensure_initialized(state, field.owner);
                let value = self.pop(state)?;
                state.out.push(IrInstr::StoreStatic {
                    field,
                    value: value.value,
                });
            }
            // box
            (0, 0x8C) => {
                let ty = self.type_operand(instruction)?;
                let value = self.pop(state)?;
                if self.set.is_value_type(&ty) {
                    let dest = self.result(state, TypeSig::Object);
                    state.out.push(IrInstr::Box {
                        dest,
                        value: value.value,
                        ty,
                    });
                } else {
                    state.stack.push(value);
                }
            }
            // newarr
            (0, 0x8D) => {
                let element = self.type_operand(instruction)?;
                let length = self.pop(state)?;
                let dest = self.result(state, TypeSig::SzArray(Box::new(element.clone())));
                state.out.push(IrInstr::NewArray {
                    dest,
                    element,
                    length: length.value,
                });
            }
            // ldlen
            (0, 0x8E) => {
                let array = self.pop(state)?;
                let dest = self.result(state, TypeSig::I);
                state.out.push(IrInstr::ArrayLength {
                    dest,
                    array: array.value,
                });
            }
            // ldelema
            (0, 0x8F) => {
                let element = self.type_operand(instruction)?;
                let index = self.pop(state)?;
                let array = self.pop(state)?;
                let dest = self.result(state, TypeSig::ByRef(Box::new(element.clone())));
                state.out.push(IrInstr::LoadElementAddress {
                    dest,
                    array: array.value,
                    index: index.value,
                    element,
                });
            }
            // ldelem.i1 .. ldelem.r8
            (0, 0x90..=0x99) => {
                let element = LOAD_TYPES[usize::from(opcode - 0x90)].clone();
                self.load_element(state, Some(element))?;
            }
            // ldelem.ref
            (0, 0x9A) => self.load_element(state, None)?,
            // ldelem
            (0, 0xA3) => {
                let element = self.type_operand(instruction)?;
                self.load_element(state, Some(element))?;
            }
            // stelem.i .. stelem.r8
            (0, 0x9B..=0xA1) => {
                let element = STORE_ELEMENT_TYPES[usize::from(opcode - 0x9B)].clone();
                self.store_element(state, Some(element))?;
            }
            // stelem.ref
            (0, 0xA2) => self.store_element(state, None)?,
            // stelem
            (0, 0xA4) => {
                let element = self.type_operand(instruction)?;
                self.store_element(state, Some(element))?;
            }
            // ckfinite
            (0, 0xC3) => {
                let value = self.pop(state)?;
                let dest = self.result(state, TypeSig::R8);
                state.out.push(IrInstr::CheckFinite {
                    dest,
                    value: value.value,
                });
            }
            // ldtoken
            (0, 0xD0) => {
                let token = self.token(instruction)?;
                let dest = self.result(state, TypeSig::I);
                if token.is_table(TableId::TypeDef)
                    || token.is_table(TableId::TypeRef)
                    || token.is_table(TableId::TypeSpec)
                {
                    let ty = self.resolve_type(token)?;
                    state.out.push(IrInstr::LoadToken { dest, ty });
                } else {
                    log::trace!(
                        "{}: member handle at IL_{:04x} lowered to null",
                        self.method.full_name,
                        instruction.offset
                    );
                    state.out.push(IrInstr::Move {
                        dest,
                        value: IrValue::Null,
                    });
                }
            }
            // endfinally
            (0, 0xDC) => {
                state.stack.clear();
                state.out.push(IrInstr::EndFinally);
            }
            // leave, leave.s
            (0, 0xDD | 0xDE) => {
                state.stack.clear();
                let target = self.branch_target(instruction)?;
                self.enter_empty(target)?;
                state.out.push(IrInstr::Leave { target });
            }
            // ceq, cgt, cgt.un, clt, clt.un
            (0xFE, 0x01..=0x05) => {
                let op = match opcode {
                    0x01 => CompareOp::Eq,
                    0x02 => CompareOp::Gt,
                    0x03 => CompareOp::GtUn,
                    0x04 => CompareOp::Lt,
                    _ => CompareOp::LtUn,
                };
                self.compare(state, op)?;
            }
            // ldftn
            (0xFE, 0x06) => {
                let inst = self.resolve_method(self.token(instruction)?)?;
                let target = CallTarget::Direct(self.ir_method(&inst)?);
                let dest = self.result(state, TypeSig::I);
                state.out.push(IrInstr::LoadFunction {
                    dest,
                    target,
                    object: None,
                });
            }
            // ldvirtftn
            (0xFE, 0x07) => {
                let inst = self.resolve_method(self.token(instruction)?)?;
                let object = self.pop(state)?;
                let target = self.dispatch(&inst)?;
                let dest = self.result(state, TypeSig::I);
                state.out.push(IrInstr::LoadFunction {
                    dest,
                    target,
                    object: Some(object.value),
                });
            }
            // initobj
            (0xFE, 0x15) => {
                let ty = self.type_operand(instruction)?;
                let address = self.pop(state)?;
                state.out.push(IrInstr::InitObj {
                    address: address.value,
                    ty,
                });
            }
            // constrained.
            (0xFE, 0x16) => {
                state.constraint = Some(self.type_operand(instruction)?);
            }
            // cpblk
            (0xFE, 0x17) => {
                let size = self.pop(state)?;
                let source = self.pop(state)?;
                let dest = self.pop(state)?;
                state.out.push(IrInstr::CopyBlock {
                    dest: dest.value,
                    source: source.value,
                    size: size.value,
                });
            }
            // initblk
            (0xFE, 0x18) => {
                let size = self.pop(state)?;
                let value = self.pop(state)?;
                let address = self.pop(state)?;
                state.out.push(IrInstr::InitBlock {
                    address: address.value,
                    value: value.value,
                    size: size.value,
                });
            }
            // rethrow
            (0xFE, 0x1A) => {
                state.stack.clear();
                state.out.push(IrInstr::Rethrow);
            }
            // sizeof
            (0xFE, 0x1C) => {
                let ty = self.type_operand(instruction)?;
                let dest = self.result(state, TypeSig::I4);
                state.out.push(IrInstr::SizeOf { dest, ty });
            }
            // unaligned., volatile., tail., no., readonly.
            (0xFE, 0x12 | 0x13 | 0x14 | 0x19 | 0x1E) => {}
            _ => {
                return Err(StubReason::Unsupported {
                    offset: instruction.offset,
                    instruction: instruction.to_string(),
                })
            }
        }
        Ok(())
    }

    // Stack

    fn temp(&mut self, ty: TypeSig) -> IrValue {
        let index = self.temps.len() as u32;
        self.temps.push(ty);
        IrValue::Temp(index)
    }

    /// Allocates a temporary of type `ty` and pushes it.
    fn result(&mut self, state: &mut BlockState, ty: TypeSig) -> IrValue {
        let value = self.temp(ty.clone());
        state.stack.push(StackValue {
            value: value.clone(),
            ty,
        });
        value
    }

    fn push(state: &mut BlockState, value: IrValue, ty: TypeSig) {
        state.stack.push(StackValue { value, ty });
    }

    fn pop(&self, state: &mut BlockState) -> Step<StackValue> {
        state.stack.pop().ok_or(StubReason::StackMismatch {
            offset: self.offset,
        })
    }

    fn peek(&self, state: &BlockState) -> Step<StackValue> {
        state.stack.last().cloned().ok_or(StubReason::StackMismatch {
            offset: self.offset,
        })
    }

    fn pop_values(&self, state: &mut BlockState, count: usize) -> Step<Vec<IrValue>> {
        if state.stack.len() < count {
            return Err(StubReason::StackMismatch {
                offset: self.offset,
            });
        }
        let split = state.stack.len() - count;
        Ok(state
            .stack
            .split_off(split)
            .into_iter()
            .map(|value| value.value)
            .collect())
    }

    /// Type a value of type `ty` has on the evaluation stack.
    fn stack_type(&self, ty: &TypeSig) -> TypeSig {
        match ty {
            TypeSig::Boolean
            | TypeSig::Char
            | TypeSig::I1
            | TypeSig::U1
            | TypeSig::I2
            | TypeSig::U2
            | TypeSig::I4
            | TypeSig::U4 => TypeSig::I4,
            TypeSig::I8 | TypeSig::U8 => TypeSig::I8,
            TypeSig::U => TypeSig::I,
            TypeSig::Named(id, _) => match self.set.enum_underlying(*id) {
                Some(underlying) => self.stack_type(&underlying),
                None => ty.clone(),
            },
            _ => ty.clone(),
        }
    }

    fn is_object(&self, ty: &TypeSig) -> bool {
        match ty {
            TypeSig::Object | TypeSig::String | TypeSig::SzArray(_) | TypeSig::Array(..) => true,
            TypeSig::Named(..) => !self.set.is_value_type(ty),
            _ => false,
        }
    }

    /// Type of a slot receiving values of both `slot` and `incoming`.
    fn merge(&self, slot: &TypeSig, incoming: &TypeSig) -> Option<TypeSig> {
        if slot == incoming {
            return Some(slot.clone());
        }
        if self.is_object(slot) && self.is_object(incoming) {
            return Some(TypeSig::Object);
        }
        match (slot, incoming) {
            (TypeSig::I, TypeSig::I4) | (TypeSig::I4, TypeSig::I) => Some(TypeSig::I),
            (TypeSig::R4, TypeSig::R8) | (TypeSig::R8, TypeSig::R4) => Some(TypeSig::R8),
            (TypeSig::Ptr(_) | TypeSig::ByRef(_), TypeSig::I | TypeSig::Ptr(_) | TypeSig::ByRef(_)) => {
                Some(slot.clone())
            }
            (TypeSig::I, TypeSig::Ptr(_) | TypeSig::ByRef(_)) => Some(TypeSig::I),
            _ => None,
        }
    }

    // Control flow

    /// Copies the live stack into the entry slots of `target`.
    fn transfer(&mut self, state: &mut BlockState, target: usize) -> Step {
        if target >= self.layout.len() {
            return Err(StubReason::StackMismatch {
                offset: self.offset,
            });
        }

        let slots = match self.entry[target].clone() {
            None => {
                let mut slots = Vec::with_capacity(state.stack.len());
                for value in &state.stack {
                    slots.push(self.slots.len() as u32);
                    self.slots.push(value.ty.clone());
                }
                self.entry[target] = Some(slots.clone());
                self.pending.push_back(target);
                slots
            }
            Some(slots) => {
                if slots.len() != state.stack.len() {
                    return Err(StubReason::StackMismatch {
                        offset: self.layout.offsets[target],
                    });
                }
                for (&slot, value) in slots.iter().zip(&state.stack) {
                    let current = &self.slots[slot as usize];
                    let merged =
                        self.merge(current, &value.ty)
                            .ok_or(StubReason::StackMismatch {
                                offset: self.layout.offsets[target],
                            })?;
                    self.slots[slot as usize] = merged;
                }
                slots
            }
        };

        for (slot, value) in slots.into_iter().zip(&state.stack) {
            state.out.push(IrInstr::Move {
                dest: IrValue::Slot(slot),
                value: value.value.clone(),
            });
        }
        Ok(())
    }

    /// Marks `target` as entered with an empty stack.
    fn enter_empty(&mut self, target: usize) -> Step {
        match self.entry[target].as_ref().map(Vec::is_empty) {
            None => {
                self.entry[target] = Some(Vec::new());
                self.pending.push_back(target);
                Ok(())
            }
            Some(true) => Ok(()),
            Some(false) => Err(StubReason::StackMismatch {
                offset: self.layout.offsets[target],
            }),
        }
    }

    fn branch_if(
        &mut self,
        state: &mut BlockState,
        instruction: &Instruction,
        cond: IrValue,
        negate: bool,
    ) -> Step {
        let target = self.branch_target(instruction)?;
        self.transfer(state, target)?;
        let next = state.index + 1;
        self.transfer(state, next)?;
        state.out.push(IrInstr::BranchIf {
            cond,
            negate,
            target,
        });
        Ok(())
    }

    fn branch_target(&self, instruction: &Instruction) -> Step<usize> {
        let offset = instruction
            .branch_targets
            .first()
            .copied()
            .ok_or_else(|| self.unresolved("missing branch target"))?;
        self.block_of(offset)
    }

    fn block_of(&self, offset: u64) -> Step<usize> {
        self.layout
            .block_at(offset)
            .ok_or_else(|| self.unresolved(format!("no block at IL_{offset:04x}")))
    }

    /// Runs the static constructor of `ty` once per block, except inside `ty` itself.
    fn ensure_initialized(&self, state: &mut BlockState, ty: IrTypeId) {
        if ty == self.method.declaring || self.ir.ty(ty).static_constructor.is_none() {
            return;
        }
        if state.guarded.insert(ty) {
            state.out.push(IrInstr::EnsureClassInit { ty });
        }
    }

    // Values

    fn load_arg(&mut self, state: &mut BlockState, index: u32) -> Step {
        let ty = self.arg_type(index)?;
        let ty = self.stack_type(&ty);
        let dest = self.result(state, ty);
        state.out.push(IrInstr::Move {
            dest,
            value: IrValue::Arg(index),
        });
        Ok(())
    }

    fn load_local(&mut self, state: &mut BlockState, index: u32) -> Step {
        let ty = self.local_type(index)?;
        let ty = self.stack_type(&ty);
        let dest = self.result(state, ty);
        state.out.push(IrInstr::Move {
            dest,
            value: IrValue::Local(index),
        });
        Ok(())
    }

    fn store_local(&mut self, state: &mut BlockState, index: u32) -> Step {
        self.local_type(index)?;
        let value = self.pop(state)?;
        state.out.push(IrInstr::Move {
            dest: IrValue::Local(index),
            value: value.value,
        });
        Ok(())
    }

    fn address_of(&mut self, state: &mut BlockState, of: IrValue, ty: TypeSig) {
        let dest = self.result(state, TypeSig::ByRef(Box::new(ty)));
        state.out.push(IrInstr::LoadAddress { dest, of });
    }

    fn arg_type(&self, index: u32) -> Step<TypeSig> {
        self.method
            .arg_type(index as usize)
            .cloned()
            .ok_or_else(|| self.unresolved(format!("argument {index} out of range")))
    }

    fn local_type(&self, index: u32) -> Step<TypeSig> {
        self.locals
            .get(index as usize)
            .cloned()
            .ok_or_else(|| self.unresolved(format!("local {index} out of range")))
    }

    fn load_indirect(&mut self, state: &mut BlockState, ty: TypeSig) -> Step {
        let address = self.pop(state)?;
        let result_type = self.stack_type(&ty);
        let dest = self.result(state, result_type);
        state.out.push(IrInstr::LoadIndirect {
            dest,
            address: address.value,
            ty,
        });
        Ok(())
    }

    fn store_indirect(&mut self, state: &mut BlockState, ty: TypeSig) -> Step {
        let value = self.pop(state)?;
        let address = self.pop(state)?;
        state.out.push(IrInstr::StoreIndirect {
            address: address.value,
            value: value.value,
            ty,
        });
        Ok(())
    }

    fn load_element(&mut self, state: &mut BlockState, element: Option<TypeSig>) -> Step {
        let index = self.pop(state)?;
        let array = self.pop(state)?;
        let element = element
            .or_else(|| array.ty.element_type().cloned())
            .unwrap_or(TypeSig::Object);
        let result_type = self.stack_type(&element);
        let dest = self.result(state, result_type);
        state.out.push(IrInstr::LoadElement {
            dest,
            array: array.value,
            index: index.value,
            element,
        });
        Ok(())
    }

    fn store_element(&mut self, state: &mut BlockState, element: Option<TypeSig>) -> Step {
        let value = self.pop(state)?;
        let index = self.pop(state)?;
        let array = self.pop(state)?;
        let element = element
            .or_else(|| array.ty.element_type().cloned())
            .unwrap_or(TypeSig::Object);
        state.out.push(IrInstr::StoreElement {
            array: array.value,
            index: index.value,
            value: value.value,
            element,
        });
        Ok(())
    }

    fn binary(&mut self, state: &mut BlockState, op: BinaryOp) -> Step {
        let right = self.pop(state)?;
        let left = self.pop(state)?;
        let ty = match op {
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::ShrUn => left.ty.clone(),
            _ => binary_type(&left.ty, &right.ty),
        };
        let dest = self.result(state, ty);
        state.out.push(IrInstr::Binary {
            dest,
            op,
            left: left.value,
            right: right.value,
        });
        Ok(())
    }

    fn unary(&mut self, state: &mut BlockState, op: UnaryOp) -> Step {
        let value = self.pop(state)?;
        let dest = self.result(state, value.ty);
        state.out.push(IrInstr::Unary {
            dest,
            op,
            value: value.value,
        });
        Ok(())
    }

    /// Pushes the comparison result and returns it.
    fn compare(&mut self, state: &mut BlockState, op: CompareOp) -> Step<IrValue> {
        let right = self.pop(state)?;
        let left = self.pop(state)?;
        let dest = self.result(state, TypeSig::I4);
        state.out.push(IrInstr::Compare {
            dest: dest.clone(),
            op,
            left: left.value,
            right: right.value,
        });
        Ok(dest)
    }

    fn convert(
        &mut self,
        state: &mut BlockState,
        to: TypeSig,
        overflow: Overflow,
        unsigned_source: bool,
    ) -> Step {
        let value = self.pop(state)?;
        let result_type = self.stack_type(&to);
        let dest = self.result(state, result_type);
        state.out.push(IrInstr::Convert {
            dest,
            value: value.value,
            to,
            overflow,
            unsigned_source,
        });
        Ok(())
    }

    // Calls

    fn call(&mut self, state: &mut BlockState, instruction: &Instruction, virtual_call: bool) -> Step {
        let inst = self.resolve_method(self.token(instruction)?)?;
        let record = self.set.method(inst.method);
        let constraint = state.constraint.take();
        if record.is_static() && record.is_abstract() && constraint.is_some() {
            return Err(StubReason::StaticAbstractDispatch {
                offset: instruction.offset,
            });
        }

        let mut signature = self.call_signature(&inst)?;
        let mut args = self.pop_values(state, signature.params.len())?;
        let mut receiver = match signature.this_type {
            Some(_) => Some(self.pop(state)?),
            None => None,
        };

        let target = match (virtual_call, constraint, receiver.as_mut()) {
            (true, Some(constraint), Some(receiver)) => {
                self.constrained(state, &constraint, &inst, receiver, &mut signature)?
            }
            (true, _, _) => self.dispatch(&inst)?,
            (false, _, _) => {
                if record.is_static() {
                    let owner = self.owner_of(&inst);
                    let owner = self.ir_type(&owner)?;
                    self.ensure_initialized(state, owner);
                }
                CallTarget::Direct(self.ir_method(&inst)?)
            }
        };

        if let Some(receiver) = receiver {
            args.insert(0, receiver.value);
        }
        let dest = if signature.return_type.is_void() {
            None
        } else {
            let result_type = self.stack_type(&signature.return_type);
            Some(self.result(state, result_type))
        };
        state.out.push(IrInstr::Call {
            dest,
            target,
            signature,
            args,
        });
        Ok(())
    }

    /// Resolves a `constrained.` call on a managed pointer to `constraint`.
    fn constrained(
        &mut self,
        state: &mut BlockState,
        constraint: &TypeSig,
        inst: &MethodInst,
        receiver: &mut StackValue,
        signature: &mut CallSignature,
    ) -> Step<CallTarget> {
        if !self.set.is_value_type(constraint) {
            let dest = self.temp(constraint.clone());
            state.out.push(IrInstr::LoadIndirect {
                dest: dest.clone(),
                address: receiver.value.clone(),
                ty: constraint.clone(),
            });
            *receiver = StackValue {
                value: dest,
                ty: constraint.clone(),
            };
            return self.dispatch(inst);
        }

        // a method declared on the value type itself takes the pointer as `this`
        let record = self.set.method(inst.method);
        let own_type = self.set.type_def_of(constraint);
        let implementation = if record.is_virtual() {
            self.set
                .find_override(constraint, inst)
                .map_err(|error| self.unresolved(error))?
        } else {
            Some(inst.clone())
        };
        if let Some(implementation) = implementation {
            if own_type == Some(self.set.method(implementation.method).declaring_type) {
                *signature = self.call_signature(&implementation)?;
                return Ok(CallTarget::Direct(self.ir_method(&implementation)?));
            }
        }

        let value = self.temp(constraint.clone());
        state.out.push(IrInstr::LoadIndirect {
            dest: value.clone(),
            address: receiver.value.clone(),
            ty: constraint.clone(),
        });
        let boxed = self.temp(TypeSig::Object);
        state.out.push(IrInstr::Box {
            dest: boxed.clone(),
            value,
            ty: constraint.clone(),
        });
        *receiver = StackValue {
            value: boxed,
            ty: TypeSig::Object,
        };
        self.dispatch(inst)
    }

    /// Call target of a `callvirt` or `ldvirtftn` on `inst`.
    fn dispatch(&self, inst: &MethodInst) -> Step<CallTarget> {
        let record = self.set.method(inst.method);
        let declaring = self.set.type_record(record.declaring_type);
        if !record.is_virtual()
            || record.flags.contains(MethodAttributes::FINAL)
            || declaring.is_sealed()
        {
            return Ok(CallTarget::Direct(self.ir_method(inst)?));
        }
        if !inst.method_args.is_empty() {
            return Err(StubReason::GenericVirtualCall {
                offset: self.offset,
            });
        }

        let owner = self.ir_type(&self.owner_of(inst))?;
        if declaring.is_interface() {
            let slot = interface_slots(self.set, record.declaring_type)
                .iter()
                .position(|&method| method == inst.method)
                .ok_or_else(|| {
                    self.unresolved(format!("'{}' has no interface slot", record.name))
                })?;
            return Ok(CallTarget::Interface {
                interface: owner,
                slot,
            });
        }

        let ty = self.ir.ty(owner);
        let implementation = self.ir.method_of(inst);
        let slot = ty
            .vtable_slot_of(inst)
            .or_else(|| {
                implementation.and_then(|implementation| {
                    ty.vtable
                        .iter()
                        .position(|slot| slot.implementation == Some(implementation))
                })
            })
            .ok_or_else(|| self.unresolved(format!("'{}' has no vtable slot", record.name)))?;
        Ok(CallTarget::Virtual { owner, slot })
    }

    fn new_object(&mut self, state: &mut BlockState, instruction: &Instruction) -> Step {
        let inst = self.resolve_method(self.token(instruction)?)?;
        let owner = self.owner_of(&inst);
        let ty = self.ir_type(&owner)?;
        self.ensure_initialized(state, ty);

        let signature = self.call_signature(&inst)?;
        let args = self.pop_values(state, signature.params.len())?;
        let constructor = self.ir_method(&inst)?;
        let result_type = self.stack_type(&owner);
        let dest = self.result(state, result_type);
        state.out.push(IrInstr::NewObject {
            dest,
            ty,
            constructor,
            args,
        });
        Ok(())
    }

    fn call_signature(&self, inst: &MethodInst) -> Step<CallSignature> {
        let resolved = self
            .set
            .method_signature(inst)
            .map_err(|error| self.unresolved(error))?;
        let this_type = resolved.has_this.then(|| {
            let owner = self.owner_of(inst);
            if self.set.is_value_type(&owner) {
                TypeSig::ByRef(Box::new(owner))
            } else {
                owner
            }
        });
        Ok(CallSignature {
            this_type,
            params: resolved.params,
            return_type: resolved.return_type,
        })
    }

    fn owner_of(&self, inst: &MethodInst) -> TypeSig {
        let declaring = self.set.method(inst.method).declaring_type;
        self.set.def_sig(declaring, inst.type_args.clone())
    }

    // Operands

    fn unresolved(&self, detail: impl Display) -> StubReason {
        StubReason::Unresolved {
            offset: self.offset,
            detail: detail.to_string(),
        }
    }

    fn token(&self, instruction: &Instruction) -> Step<Token> {
        instruction
            .token()
            .ok_or_else(|| self.unresolved("missing token operand"))
    }

    fn immediate(&self, instruction: &Instruction) -> Step<i64> {
        instruction
            .immediate()
            .ok_or_else(|| self.unresolved("missing immediate operand"))
    }

    fn index(&self, instruction: &Instruction) -> Step<u32> {
        let value = self.immediate(instruction)?;
        u32::try_from(value).map_err(|_| self.unresolved(format!("invalid index {value}")))
    }

    fn resolve_type(&self, token: Token) -> Step<TypeSig> {
        self.set
            .resolve_type(self.record.module, token, &self.ctx())
            .map_err(|error| self.unresolved(error))
    }

    fn type_operand(&self, instruction: &Instruction) -> Step<TypeSig> {
        self.resolve_type(self.token(instruction)?)
    }

    fn resolve_method(&self, token: Token) -> Step<MethodInst> {
        self.set
            .resolve_method(self.record.module, token, &self.ctx())
            .map_err(|error| self.unresolved(error))
    }

    fn field_operand(&self, instruction: &Instruction) -> Step<FieldAccess> {
        let token = self.token(instruction)?;
        let field = self
            .set
            .resolve_field(self.record.module, token, &self.ctx())
            .map_err(|error| self.unresolved(error))?;
        let ty = self
            .set
            .field_type(&field)
            .map_err(|error| self.unresolved(error))?;
        Ok(FieldAccess {
            owner: self.ir_type(&field.owner)?,
            field: field.field,
            ty,
        })
    }

    fn ir_type(&self, ty: &TypeSig) -> Step<IrTypeId> {
        self.ir.type_of(ty).ok_or_else(|| {
            self.unresolved(format!("type '{}' is not compiled", self.set.type_name(ty)))
        })
    }

    fn ir_method(&self, inst: &MethodInst) -> Step<IrMethodId> {
        self.ir.method_of(inst).ok_or_else(|| {
            let name = self
                .set
                .method_name(inst)
                .unwrap_or_else(|_| self.set.method(inst.method).name.clone());
            self.unresolved(format!("method '{name}' is not compiled"))
        })
    }
}

/// Pointed-to type of a pointer or managed reference.
fn pointee(ty: &TypeSig) -> Option<TypeSig> {
    match ty {
        TypeSig::Ptr(inner) | TypeSig::ByRef(inner) => Some(inner.as_ref().clone()),
        _ => None,
    }
}

/// Result type of an arithmetic operation on stack types.
fn binary_type(left: &TypeSig, right: &TypeSig) -> TypeSig {
    match (left, right) {
        (TypeSig::R8, _) | (_, TypeSig::R8) => TypeSig::R8,
        (TypeSig::R4, _) | (_, TypeSig::R4) => TypeSig::R4,
        (TypeSig::I8, _) | (_, TypeSig::I8) => TypeSig::I8,
        (TypeSig::Ptr(_) | TypeSig::ByRef(_), TypeSig::Ptr(_) | TypeSig::ByRef(_)) => TypeSig::I,
        (TypeSig::Ptr(_) | TypeSig::ByRef(_), _) => left.clone(),
        (_, TypeSig::Ptr(_) | TypeSig::ByRef(_)) => right.clone(),
        (TypeSig::I, _) | (_, TypeSig::I) => TypeSig::I,
        _ => TypeSig::I4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_result_types() {
        assert_eq!(binary_type(&TypeSig::I4, &TypeSig::I4), TypeSig::I4);
        assert_eq!(binary_type(&TypeSig::I4, &TypeSig::I), TypeSig::I);
        assert_eq!(binary_type(&TypeSig::I8, &TypeSig::I8), TypeSig::I8);
        assert_eq!(binary_type(&TypeSig::R4, &TypeSig::R8), TypeSig::R8);

        let pointer = TypeSig::ByRef(Box::new(TypeSig::U1));
        assert_eq!(binary_type(&pointer, &TypeSig::I4), pointer);
        assert_eq!(binary_type(&pointer, &pointer), TypeSig::I);
    }

    #[test]
    fn opcode_tables_follow_encoding() {
        // bne.un.s is 0x33, blt.un is 0x44
        assert_eq!(BRANCH_COMPARISONS[0x33 - 0x2E], CompareOp::Ne);
        assert_eq!(BRANCH_COMPARISONS[0x44 - 0x3B], CompareOp::LtUn);
        // rem.un is 0x5E, shr.un is 0x64
        assert_eq!(ARITHMETIC[0x5E - 0x58], BinaryOp::RemUn);
        assert_eq!(ARITHMETIC[0x64 - 0x58], BinaryOp::ShrUn);
        // ldind.r8 is 0x4F, ldelem.u4 is 0x95
        assert_eq!(LOAD_TYPES[0x4F - 0x46], TypeSig::R8);
        assert_eq!(LOAD_TYPES[0x95 - 0x90], TypeSig::U4);
        // stelem.i4 is 0x9E, conv.ovf.u4.un is 0x88
        assert_eq!(STORE_ELEMENT_TYPES[0x9E - 0x9B], TypeSig::I4);
        assert_eq!(UNSIGNED_CHECKED[0x88 - 0x82], TypeSig::U4);
        assert_eq!(pointee(&TypeSig::Ptr(Box::new(TypeSig::I2))), Some(TypeSig::I2));
    }
}
