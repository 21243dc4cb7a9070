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

//! Method bodies: basic blocks of value-based instructions.
//!
//! Every evaluation stack position of the original bytecode is materialized as a temporary
//! ([`IrValue::Temp`]); values live across block boundaries in per-block entry slots
//! ([`IrValue::Slot`]). A block ends with at most one control transfer; a block without one
//! falls through to the next block in order.
//!
//! ```text
//! IL_0000: ldarg.1          t0 = arg1
//! IL_0001: ldarg.2          t1 = arg2
//! IL_0002: add              t2 = t0 + t1
//! IL_0003: ret              return t2
//! ```

use std::{borrow::Cow, fmt};

use crate::{
    ir::types::{IrMethodId, IrTypeId},
    model::{FieldId, TypeSig},
};

/// An operand.
#[derive(Debug, Clone, PartialEq)]
pub enum IrValue {
    /// Temporary, typed by [`LoweredBody::temps`]
    Temp(u32),
    /// Block entry slot, typed by [`LoweredBody::slots`]
    Slot(u32),
    /// Local variable
    Local(u32),
    /// Argument, 0 is `this` for instance methods
    Arg(u32),
    /// 32-bit integer constant
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// 32-bit float constant
    Float32(f32),
    /// 64-bit float constant
    Float64(f64),
    /// Null reference
    Null,
    /// String literal
    String(String),
}

impl fmt::Display for IrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrValue::Temp(index) => write!(f, "t{index}"),
            IrValue::Slot(index) => write!(f, "s{index}"),
            IrValue::Local(index) => write!(f, "loc{index}"),
            IrValue::Arg(index) => write!(f, "arg{index}"),
            IrValue::Int32(value) => write!(f, "{value}"),
            IrValue::Int64(value) => write!(f, "{value}L"),
            IrValue::Float32(value) => write!(f, "{value:?}f"),
            IrValue::Float64(value) => write!(f, "{value:?}"),
            IrValue::Null => write!(f, "null"),
            IrValue::String(value) => write!(f, "{value:?}"),
        }
    }
}

/// Two-operand arithmetic and bitwise operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUn,
    AddOvf,
    AddOvfUn,
    SubOvf,
    SubOvfUn,
    MulOvf,
    MulOvfUn,
}

/// One-operand operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Comparisons producing 0 or 1.
///
/// The `Un` variants compare integers as unsigned and are true for unordered floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    GtUn,
    Ge,
    GeUn,
    Lt,
    LtUn,
    Le,
    LeUn,
}

/// Overflow checking of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Truncating conversion
    None,
    /// Checked, source interpreted as signed
    Signed,
    /// Checked, source interpreted as unsigned
    Unsigned,
}

/// A field as seen from an access site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccess {
    /// Declaring type
    pub owner: IrTypeId,
    /// Definition
    pub field: FieldId,
    /// Field type
    pub ty: TypeSig,
}

/// How a call finds its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// Statically bound
    Direct(IrMethodId),
    /// Through the vtable slot of a class
    Virtual {
        /// Class introducing the slot
        owner: IrTypeId,
        /// Slot index
        slot: usize,
    },
    /// Through an interface method table
    Interface {
        /// The interface
        interface: IrTypeId,
        /// Interface slot index
        slot: usize,
    },
}

/// Signature used to type a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSignature {
    /// Type of `this`, `None` for static calls
    pub this_type: Option<TypeSig>,
    /// Parameter types
    pub params: Vec<TypeSig>,
    /// Return type
    pub return_type: TypeSig,
}

/// Debug annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// Start of the instruction at this IL offset
    IlOffset(u64),
    /// Start of a source line
    Source {
        /// Document path
        document: String,
        /// 1-based line
        line: u32,
    },
}

/// One structured instruction.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum IrInstr {
    Move {
        dest: IrValue,
        value: IrValue,
    },
    Binary {
        dest: IrValue,
        op: BinaryOp,
        left: IrValue,
        right: IrValue,
    },
    Unary {
        dest: IrValue,
        op: UnaryOp,
        value: IrValue,
    },
    Compare {
        dest: IrValue,
        op: CompareOp,
        left: IrValue,
        right: IrValue,
    },
    Convert {
        dest: IrValue,
        value: IrValue,
        to: TypeSig,
        overflow: Overflow,
        /// `conv.r.un`: the source is reinterpreted as unsigned
        unsigned_source: bool,
    },
    LoadField {
        dest: IrValue,
        object: IrValue,
        field: FieldAccess,
    },
    LoadFieldAddress {
        dest: IrValue,
        object: IrValue,
        field: FieldAccess,
    },
    StoreField {
        object: IrValue,
        field: FieldAccess,
        value: IrValue,
    },
    LoadStatic {
        dest: IrValue,
        field: FieldAccess,
    },
    LoadStaticAddress {
        dest: IrValue,
        field: FieldAccess,
    },
    StoreStatic {
        field: FieldAccess,
        value: IrValue,
    },
    /// Address of a local or argument
    LoadAddress {
        dest: IrValue,
        of: IrValue,
    },
    LoadIndirect {
        dest: IrValue,
        address: IrValue,
        ty: TypeSig,
    },
    StoreIndirect {
        address: IrValue,
        value: IrValue,
        ty: TypeSig,
    },
    LoadElement {
        dest: IrValue,
        array: IrValue,
        index: IrValue,
        element: TypeSig,
    },
    LoadElementAddress {
        dest: IrValue,
        array: IrValue,
        index: IrValue,
        element: TypeSig,
    },
    StoreElement {
        array: IrValue,
        index: IrValue,
        value: IrValue,
        element: TypeSig,
    },
    ArrayLength {
        dest: IrValue,
        array: IrValue,
    },
    NewArray {
        dest: IrValue,
        element: TypeSig,
        length: IrValue,
    },
    NewObject {
        dest: IrValue,
        ty: IrTypeId,
        constructor: IrMethodId,
        args: Vec<IrValue>,
    },
    Call {
        dest: Option<IrValue>,
        target: CallTarget,
        signature: CallSignature,
        /// `this` first for instance calls
        args: Vec<IrValue>,
    },
    /// Function pointer; `object` is the receiver for virtual targets
    LoadFunction {
        dest: IrValue,
        target: CallTarget,
        object: Option<IrValue>,
    },
    Box {
        dest: IrValue,
        value: IrValue,
        ty: TypeSig,
    },
    /// Address of the boxed value
    Unbox {
        dest: IrValue,
        object: IrValue,
        ty: TypeSig,
    },
    UnboxAny {
        dest: IrValue,
        object: IrValue,
        ty: TypeSig,
    },
    CastClass {
        dest: IrValue,
        object: IrValue,
        ty: TypeSig,
    },
    IsInst {
        dest: IrValue,
        object: IrValue,
        ty: TypeSig,
    },
    InitObj {
        address: IrValue,
        ty: TypeSig,
    },
    CopyObject {
        dest: IrValue,
        source: IrValue,
        ty: TypeSig,
    },
    SizeOf {
        dest: IrValue,
        ty: TypeSig,
    },
    /// Runtime handle of a type
    LoadToken {
        dest: IrValue,
        ty: TypeSig,
    },
    CopyBlock {
        dest: IrValue,
        source: IrValue,
        size: IrValue,
    },
    InitBlock {
        address: IrValue,
        value: IrValue,
        size: IrValue,
    },
    CheckFinite {
        dest: IrValue,
        value: IrValue,
    },
    /// Runs the static constructor of `ty` unless it already ran
    EnsureClassInit {
        ty: IrTypeId,
    },
    /// Exception object at the start of a catch handler
    LoadException {
        dest: IrValue,
    },
    Throw {
        value: IrValue,
    },
    Rethrow,
    Branch {
        target: usize,
    },
    /// Branches if `cond` is non-zero (zero when `negate`); falls through otherwise
    BranchIf {
        cond: IrValue,
        negate: bool,
        target: usize,
    },
    /// Jump table; out of range values fall through
    Switch {
        value: IrValue,
        targets: Vec<usize>,
    },
    Return {
        value: Option<IrValue>,
    },
    /// Leaves protected regions, running finally handlers on the way
    Leave {
        target: usize,
    },
    EndFinally,
    Marker(Marker),
}

impl IrInstr {
    /// True for instructions that end a block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            IrInstr::Throw { .. }
                | IrInstr::Rethrow
                | IrInstr::Branch { .. }
                | IrInstr::BranchIf { .. }
                | IrInstr::Switch { .. }
                | IrInstr::Return { .. }
                | IrInstr::Leave { .. }
                | IrInstr::EndFinally
        )
    }

    /// True for [`IrInstr::Return`].
    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(self, IrInstr::Return { .. })
    }

    /// Blocks this instruction may transfer control to, fall through excluded.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        match self {
            IrInstr::Branch { target }
            | IrInstr::BranchIf { target, .. }
            | IrInstr::Leave { target } => vec![*target],
            IrInstr::Switch { targets, .. } => targets.clone(),
            _ => Vec::new(),
        }
    }
}

/// A straight-line instruction sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicBlock {
    /// IL offset of the first instruction
    pub offset: u64,
    /// Instructions; only the last may be a terminator
    pub instructions: Vec<IrInstr>,
    /// False for blocks no path from the entry or a handler reaches
    pub reachable: bool,
}

impl BasicBlock {
    /// The final control transfer, if any.
    #[must_use]
    pub fn terminator(&self) -> Option<&IrInstr> {
        self.instructions.last().filter(|instr| instr.is_terminator())
    }

    /// True if execution continues with the next block.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        match self.terminator() {
            None | Some(IrInstr::BranchIf { .. } | IrInstr::Switch { .. }) => true,
            Some(_) => false,
        }
    }
}

/// Kind of a protected region handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionKind {
    /// Typed catch clause
    Catch(TypeSig),
    /// Runs on every exit
    Finally,
    /// Runs on exceptional exit
    Fault,
}

/// A protected block and its handler, as half-open block index ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRegion {
    /// Handler kind
    pub kind: RegionKind,
    /// First protected block
    pub try_start: usize,
    /// One past the last protected block
    pub try_end: usize,
    /// First handler block
    pub handler_start: usize,
    /// One past the last handler block
    pub handler_end: usize,
}

impl ExceptionRegion {
    /// True if block `index` is protected by this region.
    #[must_use]
    pub fn protects(&self, index: usize) -> bool {
        (self.try_start..self.try_end).contains(&index)
    }

    /// True if block `index` belongs to the handler.
    #[must_use]
    pub fn handles(&self, index: usize) -> bool {
        (self.handler_start..self.handler_end).contains(&index)
    }
}

/// A mechanically lowered body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoweredBody {
    /// Blocks in IL order
    pub blocks: Vec<BasicBlock>,
    /// Local variable types
    pub locals: Vec<TypeSig>,
    /// Temporary types
    pub temps: Vec<TypeSig>,
    /// Entry slot types
    pub slots: Vec<TypeSig>,
    /// Protected regions, outermost first
    pub regions: Vec<ExceptionRegion>,
    /// Locals are zero initialized
    pub init_locals: bool,
}

/// Why a method could not be mechanically lowered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubReason {
    /// `constrained.` call to a static abstract interface member
    StaticAbstractDispatch {
        /// Offset of the call
        offset: u64,
    },
    /// Generic virtual method call, which has no vtable slot
    GenericVirtualCall {
        /// Offset of the call
        offset: u64,
    },
    /// Runtime intrinsic whose body only recurses into itself or throws
    JitIntrinsic,
    /// `internalcall` or runtime provided method
    InternalCall,
    /// `extern` or otherwise bodiless method
    NoBody,
    /// Abstract method
    Abstract,
    /// Instance with unbound generic parameters
    OpenGeneric,
    /// An instruction without translation
    Unsupported {
        /// Offset of the instruction
        offset: u64,
        /// Textual instruction
        instruction: String,
    },
    /// Filter handler
    ExceptionFilter,
    /// A reference inside the body could not be resolved
    Unresolved {
        /// Offset of the instruction
        offset: u64,
        /// What failed
        detail: String,
    },
    /// Incompatible evaluation stacks meet at a block
    StackMismatch {
        /// Offset of the block
        offset: u64,
    },
}

impl fmt::Display for StubReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StubReason::StaticAbstractDispatch { offset } => {
                write!(f, "static abstract interface dispatch at IL_{offset:04x}")
            }
            StubReason::GenericVirtualCall { offset } => {
                write!(f, "generic virtual call at IL_{offset:04x}")
            }
            StubReason::JitIntrinsic => write!(f, "JIT intrinsic"),
            StubReason::InternalCall => write!(f, "internal call"),
            StubReason::NoBody => write!(f, "no body"),
            StubReason::Abstract => write!(f, "abstract"),
            StubReason::OpenGeneric => write!(f, "open generic instance"),
            StubReason::Unsupported {
                offset,
                instruction,
            } => write!(f, "unsupported '{instruction}' at IL_{offset:04x}"),
            StubReason::ExceptionFilter => write!(f, "exception filter"),
            StubReason::Unresolved { offset, detail } => {
                write!(f, "unresolved reference at IL_{offset:04x} - {detail}")
            }
            StubReason::StackMismatch { offset } => {
                write!(f, "stack mismatch at IL_{offset:04x}")
            }
        }
    }
}

/// A method body: lowered, or a stub with the reason lowering was not possible.
#[derive(Debug, Clone, PartialEq)]
pub enum IrBody {
    /// Translated body
    Lowered(LoweredBody),
    /// Placeholder
    Stub(StubReason),
}

impl IrBody {
    /// Blocks of the body. A stub reads as one block holding one `return`.
    #[must_use]
    pub fn blocks(&self) -> Cow<'_, [BasicBlock]> {
        match self {
            IrBody::Lowered(body) => Cow::Borrowed(&body.blocks),
            IrBody::Stub(_) => Cow::Owned(vec![BasicBlock {
                offset: 0,
                instructions: vec![IrInstr::Return { value: None }],
                reachable: true,
            }]),
        }
    }

    /// True for [`IrBody::Stub`].
    #[must_use]
    pub fn is_stub(&self) -> bool {
        matches!(self, IrBody::Stub(_))
    }

    /// Why the body is a stub.
    #[must_use]
    pub fn stub_reason(&self) -> Option<&StubReason> {
        match self {
            IrBody::Stub(reason) => Some(reason),
            IrBody::Lowered(_) => None,
        }
    }

    /// The lowered body.
    #[must_use]
    pub fn lowered(&self) -> Option<&LoweredBody> {
        match self {
            IrBody::Lowered(body) => Some(body),
            IrBody::Stub(_) => None,
        }
    }

    /// True if the body has the stub shape: one block with one value-less `return`.
    ///
    /// Stubs always have this shape; a lowered body only has it when the method really
    /// does nothing.
    #[must_use]
    pub fn stub_shaped(&self) -> bool {
        let blocks = self.blocks();
        match blocks.as_ref() {
            [block] => matches!(
                block.instructions.as_slice(),
                [IrInstr::Return { value: None }]
            ),
            _ => false,
        }
    }
}
