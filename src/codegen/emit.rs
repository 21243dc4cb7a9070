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


//! Function bodies.
//!
//! Each basic block becomes a label followed by one statement per instruction. Temporaries,
//! entry slots and locals are declared at the top of the function, so `goto` never crosses an
//! initialization.
//!
//! Protected regions map onto the runtime's `setjmp` based macros. Handlers sharing one
//! protected range form a group; leaving any section of a group records the target block in
//! `__leave_{g}` and jumps to the section's exit label, and after the group a `switch`
//! dispatches to the target in the enclosing context:
//!
//! ```text
//! __leave_0 = -1;
//! __exc_0 = nullptr;
//! CIL2CPP_TRY
//!     ...                       // leave L7  =>  __leave_0 = 7; goto __try_exit_0;
//!     __try_exit_0: ;
//! CIL2CPP_CATCH_ALL
//!     __exc_0 = cil2cpp::current_exception();
//! CIL2CPP_END_TRY
//! ...                           // finally handler, endfinally  =>  goto __finally_end_0;
//! __finally_end_0: ;
//! if (__exc_0) cil2cpp::throw_exception(__exc_0);
//! switch (__leave_0) {
//! case 7: goto L7;
//! default: break;
//! }
//! ```

use std::{collections::BTreeSet, ops::Range};

use rustc_hash::FxHashSet;

use crate::{
    codegen::{
        abi,
        layout::{unsigned_type, Layout},
        writer::{cpp_string, CodeWriter},
    },
    ir::{
        BinaryOp, CallSignature, CallTarget, CompareOp, FieldAccess, IrInstr, IrMethod, IrValue,
        LoweredBody, Marker, Overflow, RegionKind, UnaryOp,
    },
    model::TypeSig,
    BuildConfig,
};

/// A body whose protected regions do not nest into structured blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Unstructured(pub String);

/// `ret name(params)` of `method`.
pub(crate) fn signature(layout: &Layout<'_>, method: &IrMethod) -> String {
    let mut params = Vec::with_capacity(method.arg_count());
    for index in 0..method.arg_count() {
        if let Some(ty) = method.arg_type(index) {
            params.push(format!("{} arg{index}", layout.native(ty)));
        }
    }
    format!(
        "{} {}({})",
        layout.native(&method.return_type),
        method.mangled,
        params.join(", ")
    )
}

/// True if `method` needs a boxed-receiver entry point for method tables.
pub(crate) fn needs_thunk(layout: &Layout<'_>, method: &IrMethod) -> bool {
    method.is_virtual
        && method.this_type.is_some()
        && layout.module().ty(method.declaring).is_value_type
        && Layout::is_emitted(method)
}

/// Signature of the boxed-receiver entry point of a value type method.
pub(crate) fn thunk_signature(layout: &Layout<'_>, method: &IrMethod) -> String {
    let mut params = vec![format!("{}* arg0", abi::OBJECT)];
    for (index, param) in method.params.iter().enumerate() {
        params.push(format!("{} arg{}", layout.native(&param.ty), index + 1));
    }
    format!(
        "{} {}_U_({})",
        layout.native(&method.return_type),
        method.mangled,
        params.join(", ")
    )
}

/// Boxed-receiver entry point: unboxes `this` and forwards.
pub(crate) fn emit_thunk(layout: &Layout<'_>, method: &IrMethod, out: &mut CodeWriter) {
    let owner = &layout.module().ty(method.declaring).sig;
    let mut args = vec![format!(
        "{}<{}>(arg0)",
        abi::UNBOX_PTR,
        layout.native(owner)
    )];
    args.extend((1..method.arg_count()).map(|index| format!("arg{index}")));
    let call = format!("{}({})", method.mangled, args.join(", "));

    out.open(format!("{} {{", thunk_signature(layout, method)));
    if method.return_type.is_void() {
        out.line(format!("{call};"));
    } else {
        out.line(format!("return {call};"));
    }
    out.close("}");
    out.blank();
}

/// Placeholder definition: `body` if given, otherwise a default return.
pub(crate) fn emit_stub(
    layout: &Layout<'_>,
    method: &IrMethod,
    body: Option<&str>,
    out: &mut CodeWriter,
) {
    out.open(format!("{} {{", signature(layout, method)));
    match body {
        Some(body) => body.lines().for_each(|line| out.line(line)),
        None if method.return_type.is_void() => {}
        None => out.line(format!(
            "return {};",
            layout.default_value(&method.return_type)
        )),
    }
    out.close("}");
    out.blank();
}

/// Handlers sharing one protected range.
#[derive(Debug, Clone)]
struct Group {
    protected: Range<usize>,
    handlers: Vec<(RegionKind, Range<usize>)>,
    span: Range<usize>,
}

impl Group {
    fn is_finally(&self) -> bool {
        matches!(
            self.handlers.first(),
            Some((RegionKind::Finally | RegionKind::Fault, _))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Try,
    Catch(usize),
    Finally,
}

#[derive(Debug)]
struct Frame {
    group: usize,
    section: Section,
    blocks: Range<usize>,
    targets: BTreeSet<usize>,
}

impl Frame {
    /// True if a plain `goto` reaches block `target` without leaving this section.
    ///
    /// The first block of a protected range is labelled before the `TRY` macro, so reaching
    /// it from inside re-enters the group.
    fn contains(&self, target: usize) -> bool {
        match self.section {
            Section::Try => (self.blocks.start + 1..self.blocks.end).contains(&target),
            _ => self.blocks.contains(&target),
        }
    }

    fn exit_label(&self) -> String {
        match self.section {
            Section::Try => format!("__try_exit_{}", self.group),
            Section::Catch(handler) => format!("__handler_exit_{}_{handler}", self.group),
            Section::Finally => format!("__finally_end_{}", self.group),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Item {
    Block(usize),
    Protected(usize),
}

/// Emits the definition of one lowered method.
pub(crate) struct FunctionEmitter<'a> {
    layout: &'a Layout<'a>,
    config: &'a BuildConfig,
    method: &'a IrMethod,
    body: &'a LoweredBody,
    groups: Vec<Group>,
    placed: Vec<bool>,
    frames: Vec<Frame>,
    labels: FxHashSet<usize>,
}

impl<'a> FunctionEmitter<'a> {
    pub fn new(
        layout: &'a Layout<'a>,
        config: &'a BuildConfig,
        method: &'a IrMethod,
        body: &'a LoweredBody,
    ) -> Self {
        FunctionEmitter {
            layout,
            config,
            method,
            body,
            groups: Vec::new(),
            placed: Vec::new(),
            frames: Vec::new(),
            labels: FxHashSet::default(),
        }
    }

    /// The complete function definition.
    pub fn emit(mut self) -> Result<String, Unstructured> {
        self.groups = self.group_regions()?;
        self.placed = vec![false; self.groups.len()];

        let mut out = CodeWriter::new();
        out.open(format!("{} {{", signature(self.layout, self.method)));
        self.declarations(&mut out);

        let items = self.items(0..self.body.blocks.len(), &[])?;
        self.emit_items(&items, &mut out)?;
        if let Some(missing) = self.placed.iter().position(|placed| !placed) {
            return Err(Unstructured(format!(
                "protected region {missing} overlaps another region"
            )));
        }

        out.close("}");
        out.blank();
        Ok(out.finish())
    }

    fn group_regions(&self) -> Result<Vec<Group>, Unstructured> {
        let mut groups: Vec<Group> = Vec::new();
        for region in &self.body.regions {
            let protected = region.try_start..region.try_end;
            let handler = region.handler_start..region.handler_end;
            match groups.iter_mut().find(|group| group.protected == protected) {
                Some(group) => group.handlers.push((region.kind.clone(), handler)),
                None => groups.push(Group {
                    span: protected.clone(),
                    protected,
                    handlers: vec![(region.kind.clone(), handler)],
                }),
            }
        }

        for group in &mut groups {
            let mut end = group.protected.end;
            for (_, handler) in &group.handlers {
                if handler.start != end {
                    return Err(Unstructured(format!(
                        "handler at block {} does not follow its protected range",
                        handler.start
                    )));
                }
                end = handler.end;
            }
            let finally = group
                .handlers
                .iter()
                .filter(|(kind, _)| !matches!(kind, RegionKind::Catch(_)))
                .count();
            if finally > 0 && group.handlers.len() > 1 {
                return Err(Unstructured(
                    "finally or fault shares its protected range".to_string(),
                ));
            }
            group.span = group.protected.start..end;
        }
        Ok(groups)
    }

    fn declarations(&self, out: &mut CodeWriter) {
        let declare = |out: &mut CodeWriter, prefix: &str, types: &[TypeSig]| {
            for (index, ty) in types.iter().enumerate() {
                out.line(format!("{} {prefix}{index}{{}};", self.layout.native(ty)));
            }
        };
        declare(out, "loc", &self.body.locals);
        declare(out, "s", &self.body.slots);
        declare(out, "t", &self.body.temps);
        for group in 0..self.groups.len() {
            out.line(format!("int32_t __leave_{group} = -1;"));
            out.line(format!("{}* __exc_{group} = nullptr;", abi::OBJECT));
        }
    }

    /// Splits `blocks` into plain blocks and the outermost groups starting inside it.
    fn items(&mut self, blocks: Range<usize>, enclosing: &[usize]) -> Result<Vec<Item>, Unstructured> {
        let mut items = Vec::new();
        let mut index = blocks.start;
        while index < blocks.end {
            let outermost = self
                .groups
                .iter()
                .enumerate()
                .filter(|(group, candidate)| {
                    candidate.span.start == index && !enclosing.contains(group)
                })
                .max_by_key(|(_, candidate)| candidate.span.end)
                .map(|(group, candidate)| (group, candidate.span.end));

            match outermost {
                Some((group, end)) => {
                    if end > blocks.end || self.placed[group] {
                        return Err(Unstructured(format!(
                            "protected region at block {index} crosses its enclosing section"
                        )));
                    }
                    self.placed[group] = true;
                    items.push(Item::Protected(group));
                    index = end;
                }
                None => {
                    items.push(Item::Block(index));
                    index += 1;
                }
            }
        }
        Ok(items)
    }

    fn emit_items(&mut self, items: &[Item], out: &mut CodeWriter) -> Result<(), Unstructured> {
        for item in items {
            match *item {
                Item::Block(index) => self.emit_block(index, out),
                Item::Protected(group) => self.emit_group(group, out)?,
            }
        }
        Ok(())
    }

    fn label(&mut self, index: usize, out: &mut CodeWriter) {
        if self.labels.insert(index) {
            out.flush_left(format!("L{index}: ;"));
        }
    }

    fn emit_block(&mut self, index: usize, out: &mut CodeWriter) {
        let body = self.body;
        let block = &body.blocks[index];
        if !block.reachable {
            return;
        }
        self.label(index, out);
        for instr in &block.instructions {
            self.instruction(instr, out);
        }
    }

    fn emit_section(
        &mut self,
        group: usize,
        section: Section,
        blocks: Range<usize>,
        out: &mut CodeWriter,
    ) -> Result<BTreeSet<usize>, Unstructured> {
        let mut enclosing: Vec<usize> = self.frames.iter().map(|frame| frame.group).collect();
        enclosing.push(group);
        let items = self.items(blocks.clone(), &enclosing)?;

        self.frames.push(Frame {
            group,
            section,
            blocks,
            targets: BTreeSet::new(),
        });
        let result = self.emit_items(&items, out);
        let frame = self.frames.pop();
        result?;
        match frame {
            Some(frame) => {
                out.line(format!("{}: ;", frame.exit_label()));
                Ok(frame.targets)
            }
            None => Ok(BTreeSet::new()),
        }
    }

    fn emit_group(&mut self, g: usize, out: &mut CodeWriter) -> Result<(), Unstructured> {
        let group = self.groups[g].clone();
        self.label(group.protected.start, out);
        out.line(format!("__leave_{g} = -1;"));
        out.line(format!("__exc_{g} = nullptr;"));

        out.open(abi::TRY);
        let mut targets = self.emit_section(g, Section::Try, group.protected.clone(), out)?;
        out.reopen(abi::CATCH_ALL);
        out.line(format!("__exc_{g} = {}();", abi::CURRENT_EXCEPTION));

        if group.is_finally() {
            out.close(abi::END_TRY);
            for (kind, handler) in &group.handlers {
                let fault = *kind == RegionKind::Fault;
                if fault {
                    out.open(format!("if (__exc_{g}) {{"));
                }
                targets.extend(self.emit_section(g, Section::Finally, handler.clone(), out)?);
                if fault {
                    out.close("}");
                }
            }
            out.line(format!(
                "if (__exc_{g}) {}(__exc_{g});",
                abi::THROW_EXCEPTION
            ));
        } else {
            for (position, (kind, handler)) in group.handlers.iter().enumerate() {
                let condition = match kind {
                    RegionKind::Catch(TypeSig::Object) => "true".to_string(),
                    RegionKind::Catch(ty) => format!(
                        "{}(__exc_{g}, {})",
                        abi::INSTANCE_OF,
                        self.layout.type_info(ty)
                    ),
                    _ => "false".to_string(),
                };
                if position == 0 {
                    out.open(format!("if ({condition}) {{"));
                } else {
                    out.reopen(format!("}} else if ({condition}) {{"));
                }
                targets.extend(self.emit_section(
                    g,
                    Section::Catch(position),
                    handler.clone(),
                    out,
                )?);
            }
            out.reopen("} else {");
            out.line(format!("{}(__exc_{g});", abi::THROW_EXCEPTION));
            out.close("}");
            out.close(abi::END_TRY);
        }

        if !targets.is_empty() {
            out.open(format!("switch (__leave_{g}) {{"));
            for target in targets {
                let jump = self.jump(target);
                out.line(format!("case {target}: {jump}"));
            }
            out.line("default: break;");
            out.close("}");
        }
        Ok(())
    }

    /// Statement transferring control to block `target` from the current section.
    fn jump(&mut self, target: usize) -> String {
        match self.frames.last_mut() {
            Some(frame) if !frame.contains(target) => {
                frame.targets.insert(target);
                format!(
                    "{{ __leave_{} = {target}; goto {}; }}",
                    frame.group,
                    frame.exit_label()
                )
            }
            _ => format!("goto L{target};"),
        }
    }

    /// Exception variable of the innermost catch handler.
    fn caught(&self) -> String {
        self.frames
            .iter()
            .rev()
            .find(|frame| matches!(frame.section, Section::Catch(_)))
            .map_or("nullptr".to_string(), |frame| format!("__exc_{}", frame.group))
    }

    // Operands

    fn type_of(&self, value: &IrValue) -> TypeSig {
        let lookup = |types: &[TypeSig], index: u32| {
            types
                .get(index as usize)
                .cloned()
                .unwrap_or(TypeSig::Object)
        };
        match value {
            IrValue::Temp(index) => lookup(&self.body.temps, *index),
            IrValue::Slot(index) => lookup(&self.body.slots, *index),
            IrValue::Local(index) => lookup(&self.body.locals, *index),
            IrValue::Arg(index) => self
                .method
                .arg_type(*index as usize)
                .cloned()
                .unwrap_or(TypeSig::Object),
            IrValue::Int32(_) => TypeSig::I4,
            IrValue::Int64(_) => TypeSig::I8,
            IrValue::Float32(_) => TypeSig::R4,
            IrValue::Float64(_) => TypeSig::R8,
            IrValue::Null => TypeSig::Object,
            IrValue::String(_) => TypeSig::String,
        }
    }

    fn native_of(&self, value: &IrValue) -> String {
        self.layout.native(&self.type_of(value))
    }

    fn is_pointer(&self, value: &IrValue) -> bool {
        matches!(value, IrValue::Null) || self.layout.is_pointer(&self.type_of(value))
    }

    fn operand(&self, value: &IrValue) -> String {
        match value {
            IrValue::Temp(index) => format!("t{index}"),
            IrValue::Slot(index) => format!("s{index}"),
            IrValue::Local(index) => format!("loc{index}"),
            IrValue::Arg(index) => format!("arg{index}"),
            IrValue::Int32(i32::MIN) => "(-2147483647 - 1)".to_string(),
            IrValue::Int32(value) if *value < 0 => format!("({value})"),
            IrValue::Int32(value) => value.to_string(),
            IrValue::Int64(i64::MIN) => "(INT64_C(-9223372036854775807) - 1)".to_string(),
            IrValue::Int64(value) => format!("INT64_C({value})"),
            IrValue::Float32(value) => float_literal(f64::from(*value), "float", "f"),
            IrValue::Float64(value) => float_literal(*value, "double", ""),
            IrValue::Null => "nullptr".to_string(),
            IrValue::String(value) => {
                format!("{}({})", abi::STRING_LITERAL, cpp_string(value))
            }
        }
    }

    /// `value` converted to the native type `target`.
    fn cast(&self, value: &IrValue, target: &str) -> String {
        let operand = self.operand(value);
        if matches!(value, IrValue::Null) || self.native_of(value) == target {
            operand
        } else {
            format!("({target})({operand})")
        }
    }

    fn assign(&self, dest: &IrValue, expression: &str, native: &str, out: &mut CodeWriter) {
        let target = self.native_of(dest);
        let dest = self.operand(dest);
        if target == native {
            out.line(format!("{dest} = {expression};"));
        } else {
            out.line(format!("{dest} = ({target})({expression});"));
        }
    }

    fn object(&self, value: &IrValue) -> String {
        format!("(({}*)({}))", abi::OBJECT, self.operand(value))
    }

    fn is_this(&self, value: &IrValue) -> bool {
        *value == IrValue::Arg(0) && self.method.this_type.is_some()
    }

    fn null_check(&self, value: &IrValue, out: &mut CodeWriter) {
        let by_ref = matches!(self.type_of(value), TypeSig::ByRef(_) | TypeSig::Ptr(_));
        if !by_ref && !self.is_this(value) {
            out.line(format!(
                "if (!{}) {}();",
                self.operand(value),
                abi::THROW_NULL_REFERENCE
            ));
        }
    }

    /// Unsigned type wide enough for both operands.
    fn unsigned_for(&self, left: &TypeSig, right: &TypeSig) -> &'static str {
        let wide = |ty: &TypeSig| matches!(ty, TypeSig::I8 | TypeSig::U8);
        let native = |ty: &TypeSig| matches!(ty, TypeSig::I | TypeSig::U);
        if wide(left) || wide(right) {
            "uint64_t"
        } else if native(left) || native(right) {
            "uintptr_t"
        } else {
            unsigned_type(left)
        }
    }

    // Instructions

    #[allow(clippy::too_many_lines)]
    fn instruction(&mut self, instr: &IrInstr, out: &mut CodeWriter) {
        match instr {
            IrInstr::Move { dest, value } => {
                let target = self.native_of(dest);
                out.line(format!(
                    "{} = {};",
                    self.operand(dest),
                    self.cast(value, &target)
                ));
            }
            IrInstr::Binary {
                dest,
                op,
                left,
                right,
            } => self.binary(dest, *op, left, right, out),
            IrInstr::Unary { dest, op, value } => {
                let ty = self.type_of(value);
                let native = self.layout.native(&ty);
                let operand = self.operand(value);
                let expression = match op {
                    UnaryOp::Neg if ty.is_float() => format!("-{operand}"),
                    UnaryOp::Neg => {
                        format!("({native})(0 - ({})({operand}))", unsigned_type(&ty))
                    }
                    UnaryOp::Not => format!("({native})(~{operand})"),
                };
                self.assign(dest, &expression, &native, out);
            }
            IrInstr::Compare {
                dest,
                op,
                left,
                right,
            } => {
                let condition = self.comparison(*op, left, right);
                out.line(format!("{} = ({condition}) ? 1 : 0;", self.operand(dest)));
            }
            IrInstr::Convert {
                dest,
                value,
                to,
                overflow,
                unsigned_source,
            } => {
                let target = self.layout.native(to);
                let operand = self.operand(value);
                let source = if self.is_pointer(value) {
                    format!("(intptr_t)({operand})")
                } else if *unsigned_source {
                    format!("({})({operand})", unsigned_type(&self.type_of(value)))
                } else {
                    operand
                };
                let expression = match overflow {
                    Overflow::None => format!("({target})({source})"),
                    Overflow::Signed => format!("{}<{target}>({source})", abi::CHECKED_CONV),
                    Overflow::Unsigned => {
                        format!("{}<{target}>({source})", abi::CHECKED_CONV_UN)
                    }
                };
                self.assign(dest, &expression, &target, out);
            }
            IrInstr::LoadField {
                dest,
                object,
                field,
            } => {
                let place = self.field_place(object, field, out);
                self.assign(dest, &place, &self.layout.native(&field.ty), out);
            }
            IrInstr::LoadFieldAddress {
                dest,
                object,
                field,
            } => {
                let place = self.field_place(object, field, out);
                let native = format!("{}*", self.layout.native(&field.ty));
                self.assign(dest, &format!("&{place}"), &native, out);
            }
            IrInstr::StoreField {
                object,
                field,
                value,
            } => {
                let place = self.field_place(object, field, out);
                let value = self.cast(value, &self.layout.native(&field.ty));
                out.line(format!("{place} = {value};"));
            }
            IrInstr::LoadStatic { dest, field } => {
                let place = self.static_place(field);
                self.assign(dest, &place, &self.layout.native(&field.ty), out);
            }
            IrInstr::LoadStaticAddress { dest, field } => {
                let place = self.static_place(field);
                let native = format!("{}*", self.layout.native(&field.ty));
                self.assign(dest, &format!("&{place}"), &native, out);
            }
            IrInstr::StoreStatic { field, value } => {
                let place = self.static_place(field);
                let value = self.cast(value, &self.layout.native(&field.ty));
                out.line(format!("{place} = {value};"));
            }
            IrInstr::LoadAddress { dest, of } => {
                let native = format!("{}*", self.native_of(of));
                self.assign(dest, &format!("&{}", self.operand(of)), &native, out);
            }
            IrInstr::LoadIndirect { dest, address, ty } => {
                let native = self.layout.native(ty);
                let expression = format!("*({native}*)({})", self.operand(address));
                self.assign(dest, &expression, &native, out);
            }
            IrInstr::StoreIndirect { address, value, ty } => {
                let native = self.layout.native(ty);
                out.line(format!(
                    "*({native}*)({}) = {};",
                    self.operand(address),
                    self.cast(value, &native)
                ));
            }
            IrInstr::LoadElement {
                dest,
                array,
                index,
                element,
            } => {
                let native = self.layout.native(element);
                let expression = format!(
                    "{}<{native}>({}, {})",
                    abi::ARRAY_GET,
                    self.cast(array, "cil2cpp::Array*"),
                    self.operand(index)
                );
                self.assign(dest, &expression, &native, out);
            }
            IrInstr::LoadElementAddress {
                dest,
                array,
                index,
                element,
            } => {
                let native = self.layout.native(element);
                let expression = format!(
                    "&{}<{native}>({}, {})",
                    abi::ARRAY_GET,
                    self.cast(array, "cil2cpp::Array*"),
                    self.operand(index)
                );
                self.assign(dest, &expression, &format!("{native}*"), out);
            }
            IrInstr::StoreElement {
                array,
                index,
                value,
                element,
            } => {
                let native = self.layout.native(element);
                out.line(format!(
                    "{}<{native}>({}, {}, {});",
                    abi::ARRAY_SET,
                    self.cast(array, "cil2cpp::Array*"),
                    self.operand(index),
                    self.cast(value, &native)
                ));
            }
            IrInstr::ArrayLength { dest, array } => {
                let expression = format!(
                    "{}({})",
                    abi::ARRAY_LENGTH,
                    self.cast(array, "cil2cpp::Array*")
                );
                self.assign(dest, &expression, "int32_t", out);
            }
            IrInstr::NewArray {
                dest,
                element,
                length,
            } => {
                let expression = format!(
                    "{}({}, {})",
                    abi::ARRAY_CREATE,
                    self.layout.type_info(element),
                    self.cast(length, "int32_t")
                );
                self.assign(dest, &expression, "cil2cpp::Array*", out);
            }
            IrInstr::NewObject {
                dest,
                ty,
                constructor,
                args,
            } => {
                let module = self.layout.module();
                let owner = module.ty(*ty);
                let constructor = module.method(*constructor);
                let dest_name = self.operand(dest);
                let this = if owner.is_value_type {
                    out.line(format!(
                        "{dest_name} = {};",
                        self.layout.default_value(&owner.sig)
                    ));
                    format!("&{dest_name}")
                } else {
                    let record = self.layout.record(&owner.sig);
                    let expression = format!(
                        "({record}*){}(sizeof({record}), {})",
                        abi::GC_ALLOC,
                        self.layout.type_info_of(owner)
                    );
                    self.assign(dest, &expression, &format!("{record}*"), out);
                    dest_name
                };
                let mut arguments = vec![this];
                arguments.extend(
                    args.iter()
                        .zip(&constructor.params)
                        .map(|(arg, param)| self.cast(arg, &self.layout.native(&param.ty))),
                );
                out.line(format!("{}({});", constructor.mangled, arguments.join(", ")));
            }
            IrInstr::Call {
                dest,
                target,
                signature,
                args,
            } => self.call(dest.as_ref(), *target, signature, args, out),
            IrInstr::LoadFunction {
                dest,
                target,
                object,
            } => {
                let function = match (target, object) {
                    (CallTarget::Direct(method), _) => {
                        format!("&{}", self.layout.module().method(*method).mangled)
                    }
                    (target, Some(object)) => self.dispatched(*target, object),
                    (_, None) => "nullptr".to_string(),
                };
                self.assign(dest, &format!("(intptr_t)({function})"), "intptr_t", out);
            }
            IrInstr::Box { dest, value, ty } => {
                if self.layout.is_value(ty) {
                    let native = self.layout.native(ty);
                    let expression = format!(
                        "{}<{native}>({}, {})",
                        abi::BOX,
                        self.cast(value, &native),
                        self.layout.type_info(ty)
                    );
                    self.assign(dest, &expression, &format!("{}*", abi::OBJECT), out);
                } else {
                    self.assign(dest, &self.operand(value), &self.native_of(value), out);
                }
            }
            IrInstr::Unbox { dest, object, ty } => {
                let native = self.layout.native(ty);
                let expression =
                    format!("{}<{native}>({})", abi::UNBOX_PTR, self.object(object));
                self.assign(dest, &expression, &format!("{native}*"), out);
            }
            IrInstr::UnboxAny { dest, object, ty } => {
                let native = self.layout.native(ty);
                let expression = if self.layout.is_value(ty) {
                    format!("{}<{native}>({})", abi::UNBOX, self.object(object))
                } else {
                    format!(
                        "({native}){}({}, {})",
                        abi::OBJECT_CAST,
                        self.object(object),
                        self.layout.type_info(ty)
                    )
                };
                self.assign(dest, &expression, &native, out);
            }
            IrInstr::CastClass { dest, object, ty } | IrInstr::IsInst { dest, object, ty } => {
                let helper = if matches!(instr, IrInstr::CastClass { .. }) {
                    abi::OBJECT_CAST
                } else {
                    abi::OBJECT_AS
                };
                let native = self.layout.native(ty);
                let expression = format!(
                    "({native}){helper}({}, {})",
                    self.object(object),
                    self.layout.type_info(ty)
                );
                self.assign(dest, &expression, &native, out);
            }
            IrInstr::InitObj { address, ty } => {
                let native = self.layout.native(ty);
                out.line(format!(
                    "*({native}*)({}) = {};",
                    self.operand(address),
                    self.layout.default_value(ty)
                ));
            }
            IrInstr::CopyObject { dest, source, ty } => {
                let native = self.layout.native(ty);
                out.line(format!(
                    "*({native}*)({}) = *({native}*)({});",
                    self.operand(dest),
                    self.operand(source)
                ));
            }
            IrInstr::SizeOf { dest, ty } => {
                let expression = format!("(int32_t)sizeof({})", self.layout.native(ty));
                self.assign(dest, &expression, "int32_t", out);
            }
            IrInstr::LoadToken { dest, ty } => {
                let expression = match self.layout.type_info(ty).as_str() {
                    "nullptr" => "(intptr_t)0".to_string(),
                    info => format!("(intptr_t){info}"),
                };
                self.assign(dest, &expression, "intptr_t", out);
            }
            IrInstr::CopyBlock { dest, source, size } => out.line(format!(
                "std::memcpy((void*)({}), (const void*)({}), (size_t)({}));",
                self.operand(dest),
                self.operand(source),
                self.operand(size)
            )),
            IrInstr::InitBlock {
                address,
                value,
                size,
            } => out.line(format!(
                "std::memset((void*)({}), (int)({}), (size_t)({}));",
                self.operand(address),
                self.operand(value),
                self.operand(size)
            )),
            IrInstr::CheckFinite { dest, value } => {
                let expression = format!("{}({})", abi::CKFINITE, self.operand(value));
                self.assign(dest, &expression, "double", out);
            }
            IrInstr::EnsureClassInit { ty } => {
                let ty = self.layout.module().ty(*ty);
                if ty.static_constructor.is_some() {
                    out.line(format!("{}_ensure_cctor();", ty.mangled));
                }
            }
            IrInstr::LoadException { dest } => {
                let caught = self.caught();
                self.assign(dest, &caught, &format!("{}*", abi::OBJECT), out);
            }
            IrInstr::Throw { value } => {
                out.line(format!("{}({});", abi::THROW_EXCEPTION, self.object(value)));
            }
            IrInstr::Rethrow => {
                out.line(format!("{}({});", abi::THROW_EXCEPTION, self.caught()));
            }
            IrInstr::Branch { target } | IrInstr::Leave { target } => {
                let jump = self.jump(*target);
                out.line(jump);
            }
            IrInstr::BranchIf {
                cond,
                negate,
                target,
            } => {
                let operand = self.operand(cond);
                let jump = self.jump(*target);
                if *negate {
                    out.line(format!("if (!{operand}) {jump}"));
                } else {
                    out.line(format!("if ({operand}) {jump}"));
                }
            }
            IrInstr::Switch { value, targets } => {
                out.open(format!("switch ({}) {{", self.cast(value, "int32_t")));
                for (case, target) in targets.iter().enumerate() {
                    let jump = self.jump(*target);
                    out.line(format!("case {case}: {jump}"));
                }
                out.line("default: break;");
                out.close("}");
            }
            IrInstr::Return { value: None } => out.line("return;"),
            IrInstr::Return { value: Some(value) } => {
                let native = self.layout.native(&self.method.return_type);
                out.line(format!("return {};", self.cast(value, &native)));
            }
            IrInstr::EndFinally => {
                let end = self
                    .frames
                    .iter()
                    .rev()
                    .find(|frame| frame.section == Section::Finally)
                    .map(Frame::exit_label);
                match end {
                    Some(end) => out.line(format!("goto {end};")),
                    None => out.line("// endfinally outside a handler"),
                }
            }
            IrInstr::Marker(Marker::IlOffset(offset)) => {
                out.line(format!("// IL_{offset:04x}"));
            }
            IrInstr::Marker(Marker::Source { document, line }) => {
                if self.config.debug_line_mapping() {
                    out.flush_left(format!("#line {line} {}", cpp_string(document)));
                }
            }
        }
    }

    fn binary(
        &self,
        dest: &IrValue,
        op: BinaryOp,
        left: &IrValue,
        right: &IrValue,
        out: &mut CodeWriter,
    ) {
        let symbol = match op {
            BinaryOp::Add | BinaryOp::AddOvf | BinaryOp::AddOvfUn => "+",
            BinaryOp::Sub | BinaryOp::SubOvf | BinaryOp::SubOvfUn => "-",
            BinaryOp::Mul | BinaryOp::MulOvf | BinaryOp::MulOvfUn => "*",
            BinaryOp::Div | BinaryOp::DivUn => "/",
            BinaryOp::Rem | BinaryOp::RemUn => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr | BinaryOp::ShrUn => ">>",
        };
        let left_type = self.type_of(left);
        let right_type = self.type_of(right);
        let l = self.operand(left);
        let r = self.operand(right);

        // byte offsets, not element counts
        if self.is_pointer(left) || self.is_pointer(right) {
            let expression = format!("(intptr_t)({l}) {symbol} (intptr_t)({r})");
            self.assign(dest, &expression, "intptr_t", out);
            return;
        }

        let native = self.layout.native(&left_type);
        if left_type.is_float() {
            let expression = match op {
                BinaryOp::Rem | BinaryOp::RemUn => format!("std::fmod({l}, {r})"),
                _ => format!("{l} {symbol} {r}"),
            };
            self.assign(dest, &expression, &native, out);
            return;
        }

        let unsigned = self.unsigned_for(&left_type, &right_type);
        let expression = match op {
            // integer arithmetic wraps
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
                format!("({native})(({unsigned})({l}) {symbol} ({unsigned})({r}))")
            }
            BinaryOp::DivUn | BinaryOp::RemUn => {
                format!("({native})(({unsigned})({l}) {symbol} ({unsigned})({r}))")
            }
            BinaryOp::Shl => format!("({native})(({unsigned})({l}) << {r})"),
            BinaryOp::ShrUn => format!("({native})(({unsigned})({l}) >> {r})"),
            BinaryOp::AddOvf | BinaryOp::SubOvf | BinaryOp::MulOvf => format!(
                "{}<{native}>({l}, {r})",
                abi::checked(checked_name(op), false)
            ),
            BinaryOp::AddOvfUn | BinaryOp::SubOvfUn | BinaryOp::MulOvfUn => format!(
                "{}<{native}>({l}, {r})",
                abi::checked(checked_name(op), true)
            ),
            _ => format!("{l} {symbol} {r}"),
        };
        self.assign(dest, &expression, &native, out);
    }

    fn comparison(&self, op: CompareOp, left: &IrValue, right: &IrValue) -> String {
        let symbol = match op {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt | CompareOp::GtUn => ">",
            CompareOp::Ge | CompareOp::GeUn => ">=",
            CompareOp::Lt | CompareOp::LtUn => "<",
            CompareOp::Le | CompareOp::LeUn => "<=",
        };
        let unordered = matches!(
            op,
            CompareOp::GtUn | CompareOp::GeUn | CompareOp::LtUn | CompareOp::LeUn
        );

        if self.is_pointer(left) || self.is_pointer(right) {
            let side = |value: &IrValue| match value {
                IrValue::Null => "(uintptr_t)0".to_string(),
                other => format!("(uintptr_t)({})", self.operand(other)),
            };
            return format!("{} {symbol} {}", side(left), side(right));
        }

        let left_type = self.type_of(left);
        let right_type = self.type_of(right);
        let l = self.operand(left);
        let r = self.operand(right);
        if left_type.is_float() || right_type.is_float() {
            if unordered {
                let inverse = match op {
                    CompareOp::GtUn => "<=",
                    CompareOp::GeUn => "<",
                    CompareOp::LtUn => ">=",
                    _ => ">",
                };
                return format!("!({l} {inverse} {r})");
            }
            return format!("{l} {symbol} {r}");
        }
        if unordered {
            let unsigned = self.unsigned_for(&left_type, &right_type);
            return format!("({unsigned})({l}) {symbol} ({unsigned})({r})");
        }
        format!("{l} {symbol} {r}")
    }

    fn field_place(&self, object: &IrValue, field: &FieldAccess, out: &mut CodeWriter) -> String {
        let owner = self.layout.module().ty(field.owner);
        let operand = self.operand(object);
        let pointer = self.is_pointer(object);

        // the single field of a primitive is the value itself
        if owner.sig.is_primitive_value() {
            return if pointer {
                format!("(*({}*)({operand}))", self.layout.native(&owner.sig))
            } else {
                operand
            };
        }

        let member = self.layout.field_member(field.owner, field.field);
        if pointer {
            self.null_check(object, out);
            format!(
                "(({}*)({operand}))->{member}",
                self.layout.record(&owner.sig)
            )
        } else {
            format!("{operand}.{member}")
        }
    }

    fn static_place(&self, field: &FieldAccess) -> String {
        let owner = self.layout.module().ty(field.owner);
        format!(
            "{}_statics.{}",
            owner.mangled,
            self.layout.field_member(field.owner, field.field)
        )
    }

    /// Function pointer loaded from the method table `target` names for `receiver`.
    fn dispatched(&self, target: CallTarget, receiver: &IrValue) -> String {
        let object = self.object(receiver);
        match target {
            CallTarget::Virtual { slot, .. } => {
                format!("{object}->__type_info->vtable->methods[{slot}]")
            }
            CallTarget::Interface { interface, slot } => {
                let interface = self.layout.module().ty(interface);
                format!(
                    "{}({object}, {})->methods[{slot}]",
                    abi::GET_INTERFACE_VTABLE,
                    self.layout.type_info_of(interface)
                )
            }
            CallTarget::Direct(method) => {
                format!("&{}", self.layout.module().method(method).mangled)
            }
        }
    }

    fn call(
        &self,
        dest: Option<&IrValue>,
        target: CallTarget,
        signature: &CallSignature,
        args: &[IrValue],
        out: &mut CodeWriter,
    ) {
        let (callee, types, return_type) = match target {
            CallTarget::Direct(method) => {
                let method = self.layout.module().method(method);
                let types: Vec<TypeSig> = (0..method.arg_count())
                    .filter_map(|index| method.arg_type(index).cloned())
                    .collect();
                (method.mangled.clone(), types, method.return_type.clone())
            }
            dispatched => {
                let mut types: Vec<TypeSig> = signature.this_type.iter().cloned().collect();
                types.extend(signature.params.iter().cloned());
                let natives: Vec<String> =
                    types.iter().map(|ty| self.layout.native(ty)).collect();
                let function = format!(
                    "{}(*)({})",
                    self.layout.native(&signature.return_type),
                    natives.join(", ")
                );
                if let Some(receiver) = args.first() {
                    self.null_check(receiver, out);
                }
                let slot = args
                    .first()
                    .map_or("nullptr".to_string(), |receiver| {
                        self.dispatched(dispatched, receiver)
                    });
                (
                    format!("(({function})({slot}))"),
                    types,
                    signature.return_type.clone(),
                )
            }
        };

        let arguments: Vec<String> = args
            .iter()
            .zip(&types)
            .map(|(arg, ty)| self.cast(arg, &self.layout.native(ty)))
            .collect();
        let call = format!("{callee}({})", arguments.join(", "));
        match dest {
            Some(dest) => {
                self.assign(dest, &call, &self.layout.native(&return_type), out);
            }
            None => out.line(format!("{call};")),
        }
    }
}

fn checked_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::AddOvf | BinaryOp::AddOvfUn => "add",
        BinaryOp::SubOvf | BinaryOp::SubOvfUn => "sub",
        _ => "mul",
    }
}

fn float_literal(value: f64, native: &str, suffix: &str) -> String {
    if value.is_nan() {
        format!("std::numeric_limits<{native}>::quiet_NaN()")
    } else if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        format!("({sign}std::numeric_limits<{native}>::infinity())")
    } else if suffix.is_empty() {
        wrap_negative(format!("{value:?}"))
    } else {
        // shortest f32 spelling
        let text = format!("{:?}", value as f32);
        wrap_negative(format!("{text}{suffix}"))
    }
}

fn wrap_negative(text: String) -> String {
    if text.starts_with('-') {
        format!("({text})")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        ir::{BasicBlock, ExceptionRegion, IrBuilder, IrModule},
        model::{MethodInst, ModuleSet},
        reachability::ReachabilityAnalyzer,
        test::calculator_set,
    };

    fn build(set: &ModuleSet) -> IrModule {
        let reachable = ReachabilityAnalyzer::new(set).analyze().unwrap();
        IrBuilder::new(set, &reachable, &BuildConfig::default())
            .build()
            .unwrap()
    }

    fn block(instructions: Vec<IrInstr>) -> BasicBlock {
        BasicBlock {
            offset: 0,
            instructions,
            reachable: true,
        }
    }

    #[test]
    fn straight_line_body() {
        let (set, ids) = calculator_set().unwrap();
        let module = build(&set);
        let layout = Layout::new(&set, &module);
        let config = BuildConfig::default();
        let add = module.method(module.method_of(&MethodInst::plain(ids.add)).unwrap());
        let body = add.body().lowered().unwrap();

        let source = FunctionEmitter::new(&layout, &config, add, body).emit().unwrap();
        assert!(source.starts_with(
            "int32_t App_N_Calc_D_Add_P2_System_N_Int32_C_System_N_Int32_R_System_N_Int32(App_N_Calc* arg0, int32_t arg1, int32_t arg2) {"
        ));
        assert!(source.contains("L0: ;"));
        assert!(source.contains("(int32_t)((uint32_t)(t0) + (uint32_t)(t1))"));
        assert!(source.contains("    return t2;"));
    }

    #[test]
    fn finally_runs_before_leaving() {
        let (set, ids) = calculator_set().unwrap();
        let module = build(&set);
        let layout = Layout::new(&set, &module);
        let config = BuildConfig::default();
        let add = module.method(module.method_of(&MethodInst::plain(ids.add)).unwrap());

        let body = LoweredBody {
            blocks: vec![
                block(vec![IrInstr::Leave { target: 2 }]),
                block(vec![IrInstr::EndFinally]),
                block(vec![IrInstr::Return {
                    value: Some(IrValue::Int32(1)),
                }]),
            ],
            regions: vec![ExceptionRegion {
                kind: RegionKind::Finally,
                try_start: 0,
                try_end: 1,
                handler_start: 1,
                handler_end: 2,
            }],
            ..LoweredBody::default()
        };
        let source = FunctionEmitter::new(&layout, &config, add, &body).emit().unwrap();

        assert!(source.contains("int32_t __leave_0 = -1;"));
        assert!(source.contains("CIL2CPP_TRY"));
        assert!(source.contains("{ __leave_0 = 2; goto __try_exit_0; }"));
        assert!(source.contains("goto __finally_end_0;"));
        assert!(source.contains("if (__exc_0) cil2cpp::throw_exception(__exc_0);"));
        assert!(source.contains("case 2: goto L2;"));
        let try_at = source.find("CIL2CPP_TRY").unwrap();
        let end_at = source.find("CIL2CPP_END_TRY").unwrap();
        let finally_at = source.find("__finally_end_0: ;").unwrap();
        assert!(try_at < end_at && end_at < finally_at);
    }

    #[test]
    fn catch_clauses_test_the_exception() {
        let (set, ids) = calculator_set().unwrap();
        let module = build(&set);
        let layout = Layout::new(&set, &module);
        let config = BuildConfig::default();
        let add = module.method(module.method_of(&MethodInst::plain(ids.add)).unwrap());

        let body = LoweredBody {
            blocks: vec![
                block(vec![IrInstr::Leave { target: 2 }]),
                block(vec![
                    IrInstr::LoadException {
                        dest: IrValue::Temp(0),
                    },
                    IrInstr::Leave { target: 2 },
                ]),
                block(vec![IrInstr::Return {
                    value: Some(IrValue::Int32(0)),
                }]),
            ],
            temps: vec![TypeSig::Object],
            regions: vec![ExceptionRegion {
                kind: RegionKind::Catch(TypeSig::Object),
                try_start: 0,
                try_end: 1,
                handler_start: 1,
                handler_end: 2,
            }],
            ..LoweredBody::default()
        };
        let source = FunctionEmitter::new(&layout, &config, add, &body).emit().unwrap();

        assert!(source.contains("if (true) {"));
        assert!(source.contains("t0 = __exc_0;"));
        assert!(source.contains("{ __leave_0 = 2; goto __handler_exit_0_0; }"));
        assert!(source.contains("} else {"));
        assert!(source.contains("cil2cpp::throw_exception(__exc_0);"));
    }

    #[test]
    fn overlapping_regions_are_unstructured() {
        let (set, ids) = calculator_set().unwrap();
        let module = build(&set);
        let layout = Layout::new(&set, &module);
        let config = BuildConfig::default();
        let add = module.method(module.method_of(&MethodInst::plain(ids.add)).unwrap());

        let body = LoweredBody {
            blocks: vec![
                block(vec![IrInstr::Leave { target: 3 }]),
                block(vec![IrInstr::Leave { target: 3 }]),
                block(vec![IrInstr::EndFinally]),
                block(vec![IrInstr::Return {
                    value: Some(IrValue::Int32(0)),
                }]),
            ],
            regions: vec![ExceptionRegion {
                kind: RegionKind::Finally,
                try_start: 0,
                try_end: 2,
                handler_start: 1,
                handler_end: 3,
            }],
            ..LoweredBody::default()
        };
        assert!(FunctionEmitter::new(&layout, &config, add, &body)
            .emit()
            .is_err());
    }

    #[test]
    fn literals() {
        assert_eq!(float_literal(1.5, "double", ""), "1.5");
        assert_eq!(float_literal(-2.0, "float", "f"), "(-2.0f)");
        assert_eq!(
            float_literal(f64::NAN, "double", ""),
            "std::numeric_limits<double>::quiet_NaN()"
        );
    }
}
