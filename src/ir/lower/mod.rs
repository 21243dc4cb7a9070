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

//! Body lowering.
//!
//! [`lower_method`] turns the IL of one method instance into a [`LoweredBody`], or into a
//! [`StubReason`] when the body cannot be translated mechanically. Lowering never fails the
//! build: every problem inside a body becomes a stub with a reason.
//!
//! Checks run in a fixed order so a body with several problems always reports the same
//! reason: abstract, missing body, open instance, intrinsic, filter clause, unsupported
//! instruction, then anything the translation itself runs into.

mod blocks;
mod translate;

use crate::{
    config::BuildConfig,
    ir::{
        body::{ExceptionRegion, IrBody, LoweredBody, RegionKind, StubReason},
        types::{IrMethod, IrModule},
    },
    metadata::method::ExceptionHandlerKind,
    model::{GenericContext, MethodBodyRecord, MethodRecord, ModuleSet},
};

use blocks::BlockLayout;
use translate::Lowerer;

const INTRINSIC_ATTRIBUTE: &str = "System.Runtime.CompilerServices.IntrinsicAttribute";

/// Lowers the body of `method`. `module` must hold every shell already.
pub(crate) fn lower_method(
    set: &ModuleSet,
    module: &IrModule,
    config: &BuildConfig,
    method: &IrMethod,
) -> IrBody {
    match try_lower(set, module, config, method) {
        Ok(body) => IrBody::Lowered(body),
        Err(reason) => {
            log::debug!("Stub {}: {reason}", method.full_name);
            IrBody::Stub(reason)
        }
    }
}

fn try_lower(
    set: &ModuleSet,
    module: &IrModule,
    config: &BuildConfig,
    method: &IrMethod,
) -> Result<LoweredBody, StubReason> {
    let record = set.method(method.inst.method);
    if record.is_abstract() {
        return Err(StubReason::Abstract);
    }
    let Some(body) = &record.body else {
        return Err(if record.impl_flags.is_runtime_provided() {
            StubReason::InternalCall
        } else {
            StubReason::NoBody
        });
    };
    if method.inst.is_open() {
        return Err(StubReason::OpenGeneric);
    }

    let ctx = GenericContext::of(&method.inst);
    if is_jit_intrinsic(set, method, record, body, &ctx) {
        return Err(StubReason::JitIntrinsic);
    }
    if body
        .exception_handlers
        .iter()
        .any(|handler| handler.kind() == ExceptionHandlerKind::Filter)
    {
        return Err(StubReason::ExceptionFilter);
    }
    check_instructions(set, record, body, &ctx)?;

    let layout = BlockLayout::build(body)?;
    let locals = body
        .locals
        .iter()
        .map(|local| set.resolve_signature(record.module, local, &ctx))
        .collect::<crate::Result<Vec<_>>>()
        .map_err(|error| StubReason::Unresolved {
            offset: 0,
            detail: error.to_string(),
        })?;
    let regions = regions(set, record, body, &layout, &ctx)?;

    Lowerer::new(set, module, config, method, record, body, layout, locals).run(regions)
}

/// An `[Intrinsic]` method whose IL is only a placeholder the JIT replaces: it calls
/// itself, or it throws without ever returning.
fn is_jit_intrinsic(
    set: &ModuleSet,
    method: &IrMethod,
    record: &MethodRecord,
    body: &MethodBodyRecord,
    ctx: &GenericContext<'_>,
) -> bool {
    if !method
        .attributes
        .iter()
        .any(|attribute| attribute.type_name == INTRINSIC_ATTRIBUTE)
    {
        return false;
    }

    let mut returns = false;
    let mut throws = false;
    for instruction in &body.instructions {
        match (instruction.prefix, instruction.opcode) {
            // ret
            (0, 0x2A) => returns = true,
            // throw
            (0, 0x7A) => throws = true,
            // call, callvirt
            (0, 0x28 | 0x6F) => {
                let recursive = instruction.token().is_some_and(|token| {
                    set.resolve_method(record.module, token, ctx)
                        .is_ok_and(|target| target.method == record.id)
                });
                if recursive {
                    return true;
                }
            }
            _ => {}
        }
    }
    throws && !returns
}

/// Rejects instructions without a translation before any block is built.
fn check_instructions(
    set: &ModuleSet,
    record: &MethodRecord,
    body: &MethodBodyRecord,
    ctx: &GenericContext<'_>,
) -> Result<(), StubReason> {
    let mut constrained = false;
    for instruction in &body.instructions {
        match (instruction.prefix, instruction.opcode) {
            // jmp, calli, refanyval, mkrefany, arglist, localloc, endfilter, refanytype
            (0, 0x27 | 0x29 | 0xC2 | 0xC6) | (0xFE, 0x00 | 0x0F | 0x11 | 0x1D) => {
                return Err(StubReason::Unsupported {
                    offset: instruction.offset,
                    instruction: instruction.to_string(),
                });
            }
            // call after constrained.
            (0, 0x28) if constrained => {
                let static_abstract = instruction.token().is_some_and(|token| {
                    set.resolve_method(record.module, token, ctx)
                        .is_ok_and(|target| {
                            let target = set.method(target.method);
                            target.is_static() && target.is_abstract()
                        })
                });
                if static_abstract {
                    return Err(StubReason::StaticAbstractDispatch {
                        offset: instruction.offset,
                    });
                }
            }
            _ => {}
        }
        constrained = (instruction.prefix, instruction.opcode) == (0xFE, 0x16);
    }
    Ok(())
}

/// Protected regions as block ranges, outermost first.
fn regions(
    set: &ModuleSet,
    record: &MethodRecord,
    body: &MethodBodyRecord,
    layout: &BlockLayout,
    ctx: &GenericContext<'_>,
) -> Result<Vec<ExceptionRegion>, StubReason> {
    let boundary = |offset: u64| {
        layout
            .boundary(offset)
            .ok_or_else(|| StubReason::Unresolved {
                offset,
                detail: "protected region boundary inside an instruction".to_string(),
            })
    };

    let mut regions = Vec::with_capacity(body.exception_handlers.len());
    for handler in &body.exception_handlers {
        let kind = match handler.kind() {
            ExceptionHandlerKind::Catch => {
                let caught = handler
                    .class_token()
                    .ok_or(StubReason::ExceptionFilter)
                    .and_then(|token| {
                        set.resolve_type(record.module, token, ctx).map_err(|error| {
                            StubReason::Unresolved {
                                offset: u64::from(handler.handler_offset),
                                detail: error.to_string(),
                            }
                        })
                    })?;
                RegionKind::Catch(caught)
            }
            ExceptionHandlerKind::Finally => RegionKind::Finally,
            ExceptionHandlerKind::Fault => RegionKind::Fault,
            ExceptionHandlerKind::Filter => return Err(StubReason::ExceptionFilter),
        };
        regions.push(ExceptionRegion {
            kind,
            try_start: boundary(u64::from(handler.try_offset))?,
            try_end: boundary(u64::from(handler.try_offset) + u64::from(handler.try_length))?,
            handler_start: boundary(u64::from(handler.handler_offset))?,
            handler_end: boundary(
                u64::from(handler.handler_offset) + u64::from(handler.handler_length),
            )?,
        });
    }

    // stable, so clauses of one protected block keep their order
    regions.sort_by(|a, b| {
        a.try_start
            .cmp(&b.try_start)
            .then_with(|| b.try_end.cmp(&a.try_end))
    });
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use crate::{
        ir::{body::IrInstr, IrBuilder, IrModule},
        metadata::{
            method::{ExceptionHandler, ExceptionHandlerFlags},
            signatures::TypeSignature,
        },
        model::{
            MethodBuilder, MethodId, MethodInst, ModuleSet, ModuleSetBuilder, TypeBuilder, TypeSig,
        },
        reachability::ReachabilityAnalyzer,
        test::{calculator_set, corlib},
        BuildConfig,
    };

    use super::*;

    fn build(set: &ModuleSet) -> IrModule {
        let reachable = ReachabilityAnalyzer::new(set).analyze().unwrap();
        IrBuilder::new(set, &reachable, &BuildConfig::default())
            .build()
            .unwrap()
    }

    fn body(module: &IrModule, method: MethodId) -> &IrBody {
        module
            .method(module.method_of(&MethodInst::plain(method)).unwrap())
            .body()
    }

    /// A program whose `Main` calls `method` on `App.Program` with `args` int arguments.
    fn program_with(
        configure: impl FnOnce(&mut ModuleSetBuilder, crate::model::TypeId) -> MethodId,
        args: usize,
    ) -> (ModuleSet, MethodId) {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let program = builder
            .add_type(app, TypeBuilder::class("App", "Program").extends(corlib.object))
            .unwrap();
        let method = configure(&mut builder, program);
        let token = builder.method_token(app, method).unwrap();
        let main = builder
            .add_method(
                program,
                MethodBuilder::static_method("Main").implementation(move |asm| {
                    for _ in 0..args {
                        asm.ldc_i4(1)?;
                    }
                    asm.call(token)?.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        builder.set_entry_point(main);
        (builder.build().unwrap(), method)
    }

    #[test]
    fn arithmetic_body_is_not_stub_shaped() {
        let (set, ids) = calculator_set().unwrap();
        let module = build(&set);

        let add = body(&module, ids.add);
        assert!(!add.is_stub());
        assert!(!add.stub_shaped());
        let blocks = add.blocks();
        assert!(blocks[0].instructions.iter().any(|instr| matches!(
            instr,
            IrInstr::Binary {
                op: crate::ir::body::BinaryOp::Add,
                ..
            }
        )));

        // an empty constructor is lowered, and only looks like a stub
        let ctor = body(&module, ids.ctor);
        assert!(!ctor.is_stub());
        assert!(ctor.stub_shaped());
    }

    #[test]
    fn runtime_provided_methods_are_stubs() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let program = builder
            .add_type(app, TypeBuilder::class("App", "Program").extends(corlib.object))
            .unwrap();
        let write_line = builder.method_token(app, corlib.write_line_int).unwrap();
        let main = builder
            .add_method(
                program,
                MethodBuilder::static_method("Main").implementation(move |asm| {
                    asm.ldc_i4(7)?.call(write_line)?.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        builder.set_entry_point(main);
        let set = builder.build().unwrap();
        let module = build(&set);

        assert_eq!(
            body(&module, corlib.write_line_int).stub_reason(),
            Some(&StubReason::InternalCall)
        );
        assert!(!body(&module, main).is_stub());
    }

    #[test]
    fn unsupported_instruction_makes_a_stub() {
        let (set, method) = program_with(
            |builder, program| {
                builder
                    .add_method(
                        program,
                        MethodBuilder::static_method("Scratch").implementation(|asm| {
                            asm.ldc_i4(16)?.emit("localloc")?.pop()?.ret()?;
                            Ok(())
                        }),
                    )
                    .unwrap()
            },
            0,
        );
        let module = build(&set);
        match body(&module, method).stub_reason() {
            Some(StubReason::Unsupported { offset, instruction }) => {
                // after ldc.i4.s 16
                assert_eq!(*offset, 2);
                assert!(instruction.contains("localloc"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stack_values_cross_blocks_through_slots() {
        // static int Pick(bool flag) => flag ? 2 : 1;
        let (set, method) = program_with(
            |builder, program| {
                builder
                    .add_method(
                        program,
                        MethodBuilder::static_method("Pick")
                            .param("flag", TypeSignature::Boolean)
                            .returns(TypeSignature::I4)
                            .implementation(|asm| {
                                let two = asm.define_label();
                                let done = asm.define_label();
                                asm.ldarg(0)?.brtrue(two)?.ldc_i4(1)?.br(done)?;
                                asm.mark_label(two)?.ldc_i4(2)?;
                                asm.mark_label(done)?.ret()?;
                                Ok(())
                            }),
                    )
                    .unwrap()
            },
            1,
        );
        let module = build(&set);
        let lowered = body(&module, method).lowered().unwrap();

        assert_eq!(lowered.blocks.len(), 4);
        assert_eq!(lowered.slots, vec![TypeSig::I4]);
        let join = &lowered.blocks[3];
        assert_eq!(
            join.instructions[0],
            IrInstr::Move {
                dest: crate::ir::body::IrValue::Temp(
                    match &join.instructions[1] {
                        IrInstr::Return {
                            value: Some(crate::ir::body::IrValue::Temp(index)),
                        } => *index,
                        other => panic!("unexpected {other:?}"),
                    }
                ),
                value: crate::ir::body::IrValue::Slot(0),
            }
        );
        for predecessor in &lowered.blocks[1..3] {
            assert!(predecessor.instructions.iter().any(|instr| matches!(
                instr,
                IrInstr::Move {
                    dest: crate::ir::body::IrValue::Slot(0),
                    ..
                }
            )));
        }
    }

    #[test]
    fn try_finally_becomes_a_region() {
        // try { nop; leave end } finally { endfinally } end: ret
        let handler = ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: 6,
            handler_offset: 6,
            handler_length: 1,
            class_token_or_filter: 0,
        };
        let (set, method) = program_with(
            |builder, program| {
                builder
                    .add_method(
                        program,
                        MethodBuilder::static_method("Guarded")
                            .exception_handler(handler)
                            .implementation(|asm| {
                                let end = asm.define_label();
                                asm.emit("nop")?.leave(end)?.emit("endfinally")?;
                                asm.mark_label(end)?.ret()?;
                                Ok(())
                            }),
                    )
                    .unwrap()
            },
            0,
        );
        let module = build(&set);
        let lowered = body(&module, method).lowered().unwrap();

        assert_eq!(lowered.regions.len(), 1);
        let region = &lowered.regions[0];
        assert_eq!(region.kind, RegionKind::Finally);
        assert_eq!((region.try_start, region.try_end), (0, 1));
        assert_eq!((region.handler_start, region.handler_end), (1, 2));
        assert_eq!(lowered.blocks[0].terminator(), Some(&IrInstr::Leave { target: 2 }));
        assert_eq!(lowered.blocks[1].terminator(), Some(&IrInstr::EndFinally));
    }

    #[test]
    fn oversized_clause_makes_a_stub() {
        let handler = ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 1,
            try_length: u32::MAX,
            handler_offset: u32::MAX,
            handler_length: u32::MAX,
            class_token_or_filter: 0,
        };
        let (set, method) = program_with(
            |builder, program| {
                builder
                    .add_method(
                        program,
                        MethodBuilder::static_method("Broken")
                            .exception_handler(handler)
                            .implementation(|asm| {
                                asm.emit("nop")?.ret()?;
                                Ok(())
                            }),
                    )
                    .unwrap()
            },
            0,
        );
        let module = build(&set);
        match body(&module, method).stub_reason() {
            Some(StubReason::Unresolved { offset, .. }) => {
                assert_eq!(*offset, 1 + u64::from(u32::MAX));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn class_init_guard_once_per_block() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let counter = builder
            .add_type(app, TypeBuilder::class("App", "Counter").extends(corlib.object))
            .unwrap();
        let count = builder.add_static_field(counter, "Count", TypeSignature::I4);
        let count_token = builder.field_token(app, count).unwrap();
        let cctor = builder
            .add_method(
                counter,
                MethodBuilder::static_constructor().implementation(move |asm| {
                    asm.ldc_i4(1)?.emit_token("stsfld", count_token)?.ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        let program = builder
            .add_type(app, TypeBuilder::class("App", "Program").extends(corlib.object))
            .unwrap();
        let main = builder
            .add_method(
                program,
                MethodBuilder::static_method("Main").implementation(move |asm| {
                    asm.emit_token("ldsfld", count_token)?
                        .emit_token("ldsfld", count_token)?
                        .add()?
                        .pop()?
                        .ret()?;
                    Ok(())
                }),
            )
            .unwrap();
        builder.set_entry_point(main);
        let set = builder.build().unwrap();
        let module = build(&set);

        let guards = |method| {
            body(&module, method)
                .blocks()
                .iter()
                .flat_map(|block| block.instructions.clone())
                .filter(|instr| matches!(instr, IrInstr::EnsureClassInit { .. }))
                .count()
        };
        assert_eq!(guards(main), 1);
        assert_eq!(guards(cctor), 0);
    }
}
