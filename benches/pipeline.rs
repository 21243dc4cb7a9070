//! Benchmarks for the compilation pipeline.
//!
//! A synthetic program of chained static methods is built in memory once, then each stage
//! is measured on its own:
//! - Reachability fixed point
//! - IR shells and parallel lowering
//! - C++ generation
//! - The whole pipeline through `Compiler`

extern crate dotnative;

use criterion::{criterion_group, criterion_main, Criterion};
use dotnative::{
    codegen::{knowledge::known_body, mangle::escape},
    metadata::signatures::TypeSignature,
    prelude::*,
};
use std::hint::black_box;

const WORKERS: usize = 200;

/// `Main` calls `Worker0.Step`, every `Step` adds one and calls the next worker.
fn chain() -> Result<ModuleSet> {
    let mut builder = ModuleSetBuilder::new();
    let core = builder.module("System.Runtime");
    let object = builder.add_type(core, TypeBuilder::class("System", "Object"))?;
    let value_type =
        builder.add_type(core, TypeBuilder::class("System", "ValueType").extends(object))?;
    let int32 = builder.add_type(
        core,
        TypeBuilder::class("System", "Int32").extends(value_type),
    )?;
    builder.add_instance_field(int32, "m_value", TypeSignature::I4);
    builder.add_type(core, TypeBuilder::class("System", "String").extends(object))?;

    let app = builder.module("App");
    let mut next: Option<Token> = None;
    for index in (0..WORKERS).rev() {
        let worker = builder.add_type(
            app,
            TypeBuilder::class("App", &format!("Worker{index}")).extends(object),
        )?;
        let callee = next;
        let step = builder.add_method(
            worker,
            MethodBuilder::static_method("Step")
                .param("value", TypeSignature::I4)
                .returns(TypeSignature::I4)
                .implementation(move |asm| {
                    asm.ldarg(0)?.ldc_i4(1)?.add()?;
                    if let Some(callee) = callee {
                        asm.call(callee)?;
                    }
                    asm.ret()?;
                    Ok(())
                }),
        )?;
        next = Some(builder.method_token(app, step)?);
    }

    let first = next;
    let program = builder.add_type(app, TypeBuilder::class("App", "Program").extends(object))?;
    let main = builder.add_method(
        program,
        MethodBuilder::static_method("Main").implementation(move |asm| {
            asm.ldc_i4(0)?;
            if let Some(first) = first {
                asm.call(first)?;
            }
            asm.pop()?.ret()?;
            Ok(())
        }),
    )?;
    builder.set_entry_point(main);
    builder.build()
}

fn bench_reachability(c: &mut Criterion) {
    let set = chain().unwrap();

    c.bench_function("pipeline_reachability", |b| {
        b.iter(|| {
            let result = ReachabilityAnalyzer::new(black_box(&set)).analyze().unwrap();
            black_box(result)
        });
    });
}

fn bench_ir(c: &mut Criterion) {
    let set = chain().unwrap();
    let config = BuildConfig::release();
    let reachable = ReachabilityAnalyzer::new(&set).analyze().unwrap();

    c.bench_function("pipeline_ir", |b| {
        b.iter(|| {
            let module = IrBuilder::new(black_box(&set), &reachable, &config)
                .build()
                .unwrap();
            black_box(module)
        });
    });
}

fn bench_codegen(c: &mut Criterion) {
    let set = chain().unwrap();
    let config = BuildConfig::debug();
    let reachable = ReachabilityAnalyzer::new(&set).analyze().unwrap();
    let module = IrBuilder::new(&set, &reachable, &config).build().unwrap();

    c.bench_function("pipeline_codegen", |b| {
        b.iter(|| {
            let output = Generator::new(black_box(&set), &module, &config)
                .generate()
                .unwrap();
            black_box(output)
        });
    });
}

fn bench_compile(c: &mut Criterion) {
    let set = chain().unwrap();
    let compiler = Compiler::new(BuildConfig::release());

    c.bench_function("pipeline_compile", |b| {
        b.iter(|| {
            let output = compiler.compile(black_box(&set)).unwrap();
            black_box(output)
        });
    });
}

fn bench_names(c: &mut Criterion) {
    let name = "System.Collections.Generic.Dictionary`2/Enumerator";
    let known = "System_N_Numerics_N_BitOperations_D_PopCount_P1_System_N_UInt32_R_System_N_Int32";

    c.bench_function("pipeline_escape", |b| {
        b.iter(|| black_box(escape(black_box(name))));
    });
    c.bench_function("pipeline_known_body", |b| {
        b.iter(|| black_box(known_body(black_box(known))));
    });
}

criterion_group!(
    benches,
    bench_reachability,
    bench_ir,
    bench_codegen,
    bench_compile,
    bench_names
);
criterion_main!(benches);
