//! Properties of the generated C++ that only show up across the whole pipeline.

mod common;

use dotnative::{
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags},
        signatures::TypeSignature,
    },
    prelude::*,
};

use common::{core, program};

const POP_COUNT: &str =
    "System_N_Numerics_N_BitOperations_D_PopCount_P1_System_N_UInt32_R_System_N_Int32";
const WRITE_LINE_INT: &str = "System_N_Console_D_WriteLine_P1_System_N_Int32_R_System_N_Void";

/// `Console.WriteLine(BitOperations.PopCount(7))`
fn pop_count_program() -> Result<ModuleSet> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;
    let app = builder.module("App");
    let pop_count = builder.method_token(app, core.pop_count)?;
    let write_line = builder.method_token(app, core.write_line_int)?;
    program(&mut builder, &core, app, move |asm| {
        asm.ldc_i4(7)?.call(pop_count)?.call(write_line)?.ret()?;
        Ok(())
    })?;
    builder.build()
}

#[test]
fn known_stubs_use_the_knowledge_base() -> Result<()> {
    let set = pop_count_program()?;
    let output = Compiler::new(BuildConfig::debug()).compile(&set)?;

    assert_eq!(output.generated.known_stubs, 1);
    assert_eq!(output.generated.unknown_stubs, 1);
    assert!(output.analysis.find(POP_COUNT).is_none());
    assert_eq!(
        output.analysis.find(WRITE_LINE_INT).map(|entry| entry.category),
        Some(StubCategory::InternalCall)
    );

    let source = &output.generated.file("App.cpp").unwrap().contents;
    let known = dotnative::codegen::knowledge::known_body(POP_COUNT).unwrap();
    let first = known.lines().find(|line| !line.trim().is_empty()).unwrap();
    assert!(source.contains(first.trim()));
    Ok(())
}

#[test]
fn debug_builds_annotate_the_output() -> Result<()> {
    let set = pop_count_program()?;

    let debug = Compiler::new(BuildConfig::debug()).compile(&set)?;
    let header = &debug.generated.file("App.h").unwrap().contents;
    let source = &debug.generated.file("App.cpp").unwrap().contents;
    assert!(header.contains("#define CIL2CPP_CAPTURE_STACK_TRACES"));
    assert!(source.contains("// IL_0000"));
    assert!(debug.generated.file("stub_report.txt").is_some());

    let release = Compiler::new(BuildConfig::release()).compile(&set)?;
    let header = &release.generated.file("App.h").unwrap().contents;
    let source = &release.generated.file("App.cpp").unwrap().contents;
    assert!(!header.contains("CIL2CPP_CAPTURE_STACK_TRACES"));
    assert!(!source.contains("// IL_"));
    assert!(release.generated.file("stub_report.txt").is_none());
    Ok(())
}

#[test]
fn static_fields_are_guarded() -> Result<()> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;
    let app = builder.module("App");
    let counter = builder.add_type(app, TypeBuilder::class("App", "Counter").extends(core.object))?;
    let count = builder.add_static_field(counter, "Count", TypeSignature::I4);
    let count = builder.field_token(app, count)?;
    builder.add_method(
        counter,
        MethodBuilder::static_constructor().implementation(move |asm| {
            asm.ldc_i4(1)?.emit_token("stsfld", count)?.ret()?;
            Ok(())
        }),
    )?;
    program(&mut builder, &core, app, move |asm| {
        asm.emit_token("ldsfld", count)?.pop()?.ret()?;
        Ok(())
    })?;
    let set = builder.build()?;

    let output = Compiler::new(BuildConfig::release()).compile(&set)?;
    let header = &output.generated.file("App.h").unwrap().contents;
    let source = &output.generated.file("App.cpp").unwrap().contents;

    assert!(header.contains("void App_N_Counter_ensure_cctor();"));
    assert!(source.contains("void App_N_Counter_ensure_cctor() {"));
    assert!(source.contains("App_N_Counter_Statics App_N_Counter_statics{};"));
    assert_eq!(source.matches("    App_N_Counter_ensure_cctor();").count(), 1);
    Ok(())
}

#[test]
fn finally_handlers_are_structured() -> Result<()> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;
    let app = builder.module("App");
    let write_line = builder.method_token(app, core.write_line_int)?;

    // try { WriteLine(1); leave end } finally { endfinally } end: ret
    let handler = ExceptionHandler {
        flags: ExceptionHandlerFlags::FINALLY,
        try_offset: 0,
        try_length: 11,
        handler_offset: 11,
        handler_length: 1,
        class_token_or_filter: 0,
    };
    let program_type = builder.add_type(
        app,
        TypeBuilder::class("App", "Program").extends(core.object),
    )?;
    let main = builder.add_method(
        program_type,
        MethodBuilder::static_method("Main")
            .exception_handler(handler)
            .implementation(move |asm| {
                let end = asm.define_label();
                asm.ldc_i4(1)?
                    .call(write_line)?
                    .leave(end)?
                    .emit("endfinally")?;
                asm.mark_label(end)?.ret()?;
                Ok(())
            }),
    )?;
    builder.set_entry_point(main);
    let set = builder.build()?;

    let output = Compiler::new(BuildConfig::release()).compile(&set)?;
    assert_eq!(output.ir.stubs, 1);

    let source = &output.generated.file("App.cpp").unwrap().contents;
    let try_at = source.find("CIL2CPP_TRY").unwrap();
    let end_at = source.find("CIL2CPP_END_TRY").unwrap();
    assert!(try_at < end_at);
    assert!(source[try_at..end_at].contains(WRITE_LINE_INT));
    Ok(())
}

#[test]
fn output_is_deterministic() -> Result<()> {
    let set = pop_count_program()?;
    let compiler = Compiler::new(BuildConfig::debug());
    let first = compiler.compile(&set)?;
    let second = compiler.compile(&set)?;
    assert_eq!(first.generated.files, second.generated.files);
    Ok(())
}

#[test]
fn artifacts_are_written_to_disk() -> Result<()> {
    let set = pop_count_program()?;
    let output = Compiler::new(BuildConfig::release()).compile(&set)?;

    let directory = std::env::temp_dir().join(format!("dotnative-{}", std::process::id()));
    output.generated.write_to(&directory)?;
    for file in &output.generated.files {
        assert_eq!(std::fs::read_to_string(directory.join(&file.name))?, file.contents);
    }
    std::fs::remove_dir_all(&directory)?;
    Ok(())
}
