//! End-to-end compilations of small programs built in memory.

mod common;

use dotnative::{
    ir::IrAttributeArg,
    metadata::{
        customattributes::{CustomAttributeArgument, CustomAttributeEncoder},
        method::MethodAttributes,
        signatures::TypeSignature,
    },
    model::AttributeTarget,
    prelude::*,
};

use common::{core, program};

/// `App.Calc` with a default constructor and `int Add(int, int)` called from `Main`.
#[test]
fn calculator_compiles_without_stubs() -> Result<()> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;
    let app = builder.module("App");

    let calc = builder.add_type(app, TypeBuilder::class("App", "Calc").extends(core.object))?;
    let ctor = builder.add_method(
        calc,
        MethodBuilder::constructor().implementation(|asm| {
            asm.ret()?;
            Ok(())
        }),
    )?;
    let add = builder.add_method(
        calc,
        MethodBuilder::instance_method("Add")
            .param("a", TypeSignature::I4)
            .param("b", TypeSignature::I4)
            .returns(TypeSignature::I4)
            .implementation(|asm| {
                asm.ldarg(1)?.ldarg(2)?.add()?.ret()?;
                Ok(())
            }),
    )?;
    let ctor = builder.method_token(app, ctor)?;
    let add = builder.method_token(app, add)?;
    program(&mut builder, &core, app, move |asm| {
        asm.newobj(ctor)?
            .ldc_i4(2)?
            .ldc_i4(3)?
            .call(add)?
            .pop()?
            .ret()?;
        Ok(())
    })?;
    let set = builder.build()?;

    let output = Compiler::new(BuildConfig::release()).compile(&set)?;
    assert_eq!(output.reachability.methods, 3);
    assert_eq!(output.ir.methods, 3);
    assert_eq!(output.ir.stubs, 0);
    assert!(output.analysis.is_empty());
    assert!(output.has_entry_point);

    let source = &output.generated.file("App.cpp").unwrap().contents;
    assert!(source.contains(
        "int32_t App_N_Calc_D_Add_P2_System_N_Int32_C_System_N_Int32_R_System_N_Int32("
    ));
    let main = &output.generated.file("main.cpp").unwrap().contents;
    assert!(main.contains("App_N_Program_D_Main_P0_R_System_N_Void();"));
    Ok(())
}

/// A `constrained.` call to a static abstract interface member cannot be lowered.
#[test]
fn static_abstract_dispatch_becomes_one_stub() -> Result<()> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;
    let app = builder.module("App");

    let parser = builder.add_type(app, TypeBuilder::interface("App", "IParser"))?;
    let parse = builder.add_method(
        parser,
        MethodBuilder::abstract_method("Parse")
            .flags(
                MethodAttributes::PUBLIC
                    | MethodAttributes::STATIC
                    | MethodAttributes::VIRTUAL
                    | MethodAttributes::ABSTRACT
                    | MethodAttributes::HIDE_BY_SIG,
            )
            .returns(TypeSignature::I4),
    )?;
    let decimal = builder.add_type(
        app,
        TypeBuilder::class("App", "DecimalParser")
            .extends(core.object)
            .implements(parser),
    )?;
    builder.add_method(
        decimal,
        MethodBuilder::static_method("Parse")
            .returns(TypeSignature::I4)
            .implementation(|asm| {
                asm.ldc_i4(10)?.ret()?;
                Ok(())
            }),
    )?;

    let dispatcher = builder.add_type(
        app,
        TypeBuilder::class("App", "Dispatcher").extends(core.object),
    )?;
    let constraint = builder.type_token(app, decimal)?;
    let parse = builder.method_token(app, parse)?;
    let dispatch = builder.add_method(
        dispatcher,
        MethodBuilder::static_method("Dispatch")
            .returns(TypeSignature::I4)
            .implementation(move |asm| {
                asm.emit_token("constrained.", constraint)?.call(parse)?.ret()?;
                Ok(())
            }),
    )?;
    let dispatch = builder.method_token(app, dispatch)?;
    program(&mut builder, &core, app, move |asm| {
        asm.call(dispatch)?.pop()?.ret()?;
        Ok(())
    })?;
    let set = builder.build()?;

    let config = BuildConfig::builder().stub_analysis(true).build();
    let output = Compiler::new(config).compile(&set)?;

    let mangled = "App_N_Dispatcher_D_Dispatch_P0_R_System_N_Int32";
    assert_eq!(output.analysis.len(), 1);
    assert_eq!(output.analysis.count(StubCategory::StaticAbstractDispatch), 1);
    assert_eq!(
        output.analysis.find(mangled).map(|entry| entry.category),
        Some(StubCategory::StaticAbstractDispatch)
    );

    let source = &output.generated.file("App.cpp").unwrap().contents;
    assert!(source.contains(&format!("int32_t {mangled}() {{")));
    assert!(source.contains("return int32_t{};"));

    let report = &output.generated.file("stub_report.txt").unwrap().contents;
    assert!(report.starts_with("Stub analysis: 1 method(s) without implementation"));
    assert!(report.contains("[static abstract interface dispatch] System.Int32 App.Dispatcher::Dispatch()"));
    Ok(())
}

/// `[Mark(42, "hello", Color.Blue, typeof(Other))]` keeps all four arguments.
#[test]
fn attribute_arguments_are_collected() -> Result<()> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;
    let app = builder.module("App");

    let color = builder.add_type(
        app,
        TypeBuilder::class("App", "Color")
            .flags(common::SEALED)
            .extends(core.enum_type),
    )?;
    builder.add_instance_field(color, "value__", TypeSignature::I4);
    let other = builder.add_type(app, TypeBuilder::class("App", "Other").extends(core.object))?;

    let mark = builder.add_type(
        app,
        TypeBuilder::class("App", "MarkAttribute").extends(core.attribute),
    )?;
    let color_sig = builder.type_signature(app, color)?;
    let type_sig = builder.type_signature(app, core.type_type)?;
    let mark_ctor = builder.add_method(
        mark,
        MethodBuilder::constructor()
            .param("count", TypeSignature::I4)
            .param("label", TypeSignature::String)
            .param("color", color_sig)
            .param("target", type_sig)
            .implementation(|asm| {
                asm.ret()?;
                Ok(())
            }),
    )?;

    let main = program(&mut builder, &core, app, |asm| {
        asm.ret()?;
        Ok(())
    })?;

    let blob = CustomAttributeEncoder::new()
        .fixed(&CustomAttributeArgument::I4(42))?
        .fixed(&CustomAttributeArgument::String("hello".to_string()))?
        .fixed(&CustomAttributeArgument::Enum {
            type_name: "App.Color".to_string(),
            value: Box::new(CustomAttributeArgument::I4(2)),
        })?
        .fixed(&CustomAttributeArgument::Type("App.Other".to_string()))?
        .finish()?;
    builder.add_attribute(AttributeTarget::Method(main), mark_ctor, blob)?;
    let set = builder.build()?;

    let config = BuildConfig::default();
    let reachable = ReachabilityAnalyzer::new(&set).analyze()?;
    let module = IrBuilder::new(&set, &reachable, &config).build()?;
    let main = module.method(module.entry_point.unwrap());

    assert_eq!(main.attributes.len(), 1);
    let attribute = &main.attributes[0];
    assert_eq!(attribute.type_name, "App.MarkAttribute");
    assert_eq!(
        attribute.args,
        vec![
            IrAttributeArg::Int {
                value: 42,
                ty: TypeSig::I4
            },
            IrAttributeArg::String("hello".to_string()),
            IrAttributeArg::Enum {
                type_name: "App.Color".to_string(),
                ty: Some(set.def_sig(color, Vec::new())),
                value: 2,
            },
            IrAttributeArg::Type {
                name: "App.Other".to_string(),
                ty: Some(set.def_sig(other, Vec::new())),
            },
        ]
    );
    Ok(())
}

/// Overloads differing in one parameter type get distinct native names.
#[test]
fn overloads_mangle_apart() -> Result<()> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;
    let app = builder.module("App");

    let printer = builder.add_type(app, TypeBuilder::class("App", "Printer").extends(core.object))?;
    let print = |ty: TypeSignature| {
        MethodBuilder::static_method("Print")
            .param("value", ty)
            .implementation(|asm| {
                asm.ret()?;
                Ok(())
            })
    };
    let print_int = builder.add_method(printer, print(TypeSignature::I4))?;
    let print_string = builder.add_method(printer, print(TypeSignature::String))?;
    let print_int = builder.method_token(app, print_int)?;
    let print_string = builder.method_token(app, print_string)?;
    let hello = builder.user_string(app, "hello");
    program(&mut builder, &core, app, move |asm| {
        asm.ldc_i4(1)?
            .call(print_int)?
            .ldstr(hello)?
            .call(print_string)?
            .ret()?;
        Ok(())
    })?;
    let set = builder.build()?;

    let output = Compiler::new(BuildConfig::release()).compile(&set)?;
    let header = &output.generated.file("App.h").unwrap().contents;
    assert!(header.contains("void App_N_Printer_D_Print_P1_System_N_Int32_R_System_N_Void("));
    assert!(header.contains("void App_N_Printer_D_Print_P1_System_N_String_R_System_N_Void("));
    Ok(())
}

/// A module without an entry method compiles as a library.
#[test]
fn library_has_no_entry_artifact() -> Result<()> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;
    let lib = builder.module("Lib");
    let api = builder.add_type(lib, TypeBuilder::class("Lib", "Api").extends(core.object))?;
    builder.add_method(
        api,
        MethodBuilder::static_method("Run")
            .returns(TypeSignature::I4)
            .implementation(|asm| {
                asm.ldc_i4(7)?.ret()?;
                Ok(())
            }),
    )?;
    builder.set_root(lib);
    let set = builder.build()?;

    let config = BuildConfig::release();
    let reachable = ReachabilityAnalyzer::new(&set).library_roots().analyze()?;
    let module = IrBuilder::new(&set, &reachable, &config).build()?;
    assert!(module.entry_point.is_none());

    let output = Generator::new(&set, &module, &config).generate()?;
    assert!(output.file("main.cpp").is_none());
    let cmake = &output.file("CMakeLists.txt").unwrap().contents;
    assert!(cmake.contains("add_library(Lib STATIC"));

    let compiled = Compiler::new(config).compile(&set)?;
    assert!(!compiled.has_entry_point);
    assert_eq!(compiled.generated.files.len(), output.files.len());
    Ok(())
}

/// Two referenced assemblies each define `Shared.Helper::Run`.
#[test]
fn same_type_name_in_two_assemblies() -> Result<()> {
    let mut builder = ModuleSetBuilder::new();
    let core = core(&mut builder)?;

    let mut runs = Vec::new();
    for (name, value) in [("LibA", 1), ("LibB", 2)] {
        let lib = builder.module(name);
        let helper = builder.add_type(
            lib,
            TypeBuilder::class("Shared", "Helper").extends(core.object),
        )?;
        runs.push(builder.add_method(
            helper,
            MethodBuilder::static_method("Run")
                .returns(TypeSignature::I4)
                .implementation(move |asm| {
                    asm.ldc_i4(value)?.ret()?;
                    Ok(())
                }),
        )?);
    }

    let app = builder.module("App");
    let first = builder.method_token(app, runs[0])?;
    let second = builder.method_token(app, runs[1])?;
    program(&mut builder, &core, app, move |asm| {
        asm.call(first)?.pop()?.call(second)?.pop()?.ret()?;
        Ok(())
    })?;
    let set = builder.build()?;

    let output = Compiler::new(BuildConfig::release()).compile(&set)?;
    assert_eq!(output.ir.methods, 3);

    let all: String = output
        .generated
        .files
        .iter()
        .map(|file| file.contents.as_str())
        .collect();
    for qualified in [
        "LibA_Y_Shared_N_Helper_D_Run_P0_R_System_N_Int32",
        "LibB_Y_Shared_N_Helper_D_Run_P0_R_System_N_Int32",
    ] {
        assert!(all.contains(&format!("int32_t {qualified}() {{")), "{qualified}");
    }
    assert!(!all.contains(" Shared_N_Helper_D_Run"));
    Ok(())
}
