//! Fixtures shared by the integration tests: a miniature core library built in memory.

#![allow(dead_code)]

use dotnative::{
    metadata::{flags::TypeAttributes, method::MethodImplAttributes, signatures::TypeSignature},
    prelude::*,
};

pub const SEALED: u32 = TypeAttributes::PUBLIC | TypeAttributes::SEALED;
pub const ABSTRACT: u32 = TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT;
pub const STATIC_CLASS: u32 = ABSTRACT | TypeAttributes::SEALED;

/// Ids of the core library members the tests reference.
#[derive(Debug, Clone, Copy)]
pub struct Core {
    pub module: ModuleId,
    pub object: TypeId,
    pub value_type: TypeId,
    pub enum_type: TypeId,
    pub type_type: TypeId,
    pub attribute: TypeId,
    pub exception: TypeId,
    pub object_ctor: MethodId,
    pub exception_ctor: MethodId,
    pub attribute_ctor: MethodId,
    pub write_line_string: MethodId,
    pub write_line_int: MethodId,
    pub pop_count: MethodId,
}

/// `System.Runtime` with the object model, a few primitives, `Console` and `BitOperations`.
pub fn core(builder: &mut ModuleSetBuilder) -> Result<Core> {
    let module = builder.module("System.Runtime");
    let object = builder.add_type(module, TypeBuilder::class("System", "Object"))?;
    let value_type = builder.add_type(
        module,
        TypeBuilder::class("System", "ValueType").flags(ABSTRACT).extends(object),
    )?;
    let enum_type = builder.add_type(
        module,
        TypeBuilder::class("System", "Enum").flags(ABSTRACT).extends(value_type),
    )?;
    builder.add_type(module, TypeBuilder::class("System", "String").flags(SEALED).extends(object))?;
    builder.add_type(module, TypeBuilder::class("System", "Array").flags(ABSTRACT).extends(object))?;
    let type_type = builder.add_type(
        module,
        TypeBuilder::class("System", "Type").flags(ABSTRACT).extends(object),
    )?;
    for (name, value) in [
        ("Int32", TypeSignature::I4),
        ("UInt32", TypeSignature::U4),
        ("Boolean", TypeSignature::Boolean),
    ] {
        let ty = builder.add_type(
            module,
            TypeBuilder::class("System", name).flags(SEALED).extends(value_type),
        )?;
        builder.add_instance_field(ty, "m_value", value);
    }

    let object_ctor = builder.add_method(
        object,
        MethodBuilder::constructor().implementation(|asm| {
            asm.ret()?;
            Ok(())
        }),
    )?;
    let base_ctor = builder.method_token(module, object_ctor)?;

    let exception = builder.add_type(
        module,
        TypeBuilder::class("System", "Exception").extends(object),
    )?;
    let exception_ctor = builder.add_method(
        exception,
        MethodBuilder::constructor().implementation(move |asm| {
            asm.ldarg(0)?.call(base_ctor)?.ret()?;
            Ok(())
        }),
    )?;

    let attribute = builder.add_type(
        module,
        TypeBuilder::class("System", "Attribute").flags(ABSTRACT).extends(object),
    )?;
    let attribute_ctor = builder.add_method(
        attribute,
        MethodBuilder::constructor().implementation(move |asm| {
            asm.ldarg(0)?.call(base_ctor)?.ret()?;
            Ok(())
        }),
    )?;

    let console = builder.add_type(
        module,
        TypeBuilder::class("System", "Console").flags(STATIC_CLASS).extends(object),
    )?;
    let write_line = |ty: TypeSignature| {
        MethodBuilder::static_method("WriteLine")
            .param("value", ty)
            .impl_flags(MethodImplAttributes::INTERNAL_CALL)
    };
    let write_line_string = builder.add_method(console, write_line(TypeSignature::String))?;
    let write_line_int = builder.add_method(console, write_line(TypeSignature::I4))?;

    let bit_operations = builder.add_type(
        module,
        TypeBuilder::class("System.Numerics", "BitOperations")
            .flags(STATIC_CLASS)
            .extends(object),
    )?;
    let pop_count = builder.add_method(
        bit_operations,
        MethodBuilder::static_method("PopCount")
            .param("value", TypeSignature::U4)
            .returns(TypeSignature::I4)
            .impl_flags(MethodImplAttributes::INTERNAL_CALL),
    )?;

    Ok(Core {
        module,
        object,
        value_type,
        enum_type,
        type_type,
        attribute,
        exception,
        object_ctor,
        exception_ctor,
        attribute_ctor,
        write_line_string,
        write_line_int,
        pop_count,
    })
}

/// Adds `App.Program` with a static `Main` built by `body` and makes it the entry point.
pub fn program<F>(builder: &mut ModuleSetBuilder, core: &Core, app: ModuleId, body: F) -> Result<MethodId>
where
    F: FnOnce(&mut InstructionAssembler) -> Result<()> + 'static,
{
    let program = builder.add_type(
        app,
        TypeBuilder::class("App", "Program").extends(core.object),
    )?;
    let main = builder.add_method(program, MethodBuilder::static_method("Main").implementation(body))?;
    builder.set_entry_point(main);
    Ok(main)
}
