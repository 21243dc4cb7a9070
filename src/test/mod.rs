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

//! Shared fixtures for unit tests: a miniature core library and small programs on top.


use crate::{
    metadata::{
        flags::TypeAttributes,
        method::MethodImplAttributes,
        signatures::TypeSignature,
        token::Token,
    },
    model::{MethodBuilder, MethodId, ModuleId, ModuleSet, ModuleSetBuilder, TypeBuilder, TypeId},
    Result,
};

/// Ids of the core library types and members the fixtures use.
#[derive(Debug, Clone, Copy)]
pub struct Corlib {
    pub module: ModuleId,
    pub object: TypeId,
    pub value_type: TypeId,
    pub enum_type: TypeId,
    pub string: TypeId,
    pub int32: TypeId,
    pub uint32: TypeId,
    pub exception: TypeId,
    pub attribute: TypeId,
    pub type_type: TypeId,
    pub console: TypeId,
    pub bit_operations: TypeId,
    pub object_ctor: MethodId,
    pub object_to_string: MethodId,
    pub exception_ctor: MethodId,
    pub attribute_ctor: MethodId,
    pub write_line_string: MethodId,
    pub write_line_int: MethodId,
    pub pop_count: MethodId,
}

pub const SEALED: u32 = TypeAttributes::PUBLIC | TypeAttributes::SEALED;
const ABSTRACT: u32 = TypeAttributes::PUBLIC | TypeAttributes::ABSTRACT;
const STATIC_CLASS: u32 = ABSTRACT | TypeAttributes::SEALED;

fn internal_call(builder: MethodBuilder) -> MethodBuilder {
    builder.impl_flags(MethodImplAttributes::INTERNAL_CALL)
}

/// Builds `System.Runtime` with the handful of types programs in tests need.
pub fn corlib(builder: &mut ModuleSetBuilder) -> Result<Corlib> {
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

    let object_ctor = builder.add_method(
        object,
        MethodBuilder::constructor().implementation(|asm| {
            asm.ret()?;
            Ok(())
        }),
    )?;
    let object_name = builder.user_string(module, "System.Object");
    let object_to_string = builder.add_method(
        object,
        MethodBuilder::virtual_method("ToString")
            .returns(TypeSignature::String)
            .implementation(move |asm| {
                asm.ldstr(object_name)?.ret()?;
                Ok(())
            }),
    )?;

    let string = builder.add_type(
        module,
        TypeBuilder::class("System", "String").flags(SEALED).extends(object),
    )?;
    builder.add_method(
        string,
        internal_call(
            MethodBuilder::static_method("Concat")
                .param("str0", TypeSignature::String)
                .param("str1", TypeSignature::String)
                .returns(TypeSignature::String),
        ),
    )?;
    builder.add_method(
        string,
        internal_call(MethodBuilder::instance_method("get_Length").returns(TypeSignature::I4)),
    )?;

    let mut primitive = |name: &str, value: TypeSignature| -> Result<TypeId> {
        let ty = builder.add_type(
            module,
            TypeBuilder::class("System", name).flags(SEALED).extends(value_type),
        )?;
        builder.add_field(ty, "m_value", 0x0001, value);
        Ok(ty)
    };
    let int32 = primitive("Int32", TypeSignature::I4)?;
    let uint32 = primitive("UInt32", TypeSignature::U4)?;
    primitive("Boolean", TypeSignature::Boolean)?;
    primitive("Char", TypeSignature::Char)?;
    primitive("Byte", TypeSignature::U1)?;

    builder.add_type(
        module,
        TypeBuilder::class("System", "Array").flags(ABSTRACT).extends(object),
    )?;
    let type_type = builder.add_type(
        module,
        TypeBuilder::class("System", "Type").flags(ABSTRACT).extends(object),
    )?;

    let exception = builder.add_type(
        module,
        TypeBuilder::class("System", "Exception").extends(object),
    )?;
    let message = builder.add_instance_field(exception, "_message", TypeSignature::String);
    let base_ctor = builder.method_token(module, object_ctor)?;
    let exception_ctor = builder.add_method(
        exception,
        MethodBuilder::constructor().implementation(move |asm| {
            asm.ldarg(0)?.call(base_ctor)?.ret()?;
            Ok(())
        }),
    )?;
    let message_token = builder.field_token(module, message)?;
    builder.add_method(
        exception,
        MethodBuilder::virtual_method("get_Message")
            .returns(TypeSignature::String)
            .implementation(move |asm| {
                asm.ldarg(0)?.emit_token("ldfld", message_token)?.ret()?;
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
    let write_line_string = builder.add_method(
        console,
        internal_call(MethodBuilder::static_method("WriteLine").param("value", TypeSignature::String)),
    )?;
    let write_line_int = builder.add_method(
        console,
        internal_call(MethodBuilder::static_method("WriteLine").param("value", TypeSignature::I4)),
    )?;

    let bit_operations = builder.add_type(
        module,
        TypeBuilder::class("System.Numerics", "BitOperations")
            .flags(STATIC_CLASS)
            .extends(object),
    )?;
    let pop_count = builder.add_method(
        bit_operations,
        internal_call(
            MethodBuilder::static_method("PopCount")
                .param("value", TypeSignature::U4)
                .returns(TypeSignature::I4),
        ),
    )?;

    Ok(Corlib {
        module,
        object,
        value_type,
        enum_type,
        string,
        int32,
        uint32,
        exception,
        attribute,
        type_type,
        console,
        bit_operations,
        object_ctor,
        object_to_string,
        exception_ctor,
        attribute_ctor,
        write_line_string,
        write_line_int,
        pop_count,
    })
}

/// Ids of [`calculator`].
#[derive(Debug, Clone, Copy)]
pub struct Calculator {
    pub corlib: Corlib,
    pub app: ModuleId,
    pub calc: TypeId,
    pub ctor: MethodId,
    pub add: MethodId,
    pub main: MethodId,
}

/// `App.Calc` with a default constructor and `int Add(int, int)`, called from `Main`.
pub fn calculator(builder: &mut ModuleSetBuilder) -> Result<Calculator> {
    let corlib = corlib(builder)?;
    let app = builder.module("App");

    let calc = builder.add_type(app, TypeBuilder::class("App", "Calc").extends(corlib.object))?;
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

    let program = builder.add_type(
        app,
        TypeBuilder::class("App", "Program").extends(corlib.object),
    )?;
    let ctor_token = builder.method_token(app, ctor)?;
    let add_token = builder.method_token(app, add)?;
    let main = builder.add_method(
        program,
        MethodBuilder::static_method("Main").implementation(move |asm| {
            asm.newobj(ctor_token)?
                .ldc_i4(2)?
                .ldc_i4(3)?
                .call(add_token)?
                .pop()?
                .ret()?;
            Ok(())
        }),
    )?;
    builder.set_entry_point(main);

    Ok(Calculator {
        corlib,
        app,
        calc,
        ctor,
        add,
        main,
    })
}

/// Builds [`calculator`] into a module set.
pub fn calculator_set() -> Result<(ModuleSet, Calculator)> {
    let mut builder = ModuleSetBuilder::new();
    let ids = calculator(&mut builder)?;
    Ok((builder.build()?, ids))
}

/// Ids of [`shapes`].
#[derive(Debug, Clone, Copy)]
pub struct Shapes {
    pub corlib: Corlib,
    pub app: ModuleId,
    pub shape: TypeId,
    pub circle: TypeId,
    pub square: TypeId,
    pub unused: TypeId,
    pub area: MethodId,
    pub circle_area: MethodId,
    pub square_area: MethodId,
    pub unused_area: MethodId,
    pub main: MethodId,
}

/// An abstract `Shape.Area` overridden by `Circle`, `Square` and a never constructed
/// `Unused`. `Main` creates a circle, calls `Area` virtually, then creates a square.
pub fn shapes(builder: &mut ModuleSetBuilder) -> Result<Shapes> {
    let corlib = corlib(builder)?;
    let app = builder.module("App");
    let base_ctor = builder.method_token(app, corlib.object_ctor)?;

    let shape = builder.add_type(
        app,
        TypeBuilder::class("App", "Shape")
            .flags(ABSTRACT)
            .extends(corlib.object),
    )?;
    let area = builder.add_method(
        shape,
        MethodBuilder::abstract_method("Area").returns(TypeSignature::I4),
    )?;
    let shape_ctor = builder.add_method(
        shape,
        MethodBuilder::constructor().implementation(move |asm| {
            asm.ldarg(0)?.call(base_ctor)?.ret()?;
            Ok(())
        }),
    )?;
    let shape_ctor_token = builder.method_token(app, shape_ctor)?;

    let mut derived = |name: &str, value: i32| -> Result<(TypeId, MethodId, Token)> {
        let ty = builder.add_type(app, TypeBuilder::class("App", name).extends(shape))?;
        let ctor = builder.add_method(
            ty,
            MethodBuilder::constructor().implementation(move |asm| {
                asm.ldarg(0)?.call(shape_ctor_token)?.ret()?;
                Ok(())
            }),
        )?;
        let area = builder.add_method(
            ty,
            MethodBuilder::override_method("Area")
                .returns(TypeSignature::I4)
                .implementation(move |asm| {
                    asm.ldc_i4(value)?.ret()?;
                    Ok(())
                }),
        )?;
        Ok((ty, area, builder.method_token(app, ctor)?))
    };
    let (circle, circle_area, circle_ctor) = derived("Circle", 3)?;
    let (square, square_area, square_ctor) = derived("Square", 4)?;
    let (unused, unused_area, _) = derived("Unused", 5)?;

    let program = builder.add_type(
        app,
        TypeBuilder::class("App", "Program").extends(corlib.object),
    )?;
    let area_token = builder.method_token(app, area)?;
    let main = builder.add_method(
        program,
        MethodBuilder::static_method("Main").implementation(move |asm| {
            asm.newobj(circle_ctor)?
                .callvirt(area_token)?
                .pop()?
                .newobj(square_ctor)?
                .pop()?
                .ret()?;
            Ok(())
        }),
    )?;
    builder.set_entry_point(main);

    Ok(Shapes {
        corlib,
        app,
        shape,
        circle,
        square,
        unused,
        area,
        circle_area,
        square_area,
        unused_area,
        main,
    })
}
