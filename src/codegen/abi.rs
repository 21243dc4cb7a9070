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


//! The runtime ABI generated code links against.
//!
//! Every runtime name the generator prints comes from this module, so the contract with the
//! `cil2cpp` support library is written down once. The library itself is not part of this
//! crate.

/// Umbrella header of the runtime.
pub const RUNTIME_HEADER: &str = "cil2cpp/cil2cpp.h";
/// CMake package and target of the runtime.
pub const RUNTIME_PACKAGE: &str = "cil2cpp";
/// Link target of the runtime library.
pub const RUNTIME_TARGET: &str = "cil2cpp::runtime";

/// Common object header.
pub const OBJECT: &str = "cil2cpp::Object";
/// Type descriptor.
pub const TYPE_INFO: &str = "cil2cpp::TypeInfo";
/// Bit set of [`TYPE_INFO`] kind flags.
pub const TYPE_FLAGS: &str = "cil2cpp::TypeFlags";
/// Class method table: `{ type, methods, method_count }`.
pub const VTABLE: &str = "cil2cpp::VTable";
/// Interface method table: `{ interface_type, methods, method_count }`.
pub const INTERFACE_VTABLE: &str = "cil2cpp::InterfaceVTable";
/// Once-flag guarding a static constructor.
pub const CLASS_INIT_STATE: &str = "cil2cpp::ClassInitState";

/// `void* alloc(size_t size, TypeInfo* type)`
pub const GC_ALLOC: &str = "cil2cpp::gc::alloc";
/// `template<T> Object* box(T value, TypeInfo* type)`
pub const BOX: &str = "cil2cpp::box";
/// `template<T> T unbox(Object* obj)`
pub const UNBOX: &str = "cil2cpp::unbox";
/// `template<T> T* unbox_ptr(Object* obj)`
pub const UNBOX_PTR: &str = "cil2cpp::unbox_ptr";

/// `Array* array_create(TypeInfo* element_type, Int32 length)`
pub const ARRAY_CREATE: &str = "cil2cpp::array_create";
/// `Int32 array_length(Array* arr)`
pub const ARRAY_LENGTH: &str = "cil2cpp::array_length";
/// `template<T> T& array_get(Array* arr, Int32 index)`
pub const ARRAY_GET: &str = "cil2cpp::array_get";
/// `template<T, V> void array_set(Array* arr, Int32 index, V value)`
pub const ARRAY_SET: &str = "cil2cpp::array_set";
/// `String* string_literal(const char* utf8)`
pub const STRING_LITERAL: &str = "cil2cpp::string_literal";

/// `template<TTarget, TSource> TTarget checked_conv(TSource value)`
pub const CHECKED_CONV: &str = "cil2cpp::checked_conv";
/// `template<TTarget, TSource> TTarget checked_conv_un(TSource value)`
pub const CHECKED_CONV_UN: &str = "cil2cpp::checked_conv_un";
/// `double ckfinite(double value)`
pub const CKFINITE: &str = "cil2cpp::ckfinite";

/// `[[noreturn]] void throw_null_reference()`
pub const THROW_NULL_REFERENCE: &str = "cil2cpp::throw_null_reference";
/// `[[noreturn]] void throw_exception(Object* exception)`
pub const THROW_EXCEPTION: &str = "cil2cpp::throw_exception";
/// `Object* current_exception()`, valid inside a catch-all section
pub const CURRENT_EXCEPTION: &str = "cil2cpp::current_exception";

/// `bool object_is_instance_of(Object* obj, TypeInfo* type)`
pub const INSTANCE_OF: &str = "cil2cpp::object_is_instance_of";
/// `Object* object_as(Object* obj, TypeInfo* type)`, null when the cast fails
pub const OBJECT_AS: &str = "cil2cpp::object_as";
/// `Object* object_cast(Object* obj, TypeInfo* type)`, throws when the cast fails
pub const OBJECT_CAST: &str = "cil2cpp::object_cast";
/// `InterfaceVTable* get_interface_vtable(Object* obj, TypeInfo* interface_type)`
pub const GET_INTERFACE_VTABLE: &str = "cil2cpp::get_interface_vtable";
/// `void ensure_class_initialized(ClassInitState* state, void (*cctor)())`
pub const ENSURE_CLASS_INITIALIZED: &str = "cil2cpp::ensure_class_initialized";

/// Opens a protected block.
pub const TRY: &str = "CIL2CPP_TRY";
/// Separates the protected block from the section run for any exception.
pub const CATCH_ALL: &str = "CIL2CPP_CATCH_ALL";
/// Closes a protected block.
pub const END_TRY: &str = "CIL2CPP_END_TRY";
/// `CIL2CPP_MAIN(EntryClass, EntryMethod)` defines the native `main`.
pub const MAIN: &str = "CIL2CPP_MAIN";
/// Defined before the runtime header to keep managed stack traces.
pub const STACK_TRACES: &str = "CIL2CPP_CAPTURE_STACK_TRACES";

/// `checked_*` helper for an overflow checked arithmetic operation.
#[must_use]
pub fn checked(operation: &str, unsigned: bool) -> String {
    if unsigned {
        format!("cil2cpp::checked_{operation}_un")
    } else {
        format!("cil2cpp::checked_{operation}")
    }
}

/// A managed type whose layout and type descriptor the runtime defines itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeType {
    /// Full managed name
    pub managed: &'static str,
    /// Native struct
    pub native: &'static str,
    /// Native type descriptor object
    pub type_info: &'static str,
}

/// Types with runtime defined layout.
pub const RUNTIME_TYPES: [RuntimeType; 3] = [
    RuntimeType {
        managed: "System.Object",
        native: "cil2cpp::Object",
        type_info: "cil2cpp::System::Object_TypeInfo",
    },
    RuntimeType {
        managed: "System.String",
        native: "cil2cpp::String",
        type_info: "cil2cpp::System::String_TypeInfo",
    },
    RuntimeType {
        managed: "System.Array",
        native: "cil2cpp::Array",
        type_info: "cil2cpp::System::Array_TypeInfo",
    },
];

/// The runtime type named `managed`, if any.
#[must_use]
pub fn runtime_type(managed: &str) -> Option<&'static RuntimeType> {
    RUNTIME_TYPES.iter().find(|ty| ty.managed == managed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_helpers() {
        assert_eq!(checked("add", false), "cil2cpp::checked_add");
        assert_eq!(checked("mul", true), "cil2cpp::checked_mul_un");
    }

    #[test]
    fn runtime_types() {
        assert_eq!(runtime_type("System.String").unwrap().native, "cil2cpp::String");
        assert!(runtime_type("System.Int32").is_none());
    }
}
