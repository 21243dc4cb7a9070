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


//! Hand-written bodies for methods lowering cannot translate.
//!
//! The core library implements digit formatting and bit manipulation through generic math
//! interfaces, hardware intrinsics and JIT intrinsics, none of which lower mechanically. The
//! table below maps the mangled name of such a method to an equivalent C++ body. Parameters
//! are named `arg0`, `arg1`, ... like every generated function.

use std::sync::OnceLock;

use rustc_hash::FxHashMap;

/// Decimal, hexadecimal and binary formatting into a buffer of `$native` characters,
/// written backwards from the end pointer.
macro_rules! digit_formatting {
    ($tchar:literal, $native:literal) => {
        [
            (
                concat!(
                    "System_N_Number_D_UInt32ToDecChars_G1_", $tchar, "_E__P2_", $tchar,
                    "_K__C_System_N_UInt32_R_", $tchar, "_K_"
                ),
                concat!(
                    "do {\n",
                    "    uint32_t remainder = arg1 % 10;\n",
                    "    arg1 /= 10;\n",
                    "    *(--arg0) = (", $native, ")('0' + remainder);\n",
                    "} while (arg1 != 0);\n",
                    "return arg0;"
                ),
            ),
            (
                concat!(
                    "System_N_Number_D_UInt32ToDecChars_G1_", $tchar, "_E__P3_", $tchar,
                    "_K__C_System_N_UInt32_C_System_N_Int32_R_", $tchar, "_K_"
                ),
                concat!(
                    "while (--arg2 >= 0 || arg1 != 0) {\n",
                    "    uint32_t remainder = arg1 % 10;\n",
                    "    arg1 /= 10;\n",
                    "    *(--arg0) = (", $native, ")('0' + remainder);\n",
                    "}\n",
                    "return arg0;"
                ),
            ),
            (
                concat!(
                    "System_N_Number_D_UInt64ToDecChars_G1_", $tchar, "_E__P2_", $tchar,
                    "_K__C_System_N_UInt64_R_", $tchar, "_K_"
                ),
                concat!(
                    "do {\n",
                    "    uint64_t remainder = arg1 % 10;\n",
                    "    arg1 /= 10;\n",
                    "    *(--arg0) = (", $native, ")('0' + remainder);\n",
                    "} while (arg1 != 0);\n",
                    "return arg0;"
                ),
            ),
            (
                concat!(
                    "System_N_Number_D_UInt64ToDecChars_G1_", $tchar, "_E__P3_", $tchar,
                    "_K__C_System_N_UInt64_C_System_N_Int32_R_", $tchar, "_K_"
                ),
                concat!(
                    "while (--arg2 >= 0 || arg1 != 0) {\n",
                    "    uint64_t remainder = arg1 % 10;\n",
                    "    arg1 /= 10;\n",
                    "    *(--arg0) = (", $native, ")('0' + remainder);\n",
                    "}\n",
                    "return arg0;"
                ),
            ),
            (
                concat!(
                    "System_N_Number_D_Int32ToHexChars_G1_", $tchar, "_E__P4_", $tchar,
                    "_K__C_System_N_UInt32_C_System_N_Int32_C_System_N_Int32_R_", $tchar, "_K_"
                ),
                concat!(
                    "while (--arg3 >= 0 || arg1 != 0) {\n",
                    "    uint32_t digit = arg1 & 0xF;\n",
                    "    *(--arg0) = (", $native, ")(digit + (digit < 10 ? '0' : arg2));\n",
                    "    arg1 >>= 4;\n",
                    "}\n",
                    "return arg0;"
                ),
            ),
            (
                concat!(
                    "System_N_Number_D_Int64ToHexChars_G1_", $tchar, "_E__P4_", $tchar,
                    "_K__C_System_N_UInt64_C_System_N_Int32_C_System_N_Int32_R_", $tchar, "_K_"
                ),
                concat!(
                    "while (--arg3 >= 0 || arg1 != 0) {\n",
                    "    uint32_t digit = (uint32_t)(arg1 & 0xF);\n",
                    "    *(--arg0) = (", $native, ")(digit + (digit < 10 ? '0' : arg2));\n",
                    "    arg1 >>= 4;\n",
                    "}\n",
                    "return arg0;"
                ),
            ),
            (
                concat!(
                    "System_N_Number_D_UInt32ToBinaryChars_G1_", $tchar, "_E__P3_", $tchar,
                    "_K__C_System_N_UInt32_C_System_N_Int32_R_", $tchar, "_K_"
                ),
                concat!(
                    "while (--arg2 >= 0 || arg1 != 0) {\n",
                    "    *(--arg0) = (", $native, ")('0' + (arg1 & 1));\n",
                    "    arg1 >>= 1;\n",
                    "}\n",
                    "return arg0;"
                ),
            ),
            (
                concat!(
                    "System_N_Number_D_UInt64ToBinaryChars_G1_", $tchar, "_E__P3_", $tchar,
                    "_K__C_System_N_UInt64_C_System_N_Int32_R_", $tchar, "_K_"
                ),
                concat!(
                    "while (--arg2 >= 0 || arg1 != 0) {\n",
                    "    *(--arg0) = (", $native, ")('0' + (arg1 & 1));\n",
                    "    arg1 >>= 1;\n",
                    "}\n",
                    "return arg0;"
                ),
            ),
        ]
    };
}

const UTF16_FORMATTING: [(&str, &str); 8] = digit_formatting!("System_N_Char", "char16_t");
const UTF8_FORMATTING: [(&str, &str); 8] = digit_formatting!("System_N_Byte", "uint8_t");

const BIT_OPERATIONS: [(&str, &str); 14] = [
    (
        "System_N_Numerics_N_BitOperations_D_PopCount_P1_System_N_UInt32_R_System_N_Int32",
        "return std::popcount(arg0);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_PopCount_P1_System_N_UInt64_R_System_N_Int32",
        "return std::popcount(arg0);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_LeadingZeroCount_P1_System_N_UInt32_R_System_N_Int32",
        "return std::countl_zero(arg0);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_LeadingZeroCount_P1_System_N_UInt64_R_System_N_Int32",
        "return std::countl_zero(arg0);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_TrailingZeroCount_P1_System_N_UInt32_R_System_N_Int32",
        "return std::countr_zero(arg0);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_TrailingZeroCount_P1_System_N_UInt64_R_System_N_Int32",
        "return std::countr_zero(arg0);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_TrailingZeroCount_P1_System_N_Int32_R_System_N_Int32",
        "return std::countr_zero((uint32_t)arg0);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_TrailingZeroCount_P1_System_N_Int64_R_System_N_Int32",
        "return std::countr_zero((uint64_t)arg0);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_RotateLeft_P2_System_N_UInt32_C_System_N_Int32_R_System_N_UInt32",
        "return std::rotl(arg0, arg1);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_RotateLeft_P2_System_N_UInt64_C_System_N_Int32_R_System_N_UInt64",
        "return std::rotl(arg0, arg1);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_RotateRight_P2_System_N_UInt32_C_System_N_Int32_R_System_N_UInt32",
        "return std::rotr(arg0, arg1);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_RotateRight_P2_System_N_UInt64_C_System_N_Int32_R_System_N_UInt64",
        "return std::rotr(arg0, arg1);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_Log2_P1_System_N_UInt32_R_System_N_Int32",
        "return 31 ^ std::countl_zero(arg0 | 1);",
    ),
    (
        "System_N_Numerics_N_BitOperations_D_Log2_P1_System_N_UInt64_R_System_N_Int32",
        "return 63 ^ std::countl_zero(arg0 | 1);",
    ),
];

const FORMATTING_HELPERS: [(&str, &str); 3] = [
    (
        "System_N_Buffers_N_Text_N_FormattingHelpers_D_CountDigits_P1_System_N_UInt32_R_System_N_Int32",
        "int32_t digits = 1;\nwhile (arg0 >= 10) {\n    arg0 /= 10;\n    digits++;\n}\nreturn digits;",
    ),
    (
        "System_N_Buffers_N_Text_N_FormattingHelpers_D_CountDigits_P1_System_N_UInt64_R_System_N_Int32",
        "int32_t digits = 1;\nwhile (arg0 >= 10) {\n    arg0 /= 10;\n    digits++;\n}\nreturn digits;",
    ),
    (
        "System_N_Buffers_N_Text_N_FormattingHelpers_D_CountHexDigits_P1_System_N_UInt64_R_System_N_Int32",
        "return (int32_t)((64 - std::countl_zero(arg0 | 1) + 3) >> 2);",
    ),
];

const STRINGS: [(&str, &str); 2] = [
    (
        "System_N_String_D_Concat_P2_System_N_String_C_System_N_String_R_System_N_String",
        "return cil2cpp::string_concat(arg0, arg1);",
    ),
    (
        "System_N_String_D_get__Length_P0_R_System_N_Int32",
        "return arg0->length;",
    ),
];

fn index() -> &'static FxHashMap<&'static str, &'static str> {
    static INDEX: OnceLock<FxHashMap<&'static str, &'static str>> = OnceLock::new();
    INDEX.get_or_init(|| {
        UTF16_FORMATTING
            .iter()
            .chain(&UTF8_FORMATTING)
            .chain(&BIT_OPERATIONS)
            .chain(&FORMATTING_HELPERS)
            .chain(&STRINGS)
            .copied()
            .collect()
    })
}

/// Hand-written body of the method named `mangled`, if one exists.
#[must_use]
pub fn known_body(mangled: &str) -> Option<&'static str> {
    index().get(mangled).copied()
}

/// Number of methods with a hand-written body.
#[must_use]
pub fn known_count() -> usize {
    index().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        codegen::mangle::mangle_method,
        metadata::signatures::TypeSignature,
        model::{MethodBuilder, MethodInst, ModuleSetBuilder, TypeBuilder, TypeSig},
        test::{calculator_set, corlib},
    };

    #[test]
    fn names_are_unique() {
        let total = UTF16_FORMATTING.len()
            + UTF8_FORMATTING.len()
            + BIT_OPERATIONS.len()
            + FORMATTING_HELPERS.len()
            + STRINGS.len();
        assert_eq!(known_count(), total);
    }

    #[test]
    fn keys_match_mangled_names() {
        let (set, ids) = calculator_set().unwrap();
        let pop_count = mangle_method(&set, &MethodInst::plain(ids.corlib.pop_count)).unwrap();
        assert_eq!(known_body(&pop_count), Some("return std::popcount(arg0);"));
        assert!(known_body("App_N_Calc_D_Add_P2_System_N_Int32_C_System_N_Int32_R_System_N_Int32").is_none());
    }

    #[test]
    fn generic_formatting_keys() {
        let mut builder = ModuleSetBuilder::new();
        let ids = corlib(&mut builder).unwrap();
        let number = builder
            .add_type(
                ids.module,
                TypeBuilder::class("System", "Number").extends(ids.object),
            )
            .unwrap();
        let method = builder
            .add_method(
                number,
                MethodBuilder::static_method("UInt32ToDecChars")
                    .generic_param("TChar")
                    .param(
                        "bufferEnd",
                        TypeSignature::Ptr(Box::new(TypeSignature::GenericParamMethod(0))),
                    )
                    .param("value", TypeSignature::U4)
                    .returns(TypeSignature::Ptr(Box::new(
                        TypeSignature::GenericParamMethod(0),
                    ))),
            )
            .unwrap();
        let set = builder.build().unwrap();

        for tchar in [TypeSig::Char, TypeSig::U1] {
            let inst = MethodInst {
                method,
                type_args: Vec::new(),
                method_args: vec![tchar],
            };
            let mangled = mangle_method(&set, &inst).unwrap();
            assert!(known_body(&mangled).is_some(), "{mangled}");
        }
    }
}
