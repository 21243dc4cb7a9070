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

//! What a single instruction makes reachable.
//!
//! [`classify`] maps one decoded instruction to the [`Reference`] it contributes, resolved
//! in the generic context of the method being scanned.

use crate::{
    disassembler::Instruction,
    metadata::{method::MethodAttributes, tables::TableId},
    model::{FieldRef, GenericContext, MethodInst, ModuleId, ModuleSet, TypeSig},
    Result,
};

/// Instruction that invokes or takes the address of a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `call`
    Call,
    /// `callvirt`
    CallVirt,
    /// `newobj`
    NewObj,
    /// `ldftn`
    Ldftn,
    /// `ldvirtftn`
    LdVirtFtn,
    /// `jmp`
    Jmp,
}

impl CallKind {
    /// Kind of a call instruction, `None` for everything else.
    #[must_use]
    pub const fn of(prefix: u8, opcode: u8) -> Option<CallKind> {
        match (prefix, opcode) {
            (0, 0x27) => Some(CallKind::Jmp),
            (0, 0x28) => Some(CallKind::Call),
            (0, 0x6F) => Some(CallKind::CallVirt),
            (0, 0x73) => Some(CallKind::NewObj),
            (0xFE, 0x06) => Some(CallKind::Ldftn),
            (0xFE, 0x07) => Some(CallKind::LdVirtFtn),
            _ => None,
        }
    }

    /// Returns `true` if the target depends on the runtime type of the receiver.
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::CallVirt | Self::LdVirtFtn)
    }

    /// Returns `true` if this call allocates the declaring type.
    #[must_use]
    pub const fn is_constructor(&self) -> bool {
        matches!(self, Self::NewObj)
    }
}

/// The reachability contribution of one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// Statically bound call target
    Direct(MethodInst),
    /// Virtual slot whose overrides are selected by receiver type
    Dispatch(MethodInst),
    /// Virtual slot called through a `constrained.` prefix on a known receiver type
    Constrained {
        /// The constraint type
        receiver: TypeSig,
        /// The declared slot
        slot: MethodInst,
    },
    /// Field access; `is_static` accesses also trigger class initialization
    Field {
        /// The resolved field
        field: FieldRef,
        /// `ldsfld`, `ldsflda` or `stsfld`
        is_static: bool,
    },
    /// A type used by a type-token instruction
    Type(TypeSig),
    /// A string literal, which needs `System.String`
    String,
}

/// A `callvirt` or `ldvirtftn` site: the slot and the types it has been matched against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchSite {
    /// Declared virtual method
    pub slot: MethodInst,
    /// Instantiated declaring type of the slot
    pub declaring: TypeSig,
}

/// Resolves what `instruction` references.
///
/// `constraint` is the type operand of an immediately preceding `constrained.` prefix.
/// Returns `Ok(None)` for instructions that reference nothing.
///
/// # Errors
/// Returns a resolution error if the operand token cannot be resolved.
pub fn classify(
    set: &ModuleSet,
    module: ModuleId,
    instruction: &Instruction,
    constraint: Option<&TypeSig>,
    ctx: &GenericContext<'_>,
) -> Result<Option<Reference>> {
    if let Some(kind) = CallKind::of(instruction.prefix, instruction.opcode) {
        let Some(token) = instruction.token() else {
            return Ok(None);
        };
        let target = set.resolve_method(module, token, ctx)?;
        let record = set.method(target.method);

        if kind.is_virtual() && record.is_virtual() {
            if let Some(receiver) = constraint {
                return Ok(Some(Reference::Constrained {
                    receiver: receiver.clone(),
                    slot: target,
                }));
            }
            let devirtualized = record.flags.contains(MethodAttributes::FINAL)
                || set.type_record(record.declaring_type).is_sealed();
            if !devirtualized {
                return Ok(Some(Reference::Dispatch(target)));
            }
        }
        if kind == CallKind::Call && record.is_static() && record.is_abstract() {
            // static abstract interface member, bound by the constraint
            if let Some(receiver) = constraint {
                return Ok(Some(Reference::Constrained {
                    receiver: receiver.clone(),
                    slot: target,
                }));
            }
        }
        return Ok(Some(Reference::Direct(target)));
    }

    let Some(token) = instruction.token() else {
        return Ok(None);
    };

    Ok(match (instruction.prefix, instruction.opcode) {
        // ldstr
        (0, 0x72) => Some(Reference::String),
        // ldfld, ldflda, stfld
        (0, 0x7B..=0x7D) => Some(Reference::Field {
            field: set.resolve_field(module, token, ctx)?,
            is_static: false,
        }),
        // ldsfld, ldsflda, stsfld
        (0, 0x7E..=0x80) => Some(Reference::Field {
            field: set.resolve_field(module, token, ctx)?,
            is_static: true,
        }),
        // ldtoken accepts methods and fields as well
        (0, 0xD0) => {
            if token.is_table(TableId::Field) {
                Some(Reference::Field {
                    field: set.resolve_field(module, token, ctx)?,
                    is_static: false,
                })
            } else if token.is_table(TableId::MethodDef)
                || token.is_table(TableId::MethodSpec)
            {
                Some(Reference::Direct(set.resolve_method(module, token, ctx)?))
            } else if token.is_table(TableId::MemberRef) {
                match set.resolve_method(module, token, ctx) {
                    Ok(method) => Some(Reference::Direct(method)),
                    Err(_) => Some(Reference::Field {
                        field: set.resolve_field(module, token, ctx)?,
                        is_static: false,
                    }),
                }
            } else {
                Some(Reference::Type(set.resolve_type(module, token, ctx)?))
            }
        }
        // cpobj, ldobj, castclass, isinst, unbox, stobj, box, newarr, ldelema,
        // ldelem, stelem, unbox.any, refanyval, mkrefany
        (0, 0x70 | 0x71 | 0x74 | 0x75 | 0x79 | 0x81 | 0x8C | 0x8D | 0x8F | 0xA3 | 0xA4)
        | (0, 0xA5 | 0xC2 | 0xC6) => Some(Reference::Type(set.resolve_type(module, token, ctx)?)),
        // initobj, sizeof
        (0xFE, 0x15 | 0x1C) => Some(Reference::Type(set.resolve_type(module, token, ctx)?)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_kinds() {
        assert_eq!(CallKind::of(0, 0x28), Some(CallKind::Call));
        assert_eq!(CallKind::of(0xFE, 0x07), Some(CallKind::LdVirtFtn));
        assert_eq!(CallKind::of(0, 0x06), None);
        assert!(CallKind::CallVirt.is_virtual());
        assert!(!CallKind::Call.is_virtual());
        assert!(CallKind::NewObj.is_constructor());
    }
}
