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

//! Custom attribute collection.
//!
//! Attribute blobs are decoded against their constructor signature and every argument is
//! classified as an integer, float, string, enum, type reference or array. Arguments that fit
//! none of these are dropped on their own; the attribute is kept with the remaining
//! arguments. Attributes the C# compiler adds for its own bookkeeping are never collected.

use std::fmt;

use crate::{
    metadata::customattributes::{parse_custom_attribute, CustomAttributeArgument},
    model::{AttributeRecord, AttributeTypeResolver, GenericContext, ModuleId, ModuleSet, TypeSig},
};

/// Compiler bookkeeping attributes without observable meaning.
pub const INTERNAL_ATTRIBUTES: [&str; 20] = [
    "System.Runtime.CompilerServices.NullableAttribute",
    "System.Runtime.CompilerServices.NullableContextAttribute",
    "System.Runtime.CompilerServices.NullablePublicOnlyAttribute",
    "System.Runtime.CompilerServices.CompilerGeneratedAttribute",
    "System.Runtime.CompilerServices.AsyncStateMachineAttribute",
    "System.Runtime.CompilerServices.IteratorStateMachineAttribute",
    "System.Runtime.CompilerServices.AsyncIteratorStateMachineAttribute",
    "System.Runtime.CompilerServices.IsReadOnlyAttribute",
    "System.Runtime.CompilerServices.IsByRefLikeAttribute",
    "System.Runtime.CompilerServices.IsUnmanagedAttribute",
    "System.Runtime.CompilerServices.RefSafetyRulesAttribute",
    "System.Runtime.CompilerServices.ScopedRefAttribute",
    "System.Runtime.CompilerServices.TupleElementNamesAttribute",
    "System.Runtime.CompilerServices.DynamicAttribute",
    "System.Runtime.CompilerServices.NativeIntegerAttribute",
    "System.Runtime.CompilerServices.CompilerFeatureRequiredAttribute",
    "System.Runtime.CompilerServices.RequiredMemberAttribute",
    "System.Diagnostics.DebuggerHiddenAttribute",
    "System.Diagnostics.DebuggerStepThroughAttribute",
    "System.Diagnostics.DebuggerBrowsableAttribute",
];

/// True for attributes filtered out before collection.
#[must_use]
pub fn is_internal_attribute(full_name: &str) -> bool {
    INTERNAL_ATTRIBUTES.contains(&full_name)
}

/// A classified attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub enum IrAttributeArg {
    /// Integral, boolean or char value
    Int {
        /// Value, sign-extended (bit pattern for `u64`)
        value: i64,
        /// Declared primitive type
        ty: TypeSig,
    },
    /// Floating point value
    Float {
        /// Value
        value: f64,
        /// `R4` or `R8`
        ty: TypeSig,
    },
    /// String, empty for null
    String(String),
    /// Enumeration value
    Enum {
        /// Full name of the enum type
        type_name: String,
        /// The enum type, if it resolves
        ty: Option<TypeSig>,
        /// Underlying value
        value: i64,
    },
    /// `typeof(...)`
    Type {
        /// Serialized type name
        name: String,
        /// The referenced type, if it resolves
        ty: Option<TypeSig>,
    },
    /// Single-dimensional array
    Array(Vec<IrAttributeArg>),
}

impl fmt::Display for IrAttributeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrAttributeArg::Int { value, .. } => write!(f, "{value}"),
            IrAttributeArg::Float { value, .. } => write!(f, "{value:?}"),
            IrAttributeArg::String(value) => write!(f, "{value:?}"),
            IrAttributeArg::Enum {
                type_name, value, ..
            } => write!(f, "({type_name}){value}"),
            IrAttributeArg::Type { name, .. } => write!(f, "typeof({name})"),
            IrAttributeArg::Array(values) => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", values.join(", "))
            }
        }
    }
}

/// A collected custom attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct IrAttribute {
    /// Full name of the attribute type
    pub type_name: String,
    /// Constructor arguments that could be classified, in order
    pub args: Vec<IrAttributeArg>,
    /// Named field and property assignments that could be classified
    pub named: Vec<(String, IrAttributeArg)>,
}

impl fmt::Display for IrAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        args.extend(self.named.iter().map(|(name, value)| format!("{name} = {value}")));
        write!(f, "[{}({})]", self.type_name, args.join(", "))
    }
}

/// Collects the attributes `records` declared in `module`.
///
/// Never fails: attributes whose constructor cannot be resolved or whose blob is malformed
/// are skipped, unclassifiable arguments are dropped.
///
/// An undecodable fixed argument has no known width, so the positional arguments after it
/// and all named arguments are dropped with it. The attribute itself is still collected
/// with the arguments that precede it.
#[must_use]
pub fn collect_attributes(
    set: &ModuleSet,
    module: ModuleId,
    records: &[AttributeRecord],
) -> Vec<IrAttribute> {
    records
        .iter()
        .filter_map(|record| collect_attribute(set, module, record))
        .collect()
}

fn collect_attribute(
    set: &ModuleSet,
    module: ModuleId,
    record: &AttributeRecord,
) -> Option<IrAttribute> {
    let constructor = match set.resolve_method(module, record.constructor, &GenericContext::empty())
    {
        Ok(constructor) => constructor,
        Err(error) => {
            log::debug!("Skipping attribute with constructor {} - {}", record.constructor, error);
            return None;
        }
    };

    let ctor_record = set.method(constructor.method);
    let type_name = set.type_full_name(ctor_record.declaring_type);
    if is_internal_attribute(&type_name) {
        return None;
    }

    // Parameter tokens belong to the module defining the constructor
    let resolver = AttributeTypeResolver::new(set, ctor_record.module);
    let value = match parse_custom_attribute(&record.blob, &ctor_record.signature, &resolver) {
        Ok(value) => value,
        Err(error) => {
            log::debug!("Skipping malformed [{type_name}] blob - {error}");
            return None;
        }
    };

    let args = value
        .fixed_args
        .iter()
        .enumerate()
        .filter_map(|(index, argument)| {
            let classified = classify(set, argument);
            if classified.is_none() {
                log::trace!("Dropping argument {index} of [{type_name}] - {argument}");
            }
            classified
        })
        .collect();

    let named = value
        .named_args
        .iter()
        .filter_map(|argument| {
            let classified = classify(set, &argument.value);
            if classified.is_none() {
                log::trace!(
                    "Dropping named argument {} of [{type_name}] - {}",
                    argument.name,
                    argument.value
                );
            }
            classified.map(|value| (argument.name.clone(), value))
        })
        .collect();

    Some(IrAttribute {
        type_name,
        args,
        named,
    })
}

/// Classifies one decoded argument; `None` drops it.
fn classify(set: &ModuleSet, argument: &CustomAttributeArgument) -> Option<IrAttributeArg> {
    let int = |value: i64, ty: TypeSig| Some(IrAttributeArg::Int { value, ty });
    match argument {
        CustomAttributeArgument::Bool(value) => int(i64::from(*value), TypeSig::Boolean),
        CustomAttributeArgument::Char(value) => int(i64::from(*value), TypeSig::Char),
        CustomAttributeArgument::I1(value) => int(i64::from(*value), TypeSig::I1),
        CustomAttributeArgument::U1(value) => int(i64::from(*value), TypeSig::U1),
        CustomAttributeArgument::I2(value) => int(i64::from(*value), TypeSig::I2),
        CustomAttributeArgument::U2(value) => int(i64::from(*value), TypeSig::U2),
        CustomAttributeArgument::I4(value) => int(i64::from(*value), TypeSig::I4),
        CustomAttributeArgument::U4(value) => int(i64::from(*value), TypeSig::U4),
        CustomAttributeArgument::I8(value) => int(*value, TypeSig::I8),
        #[allow(clippy::cast_possible_wrap)]
        CustomAttributeArgument::U8(value) => int(*value as i64, TypeSig::U8),
        CustomAttributeArgument::R4(value) => Some(IrAttributeArg::Float {
            value: f64::from(*value),
            ty: TypeSig::R4,
        }),
        CustomAttributeArgument::R8(value) => Some(IrAttributeArg::Float {
            value: *value,
            ty: TypeSig::R8,
        }),
        CustomAttributeArgument::String(value) => Some(IrAttributeArg::String(value.clone())),
        CustomAttributeArgument::Type(name) => Some(IrAttributeArg::Type {
            name: name.clone(),
            ty: resolve_serialized_type(set, name),
        }),
        CustomAttributeArgument::Enum { type_name, value } => Some(IrAttributeArg::Enum {
            type_name: type_name.clone(),
            ty: resolve_serialized_type(set, type_name),
            value: value.as_i64()?,
        }),
        CustomAttributeArgument::Array(values) => values
            .iter()
            .map(|value| classify(set, value))
            .collect::<Option<Vec<_>>>()
            .map(IrAttributeArg::Array),
        CustomAttributeArgument::Unsupported(_) => None,
    }
}

/// Resolves a serialized type name (`Ns.Outer+Inner, Assembly, Version=...`).
///
/// Failures read as `None`; generic instantiations are not resolved.
fn resolve_serialized_type(set: &ModuleSet, name: &str) -> Option<TypeSig> {
    let name = name.split(',').next()?.trim();
    if name.is_empty() || name.contains('[') {
        return None;
    }
    let id = set.find_type(&name.replace('+', "/"))?;
    Some(set.def_sig(id, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        metadata::{customattributes::CustomAttributeEncoder, signatures::TypeSignature},
        model::{AttributeTarget, MethodBuilder, ModuleSetBuilder, TypeBuilder},
        test::{corlib, SEALED},
    };

    fn constructor(params: Vec<(&str, TypeSignature)>) -> MethodBuilder {
        params
            .into_iter()
            .fold(MethodBuilder::constructor(), |ctor, (name, ty)| ctor.param(name, ty))
            .implementation(|asm| {
                asm.ret()?;
                Ok(())
            })
    }

    #[test]
    fn internal_attributes_are_known() {
        assert!(is_internal_attribute(
            "System.Runtime.CompilerServices.NullableContextAttribute"
        ));
        assert!(!is_internal_attribute("System.ObsoleteAttribute"));
    }

    #[test]
    fn collects_supported_and_drops_unsupported() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let attribute = builder
            .add_type(app, TypeBuilder::class("App", "MarkAttribute").extends(corlib.attribute))
            .unwrap();
        let point = builder
            .add_type(app, TypeBuilder::class("App", "Point").extends(corlib.value_type))
            .unwrap();
        let point_sig = builder.type_signature(app, point).unwrap();
        let ctor = builder
            .add_method(
                attribute,
                MethodBuilder::constructor()
                    .param("count", TypeSignature::I4)
                    .param("label", TypeSignature::String)
                    .param("origin", point_sig)
                    .implementation(|asm| {
                        asm.ret()?;
                        Ok(())
                    }),
            )
            .unwrap();

        let blob = CustomAttributeEncoder::new()
            .fixed(&CustomAttributeArgument::I4(42))
            .unwrap()
            .fixed(&CustomAttributeArgument::String("hello".to_string()))
            .unwrap()
            .finish()
            .unwrap();
        builder
            .add_attribute(AttributeTarget::Type(attribute), ctor, blob)
            .unwrap();
        let set = builder.build().unwrap();

        let record = set.type_record(attribute);
        let collected = collect_attributes(&set, record.module, &record.attributes);
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].type_name, "App.MarkAttribute");
        assert_eq!(
            collected[0].args,
            vec![
                IrAttributeArg::Int {
                    value: 42,
                    ty: TypeSig::I4
                },
                IrAttributeArg::String("hello".to_string()),
            ]
        );
    }

    #[test]
    fn every_argument_kind() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let color = builder
            .add_type(
                app,
                TypeBuilder::class("App", "Color")
                    .flags(SEALED)
                    .extends(corlib.enum_type),
            )
            .unwrap();
        builder.add_instance_field(color, "value__", TypeSignature::I4);
        let other = builder
            .add_type(app, TypeBuilder::class("App", "Other").extends(corlib.object))
            .unwrap();
        let attribute = builder
            .add_type(app, TypeBuilder::class("App", "KindsAttribute").extends(corlib.attribute))
            .unwrap();
        let color_sig = builder.type_signature(app, color).unwrap();
        let type_sig = builder.type_signature(app, corlib.type_type).unwrap();
        let ctor = builder
            .add_method(
                attribute,
                constructor(vec![
                    ("count", TypeSignature::I4),
                    ("ratio", TypeSignature::R8),
                    ("label", TypeSignature::String),
                    ("color", color_sig),
                    ("target", type_sig),
                    ("values", TypeSignature::SzArray(Box::new(TypeSignature::I4))),
                    ("boxed", TypeSignature::Object),
                ]),
            )
            .unwrap();

        let numbers = CustomAttributeArgument::Array(vec![
            CustomAttributeArgument::I4(1),
            CustomAttributeArgument::I4(2),
        ]);
        let blob = CustomAttributeEncoder::new()
            .fixed(&CustomAttributeArgument::I4(-7))
            .unwrap()
            .fixed(&CustomAttributeArgument::R8(1.5))
            .unwrap()
            .fixed(&CustomAttributeArgument::String("hello".to_string()))
            .unwrap()
            .fixed(&CustomAttributeArgument::Enum {
                type_name: "App.Color".to_string(),
                value: Box::new(CustomAttributeArgument::I4(2)),
            })
            .unwrap()
            .fixed(&CustomAttributeArgument::Type("App.Other".to_string()))
            .unwrap()
            .fixed(&numbers)
            .unwrap()
            .boxed(&numbers)
            .unwrap()
            .named(false, "Scale", &CustomAttributeArgument::R4(0.25))
            .unwrap()
            .finish()
            .unwrap();
        builder
            .add_attribute(AttributeTarget::Type(other), ctor, blob)
            .unwrap();
        let set = builder.build().unwrap();

        let record = set.type_record(other);
        let collected = collect_attributes(&set, record.module, &record.attributes);
        assert_eq!(collected.len(), 1);
        let ints = IrAttributeArg::Array(vec![
            IrAttributeArg::Int {
                value: 1,
                ty: TypeSig::I4,
            },
            IrAttributeArg::Int {
                value: 2,
                ty: TypeSig::I4,
            },
        ]);
        assert_eq!(
            collected[0].args,
            vec![
                IrAttributeArg::Int {
                    value: -7,
                    ty: TypeSig::I4
                },
                IrAttributeArg::Float {
                    value: 1.5,
                    ty: TypeSig::R8
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
                ints.clone(),
                ints,
            ]
        );
        assert_eq!(
            collected[0].named,
            vec![(
                "Scale".to_string(),
                IrAttributeArg::Float {
                    value: 0.25,
                    ty: TypeSig::R4
                }
            )]
        );
    }

    #[test]
    fn compiler_bookkeeping_is_filtered() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        // the C# compiler embeds its own copy into every assembly
        let nullable = builder
            .add_type(
                app,
                TypeBuilder::class("System.Runtime.CompilerServices", "NullableAttribute")
                    .extends(corlib.attribute),
            )
            .unwrap();
        let nullable_ctor = builder
            .add_method(nullable, constructor(vec![("flag", TypeSignature::U1)]))
            .unwrap();
        let note_type = builder
            .add_type(app, TypeBuilder::class("App", "NoteAttribute").extends(corlib.attribute))
            .unwrap();
        let note_ctor = builder
            .add_method(note_type, constructor(vec![("text", TypeSignature::String)]))
            .unwrap();
        let holder = builder
            .add_type(app, TypeBuilder::class("App", "Holder").extends(corlib.object))
            .unwrap();
        let name = builder.add_instance_field(holder, "Name", TypeSignature::String);

        let flag = CustomAttributeEncoder::new()
            .fixed(&CustomAttributeArgument::U1(2))
            .unwrap()
            .finish()
            .unwrap();
        let note = CustomAttributeEncoder::new()
            .fixed(&CustomAttributeArgument::String("kept".to_string()))
            .unwrap()
            .finish()
            .unwrap();
        builder
            .add_attribute(AttributeTarget::Field(name), nullable_ctor, flag)
            .unwrap();
        builder
            .add_attribute(AttributeTarget::Field(name), note_ctor, note)
            .unwrap();
        let set = builder.build().unwrap();

        let record = set.field(name);
        assert_eq!(record.attributes.len(), 2);
        let collected = collect_attributes(&set, record.module, &record.attributes);
        let names: Vec<&str> = collected
            .iter()
            .map(|attribute| attribute.type_name.as_str())
            .collect();
        assert_eq!(names, ["App.NoteAttribute"]);
    }

    #[test]
    fn undecodable_argument_keeps_the_attribute() {
        let mut builder = ModuleSetBuilder::new();
        let corlib = corlib(&mut builder).unwrap();
        let app = builder.module("App");
        let point = builder
            .add_type(app, TypeBuilder::class("App", "Point").extends(corlib.value_type))
            .unwrap();
        let attribute = builder
            .add_type(app, TypeBuilder::class("App", "PlaceAttribute").extends(corlib.attribute))
            .unwrap();
        let point_sig = builder.type_signature(app, point).unwrap();
        let ctor = builder
            .add_method(
                attribute,
                constructor(vec![
                    ("count", TypeSignature::I4),
                    ("origin", point_sig),
                    ("label", TypeSignature::String),
                    ("scale", TypeSignature::R8),
                ]),
            )
            .unwrap();
        let second = builder
            .add_type(app, TypeBuilder::class("App", "LabelAttribute").extends(corlib.attribute))
            .unwrap();
        let second_ctor = builder
            .add_method(second, constructor(vec![("text", TypeSignature::String)]))
            .unwrap();

        // the point has no serialized form, so nothing after it has a known offset
        let blob = CustomAttributeEncoder::new()
            .fixed(&CustomAttributeArgument::I4(7))
            .unwrap()
            .fixed(&CustomAttributeArgument::String("after".to_string()))
            .unwrap()
            .fixed(&CustomAttributeArgument::R8(2.0))
            .unwrap()
            .finish()
            .unwrap();
        let label = CustomAttributeEncoder::new()
            .fixed(&CustomAttributeArgument::String("next".to_string()))
            .unwrap()
            .finish()
            .unwrap();
        builder
            .add_attribute(AttributeTarget::Type(point), ctor, blob)
            .unwrap();
        builder
            .add_attribute(AttributeTarget::Type(point), second_ctor, label)
            .unwrap();
        let set = builder.build().unwrap();

        let record = set.type_record(point);
        let collected = collect_attributes(&set, record.module, &record.attributes);
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].type_name, "App.PlaceAttribute");
        assert_eq!(
            collected[0].args,
            vec![IrAttributeArg::Int {
                value: 7,
                ty: TypeSig::I4
            }]
        );
        assert_eq!(
            collected[1].args,
            vec![IrAttributeArg::String("next".to_string())]
        );
    }

    #[test]
    fn serialized_names() {
        let mut builder = ModuleSetBuilder::new();
        corlib(&mut builder).unwrap();
        let set = builder.build().unwrap();
        assert_eq!(
            resolve_serialized_type(&set, "System.Int32, System.Runtime, Version=8.0.0.0"),
            Some(TypeSig::I4)
        );
        assert!(resolve_serialized_type(&set, "Missing.Type").is_none());
        assert!(resolve_serialized_type(&set, "System.Int32[]").is_none());
    }
}
