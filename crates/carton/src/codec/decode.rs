// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame to value-tree decoding.

use crate::codec::cursor::ByteReader;
use crate::codec::CodecError;
use crate::model::compile::{CompiledModel, Plan};
use crate::support::ScalarKind;
use crate::value::{Record, Value};

/// Decode a complete frame. `Ok(None)` means the frame is intact but its
/// type id does not resolve to a concrete type this session; the caller
/// decides whether that is tolerable (it is, for tombstoned types).
pub(crate) fn decode_frame(
    model: &CompiledModel,
    buf: &[u8],
) -> Result<Option<(i32, Value)>, CodecError> {
    let mut r = ByteReader::new(buf);
    let type_id = r.read_i32()?;
    match model.plan(type_id) {
        None | Some(Plan::Opaque) => Ok(None),
        Some(_) => {
            let value = decode_payload(model, type_id, &mut r)?;
            Ok(Some((type_id, value)))
        }
    }
}

fn decode_payload(
    model: &CompiledModel,
    type_id: i32,
    r: &mut ByteReader<'_>,
) -> Result<Value, CodecError> {
    match plan(model, type_id)? {
        Plan::Scalar(kind) => decode_scalar(*kind, r),
        Plan::Enum { repr } => decode_scalar(*repr, r),
        Plan::Array { elem, packed } => decode_array(model, *elem, *packed, r),
        Plan::Record { .. } => Ok(Value::Record(decode_members(model, type_id, r)?)),
        Plan::Surrogate { target } => decode_payload(model, *target, r),
        Plan::Opaque => Err(CodecError::NotConcrete { type_id }),
    }
}

/// Decode a tagged member list. Unknown tags are skipped (written by a
/// newer schema), absent members are simply not set (written by an older
/// one); neither is an error.
fn decode_members(
    model: &CompiledModel,
    type_id: i32,
    r: &mut ByteReader<'_>,
) -> Result<Record, CodecError> {
    let Plan::Record { fields, base } = plan(model, type_id)? else {
        return Err(CodecError::NotConcrete { type_id });
    };
    let full_name = model
        .description(type_id)
        .map(|d| d.full_name.clone())
        .ok_or(CodecError::UnknownTypeId { type_id })?;

    let mut rec = Record::new(full_name);
    while !r.is_empty() {
        let tag = r.read_u32()?;
        let len = r.read_u32()? as usize;
        let body = r.read_bytes(len)?;
        let mut br = ByteReader::new(body);
        if *base == Some(tag as i32) {
            rec.base = Some(Box::new(decode_members(model, tag as i32, &mut br)?));
        } else if let Some(field) = fields.iter().find(|f| f.member_id == tag) {
            let value = decode_nested(model, field.type_id, &mut br)?;
            rec.set(field.name.clone(), value);
        }
    }
    Ok(rec)
}

/// Decode a value in nested position. Record-shaped members carry their
/// concrete id, which must sit on the declared type's base chain.
fn decode_nested(
    model: &CompiledModel,
    declared_id: i32,
    r: &mut ByteReader<'_>,
) -> Result<Value, CodecError> {
    match plan(model, declared_id)? {
        Plan::Scalar(kind) => decode_scalar(*kind, r),
        Plan::Enum { repr } => decode_scalar(*repr, r),
        Plan::Array { elem, packed } => decode_array(model, *elem, *packed, r),
        Plan::Surrogate { target } => decode_nested(model, *target, r),
        Plan::Record { .. } | Plan::Opaque => {
            let concrete = r.read_i32()?;
            if model.description(concrete).is_none() {
                return Err(CodecError::UnknownTypeId { type_id: concrete });
            }
            if !model.is_assignable(declared_id, concrete) {
                return Err(CodecError::NotAnAncestor {
                    declared: declared_id,
                    concrete,
                });
            }
            Ok(Value::Record(decode_members(model, concrete, r)?))
        }
    }
}

fn decode_array(
    model: &CompiledModel,
    elem_id: i32,
    packed: bool,
    r: &mut ByteReader<'_>,
) -> Result<Value, CodecError> {
    let count = r.read_u32()? as usize;
    let mut items = Vec::with_capacity(count.min(r.remaining()));
    if packed {
        let Plan::Scalar(kind) = plan(model, elem_id)? else {
            return Err(CodecError::NotConcrete { type_id: elem_id });
        };
        let kind = *kind;
        for _ in 0..count {
            items.push(decode_scalar(kind, r)?);
        }
    } else {
        for _ in 0..count {
            let len = r.read_u32()? as usize;
            let body = r.read_bytes(len)?;
            let mut br = ByteReader::new(body);
            items.push(decode_nested(model, elem_id, &mut br)?);
        }
    }
    Ok(Value::Array(items))
}

fn decode_scalar(kind: ScalarKind, r: &mut ByteReader<'_>) -> Result<Value, CodecError> {
    Ok(match kind {
        ScalarKind::Bool => Value::Bool(r.read_bool()?),
        ScalarKind::U8 => Value::U8(r.read_u8()?),
        ScalarKind::U16 => Value::U16(r.read_u16()?),
        ScalarKind::U32 => Value::U32(r.read_u32()?),
        ScalarKind::U64 => Value::U64(r.read_u64()?),
        ScalarKind::I8 => Value::I8(r.read_i8()?),
        ScalarKind::I16 => Value::I16(r.read_i16()?),
        ScalarKind::I32 => Value::I32(r.read_i32()?),
        ScalarKind::I64 => Value::I64(r.read_i64()?),
        ScalarKind::F32 => Value::F32(r.read_f32()?),
        ScalarKind::F64 => Value::F64(r.read_f64()?),
        ScalarKind::Str => Value::Str(
            std::str::from_utf8(r.rest())
                .map_err(|_| CodecError::InvalidUtf8)?
                .to_string(),
        ),
        ScalarKind::Bytes => Value::Bytes(r.rest().to_vec()),
    })
}

fn plan<'m>(model: &'m CompiledModel, type_id: i32) -> Result<&'m Plan, CodecError> {
    model
        .plan(type_id)
        .ok_or(CodecError::UnknownTypeId { type_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::cursor::ByteWriter;
    use crate::codec::encode::encode_frame;
    use crate::model::builder::build_graph;
    use crate::model::compile::compile;
    use crate::support::{handle_of, Builtins, Stored, TypeInfo, TypeRef, TypeSet};
    use crate::value::ValueError;

    struct Shape {
        sides: u8,
    }

    impl Stored for Shape {
        fn describe() -> TypeInfo {
            TypeInfo::class::<Self>("Shape").field("sides", TypeRef::Scalar(ScalarKind::U8))
        }
        fn to_value(&self) -> Value {
            Record::new("Shape").field("sides", self.sides).into()
        }
        fn from_value(value: &Value) -> Result<Self, ValueError> {
            let rec = value.as_record().ok_or_else(|| ValueError::not_a_record("Shape"))?;
            Ok(Self {
                sides: rec.get("sides").and_then(Value::as_u8).unwrap_or_default(),
            })
        }
    }

    struct Square {
        side_len: f64,
    }

    impl Stored for Square {
        fn describe() -> TypeInfo {
            TypeInfo::class::<Self>("Square")
                .with_base(handle_of::<Shape>)
                .field("side_len", TypeRef::Scalar(ScalarKind::F64))
        }
        fn to_value(&self) -> Value {
            Record::new("Square")
                .field("side_len", self.side_len)
                .with_base(Record::new("Shape").field("sides", 4u8))
                .into()
        }
        fn from_value(value: &Value) -> Result<Self, ValueError> {
            let rec = value.as_record().ok_or_else(|| ValueError::not_a_record("Square"))?;
            Ok(Self {
                side_len: rec
                    .get("side_len")
                    .and_then(Value::as_f64)
                    .unwrap_or_default(),
            })
        }
    }

    struct Canvas {
        shapes: Vec<Value>,
        weights: Vec<i32>,
        label: String,
    }

    impl Stored for Canvas {
        fn describe() -> TypeInfo {
            TypeInfo::class::<Self>("Canvas")
                .field("shapes", TypeRef::array(TypeRef::user::<Shape>()))
                .field("weights", TypeRef::array(TypeRef::Scalar(ScalarKind::I32)))
                .field("label", TypeRef::Scalar(ScalarKind::Str))
        }
        fn to_value(&self) -> Value {
            Record::new("Canvas")
                .field("shapes", Value::Array(self.shapes.clone()))
                .field(
                    "weights",
                    Value::Array(self.weights.iter().copied().map(Value::from).collect()),
                )
                .field("label", self.label.clone())
                .into()
        }
        fn from_value(value: &Value) -> Result<Self, ValueError> {
            let rec = value.as_record().ok_or_else(|| ValueError::not_a_record("Canvas"))?;
            Ok(Self {
                shapes: rec
                    .get("shapes")
                    .and_then(Value::as_array)
                    .map(<[Value]>::to_vec)
                    .unwrap_or_default(),
                weights: rec
                    .get("weights")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_i32).collect())
                    .unwrap_or_default(),
                label: rec
                    .get("label")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        }
    }

    fn model() -> CompiledModel {
        let mut set = TypeSet::new();
        set.register::<Shape>();
        set.register::<Square>();
        set.register::<Canvas>();
        let builtins = Builtins {
            time_surrogates: false,
        };
        let (graph, resolver) = build_graph(&builtins, &set).expect("build");
        compile(graph, &resolver).expect("compile")
    }

    #[test]
    fn test_scalar_frame_round_trip() {
        let m = model();
        let id = m.type_by_name("i64").unwrap().type_id;
        let frame = encode_frame(&m, id, &Value::I64(-99)).expect("encode");
        let (got_id, value) = decode_frame(&m, &frame).expect("decode").expect("resolved");
        assert_eq!(got_id, id);
        assert_eq!(value, Value::I64(-99));
    }

    #[test]
    fn test_record_with_base_chain_round_trip() {
        let m = model();
        let id = m.type_id::<Square>().unwrap();
        let value = Square { side_len: 2.5 }.to_value();
        let frame = encode_frame(&m, id, &value).expect("encode");
        let (_, decoded) = decode_frame(&m, &frame).expect("decode").expect("resolved");

        let rec = decoded.as_record().unwrap();
        assert_eq!(rec.type_name, "Square");
        assert_eq!(rec.get("side_len"), Some(&Value::F64(2.5)));
        let base = rec.base().expect("base portion");
        assert_eq!(base.type_name, "Shape");
        assert_eq!(base.get("sides"), Some(&Value::U8(4)));
    }

    #[test]
    fn test_polymorphic_array_elements_keep_concrete_type() {
        let m = model();
        let id = m.type_id::<Canvas>().unwrap();
        let canvas = Canvas {
            shapes: vec![
                Shape { sides: 3 }.to_value(),
                Square { side_len: 1.0 }.to_value(),
            ],
            weights: vec![10, 20, 30],
            label: "mixed".into(),
        };
        let frame = encode_frame(&m, id, &canvas.to_value()).expect("encode");
        let (_, decoded) = decode_frame(&m, &frame).expect("decode").expect("resolved");

        let rec = decoded.as_record().unwrap();
        let shapes = rec.get("shapes").and_then(Value::as_array).unwrap();
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[0].as_record().unwrap().type_name, "Shape");
        assert_eq!(shapes[1].as_record().unwrap().type_name, "Square");
        assert_eq!(
            rec.get("weights"),
            Some(&Value::Array(vec![
                Value::I32(10),
                Value::I32(20),
                Value::I32(30)
            ]))
        );
        assert_eq!(rec.get("label"), Some(&Value::Str("mixed".into())));
    }

    #[test]
    fn test_unknown_member_tag_is_skipped() {
        let m = model();
        let id = m.type_id::<Shape>().unwrap();
        let frame = encode_frame(&m, id, &Shape { sides: 6 }.to_value()).expect("encode");

        // Append a member with a tag no current schema assigns.
        let mut w = ByteWriter::new();
        w.write_bytes(&frame);
        w.write_u32(9999);
        w.write_u32(3);
        w.write_bytes(&[1, 2, 3]);

        let (_, decoded) = decode_frame(&m, &w.into_inner())
            .expect("decode")
            .expect("resolved");
        let rec = decoded.as_record().unwrap();
        assert_eq!(rec.get("sides"), Some(&Value::U8(6)));
        assert_eq!(rec.fields.len(), 1);
    }

    #[test]
    fn test_absent_member_is_left_unset() {
        let m = model();
        let id = m.type_id::<Shape>().unwrap();
        // Empty member list: a writer that predates every field.
        let mut w = ByteWriter::new();
        w.write_i32(id);
        let (_, decoded) = decode_frame(&m, &w.into_inner())
            .expect("decode")
            .expect("resolved");
        let rec = decoded.as_record().unwrap();
        assert_eq!(rec.get("sides"), None);
        let shape = Shape::from_value(&decoded).expect("defaults");
        assert_eq!(shape.sides, 0);
    }

    #[test]
    fn test_unresolved_frame_id_decodes_to_none() {
        let m = model();
        let mut w = ByteWriter::new();
        w.write_i32(4242);
        assert_eq!(decode_frame(&m, &w.into_inner()).expect("decode"), None);
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let m = model();
        let id = m.type_id::<Shape>().unwrap();
        let frame = encode_frame(&m, id, &Shape { sides: 6 }.to_value()).expect("encode");
        let cut = &frame[..frame.len() - 1];
        assert!(matches!(
            decode_frame(&m, cut),
            Err(CodecError::Truncated { .. })
        ));
    }
}
