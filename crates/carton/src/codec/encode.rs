// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Value-tree to frame encoding.

use crate::codec::cursor::ByteWriter;
use crate::codec::CodecError;
use crate::model::compile::{CompiledModel, Plan};
use crate::support::ScalarKind;
use crate::value::{Record, Value};

/// Encode one value tree as a complete frame for the given stable id.
pub(crate) fn encode_frame(
    model: &CompiledModel,
    type_id: i32,
    value: &Value,
) -> Result<Vec<u8>, CodecError> {
    let mut w = ByteWriter::new();
    w.write_i32(type_id);
    encode_payload(model, type_id, value, &mut w)?;
    Ok(w.into_inner())
}

/// Encode a payload for `type_id`'s plan. For records this is the member
/// list without a concrete-id prefix: the frame header (or the enclosing
/// member) already carries the id.
fn encode_payload(
    model: &CompiledModel,
    type_id: i32,
    value: &Value,
    w: &mut ByteWriter,
) -> Result<(), CodecError> {
    match plan(model, type_id)? {
        Plan::Scalar(kind) => encode_scalar(*kind, value, w),
        Plan::Enum { repr } => encode_scalar(*repr, value, w),
        Plan::Array { elem, packed } => encode_array(model, *elem, *packed, value, w),
        Plan::Record { .. } => {
            let rec = as_record(value)?;
            encode_members(model, type_id, rec, w)
        }
        Plan::Surrogate { target } => encode_payload(model, *target, value, w),
        Plan::Opaque => Err(CodecError::NotConcrete { type_id }),
    }
}

/// Encode the tagged member list of a record, base portion included.
///
/// Members declared in the plan but absent from the value are skipped:
/// the reading side defaults them, which is what keeps old writers and
/// new readers (and the reverse) compatible.
fn encode_members(
    model: &CompiledModel,
    type_id: i32,
    rec: &Record,
    w: &mut ByteWriter,
) -> Result<(), CodecError> {
    let Plan::Record { fields, base } = plan(model, type_id)? else {
        return Err(CodecError::NotConcrete { type_id });
    };

    if let (Some(base_id), Some(base_rec)) = (base, rec.base()) {
        w.write_u32(*base_id as u32);
        let mark = w.reserve_u32();
        encode_members(model, *base_id, base_rec, w)?;
        patch_len(w, mark);
    }

    for field in fields {
        let Some(value) = rec.get(&field.name) else {
            continue;
        };
        w.write_u32(field.member_id);
        let mark = w.reserve_u32();
        encode_nested(model, field.type_id, value, w)?;
        patch_len(w, mark);
    }
    Ok(())
}

/// Encode a value in nested position (record member or array element).
/// Record-shaped values carry their concrete id here so readers can
/// instantiate the value polymorphically.
fn encode_nested(
    model: &CompiledModel,
    declared_id: i32,
    value: &Value,
    w: &mut ByteWriter,
) -> Result<(), CodecError> {
    match plan(model, declared_id)? {
        Plan::Scalar(kind) => encode_scalar(*kind, value, w),
        Plan::Enum { repr } => encode_scalar(*repr, value, w),
        Plan::Array { elem, packed } => encode_array(model, *elem, *packed, value, w),
        Plan::Surrogate { target } => encode_nested(model, *target, value, w),
        Plan::Record { .. } | Plan::Opaque => {
            let rec = as_record(value)?;
            let concrete = concrete_id(model, rec)?;
            if !model.is_assignable(declared_id, concrete) {
                return Err(CodecError::NotAnAncestor {
                    declared: declared_id,
                    concrete,
                });
            }
            w.write_i32(concrete);
            encode_members(model, concrete, rec, w)
        }
    }
}

fn encode_array(
    model: &CompiledModel,
    elem_id: i32,
    packed: bool,
    value: &Value,
    w: &mut ByteWriter,
) -> Result<(), CodecError> {
    let items = value.as_array().ok_or_else(|| shape("array", value))?;
    w.write_u32(items.len() as u32);
    if packed {
        let Plan::Scalar(kind) = plan(model, elem_id)? else {
            return Err(CodecError::NotConcrete { type_id: elem_id });
        };
        let kind = *kind;
        for item in items {
            encode_scalar(kind, item, w)?;
        }
    } else {
        for item in items {
            let mark = w.reserve_u32();
            encode_nested(model, elem_id, item, w)?;
            patch_len(w, mark);
        }
    }
    Ok(())
}

fn encode_scalar(kind: ScalarKind, value: &Value, w: &mut ByteWriter) -> Result<(), CodecError> {
    let err = || shape(kind.full_name(), value);
    match kind {
        ScalarKind::Bool => w.write_bool(value.as_bool().ok_or_else(err)?),
        ScalarKind::U8 => w.write_u8(value.as_u8().ok_or_else(err)?),
        ScalarKind::U16 => w.write_u16(value.as_u16().ok_or_else(err)?),
        ScalarKind::U32 => w.write_u32(value.as_u32().ok_or_else(err)?),
        ScalarKind::U64 => w.write_u64(value.as_u64().ok_or_else(err)?),
        ScalarKind::I8 => w.write_i8(value.as_i8().ok_or_else(err)?),
        ScalarKind::I16 => w.write_i16(value.as_i16().ok_or_else(err)?),
        ScalarKind::I32 => w.write_i32(value.as_i32().ok_or_else(err)?),
        ScalarKind::I64 => w.write_i64(value.as_i64().ok_or_else(err)?),
        ScalarKind::F32 => w.write_f32(value.as_f32().ok_or_else(err)?),
        ScalarKind::F64 => w.write_f64(value.as_f64().ok_or_else(err)?),
        ScalarKind::Str => w.write_bytes(value.as_str().ok_or_else(err)?.as_bytes()),
        ScalarKind::Bytes => w.write_bytes(value.as_bytes().ok_or_else(err)?),
    }
    Ok(())
}

fn plan<'m>(model: &'m CompiledModel, type_id: i32) -> Result<&'m Plan, CodecError> {
    model
        .plan(type_id)
        .ok_or(CodecError::UnknownTypeId { type_id })
}

fn concrete_id(model: &CompiledModel, rec: &Record) -> Result<i32, CodecError> {
    model
        .type_by_name(&rec.type_name)
        .map(|d| d.type_id)
        .ok_or_else(|| CodecError::UnknownTypeName {
            name: rec.type_name.clone(),
        })
}

fn as_record(value: &Value) -> Result<&Record, CodecError> {
    value.as_record().ok_or_else(|| shape("record", value))
}

fn shape(expected: &'static str, found: &Value) -> CodecError {
    CodecError::ValueShape {
        expected,
        found: found.kind_name(),
    }
}

fn patch_len(w: &mut ByteWriter, mark: usize) {
    let len = (w.len() - mark - 4) as u32;
    w.patch_u32(mark, len);
}
