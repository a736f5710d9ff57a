// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic value tree exchanged between application types and the codec.
//!
//! A [`Value`] is the intermediate representation of one serializable value:
//! application types convert themselves to and from `Value` trees (see
//! [`crate::support::Stored`]), and the compiled encoder maps `Value` trees
//! to and from framed bytes. Record values carry the durable type name of
//! their concrete type, which is what makes polymorphic encoding possible
//! without runtime reflection.

use std::fmt;

/// A dynamic value that can hold any storable type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Homogeneous sequence (vectors and single-rank arrays).
    Array(Vec<Value>),
    /// An instance of a named record type.
    Record(Record),
}

/// One record instance: the concrete type's durable name, the encoded
/// portion of its base type (if any), and its declared fields.
///
/// Fields are kept in declaration order; lookups are linear, which is fine
/// for the handful of fields a persisted type carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub type_name: String,
    pub base: Option<Box<Record>>,
    pub fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record for the given durable type name.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            base: None,
            fields: Vec::new(),
        }
    }

    /// Append a field (builder style).
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Attach the base-type portion of this instance.
    #[must_use]
    pub fn with_base(mut self, base: Record) -> Self {
        self.base = Some(Box::new(base));
        self
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Insert or replace a field by name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    /// The base-type portion, if one was encoded.
    pub fn base(&self) -> Option<&Record> {
        self.base.as_deref()
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Self::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Self::U16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<i8> {
        match self {
            Self::I8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Self::I16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "array",
            Self::Record(_) => "record",
        }
    }
}

/// Failure while converting between application values and [`Value`] trees.
#[derive(Debug, Clone)]
pub enum ValueError {
    /// A record lacked a field the conversion requires.
    MissingField { record: String, field: String },
    /// A value had an unexpected kind.
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    /// An enum raw value did not map to any declared variant.
    UnknownVariant { type_name: String, raw: i64 },
    /// The value was expected to be a record of the named type.
    NotARecord { type_name: String },
}

impl ValueError {
    pub fn missing_field(record: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            record: record.into(),
            field: field.into(),
        }
    }

    pub fn not_a_record(type_name: impl Into<String>) -> Self {
        Self::NotARecord {
            type_name: type_name.into(),
        }
    }

    pub fn unknown_variant(type_name: impl Into<String>, raw: i64) -> Self {
        Self::UnknownVariant {
            type_name: type_name.into(),
            raw,
        }
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { record, field } => {
                write!(f, "record `{}` is missing field `{}`", record, field)
            }
            Self::TypeMismatch { expected, found } => {
                write!(f, "value mismatch: expected {}, found {}", expected, found)
            }
            Self::UnknownVariant { type_name, raw } => {
                write!(f, "no variant of `{}` has raw value {}", type_name, raw)
            }
            Self::NotARecord { type_name } => {
                write!(f, "expected a record of type `{}`", type_name)
            }
        }
    }
}

impl std::error::Error for ValueError {}

macro_rules! impl_from_value {
    ($type:ty, $variant:ident) => {
        impl From<$type> for Value {
            fn from(v: $type) -> Self {
                Self::$variant(v)
            }
        }
    };
}

impl_from_value!(bool, Bool);
impl_from_value!(u8, U8);
impl_from_value!(u16, U16);
impl_from_value!(u32, U32);
impl_from_value!(u64, U64);
impl_from_value!(i8, I8);
impl_from_value!(i16, I16);
impl_from_value!(i32, I32);
impl_from_value!(i64, I64);
impl_from_value!(f32, F32);
impl_from_value!(f64, F64);
impl_from_value!(String, Str);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Self::Record(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_accessors() {
        let v = Value::from(42i32);
        assert_eq!(v.as_i32(), Some(42));
        assert_eq!(v.as_u32(), None);

        let v = Value::from("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.kind_name(), "string");
    }

    #[test]
    fn test_record_builder_and_lookup() {
        let rec = Record::new("Comic")
            .field("name", "Watchmen")
            .field("writer", "Moore");

        assert_eq!(rec.get("name").and_then(Value::as_str), Some("Watchmen"));
        assert_eq!(rec.get("writer").and_then(Value::as_str), Some("Moore"));
        assert!(rec.get("artist").is_none());
    }

    #[test]
    fn test_record_set_replaces_existing() {
        let mut rec = Record::new("Comic").field("name", "Watchmen");
        rec.set("name", "Maus");
        assert_eq!(rec.fields.len(), 1);
        assert_eq!(rec.get("name").and_then(Value::as_str), Some("Maus"));
    }

    #[test]
    fn test_record_base_chain() {
        let base = Record::new("Thing").field("name", "wing");
        let rec = Record::new("Plane").field("wingspan", 12.5f64).with_base(base);

        let b = rec.base().expect("base record");
        assert_eq!(b.type_name, "Thing");
        assert_eq!(b.get("name").and_then(Value::as_str), Some("wing"));
    }

    #[test]
    fn test_value_error_display() {
        let err = ValueError::missing_field("Comic", "writer");
        assert_eq!(err.to_string(), "record `Comic` is missing field `writer`");

        let err = ValueError::unknown_variant("Color", 9);
        assert_eq!(err.to_string(), "no variant of `Color` has raw value 9");
    }
}
