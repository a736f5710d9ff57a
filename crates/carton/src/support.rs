// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type declaration surface.
//!
//! The source of truth for what is serializable is an explicit, per-type
//! declaration instead of runtime reflection: every application type
//! implements [`Stored`] (or [`StoredVia`] for external types that need a
//! stand-in) and describes its durable name, classification, base type and
//! fields through a [`TypeInfo`]. Nested types are reachable through
//! function handles ([`TypeRef::User`]), so registering a root type
//! transitively registers everything it depends on without global state.
//!
//! # Example
//!
//! ```ignore
//! use carton::{Record, ScalarKind, Stored, TypeInfo, TypeRef, Value, ValueError};
//!
//! struct Comic { name: String, writer: String }
//!
//! impl Stored for Comic {
//!     fn describe() -> TypeInfo {
//!         TypeInfo::class::<Self>("Comic")
//!             .field("name", TypeRef::Scalar(ScalarKind::Str))
//!             .field("writer", TypeRef::Scalar(ScalarKind::Str))
//!     }
//!
//!     fn to_value(&self) -> Value {
//!         Record::new("Comic")
//!             .field("name", self.name.as_str())
//!             .field("writer", self.writer.as_str())
//!             .into()
//!     }
//!
//!     fn from_value(value: &Value) -> Result<Self, ValueError> {
//!         let rec = value.as_record().ok_or_else(|| ValueError::not_a_record("Comic"))?;
//!         Ok(Self {
//!             name: rec.get("name").and_then(Value::as_str).unwrap_or_default().into(),
//!             writer: rec.get("writer").and_then(Value::as_str).unwrap_or_default().into(),
//!         })
//!     }
//! }
//! ```

use crate::value::{Record, Value, ValueError};
use std::any::{Any, TypeId};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Durable name of the universal root type. Classes and interfaces with no
/// declared base bind to it.
pub const ROOT_TYPE_NAME: &str = "object";

/// Built-in scalar representations natively understood by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Str,
    Bytes,
}

impl ScalarKind {
    /// All scalar kinds in their fixed seeding order. The order is durable:
    /// it determines the type ids of the built-in descriptions.
    pub const ALL: [ScalarKind; 13] = [
        ScalarKind::Bool,
        ScalarKind::U8,
        ScalarKind::U16,
        ScalarKind::U32,
        ScalarKind::U64,
        ScalarKind::I8,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::F32,
        ScalarKind::F64,
        ScalarKind::Str,
        ScalarKind::Bytes,
    ];

    /// Durable name of the built-in description for this kind.
    pub fn full_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Str => "string",
            Self::Bytes => "bytes",
        }
    }

    /// Reverse of [`ScalarKind::full_name`].
    pub fn from_full_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.full_name() == name)
    }

    /// Encoded width in bytes; `None` for variable-width kinds.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::U8 | Self::I8 => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::F32 => Some(4),
            Self::U64 | Self::I64 | Self::F64 => Some(8),
            Self::Str | Self::Bytes => None,
        }
    }

    /// True for fixed-width numeric kinds, the ones eligible for densely
    /// packed array encoding.
    pub fn packable(self) -> bool {
        !matches!(self, Self::Bool | Self::Str | Self::Bytes)
            && self.fixed_width().is_some()
    }

    /// Whether an enum may use this kind as its underlying representation.
    /// 64-bit and unsigned 32/64-bit representations cannot be carried
    /// losslessly by the encoder's enum framing and are rejected.
    pub fn supported_enum_repr(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::U8 | Self::U16)
    }
}

/// Structural classification of a type, immutable once first registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Class,
    Interface,
    Struct,
    Enum,
}

impl Classification {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Class => 0,
            Self::Interface => 1,
            Self::Struct => 2,
            Self::Enum => 3,
        }
    }

    pub fn from_i32(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Class),
            1 => Some(Self::Interface),
            2 => Some(Self::Struct),
            3 => Some(Self::Enum),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Struct => "struct",
            Self::Enum => "enum",
        }
    }
}

/// Function handle producing a full [`TypeHandle`] on demand. Using function
/// pointers keeps the declaration graph free of ownership cycles and lets
/// declarations reference each other without globals.
pub type HandleFn = fn() -> TypeHandle;

/// Function handle producing a bare [`TypeInfo`] (abstract types only).
pub type InfoFn = fn() -> TypeInfo;

/// Reference to a field's type.
#[derive(Clone)]
pub enum TypeRef {
    /// Built-in scalar.
    Scalar(ScalarKind),
    /// Vector / single-rank array of the element type.
    Array(Box<TypeRef>),
    /// A concrete registered type.
    User(HandleFn),
    /// An interface used polymorphically; carries no runtime binding.
    Abstract(InfoFn),
}

impl TypeRef {
    /// Reference a concrete [`Stored`] type.
    pub fn user<T: Stored>() -> Self {
        Self::User(handle_of::<T>)
    }

    /// Reference an external type encoded through its surrogate.
    pub fn external<X: StoredVia>() -> Self {
        Self::User(external_handle_of::<X>)
    }

    /// Array of the given element type.
    pub fn array(elem: TypeRef) -> Self {
        Self::Array(Box::new(elem))
    }
}

/// One declared serializable field.
#[derive(Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeRef,
}

/// Static structural declaration of one type.
#[derive(Clone)]
pub struct TypeInfo {
    /// Version-independent identity key.
    pub full_name: String,
    pub classification: Classification,
    /// Immediate base type; `None` binds classes/interfaces to the root
    /// `object` type at registration time.
    pub base: Option<HandleFn>,
    /// Underlying representation, enums only.
    pub enum_repr: Option<ScalarKind>,
    pub fields: Vec<FieldInfo>,
    /// Runtime identity of the declaring Rust type, when there is one.
    pub runtime: Option<TypeId>,
    /// Stand-in type used to encode values of this type.
    pub surrogate: Option<HandleFn>,
}

impl TypeInfo {
    fn new(full_name: impl Into<String>, classification: Classification) -> Self {
        Self {
            full_name: full_name.into(),
            classification,
            base: None,
            enum_repr: None,
            fields: Vec::new(),
            runtime: None,
            surrogate: None,
        }
    }

    /// Declare a class (reference-style) type.
    pub fn class<T: Any>(full_name: impl Into<String>) -> Self {
        let mut info = Self::new(full_name, Classification::Class);
        info.runtime = Some(TypeId::of::<T>());
        info
    }

    /// Declare a struct (value-style) type. Structs carry no base.
    pub fn struct_type<T: Any>(full_name: impl Into<String>) -> Self {
        let mut info = Self::new(full_name, Classification::Struct);
        info.runtime = Some(TypeId::of::<T>());
        info
    }

    /// Declare an enum with the given underlying representation.
    pub fn enumeration<T: Any>(full_name: impl Into<String>, repr: ScalarKind) -> Self {
        let mut info = Self::new(full_name, Classification::Enum);
        info.runtime = Some(TypeId::of::<T>());
        info.enum_repr = Some(repr);
        info
    }

    /// Declare an interface used polymorphically. Interfaces have no fields
    /// and no runtime binding; they bind to the root `object` type as base.
    pub fn interface(full_name: impl Into<String>) -> Self {
        Self::new(full_name, Classification::Interface)
    }

    /// Synthetic description for an array instantiation discovered during
    /// the declaration walk.
    pub(crate) fn array_instantiation(full_name: impl Into<String>) -> Self {
        Self::new(full_name, Classification::Class)
    }

    /// Set the immediate base type (classes only).
    #[must_use]
    pub fn with_base(mut self, base: HandleFn) -> Self {
        self.base = Some(base);
        self
    }

    /// Append a serializable field (declaration order is durable).
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.fields.push(FieldInfo {
            name: name.into(),
            ty,
        });
        self
    }
}

/// Runtime conversion hooks for one concrete type: how to turn a value of
/// that type into a [`Value`] tree and back. The decode side doubles as the
/// polymorphic factory keyed by stable type id in the compiled model.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeBinding {
    pub any_id: TypeId,
    pub rust_name: &'static str,
    pub encode: fn(&dyn Any) -> Result<Value, ValueError>,
    pub decode: fn(&Value) -> Result<Box<dyn Any>, ValueError>,
}

/// A declaration plus its runtime binding; what the graph builder walks.
pub struct TypeHandle {
    pub info: TypeInfo,
    pub binding: RuntimeBinding,
}

/// A type that can be stored directly.
pub trait Stored: Any + Sized {
    /// Static structural declaration. Must be stable for the lifetime of
    /// the database: the durable name and field declarations are identity.
    fn describe() -> TypeInfo;

    /// Convert to the dynamic value tree.
    fn to_value(&self) -> Value;

    /// Rebuild from a decoded value tree. Fields absent from the tree
    /// (written by an older schema) are expected to fall back to defaults.
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

/// An external type that cannot be encoded directly and is substituted by a
/// [`Stored`] surrogate at encode/decode time.
pub trait StoredVia: Any + Sized {
    type Surrogate: Stored;

    /// Durable name of the subject type itself (not the surrogate's).
    fn full_name() -> String;

    fn to_surrogate(&self) -> Self::Surrogate;
    fn from_surrogate(surrogate: Self::Surrogate) -> Self;
}

/// Handle for a concrete [`Stored`] type.
pub fn handle_of<T: Stored>() -> TypeHandle {
    TypeHandle {
        info: T::describe(),
        binding: RuntimeBinding {
            any_id: TypeId::of::<T>(),
            rust_name: std::any::type_name::<T>(),
            encode: |any| {
                let v = any.downcast_ref::<T>().ok_or(ValueError::TypeMismatch {
                    expected: "registered concrete type",
                    found: "foreign value",
                })?;
                Ok(v.to_value())
            },
            decode: |value| Ok(Box::new(T::from_value(value)?)),
        },
    }
}

/// Handle for an external [`StoredVia`] subject type. The description is
/// the subject's (durable name, no fields) with a surrogate link; encoding
/// routes through the surrogate's value shape.
pub fn external_handle_of<X: StoredVia>() -> TypeHandle {
    let mut info = TypeInfo::new(X::full_name(), Classification::Class);
    info.runtime = Some(TypeId::of::<X>());
    info.surrogate = Some(handle_of::<X::Surrogate>);
    TypeHandle {
        info,
        binding: RuntimeBinding {
            any_id: TypeId::of::<X>(),
            rust_name: std::any::type_name::<X>(),
            encode: |any| {
                let v = any.downcast_ref::<X>().ok_or(ValueError::TypeMismatch {
                    expected: "registered external type",
                    found: "foreign value",
                })?;
                Ok(v.to_surrogate().to_value())
            },
            decode: |value| {
                let s = X::Surrogate::from_value(value)?;
                Ok(Box::new(X::from_surrogate(s)))
            },
        },
    }
}

enum Registration {
    Concrete(HandleFn),
    Abstract(InfoFn),
}

/// The ordered set of application types supplied at database-open time.
#[derive(Default)]
pub struct TypeSet {
    entries: Vec<Registration>,
}

impl TypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete storable type (order is preserved).
    pub fn register<T: Stored>(&mut self) -> &mut Self {
        self.entries.push(Registration::Concrete(handle_of::<T>));
        self
    }

    /// Register an external type encoded through its surrogate.
    pub fn register_external<X: StoredVia>(&mut self) -> &mut Self {
        self.entries
            .push(Registration::Concrete(external_handle_of::<X>));
        self
    }

    /// Register an interface used polymorphically.
    pub fn register_abstract(&mut self, info: InfoFn) -> &mut Self {
        self.entries.push(Registration::Abstract(info));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn concrete_handles(&self) -> impl Iterator<Item = TypeHandle> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Registration::Concrete(f) => Some(f()),
            Registration::Abstract(_) => None,
        })
    }

    pub(crate) fn abstract_infos(&self) -> impl Iterator<Item = TypeInfo> + '_ {
        self.entries.iter().filter_map(|e| match e {
            Registration::Concrete(_) => None,
            Registration::Abstract(f) => Some(f()),
        })
    }
}

/// Built-in type tables, constructed once per open and passed explicitly
/// into the builder so independent models stay hermetic.
#[derive(Debug, Clone)]
pub struct Builtins {
    /// Pre-map `std::time::SystemTime` and `std::time::Duration` to their
    /// well-known surrogates.
    pub time_surrogates: bool,
}

impl Default for Builtins {
    fn default() -> Self {
        Self::standard()
    }
}

impl Builtins {
    pub fn standard() -> Self {
        Self {
            time_surrogates: true,
        }
    }

    /// Handles for the well-known external types this configuration
    /// pre-maps to surrogates.
    pub(crate) fn surrogate_handles(&self) -> Vec<TypeHandle> {
        if self.time_surrogates {
            vec![
                external_handle_of::<SystemTime>(),
                external_handle_of::<Duration>(),
            ]
        } else {
            Vec::new()
        }
    }

    /// Runtime bindings for the scalar built-ins, so scalars can be
    /// serialized as top-level values.
    pub(crate) fn scalar_bindings(&self) -> Vec<(ScalarKind, RuntimeBinding)> {
        macro_rules! scalar_binding {
            ($kind:ident, $type:ty, $as:ident, $name:expr) => {
                (
                    ScalarKind::$kind,
                    RuntimeBinding {
                        any_id: TypeId::of::<$type>(),
                        rust_name: $name,
                        encode: |any| {
                            any.downcast_ref::<$type>()
                                .map(|v| Value::from(v.clone()))
                                .ok_or(ValueError::TypeMismatch {
                                    expected: $name,
                                    found: "foreign value",
                                })
                        },
                        decode: |value| {
                            value
                                .$as()
                                .map(|v| Box::new(<$type>::from(v)) as Box<dyn Any>)
                                .ok_or(ValueError::TypeMismatch {
                                    expected: $name,
                                    found: value.kind_name(),
                                })
                        },
                    },
                )
            };
        }

        vec![
            scalar_binding!(Bool, bool, as_bool, "bool"),
            scalar_binding!(U8, u8, as_u8, "u8"),
            scalar_binding!(U16, u16, as_u16, "u16"),
            scalar_binding!(U32, u32, as_u32, "u32"),
            scalar_binding!(U64, u64, as_u64, "u64"),
            scalar_binding!(I8, i8, as_i8, "i8"),
            scalar_binding!(I16, i16, as_i16, "i16"),
            scalar_binding!(I32, i32, as_i32, "i32"),
            scalar_binding!(I64, i64, as_i64, "i64"),
            scalar_binding!(F32, f32, as_f32, "f32"),
            scalar_binding!(F64, f64, as_f64, "f64"),
            (
                ScalarKind::Str,
                RuntimeBinding {
                    any_id: TypeId::of::<String>(),
                    rust_name: "String",
                    encode: |any| {
                        any.downcast_ref::<String>()
                            .map(|v| Value::Str(v.clone()))
                            .ok_or(ValueError::TypeMismatch {
                                expected: "String",
                                found: "foreign value",
                            })
                    },
                    decode: |value| {
                        value
                            .as_str()
                            .map(|v| Box::new(v.to_string()) as Box<dyn Any>)
                            .ok_or(ValueError::TypeMismatch {
                                expected: "String",
                                found: value.kind_name(),
                            })
                    },
                },
            ),
            (
                ScalarKind::Bytes,
                RuntimeBinding {
                    any_id: TypeId::of::<Vec<u8>>(),
                    rust_name: "Vec<u8>",
                    encode: |any| {
                        any.downcast_ref::<Vec<u8>>()
                            .map(|v| Value::Bytes(v.clone()))
                            .ok_or(ValueError::TypeMismatch {
                                expected: "Vec<u8>",
                                found: "foreign value",
                            })
                    },
                    decode: |value| {
                        value
                            .as_bytes()
                            .map(|v| Box::new(v.to_vec()) as Box<dyn Any>)
                            .ok_or(ValueError::TypeMismatch {
                                expected: "Vec<u8>",
                                found: value.kind_name(),
                            })
                    },
                },
            ),
        ]
    }
}

// ---------------------------------------------------------------------------
// Well-known surrogates
// ---------------------------------------------------------------------------

/// Surrogate for `std::time::SystemTime`: signed seconds since the Unix
/// epoch plus a sub-second offset, nanos always in `0..1_000_000_000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeStamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Stored for TimeStamp {
    fn describe() -> TypeInfo {
        TypeInfo::struct_type::<Self>("carton.TimeStamp")
            .field("secs", TypeRef::Scalar(ScalarKind::I64))
            .field("nanos", TypeRef::Scalar(ScalarKind::U32))
    }

    fn to_value(&self) -> Value {
        Record::new("carton.TimeStamp")
            .field("secs", self.secs)
            .field("nanos", self.nanos)
            .into()
    }

    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let rec = value
            .as_record()
            .ok_or_else(|| ValueError::not_a_record("carton.TimeStamp"))?;
        Ok(Self {
            secs: rec.get("secs").and_then(Value::as_i64).unwrap_or_default(),
            nanos: rec.get("nanos").and_then(Value::as_u32).unwrap_or_default(),
        })
    }
}

impl StoredVia for SystemTime {
    type Surrogate = TimeStamp;

    fn full_name() -> String {
        "std.SystemTime".to_string()
    }

    fn to_surrogate(&self) -> TimeStamp {
        match self.duration_since(UNIX_EPOCH) {
            Ok(d) => TimeStamp {
                secs: d.as_secs() as i64,
                nanos: d.subsec_nanos(),
            },
            Err(e) => {
                let before = e.duration();
                if before.subsec_nanos() == 0 {
                    TimeStamp {
                        secs: -(before.as_secs() as i64),
                        nanos: 0,
                    }
                } else {
                    TimeStamp {
                        secs: -(before.as_secs() as i64) - 1,
                        nanos: 1_000_000_000 - before.subsec_nanos(),
                    }
                }
            }
        }
    }

    fn from_surrogate(s: TimeStamp) -> Self {
        if s.secs >= 0 {
            UNIX_EPOCH + Duration::new(s.secs as u64, s.nanos)
        } else {
            UNIX_EPOCH - Duration::from_secs(s.secs.unsigned_abs()) + Duration::from_nanos(u64::from(s.nanos))
        }
    }
}

/// Surrogate for `std::time::Duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSpan {
    pub secs: u64,
    pub nanos: u32,
}

impl Stored for TimeSpan {
    fn describe() -> TypeInfo {
        TypeInfo::struct_type::<Self>("carton.TimeSpan")
            .field("secs", TypeRef::Scalar(ScalarKind::U64))
            .field("nanos", TypeRef::Scalar(ScalarKind::U32))
    }

    fn to_value(&self) -> Value {
        Record::new("carton.TimeSpan")
            .field("secs", self.secs)
            .field("nanos", self.nanos)
            .into()
    }

    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let rec = value
            .as_record()
            .ok_or_else(|| ValueError::not_a_record("carton.TimeSpan"))?;
        Ok(Self {
            secs: rec.get("secs").and_then(Value::as_u64).unwrap_or_default(),
            nanos: rec.get("nanos").and_then(Value::as_u32).unwrap_or_default(),
        })
    }
}

impl StoredVia for Duration {
    type Surrogate = TimeSpan;

    fn full_name() -> String {
        "std.Duration".to_string()
    }

    fn to_surrogate(&self) -> TimeSpan {
        TimeSpan {
            secs: self.as_secs(),
            nanos: self.subsec_nanos(),
        }
    }

    fn from_surrogate(s: TimeSpan) -> Self {
        Duration::new(s.secs, s.nanos)
    }
}
