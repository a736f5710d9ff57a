// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Public serialization front end over the compiled type model.
//!
//! The serializer owns nothing but a shared handle to the open database's
//! [`CompiledModel`]; it is cheap to clone and safe to use from multiple
//! threads. Values go in as `&dyn Any` and come back as `Box<dyn Any>`,
//! dispatched through the model's runtime tables, so callers can write and
//! read polymorphically without naming the concrete type at the call site.

use crate::codec::{decode_frame, encode_frame, CodecError};
use crate::model::compile::CompiledModel;
use crate::model::errors::SchemaError;
use crate::support::{Builtins, TypeSet};
use crate::value::ValueError;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Failure in the serialization front end.
#[derive(Debug)]
pub enum SerializeError {
    /// The value's runtime type was not registered when the model was
    /// opened.
    UnregisteredType { runtime: TypeId },
    /// The type's conversion hooks rejected the value tree.
    InvalidValue {
        type_name: String,
        source: ValueError,
    },
    /// The frame bytes could not be produced or interpreted.
    Codec(CodecError),
    /// A decoded value was requested as the wrong concrete type.
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnregisteredType { runtime } => {
                write!(f, "runtime type {:?} is not registered with this model", runtime)
            }
            Self::InvalidValue { type_name, source } => {
                write!(f, "invalid value for type `{}`: {}", type_name, source)
            }
            Self::Codec(e) => write!(f, "{}", e),
            Self::WrongType { expected, found } => {
                write!(f, "decoded `{}`, requested `{}`", found, expected)
            }
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidValue { source, .. } => Some(source),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for SerializeError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// Frame serializer bound to one open model.
#[derive(Clone)]
pub struct Serializer {
    model: Arc<CompiledModel>,
}

impl Serializer {
    pub fn new(model: Arc<CompiledModel>) -> Self {
        Self { model }
    }

    /// Open the model stored in `conn` and bind a serializer to it.
    pub fn open(
        conn: &mut rusqlite::Connection,
        builtins: &Builtins,
        types: &TypeSet,
    ) -> Result<Self, SchemaError> {
        Ok(Self::new(crate::model::open_model(conn, builtins, types)?))
    }

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    /// Encode one value as a self-describing frame.
    pub fn serialize(&self, value: &dyn Any) -> Result<Vec<u8>, SerializeError> {
        let runtime = value.type_id();
        let type_id = self
            .model
            .type_id_of(runtime)
            .map_err(|_| SerializeError::UnregisteredType { runtime })?;
        let binding = self
            .model
            .binding(type_id)
            .ok_or(SerializeError::UnregisteredType { runtime })?;
        let tree = (binding.encode)(value).map_err(|source| SerializeError::InvalidValue {
            type_name: self.type_name(type_id),
            source,
        })?;
        Ok(encode_frame(&self.model, type_id, &tree)?)
    }

    /// Decode one frame back into its concrete runtime type.
    ///
    /// `Ok(None)` means the frame is intact but its type does not resolve
    /// this session (the type was dropped from the registered set); the
    /// bytes stay readable by sessions that still register it.
    pub fn deserialize(&self, frame: &[u8]) -> Result<Option<Box<dyn Any>>, SerializeError> {
        let Some((type_id, tree)) = decode_frame(&self.model, frame)? else {
            return Ok(None);
        };
        let Some(binding) = self.model.binding(type_id) else {
            return Ok(None);
        };
        let value = (binding.decode)(&tree).map_err(|source| SerializeError::InvalidValue {
            type_name: self.type_name(type_id),
            source,
        })?;
        Ok(Some(value))
    }

    /// Decode one frame, downcast to a known concrete type.
    pub fn deserialize_as<T: Any>(&self, frame: &[u8]) -> Result<Option<T>, SerializeError> {
        let Some(boxed) = self.deserialize(frame)? else {
            return Ok(None);
        };
        match boxed.downcast::<T>() {
            Ok(v) => Ok(Some(*v)),
            Err(boxed) => {
                let found = self
                    .model
                    .type_id_of((*boxed).type_id())
                    .ok()
                    .and_then(|id| self.model.binding(id))
                    .map(|b| b.rust_name)
                    .unwrap_or("unknown");
                Err(SerializeError::WrongType {
                    expected: std::any::type_name::<T>(),
                    found,
                })
            }
        }
    }

    fn type_name(&self, type_id: i32) -> String {
        self.model
            .description(type_id)
            .map(|d| d.full_name.clone())
            .unwrap_or_else(|| format!("#{}", type_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::build_graph;
    use crate::model::compile::compile;
    use crate::support::{Builtins, ScalarKind, Stored, TypeInfo, TypeRef, TypeSet};
    use crate::value::{Record, Value};

    #[derive(Debug, PartialEq)]
    struct Marker {
        pos: i64,
    }

    impl Stored for Marker {
        fn describe() -> TypeInfo {
            TypeInfo::class::<Self>("Marker").field("pos", TypeRef::Scalar(ScalarKind::I64))
        }
        fn to_value(&self) -> Value {
            Record::new("Marker").field("pos", self.pos).into()
        }
        fn from_value(value: &Value) -> Result<Self, ValueError> {
            let rec = value.as_record().ok_or_else(|| ValueError::not_a_record("Marker"))?;
            Ok(Self {
                pos: rec.get("pos").and_then(Value::as_i64).unwrap_or_default(),
            })
        }
    }

    fn serializer_for(set: &TypeSet) -> Serializer {
        let builtins = Builtins {
            time_surrogates: false,
        };
        let (graph, resolver) = build_graph(&builtins, set).expect("build");
        Serializer::new(Arc::new(compile(graph, &resolver).expect("compile")))
    }

    #[test]
    fn test_round_trip_through_any() {
        let mut set = TypeSet::new();
        set.register::<Marker>();
        let ser = serializer_for(&set);

        let frame = ser.serialize(&Marker { pos: -12 }).expect("serialize");
        let boxed = ser
            .deserialize(&frame)
            .expect("deserialize")
            .expect("resolved");
        let marker = boxed.downcast::<Marker>().expect("concrete type");
        assert_eq!(*marker, Marker { pos: -12 });
    }

    #[test]
    fn test_scalar_values_serialize_as_top_level_frames() {
        let ser = serializer_for(&TypeSet::new());
        let frame = ser.serialize(&42u32).expect("serialize");
        let got: u32 = ser
            .deserialize_as(&frame)
            .expect("deserialize")
            .expect("resolved");
        assert_eq!(got, 42);
    }

    #[test]
    fn test_unregistered_type_is_rejected() {
        let ser = serializer_for(&TypeSet::new());
        struct Foreign;
        assert!(matches!(
            ser.serialize(&Foreign),
            Err(SerializeError::UnregisteredType { .. })
        ));
    }

    #[test]
    fn test_unresolved_frame_reads_as_none() {
        let mut set = TypeSet::new();
        set.register::<Marker>();
        let writer = serializer_for(&set);
        let frame = writer.serialize(&Marker { pos: 5 }).expect("serialize");

        let reader = serializer_for(&TypeSet::new());
        assert!(reader.deserialize(&frame).expect("tolerant read").is_none());
    }

    #[test]
    fn test_deserialize_as_wrong_type() {
        let mut set = TypeSet::new();
        set.register::<Marker>();
        let ser = serializer_for(&set);
        let frame = ser.serialize(&Marker { pos: 5 }).expect("serialize");
        assert!(matches!(
            ser.deserialize_as::<String>(&frame),
            Err(SerializeError::WrongType { .. })
        ));
    }
}
