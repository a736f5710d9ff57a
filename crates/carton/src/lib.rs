// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Carton - persisted type model and framed serialization
//!
//! The schema core of an embedded object database: applications register
//! their storable types once per open, and carton keeps a durable, merged
//! description of every type the database has ever seen in SQLite. Values
//! are encoded as self-describing frames that stay readable across schema
//! changes: adding fields, adding types and dropping fields or whole types
//! from the application are all non-breaking.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use carton::{Builtins, Serializer, TypeSet};
//! use rusqlite::Connection;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = Connection::open("app.db")?;
//!
//!     let mut types = TypeSet::new();
//!     types.register::<MyData>();
//!
//!     let serializer = Serializer::open(&mut conn, &Builtins::standard(), &types)?;
//!     let frame = serializer.serialize(&MyData { value: 42.0 })?;
//!     let back: Option<MyData> = serializer.deserialize_as(&frame)?;
//!     assert!(back.is_some());
//!     Ok(())
//! }
//! # use carton::{Record, Stored, TypeInfo, TypeRef, ScalarKind, Value, ValueError};
//! # struct MyData { value: f64 }
//! # impl Stored for MyData {
//! #     fn describe() -> TypeInfo {
//! #         TypeInfo::class::<Self>("MyData").field("value", TypeRef::Scalar(ScalarKind::F64))
//! #     }
//! #     fn to_value(&self) -> Value {
//! #         Record::new("MyData").field("value", self.value).into()
//! #     }
//! #     fn from_value(v: &Value) -> Result<Self, ValueError> {
//! #         let rec = v.as_record().ok_or_else(|| ValueError::not_a_record("MyData"))?;
//! #         Ok(Self { value: rec.get("value").and_then(Value::as_f64).unwrap_or_default() })
//! #     }
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Serializer (Any <-> frame)              |
//! +--------------------------------------------------------------+
//! |   Compiled model: per-type plans, runtime dispatch tables    |
//! +--------------------------------------------------------------+
//! |   Type model: builder -> read -> merge/validate -> write     |
//! +--------------------------------------------------------------+
//! |   SQLite: types / fields / variables tables                  |
//! +--------------------------------------------------------------+
//! ```
//!
//! Stable type ids are the contract: once a type or field has been given
//! an id, that id is never reassigned for the lifetime of the database,
//! which is what makes old frames decodable forever.

pub mod codec;
pub mod model;
pub mod serializer;
pub mod support;
pub mod value;

pub use codec::CodecError;
pub use model::{
    open_model, BreakingChange, CompiledModel, FieldDescription, ModelError, SchemaError,
    TypeDescription, SCHEMA_FORMAT_VERSION,
};
pub use serializer::{SerializeError, Serializer};
pub use support::{
    handle_of, Builtins, Classification, ScalarKind, Stored, StoredVia, TypeInfo, TypeRef, TypeSet,
};
pub use value::{Record, Value, ValueError};
