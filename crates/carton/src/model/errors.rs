// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for type-model construction, persistence and merge.

use crate::support::{Classification, ScalarKind};
use std::fmt;

/// A structural difference that would make previously encoded bytes
/// unreadable or misinterpreted. Detecting one aborts the whole open
/// attempt before anything is written.
#[derive(Debug, Clone)]
pub enum BreakingChange {
    ClassificationChanged {
        type_name: String,
        old: Classification,
        new: Classification,
    },
    BaseChanged {
        type_name: String,
        old: Option<String>,
        new: Option<String>,
    },
    FieldTypeChanged {
        type_name: String,
        field: String,
        old: String,
        new: String,
    },
    EnumReprChanged {
        type_name: String,
        old: Option<String>,
        new: Option<String>,
    },
}

fn opt_name(name: &Option<String>) -> &str {
    name.as_deref().unwrap_or("none")
}

impl fmt::Display for BreakingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassificationChanged {
                type_name,
                old,
                new,
            } => write!(
                f,
                "breaking change on type `{}`: classification changed from {} to {}",
                type_name,
                old.name(),
                new.name()
            ),
            Self::BaseChanged {
                type_name,
                old,
                new,
            } => write!(
                f,
                "breaking change on type `{}`: base type changed from `{}` to `{}`",
                type_name,
                opt_name(old),
                opt_name(new)
            ),
            Self::FieldTypeChanged {
                type_name,
                field,
                old,
                new,
            } => write!(
                f,
                "breaking change on type `{}`: field `{}` changed type from `{}` to `{}`",
                type_name, field, old, new
            ),
            Self::EnumReprChanged {
                type_name,
                old,
                new,
            } => write!(
                f,
                "breaking change on type `{}`: enum representation changed from `{}` to `{}`",
                type_name,
                opt_name(old),
                opt_name(new)
            ),
        }
    }
}

/// Failure while building, loading, merging or persisting the type model.
#[derive(Debug)]
pub enum SchemaError {
    /// The database was created with a different schema-format version.
    IncompatibleFormat { found: i32, expected: i32 },
    /// An enum declared a representation the encoder cannot carry.
    UnsupportedEnumRepr { type_name: String, repr: ScalarKind },
    /// Two distinct declarations claimed the same durable name.
    NameCollision { full_name: String },
    /// Incompatible structural change between sessions.
    Breaking(BreakingChange),
    /// A persisted row could not be interpreted.
    InvalidRow { detail: String },
    /// Underlying storage failure.
    Storage(rusqlite::Error),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompatibleFormat { found, expected } => write!(
                f,
                "incompatible schema format: database has version {}, this build expects {}",
                found, expected
            ),
            Self::UnsupportedEnumRepr { type_name, repr } => write!(
                f,
                "enum `{}` uses unsupported underlying representation `{}`",
                type_name,
                repr.full_name()
            ),
            Self::NameCollision { full_name } => {
                write!(f, "two distinct types declare the full name `{}`", full_name)
            }
            Self::Breaking(change) => write!(f, "{}", change),
            Self::InvalidRow { detail } => write!(f, "invalid schema row: {}", detail),
            Self::Storage(e) => write!(f, "schema storage failure: {}", e),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for SchemaError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e)
    }
}

impl From<BreakingChange> for SchemaError {
    fn from(change: BreakingChange) -> Self {
        Self::Breaking(change)
    }
}

/// Lookup failure on the compiled model surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelError {
    /// The exact concrete runtime type was never registered. Registering
    /// only a base type or interface is not sufficient for its instances.
    UnregisteredType { runtime: std::any::TypeId },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnregisteredType { runtime } => write!(
                f,
                "concrete runtime type {:?} is not registered with this model",
                runtime
            ),
        }
    }
}

impl std::error::Error for ModelError {}
