// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed wire codec for dynamic values.
//!
//! A frame is `[type_id: i32 LE][payload]`. The payload layout is driven
//! entirely by the compiled plan for that id, so the codec never consults
//! names at runtime. Record payloads are tagged member lists
//! (`[tag: u32][len: u32][bytes]` per member), which is what makes the
//! format evolvable: readers skip tags they do not know and default
//! members that are absent.

pub(crate) mod cursor;
pub(crate) mod decode;
pub(crate) mod encode;

use std::fmt;

pub(crate) use decode::decode_frame;
pub(crate) use encode::encode_frame;

/// Failure while encoding a value tree to a frame or decoding one back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Read past the end of the frame or of a length-prefixed member.
    Truncated { needed: usize, remaining: usize },
    /// A string payload was not valid UTF-8.
    InvalidUtf8,
    /// A referenced type id has no description in this model.
    UnknownTypeId { type_id: i32 },
    /// A value names a type this model has no description for.
    UnknownTypeName { name: String },
    /// The id resolves to a description that cannot carry values this
    /// session (root, interface or tombstoned).
    NotConcrete { type_id: i32 },
    /// A nested value's concrete type is not on the declared type's chain.
    NotAnAncestor { declared: i32, concrete: i32 },
    /// The dynamic value's shape does not match the plan.
    ValueShape {
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, remaining } => write!(
                f,
                "truncated frame: needed {} bytes, {} remaining",
                needed, remaining
            ),
            Self::InvalidUtf8 => write!(f, "string payload is not valid UTF-8"),
            Self::UnknownTypeId { type_id } => {
                write!(f, "unknown type id {} in frame", type_id)
            }
            Self::UnknownTypeName { name } => {
                write!(f, "value names unknown type `{}`", name)
            }
            Self::NotConcrete { type_id } => {
                write!(f, "type id {} is not concrete in this session", type_id)
            }
            Self::NotAnAncestor { declared, concrete } => write!(
                f,
                "concrete type id {} is not assignable to declared type id {}",
                concrete, declared
            ),
            Self::ValueShape { expected, found } => {
                write!(f, "value shape mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for CodecError {}
