// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persisted structural representation of types.
//!
//! The type graph is an arena of [`TypeDescription`]s keyed by `type_id`.
//! All cross-references (base, surrogate, underlying enum representation,
//! field types) are stored as integer ids instead of owned pointers, so
//! cyclic and mutually-referential type graphs need no special handling:
//! references are resolved to live descriptions only on lookup.

use crate::support::Classification;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};

/// One serializable field, scoped to its declaring type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    pub name: String,
    /// Stable per-type field tag; assigned once, never reused even for
    /// fields later omitted from the declaration.
    pub member_id: i32,
    pub field_type_id: i32,
}

/// Structural description of one distinct serializable type.
#[derive(Debug, Clone)]
pub struct TypeDescription {
    /// Positive, unique within one database lifetime, never reassigned.
    pub type_id: i32,
    /// Version-independent identity key.
    pub full_name: String,
    pub classification: Classification,
    /// Immediate registered ancestor.
    pub base_id: Option<i32>,
    /// Stand-in type used to encode values of this type.
    pub surrogate_id: Option<i32>,
    /// Subject this type stands in for. Mutually exclusive with
    /// `surrogate_id`.
    pub surrogated_id: Option<i32>,
    /// Underlying representation, enums only.
    pub enum_repr_id: Option<i32>,
    pub fields: Vec<FieldDescription>,
    /// Runtime identity when the durable name resolved in this session;
    /// `None` marks a tombstoned description (still valid, not decodable).
    pub resolved: Option<TypeId>,
}

impl TypeDescription {
    pub fn is_tombstoned(&self) -> bool {
        self.resolved.is_none()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescription> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Next free member id for a newly appended field: one past the highest
    /// assigned id, skipping the base type's id to keep tag spaces disjoint.
    pub fn next_member_id(&self) -> i32 {
        let mut next = self.fields.iter().map(|f| f.member_id).max().unwrap_or(0) + 1;
        if Some(next) == self.base_id {
            next += 1;
        }
        next
    }
}

/// Arena of type descriptions for one database session.
#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    types: BTreeMap<i32, TypeDescription>,
    by_name: HashMap<String, i32>,
}

impl TypeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a description. The id and the name must both be unused.
    pub fn insert(&mut self, desc: TypeDescription) {
        debug_assert!(!self.types.contains_key(&desc.type_id));
        debug_assert!(!self.by_name.contains_key(&desc.full_name));
        self.by_name.insert(desc.full_name.clone(), desc.type_id);
        self.types.insert(desc.type_id, desc);
    }

    pub fn get(&self, type_id: i32) -> Option<&TypeDescription> {
        self.types.get(&type_id)
    }

    pub fn get_mut(&mut self, type_id: i32) -> Option<&mut TypeDescription> {
        self.types.get_mut(&type_id)
    }

    pub fn id_of(&self, full_name: &str) -> Option<i32> {
        self.by_name.get(full_name).copied()
    }

    pub fn by_name(&self, full_name: &str) -> Option<&TypeDescription> {
        self.id_of(full_name).and_then(|id| self.get(id))
    }

    pub fn contains_name(&self, full_name: &str) -> bool {
        self.by_name.contains_key(full_name)
    }

    /// Descriptions in ascending id order (base before derived for types
    /// registered in the same pass).
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescription> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn max_id(&self) -> i32 {
        self.types.keys().next_back().copied().unwrap_or(0)
    }
}
