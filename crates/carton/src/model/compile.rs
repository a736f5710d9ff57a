// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compilation of the merged graph into per-type encoding plans.
//!
//! The merged graph is descriptive: good for persistence and diffing, slow
//! to interpret per value. Compilation runs once per open and flattens each
//! description into a [`Plan`] the codec can execute without name lookups,
//! plus the runtime lookup tables (`std::any::TypeId` to stable id, stable
//! id to binding) the serializer front end needs.

use crate::model::builder::is_array_name;
use crate::model::description::{TypeDescription, TypeGraph};
use crate::model::errors::{ModelError, SchemaError};
use crate::model::resolver::NameResolver;
use crate::support::{Classification, RuntimeBinding, ScalarKind, ROOT_TYPE_NAME};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};

/// One field of a record plan, in wire (member-id) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlanField {
    /// Wire tag. Member ids are positive, the cast is lossless.
    pub member_id: u32,
    pub name: String,
    pub type_id: i32,
}

/// Flattened encoding strategy for one type id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Built-in scalar payload.
    Scalar(ScalarKind),
    /// Integer payload in the underlying representation's width.
    Enum { repr: ScalarKind },
    /// Length-prefixed sequence; `packed` elements are raw fixed-width
    /// little-endian values, others are individually length-prefixed.
    Array { elem: i32, packed: bool },
    /// Tagged member list, optionally chained to a base record.
    Record {
        fields: Vec<PlanField>,
        /// Base member link. The link to the root `object` type is dropped
        /// here: the root carries no members and would only add an empty
        /// nested record to every frame.
        base: Option<i32>,
    },
    /// Values of this type encode as their surrogate's record.
    Surrogate { target: i32 },
    /// Structurally known but not encodable this session (root, interfaces,
    /// tombstoned descriptions).
    Opaque,
}

/// The open database's immutable type model: merged graph, per-type plans
/// and runtime dispatch tables.
pub struct CompiledModel {
    graph: TypeGraph,
    plans: BTreeMap<i32, Plan>,
    by_runtime: HashMap<TypeId, i32>,
    bindings: HashMap<i32, RuntimeBinding>,
}

impl CompiledModel {
    /// Stable id for a runtime type id. Fails when the exact concrete type
    /// was never registered this session.
    pub fn type_id_of(&self, runtime: TypeId) -> Result<i32, ModelError> {
        self.by_runtime
            .get(&runtime)
            .copied()
            .ok_or(ModelError::UnregisteredType { runtime })
    }

    /// Stable id for `T`.
    pub fn type_id<T: Any>(&self) -> Result<i32, ModelError> {
        self.type_id_of(TypeId::of::<T>())
    }

    pub fn is_registered<T: Any>(&self) -> bool {
        self.type_id::<T>().is_ok()
    }

    /// Runtime type a stable id resolves to this session. `None` for ids
    /// that never existed and for tombstoned descriptions alike.
    pub fn get_type(&self, type_id: i32) -> Option<TypeId> {
        self.graph.get(type_id).and_then(|d| d.resolved)
    }

    /// Description lookup by durable name. Returns tombstoned descriptions
    /// too; `None` means the name was never part of this database.
    pub fn type_by_name(&self, full_name: &str) -> Option<&TypeDescription> {
        self.graph.by_name(full_name)
    }

    pub fn description(&self, type_id: i32) -> Option<&TypeDescription> {
        self.graph.get(type_id)
    }

    /// All descriptions in ascending id order.
    pub fn descriptions(&self) -> impl Iterator<Item = &TypeDescription> {
        self.graph.iter()
    }

    pub(crate) fn plan(&self, type_id: i32) -> Option<&Plan> {
        self.plans.get(&type_id)
    }

    pub(crate) fn binding(&self, type_id: i32) -> Option<&RuntimeBinding> {
        self.bindings.get(&type_id)
    }

    /// True when a value of concrete type `concrete` may occupy a position
    /// declared as `declared`. Interfaces carry no link to their
    /// implementors (concrete declarations never name them as base), so a
    /// declared interface accepts any concrete record type; everything else
    /// must carry `declared` on its base chain.
    pub(crate) fn is_assignable(&self, declared: i32, concrete: i32) -> bool {
        let declared_iface = self
            .graph
            .get(declared)
            .map_or(false, |d| d.classification == Classification::Interface);
        declared_iface || self.is_ancestor_or_same(declared, concrete)
    }

    /// True when `ancestor` appears on `type_id`'s base chain (inclusive).
    pub(crate) fn is_ancestor_or_same(&self, ancestor: i32, type_id: i32) -> bool {
        let mut current = Some(type_id);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.graph.get(id).and_then(|d| d.base_id);
        }
        false
    }
}

/// Flatten the merged graph into an immutable model.
pub(crate) fn compile(
    graph: TypeGraph,
    resolver: &NameResolver,
) -> Result<CompiledModel, SchemaError> {
    let root_id = graph.id_of(ROOT_TYPE_NAME);
    let mut plans = BTreeMap::new();
    let mut by_runtime = HashMap::new();
    let mut bindings = HashMap::new();

    for desc in graph.iter() {
        plans.insert(desc.type_id, plan_for(&graph, desc, root_id)?);
        if let Some(binding) = resolver.resolve(&desc.full_name) {
            by_runtime.insert(binding.any_id, desc.type_id);
            bindings.insert(desc.type_id, *binding);
        }
    }

    Ok(CompiledModel {
        graph,
        plans,
        by_runtime,
        bindings,
    })
}

fn plan_for(
    graph: &TypeGraph,
    desc: &TypeDescription,
    root_id: Option<i32>,
) -> Result<Plan, SchemaError> {
    if desc.full_name == ROOT_TYPE_NAME {
        return Ok(Plan::Opaque);
    }
    if let Some(kind) = ScalarKind::from_full_name(&desc.full_name) {
        return Ok(Plan::Scalar(kind));
    }
    if is_array_name(&desc.full_name) {
        let elem_name = &desc.full_name[..desc.full_name.len() - 2];
        let elem = graph.id_of(elem_name).ok_or_else(|| SchemaError::InvalidRow {
            detail: format!(
                "array type `{}` has no element description",
                desc.full_name
            ),
        })?;
        let packed = ScalarKind::from_full_name(elem_name)
            .map(ScalarKind::packable)
            .unwrap_or(false);
        return Ok(Plan::Array { elem, packed });
    }
    if desc.classification == Classification::Enum {
        let repr_name = desc
            .enum_repr_id
            .and_then(|id| graph.get(id))
            .map(|d| d.full_name.as_str());
        let repr = repr_name.and_then(ScalarKind::from_full_name).ok_or_else(|| {
            SchemaError::InvalidRow {
                detail: format!(
                    "enum `{}` has no scalar underlying representation",
                    desc.full_name
                ),
            }
        })?;
        return Ok(Plan::Enum { repr });
    }
    if let Some(target) = desc.surrogate_id {
        return Ok(Plan::Surrogate { target });
    }
    if desc.classification == Classification::Interface || desc.is_tombstoned() {
        return Ok(Plan::Opaque);
    }

    let mut fields: Vec<PlanField> = desc
        .fields
        .iter()
        .map(|f| PlanField {
            member_id: f.member_id as u32,
            name: f.name.clone(),
            type_id: f.field_type_id,
        })
        .collect();
    fields.sort_by_key(|f| f.member_id);
    let base = desc.base_id.filter(|b| Some(*b) != root_id);
    Ok(Plan::Record { fields, base })
}
