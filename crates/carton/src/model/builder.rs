// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type graph construction from the registered declaration set.
//!
//! The builder walks the caller's [`TypeSet`] plus the built-in tables and
//! produces a closed [`TypeGraph`]: every base type, surrogate target and
//! field type has its own description in the same graph. Ids are assigned
//! in dependency order (deeps first), so a freshly registered base or
//! field-type dependency always receives a smaller id than its dependents.
//!
//! Ids assigned here are provisional for the session: the merge step keeps
//! ids of previously persisted types and rebases new ones above them.

use crate::model::description::{FieldDescription, TypeDescription, TypeGraph};
use crate::model::errors::SchemaError;
use crate::model::resolver::NameResolver;
use crate::support::{
    Builtins, Classification, ScalarKind, TypeHandle, TypeInfo, TypeRef, TypeSet, ROOT_TYPE_NAME,
};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};

/// Build the session type graph and name resolver from the registered set.
pub fn build_graph(
    builtins: &Builtins,
    set: &TypeSet,
) -> Result<(TypeGraph, NameResolver), SchemaError> {
    let mut graph = TypeGraph::new();
    let mut collector = Collector::default();

    seed_builtins(&mut graph, &mut collector.resolver, builtins);

    for handle in builtins.surrogate_handles() {
        collector.collect_handle(handle)?;
    }
    for info in set.abstract_infos() {
        collector.collect_info(info, None)?;
    }
    for handle in set.concrete_handles() {
        collector.collect_handle(handle)?;
    }

    materialize(&mut graph, collector.order)?;
    Ok((graph, collector.resolver))
}

/// Seed the root `object` type and the scalar built-ins. Seeding order is
/// fixed so built-in ids are identical across sessions and databases.
fn seed_builtins(graph: &mut TypeGraph, resolver: &mut NameResolver, builtins: &Builtins) {
    graph.insert(TypeDescription {
        type_id: 1,
        full_name: ROOT_TYPE_NAME.to_string(),
        classification: Classification::Class,
        base_id: None,
        surrogate_id: None,
        surrogated_id: None,
        enum_repr_id: None,
        fields: Vec::new(),
        resolved: None,
    });

    for (kind, binding) in builtins.scalar_bindings() {
        let type_id = graph.max_id() + 1;
        resolver.bind(kind.full_name(), binding);
        graph.insert(TypeDescription {
            type_id,
            full_name: kind.full_name().to_string(),
            classification: Classification::Struct,
            base_id: None,
            surrogate_id: None,
            surrogated_id: None,
            enum_repr_id: None,
            fields: Vec::new(),
            resolved: Some(binding.any_id),
        });
    }
}

#[derive(Default)]
struct Collector {
    /// Declarations in dependency (post-) order.
    order: Vec<TypeInfo>,
    /// Durable names already entered; breaks cycles through
    /// self-referential and mutually-referential declarations.
    entered: HashSet<String>,
    /// Runtime identity seen per name, for collision detection.
    runtimes: HashMap<String, TypeId>,
    resolver: NameResolver,
}

impl Collector {
    fn collect_handle(&mut self, handle: TypeHandle) -> Result<(), SchemaError> {
        self.resolver.bind(&handle.info.full_name, handle.binding);
        self.collect_info(handle.info, Some(handle.binding.any_id))
    }

    fn collect_info(&mut self, info: TypeInfo, runtime: Option<TypeId>) -> Result<(), SchemaError> {
        let name = info.full_name.clone();
        if let Some(rt) = runtime.or(info.runtime) {
            match self.runtimes.get(&name) {
                Some(seen) if *seen != rt => {
                    return Err(SchemaError::NameCollision { full_name: name })
                }
                Some(_) => {}
                None => {
                    self.runtimes.insert(name.clone(), rt);
                }
            }
        }
        if ScalarKind::from_full_name(&name).is_some() || name == ROOT_TYPE_NAME {
            return Ok(());
        }
        if !self.entered.insert(name) {
            return Ok(());
        }

        if info.classification == Classification::Enum {
            let repr = info.enum_repr.unwrap_or(ScalarKind::I32);
            if !repr.supported_enum_repr() {
                return Err(SchemaError::UnsupportedEnumRepr {
                    type_name: info.full_name,
                    repr,
                });
            }
        }

        if let Some(base) = info.base {
            self.collect_handle(base())?;
        }
        if let Some(surrogate) = info.surrogate {
            self.collect_handle(surrogate())?;
        }
        for field in &info.fields {
            self.collect_ref(&field.ty)?;
        }

        self.order.push(info);
        Ok(())
    }

    fn collect_ref(&mut self, ty: &TypeRef) -> Result<(), SchemaError> {
        match ty {
            TypeRef::Scalar(_) => Ok(()),
            TypeRef::Array(elem) => {
                self.collect_ref(elem)?;
                let name = ref_name(ty);
                if self.entered.insert(name.clone()) {
                    self.order.push(TypeInfo::array_instantiation(name));
                }
                Ok(())
            }
            TypeRef::User(handle) => self.collect_handle(handle()),
            TypeRef::Abstract(info) => self.collect_info(info(), None),
        }
    }
}

/// Durable name of a field type reference.
pub(crate) fn ref_name(ty: &TypeRef) -> String {
    match ty {
        TypeRef::Scalar(kind) => kind.full_name().to_string(),
        TypeRef::Array(elem) => format!("{}[]", ref_name(elem)),
        TypeRef::User(handle) => handle().info.full_name,
        TypeRef::Abstract(info) => info().full_name,
    }
}

/// True when a durable name denotes an array instantiation.
pub(crate) fn is_array_name(name: &str) -> bool {
    name.ends_with("[]")
}

fn materialize(graph: &mut TypeGraph, order: Vec<TypeInfo>) -> Result<(), SchemaError> {
    // Assign all ids first: cyclic declarations may reference entries that
    // materialize later in the order.
    let mut assigned: HashMap<String, i32> = HashMap::new();
    let mut next_id = graph.max_id() + 1;
    for info in &order {
        if !graph.contains_name(&info.full_name) && !assigned.contains_key(&info.full_name) {
            assigned.insert(info.full_name.clone(), next_id);
            next_id += 1;
        }
    }

    let id_of = |graph: &TypeGraph, name: &str| -> Result<i32, SchemaError> {
        graph
            .id_of(name)
            .or_else(|| assigned.get(name).copied())
            .ok_or_else(|| SchemaError::InvalidRow {
                detail: format!("unregistered reference to `{}`", name),
            })
    };

    let mut surrogate_links: Vec<(i32, i32)> = Vec::new();

    for info in order {
        if graph.contains_name(&info.full_name) {
            continue;
        }
        let type_id = assigned[&info.full_name];

        let base_id = match (&info.base, info.classification) {
            (Some(base), _) => Some(id_of(graph, &base().info.full_name)?),
            (None, Classification::Class | Classification::Interface)
                if !is_array_name(&info.full_name) && info.surrogate.is_none() =>
            {
                Some(id_of(graph, ROOT_TYPE_NAME)?)
            }
            _ => None,
        };

        let enum_repr_id = match info.classification {
            Classification::Enum => {
                let repr = info.enum_repr.unwrap_or(ScalarKind::I32);
                Some(id_of(graph, repr.full_name())?)
            }
            _ => None,
        };

        let surrogate_id = match &info.surrogate {
            Some(surrogate) => {
                let sid = id_of(graph, &surrogate().info.full_name)?;
                surrogate_links.push((type_id, sid));
                Some(sid)
            }
            None => None,
        };

        let mut fields = Vec::with_capacity(info.fields.len());
        let mut next_member = 1;
        for field in &info.fields {
            while Some(next_member) == base_id {
                next_member += 1;
            }
            fields.push(FieldDescription {
                name: field.name.clone(),
                member_id: next_member,
                field_type_id: id_of(graph, &ref_name(&field.ty))?,
            });
            next_member += 1;
        }

        graph.insert(TypeDescription {
            type_id,
            full_name: info.full_name,
            classification: info.classification,
            base_id,
            surrogate_id,
            surrogated_id: None,
            enum_repr_id,
            fields,
            resolved: info.runtime,
        });
    }

    for (subject_id, surrogate_id) in surrogate_links {
        if let Some(desc) = graph.get_mut(surrogate_id) {
            desc.surrogated_id = Some(subject_id);
        }
    }

    Ok(())
}
