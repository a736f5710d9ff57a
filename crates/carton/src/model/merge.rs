// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Merge of the freshly built graph into the persisted one.
//!
//! The persisted graph is authoritative for ids: every type and member id
//! it assigned in an earlier session is kept verbatim. The fresh graph is
//! authoritative for runtime bindings and for additive structure (new
//! types, new fields). Anything structural that differs in a
//! non-additive way between the two is a breaking change and aborts the
//! open attempt before the store is touched.
//!
//! Names are the join key throughout. Fresh ids are provisional and are
//! discarded: a type known to the persisted graph keeps its persisted id,
//! a new type is rebased above the persisted maximum in fresh-id order so
//! ids stay monotonic across sessions.

use crate::model::description::{FieldDescription, TypeDescription, TypeGraph};
use crate::model::errors::{BreakingChange, SchemaError};
use std::collections::HashMap;

/// Fold `fresh` into `persisted`, validating compatibility.
pub fn merge(mut persisted: TypeGraph, fresh: &TypeGraph) -> Result<TypeGraph, SchemaError> {
    if persisted.is_empty() {
        return Ok(fresh.clone());
    }

    validate(&persisted, fresh)?;

    // Final id assignment: persisted id when the name is known, otherwise
    // a rebased id above the persisted maximum, in fresh-id order.
    let mut final_ids: HashMap<String, i32> = HashMap::new();
    let mut new_type_ids: Vec<i32> = Vec::new();
    let mut next_id = persisted.max_id() + 1;
    for desc in fresh.iter() {
        match persisted.id_of(&desc.full_name) {
            Some(id) => {
                final_ids.insert(desc.full_name.clone(), id);
            }
            None => {
                final_ids.insert(desc.full_name.clone(), next_id);
                new_type_ids.push(desc.type_id);
                next_id += 1;
            }
        }
    }

    let map_ref = |fresh_id: i32| -> Result<i32, SchemaError> {
        let name = fresh
            .get(fresh_id)
            .map(|d| d.full_name.as_str())
            .ok_or_else(|| SchemaError::InvalidRow {
                detail: format!("dangling type reference {} in fresh graph", fresh_id),
            })?;
        final_ids
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::InvalidRow {
                detail: format!("type `{}` missing from merged graph", name),
            })
    };

    // Known types: refresh session state and surrogate linkage, append new
    // fields.
    for fresh_desc in fresh.iter() {
        let Some(id) = persisted.id_of(&fresh_desc.full_name) else {
            continue;
        };
        let surrogate = match fresh_desc.surrogate_id {
            Some(sid) => Some(map_ref(sid)?),
            None => None,
        };
        let surrogated = match fresh_desc.surrogated_id {
            Some(sid) => Some(map_ref(sid)?),
            None => None,
        };
        let new_fields: Vec<(String, i32)> = {
            let Some(known) = persisted.get(id) else {
                continue;
            };
            fresh_desc
                .fields
                .iter()
                .filter(|f| known.field(&f.name).is_none())
                .map(|f| Ok((f.name.clone(), map_ref(f.field_type_id)?)))
                .collect::<Result<_, SchemaError>>()?
        };
        if let Some(desc) = persisted.get_mut(id) {
            desc.resolved = fresh_desc.resolved;
            desc.surrogate_id = surrogate;
            desc.surrogated_id = surrogated;
            for (name, field_type_id) in new_fields {
                let member_id = desc.next_member_id();
                desc.fields.push(FieldDescription {
                    name,
                    member_id,
                    field_type_id,
                });
            }
        }
    }

    // New types: rebase and insert. Member ids are recomputed against the
    // final base id so the tag spaces stay disjoint under the new numbering.
    for fresh_id in new_type_ids {
        let Some(src) = fresh.get(fresh_id) else {
            continue;
        };
        let type_id = final_ids[&src.full_name];
        let base_id = match src.base_id {
            Some(b) => Some(map_ref(b)?),
            None => None,
        };
        let surrogate_id = match src.surrogate_id {
            Some(s) => Some(map_ref(s)?),
            None => None,
        };
        let surrogated_id = match src.surrogated_id {
            Some(s) => Some(map_ref(s)?),
            None => None,
        };
        let enum_repr_id = match src.enum_repr_id {
            Some(r) => Some(map_ref(r)?),
            None => None,
        };
        let mut fields = Vec::with_capacity(src.fields.len());
        let mut next_member = 1;
        for f in &src.fields {
            while Some(next_member) == base_id {
                next_member += 1;
            }
            fields.push(FieldDescription {
                name: f.name.clone(),
                member_id: next_member,
                field_type_id: map_ref(f.field_type_id)?,
            });
            next_member += 1;
        }
        persisted.insert(TypeDescription {
            type_id,
            full_name: src.full_name.clone(),
            classification: src.classification,
            base_id,
            surrogate_id,
            surrogated_id,
            enum_repr_id,
            fields,
            resolved: src.resolved,
        });
    }

    Ok(persisted)
}

/// Reject non-additive structural differences between the two graphs.
fn validate(persisted: &TypeGraph, fresh: &TypeGraph) -> Result<(), SchemaError> {
    for fresh_desc in fresh.iter() {
        let Some(known) = persisted.by_name(&fresh_desc.full_name) else {
            continue;
        };

        if known.classification != fresh_desc.classification {
            return Err(BreakingChange::ClassificationChanged {
                type_name: known.full_name.clone(),
                old: known.classification,
                new: fresh_desc.classification,
            }
            .into());
        }

        let old_base = ref_name(persisted, known.base_id);
        let new_base = ref_name(fresh, fresh_desc.base_id);
        if old_base != new_base {
            return Err(BreakingChange::BaseChanged {
                type_name: known.full_name.clone(),
                old: old_base,
                new: new_base,
            }
            .into());
        }

        let old_repr = ref_name(persisted, known.enum_repr_id);
        let new_repr = ref_name(fresh, fresh_desc.enum_repr_id);
        if old_repr != new_repr {
            return Err(BreakingChange::EnumReprChanged {
                type_name: known.full_name.clone(),
                old: old_repr,
                new: new_repr,
            }
            .into());
        }

        // Fields are matched by name. Removed fields are tolerated (their
        // persisted description stays), new fields are additive; a field
        // present in both sessions must keep its type.
        for fresh_field in &fresh_desc.fields {
            let Some(known_field) = known.field(&fresh_field.name) else {
                continue;
            };
            let old_ty = ref_name(persisted, Some(known_field.field_type_id));
            let new_ty = ref_name(fresh, Some(fresh_field.field_type_id));
            if old_ty != new_ty {
                return Err(BreakingChange::FieldTypeChanged {
                    type_name: known.full_name.clone(),
                    field: fresh_field.name.clone(),
                    old: old_ty.unwrap_or_else(|| "?".into()),
                    new: new_ty.unwrap_or_else(|| "?".into()),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn ref_name(graph: &TypeGraph, id: Option<i32>) -> Option<String> {
    id.and_then(|id| graph.get(id)).map(|d| d.full_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::build_graph;
    use crate::support::{
        handle_of, Builtins, Classification, ScalarKind, Stored, TypeInfo, TypeRef, TypeSet,
    };
    use crate::value::{Record, Value, ValueError};

    fn builtins() -> Builtins {
        Builtins {
            time_surrogates: false,
        }
    }

    fn graph_of(set: &TypeSet) -> TypeGraph {
        build_graph(&builtins(), set).expect("build").0
    }

    macro_rules! plain_stored {
        ($ty:ident, $name:literal, $($field:literal : $kind:ident),* $(,)?) => {
            struct $ty;
            impl Stored for $ty {
                fn describe() -> TypeInfo {
                    TypeInfo::class::<Self>($name)
                        $( .field($field, TypeRef::Scalar(ScalarKind::$kind)) )*
                }
                fn to_value(&self) -> Value {
                    Record::new($name).into()
                }
                fn from_value(value: &Value) -> Result<Self, ValueError> {
                    value
                        .as_record()
                        .map(|_| Self)
                        .ok_or_else(|| ValueError::not_a_record($name))
                }
            }
        };
    }

    plain_stored!(Comic, "Comic", "title": Str, "pages": I32);
    plain_stored!(ComicWithArtist, "Comic", "title": Str, "pages": I32, "artist": Str);
    plain_stored!(ComicRetyped, "Comic", "title": Str, "pages": Str);
    plain_stored!(Thing, "Thing",);
    plain_stored!(PlaneOnObject, "Plane", "wings": U8);
    plain_stored!(Extra, "Extra", "note": Str);

    #[test]
    fn test_empty_persisted_takes_fresh() {
        let mut set = TypeSet::new();
        set.register::<Comic>();
        let fresh = graph_of(&set);
        let merged = merge(TypeGraph::new(), &fresh).expect("merge");
        assert_eq!(merged.len(), fresh.len());
        assert_eq!(merged.id_of("Comic"), fresh.id_of("Comic"));
    }

    #[test]
    fn test_identical_graphs_merge_unchanged() {
        let mut set = TypeSet::new();
        set.register::<Comic>();
        let persisted = graph_of(&set);
        let fresh = graph_of(&set);
        let before: Vec<i32> = persisted.iter().map(|d| d.type_id).collect();
        let merged = merge(persisted, &fresh).expect("merge");
        let after: Vec<i32> = merged.iter().map(|d| d.type_id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_new_field_appended_with_next_member_id() {
        let mut set = TypeSet::new();
        set.register::<Comic>();
        let persisted = graph_of(&set);
        let old_fields = persisted.by_name("Comic").unwrap().fields.clone();

        let mut set = TypeSet::new();
        set.register::<ComicWithArtist>();
        let fresh = graph_of(&set);

        let merged = merge(persisted, &fresh).expect("merge");
        let comic = merged.by_name("Comic").unwrap();
        assert_eq!(comic.fields.len(), 3);
        for old in &old_fields {
            assert_eq!(comic.field(&old.name).unwrap().member_id, old.member_id);
        }
        let artist = comic.field("artist").unwrap();
        assert!(old_fields.iter().all(|f| artist.member_id > f.member_id));
    }

    #[test]
    fn test_removed_field_is_retained() {
        let mut set = TypeSet::new();
        set.register::<ComicWithArtist>();
        let persisted = graph_of(&set);

        let mut set = TypeSet::new();
        set.register::<Comic>();
        let fresh = graph_of(&set);

        let merged = merge(persisted, &fresh).expect("merge");
        let comic = merged.by_name("Comic").unwrap();
        assert!(comic.field("artist").is_some(), "dropped field keeps its id");
    }

    #[test]
    fn test_field_type_change_is_breaking() {
        let mut set = TypeSet::new();
        set.register::<Comic>();
        let persisted = graph_of(&set);

        let mut set = TypeSet::new();
        set.register::<ComicRetyped>();
        let fresh = graph_of(&set);

        match merge(persisted, &fresh) {
            Err(SchemaError::Breaking(BreakingChange::FieldTypeChanged {
                type_name,
                field,
                old,
                new,
            })) => {
                assert_eq!(type_name, "Comic");
                assert_eq!(field, "pages");
                assert_eq!(old, "i32");
                assert_eq!(new, "string");
            }
            other => panic!("expected FieldTypeChanged, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_base_change_is_breaking() {
        struct PlaneDerived;
        impl Stored for PlaneDerived {
            fn describe() -> TypeInfo {
                TypeInfo::class::<Self>("Plane")
                    .with_base(handle_of::<Thing>)
                    .field("wings", TypeRef::Scalar(ScalarKind::U8))
            }
            fn to_value(&self) -> Value {
                Record::new("Plane").into()
            }
            fn from_value(value: &Value) -> Result<Self, ValueError> {
                value
                    .as_record()
                    .map(|_| Self)
                    .ok_or_else(|| ValueError::not_a_record("Plane"))
            }
        }

        let mut set = TypeSet::new();
        set.register::<PlaneDerived>();
        let persisted = graph_of(&set);

        let mut set = TypeSet::new();
        set.register::<PlaneOnObject>();
        set.register::<Thing>();
        let fresh = graph_of(&set);

        match merge(persisted, &fresh) {
            Err(SchemaError::Breaking(BreakingChange::BaseChanged {
                type_name,
                old,
                new,
            })) => {
                assert_eq!(type_name, "Plane");
                assert_eq!(old.as_deref(), Some("Thing"));
                assert_eq!(new.as_deref(), Some("object"));
            }
            other => panic!("expected BaseChanged, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_known_type_gains_surrogate_link() {
        fn desc(type_id: i32, full_name: &str) -> TypeDescription {
            TypeDescription {
                type_id,
                full_name: full_name.to_string(),
                classification: Classification::Class,
                base_id: None,
                surrogate_id: None,
                surrogated_id: None,
                enum_repr_id: None,
                fields: Vec::new(),
                resolved: None,
            }
        }

        // Earlier session persisted the subject without a surrogate.
        let mut persisted = TypeGraph::new();
        persisted.insert(desc(1, "object"));
        persisted.insert(desc(2, "ext.Clock"));

        // This session declares a stand-in for it.
        let mut fresh = TypeGraph::new();
        fresh.insert(desc(1, "object"));
        let mut stand_in = desc(2, "ClockFace");
        stand_in.surrogated_id = Some(3);
        fresh.insert(stand_in);
        let mut subject = desc(3, "ext.Clock");
        subject.surrogate_id = Some(2);
        fresh.insert(subject);

        let merged = merge(persisted, &fresh).expect("merge");
        let face_id = merged.id_of("ClockFace").expect("stand-in inserted");
        assert!(face_id > 2, "stand-in rebases above the persisted max");
        let clock = merged.by_name("ext.Clock").unwrap();
        assert_eq!(clock.type_id, 2, "subject keeps its persisted id");
        assert_eq!(clock.surrogate_id, Some(face_id));
        assert_eq!(
            merged.get(face_id).unwrap().surrogated_id,
            Some(clock.type_id)
        );
    }

    #[test]
    fn test_new_type_rebased_above_persisted_max() {
        let mut set = TypeSet::new();
        set.register::<Comic>();
        let persisted = graph_of(&set);
        let max = persisted.max_id();

        let mut set = TypeSet::new();
        set.register::<Comic>();
        set.register::<Extra>();
        let fresh = graph_of(&set);

        let merged = merge(persisted, &fresh).expect("merge");
        let extra = merged.by_name("Extra").unwrap();
        assert!(extra.type_id > max, "new ids continue above persisted max");
        assert_eq!(extra.field("note").unwrap().member_id, 1);
    }
}
