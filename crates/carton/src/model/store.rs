// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Durable storage of the type graph.
//!
//! Two tables hold the graph (`types` and `fields`); a one-row-per-key
//! `variables` table records the schema-format version the database was
//! created with. Writes are insert-or-ignore only and run inside a single
//! transaction: existing rows are never updated (structural changes are
//! validated and folded into the in-memory graph by the merge step before
//! anything is written), and a mid-write failure leaves the schema tables
//! untouched.
//!
//! Reads never mutate the on-disk graph. Reconstruction is two passes:
//! pass 1 loads every type row (tolerating unresolvable names), pass 2
//! attaches every field row to its already-loaded declaring description.

use crate::model::builder::is_array_name;
use crate::model::description::{FieldDescription, TypeDescription, TypeGraph};
use crate::model::errors::SchemaError;
use crate::model::resolver::NameResolver;
use crate::support::{Classification, ROOT_TYPE_NAME};
use rusqlite::{params, Connection, OptionalExtension};

/// Format version of the durable schema. Bumped only for layout changes to
/// the `types`/`fields` tables or the wire framing.
pub const SCHEMA_FORMAT_VERSION: i32 = 1;

const FORMAT_VERSION_KEY: &str = "schema_format_version";

/// Create the schema tables when absent.
pub fn init_schema(conn: &Connection) -> Result<(), SchemaError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS variables (
             name TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS types (
             id INTEGER PRIMARY KEY,
             full_name TEXT NOT NULL,
             base_id INTEGER,
             surrogate_id INTEGER,
             underlying_enum_type_id INTEGER,
             classification INTEGER NOT NULL,
             FOREIGN KEY(base_id) REFERENCES types(id),
             FOREIGN KEY(surrogate_id) REFERENCES types(id),
             FOREIGN KEY(underlying_enum_type_id) REFERENCES types(id)
         );
         CREATE TABLE IF NOT EXISTS fields (
             declaring_type_id INTEGER NOT NULL,
             field_id INTEGER NOT NULL,
             name TEXT NOT NULL,
             field_type_id INTEGER NOT NULL,
             UNIQUE(declaring_type_id, field_id),
             FOREIGN KEY(declaring_type_id) REFERENCES types(id),
             FOREIGN KEY(field_type_id) REFERENCES types(id)
         );",
    )?;
    Ok(())
}

/// Compare the database's schema-format version against this build's.
///
/// Runs before any type-model work. A fresh database records the current
/// version; an existing database with any other version (older or newer)
/// fails with [`SchemaError::IncompatibleFormat`].
pub fn check_format_version(conn: &Connection) -> Result<(), SchemaError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM variables WHERE name = ?1",
            [FORMAT_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => {
            conn.execute(
                "INSERT OR IGNORE INTO variables (name, value) VALUES (?1, ?2)",
                params![FORMAT_VERSION_KEY, SCHEMA_FORMAT_VERSION.to_string()],
            )?;
            Ok(())
        }
        Some(value) => {
            let found: i32 = value.parse().map_err(|_| SchemaError::InvalidRow {
                detail: format!("schema format version `{}` is not an integer", value),
            })?;
            if found == SCHEMA_FORMAT_VERSION {
                Ok(())
            } else {
                Err(SchemaError::IncompatibleFormat {
                    found,
                    expected: SCHEMA_FORMAT_VERSION,
                })
            }
        }
    }
}

/// Persist the merged graph. Insert-or-ignore only, single transaction.
pub fn write_graph(conn: &mut Connection, graph: &TypeGraph) -> Result<(), SchemaError> {
    let tx = conn.transaction()?;
    {
        let mut insert_type = tx.prepare(
            "INSERT OR IGNORE INTO types
             (id, full_name, base_id, surrogate_id, underlying_enum_type_id, classification)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut insert_field = tx.prepare(
            "INSERT OR IGNORE INTO fields (declaring_type_id, field_id, name, field_type_id)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for desc in graph.iter() {
            insert_type.execute(params![
                desc.type_id,
                desc.full_name,
                desc.base_id,
                desc.surrogate_id,
                desc.enum_repr_id,
                desc.classification.as_i32(),
            ])?;
            for field in &desc.fields {
                insert_field.execute(params![
                    desc.type_id,
                    field.member_id,
                    field.name,
                    field.field_type_id,
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

/// Load the persisted graph, resolving names through the session resolver.
pub fn read_graph(conn: &Connection, resolver: &NameResolver) -> Result<TypeGraph, SchemaError> {
    let mut graph = TypeGraph::new();

    // Pass 1: type rows.
    let mut stmt = conn.prepare(
        "SELECT id, full_name, base_id, surrogate_id, underlying_enum_type_id, classification
         FROM types ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i32>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<i32>>(2)?,
            row.get::<_, Option<i32>>(3)?,
            row.get::<_, Option<i32>>(4)?,
            row.get::<_, i32>(5)?,
        ))
    })?;

    for row in rows {
        let (type_id, full_name, base_id, surrogate_id, enum_repr_id, classification) = row?;
        let classification =
            Classification::from_i32(classification).ok_or_else(|| SchemaError::InvalidRow {
                detail: format!(
                    "type `{}` (id {}) has unknown classification {}",
                    full_name, type_id, classification
                ),
            })?;
        let resolved = resolver.resolve(&full_name).map(|b| b.any_id);
        let expects_binding = classification != Classification::Interface
            && full_name != ROOT_TYPE_NAME
            && !is_array_name(&full_name);
        if resolved.is_none() && expects_binding {
            log::warn!(
                "type `{}` (id {}) does not resolve to a registered runtime type; \
                 keeping tombstoned description",
                full_name,
                type_id
            );
        }
        graph.insert(TypeDescription {
            type_id,
            full_name,
            classification,
            base_id,
            surrogate_id,
            surrogated_id: None,
            enum_repr_id,
            fields: Vec::new(),
            resolved,
        });
    }

    // Pass 2: field back-references, attached in stable member-id order.
    let mut stmt = conn.prepare(
        "SELECT declaring_type_id, field_id, name, field_type_id
         FROM fields ORDER BY declaring_type_id, field_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i32>(0)?,
            row.get::<_, i32>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i32>(3)?,
        ))
    })?;

    for row in rows {
        let (declaring_type_id, field_id, name, field_type_id) = row?;
        let desc = graph
            .get_mut(declaring_type_id)
            .ok_or_else(|| SchemaError::InvalidRow {
                detail: format!(
                    "field `{}` references unknown declaring type id {}",
                    name, declaring_type_id
                ),
            })?;
        desc.fields.push(FieldDescription {
            name,
            member_id: field_id,
            field_type_id,
        });
    }

    // Surrogate rows only carry the subject -> stand-in direction; restore
    // the back-reference.
    let links: Vec<(i32, i32)> = graph
        .iter()
        .filter_map(|d| d.surrogate_id.map(|s| (d.type_id, s)))
        .collect();
    for (subject_id, surrogate_id) in links {
        match graph.get_mut(surrogate_id) {
            Some(desc) => desc.surrogated_id = Some(subject_id),
            None => {
                return Err(SchemaError::InvalidRow {
                    detail: format!(
                        "type id {} references unknown surrogate id {}",
                        subject_id, surrogate_id
                    ),
                })
            }
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::build_graph;
    use crate::support::{Builtins, ScalarKind, Stored, TypeInfo, TypeRef, TypeSet};
    use crate::value::{Record, Value, ValueError};

    struct KeyA {
        id: i32,
    }

    impl Stored for KeyA {
        fn describe() -> TypeInfo {
            TypeInfo::class::<Self>("KeyA").field("id", TypeRef::Scalar(ScalarKind::I32))
        }

        fn to_value(&self) -> Value {
            Record::new("KeyA").field("id", self.id).into()
        }

        fn from_value(value: &Value) -> Result<Self, ValueError> {
            let rec = value.as_record().ok_or_else(|| ValueError::not_a_record("KeyA"))?;
            Ok(Self {
                id: rec.get("id").and_then(Value::as_i32).unwrap_or_default(),
            })
        }
    }

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        init_schema(&conn).expect("init schema");
        conn
    }

    fn builtins() -> Builtins {
        Builtins {
            time_surrogates: false,
        }
    }

    #[test]
    fn test_format_version_fresh_then_match() {
        let conn = open_memory();
        check_format_version(&conn).expect("fresh db records version");
        check_format_version(&conn).expect("matching version passes");
    }

    #[test]
    fn test_format_version_mismatch() {
        let conn = open_memory();
        conn.execute(
            "INSERT INTO variables (name, value) VALUES (?1, ?2)",
            params![FORMAT_VERSION_KEY, "99"],
        )
        .unwrap();
        match check_format_version(&conn) {
            Err(SchemaError::IncompatibleFormat { found, expected }) => {
                assert_eq!(found, 99);
                assert_eq!(expected, SCHEMA_FORMAT_VERSION);
            }
            other => panic!("expected IncompatibleFormat, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let mut conn = open_memory();
        let mut set = TypeSet::new();
        set.register::<KeyA>();
        let (graph, resolver) = build_graph(&builtins(), &set).expect("build");

        write_graph(&mut conn, &graph).expect("write");
        let loaded = read_graph(&conn, &resolver).expect("read");

        assert_eq!(loaded.len(), graph.len());
        for desc in graph.iter() {
            let got = loaded.by_name(&desc.full_name).expect("type persisted");
            assert_eq!(got.type_id, desc.type_id);
            assert_eq!(got.classification, desc.classification);
            assert_eq!(got.base_id, desc.base_id);
            assert_eq!(got.enum_repr_id, desc.enum_repr_id);
            assert_eq!(got.fields, desc.fields);
        }
        let key_a = loaded.by_name("KeyA").expect("KeyA");
        assert!(key_a.resolved.is_some());
    }

    #[test]
    fn test_write_is_idempotent() {
        let mut conn = open_memory();
        let mut set = TypeSet::new();
        set.register::<KeyA>();
        let (graph, _) = build_graph(&builtins(), &set).expect("build");

        write_graph(&mut conn, &graph).expect("first write");
        write_graph(&mut conn, &graph).expect("second write");

        let type_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM types", [], |r| r.get(0))
            .unwrap();
        let field_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM fields", [], |r| r.get(0))
            .unwrap();
        assert_eq!(type_rows as usize, graph.len());
        assert_eq!(
            field_rows as usize,
            graph.iter().map(|d| d.fields.len()).sum::<usize>()
        );
    }

    #[test]
    fn test_read_tolerates_unresolvable_name() {
        let mut conn = open_memory();
        let mut set = TypeSet::new();
        set.register::<KeyA>();
        let (graph, _) = build_graph(&builtins(), &set).expect("build");
        write_graph(&mut conn, &graph).expect("write");

        // Reopen with an empty registered set: KeyA no longer resolves.
        let (_, empty_resolver) = build_graph(&builtins(), &TypeSet::new()).expect("build");
        let loaded = read_graph(&conn, &empty_resolver).expect("read");

        let key_a = loaded.by_name("KeyA").expect("description kept");
        assert!(key_a.is_tombstoned());
        assert_eq!(key_a.fields.len(), 1, "field records survive");
        assert!(
            loaded.by_name("i32").expect("builtin").resolved.is_some(),
            "builtins still resolve"
        );
    }
}
