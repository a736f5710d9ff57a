// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Carton schema inspector
//!
//! Dumps the persisted type model of a carton database without needing the
//! application's registered types. Read-only: never touches the schema
//! tables.
//!
//! # Usage
//!
//! ```bash
//! # List all persisted types
//! carton-schema --db app.db types
//!
//! # Show one type's fields and links
//! carton-schema --db app.db show Comic
//!
//! # Print the database's schema-format version
//! carton-schema --db app.db version
//! ```

use anyhow::{bail, Context, Result};
use carton::{Classification, SCHEMA_FORMAT_VERSION};
use clap::{Parser, Subcommand};
use rusqlite::{Connection, OpenFlags, OptionalExtension};

#[derive(Parser, Debug)]
#[command(name = "carton-schema")]
#[command(about = "Inspect the persisted type model of a carton database", long_about = None)]
struct Args {
    /// Database path (SQLite file)
    #[arg(short, long)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List all persisted types
    Types,
    /// Show one type: fields, base, surrogate and enum links
    Show {
        /// Durable type name
        name: String,
    },
    /// Print the database's schema-format version
    Version,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let conn = Connection::open_with_flags(&args.db, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("cannot open database `{}`", args.db))?;

    match args.command {
        Commands::Types => list_types(&conn),
        Commands::Show { name } => show_type(&conn, &name),
        Commands::Version => show_version(&conn),
    }
}

fn list_types(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.full_name, t.classification, b.full_name
         FROM types t LEFT JOIN types b ON t.base_id = b.id
         ORDER BY t.id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i32>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i32>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    println!("{:>6}  {:<12} {:<32} base", "id", "kind", "name");
    for row in rows {
        let (id, name, classification, base) = row?;
        let kind = Classification::from_i32(classification)
            .map(Classification::name)
            .unwrap_or("?");
        println!(
            "{:>6}  {:<12} {:<32} {}",
            id,
            kind,
            name,
            base.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn show_type(conn: &Connection, name: &str) -> Result<()> {
    let row: Option<(i32, i32, Option<i32>, Option<i32>, Option<i32>)> = conn
        .query_row(
            "SELECT id, classification, base_id, surrogate_id, underlying_enum_type_id
             FROM types WHERE full_name = ?1",
            [name],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()?;
    let Some((id, classification, base_id, surrogate_id, enum_repr_id)) = row else {
        bail!("no type named `{}` in this database", name);
    };

    let kind = Classification::from_i32(classification)
        .map(Classification::name)
        .unwrap_or("?");
    println!("type    {} (id {}, {})", name, id, kind);
    if let Some(base) = base_id {
        println!("base    {} (id {})", name_of(conn, base)?, base);
    }
    if let Some(surrogate) = surrogate_id {
        println!("via     {} (id {})", name_of(conn, surrogate)?, surrogate);
    }
    if let Some(repr) = enum_repr_id {
        println!("repr    {} (id {})", name_of(conn, repr)?, repr);
    }

    let mut stmt = conn.prepare(
        "SELECT f.field_id, f.name, t.full_name
         FROM fields f JOIN types t ON f.field_type_id = t.id
         WHERE f.declaring_type_id = ?1
         ORDER BY f.field_id",
    )?;
    let rows = stmt.query_map([id], |row| {
        Ok((
            row.get::<_, i32>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (field_id, field_name, type_name) = row?;
        println!("  [{:>3}] {:<24} {}", field_id, field_name, type_name);
    }
    Ok(())
}

fn show_version(conn: &Connection) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM variables WHERE name = 'schema_format_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match stored {
        Some(v) => println!(
            "schema format version {} (this build expects {})",
            v, SCHEMA_FORMAT_VERSION
        ),
        None => println!("no schema format version recorded"),
    }
    Ok(())
}

fn name_of(conn: &Connection, id: i32) -> Result<String> {
    conn.query_row("SELECT full_name FROM types WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .with_context(|| format!("dangling type id {}", id))
}
