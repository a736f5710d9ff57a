// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type model: graph construction, persistence, merge and compilation.
//!
//! Opening a model is a fixed pipeline over one database connection:
//!
//! 1. create the schema tables and check the format version,
//! 2. build the fresh graph from the registered [`TypeSet`],
//! 3. read the persisted graph, resolving names tolerantly,
//! 4. merge fresh into persisted, validating for breaking changes,
//! 5. write the merged graph back (insert-or-ignore, one transaction),
//! 6. compile the merged graph into the session's immutable model.
//!
//! Nothing is written before the merge validates, so a breaking change
//! leaves the database exactly as the previous session left it.

pub(crate) mod builder;
pub(crate) mod compile;
pub mod description;
pub mod errors;
pub(crate) mod merge;
pub(crate) mod resolver;
pub(crate) mod store;

pub use compile::CompiledModel;
pub use description::{FieldDescription, TypeDescription};
pub use errors::{BreakingChange, ModelError, SchemaError};
pub use store::SCHEMA_FORMAT_VERSION;

use crate::support::{Builtins, TypeSet};
use rusqlite::Connection;
use std::sync::Arc;

/// Open (or create) the type model stored in `conn` against the session's
/// registered types.
pub fn open_model(
    conn: &mut Connection,
    builtins: &Builtins,
    types: &TypeSet,
) -> Result<Arc<CompiledModel>, SchemaError> {
    store::init_schema(conn)?;
    store::check_format_version(conn)?;

    let (fresh, resolver) = builder::build_graph(builtins, types)?;
    let persisted = store::read_graph(conn, &resolver)?;
    let merged = merge::merge(persisted, &fresh)?;
    store::write_graph(conn, &merged)?;

    let model = compile::compile(merged, &resolver)?;
    log::debug!(
        "type model opened: {} descriptions, {} registered",
        model.descriptions().count(),
        types.len()
    );
    Ok(Arc::new(model))
}
