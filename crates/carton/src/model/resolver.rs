// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Name resolution between durable type names and runtime bindings.
//!
//! Resolution failure is not fatal: a persisted type whose name no longer
//! maps to a registered runtime type keeps its description (tombstoned,
//! `resolved = None`) and only loses the ability to encode or decode
//! individual values. Everything else keeps working.

use crate::support::RuntimeBinding;
use std::collections::HashMap;

/// Maps durable `full_name`s to runtime bindings for the current session.
///
/// Populated by the graph builder from the caller's registered type set
/// plus every nested type discovered during the declaration walk.
#[derive(Debug, Default)]
pub struct NameResolver {
    by_name: HashMap<String, RuntimeBinding>,
}

impl NameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding under its durable name. First registration wins;
    /// duplicate-name conflicts are detected by the builder before this.
    pub(crate) fn bind(&mut self, full_name: &str, binding: RuntimeBinding) {
        self.by_name
            .entry(full_name.to_string())
            .or_insert(binding);
    }

    /// Resolve a durable name to its runtime binding.
    ///
    /// Returns `None` when the type was renamed, moved or dropped from the
    /// registered set; the caller logs a diagnostic and continues with a
    /// tombstoned description.
    pub fn resolve(&self, full_name: &str) -> Option<&RuntimeBinding> {
        self.by_name.get(full_name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::{handle_of, ScalarKind, Stored, TypeInfo, TypeRef};
    use crate::value::{Record, Value, ValueError};
    use std::any::TypeId;

    struct Cpu {
        cores: u16,
    }

    impl Stored for Cpu {
        fn describe() -> TypeInfo {
            TypeInfo::class::<Self>("Cpu").field("cores", TypeRef::Scalar(ScalarKind::U16))
        }

        fn to_value(&self) -> Value {
            Record::new("Cpu").field("cores", self.cores).into()
        }

        fn from_value(value: &Value) -> Result<Self, ValueError> {
            let rec = value.as_record().ok_or_else(|| ValueError::not_a_record("Cpu"))?;
            Ok(Self {
                cores: rec.get("cores").and_then(Value::as_u16).unwrap_or_default(),
            })
        }
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let mut resolver = NameResolver::new();
        let handle = handle_of::<Cpu>();
        resolver.bind(&handle.info.full_name, handle.binding);

        let binding = resolver.resolve("Cpu").expect("Cpu resolves");
        assert_eq!(binding.any_id, TypeId::of::<Cpu>());
        assert!(resolver.resolve("Gpu").is_none());
    }

    #[test]
    fn test_first_binding_wins() {
        let mut resolver = NameResolver::new();
        let first = handle_of::<Cpu>();
        resolver.bind("Cpu", first.binding);
        resolver.bind("Cpu", first.binding);
        assert_eq!(resolver.len(), 1);
    }
}
