//! Iteration items: the per-fetch units discovered by the iteration tool.
//!
//! An item is an opaque JSON object (e.g. one geographic region). Sources
//! without iteration still fan out over exactly one sentinel item so the
//! single-fetch and many-fetch cases share one code path.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// One unit of fan-out: an opaque key-value record produced fresh on every
/// orchestrator run, never persisted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IterationItem {
    fields: Map<String, Value>,
}

impl IterationItem {
    /// The sentinel item for non-iterating sources: no fields at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Wrap a discovered JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Whether this is the sentinel (no fields).
    pub fn is_none(&self) -> bool {
        self.fields.is_empty()
    }

    /// Dotted-path lookup through nested objects, e.g. `region.latitude`.
    pub fn lookup(&self, dotted_path: &str) -> Option<&Value> {
        let mut segments = dotted_path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Extract the linkage map: the named top-level fields rendered as
    /// strings. Fields absent from the item are omitted, so the result is
    /// always present but possibly empty (including for the sentinel).
    pub fn linkage(&self, inject_fields: &[String]) -> BTreeMap<String, String> {
        let mut linkage = BTreeMap::new();
        for field in inject_fields {
            if let Some(value) = self.lookup(field) {
                linkage.insert(field.clone(), render_scalar(value));
            }
        }
        linkage
    }
}

/// Render a JSON value as a plain string: strings unquoted, scalars via
/// their JSON form, containers via compact JSON.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
