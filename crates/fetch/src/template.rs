//! Request template rendering.
//!
//! A template value may embed `{item.<dot.path>}` placeholders; each is
//! replaced by a dotted-path lookup into the iteration item. Values without
//! placeholders pass through verbatim. A missing path is a configuration or
//! data defect, so rendering fails and the task never reaches the network.

use indexmap::IndexMap;

use sluice_core::item::render_scalar;
use sluice_core::{IterationItem, RequestTemplate};

/// A fully rendered request: final URL plus query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRequest {
    pub url: String,
    pub query_params: IndexMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("item has no field at path '{path}'")]
    MissingField { path: String },

    #[error("item field '{path}' is not a scalar")]
    NotScalar { path: String },
}

/// Render a template against one item.
pub fn build(
    template: &RequestTemplate,
    item: &IterationItem,
) -> Result<ResolvedRequest, TemplateError> {
    let url = render(&template.base_url, item)?;
    let mut query_params = IndexMap::with_capacity(template.params.len());
    for (name, value) in &template.params {
        query_params.insert(name.clone(), render(value, item)?);
    }
    Ok(ResolvedRequest { url, query_params })
}

const PLACEHOLDER_PREFIX: &str = "{item.";

/// Substitute every `{item.<path>}` occurrence in `text`.
///
/// An unterminated `{item.` is left in place rather than treated as an
/// error; only a well-formed placeholder with an unknown path fails.
fn render(text: &str, item: &IterationItem) -> Result<String, TemplateError> {
    if !text.contains(PLACEHOLDER_PREFIX) {
        return Ok(text.to_string());
    }

    let mut rendered = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        rendered.push_str(&rest[..start]);
        let after_prefix = &rest[start + PLACEHOLDER_PREFIX.len()..];
        let Some(end) = after_prefix.find('}') else {
            rendered.push_str(&rest[start..]);
            return Ok(rendered);
        };
        let path = &after_prefix[..end];
        let value = item.lookup(path).ok_or_else(|| TemplateError::MissingField {
            path: path.to_string(),
        })?;
        if value.is_object() || value.is_array() {
            return Err(TemplateError::NotScalar {
                path: path.to_string(),
            });
        }
        rendered.push_str(&render_scalar(value));
        rest = &after_prefix[end + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

// ── Tests ────────────────────────────────────────────────────────────
