//! Static tool catalogs, one module per upstream service.

pub mod openfda;
pub mod opengenes;
pub mod opentargets;

use crate::schema::ToolSpec;

/// Prepend `prefix` to the tool name.
pub(crate) fn prefixed(mut spec: ToolSpec, prefix: &str) -> ToolSpec {
    if !prefix.is_empty() {
        spec.name = format!("{prefix}{}", spec.name);
    }
    spec
}
