// src/lib.rs
pub mod error;
pub mod types;
pub mod taxdb;
pub mod taxonomy;
pub mod snapshot;

pub use crate::error::{Result, TaxonomyError};
pub use crate::snapshot::load_or_build;
pub use crate::taxonomy::{Lineage, Taxonomy, TaxonomySnapshot};
pub use crate::types::{LineageEntry, TaxonId, TaxonNode};

/// Renders a name path as `rank:name;rank:name;...`, query node first.
pub fn format_lineage(entries: &[LineageEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}:{}", e.rank, e.name))
        .collect::<Vec<_>>()
        .join(";")
}
