// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, loading or walking a taxonomy.
///
/// Query misses (unknown id, unknown name, rank not on the path) are not
/// errors; they come back as empty paths or `None`.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("taxonomy file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A dump row that cannot be split into the expected fields.
    #[error("malformed record in {source_name} at line {line}: {reason}")]
    MalformedRecord {
        source_name: &'static str,
        line: usize,
        reason: String,
    },

    /// The walk from `taxon_id` visited more nodes than the hierarchy holds.
    #[error("cycle detected in lineage of taxon {taxon_id}")]
    CycleDetected { taxon_id: String },

    #[error("invalid taxonomy snapshot: {0}")]
    InvalidSnapshot(String),
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;
