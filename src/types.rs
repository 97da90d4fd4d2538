// src/types.rs

use ahash::AHashMap;

/// Taxon identifiers are kept as the strings found in the dump.
pub type TaxonId = String;

/// child_taxid -> node (parent edge + rank)
pub type NodeMap = AHashMap<TaxonId, TaxonNode>;
/// display name -> taxid, every name class, last write wins
pub type NameIndex = AHashMap<String, TaxonId>;
/// taxid -> scientific name
pub type CanonicalNameIndex = AHashMap<TaxonId, String>;

/// One row of the nodes dump.
///
/// The root carries itself as `parent`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonNode {
    pub parent: TaxonId,
    /// Empty when the node has no formal rank.
    pub rank: String,
}

impl TaxonNode {
    pub fn new(parent: impl Into<TaxonId>, rank: impl Into<String>) -> Self {
        Self {
            parent: parent.into(),
            rank: rank.into(),
        }
    }
}

/// A `(name, rank)` step of a lineage.
///
/// Both fields are empty strings when the dump has nothing for them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineageEntry {
    pub name: String,
    pub rank: String,
}

impl LineageEntry {
    pub fn new(name: impl Into<String>, rank: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rank: rank.into(),
        }
    }
}
