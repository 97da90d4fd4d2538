// src/taxonomy.rs

use std::io::BufRead;
use std::path::Path;

use ahash::AHashSet;
use rayon::prelude::*;

use crate::error::{Result, TaxonomyError};
use crate::taxdb::{open_dump, TaxonomyBuilder, NAMES_DMP, NODES_DMP};
use crate::types::{CanonicalNameIndex, LineageEntry, NameIndex, NodeMap, TaxonId, TaxonNode};

/// The raw indices of a [`Taxonomy`], as handed to and from a persistence
/// layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaxonomySnapshot {
    pub nodes: NodeMap,
    pub names: NameIndex,
    pub scientific_names: CanonicalNameIndex,
}

/// An immutable taxonomy hierarchy with its name indices.
///
/// Built once, either from the `names.dmp`/`nodes.dmp` pair or from a
/// [`TaxonomySnapshot`], and only read afterwards. Every query is a pure
/// function of its arguments so a `Taxonomy` can be shared across threads
/// without locking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Taxonomy {
    nodes: NodeMap,
    names: NameIndex,
    scientific_names: CanonicalNameIndex,
    /// Parent ids the nodes dump references but never defines.
    dangling_parents: AHashSet<TaxonId>,
}

impl Taxonomy {
    /// Builds the hierarchy from a names stream and a nodes stream.
    ///
    /// Any malformed row aborts the build.
    pub fn from_readers<N: BufRead, T: BufRead>(names: N, nodes: T) -> Result<Self> {
        let mut builder = TaxonomyBuilder::new();
        builder.read_names(names)?;
        builder.read_nodes(nodes)?;
        let taxonomy = builder.finish();
        log::info!(
            "Built taxonomy with {} nodes, {} names, {} scientific names",
            taxonomy.nodes.len(),
            taxonomy.names.len(),
            taxonomy.scientific_names.len()
        );
        Ok(taxonomy)
    }

    /// Builds the hierarchy from a taxdump directory.
    ///
    /// `names.dmp.gz` / `nodes.dmp.gz` are used when the plain files are
    /// absent.
    pub fn from_dump_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        log::info!("Parsing taxonomy dumps in {}", dir.display());
        let names = open_dump(dir, NAMES_DMP)?;
        let nodes = open_dump(dir, NODES_DMP)?;
        Self::from_readers(names, nodes)
    }

    pub fn from_snapshot(snapshot: TaxonomySnapshot) -> Self {
        let dangling_parents = snapshot
            .nodes
            .values()
            .filter(|node| !snapshot.nodes.contains_key(&node.parent))
            .map(|node| node.parent.clone())
            .collect();
        Self {
            nodes: snapshot.nodes,
            names: snapshot.names,
            scientific_names: snapshot.scientific_names,
            dangling_parents,
        }
    }

    pub fn snapshot(&self) -> TaxonomySnapshot {
        self.clone().into_snapshot()
    }

    /// The derived dangling-parent set is dropped; [`Taxonomy::from_snapshot`]
    /// recomputes it.
    pub fn into_snapshot(self) -> TaxonomySnapshot {
        TaxonomySnapshot {
            nodes: self.nodes,
            names: self.names,
            scientific_names: self.scientific_names,
        }
    }

    pub(crate) fn nodes(&self) -> &NodeMap {
        &self.nodes
    }

    pub(crate) fn names(&self) -> &NameIndex {
        &self.names
    }

    pub(crate) fn scientific_names(&self) -> &CanonicalNameIndex {
        &self.scientific_names
    }

    /// Number of nodes defined by the nodes dump. Dangling parents are not
    /// counted.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when `taxon_id` has its own row in the nodes dump.
    pub fn contains(&self, taxon_id: &str) -> bool {
        self.nodes.contains_key(taxon_id)
    }

    pub fn node(&self, taxon_id: &str) -> Option<&TaxonNode> {
        self.nodes.get(taxon_id)
    }

    pub fn parent(&self, taxon_id: &str) -> Option<&str> {
        self.nodes.get(taxon_id).map(|n| n.parent.as_str())
    }

    /// Rank of `taxon_id`, empty when unknown.
    pub fn rank(&self, taxon_id: &str) -> &str {
        self.nodes
            .get(taxon_id)
            .map(|n| n.rank.as_str())
            .unwrap_or("")
    }

    /// Scientific name of `taxon_id`, empty when the dump has none.
    pub fn scientific_name(&self, taxon_id: &str) -> &str {
        self.scientific_names
            .get(taxon_id)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Taxon id registered last for a display name.
    pub fn resolve_name(&self, name: &str) -> Option<&str> {
        self.names.get(name).map(String::as_str)
    }

    /// Lazy walk from `taxon_id` towards the root, starting with `taxon_id`
    /// itself. Yields nothing when `taxon_id` is neither a defined node nor
    /// a parent some node points at.
    pub fn lineage<'a>(&'a self, taxon_id: &'a str) -> Lineage<'a> {
        let start = self
            .nodes
            .get_key_value(taxon_id)
            .map(|(k, _)| k.as_str())
            .or_else(|| self.dangling_parents.get(taxon_id).map(String::as_str));
        Lineage {
            taxonomy: self,
            origin: taxon_id,
            next: start,
            visited: 0,
        }
    }

    /// Ids from `taxon_id` up to the root, inclusive.
    pub fn ancestor_id_path(&self, taxon_id: &str) -> Result<Vec<TaxonId>> {
        self.lineage(taxon_id)
            .map(|id| id.map(str::to_string))
            .collect()
    }

    pub fn ancestor_id_path_by_name(&self, name: &str) -> Result<Vec<TaxonId>> {
        match self.resolve_name(name) {
            Some(taxon_id) => self.ancestor_id_path(taxon_id),
            None => Ok(Vec::new()),
        }
    }

    /// `(scientific name, rank)` for every id of [`Taxonomy::ancestor_id_path`],
    /// position for position.
    pub fn ancestor_name_path(&self, taxon_id: &str) -> Result<Vec<LineageEntry>> {
        self.lineage(taxon_id)
            .map(|id| id.map(|id| LineageEntry::new(self.scientific_name(id), self.rank(id))))
            .collect()
    }

    pub fn ancestor_name_path_by_name(&self, name: &str) -> Result<Vec<LineageEntry>> {
        match self.resolve_name(name) {
            Some(taxon_id) => self.ancestor_name_path(taxon_id),
            None => Ok(Vec::new()),
        }
    }

    /// Nearest node on the lineage of `taxon_id` (the node itself included)
    /// whose rank is exactly `rank`, with its scientific name.
    pub fn find_ancestor_at_rank(
        &self,
        taxon_id: &str,
        rank: &str,
    ) -> Result<Option<(TaxonId, String)>> {
        for id in self.lineage(taxon_id) {
            let id = id?;
            if self.rank(id) == rank {
                return Ok(Some((id.to_string(), self.scientific_name(id).to_string())));
            }
        }
        Ok(None)
    }

    pub fn find_ancestor_at_rank_by_name(
        &self,
        name: &str,
        rank: &str,
    ) -> Result<Option<(TaxonId, String)>> {
        match self.resolve_name(name) {
            Some(taxon_id) => self.find_ancestor_at_rank(taxon_id, rank),
            None => Ok(None),
        }
    }

    /// [`Taxonomy::find_ancestor_at_rank`] over many ids in parallel.
    /// Results keep the order of `taxon_ids`.
    pub fn project_ranks<S>(
        &self,
        taxon_ids: &[S],
        rank: &str,
    ) -> Vec<Result<Option<(TaxonId, String)>>>
    where
        S: AsRef<str> + Sync,
    {
        taxon_ids
            .par_iter()
            .map(|id| self.find_ancestor_at_rank(id.as_ref(), rank))
            .collect()
    }

    /// Like [`Taxonomy::project_ranks`] for queries that may not have
    /// resolved to an id. `None` entries are not looked up and come back as
    /// `Ok(None)`.
    pub fn project_resolved(
        &self,
        taxon_ids: &[Option<&str>],
        rank: &str,
    ) -> Vec<Result<Option<(TaxonId, String)>>> {
        taxon_ids
            .par_iter()
            .map(|id| match id {
                Some(id) => self.find_ancestor_at_rank(id, rank),
                None => Ok(None),
            })
            .collect()
    }
}

/// Iterator returned by [`Taxonomy::lineage`].
///
/// Stops after the self-referencing root or after a parent id the nodes
/// dump never defines. Yields a single `CycleDetected` error, then ends,
/// once it has produced more ids than the hierarchy has nodes.
pub struct Lineage<'a> {
    taxonomy: &'a Taxonomy,
    origin: &'a str,
    next: Option<&'a str>,
    visited: usize,
}

impl<'a> Iterator for Lineage<'a> {
    type Item = Result<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;

        // A well-formed path holds every node at most once, plus possibly
        // one dangling parent at the end.
        if self.visited > self.taxonomy.nodes.len() {
            log::warn!(
                "Lineage walk from taxon {} exceeded {} steps",
                self.origin,
                self.taxonomy.nodes.len()
            );
            return Some(Err(TaxonomyError::CycleDetected {
                taxon_id: self.origin.to_string(),
            }));
        }
        self.visited += 1;

        self.next = match self.taxonomy.nodes.get(current) {
            Some(node) if node.parent != current => Some(node.parent.as_str()),
            _ => None,
        };
        Some(Ok(current))
    }
}
