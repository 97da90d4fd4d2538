// src/taxdb.rs

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{Result, TaxonomyError};
use crate::taxonomy::{Taxonomy, TaxonomySnapshot};
use crate::types::{CanonicalNameIndex, NameIndex, NodeMap, TaxonNode};

pub const NAMES_DMP: &str = "names.dmp";
pub const NODES_DMP: &str = "nodes.dmp";

/// Name class that marks the canonical name of a taxon.
pub const SCIENTIFIC_NAME: &str = "scientific name";

/// Minimum field counts once a row is split on `'\t'`.
const NAMES_MIN_FIELDS: usize = 5;
const NODES_MIN_FIELDS: usize = 5;

/// Accumulates the three indices while the dumps are read.
///
/// Nothing here is visible to readers until [`TaxonomyBuilder::finish`]
/// hands the indices over to an immutable [`Taxonomy`].
#[derive(Debug, Default)]
pub struct TaxonomyBuilder {
    nodes: NodeMap,
    names: NameIndex,
    scientific_names: CanonicalNameIndex,
}

impl TaxonomyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one names.dmp row:
    /// ```text
    /// <taxid>\t|\t<name>\t|\t<unique name>\t|\t<name class>\t|
    /// ```
    /// `[0]` is the taxid, `[2]` the display name and `[len - 2]` the class.
    /// Every row feeds the name index; only scientific names feed the
    /// canonical index.
    pub fn add_name_record(&mut self, line: &str, line_num: usize) -> Result<()> {
        let fields = split_record(line);
        if fields.len() < NAMES_MIN_FIELDS {
            return Err(malformed(
                NAMES_DMP,
                line_num,
                format!(
                    "expected at least {} fields, got {}",
                    NAMES_MIN_FIELDS,
                    fields.len()
                ),
            ));
        }

        let taxid = fields[0];
        if taxid.is_empty() {
            return Err(malformed(NAMES_DMP, line_num, "empty taxon id".into()));
        }
        let name = fields[2];
        let name_class = fields[fields.len() - 2];

        self.names.insert(name.to_string(), taxid.to_string());
        if name_class == SCIENTIFIC_NAME {
            self.scientific_names
                .insert(taxid.to_string(), name.to_string());
        }
        Ok(())
    }

    /// Parses one nodes.dmp row:
    /// ```text
    /// <taxid>\t|\t<parent taxid>\t|\t<rank>\t|\t...
    /// ```
    pub fn add_node_record(&mut self, line: &str, line_num: usize) -> Result<()> {
        let fields = split_record(line);
        if fields.len() < NODES_MIN_FIELDS {
            return Err(malformed(
                NODES_DMP,
                line_num,
                format!(
                    "expected at least {} fields, got {}",
                    NODES_MIN_FIELDS,
                    fields.len()
                ),
            ));
        }

        let child = fields[0];
        let parent = fields[2];
        if child.is_empty() {
            return Err(malformed(NODES_DMP, line_num, "empty taxon id".into()));
        }
        if parent.is_empty() {
            return Err(malformed(NODES_DMP, line_num, "empty parent id".into()));
        }

        let previous = self
            .nodes
            .insert(child.to_string(), TaxonNode::new(parent, fields[4]));
        if previous.is_some() {
            log::warn!(
                "{}:{}: duplicate record for taxon {}, keeping the last one",
                NODES_DMP,
                line_num,
                child
            );
        }
        Ok(())
    }

    /// Feeds every row of a names stream. Returns the number of records read.
    pub fn read_names<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let count = for_each_record(reader, |line, line_num| {
            self.add_name_record(line, line_num)
        })?;
        log::debug!("Parsed {} records from {}", count, NAMES_DMP);
        Ok(count)
    }

    /// Feeds every row of a nodes stream. Returns the number of records read.
    pub fn read_nodes<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let count = for_each_record(reader, |line, line_num| {
            self.add_node_record(line, line_num)
        })?;
        log::debug!("Parsed {} records from {}", count, NODES_DMP);
        Ok(count)
    }

    pub fn finish(self) -> Taxonomy {
        Taxonomy::from_snapshot(TaxonomySnapshot {
            nodes: self.nodes,
            names: self.names,
            scientific_names: self.scientific_names,
        })
    }
}

/// Opens `<dir>/<file_name>`, falling back to `<dir>/<file_name>.gz`.
///
/// Reports the plain path as missing when neither exists.
pub fn open_dump(dir: &Path, file_name: &str) -> Result<Box<dyn BufRead>> {
    let plain = dir.join(file_name);
    match File::open(&plain) {
        Ok(f) => return Ok(Box::new(BufReader::new(f))),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let gz = dir.join(format!("{file_name}.gz"));
    match File::open(&gz) {
        Ok(f) => {
            log::debug!("Reading gzipped dump {}", gz.display());
            Ok(Box::new(BufReader::new(MultiGzDecoder::new(f))))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(TaxonomyError::MissingFile(plain)),
        Err(e) => Err(e.into()),
    }
}

/// Splits a dump row on tabs after dropping a trailing `\r`.
fn split_record(line: &str) -> Vec<&str> {
    line.strip_suffix('\r').unwrap_or(line).split('\t').collect()
}

/// Runs `f` on every non-blank line with its 1-based line number.
fn for_each_record<R, F>(reader: R, mut f: F) -> Result<usize>
where
    R: BufRead,
    F: FnMut(&str, usize) -> Result<()>,
{
    let mut count = 0;
    for (idx, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim_end_matches('\r').is_empty() {
            continue;
        }
        f(&line, idx + 1)?;
        count += 1;
    }
    Ok(count)
}

fn malformed(source_name: &'static str, line: usize, reason: String) -> TaxonomyError {
    TaxonomyError::MalformedRecord {
        source_name,
        line,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;

    const NAMES: &str = "\
1\t|\troot\t|\t\t|\tscientific name\t|
2\t|\tBacteria\t|\tBacteria <bacteria>\t|\tscientific name\t|
2\t|\teubacteria\t|\t\t|\tgenbank common name\t|
";

    const NODES: &str = "\
1\t|\t1\t|\tno rank\t|\t\t|
2\t|\t1\t|\tsuperkingdom\t|\t\t|
";

    #[test]
    fn test_name_record_fields() {
        let mut builder = TaxonomyBuilder::new();
        builder.read_names(NAMES.as_bytes()).unwrap();
        assert_eq!(builder.names.get("eubacteria").map(String::as_str), Some("2"));
        assert_eq!(builder.names.get("Bacteria").map(String::as_str), Some("2"));
        assert_eq!(
            builder.scientific_names.get("2").map(String::as_str),
            Some("Bacteria")
        );
        assert_eq!(builder.scientific_names.len(), 2);
    }

    #[test]
    fn test_node_record_fields() {
        let mut builder = TaxonomyBuilder::new();
        let count = builder.read_nodes(NODES.as_bytes()).unwrap();
        assert_eq!(count, 2);
        assert_eq!(builder.nodes["2"], TaxonNode::new("1", "superkingdom"));
        assert_eq!(builder.nodes["1"], TaxonNode::new("1", "no rank"));
    }

    #[test]
    fn test_empty_rank_is_kept_empty() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_node_record("5\t|\t1\t|\t\t|", 1).unwrap();
        assert_eq!(builder.nodes["5"].rank, "");
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let mut builder = TaxonomyBuilder::new();
        let input = "1\t|\t1\t|\tno rank\t|\r\n\r\n2\t|\t1\t|\tgenus\t|\r\n";
        assert_eq!(builder.read_nodes(input.as_bytes()).unwrap(), 2);
        assert_eq!(builder.nodes["2"].rank, "genus");
    }

    #[test]
    fn test_short_names_row_is_malformed() {
        let mut builder = TaxonomyBuilder::new();
        let err = builder
            .read_names("1\t|\troot\t|\t\t|\tscientific name\t|\n9\t|\tshort\n".as_bytes())
            .unwrap_err();
        match err {
            TaxonomyError::MalformedRecord {
                source_name, line, ..
            } => {
                assert_eq!(source_name, NAMES_DMP);
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_empty_ids_are_malformed() {
        let mut builder = TaxonomyBuilder::new();
        assert!(matches!(
            builder.add_node_record("\t|\t1\t|\tgenus\t|", 3),
            Err(TaxonomyError::MalformedRecord { line: 3, .. })
        ));
        assert!(matches!(
            builder.add_node_record("7\t|\t\t|\tgenus\t|", 4),
            Err(TaxonomyError::MalformedRecord { line: 4, .. })
        ));
        assert!(matches!(
            builder.add_name_record("\t|\tx\t|\t\t|\tscientific name\t|", 5),
            Err(TaxonomyError::MalformedRecord { line: 5, .. })
        ));
    }

    #[test]
    fn test_duplicate_node_last_wins() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_node_record("3\t|\t1\t|\tgenus\t|", 1).unwrap();
        builder.add_node_record("3\t|\t2\t|\tspecies\t|", 2).unwrap();
        assert_eq!(builder.nodes["3"], TaxonNode::new("2", "species"));
    }

    #[test]
    fn test_open_dump_plain_and_gz() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(NAMES_DMP), NAMES).unwrap();

        let mut encoder = GzEncoder::new(
            File::create(dir.path().join("nodes.dmp.gz")).unwrap(),
            Compression::default(),
        );
        encoder.write_all(NODES.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let mut builder = TaxonomyBuilder::new();
        builder.read_names(open_dump(dir.path(), NAMES_DMP).unwrap()).unwrap();
        builder.read_nodes(open_dump(dir.path(), NODES_DMP).unwrap()).unwrap();
        assert_eq!(builder.nodes.len(), 2);
        assert_eq!(builder.names.len(), 3);
    }

    #[test]
    fn test_open_dump_missing() {
        let dir = tempfile::tempdir().unwrap();
        match open_dump(dir.path(), NODES_DMP) {
            Err(TaxonomyError::MissingFile(path)) => {
                assert_eq!(path, dir.path().join(NODES_DMP));
            }
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("expected a missing file"),
        }
    }
}
