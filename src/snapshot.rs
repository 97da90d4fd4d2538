// src/snapshot.rs

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use ahash::AHashMap;

use crate::error::{Result, TaxonomyError};
use crate::taxonomy::{Taxonomy, TaxonomySnapshot};
use crate::types::TaxonNode;

/// File type code for taxonomy snapshots.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"TAXLIN01";

/// Writes a taxonomy in the snapshot layout:
/// ```text
/// magic (8 bytes) | node count | name count | scientific name count   (u64 LE)
/// nodes:            taxid, parent, rank
/// names:            name, taxid
/// scientific names: taxid, name
/// ```
/// Each string is a u64 LE byte length followed by UTF-8 bytes. Entries
/// are sorted by key, so equal taxonomies give identical bytes.
pub fn write_snapshot<W: Write>(mut writer: W, taxonomy: &Taxonomy) -> Result<()> {
    let nodes = taxonomy.nodes();
    let names = taxonomy.names();
    let scientific_names = taxonomy.scientific_names();

    writer.write_all(SNAPSHOT_MAGIC)?;
    write_u64(&mut writer, nodes.len() as u64)?;
    write_u64(&mut writer, names.len() as u64)?;
    write_u64(&mut writer, scientific_names.len() as u64)?;

    let mut node_ids: Vec<_> = nodes.keys().collect();
    node_ids.sort_unstable();
    for id in node_ids {
        let node = &nodes[id];
        write_str(&mut writer, id)?;
        write_str(&mut writer, &node.parent)?;
        write_str(&mut writer, &node.rank)?;
    }

    write_sorted_pairs(&mut writer, names)?;
    write_sorted_pairs(&mut writer, scientific_names)?;
    writer.flush()?;
    Ok(())
}

/// Reads a snapshot written by [`write_snapshot`].
pub fn read_snapshot<R: Read>(mut reader: R) -> Result<Taxonomy> {
    let mut magic = [0u8; 8];
    read_exact(&mut reader, &mut magic)?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(TaxonomyError::InvalidSnapshot(format!(
            "bad magic {:?}",
            String::from_utf8_lossy(&magic)
        )));
    }

    let node_count = read_u64(&mut reader)?;
    let name_count = read_u64(&mut reader)?;
    let scientific_count = read_u64(&mut reader)?;

    let mut nodes = AHashMap::new();
    for _ in 0..node_count {
        let id = read_string(&mut reader)?;
        let parent = read_string(&mut reader)?;
        let rank = read_string(&mut reader)?;
        nodes.insert(id, TaxonNode { parent, rank });
    }
    let names = read_pairs(&mut reader, name_count)?;
    let scientific_names = read_pairs(&mut reader, scientific_count)?;

    let taxonomy = Taxonomy::from_snapshot(TaxonomySnapshot {
        nodes,
        names,
        scientific_names,
    });
    if taxonomy.len() as u64 != node_count {
        return Err(TaxonomyError::InvalidSnapshot(
            "duplicate node ids".to_string(),
        ));
    }
    Ok(taxonomy)
}

impl Taxonomy {
    /// Writes this taxonomy to a snapshot file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        write_snapshot(BufWriter::new(file), self)?;
        log::info!("Saved taxonomy snapshot to {}", path.display());
        Ok(())
    }

    /// Loads a taxonomy from a snapshot file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TaxonomyError::MissingFile(path.to_path_buf()),
            _ => TaxonomyError::Io(e),
        })?;
        let taxonomy = read_snapshot(BufReader::new(file))?;
        log::info!(
            "Loaded taxonomy snapshot {} with {} nodes",
            path.display(),
            taxonomy.len()
        );
        Ok(taxonomy)
    }
}

/// Loads `snapshot_path` when it exists, otherwise parses `dump_dir` and
/// writes the snapshot for next time.
///
/// The snapshot is never checked against the dumps it came from. A failed
/// write is logged and the freshly built taxonomy is still returned.
pub fn load_or_build<P, Q>(snapshot_path: P, dump_dir: Q) -> Result<Taxonomy>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let snapshot_path = snapshot_path.as_ref();
    if snapshot_path.exists() {
        return Taxonomy::load(snapshot_path);
    }

    let taxonomy = Taxonomy::from_dump_dir(dump_dir)?;
    if let Err(e) = taxonomy.save(snapshot_path) {
        log::warn!(
            "Could not write taxonomy snapshot {}: {}",
            snapshot_path.display(),
            e
        );
    }
    Ok(taxonomy)
}

fn write_sorted_pairs<W: Write>(writer: &mut W, map: &AHashMap<String, String>) -> Result<()> {
    let mut pairs: Vec<_> = map.iter().collect();
    pairs.sort_unstable();
    for (key, value) in pairs {
        write_str(writer, key)?;
        write_str(writer, value)?;
    }
    Ok(())
}

fn read_pairs<R: Read>(reader: &mut R, count: u64) -> Result<AHashMap<String, String>> {
    let mut map = AHashMap::new();
    for _ in 0..count {
        let key = read_string(reader)?;
        let value = read_string(reader)?;
        map.insert(key, value);
    }
    if map.len() as u64 != count {
        return Err(TaxonomyError::InvalidSnapshot("duplicate keys".to_string()));
    }
    Ok(map)
}

fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    write_u64(writer, s.len() as u64)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => TaxonomyError::InvalidSnapshot("truncated".to_string()),
        _ => TaxonomyError::Io(e),
    })
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact(reader, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_u64(reader)?;
    // take() keeps a corrupt length from allocating past the end of the input
    let mut bytes = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(TaxonomyError::InvalidSnapshot("truncated".to_string()));
    }
    String::from_utf8(bytes).map_err(|_| TaxonomyError::InvalidSnapshot("invalid UTF-8".to_string()))
}
