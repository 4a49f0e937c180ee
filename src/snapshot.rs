//! Whole-graph binary snapshots
//!
//! Layout: magic bytes, a little-endian format version, the body length,
//! then the bincode-encoded graph. Loading fails loudly on a bad magic or
//! a version mismatch; there is no cross-version migration. Writers are
//! not atomic against crashes - callers that need atomicity write to a
//! temp file and rename.

use crate::scope::graph::ScopeGraph;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Identifies a srcfacts snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"SFGX";

/// Bumped on any incompatible change to the serialized graph shape.
pub const FORMAT_VERSION: u32 = 1;

/// Serialize the graph to `path`. The caller must hold the graph read
/// lock for the duration so the image is consistent.
pub fn write_snapshot(graph: &ScopeGraph, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(SNAPSHOT_MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;

    let body = bincode::serde::encode_to_vec(graph, bincode::config::standard())?;
    writer.write_all(&(body.len() as u64).to_le_bytes())?;
    writer.write_all(&body)?;
    writer.flush()?;

    tracing::debug!(path = %path.display(), bytes = body.len(), "snapshot written");
    Ok(())
}

/// Read a snapshot back into a graph.
pub fn read_snapshot(path: &Path) -> Result<ScopeGraph> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != *SNAPSHOT_MAGIC {
        return Err(Error::Serialization(format!(
            "{} is not a snapshot file (bad magic)",
            path.display()
        )));
    }

    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version != FORMAT_VERSION {
        return Err(Error::Serialization(format!(
            "snapshot format version {} is not supported (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let mut len_bytes = [0u8; 8];
    reader.read_exact(&mut len_bytes)?;
    let len = u64::from_le_bytes(len_bytes) as usize;

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;

    let (graph, _) = bincode::serde::decode_from_slice(&body, bincode::config::standard())?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use crate::location::Location;
    use crate::scope::model::ScopeKind;

    fn sample_graph() -> ScopeGraph {
        let mut g = ScopeGraph::new();
        g.set_language("a.cpp", Language::Cpp);
        let ns = g.add_scope(
            g.root(),
            ScopeKind::Namespace { name: "N".into() },
            Some(Location::new("a.cpp", "/unit[1]/namespace[1]", 1, 1, 4)),
        );
        g.add_scope(
            ns,
            ScopeKind::Type {
                name: "C".into(),
                supers: vec!["Base".into()],
            },
            Some(Location::new(
                "a.cpp",
                "/unit[1]/namespace[1]/block[1]/class[1]",
                2,
                1,
                2,
            )),
        );
        g
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.bin");

        let graph = sample_graph();
        write_snapshot(&graph, &path).unwrap();
        let loaded = read_snapshot(&path).unwrap();

        assert_eq!(graph, loaded);
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.bin");
        std::fs::write(&path, b"NOPE0000000000000000").unwrap();

        assert!(matches!(
            read_snapshot(&path),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.bin");
        write_snapshot(&sample_graph(), &path).unwrap();

        // corrupt the version field
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[4] = 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = read_snapshot(&path).unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_truncated_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facts.bin");
        write_snapshot(&sample_graph(), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(read_snapshot(&path).is_err());
    }
}
