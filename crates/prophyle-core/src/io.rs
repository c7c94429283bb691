//! Small serialization helpers shared by `prophyle-index` and
//! `prophyle-query` for internal (non-spec-mandated) artifacts — build
//! metadata, per-node count summaries kept in memory before being flattened
//! to the spec-mandated TSV. Mirrors the auto-detect-by-extension JSON/CBOR
//! pattern of the teacher's `sezkp-core::io`, minus the CBOR branch (no
//! on-disk artifact here needs a binary format).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, Result};

/// Versioned envelope for forward-compatible on-disk metadata, same shape
/// as the teacher's `Versioned<T>`.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct Versioned<T> {
    /// Schema version of `payload`.
    pub ver: u16,
    /// The wrapped value.
    pub payload: T,
}

fn wrap_io(path: &Path, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn wrap_json(path: &Path, source: serde_json::Error) -> CoreError {
    CoreError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| wrap_io(parent, e))?;
        }
    }
    Ok(())
}

/// Write `value` as pretty JSON, wrapped in a `Versioned` envelope.
pub fn write_json<T: Serialize>(path: &Path, ver: u16, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let f = File::create(path).map_err(|e| wrap_io(path, e))?;
    let w = BufWriter::new(f);
    serde_json::to_writer_pretty(w, &Versioned { ver, payload: value }).map_err(|e| wrap_json(path, e))
}

/// Read a `Versioned<T>` JSON file back.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Versioned<T>> {
    let f = File::open(path).map_err(|e| wrap_io(path, e))?;
    let r = BufReader::new(f);
    serde_json::from_reader(r).map_err(|e| wrap_json(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Demo {
        a: u32,
        b: String,
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.json");
        let v = Demo {
            a: 7,
            b: "x".into(),
        };
        write_json(&path, 1, &v).unwrap();
        let back: Versioned<Demo> = read_json(&path).unwrap();
        assert_eq!(back.ver, 1);
        assert_eq!(back.payload, v);
    }
}
