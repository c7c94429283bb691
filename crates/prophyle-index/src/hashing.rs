//! Content-hash logging of build artifacts, supplementing the original
//! implementation's `_file_md5`/`_log_file_md5` debug logging with
//! `blake3` (the hashing primitive the teacher workspace already depends
//! on for manifest commitments) instead of MD5.

use std::path::Path;

use tracing::debug;

use crate::error::{IndexError, Result};

/// Hash `path`'s contents and log the digest at `debug` level, returning it.
pub fn log_file_hash(path: &Path) -> Result<blake3::Hash> {
    let bytes = std::fs::read(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let hash = blake3::hash(&bytes);
    debug!(path = %path.display(), hash = %hash.to_hex(), "artifact content hash");
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("f.txt");
        std::fs::write(&p, b"hello").unwrap();
        let h1 = log_file_hash(&p).unwrap();
        let h2 = log_file_hash(&p).unwrap();
        assert_eq!(h1, h2);
    }
}
