//! FASTA input for leaves and FASTA output for propagation artifacts.

use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use bio::io::fasta;

use crate::error::{PropagationError, Result};
use crate::masking::RepeatMasker;

fn io_err(path: &Path, source: std::io::Error) -> PropagationError {
    PropagationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Read and concatenate every record's sequence from one FASTA file.
fn read_one(path: &Path) -> Result<Vec<u8>> {
    let reader = fasta::Reader::from_file(path).map_err(|e| io_err(path, e))?;
    let mut out = Vec::new();
    for rec in reader.records() {
        let rec = rec.map_err(|e| io_err(path, e))?;
        out.extend_from_slice(rec.seq());
    }
    Ok(out)
}

/// Resolve a node's `fastapath` (an `@`-separated list of file names,
/// relative to `library_dir`) to a concatenated, optionally masked
/// sequence. Missing files are fatal per spec §4.3.
pub fn load_leaf_sequence(
    node_name: &str,
    fastapath: &str,
    library_dir: &Path,
    masker: &dyn RepeatMasker,
) -> Result<Vec<u8>> {
    let mut seq = Vec::new();
    for part in fastapath.split('@') {
        let path: PathBuf = library_dir.join(part);
        if !path.exists() {
            return Err(PropagationError::MissingLeafFasta {
                node: node_name.to_string(),
                path,
            });
        }
        seq.extend(read_one(&path)?);
    }
    masker.mask(&seq)
}

/// Write a set of contigs as FASTA records named `<node_name>_<i>`.
pub fn write_contigs(path: &Path, node_name: &str, contigs: &[Vec<u8>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let f = std::fs::File::create(path).map_err(|e| io_err(path, e))?;
    let mut w = BufWriter::new(f);
    for (i, contig) in contigs.iter().enumerate() {
        writeln!(w, ">{node_name}_{i}").map_err(|e| io_err(path, e))?;
        w.write_all(contig).map_err(|e| io_err(path, e))?;
        writeln!(w).map_err(|e| io_err(path, e))?;
    }
    Ok(())
}

/// Append one `(name, count)` row to a node's count TSV file.
pub fn write_count(path: &Path, node_name: &str, count: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let f = std::fs::File::create(path).map_err(|e| io_err(path, e))?;
    let mut w = BufWriter::new(f);
    writeln!(w, "{node_name}\t{count}").map_err(|e| io_err(path, e))
}
