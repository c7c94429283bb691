//! Post-order propagation engine (component C3).
//!
//! Sibling subtrees are independent, so children of an internal node are
//! reduced concurrently via `rayon::join`/`rayon::scope`, synchronizing at
//! the node itself before its intersection is computed — a classic
//! fork-join tree traversal, bounded by the pool's worker count rather than
//! the Makefile-driven process tree the original used (see spec §9's design
//! note on this).

use std::path::{Path, PathBuf};

use prophyle_core::kmer::{self, KmerSet};
use prophyle_core::tree::{NodeId, Tree};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::assemble::{assemble_unitigs, one_contig_per_kmer};
use crate::error::{PropagationError, Result};
use crate::fasta::{load_leaf_sequence, write_contigs, write_count};
use crate::masking::RepeatMasker;

/// Deletative (default) vs non-deletative propagation, spec §4.3 step 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMode {
    /// Children's sets are reduced by the intersection; the simplest legal
    /// output is one contig per residual k-mer (or unitigs if reassembling).
    Deletative,
    /// Children keep their full sets; a re-assembly flag is set instead of
    /// rewriting reduced FASTAs. Open question per spec §9: exact residual
    /// invariants here are not re-specified beyond "children retain their
    /// sets", so no reduced-set emission is attempted in this mode.
    NonDeletative,
}

/// Resolved propagation settings.
#[derive(Debug, Clone)]
pub struct PropagationConfig {
    /// K-mer length.
    pub k: usize,
    /// Deletative vs non-deletative.
    pub mode: PropagationMode,
    /// Re-assemble into greedy unitigs instead of one-contig-per-k-mer.
    pub reassemble: bool,
    /// Directory holding leaf input FASTA files named by `fastapath`.
    pub library_dir: PathBuf,
    /// Directory propagation artifacts are written under
    /// (`<index_dir>/propagation`).
    pub output_dir: PathBuf,
    /// Worker count for the fork-join pool; `0` uses Rayon's default
    /// (number of hardware threads).
    pub workers: usize,
}

impl PropagationConfig {
    fn nonreduced_fasta(&self, node: &str) -> PathBuf {
        self.output_dir.join(format!("{node}.full.fa"))
    }

    fn reduced_fasta(&self, node: &str) -> PathBuf {
        self.output_dir.join(format!("{node}.reduced.fa"))
    }

    fn count_file(&self, node: &str) -> PathBuf {
        self.output_dir.join(format!("{node}.count.tsv"))
    }

    fn marker(&self, path: &Path) -> PathBuf {
        let mut s = path.as_os_str().to_owned();
        s.push(".complete");
        PathBuf::from(s)
    }
}

fn contigs_for(cfg: &PropagationConfig, set: &KmerSet) -> Vec<Vec<u8>> {
    if cfg.reassemble {
        assemble_unitigs(set)
    } else {
        one_contig_per_kmer(set)
    }
}

fn is_fresh(marker: &Path, inputs: &[PathBuf]) -> bool {
    let Ok(marker_meta) = std::fs::metadata(marker) else {
        return false;
    };
    let Ok(marker_time) = marker_meta.modified() else {
        return false;
    };
    for input in inputs {
        match std::fs::metadata(input).and_then(|m| m.modified()) {
            Ok(t) if t <= marker_time => {}
            _ => return false,
        }
    }
    true
}

fn touch(marker: &Path) -> Result<()> {
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent).map_err(|source| PropagationError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::File::create(marker).map_err(|source| PropagationError::Io {
        path: marker.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Result of a full propagation run: every node's final residual set size,
/// keyed by node id, ready to be folded into a post-propagation tree via
/// [`Tree::with_kmers_full`].
pub type Counts = FxHashMap<NodeId, u64>;

/// Run the propagation engine over `tree` (already reduced to its minimal
/// subtree by the caller) and return the per-node residual counts.
pub fn propagate(
    tree: &Tree,
    cfg: &PropagationConfig,
    masker: &dyn RepeatMasker,
) -> Result<Counts> {
    let pool = if cfg.workers > 0 {
        Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(cfg.workers)
                .build()
                .expect("valid thread pool configuration"),
        )
    } else {
        None
    };

    let run = || process_node(tree, tree.root(), cfg, masker);
    let (set, counts) = match pool {
        Some(p) => p.install(run)?,
        None => run()?,
    };
    let _ = set;
    Ok(counts)
}

/// Process `id`, returning the set this node passes up to its parent
/// (`S_i`/`I(v)` in spec §4.3's notation) together with the residual
/// counts of every node in its subtree (merged into the parent's map by
/// the caller — each sibling subtree accumulates its own map so the
/// recursion stays `rayon`-parallelizable without shared mutable state).
fn process_node(
    tree: &Tree,
    id: NodeId,
    cfg: &PropagationConfig,
    masker: &dyn RepeatMasker,
) -> Result<(KmerSet, Counts)> {
    let node = tree.node(id);
    let full_path = cfg.nonreduced_fasta(&node.name);
    let marker = cfg.marker(&full_path);

    if node.is_leaf() {
        let fastapath = node.fastapath.clone();
        let input_files: Vec<PathBuf> = fastapath
            .as_deref()
            .unwrap_or("")
            .split('@')
            .filter(|s| !s.is_empty())
            .map(|p| cfg.library_dir.join(p))
            .collect();

        if is_fresh(&marker, &input_files) {
            debug!(node = %node.name, "leaf marker fresh, reusing existing FASTA");
            let seq = std::fs::read(&full_path).map_err(|source| PropagationError::Io {
                path: full_path.clone(),
                source,
            })?;
            let set = kmer::canonical_set(&seq, cfg.k)?;
            let mut counts = Counts::default();
            counts.insert(id, set.len() as u64);
            return Ok((set, counts));
        }

        let Some(fastapath) = fastapath else {
            return Err(PropagationError::MissingLeafFasta {
                node: node.name.clone(),
                path: cfg.library_dir.clone(),
            });
        };
        let seq = load_leaf_sequence(&node.name, &fastapath, &cfg.library_dir, masker)?;
        let set = kmer::canonical_set(&seq, cfg.k)?;
        write_contigs(&full_path, &node.name, std::slice::from_ref(&seq))?;
        write_count(&cfg.count_file(&node.name), &node.name, set.len())?;
        touch(&marker)?;
        let mut counts = Counts::default();
        counts.insert(id, set.len() as u64);
        info!(node = %node.name, kmers = set.len(), "leaf processed");
        return Ok((set, counts));
    }

    let children: Vec<NodeId> = node.children().to_vec();
    let child_inputs: Vec<PathBuf> = children
        .iter()
        .map(|&c| cfg.nonreduced_fasta(&tree.node(c).name))
        .collect();

    // Sibling subtrees are independent (spec §5): fork onto the pool and
    // join before computing this node's intersection.
    let child_results: Vec<Result<(NodeId, KmerSet, Counts)>> = children
        .par_iter()
        .map(|&c| {
            let (set, counts) = process_node(tree, c, cfg, masker)?;
            Ok((c, set, counts))
        })
        .collect();

    let mut merged_counts = Counts::default();
    let mut per_child: Vec<(NodeId, KmerSet)> = Vec::with_capacity(children.len());
    for r in child_results {
        let (cid, set, counts) = r?;
        merged_counts.extend(counts);
        per_child.push((cid, set));
    }

    if is_fresh(&marker, &child_inputs) {
        debug!(node = %node.name, "internal marker fresh, reusing existing FASTA");
        let seq = std::fs::read(&full_path).map_err(|source| PropagationError::Io {
            path: full_path.clone(),
            source,
        })?;
        let set = kmer::canonical_set(&seq, cfg.k)?;
        merged_counts.insert(id, set.len() as u64);
        return Ok((set, merged_counts));
    }

    let mut iter = per_child.iter();
    let (_, first) = iter
        .next()
        .expect("minimal subtree: internal nodes have at least one child");
    let mut intersection = first.clone();
    for (_, set) in iter {
        intersection = kmer::intersect(&intersection, set);
    }

    if cfg.mode == PropagationMode::Deletative {
        for (cid, set) in &per_child {
            let residual = kmer::difference(set, &intersection);
            let child_name = tree.node(*cid).name.clone();
            write_contigs(
                &cfg.reduced_fasta(&child_name),
                &child_name,
                &contigs_for(cfg, &residual),
            )?;
            write_count(&cfg.count_file(&child_name), &child_name, residual.len())?;
            // The child's own processing recorded its pre-reduction set size
            // (I(v) for an internal child, |K(v)| for a leaf); R(v) is only
            // known here, at the parent, once it is subtracted against this
            // node's intersection. Overwrite rather than insert-if-absent.
            merged_counts.insert(*cid, residual.len() as u64);
        }
    }

    write_contigs(&full_path, &node.name, &contigs_for(cfg, &intersection))?;
    write_count(&cfg.count_file(&node.name), &node.name, intersection.len())?;
    touch(&marker)?;
    merged_counts.insert(id, intersection.len() as u64);
    info!(node = %node.name, kmers = intersection.len(), "internal node reduced");

    Ok((intersection, merged_counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::NoMasking;
    use std::fs;

    fn write_fasta(dir: &Path, name: &str, seq: &str) {
        fs::write(dir.join(name), format!(">r\n{seq}\n")).unwrap();
    }

    #[test]
    fn e1_intersection_at_internal_node() {
        // spec §8 E1: tree ((A,B)X,C)R; k=3.
        let tmp = tempfile::tempdir().unwrap();
        let lib = tmp.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        write_fasta(&lib, "a.fa", "ACGT");
        write_fasta(&lib, "b.fa", "ACGA");
        write_fasta(&lib, "c.fa", "TTTT");

        let nw = "((A,B)X,C)R;";
        let mut tree = Tree::parse(nw).unwrap();
        // Attach fastapath by re-parsing with NHX comments instead (simpler
        // to hand-build here via the public NHX round trip is overkill);
        // use Tree::parse with fastapath embedded directly.
        let nw_annotated = "((A[&&NHX:fastapath=a.fa],B[&&NHX:fastapath=b.fa])X,C[&&NHX:fastapath=c.fa])R;";
        tree = Tree::parse(nw_annotated).unwrap();
        let tree = tree.minimal_subtree();

        let cfg = PropagationConfig {
            k: 3,
            mode: PropagationMode::Deletative,
            reassemble: false,
            library_dir: lib,
            output_dir: tmp.path().join("propagation"),
            workers: 1,
        };
        let counts = propagate(&tree, &cfg, &NoMasking).unwrap();

        let by_name = |n: &str| tree.name_lookup(n).unwrap();
        assert_eq!(counts[&by_name("X")], 1); // R(X) = {ACG}
        assert_eq!(counts[&by_name("A")], 1); // R(A) = {CGT}
        assert_eq!(counts[&by_name("B")], 1); // R(B) = {CGA}
        assert_eq!(counts[&by_name("C")], 1); // R(C) = {TTT}
        assert_eq!(counts[&by_name("R")], 0); // R(R) = empty
    }

    #[test]
    fn missing_leaf_fasta_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let nw = "(A[&&NHX:fastapath=missing.fa],B[&&NHX:fastapath=missing2.fa])R;";
        let tree = Tree::parse(nw).unwrap().minimal_subtree();
        let cfg = PropagationConfig {
            k: 3,
            mode: PropagationMode::Deletative,
            reassemble: false,
            library_dir: tmp.path().to_path_buf(),
            output_dir: tmp.path().join("propagation"),
            workers: 1,
        };
        let err = propagate(&tree, &cfg, &NoMasking).unwrap_err();
        assert!(matches!(err, PropagationError::MissingLeafFasta { .. }));
    }
}
