//! The five-stage index-build pipeline (spec §4.4), each stage guarded by
//! a completion marker and a freshness check against the previous stage.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use prophyle_core::tree::Tree;
use prophyle_propagate::masking::RepeatMasker;
use prophyle_propagate::{propagate, PropagationConfig, PropagationMode};
use tracing::info;

use crate::error::{IndexError, Result};
use crate::external::BwtToolchain;
use crate::hashing::log_file_hash;
use crate::layout::IndexLayout;

/// Resolved settings for one `index` run.
#[derive(Debug, Clone)]
pub struct IndexBuildConfig {
    /// One or more input Newick/NHX tree files to merge and normalize.
    pub newick_inputs: Vec<PathBuf>,
    /// Directory with the leaf FASTA library.
    pub library_dir: PathBuf,
    /// Destination index directory.
    pub index_dir: PathBuf,
    /// K-mer length.
    pub k: usize,
    /// Worker count for the propagation fork-join pool (`0` = default).
    pub workers: usize,
    /// `-M`: mask repeats in leaves before propagation.
    pub mask_repeats: bool,
    /// `-K`: skip building the k-LCP array (stage 5).
    pub skip_klcp: bool,
    /// `force`: re-run from stage 1 regardless of marker freshness.
    pub force: bool,
    /// Re-assemble residual sets into greedy unitigs rather than one
    /// contig per k-mer.
    pub reassemble: bool,
}

fn mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

/// `true` iff marker `n` exists and (when `n > 1`) is newer than marker
/// `n-1` — spec §4.4's freshness rule.
fn stage_fresh(layout: &IndexLayout, n: u32) -> bool {
    let Some(cur) = mtime(&layout.stage_marker(n)) else {
        return false;
    };
    if n == 1 {
        return true;
    }
    match mtime(&layout.stage_marker(n - 1)) {
        Some(prev) => cur >= prev,
        None => false,
    }
}

fn touch_marker(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| IndexError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::File::create(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Clear markers `from..=5` so a failed stage never leaves a stale marker
/// for itself or any later stage (spec §4.4).
fn clear_markers_from(layout: &IndexLayout, from: u32) {
    for n in from..=5 {
        let _ = std::fs::remove_file(layout.stage_marker(n));
    }
}

fn load_and_normalize_tree(cfg: &IndexBuildConfig) -> Result<Tree> {
    if cfg.newick_inputs.is_empty() {
        return Err(IndexError::Configuration(
            "at least one newick input tree is required".into(),
        ));
    }
    let mut trees: Vec<Tree> = Vec::new();
    for path in &cfg.newick_inputs {
        trees.push(Tree::load(path)?);
    }
    // Single input: use as-is. Multiple inputs: the merge policy is not
    // fully specified by upstream behavior (see SPEC_FULL.md's Open
    // Questions carry-over) beyond "produce one normalized tree" — a
    // synthetic root joining each input's root is the simplest faithful
    // reading, and `minimal_subtree` then contracts it away if it ends up
    // unary.
    let merged = if trees.len() == 1 {
        trees.into_iter().next().expect("len == 1")
    } else {
        let newicks: Vec<String> = trees.iter().map(Tree::to_nhx).collect();
        let joined = format!(
            "({})merged_root;",
            newicks
                .iter()
                .map(|s| s.trim_end_matches(';'))
                .collect::<Vec<_>>()
                .join(",")
        );
        Tree::parse(&joined)?
    };
    Ok(merged.minimal_subtree())
}

/// Run the five-stage pipeline, invoking `toolchain` for stages 3-5.
pub fn build(
    cfg: &IndexBuildConfig,
    masker: &dyn RepeatMasker,
    toolchain: &dyn BwtToolchain,
) -> Result<()> {
    let layout = IndexLayout::new(&cfg.index_dir);
    std::fs::create_dir_all(&cfg.index_dir).map_err(|source| IndexError::Io {
        path: cfg.index_dir.clone(),
        source,
    })?;

    if cfg.force {
        clear_markers_from(&layout, 1);
    }

    // Stage 1: merge/validate input trees into one normalized tree.
    if !stage_fresh(&layout, 1) {
        clear_markers_from(&layout, 1);
        let tree = load_and_normalize_tree(cfg)?;
        std::fs::write(layout.tree_preliminary_nw(), tree.to_nhx()).map_err(|source| {
            IndexError::Io {
                path: layout.tree_preliminary_nw(),
                source,
            }
        })?;
        touch_marker(&layout.stage_marker(1))?;
        info!("stage 1 complete: normalized tree written");
    }

    // Stage 2: drive C3, concatenate artifacts, write the post-propagation tree.
    if !stage_fresh(&layout, 2) {
        clear_markers_from(&layout, 2);
        let tree = Tree::load(layout.tree_preliminary_nw())?;
        let prop_cfg = PropagationConfig {
            k: cfg.k,
            mode: PropagationMode::Deletative,
            reassemble: cfg.reassemble,
            library_dir: cfg.library_dir.clone(),
            output_dir: layout.propagation_dir(),
            workers: cfg.workers,
        };
        let counts = propagate(&tree, &prop_cfg, masker)?;

        concatenate_index_fa(&tree, &layout)?;
        concatenate_kmer_stats(&tree, &counts, &layout)?;

        let final_tree = tree.with_kmers_full(&counts);
        std::fs::write(layout.tree_nw(), final_tree.to_nhx()).map_err(|source| IndexError::Io {
            path: layout.tree_nw(),
            source,
        })?;
        let _ = log_file_hash(&layout.index_fa());
        touch_marker(&layout.stage_marker(2))?;
        info!("stage 2 complete: propagation done, index.fa written");
    }

    // Stage 3: external BWT builder over index.fa.
    if !stage_fresh(&layout, 3) {
        clear_markers_from(&layout, 3);
        toolchain.fa2pac(&layout.index_fa(), &layout.fm_artifact("pac"))?;
        toolchain.pac2bwt(&layout.fm_artifact("pac"), &layout.fm_artifact("bwt"))?;
        let _ = log_file_hash(&layout.fm_artifact("bwt"));
        touch_marker(&layout.stage_marker(3))?;
        info!("stage 3 complete: BWT built");
    }

    // Stage 4: sampled suffix array.
    if !stage_fresh(&layout, 4) {
        clear_markers_from(&layout, 4);
        toolchain.bwt2sa(&layout.fm_artifact("bwt"), &layout.fm_artifact("sa"))?;
        touch_marker(&layout.stage_marker(4))?;
        info!("stage 4 complete: suffix array built");
    }

    // Stage 5: k-LCP array (skippable via `-K`).
    if cfg.skip_klcp {
        info!("stage 5 skipped (-K)");
    } else if !stage_fresh(&layout, 5) {
        clear_markers_from(&layout, 5);
        toolchain.bwt2klcp(&layout.fm_artifact("bwt"), cfg.k, &layout.klcp(cfg.k))?;
        touch_marker(&layout.stage_marker(5))?;
        info!("stage 5 complete: k-LCP built");
    }

    Ok(())
}

/// Concatenate the residual-partitioned sequence of every node into
/// `index.fa` (spec §4.3 invariant 1: every k-mer belongs to exactly one
/// `R(v)`). The root has no parent to reduce it, so its residual *is* its
/// full/intersection set (`<root>.full.fa`); every other node's residual
/// was written to `<name>.reduced.fa` by its parent's propagation step.
fn concatenate_index_fa(tree: &Tree, layout: &IndexLayout) -> Result<()> {
    let f = std::fs::File::create(layout.index_fa()).map_err(|source| IndexError::Io {
        path: layout.index_fa(),
        source,
    })?;
    let mut w = std::io::BufWriter::new(f);
    let root = tree.root();
    for id in tree.post_order() {
        let name = &tree.node(id).name;
        let residual_fa = if id == root {
            layout.propagation_dir().join(format!("{name}.full.fa"))
        } else {
            layout.propagation_dir().join(format!("{name}.reduced.fa"))
        };
        if residual_fa.exists() {
            let contents = std::fs::read(&residual_fa).map_err(|source| IndexError::Io {
                path: residual_fa.clone(),
                source,
            })?;
            w.write_all(&contents)
                .map_err(|source| IndexError::Io {
                    path: layout.index_fa(),
                    source,
                })?;
        }
    }
    Ok(())
}

fn concatenate_kmer_stats(
    tree: &Tree,
    counts: &prophyle_propagate::Counts,
    layout: &IndexLayout,
) -> Result<()> {
    let f = std::fs::File::create(layout.kmers_tsv()).map_err(|source| IndexError::Io {
        path: layout.kmers_tsv(),
        source,
    })?;
    let mut w = std::io::BufWriter::new(f);
    for id in tree.post_order() {
        let name = &tree.node(id).name;
        let count = counts.get(&id).copied().unwrap_or(0);
        writeln!(w, "{name}\t{count}").map_err(|source| IndexError::Io {
            path: layout.kmers_tsv(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use prophyle_propagate::masking::NoMasking;
    use std::path::Path;

    struct NoopToolchain;
    impl BwtToolchain for NoopToolchain {
        fn fa2pac(&self, _fasta: &Path, out: &Path) -> Result<()> {
            std::fs::write(out, b"pac").map_err(|source| IndexError::Io {
                path: out.to_path_buf(),
                source,
            })
        }
        fn pac2bwt(&self, _pac: &Path, out: &Path) -> Result<()> {
            std::fs::write(out, b"bwt").map_err(|source| IndexError::Io {
                path: out.to_path_buf(),
                source,
            })
        }
        fn bwt2sa(&self, _bwt: &Path, out: &Path) -> Result<()> {
            std::fs::write(out, b"sa").map_err(|source| IndexError::Io {
                path: out.to_path_buf(),
                source,
            })
        }
        fn bwt2klcp(&self, _bwt: &Path, _k: usize, out: &Path) -> Result<()> {
            std::fs::write(out, b"klcp").map_err(|source| IndexError::Io {
                path: out.to_path_buf(),
                source,
            })
        }
    }

    #[test]
    fn full_pipeline_runs_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let lib = tmp.path().join("lib");
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(lib.join("a.fa"), ">r\nACGT\n").unwrap();
        std::fs::write(lib.join("b.fa"), ">r\nACGA\n").unwrap();

        let nw = tmp.path().join("in.nw");
        std::fs::write(&nw, "(A[&&NHX:fastapath=a.fa],B[&&NHX:fastapath=b.fa])R;").unwrap();

        let cfg = IndexBuildConfig {
            newick_inputs: vec![nw],
            library_dir: lib,
            index_dir: tmp.path().join("index"),
            k: 3,
            workers: 1,
            mask_repeats: false,
            skip_klcp: false,
            force: false,
            reassemble: false,
        };
        build(&cfg, &NoMasking, &NoopToolchain).unwrap();

        let layout = IndexLayout::new(&cfg.index_dir);
        assert!(layout.tree_nw().exists());
        assert!(layout.index_fa().exists());
        assert!(layout.fm_artifact("sa").exists());
        assert!(layout.klcp(3).exists());

        // Idempotence (invariant 6): re-running with no inputs changed and
        // no force should be a no-op (all markers stay fresh).
        let before = std::fs::metadata(layout.stage_marker(2))
            .unwrap()
            .modified()
            .unwrap();
        build(&cfg, &NoMasking, &NoopToolchain).unwrap();
        let after = std::fs::metadata(layout.stage_marker(2))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(before, after);
    }
}
