//! On-disk index directory layout (spec §6.1), named after the original
//! implementation's file names verbatim so existing collaborator tools
//! (the external BWT/SA builder, the index-query tool) keep working
//! against the same paths.

use std::path::PathBuf;

/// Path accessors for one index directory.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    /// Root of the index directory.
    pub index_dir: PathBuf,
}

impl IndexLayout {
    /// Wrap an index directory.
    #[must_use]
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
        }
    }

    /// Input tree before propagation.
    #[must_use]
    pub fn tree_preliminary_nw(&self) -> PathBuf {
        self.index_dir.join("tree.preliminary.nw")
    }

    /// Post-propagation tree, annotated with `kmers_full`.
    #[must_use]
    pub fn tree_nw(&self) -> PathBuf {
        self.index_dir.join("tree.nw")
    }

    /// Directory holding per-node propagation artifacts.
    #[must_use]
    pub fn propagation_dir(&self) -> PathBuf {
        self.index_dir.join("propagation")
    }

    /// Concatenated per-node FASTA, in post-order of `T'`.
    #[must_use]
    pub fn index_fa(&self) -> PathBuf {
        self.index_dir.join("index.fa")
    }

    /// Merged per-node k-mer counts.
    #[must_use]
    pub fn kmers_tsv(&self) -> PathBuf {
        self.index_dir.join("index.fa.kmers.tsv")
    }

    /// FM-index artifact with the given extension (`pac`, `bwt`, `ann`,
    /// `amb`, `sa`).
    #[must_use]
    pub fn fm_artifact(&self, ext: &str) -> PathBuf {
        self.index_dir.join(format!("index.fa.{ext}"))
    }

    /// k-LCP array, named `index.fa.<k>.klcp`.
    #[must_use]
    pub fn klcp(&self, k: usize) -> PathBuf {
        self.index_dir.join(format!("index.fa.{k}.klcp"))
    }

    /// Stage completion marker `n` (1-indexed, per spec §4.4/§6.1).
    #[must_use]
    pub fn stage_marker(&self, n: u32) -> PathBuf {
        self.index_dir.join(format!(".complete.{n}"))
    }
}
