//! Shared error kinds for the tree and k-mer models.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`crate::kmer`] and [`crate::tree`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// `k` is outside the supported range (`1..=64`, see [`crate::kmer::MAX_K`]).
    #[error("k={k} is out of the supported range 1..={max}")]
    InvalidK {
        /// The requested k-mer length.
        k: usize,
        /// Largest k supported by the packed representation.
        max: usize,
    },

    /// A Newick/NHX document could not be parsed.
    #[error("malformed tree at {path:?}: {reason}")]
    TreeParse {
        /// Source file, if known.
        path: Option<PathBuf>,
        /// Human-readable parse failure.
        reason: String,
    },

    /// A node name was referenced that does not exist in the tree.
    #[error("unknown node name: {0}")]
    UnknownNode(String),

    /// `lca` was called with an empty node set.
    #[error("lca() requires at least one node")]
    EmptyLcaQuery,

    /// I/O failure while reading or writing a tree/artifact file.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// File the operation was attempted against.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout `prophyle-core`.
pub type Result<T> = std::result::Result<T, CoreError>;
