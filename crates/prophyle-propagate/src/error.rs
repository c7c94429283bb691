//! Error kinds for the propagation engine (spec §7's *propagation-internal*
//! kind, plus the fatal "missing leaf FASTA" case).

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while running the propagation engine.
#[derive(Debug, Error)]
pub enum PropagationError {
    /// A leaf's `fastapath` named a file that does not exist. Fatal: aborts
    /// the entire build per spec §4.3's failure semantics.
    #[error("missing leaf FASTA for node {node:?}: {path:?}")]
    MissingLeafFasta {
        /// Offending leaf's name.
        node: String,
        /// File that could not be opened.
        path: PathBuf,
    },

    /// I/O failure reading or writing a propagation artifact.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// File the operation was attempted against.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external repeat-masking tool exited non-zero or could not be
    /// spawned.
    #[error("repeat-masking tool failed: {0}")]
    MaskingTool(String),

    /// Propagated from `prophyle-core` (bad k, tree errors surfaced mid-run).
    #[error(transparent)]
    Core(#[from] prophyle_core::CoreError),
}

/// Convenience alias used throughout `prophyle-propagate`.
pub type Result<T> = std::result::Result<T, PropagationError>;
