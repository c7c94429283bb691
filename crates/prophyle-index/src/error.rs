//! Error kinds for the index-build orchestrator, matching spec §7's
//! *configuration*, *input*, and *external-tool* kinds.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or validating an index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Bad arguments or a missing external tool binary.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed input tree, missing FASTA, or inconsistent index files.
    #[error("input error: {0}")]
    Input(String),

    /// The external BWT/SA/k-LCP builder exited non-zero.
    #[error("external tool {tool} failed with status {status}: {stderr}")]
    ExternalTool {
        /// Name of the subprocess invoked.
        tool: String,
        /// Process exit status, formatted.
        status: String,
        /// Captured stderr, if any.
        stderr: String,
    },

    /// I/O failure reading or writing an index artifact.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        /// File the operation was attempted against.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Propagated from `prophyle-core`.
    #[error(transparent)]
    Core(#[from] prophyle_core::CoreError),

    /// Propagated from `prophyle-propagate`.
    #[error(transparent)]
    Propagation(#[from] prophyle_propagate::PropagationError),
}

/// Convenience alias used throughout `prophyle-index`.
pub type Result<T> = std::result::Result<T, IndexError>;
