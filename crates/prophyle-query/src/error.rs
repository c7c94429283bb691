//! Error kinds for block decoding and assignment (spec §7's
//! *classification-internal* kind).

use thiserror::Error;

/// Per-read classification errors. These never abort the stream (spec §5,
/// §7): the caller logs a warning and emits an unassigned record.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A block line did not match `<status>\t<qname>\t<refs>\t<qlen>\t<blocks>...`.
    #[error("malformed block line: {0}")]
    MalformedLine(String),

    /// A `blocks` token was not `name1,name2,...:count`.
    #[error("malformed block token {token:?}: {reason}")]
    MalformedToken {
        /// The offending token.
        token: String,
        /// Why it failed to parse.
        reason: String,
    },

    /// `Σ count != qlen - k + 1` (or `!= 0` when `qlen < k`).
    #[error("block counts sum to {got}, expected {expected} for qlen={qlen} k={k}")]
    CountMismatch {
        /// Observed sum of block counts.
        got: usize,
        /// Expected sum per spec §4.5's validation invariant.
        expected: usize,
        /// Read length.
        qlen: usize,
        /// K-mer length.
        k: usize,
    },
}

/// Convenience alias used throughout `prophyle-query`.
pub type Result<T> = std::result::Result<T, QueryError>;
