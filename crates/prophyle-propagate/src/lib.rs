//! Post-order k-mer propagation engine (component C3): reduces per-leaf
//! canonical k-mer sets through a tree, computing each internal node's
//! residual set and rewriting each child's FASTA to contain only its own
//! residual.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod assemble;
pub mod engine;
pub mod error;
pub mod fasta;
pub mod masking;

pub use engine::{propagate, Counts, PropagationConfig, PropagationMode};
pub use error::{PropagationError, Result};
