//! Shared k-mer set model, arena-indexed tree model, and small I/O helpers
//! used across the ProPhyle workspace.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod error;
pub mod io;
pub mod kmer;
pub mod nhx;
pub mod tree;

pub use error::{CoreError, Result};
pub use kmer::{Kmer, KmerSet};
pub use tree::{Node, NodeId, Tree};
