//! Query block decoding, assignment scoring, and output emission
//! (components C5-C7).

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod assign;
pub mod block;
pub mod cigar;
pub mod emit;
pub mod error;
pub mod mask;

pub use assign::{classify_read, AssignmentRecord, Measure, Scores};
pub use block::{parse_line, Block, CandidateSet, ReadLine};
pub use cigar::cigar_from_mask;
pub use emit::{kraken_record, sam_headers, sam_record, EmitOptions, OutputFormat, FAKE_CONTIG_LENGTH};
pub use error::{QueryError, Result};
pub use mask::{apply_ancestor_inheritance, build_masks, lca_collapse_blocks, MaskMap, Masks};
