//! Index-build orchestrator (component C4): five stages, each guarded by a
//! completion marker and a freshness check, driving propagation then the
//! external BWT/SA/k-LCP builder.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod consistency;
pub mod error;
pub mod external;
pub mod hashing;
pub mod layout;
pub mod stages;

pub use consistency::check_index_consistency;
pub use error::{IndexError, Result};
pub use external::{BwtToolchain, SubprocessToolchain};
pub use layout::IndexLayout;
pub use stages::{build, IndexBuildConfig};
