//! External collaborators (spec §6.3): the BWT/SA/k-LCP builder library.
//! Invoked as opaque subprocesses; their only contract with this crate is
//! "wrote the expected artifact and exited zero".

use std::path::Path;
use std::process::Command;

use crate::error::{IndexError, Result};

/// The external BWT/SA/k-LCP builder, invoked in stages 3-5 of
/// [`crate::stages::build`].
pub trait BwtToolchain: Send + Sync {
    /// `fa2pac`: pack `fasta` into a 2-bit `.pac` file.
    fn fa2pac(&self, fasta: &Path, pac_out: &Path) -> Result<()>;
    /// `pac2bwt` + occurrence table: build `.bwt`, `.ann`, `.amb` from `.pac`.
    fn pac2bwt(&self, pac: &Path, bwt_out: &Path) -> Result<()>;
    /// Build the sampled suffix array from the BWT.
    fn bwt2sa(&self, bwt: &Path, sa_out: &Path) -> Result<()>;
    /// Build the k-LCP array from the BWT.
    fn bwt2klcp(&self, bwt: &Path, k: usize, klcp_out: &Path) -> Result<()>;
}

/// Shells out to a single multi-command binary (`binary fa2pac ...`,
/// `binary pac2bwt ...`, etc.) — the usual packaging of a BWA-like FM-index
/// builder.
#[derive(Debug, Clone)]
pub struct SubprocessToolchain {
    /// Executable name or path.
    pub binary: String,
}

impl SubprocessToolchain {
    /// Use `binary` (e.g. `"prophyle_index_builder"`) found on `PATH`.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, subcmd: &str, args: &[&Path]) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(subcmd);
        for a in args {
            cmd.arg(a);
        }
        let out = cmd.output().map_err(|e| {
            IndexError::Configuration(format!("could not spawn {} {subcmd}: {e}", self.binary))
        })?;
        if !out.status.success() {
            return Err(IndexError::ExternalTool {
                tool: format!("{} {subcmd}", self.binary),
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

impl BwtToolchain for SubprocessToolchain {
    fn fa2pac(&self, fasta: &Path, pac_out: &Path) -> Result<()> {
        self.run("fa2pac", &[fasta, pac_out])
    }

    fn pac2bwt(&self, pac: &Path, bwt_out: &Path) -> Result<()> {
        self.run("pac2bwt", &[pac, bwt_out])
    }

    fn bwt2sa(&self, bwt: &Path, sa_out: &Path) -> Result<()> {
        self.run("bwt2sa", &[bwt, sa_out])
    }

    fn bwt2klcp(&self, bwt: &Path, k: usize, klcp_out: &Path) -> Result<()> {
        let k_str = k.to_string();
        let k_path = Path::new(&k_str);
        self.run("bwt2klcp", &[bwt, k_path, klcp_out])
    }
}
