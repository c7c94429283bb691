//! Optional repeat-masking filter applied to leaf sequences before k-mer
//! extraction (spec §4.3: "replace non-ACGT with N"). The actual masking
//! decision (which bases are low-complexity repeats) is delegated to an
//! external tool, same as the BWT/SA builder in `prophyle-index` — this
//! crate only defines the seam.

use std::io::Write as _;
use std::process::{Command, Stdio};

use crate::error::{PropagationError, Result};

/// A pluggable repeat masker. The default production implementation shells
/// out to `dustmasker`, matching the original Makefile's
/// `$(PRG_DUST) -infmt fasta -outfmt fasta | sed '/^>/! s/[^AGCT]/N/g'`
/// pipeline.
pub trait RepeatMasker: Send + Sync {
    /// Replace masked/non-ACGT bases in `seq` with `N`.
    fn mask(&self, seq: &[u8]) -> Result<Vec<u8>>;
}

/// No-op masker used when `-M`/`mask_repeats` is not requested.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMasking;

impl RepeatMasker for NoMasking {
    fn mask(&self, seq: &[u8]) -> Result<Vec<u8>> {
        Ok(seq.to_vec())
    }
}

/// Shells out to `dustmasker` (or a compatible tool named by `binary`) and
/// folds any non-ACGT output byte to `N`.
#[derive(Debug, Clone)]
pub struct DustmaskerTool {
    /// Executable name or path, e.g. `"dustmasker"`.
    pub binary: String,
}

impl Default for DustmaskerTool {
    fn default() -> Self {
        Self {
            binary: "dustmasker".to_string(),
        }
    }
}

impl RepeatMasker for DustmaskerTool {
    fn mask(&self, seq: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.binary)
            .args(["-infmt", "fasta", "-outfmt", "fasta"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PropagationError::MaskingTool(format!("spawn {}: {e}", self.binary)))?;

        // Write on a separate thread: dustmasker may start emitting output
        // before it has consumed all of a large input, and both ends of a
        // pipe have a bounded OS buffer, so writing the whole sequence
        // synchronously here while nothing drains stdout can deadlock.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PropagationError::MaskingTool("no stdin handle".into()))?;
        let seq_owned = seq.to_vec();
        let writer = std::thread::spawn(move || {
            stdin
                .write_all(b">seq\n")
                .and_then(|()| stdin.write_all(&seq_owned))
        });

        let out = child
            .wait_with_output()
            .map_err(|e| PropagationError::MaskingTool(e.to_string()))?;
        writer
            .join()
            .map_err(|_| PropagationError::MaskingTool("stdin writer thread panicked".into()))?
            .map_err(|e| PropagationError::MaskingTool(e.to_string()))?;
        if !out.status.success() {
            return Err(PropagationError::MaskingTool(format!(
                "{} exited with {}",
                self.binary, out.status
            )));
        }

        let mut masked = Vec::with_capacity(seq.len());
        for line in out.stdout.split(|&b| b == b'\n') {
            if line.starts_with(b">") || line.is_empty() {
                continue;
            }
            masked.extend(line.iter().map(|&b| fold_non_acgt(b)));
        }
        Ok(masked)
    }
}

fn fold_non_acgt(b: u8) -> u8 {
    match b.to_ascii_uppercase() {
        b'A' | b'C' | b'G' | b'T' => b.to_ascii_uppercase(),
        _ => b'N',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_masking_is_identity() {
        let m = NoMasking;
        assert_eq!(m.mask(b"ACGTN").unwrap(), b"ACGTN");
    }
}
