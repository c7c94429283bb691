//! Consistency check at classify time (spec §6.1): the FM-index artifact
//! sizes must agree with each other within tolerance, or classification is
//! refused outright.

use crate::error::{IndexError, Result};
use crate::layout::IndexLayout;

/// Byte tolerance for the size relationships below, taken verbatim from
/// the original implementation's `prophyle_classify()` (`abs(... ) < 1000`)
/// rather than re-deriving spec §6.1's "±1 KiB" from scratch.
const TOLERANCE_BYTES: i64 = 1000;

fn file_len(path: &std::path::Path) -> Result<i64> {
    std::fs::metadata(path)
        .map(|m| m.len() as i64)
        .map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Verify `|bwt| ≈ 2·|sa| ≈ 2·|pac| ≈ 4·|klcp|` (± [`TOLERANCE_BYTES`]).
/// `klcp_k`: pass `None` when the k-LCP array was skipped at build time
/// (`-K`), in which case that leg of the check is omitted.
pub fn check_index_consistency(layout: &IndexLayout, klcp_k: Option<usize>) -> Result<()> {
    let bwt = file_len(&layout.fm_artifact("bwt"))?;
    let sa = file_len(&layout.fm_artifact("sa"))?;
    let pac = file_len(&layout.fm_artifact("pac"))?;

    if (bwt - 2 * sa).abs() >= TOLERANCE_BYTES {
        return Err(IndexError::Input(format!(
            "inconsistent index: |bwt|={bwt} not ~= 2*|sa|={sa2} (2*sa)",
            sa2 = 2 * sa
        )));
    }
    if (bwt - 2 * pac).abs() >= TOLERANCE_BYTES {
        return Err(IndexError::Input(format!(
            "inconsistent index: |bwt|={bwt} not ~= 2*|pac|={pac2} (2*pac)",
            pac2 = 2 * pac
        )));
    }
    if let Some(k) = klcp_k {
        let klcp = file_len(&layout.klcp(k))?;
        if (bwt - 4 * klcp).abs() >= TOLERANCE_BYTES {
            return Err(IndexError::Input(format!(
                "inconsistent index: |bwt|={bwt} not ~= 4*|klcp|={klcp4} (4*klcp)",
                klcp4 = 4 * klcp
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_size_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = IndexLayout::new(tmp.path());
        std::fs::write(layout.fm_artifact("bwt"), vec![0u8; 100]).unwrap();
        std::fs::write(layout.fm_artifact("sa"), vec![0u8; 50]).unwrap();
        std::fs::write(layout.fm_artifact("pac"), vec![0u8; 50]).unwrap();
        std::fs::write(layout.klcp(3), vec![0u8; 25]).unwrap();
        assert!(check_index_consistency(&layout, Some(3)).is_ok());

        std::fs::write(layout.fm_artifact("sa"), vec![0u8; 5000]).unwrap();
        assert!(check_index_consistency(&layout, Some(3)).is_err());
    }
}
