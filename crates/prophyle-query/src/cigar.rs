//! CIGAR-style run-length encoding of a hit/coverage bit mask (spec §4.7):
//! alternating `=`/`X` runs, `1` meaning match/hit and `0` mismatch/miss.

use bitvec::prelude::*;

/// Encode `mask` as a CIGAR-style string, e.g. `3=2X1=`.
#[must_use]
pub fn cigar_from_mask(mask: &BitSlice<u8, Lsb0>) -> String {
    let mut out = String::new();
    let mut bits = mask.iter().by_vals();
    let Some(mut run_val) = bits.next() else {
        return out;
    };
    let mut run_len: u64 = 1;
    for b in bits {
        if b == run_val {
            run_len += 1;
        } else {
            out.push_str(&run_len.to_string());
            out.push(if run_val { '=' } else { 'X' });
            run_val = b;
            run_len = 1;
        }
    }
    out.push_str(&run_len.to_string());
    out.push(if run_val { '=' } else { 'X' });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_runs() {
        let bits: BitVec<u8, Lsb0> = bitvec![u8, Lsb0; 1, 1, 1, 0, 0, 1];
        assert_eq!(cigar_from_mask(&bits), "3=2X1=");
    }

    #[test]
    fn empty_mask_is_empty_string() {
        let bits: BitVec<u8, Lsb0> = BitVec::new();
        assert_eq!(cigar_from_mask(&bits), "");
    }
}
