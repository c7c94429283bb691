//! Sequence emission for a node's residual k-mer set (spec §4.3's
//! "Sequence emission" paragraph).

use prophyle_core::kmer::{canonicalize_window, KmerSet};

/// Deletative mode's simplest legal output: one contig per k-mer.
#[must_use]
pub fn one_contig_per_kmer(set: &KmerSet) -> Vec<Vec<u8>> {
    let mut kmers: Vec<_> = set.iter().copied().collect();
    kmers.sort_unstable();
    kmers.into_iter().map(|km| km.to_bytes()).collect()
}

/// Greedy unitig assembler used in re-assembly mode.
///
/// Starting from the lexicographically smallest remaining canonical k-mer,
/// extend right by the unique one-base extension whose resulting k-mer is
/// still in the set, consuming (removing) each k-mer used; stop on
/// ambiguity (zero or more than one valid extension) or exhaustion, then
/// start a new contig from the new smallest remaining k-mer.
#[must_use]
pub fn assemble_unitigs(set: &KmerSet) -> Vec<Vec<u8>> {
    let mut remaining = set.clone();
    let mut contigs = Vec::new();
    const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

    loop {
        let Some(&start) = remaining.iter().min() else {
            break;
        };
        remaining.remove(&start);
        let mut contig = start.to_bytes();
        let k = contig.len();

        loop {
            let tail = &contig[contig.len() - (k - 1)..];
            let mut hit: Option<(u8, _)> = None;
            let mut ambiguous = false;
            for &base in &BASES {
                let mut window = tail.to_vec();
                window.push(base);
                if let Some(km) = canonicalize_window(&window) {
                    if remaining.contains(&km) {
                        if hit.is_some() {
                            ambiguous = true;
                            break;
                        }
                        hit = Some((base, km));
                    }
                }
            }
            if ambiguous {
                break;
            }
            match hit {
                Some((base, km)) => {
                    contig.push(base);
                    remaining.remove(&km);
                }
                None => break,
            }
        }
        contigs.push(contig);
    }
    contigs
}

#[cfg(test)]
mod tests {
    use super::*;
    use prophyle_core::kmer::canonical_set;

    #[test]
    fn one_per_kmer_covers_whole_set() {
        let set = canonical_set(b"ACGTACG", 3).unwrap();
        let contigs = one_contig_per_kmer(&set);
        assert_eq!(contigs.len(), set.len());
    }

    #[test]
    fn assembler_reassembles_a_simple_walk() {
        // A contiguous run of overlapping 3-mers from a single linear
        // sequence should reassemble into contig(s) covering every k-mer.
        let set = canonical_set(b"ACGTACGA", 3).unwrap();
        let contigs = assemble_unitigs(&set);
        let total_kmers: usize = contigs
            .iter()
            .map(|c| c.len().saturating_sub(2))
            .sum();
        assert_eq!(total_kmers, set.len());
    }
}
