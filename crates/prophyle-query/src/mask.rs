//! Hit/coverage bitmask construction and top-down ancestor inheritance
//! (spec §4.6, first two paragraphs).

use bitvec::prelude::*;
use prophyle_core::{NodeId, Tree};
use rustc_hash::FxHashMap;

use crate::block::{Block, CandidateSet, ReadLine};

/// Per-node hit and coverage masks for one read.
#[derive(Debug, Clone)]
pub struct Masks {
    /// Bit i = 1 iff k-mer position i is owned by this node.
    pub hitmask: BitVec<u8, Lsb0>,
    /// Union of `[i, i+k)` over hit positions i.
    pub covmask: BitVec<u8, Lsb0>,
}

impl Masks {
    fn zero(n: usize, l: usize) -> Self {
        Self {
            hitmask: bitvec![u8, Lsb0; 0; n],
            covmask: bitvec![u8, Lsb0; 0; l],
        }
    }
}

/// Per-candidate masks for one read, keyed by tree node.
pub type MaskMap = FxHashMap<NodeId, Masks>;

fn set_range(bits: &mut BitVec<u8, Lsb0>, start: usize, end: usize) {
    let end = end.min(bits.len());
    if start >= end {
        return;
    }
    bits[start..end].fill(true);
}

/// Replace each block's candidate set by its LCA, collapsing ambiguous
/// blocks into a single node (`simulate_lca` mode, spec §4.6).
pub fn lca_collapse_blocks(tree: &Tree, blocks: &[Block]) -> Vec<Block> {
    blocks
        .iter()
        .map(|b| {
            let ids: Vec<NodeId> = b
                .candidates
                .names()
                .iter()
                .filter_map(|n| tree.name_lookup(n))
                .collect();
            if ids.is_empty() {
                return b.clone();
            }
            match tree.lca(&ids) {
                Ok(lca) => Block {
                    candidates: CandidateSet::Nodes(vec![tree.node(lca).name.clone()]),
                    count: b.count,
                },
                Err(_) => b.clone(),
            }
        })
        .collect()
}

/// Build initial hit/coverage masks from a read's decoded blocks, then
/// apply top-down ancestor inheritance. Candidate names absent from `tree`
/// are warned about and dropped from their block's candidate set rather
/// than aborting the read.
pub fn build_masks(tree: &Tree, read: &ReadLine, k: usize) -> MaskMap {
    let n = if read.qlen >= k { read.qlen - k + 1 } else { 0 };
    let l = read.qlen;
    let mut masks: MaskMap = FxHashMap::default();

    let mut pos = 0usize;
    for block in &read.blocks {
        let end_pos = pos + block.count;
        for name in block.candidates.names() {
            let Some(id) = tree.name_lookup(name) else {
                tracing::warn!(node = %name, read = %read.qname, "unknown candidate node; skipping");
                continue;
            };
            let m = masks.entry(id).or_insert_with(|| Masks::zero(n, l));
            set_range(&mut m.hitmask, pos, end_pos);
            set_range(&mut m.covmask, pos, end_pos + k - 1);
        }
        pos = end_pos;
    }

    apply_ancestor_inheritance(tree, &mut masks);
    masks
}

/// For every candidate `v`, OR in the masks of every strict ancestor of
/// `v` that is itself a candidate (spec §4.6 "Top-down inheritance").
/// Ancestor-of-ancestor is still an ancestor, so ORing each candidate's
/// full ancestor chain directly (against the pre-inheritance snapshot)
/// is equivalent to any topological propagation order.
pub fn apply_ancestor_inheritance(tree: &Tree, masks: &mut MaskMap) {
    let snapshot: FxHashMap<NodeId, (BitVec<u8, Lsb0>, BitVec<u8, Lsb0>)> = masks
        .iter()
        .map(|(&id, m)| (id, (m.hitmask.clone(), m.covmask.clone())))
        .collect();

    for (&v, m) in masks.iter_mut() {
        for a in tree.ancestors(v) {
            if let Some((a_hit, a_cov)) = snapshot.get(&a) {
                *m.hitmask.as_mut_bitslice() |= a_hit.as_bitslice();
                *m.covmask.as_mut_bitslice() |= a_cov.as_bitslice();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::parse_line;

    fn tree() -> Tree {
        Tree::parse("((A,B)X,C)R;").unwrap()
    }

    #[test]
    fn e2_single_candidate_masks() {
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tX:1 A:1 0:3", 3).unwrap();
        let masks = build_masks(&t, &read, 3);
        let x = t.name_lookup("X").unwrap();
        let a = t.name_lookup("A").unwrap();
        assert_eq!(masks[&x].hitmask.count_ones(), 1);
        // A inherits nothing (X is not an ancestor of A); A's own hit stands.
        assert_eq!(masks[&a].hitmask.count_ones(), 1);
    }

    #[test]
    fn e4_ancestor_inheritance() {
        // spec §8 E4: blocks X:2 A:1 0:2 -> h1(A)=3, h1(X)=2.
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tX:2 A:1 0:2", 3).unwrap();
        let masks = build_masks(&t, &read, 3);
        let x = t.name_lookup("X").unwrap();
        let a = t.name_lookup("A").unwrap();
        assert_eq!(masks[&x].hitmask.count_ones(), 2);
        assert_eq!(masks[&a].hitmask.count_ones(), 3);
    }

    #[test]
    fn unknown_candidate_is_skipped_not_fatal() {
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tZ:1 0:4", 3).unwrap();
        let masks = build_masks(&t, &read, 3);
        assert!(masks.is_empty());
    }

    fn hitmask_runs(bits: &BitSlice<u8, Lsb0>) -> usize {
        let mut runs = 0;
        let mut prev = false;
        for b in bits.iter().map(|b| *b) {
            if b && !prev {
                runs += 1;
            }
            prev = b;
        }
        runs
    }

    #[test]
    fn covmask_dilation_respects_popcount_bound() {
        // spec §8 invariant 4: popcount(covmask) <= popcount(hitmask) + (k-1)*runs(hitmask),
        // since covmask is the union of length-k windows anchored at each hit run.
        let t = tree();
        let k = 3;
        // Two separate hit runs on X, separated by a miss, inside a longer read.
        let read = parse_line("C\tread1\tdummy\t10\tX:2 0:1 X:1 0:4", k).unwrap();
        let masks = build_masks(&t, &read, k);
        let x = t.name_lookup("X").unwrap();
        let m = &masks[&x];
        let runs = hitmask_runs(&m.hitmask);
        assert!(runs >= 1);
        let bound = m.hitmask.count_ones() + (k - 1) * runs;
        assert!(
            m.covmask.count_ones() <= bound,
            "covmask popcount {} exceeds bound {}",
            m.covmask.count_ones(),
            bound
        );
        // And it must be strictly larger than the hitmask whenever there is any hit,
        // since each run dilates by k-1 extra covered positions.
        assert!(m.covmask.count_ones() >= m.hitmask.count_ones());
    }
}
