//! Assignment engine (component C6): scores candidate nodes under one of
//! four measures, selects winners, and optionally breaks ties via LCA
//! (spec §4.6).

use bitvec::prelude::*;
use prophyle_core::{NodeId, Tree};

use crate::block::{Block, ReadLine};
use crate::mask::{build_masks, lca_collapse_blocks, MaskMap, Masks};

/// Scoring measure in {h1, h2, c1, c2} (spec §3/§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// Raw hit count.
    H1,
    /// Hit count normalized by the node's full k-mer set size.
    H2,
    /// Raw covered-base count.
    C1,
    /// Covered-base count normalized by the node's full k-mer set size.
    C2,
}

impl Measure {
    fn is_h_family(self) -> bool {
        matches!(self, Measure::H1 | Measure::H2)
    }
}

/// Derived scalars for one candidate node on one read (spec §3
/// "Assignment record"). Fields outside the active measure's family are
/// `Some` whenever they were computable, `None` once a tie-break LCA
/// node has blanked the opposite family (spec §4.6 field-presence
/// contract).
#[derive(Debug, Clone, Default)]
pub struct Scores {
    /// popcount(hitmask).
    pub h1: Option<u64>,
    /// h1 / n.
    pub hf: Option<f64>,
    /// h1 / `kmers_full(v)`.
    pub h2: Option<f64>,
    /// popcount(covmask).
    pub c1: Option<u64>,
    /// c1 / L.
    pub cf: Option<f64>,
    /// c1 / `kmers_full(v)`.
    pub c2: Option<f64>,
}

fn raw_scores(m: &Masks, n: usize, l: usize, kmers_full: Option<u64>) -> Scores {
    let h1 = m.hitmask.count_ones() as u64;
    let c1 = m.covmask.count_ones() as u64;
    let kf = kmers_full.unwrap_or(0).max(1) as f64;
    Scores {
        h1: Some(h1),
        hf: Some(if n == 0 { 0.0 } else { h1 as f64 / n as f64 }),
        h2: Some(h1 as f64 / kf),
        c1: Some(c1),
        cf: Some(if l == 0 { 0.0 } else { c1 as f64 / l as f64 }),
        c2: Some(c1 as f64 / kf),
    }
}

fn measure_value(s: &Scores, measure: Measure) -> f64 {
    match measure {
        Measure::H1 => s.h1.unwrap_or(0) as f64,
        Measure::H2 => s.h2.unwrap_or(0.0),
        Measure::C1 => s.c1.unwrap_or(0) as f64,
        Measure::C2 => s.c2.unwrap_or(0.0),
    }
}

/// Final per-read classification record (component C7 consumes this).
#[derive(Debug, Clone)]
pub struct AssignmentRecord {
    /// Read name, carried through from the decoded block line.
    pub qname: String,
    /// Read length.
    pub ln: usize,
    /// Winning node, or `None` if no candidate scored above zero.
    pub winner: Option<NodeId>,
    /// Scores for the winner (or for the synthetic tie-break LCA node).
    pub scores: Scores,
    /// 1-based rank of the reported winner among tied winners (always 1
    /// once `tie_lca` has collapsed the set, or when `is == 1`).
    pub ii: usize,
    /// Number of nodes tied for the maximum measure value.
    pub is: usize,
    /// Covmask of the reported winner, for CIGAR emission; `None` once a
    /// tie-break LCA node has blanked it.
    pub covmask_for_cigar: Option<BitVec<u8, Lsb0>>,
    /// Hitmask of the reported winner, for the `hc` custom tag; `None`
    /// once a tie-break LCA node has blanked it.
    pub hitmask_for_cigar: Option<BitVec<u8, Lsb0>>,
    /// The read's block stream as scored (after `simulate_lca` collapsing,
    /// if active), for Kraken-like per-block re-rendering (spec §4.7).
    pub blocks: Vec<Block>,
}

fn unassigned(read: &ReadLine) -> AssignmentRecord {
    AssignmentRecord {
        qname: read.qname.clone(),
        ln: read.qlen,
        winner: None,
        scores: Scores::default(),
        ii: 0,
        is: 0,
        covmask_for_cigar: None,
        hitmask_for_cigar: None,
        blocks: read.blocks.clone(),
    }
}

/// Classify one decoded read against `tree` under `measure`, optionally
/// collapsing blocks via LCA first (`simulate_lca`) and breaking ties via
/// LCA (`tie_lca`). Emits one record per surviving winner (spec §4.6
/// "Emission"), or a single unassigned record if W is empty.
#[must_use]
pub fn classify_read(
    tree: &Tree,
    read: &ReadLine,
    k: usize,
    measure: Measure,
    simulate_lca: bool,
    tie_lca: bool,
) -> Vec<AssignmentRecord> {
    let n = if read.qlen >= k { read.qlen - k + 1 } else { 0 };

    let blocks = if simulate_lca {
        lca_collapse_blocks(tree, &read.blocks)
    } else {
        read.blocks.clone()
    };
    let collapsed_read = ReadLine {
        blocks,
        ..read.clone()
    };

    let masks: MaskMap = build_masks(tree, &collapsed_read, k);

    let mut scored: Vec<(NodeId, Scores, f64)> = masks
        .iter()
        .map(|(&id, m)| {
            let s = raw_scores(m, n, read.qlen, tree.node(id).kmers_full);
            let v = measure_value(&s, measure);
            (id, s, v)
        })
        .collect();
    scored.sort_by_key(|(id, _, _)| *id);

    let Some(max_v) = scored.iter().map(|(_, _, v)| *v).fold(None, |acc: Option<f64>, v| {
        Some(acc.map_or(v, |a| a.max(v)))
    }) else {
        return vec![unassigned(&collapsed_read)];
    };

    if max_v <= 0.0 {
        return vec![unassigned(&collapsed_read)];
    }

    let winners: Vec<(NodeId, Scores)> = scored
        .into_iter()
        .filter(|(_, _, v)| *v == max_v)
        .map(|(id, s, _)| (id, s))
        .collect();
    let is = winners.len();

    if is == 1 || !tie_lca {
        return winners
            .into_iter()
            .enumerate()
            .map(|(idx, (id, scores))| {
                let m = &masks[&id];
                AssignmentRecord {
                    qname: read.qname.clone(),
                    ln: read.qlen,
                    winner: Some(id),
                    scores,
                    ii: idx + 1,
                    is,
                    covmask_for_cigar: Some(m.covmask.clone()),
                    hitmask_for_cigar: Some(m.hitmask.clone()),
                    blocks: collapsed_read.blocks.clone(),
                }
            })
            .collect();
    }

    // is > 1 and tie_lca: replace W by {lca(W)}; blank the opposite
    // family and drop masks (spec §4.6 tie-break field-presence contract).
    let ids: Vec<NodeId> = winners.iter().map(|(id, _)| *id).collect();
    let lca_id = tree.lca(&ids).ok();
    let first_scores = winners[0].1.clone();
    let blanked = if measure.is_h_family() {
        Scores {
            h1: first_scores.h1,
            hf: first_scores.hf,
            h2: first_scores.h2,
            c1: None,
            cf: None,
            c2: None,
        }
    } else {
        Scores {
            h1: None,
            hf: None,
            h2: None,
            c1: first_scores.c1,
            cf: first_scores.cf,
            c2: first_scores.c2,
        }
    };

    vec![AssignmentRecord {
        qname: read.qname.clone(),
        ln: read.qlen,
        winner: lca_id,
        scores: blanked,
        ii: 1,
        is,
        covmask_for_cigar: None,
        hitmask_for_cigar: None,
        blocks: collapsed_read.blocks.clone(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::parse_line;

    fn tree() -> Tree {
        let t = Tree::parse("((A,B)X,C)R;").unwrap();
        let counts: rustc_hash::FxHashMap<NodeId, u64> = t
            .node_ids()
            .into_iter()
            .map(|id| (id, 10u64))
            .collect();
        t.with_kmers_full(&counts)
    }

    #[test]
    fn e2_classify_unambiguous() {
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tX:1 A:1 0:3", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, false);
        let x = t.name_lookup("X").unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].winner, Some(x));
        assert_eq!(recs[0].scores.h1, Some(1));
    }

    #[test]
    fn e3_tie_with_lca() {
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tA,B:2 0:3", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, true);
        let x = t.name_lookup("X").unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].winner, Some(x));
        assert_eq!(recs[0].scores.h1, Some(2));
        assert!(recs[0].scores.c1.is_none());
        assert!(recs[0].covmask_for_cigar.is_none());
    }

    #[test]
    fn tie_without_tie_lca_emits_one_record_per_winner() {
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tA,B:2 0:3", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, false);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].is, 2);
        assert_eq!(recs[1].is, 2);
        assert_eq!((recs[0].ii, recs[1].ii), (1, 2));
    }

    #[test]
    fn e4_ancestor_inheritance_changes_winner() {
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tX:2 A:1 0:2", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, false);
        let a = t.name_lookup("A").unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].winner, Some(a));
        assert_eq!(recs[0].scores.h1, Some(3));
    }

    #[test]
    fn no_hits_is_unassigned() {
        let t = tree();
        let read = parse_line("U\tread1\tdummy\t7\t0:5", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, false);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].winner.is_none());
    }

    #[test]
    fn tie_of_size_one_is_noop_for_tie_lca() {
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tX:1 A:1 0:3", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, true);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].is, 1);
        assert!(recs[0].scores.c1.is_some() || recs[0].scores.h1.is_some());
    }
}
