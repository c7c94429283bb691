//! Output emitter (component C7): SAM-like and Kraken-like per-read
//! records (spec §4.7).

use prophyle_core::{NodeId, Tree};

use crate::assign::AssignmentRecord;
use crate::block::CandidateSet;
use crate::cigar::cigar_from_mask;

/// Fixed large reference length reported in SAM `@SQ` headers, matching
/// the original tool's placeholder contig length (spec §9 constant note).
pub const FAKE_CONTIG_LENGTH: u64 = 42_424_242;

/// Output form selected by `-f {sam,kraken}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// SAM-like form with one `@SQ` header per tree node.
    Sam,
    /// Kraken-like `C|U` tab-separated form.
    Kraken,
}

/// Emission-time options, one-to-one with the CLI flags in spec §6.4
/// that affect C7's rendering (as opposed to C6's scoring).
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitOptions {
    /// `-A`: append `gi`/`ti`/`sn`/`ra` tags from tree annotations.
    pub annotate: bool,
}

/// Render SAM `@SQ` header lines, one per tree node.
#[must_use]
pub fn sam_headers(tree: &Tree) -> Vec<String> {
    tree.node_ids()
        .map(|id| {
            let node = tree.node(id);
            let mut line = format!("@SQ\tSN:{}\tLN:{FAKE_CONTIG_LENGTH}", node.name);
            if let Some(p) = &node.fastapath {
                line.push_str(&format!("\tUR:{p}"));
            }
            if let Some(sn) = &node.sci_name {
                line.push_str(&format!("\tSP:{sn}"));
            }
            if let Some(ti) = &node.taxid {
                line.push_str(&format!("\tAS:{ti}"));
            }
            line
        })
        .collect()
}

fn node_name(tree: &Tree, id: Option<NodeId>) -> String {
    id.map_or_else(|| "*".to_string(), |id| tree.node(id).name.clone())
}

/// A node's taxid when present, else its plain name (spec §4.7: "taxids
/// substituted when present").
fn taxid_or_name(tree: &Tree, id: NodeId) -> String {
    let node = tree.node(id);
    node.taxid.clone().unwrap_or_else(|| node.name.clone())
}

fn fmt_f(v: Option<f64>) -> String {
    v.map_or_else(|| "*".to_string(), |v| format!("{v:.6}"))
}

fn fmt_u(v: Option<u64>) -> String {
    v.map_or_else(|| "*".to_string(), |v| v.to_string())
}

/// Render one SAM-like record line for `rec` (spec §4.7 "SAM-like form").
#[must_use]
pub fn sam_record(tree: &Tree, rec: &AssignmentRecord, opts: EmitOptions) -> String {
    let flag = if rec.winner.is_some() { 0 } else { 4 };
    let rname = node_name(tree, rec.winner);
    let cigar = rec
        .covmask_for_cigar
        .as_ref()
        .map_or_else(|| "*".to_string(), |m| cigar_from_mask(m));

    let mut fields = vec![
        rec.qname.clone(),
        flag.to_string(),
        rname,
        "0".to_string(),
        "0".to_string(),
        cigar,
        "*".to_string(),
        "0".to_string(),
        "0".to_string(),
        "*".to_string(),
        "*".to_string(),
    ];

    fields.push(format!("h1:i:{}", fmt_u(rec.scores.h1)));
    fields.push(format!("h2:f:{}", fmt_f(rec.scores.h2)));
    fields.push(format!("hf:f:{}", fmt_f(rec.scores.hf)));
    fields.push(format!("c1:i:{}", fmt_u(rec.scores.c1)));
    fields.push(format!("c2:f:{}", fmt_f(rec.scores.c2)));
    fields.push(format!("cf:f:{}", fmt_f(rec.scores.cf)));
    fields.push(format!("ln:i:{}", rec.ln));
    fields.push(format!("ii:i:{}", rec.ii));
    fields.push(format!("is:i:{}", rec.is));
    let hc = rec
        .hitmask_for_cigar
        .as_ref()
        .map_or_else(|| "*".to_string(), |m| cigar_from_mask(m));
    fields.push(format!("hc:Z:{hc}"));

    if opts.annotate {
        if let Some(id) = rec.winner {
            let node = tree.node(id);
            if let Some(gi) = &node.gi {
                fields.push(format!("gi:Z:{gi}"));
            }
            if let Some(ti) = &node.taxid {
                fields.push(format!("ti:Z:{ti}"));
            }
            if let Some(sn) = &node.sci_name {
                fields.push(format!("sn:Z:{sn}"));
            }
            if let Some(ra) = &node.rank {
                fields.push(format!("ra:Z:{ra}"));
            }
        }
    }

    fields.join("\t")
}

/// Render one block's display token: `"0"`/`"A"` pass through unchanged, a
/// single named candidate substitutes its taxid when present, and an
/// uncollapsed multi-candidate block (only possible without `simulate_lca`)
/// keeps its comma-joined name list, untranslated.
fn block_token(tree: &Tree, candidates: &CandidateSet) -> String {
    match candidates {
        CandidateSet::None => "0".to_string(),
        CandidateSet::Ambiguous => "A".to_string(),
        CandidateSet::Nodes(names) => match names.as_slice() {
            [name] => tree
                .name_lookup(name)
                .map_or_else(|| name.clone(), |id| taxid_or_name(tree, id)),
            _ => names.join(","),
        },
    }
}

/// Render one Kraken-like record line: `C|U \t qname \t rname_or_0 \t qlen \t blocks`.
/// `blocks` re-renders `rec.blocks` (the stream as scored, already collapsed
/// by `simulate_lca` if active) with taxid substitution, merging adjacent
/// runs whose rendered token ends up equal (spec §4.7, scenario E5).
#[must_use]
pub fn kraken_record(tree: &Tree, rec: &AssignmentRecord) -> String {
    let status = if rec.winner.is_some() { 'C' } else { 'U' };
    let rname = rec.winner.map_or_else(|| "0".to_string(), |id| taxid_or_name(tree, id));

    let mut runs: Vec<(String, usize)> = Vec::with_capacity(rec.blocks.len());
    for b in &rec.blocks {
        let token = block_token(tree, &b.candidates);
        match runs.last_mut() {
            Some((last_token, count)) if *last_token == token => *count += b.count,
            _ => runs.push((token, b.count)),
        }
    }
    let blocks = runs
        .iter()
        .map(|(token, count)| format!("{token}:{count}"))
        .collect::<Vec<_>>()
        .join(" ");

    format!("{status}\t{}\t{rname}\t{}\t{blocks}", rec.qname, rec.ln)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assign::{classify_read, Measure};
    use crate::block::parse_line;

    fn tree() -> Tree {
        let t = Tree::parse("((A,B)X,C)R;").unwrap();
        let counts: rustc_hash::FxHashMap<NodeId, u64> =
            t.node_ids().map(|id| (id, 10u64)).collect();
        t.with_kmers_full(&counts)
    }

    #[test]
    fn sam_headers_cover_every_node() {
        let t = tree();
        let headers = sam_headers(&t);
        assert_eq!(headers.len(), t.len());
        assert!(headers.iter().all(|h| h.contains("@SQ")));
    }

    #[test]
    fn sam_record_has_cigar_for_winner() {
        let t = tree();
        let read = parse_line("C\tread1\tdummy\t7\tX:1 A:1 0:3", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, false);
        let line = sam_record(&t, &recs[0], EmitOptions::default());
        assert!(line.contains("h1:i:1"));
        assert!(!line.contains("\t*\t0\t0\t*\t*\t0\t0\t*\t*\t"));
    }

    #[test]
    fn kraken_record_unassigned_is_zero() {
        let t = tree();
        let read = parse_line("U\tread1\tdummy\t7\t0:5", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, false);
        let line = kraken_record(&t, &recs[0]);
        assert!(line.starts_with("U\tread1\t0\t7\t"));
    }

    #[test]
    fn e5_mimic_kraken_collapses_tie_via_simulate_lca() {
        // spec §8 E5: blocks `A,B:2 A:1 0:1` with simulate_lca on; the first
        // block's candidate set {A, B} collapses to LCA(A,B)=X before scoring,
        // so the sole winner is X with h1=2, and the full block stream
        // re-renders as `X:2 A:1 0:1` (no taxids set on this tree, so names
        // pass through unchanged).
        let t = tree();
        let x = t.name_lookup("X").unwrap();
        let read = parse_line("C\tread1\tdummy\t6\tA,B:2 A:1 0:1", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, true, false);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].winner, Some(x));
        assert_eq!(recs[0].scores.h1, Some(2));
        let line = kraken_record(&t, &recs[0]);
        assert_eq!(line, "C\tread1\tX\t6\tX:2 A:1 0:1");
    }

    #[test]
    fn kraken_block_tokens_substitute_taxid_when_present() {
        // Avoid the node name "A": it collides with the literal ambiguous
        // block token and would parse as `CandidateSet::Ambiguous` instead.
        let t = Tree::parse("(G[&&NHX:taxid=123],B)R;").unwrap();
        let counts: rustc_hash::FxHashMap<NodeId, u64> = t.node_ids().map(|id| (id, 5u64)).collect();
        let t = t.with_kmers_full(&counts);
        let g = t.name_lookup("G").unwrap();
        let read = parse_line("C\tread1\tdummy\t5\tG:3", 3).unwrap();
        let recs = classify_read(&t, &read, 3, Measure::H1, false, false);
        assert_eq!(recs[0].winner, Some(g));
        let line = kraken_record(&t, &recs[0]);
        assert_eq!(line, "C\tread1\t123\t5\t123:3");
    }

    #[test]
    fn e6_qlen_less_than_k_is_unassigned_flag4() {
        // spec §8 E6: read "AC", k=3, qlen<k -> no blocks -> unassigned,
        // U status / FLAG=4.
        let t = tree();
        let read = parse_line("U\tread1\tdummy\t2\t", 3).unwrap();
        assert!(read.blocks.is_empty());
        let recs = classify_read(&t, &read, 3, Measure::H1, false, false);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].winner.is_none());

        let sam = sam_record(&t, &recs[0], EmitOptions::default());
        let flag = sam.split('\t').nth(1).unwrap();
        assert_eq!(flag, "4");

        let kraken = kraken_record(&t, &recs[0]);
        assert!(kraken.starts_with("U\tread1\t0\t2\t"));
    }
}
