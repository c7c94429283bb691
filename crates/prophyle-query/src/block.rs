//! Query block decoder (component C5). Consumes lines of the form
//! `<status>\t<qname>\t<refs_or_dummy>\t<qlen>\t<blocks>[\t<seq>\t<qual>]`
//! emitted by the external index-query tool (spec §4.5/§6.2).

use crate::error::{QueryError, Result};

/// One block's candidate set: the ordinary case is a list of node names;
/// `"0"` and `"A"` are the special no-hit / ambiguous tokens (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateSet {
    /// Token `"0"`: no hit at these positions.
    None,
    /// Token `"A"`: ambiguous / masked.
    Ambiguous,
    /// Ordinary candidate node name list.
    Nodes(Vec<String>),
}

impl CandidateSet {
    /// Ordinary candidate names, or an empty slice for `None`/`Ambiguous`.
    #[must_use]
    pub fn names(&self) -> &[String] {
        match self {
            CandidateSet::Nodes(v) => v,
            _ => &[],
        }
    }
}

/// One `(candidate_set, count)` pair, a maximal run of read k-mer
/// positions sharing the same candidate set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The shared candidate set.
    pub candidates: CandidateSet,
    /// Number of consecutive k-mer positions this block covers.
    pub count: usize,
}

/// One decoded read line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadLine {
    /// Raw status field as received (informative only; C5 does not
    /// interpret it — C6/C7 derive assignment status from scoring).
    pub status: String,
    /// Read name.
    pub qname: String,
    /// Read length.
    pub qlen: usize,
    /// Decoded blocks, in stream order.
    pub blocks: Vec<Block>,
    /// Optional sequence, if the upstream tool echoed it.
    pub seq: Option<String>,
    /// Optional quality string, if the upstream tool echoed it.
    pub qual: Option<String>,
}

fn parse_block_token(token: &str) -> Result<Block> {
    let (names_part, count_part) = token.rsplit_once(':').ok_or_else(|| QueryError::MalformedToken {
        token: token.to_string(),
        reason: "missing ':count' suffix".to_string(),
    })?;
    let count: usize = count_part.parse().map_err(|_| QueryError::MalformedToken {
        token: token.to_string(),
        reason: format!("non-numeric count {count_part:?}"),
    })?;
    let candidates = match names_part {
        "0" => CandidateSet::None,
        "A" => CandidateSet::Ambiguous,
        _ => CandidateSet::Nodes(names_part.split(',').map(str::to_string).collect()),
    };
    Ok(Block { candidates, count })
}

/// Parse one block-stream line. `k` is used only to validate the
/// `Σ count = qlen - k + 1` invariant (spec §4.5); `qlen < k` reads produce
/// zero blocks regardless of what the line's `<blocks>` field says.
pub fn parse_line(line: &str, k: usize) -> Result<ReadLine> {
    let parts: Vec<&str> = line.trim_end_matches(['\n', '\r']).split('\t').collect();
    if parts.len() < 5 {
        return Err(QueryError::MalformedLine(line.to_string()));
    }
    let status = parts[0].to_string();
    let qname = parts[1].to_string();
    // parts[2] is refs_or_dummy, unused by C5 itself.
    let qlen: usize = parts[3]
        .parse()
        .map_err(|_| QueryError::MalformedLine(line.to_string()))?;
    let blocks_field = parts[4];

    let blocks: Vec<Block> = if qlen < k {
        Vec::new()
    } else if blocks_field.is_empty() {
        Vec::new()
    } else {
        blocks_field
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(parse_block_token)
            .collect::<Result<Vec<_>>>()?
    };

    let expected: usize = if qlen >= k { qlen - k + 1 } else { 0 };
    let got: usize = blocks.iter().map(|b| b.count).sum();
    if got != expected {
        return Err(QueryError::CountMismatch {
            got,
            expected,
            qlen,
            k,
        });
    }

    let seq = parts.get(5).map(|s| (*s).to_string());
    let qual = parts.get(6).map(|s| (*s).to_string());

    Ok(ReadLine {
        status,
        qname,
        qlen,
        blocks,
        seq,
        qual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_e2_scenario() {
        // spec §8 E2: blocks `X:1 A:1 0:3`, qlen=7, k=3.
        let line = "C\tread1\tdummy\t7\tX:1 A:1 0:3";
        let r = parse_line(line, 3).unwrap();
        assert_eq!(r.blocks.len(), 3);
        assert_eq!(r.blocks[0].candidates, CandidateSet::Nodes(vec!["X".into()]));
        assert_eq!(r.blocks[1].candidates, CandidateSet::Ambiguous);
        assert_eq!(r.blocks[2].candidates, CandidateSet::None);
    }

    #[test]
    fn qlen_less_than_k_yields_no_blocks() {
        let line = "U\tread2\tdummy\t2\t";
        let r = parse_line(line, 3).unwrap();
        assert!(r.blocks.is_empty());
    }

    #[test]
    fn rejects_count_mismatch() {
        let line = "C\tread3\tdummy\t7\tX:5";
        assert!(parse_line(line, 3).is_err());
    }
}
