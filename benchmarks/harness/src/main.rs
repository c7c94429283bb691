//! prophyle-bench-harness
//!
//! Run small end-to-end benchmarks of the k-mer extraction, propagation, and
//! mask/CIGAR paths, appending CSV rows into `benchmarks/reports/bench-<unix>.csv`.
//!
//! Usage examples:
//!   cargo run -p prophyle-bench-harness -- --profile configs/profiles/small.toml

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Deserialize;

use prophyle_core::kmer::{canonical_set, extract_canonical};
use prophyle_core::Tree;
use prophyle_propagate::masking::NoMasking;
use prophyle_propagate::{propagate, PropagationConfig, PropagationMode};
use prophyle_query::cigar::cigar_from_mask;
use prophyle_query::mask::build_masks;
use prophyle_query::parse_line;

#[derive(Debug, Deserialize)]
struct Profile {
    /// Number of leaves in the synthetic balanced tree.
    leaves: u32,
    /// Length of each synthetic leaf sequence.
    seq_len: u32,
    /// K-mer length.
    k: u8,
    /// Repetitions of the whole pipeline.
    repeats: u32,
}

fn parse_flag(name: &str, default: &str) -> String {
    let mut it = std::env::args().skip(1);
    while let Some(k) = it.next() {
        if k == format!("--{name}") {
            return it.next().unwrap_or_else(|| default.to_string());
        }
    }
    default.to_string()
}

fn dur_ms(d: Duration) -> u128 {
    d.as_millis()
}

/// Deterministic xorshift64 generator, seeded per-leaf so a profile's
/// sequences are stable across runs without pulling in a `rand` dependency
/// this harness has no other use for.
fn synthetic_sequence(seed: u64, len: u32) -> Vec<u8> {
    const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];
    let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut out = Vec::with_capacity(len as usize);
    for _ in 0..len {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        out.push(BASES[(x & 0b11) as usize]);
    }
    out
}

/// Build a balanced binary tree Newick string over `leaves` synthetic leaves,
/// each annotated with a `fastapath` pointing at a file this function also
/// writes into `library_dir`.
fn build_synthetic_tree(leaves: u32, seq_len: u32, library_dir: &std::path::Path) -> Result<String> {
    fs::create_dir_all(library_dir)?;
    let mut names: Vec<String> = Vec::new();
    for i in 0..leaves {
        let name = format!("L{i}");
        let seq = synthetic_sequence(u64::from(i) + 1, seq_len);
        let path = library_dir.join(format!("{name}.fa"));
        fs::write(&path, format!(">{name}\n{}\n", String::from_utf8_lossy(&seq)))?;
        names.push(format!("{name}[&&NHX:fastapath={name}.fa]"));
    }
    // Fold leaves into a balanced binary tree bottom-up.
    let mut level = names;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut it = level.into_iter();
        while let Some(a) = it.next() {
            match it.next() {
                Some(b) => next.push(format!("({a},{b})")),
                None => next.push(a),
            }
        }
        level = next;
    }
    Ok(format!("{}root;", level.into_iter().next().unwrap_or_default()))
}

fn main() -> Result<()> {
    let profile_path = PathBuf::from(parse_flag("profile", "configs/profiles/small.toml"));

    let profile_src = fs::read_to_string(&profile_path)
        .with_context(|| format!("read profile {:?}", profile_path))?;
    let profile: Profile = toml::from_str(&profile_src).context("parse profile toml")?;
    println!(
        "Profile: leaves={}, seq_len={}, k={}, repeats={}",
        profile.leaves, profile.seq_len, profile.k, profile.repeats
    );

    fs::create_dir_all("benchmarks/reports").ok();

    let ts = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let csv_path = PathBuf::from(format!("benchmarks/reports/bench-{ts}.csv"));
    let mut csv = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&csv_path)?;
    writeln!(csv, "timestamp,leaves,seq_len,k,repeat,stage,ms,extra")?;

    for rep in 0..profile.repeats {
        let work_dir = PathBuf::from(format!("benchmarks/tmp-bench-{ts}-{rep}"));
        let library_dir = work_dir.join("lib");
        fs::create_dir_all(&library_dir).ok();

        // 1) synthetic tree + leaf FASTA generation (not timed: fixture setup).
        let nw = build_synthetic_tree(profile.leaves, profile.seq_len, &library_dir)?;
        let tree = Tree::parse(&nw)?.minimal_subtree();

        // 2) k-mer extraction throughput over one leaf sequence: streamed
        // iteration (total positions scanned) and deduplication into a set.
        let seq = synthetic_sequence(1, profile.seq_len);
        let t0 = Instant::now();
        let positions = extract_canonical(&seq, profile.k as usize)?.count();
        let t_stream = t0.elapsed();
        writeln!(
            csv,
            "{ts},{},{},{},{},extract_stream,{},positions={}",
            profile.leaves,
            profile.seq_len,
            profile.k,
            rep,
            dur_ms(t_stream),
            positions
        )?;
        let t0 = Instant::now();
        let set = canonical_set(&seq, profile.k as usize)?;
        let t_extract = t0.elapsed();
        writeln!(
            csv,
            "{ts},{},{},{},{},extract_set,{},kmers={}",
            profile.leaves,
            profile.seq_len,
            profile.k,
            rep,
            dur_ms(t_extract),
            set.len()
        )?;

        // 3) full propagation over the synthetic tree.
        let cfg = PropagationConfig {
            k: profile.k as usize,
            mode: PropagationMode::Deletative,
            reassemble: false,
            library_dir: library_dir.clone(),
            output_dir: work_dir.join("propagation"),
            workers: 0,
        };
        let t0 = Instant::now();
        let counts = propagate(&tree, &cfg, &NoMasking)?;
        let t_prop = t0.elapsed();
        writeln!(
            csv,
            "{ts},{},{},{},{},propagate,{},nodes={}",
            profile.leaves,
            profile.seq_len,
            profile.k,
            rep,
            dur_ms(t_prop),
            counts.len()
        )?;

        // 4) mask construction + CIGAR throughput over a synthetic read.
        let k = profile.k as usize;
        let qlen = profile.seq_len as usize;
        let n = qlen.saturating_sub(k - 1);
        let line = format!("C\tbench\tdummy\t{qlen}\tL0:{n}");
        let read = parse_line(&line, k)?;
        let t0 = Instant::now();
        let masks = build_masks(&tree, &read, k);
        let t_mask = t0.elapsed();
        let t0 = Instant::now();
        let mut total_runs = 0usize;
        for m in masks.values() {
            let s = cigar_from_mask(&m.covmask);
            total_runs += s.matches(['=', 'X']).count();
        }
        let t_cigar = t0.elapsed();
        writeln!(
            csv,
            "{ts},{},{},{},{},mask,{},nodes={}",
            profile.leaves,
            profile.seq_len,
            profile.k,
            rep,
            dur_ms(t_mask),
            masks.len()
        )?;
        writeln!(
            csv,
            "{ts},{},{},{},{},cigar,{},runs={}",
            profile.leaves,
            profile.seq_len,
            profile.k,
            rep,
            dur_ms(t_cigar),
            total_runs
        )?;

        let _ = fs::remove_dir_all(&work_dir);
    }

    println!("Wrote report -> {}", csv_path.display());
    Ok(())
}
