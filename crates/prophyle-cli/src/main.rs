// crates/prophyle-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prophyle_index::{
    check_index_consistency, build, IndexBuildConfig, IndexLayout, SubprocessToolchain,
};
use prophyle_propagate::masking::{DustmaskerTool, NoMasking, RepeatMasker};
use prophyle_query::{
    classify_read, kraken_record, parse_line, sam_headers, sam_record, EmitOptions, Measure,
};

#[derive(Parser, Debug)]
#[command(
    name = "prophyle",
    about = "ProPhyle reference k-mer classifier CLI",
    long_about = "Build a phylogeny-indexed k-mer set and classify reads against it.\n\nSubcommands: download, index, classify.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Fetch reference sequences named by a tree's `fastapath` annotations.
    /// Delegated to external tooling (spec §1 "out of scope"); this
    /// subcommand only validates the tree and reports what would be needed.
    Download {
        /// Newick/NHX tree naming the reference leaves.
        #[arg(long)]
        tree: PathBuf,

        /// Directory sequences would be fetched into.
        #[arg(long)]
        library_dir: PathBuf,
    },

    /// Build a phylogeny-indexed k-mer set from one or more input trees.
    Index {
        /// Input Newick/NHX tree(s). More than one is merged under a
        /// synthetic root.
        #[arg(long = "tree", required = true)]
        trees: Vec<PathBuf>,

        /// Directory holding leaf FASTA files named by `fastapath`.
        #[arg(long)]
        library_dir: PathBuf,

        /// Output index directory.
        #[arg(long)]
        index_dir: PathBuf,

        /// K-mer length.
        #[arg(short = 'k', long, default_value_t = 25, value_parser = clap::value_parser!(u8).range(1..=64))]
        k: u8,

        /// Worker count for the propagation pool (0 = number of hardware threads).
        #[arg(short = 'j', long, default_value_t = 0)]
        workers: usize,

        /// Mask repeats in leaf sequences before propagation.
        #[arg(short = 'M', long)]
        mask_repeats: bool,

        /// Skip k-LCP construction.
        #[arg(short = 'K', long)]
        skip_klcp: bool,

        /// Keep intermediate files (informative; this implementation
        /// never deletes intermediates, so this flag is a no-op kept for
        /// CLI-surface compatibility).
        #[arg(short = 'T', long)]
        keep_temp: bool,

        /// Tree subsampling rate in [0, 1] (not yet wired into propagation;
        /// reserved CLI surface per spec §6.4).
        #[arg(short = 's', long, default_value_t = 1.0)]
        subsample: f64,

        /// Force re-running every stage, ignoring freshness markers.
        #[arg(long)]
        force: bool,

        /// Reassemble unitigs instead of emitting one contig per k-mer.
        #[arg(long)]
        reassemble: bool,

        /// Path to the external BWT/SA/k-LCP builder binary.
        #[arg(long, default_value = "prophyle-index-build")]
        bwt_binary: PathBuf,
    },

    /// Classify reads against a built index, reading the C5 block stream
    /// from stdin and writing classification records to stdout.
    Classify {
        /// Index directory produced by `index`.
        #[arg(long)]
        index_dir: PathBuf,

        /// K-mer length the index was built with.
        #[arg(short = 'k', long, default_value_t = 25, value_parser = clap::value_parser!(u8).range(1..=64))]
        k: u8,

        /// Scoring measure.
        #[arg(short = 'm', long, value_enum, default_value_t = MeasureOpt::H1)]
        measure: MeasureOpt,

        /// Output form.
        #[arg(short = 'f', long, value_enum, default_value_t = FormatOpt::Sam)]
        format: FormatOpt,

        /// Mimic Kraken: simulate_lca + Kraken output + h1 measure.
        #[arg(short = 'M', long)]
        mimic_kraken: bool,

        /// Break ties via lowest common ancestor.
        #[arg(short = 'L', long)]
        tie_lca: bool,

        /// Append tree node-level annotation tags to SAM output.
        #[arg(short = 'A', long)]
        annotate: bool,

        /// Disable rolling-window query (informative; query windowing is
        /// owned by the upstream index-query tool, not this process).
        #[arg(short = 'R', long)]
        no_rolling_window: bool,

        /// Skip name-to-index translation of candidate sets in the block
        /// stream (useful when it already carries resolved names).
        #[arg(short = 'D', long)]
        dont_translate_blocks: bool,
    },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum MeasureOpt {
    H1,
    H2,
    C1,
    C2,
}

impl From<MeasureOpt> for Measure {
    fn from(m: MeasureOpt) -> Self {
        match m {
            MeasureOpt::H1 => Measure::H1,
            MeasureOpt::H2 => Measure::H2,
            MeasureOpt::C1 => Measure::C1,
            MeasureOpt::C2 => Measure::C2,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum FormatOpt {
    Sam,
    Kraken,
}

fn main() -> ExitCode {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        if ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst)).is_err() {
            warn!("failed to install Ctrl-C handler; interrupts will not exit cleanly");
        }
    }

    let result = match cli.cmd {
        Cmd::Download { tree, library_dir } => download(tree, library_dir),
        Cmd::Index {
            trees,
            library_dir,
            index_dir,
            k,
            workers,
            mask_repeats,
            skip_klcp,
            keep_temp,
            subsample,
            force,
            reassemble,
            bwt_binary,
        } => index(
            trees,
            library_dir,
            index_dir,
            k,
            workers,
            mask_repeats,
            skip_klcp,
            keep_temp,
            subsample,
            force,
            reassemble,
            bwt_binary,
        ),
        Cmd::Classify {
            index_dir,
            k,
            measure,
            format,
            mimic_kraken,
            tie_lca,
            annotate,
            no_rolling_window,
            dont_translate_blocks,
        } => classify(
            &index_dir,
            k,
            measure,
            format,
            mimic_kraken,
            tie_lca,
            annotate,
            no_rolling_window,
            dont_translate_blocks,
            &interrupted,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if interrupted.load(Ordering::SeqCst) {
                eprintln!("error: interrupted");
                return ExitCode::from(1);
            }
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn download(tree: PathBuf, library_dir: PathBuf) -> Result<()> {
    let t = prophyle_core::Tree::load(&tree)
        .with_context(|| format!("loading tree {}", tree.display()))?;
    let leaves: Vec<_> = t
        .node_ids()
        .filter(|&id| t.node(id).is_leaf())
        .filter_map(|id| t.node(id).fastapath.clone())
        .collect();

    info!(count = leaves.len(), dir = %library_dir.display(), "dataset download delegated to external tooling");
    println!(
        "{} leaf fastapath entries reference sequences to fetch into {}; \
         fetching itself is delegated to external tooling (out of scope here)",
        leaves.len(),
        library_dir.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn index(
    trees: Vec<PathBuf>,
    library_dir: PathBuf,
    index_dir: PathBuf,
    k: u8,
    workers: usize,
    mask_repeats: bool,
    skip_klcp: bool,
    keep_temp: bool,
    subsample: f64,
    force: bool,
    reassemble: bool,
    bwt_binary: PathBuf,
) -> Result<()> {
    if !(0.0..=1.0).contains(&subsample) {
        bail!("tree subsampling rate must be in [0, 1], got {subsample}");
    }
    let _ = keep_temp; // CLI-surface no-op; see flag doc comment.

    let cfg = IndexBuildConfig {
        newick_inputs: trees,
        library_dir,
        index_dir,
        k: k as usize,
        workers,
        mask_repeats,
        skip_klcp,
        force,
        reassemble,
    };

    let binary = bwt_binary
        .to_str()
        .context("bwt binary path is not valid UTF-8")?
        .to_string();
    let toolchain = SubprocessToolchain::new(binary);

    let masker: Box<dyn RepeatMasker> = if mask_repeats {
        Box::new(DustmaskerTool::default())
    } else {
        Box::new(NoMasking)
    };

    build(&cfg, masker.as_ref(), &toolchain).context("index build failed")?;

    if !cfg.skip_klcp {
        let layout = IndexLayout::new(&cfg.index_dir);
        check_index_consistency(&layout, Some(cfg.k)).context("index consistency check failed")?;
    }

    println!("index built at {}", cfg.index_dir.display());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn classify(
    index_dir: &std::path::Path,
    k: u8,
    measure: MeasureOpt,
    format: FormatOpt,
    mimic_kraken: bool,
    tie_lca: bool,
    annotate: bool,
    no_rolling_window: bool,
    dont_translate_blocks: bool,
    interrupted: &Arc<AtomicBool>,
) -> Result<()> {
    let _ = dont_translate_blocks; // honored implicitly: names are looked up as-is either way.
    if no_rolling_window {
        info!("rolling-window query disabled; upstream index-query tool is expected to restart search per read");
    }

    let layout = IndexLayout::new(index_dir);
    let tree = prophyle_core::Tree::load(&layout.tree_nw())
        .with_context(|| format!("loading {}", layout.tree_nw().display()))?;

    let (effective_measure, simulate_lca, effective_format) = if mimic_kraken {
        (Measure::H1, true, FormatOpt::Kraken)
    } else {
        (Measure::from(measure), false, format)
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if matches!(effective_format, FormatOpt::Sam) {
        for header in sam_headers(&tree) {
            if let Err(e) = writeln!(out, "{header}") {
                return handle_write_err(e);
            }
        }
    }

    let k = k as usize;
    for line in stdin.lock().lines() {
        if interrupted.load(Ordering::SeqCst) {
            bail!("interrupted");
        }
        let line = line.context("reading block-stream line")?;
        if line.is_empty() {
            continue;
        }
        let read = match parse_line(&line, k) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed block line; skipping read");
                continue;
            }
        };

        let records = classify_read(&tree, &read, k, effective_measure, simulate_lca, tie_lca);
        for rec in &records {
            let rendered = match effective_format {
                FormatOpt::Sam => sam_record(&tree, rec, EmitOptions { annotate }),
                FormatOpt::Kraken => kraken_record(&tree, rec),
            };
            if let Err(e) = writeln!(out, "{rendered}") {
                return handle_write_err(e);
            }
        }
    }

    if let Err(e) = out.flush() {
        return handle_write_err(e);
    }
    Ok(())
}

/// A write failure against a closed downstream pipe is not an error from
/// this process's point of view (spec §5/§6.5: exit 0 on broken pipe).
fn handle_write_err(e: io::Error) -> Result<()> {
    if e.kind() == io::ErrorKind::BrokenPipe {
        Ok(())
    } else {
        Err(e).context("writing classification output")
    }
}
