use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::{LevelFilter, error, info};
use rayon::prelude::*;
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

use splitnet::alignment::Alignment;
use splitnet::error::Result;
use splitnet::scaffold::{Polytomy, extract_polytomies, sn_tree};
use splitnet::{NetworkError, assemble, backbone, io};

/// Reconstruct a level-1 phylogenetic network from a binary-character
/// alignment: build the compatible-split scaffold, hand unresolved
/// polytomies to an external parsimony search, then stitch the resolved
/// pieces back together.
#[derive(Parser, Debug)]
#[command(name = "splitnet", version, about = "Level-1 network reconstruction from binary characters")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (repeat for debug detail)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode: warnings and errors only
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the scaffold tree and write one reduced alignment per
    /// polytomy/removed-taxon pair for the external search program
    Setup {
        /// Nexus alignment of 0/1 characters (.gz accepted)
        #[arg(short = 'a', long = "alignment")]
        alignment: PathBuf,

        /// Working directory for polytomy files (created if missing)
        #[arg(short = 'd', long = "dir")]
        dir: PathBuf,
    },
    /// Read the search results back, resolve every polytomy and write the
    /// final network
    Assemble {
        /// Nexus alignment of 0/1 characters (.gz accepted)
        #[arg(short = 'a', long = "alignment")]
        alignment: PathBuf,

        /// Working directory holding the setup output and search results
        #[arg(short = 'd', long = "dir")]
        dir: PathBuf,
    },
}

fn initialise_logging(level: LevelFilter) {
    CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .unwrap();
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet {
        LevelFilter::Warn
    } else {
        match cli.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    initialise_logging(level);

    let outcome = match &cli.command {
        Command::Setup { alignment, dir } => run_setup(alignment, dir),
        Command::Assemble { alignment, dir } => run_assemble(alignment, dir),
    };
    if let Err(e) = outcome {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run_setup(alignment: &PathBuf, dir: &PathBuf) -> Result<()> {
    let t0 = Instant::now();
    let aln = io::read_alignment(alignment)?;
    info!(
        "read {} taxa with {} sites in {:.3}s",
        aln.row_count(),
        aln.site_count(),
        t0.elapsed().as_secs_f64()
    );

    let t1 = Instant::now();
    let (scaffold, kept) = sn_tree(&aln)?;
    info!(
        "scaffold built from {} compatible splits in {:.3}s",
        kept.len(),
        t1.elapsed().as_secs_f64()
    );

    let polytomies = extract_polytomies(&scaffold)?;
    info!("{} polytomies extracted", polytomies.len());

    io::write_polytomies(dir, &polytomies, &aln)?;
    io::write_tree(dir.as_path().join("sntree.nwk"), &scaffold, false)?;
    info!("polytomy files and scaffold written to {}", dir.display());
    Ok(())
}

fn run_assemble(alignment: &PathBuf, dir: &PathBuf) -> Result<()> {
    let aln = io::read_alignment(alignment)?;
    let mut scaffold = io::read_tree(dir.as_path().join("sntree.nwk"))?;
    let polytomies = extract_polytomies(&scaffold)?;

    // the taxa files written at setup time are the source of truth; the
    // re-derived handles must describe the same polytomies
    let taxa_files = io::read_taxa(dir)?;
    if taxa_files.len() != polytomies.len() {
        return Err(NetworkError::Lookup(format!(
            "{} taxa files for {} scaffold polytomies",
            taxa_files.len(),
            polytomies.len()
        )));
    }
    for poly in &polytomies {
        let recorded = taxa_files.get(&poly.id).ok_or_else(|| {
            NetworkError::Lookup(format!("taxa_{}.txt is missing", poly.id))
        })?;
        let mut a = recorded.clone();
        let mut b = poly.taxa.clone();
        a.sort();
        b.sort();
        if a != b {
            return Err(NetworkError::Lookup(format!(
                "taxa_{}.txt does not match the scaffold polytomy",
                poly.id
            )));
        }
    }

    let t0 = Instant::now();
    let results: Vec<(usize, Result<splitnet::Tree>)> = polytomies
        .par_iter()
        .map(|poly| (poly.id, resolve_polytomy(dir, poly, &aln)))
        .collect();
    info!(
        "{} polytomies processed in {:.3}s",
        results.len(),
        t0.elapsed().as_secs_f64()
    );

    let mut cycles = Vec::new();
    for (id, outcome) in results {
        match outcome {
            Ok(tree) => cycles.push((id, tree)),
            Err(e) => error!("polytomy {id}: {e}; leaving it unresolved"),
        }
    }

    assemble::assemble_network(&mut scaffold, &polytomies, &cycles)?;
    io::write_tree(dir.as_path().join("final_network.nwk"), &scaffold, true)?;
    info!("network written to {}", dir.join("final_network.nwk").display());
    Ok(())
}

fn resolve_polytomy(dir: &PathBuf, poly: &Polytomy, aln: &Alignment) -> Result<splitnet::Tree> {
    let (removed, tree_index, score) = io::select_candidate(dir, poly.id)?;
    info!(
        "polytomy {}: best candidate from removed-taxon set {} (tree {}, score {})",
        poly.id, removed, tree_index, score
    );
    let candidate = io::read_candidate_tree(dir, poly.id, removed, tree_index)?;
    backbone::close_cycle(candidate, &poly.taxa, aln)
}
