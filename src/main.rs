//! Command line front end.
//!
//! - `search` - race prefix-collision workers from a target state
//! - `compress` - chain a state through whole blocks
//! - `digest` - MD5 of a string

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use md5_race::md5::{compress_blocks, digest};
use md5_race::{
    split_table_budget, Algorithm, CollisionCoordinator, HashState, LogObserver, PrefixCollision,
    SearchParameters, StatPrinter,
};

const DEFAULT_TABLE_BUDGET: usize = 1 << 22;

#[derive(Parser)]
#[command(name = "md5-race")]
#[command(version)]
#[command(about = "Races MD5 block-collision searches across threads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find two blocks whose outputs share a prefix
    Search {
        /// Leading output bits both blocks must share (128 = full collision)
        #[arg(short, long, default_value = "24")]
        bits: u32,

        /// Seed as hex; a random one per worker when omitted
        #[arg(long)]
        seed: Option<String>,

        /// Starting state as 32 hex digits; the MD5 IV when omitted.
        /// Malformed values are rejected here rather than replaced by the IV
        #[arg(long)]
        target: Option<String>,

        /// Number of workers (default: number of CPU cores)
        #[arg(short, long, env = "MD5_RACE_THREADS")]
        threads: Option<usize>,

        /// Outputs remembered across all workers; each worker gets an equal
        /// share and starts its table over when the share is full
        #[arg(long, default_value_t = DEFAULT_TABLE_BUDGET)]
        table_limit: usize,

        /// Log progress instead of printing a table
        #[arg(short, long)]
        quiet: bool,
    },

    /// Chain a state through whole 64-byte blocks
    Compress {
        /// Starting state as 32 hex digits
        #[arg(long)]
        state: Option<String>,

        /// Blocks as hex
        #[arg(long)]
        data: String,
    },

    /// MD5 of a string
    Digest { text: String },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,md5_race=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Search {
            bits,
            seed,
            target,
            threads,
            table_limit,
            quiet,
        } => cmd_search(bits, seed, target, threads, table_limit, quiet),
        Commands::Compress { state, data } => cmd_compress(state, &data),
        Commands::Digest { text } => {
            println!("{}", hex::encode(digest(text.as_bytes())));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_state(state: Option<String>) -> anyhow::Result<HashState> {
    Ok(match state {
        Some(text) => HashState::from_hex(&text)?,
        None => HashState::default(),
    })
}

fn cmd_search(
    bits: u32,
    seed: Option<String>,
    target: Option<String>,
    threads: Option<usize>,
    table_limit: usize,
    quiet: bool,
) -> anyhow::Result<()> {
    let workers = threads.unwrap_or_else(num_cpus::get).max(1);
    let strategy =
        PrefixCollision::new(bits)?.with_table_limit(split_table_budget(table_limit, workers));
    let target = parse_state(target)?;
    let mut params = SearchParameters::new().with_target(target);
    if let Some(seed) = seed {
        params = params.with_seed(hex::decode(seed.trim())?);
    }

    let coordinator =
        CollisionCoordinator::with_workers(workers, |_| Algorithm::new(strategy.clone()));
    if quiet {
        coordinator.subscribe(Arc::new(LogObserver));
    } else {
        coordinator.subscribe(Arc::new(StatPrinter::new(1.0, bits)));
    }

    println!("Target: {}", target);
    println!("Match: {} bits", bits);
    println!("Workers: {}", coordinator.worker_count());

    let Some(result) = coordinator.find_collision(&params)? else {
        anyhow::bail!("search stopped without a result");
    };
    let (first_out, second_out) = result.outputs(target);

    println!("\nBlock 1: {}", hex::encode(result.first));
    println!("Block 2: {}", hex::encode(result.second));
    println!("Output 1: {}", first_out);
    println!("Output 2: {}", second_out);
    println!("Shared bits: {}", first_out.common_prefix_bits(second_out));
    println!("Candidates: {}", coordinator.combinations_tried());
    println!(
        "Time elapsed: {:.2}s",
        coordinator.elapsed_time().as_secs_f64()
    );
    Ok(())
}

fn cmd_compress(state: Option<String>, data: &str) -> anyhow::Result<()> {
    let state = parse_state(state)?;
    let data = hex::decode(data.trim())?;
    println!("{}", compress_blocks(state, &data)?);
    Ok(())
}
