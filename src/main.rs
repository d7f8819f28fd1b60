//! OpusChess - UCI Chess Engine
//!
//! Usage:
//!     opus                      run the UCI loop on stdin/stdout
//!     opus bench [--depth D]    search the bench suite and report nps
//!     opus perft --depth D [--fen F]
//!
//! Diagnostics go to stderr and are filtered with RUST_LOG (default `warn`).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use opus_core::attacks::AttackTables;
use opus_core::config::EngineConfig;
use opus_core::evaluation::PstEvaluator;
use opus_core::move_generator::MoveGenerator;
use opus_core::perft::timed_perft;
use opus_core::position::{Position, STARTING_FEN};
use opus_core::search::{SearchEngine, DEFAULT_BENCH_DEPTH};
use opus_core::uci::UCIProtocol;
use opus_core::zobrist::ZobristKeys;

#[derive(Parser)]
#[command(name = "opus", version, about = "OpusChess UCI engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Search the built-in position suite to a fixed depth
    Bench {
        #[arg(long, default_value_t = DEFAULT_BENCH_DEPTH)]
        depth: i32,
    },
    /// Count legal move paths to a depth, split by root move
    Perft {
        #[arg(long)]
        depth: u32,
        #[arg(long, default_value = STARTING_FEN)]
        fen: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        None => UCIProtocol::new().run().context("reading UCI input")?,
        Some(Command::Bench { depth }) => {
            let keys = Arc::new(ZobristKeys::new());
            let tables = Arc::new(AttackTables::new());
            let mut engine = SearchEngine::new(EngineConfig::default(), tables, PstEvaluator::new());
            let result = engine.bench(&keys, depth).context("loading bench positions")?;
            println!(
                "{} nodes {} ms {} nps",
                result.nodes,
                result.elapsed.as_millis(),
                result.nps()
            );
        }
        Some(Command::Perft { depth, fen }) => {
            let keys = Arc::new(ZobristKeys::new());
            let movegen = MoveGenerator::new(Arc::new(AttackTables::new()));
            let mut pos = Position::from_fen(&fen, keys).with_context(|| format!("parsing FEN '{}'", fen))?;
            let report = timed_perft(&movegen, &mut pos, depth);
            for (mv, nodes) in &report.divide {
                println!("{}: {}", mv, nodes);
            }
            println!();
            println!(
                "{} nodes {} ms {} nps",
                report.nodes,
                report.elapsed.as_millis(),
                report.nps()
            );
        }
    }

    Ok(())
}
