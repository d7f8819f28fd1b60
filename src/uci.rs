//! OpusChess - UCI Protocol Module
//!
//! This module implements the Universal Chess Interface (UCI) protocol,
//! allowing the engine to communicate with chess GUIs. Every command is
//! parsed completely before it touches engine state, so a rejected command
//! leaves the position and options exactly as they were.

use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::attacks::AttackTables;
use crate::config::{self, EngineConfig};
use crate::error::UciError;
use crate::evaluation::PstEvaluator;
use crate::move_generator::MoveGenerator;
use crate::perft::timed_perft;
use crate::position::Position;
use crate::search::{mate_in, SearchEngine, SearchParams, SearchReport, DEFAULT_BENCH_DEPTH};
use crate::zobrist::ZobristKeys;

// Engine identification
const ENGINE_NAME: &str = "OpusChess";
const ENGINE_AUTHOR: &str = "OpusChess developers";
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_PERFT_DEPTH: u32 = 5;
/// `go infinite` stops here, since `stop` is only read after `go` returns
const INFINITE_DEPTH: i32 = 30;

/// UCI option representation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UCIOption {
    Spin { name: &'static str, default: usize, min: usize, max: usize },
    Button { name: &'static str },
}

impl UCIOption {
    pub fn name(&self) -> &'static str {
        match self {
            UCIOption::Spin { name, .. } | UCIOption::Button { name } => name,
        }
    }

    pub fn to_uci_string(&self) -> String {
        match self {
            UCIOption::Spin { name, default, min, max } => {
                format!("option name {} type spin default {} min {} max {}", name, default, min, max)
            }
            UCIOption::Button { name } => format!("option name {} type button", name),
        }
    }
}

fn engine_options() -> Vec<UCIOption> {
    vec![
        UCIOption::Spin {
            name: "Hash",
            default: config::DEFAULT_HASH_MB,
            min: config::MIN_HASH_MB,
            max: config::MAX_HASH_MB,
        },
        UCIOption::Spin {
            name: "Threads",
            default: config::DEFAULT_THREADS,
            min: config::MIN_THREADS,
            max: config::max_threads(),
        },
        UCIOption::Button { name: "Clear Hash" },
    ]
}

/// Score as it appears after `score` in an info line
pub fn format_score(score: i32) -> String {
    match mate_in(score) {
        Some(moves) => format!("mate {}", moves),
        None => format!("cp {}", score),
    }
}

fn format_info(report: &SearchReport) -> String {
    let pv: Vec<String> = report.pv.iter().map(|m| m.to_uci()).collect();
    format!(
        "info depth {} time {} nodes {} nps {} score {} pv {}",
        report.depth,
        report.elapsed.as_millis(),
        report.nodes,
        report.nps(),
        format_score(report.score),
        pv.join(" ")
    )
}

/// Parse the value following `name`
fn parse_value<T: FromStr>(name: &'static str, value: Option<&&str>) -> Result<T, UciError> {
    let value = value.ok_or(UciError::MissingArgument(name))?;
    value.parse().map_err(|_| UciError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

/// Clock values may arrive negative when a GUI runs late
fn parse_millis(name: &'static str, value: Option<&&str>) -> Result<u64, UciError> {
    let ms: i64 = parse_value(name, value)?;
    Ok(ms.max(0) as u64)
}

/// Arguments of a `go` command
pub fn parse_go(args: &[&str]) -> Result<SearchParams, UciError> {
    let mut params = SearchParams::default();
    let mut iter = args.iter();

    while let Some(&token) = iter.next() {
        match token {
            "wtime" => params.wtime = Some(parse_millis("wtime", iter.next())?),
            "btime" => params.btime = Some(parse_millis("btime", iter.next())?),
            "winc" => params.winc = Some(parse_millis("winc", iter.next())?),
            "binc" => params.binc = Some(parse_millis("binc", iter.next())?),
            "movetime" => params.movetime = Some(parse_millis("movetime", iter.next())?),
            "depth" => params.depth = Some(parse_value("depth", iter.next())?),
            "nodes" => params.nodes = Some(parse_value("nodes", iter.next())?),
            "movestogo" => {
                let _: u32 = parse_value("movestogo", iter.next())?;
            }
            "infinite" => params.infinite = true,
            "ponder" => {}
            other => {
                return Err(UciError::InvalidValue {
                    name: "go".to_string(),
                    value: other.to_string(),
                })
            }
        }
    }

    if params.infinite && params.depth.is_none() {
        params.depth = Some(INFINITE_DEPTH);
    }
    Ok(params)
}

/// UCI protocol handler
pub struct UCIProtocol<W: Write> {
    out: W,
    keys: Arc<ZobristKeys>,
    position: Position,
    search_engine: SearchEngine<PstEvaluator>,
    options: Vec<UCIOption>,
    running: bool,
    debug_mode: bool,
}

impl UCIProtocol<io::Stdout> {
    pub fn new() -> Self {
        UCIProtocol::with_output(io::stdout(), EngineConfig::default())
    }
}

impl Default for UCIProtocol<io::Stdout> {
    fn default() -> Self {
        UCIProtocol::new()
    }
}

impl<W: Write> UCIProtocol<W> {
    pub fn with_output(out: W, config: EngineConfig) -> Self {
        let keys = Arc::new(ZobristKeys::new());
        let tables = Arc::new(AttackTables::new());
        UCIProtocol {
            out,
            position: Position::startpos(Arc::clone(&keys)),
            keys,
            search_engine: SearchEngine::new(config, tables, PstEvaluator::new()),
            options: engine_options(),
            running: true,
            debug_mode: false,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn config(&self) -> &EngineConfig {
        self.search_engine.config()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Read commands from stdin until `quit` or end of input
    pub fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        self.run_with(stdin.lock())
    }

    pub fn run_with<R: BufRead>(&mut self, input: R) -> io::Result<()> {
        for line in input.lines() {
            self.handle_line(&line?);
            if !self.running {
                break;
            }
        }
        Ok(())
    }

    /// Execute one line, reporting a rejected command as an info string
    pub fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Err(err) = self.process_command(line) {
            warn!(%err, command = line, "rejected command");
            self.send(&format!("info string error: {}", err));
        }
    }

    pub fn process_command(&mut self, line: &str) -> Result<(), UciError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = parts.split_first() else {
            return Ok(());
        };

        match command {
            "uci" => self.cmd_uci(),
            "isready" => self.send("readyok"),
            "setoption" => self.cmd_setoption(args)?,
            "ucinewgame" => self.cmd_ucinewgame(),
            "position" => self.cmd_position(args)?,
            "go" => self.cmd_go(args)?,
            // `go` has already returned by the time `stop` is read
            "stop" => {}
            "quit" => self.running = false,
            "debug" => self.debug_mode = args.first() == Some(&"on"),
            "eval" => self.cmd_eval(),
            "d" => self.cmd_display(),
            "perft" => self.cmd_perft(args)?,
            "bench" => self.cmd_bench(args)?,
            other => return Err(UciError::UnknownCommand(other.to_string())),
        }
        Ok(())
    }

    fn send(&mut self, message: &str) {
        writeln!(self.out, "{}", message).ok();
        self.out.flush().ok();
    }

    fn movegen(&self) -> &MoveGenerator {
        self.search_engine.move_generator()
    }

    fn cmd_uci(&mut self) {
        self.send(&format!("id name {} {}", ENGINE_NAME, ENGINE_VERSION));
        self.send(&format!("id author {}", ENGINE_AUTHOR));

        let lines: Vec<String> = self.options.iter().map(UCIOption::to_uci_string).collect();
        for line in lines {
            self.send(&line);
        }

        self.send("uciok");
    }

    fn cmd_setoption(&mut self, args: &[&str]) -> Result<(), UciError> {
        if args.first() != Some(&"name") {
            return Err(UciError::MissingArgument("name"));
        }

        let value_at = args.iter().position(|&a| a == "value");
        let name = args[1..value_at.unwrap_or(args.len())].join(" ");
        let value = value_at.map(|i| args[i + 1..].join(" "));

        let option = self
            .options
            .iter()
            .find(|opt| opt.name().eq_ignore_ascii_case(&name))
            .cloned()
            .ok_or_else(|| UciError::UnknownOption(name.clone()))?;

        match option {
            UCIOption::Button { .. } => {
                self.search_engine.clear_hash();
                if self.debug_mode {
                    self.send("info string Hash table cleared");
                }
            }
            UCIOption::Spin { name, .. } => {
                let value = value.ok_or(UciError::MissingArgument("value"))?;
                let requested: usize = value.trim().parse().map_err(|_| UciError::InvalidValue {
                    name: name.to_string(),
                    value: value.clone(),
                })?;

                let applied = match name {
                    "Hash" => {
                        self.search_engine.resize_hash(requested);
                        self.search_engine.config().hash_mb
                    }
                    _ => self.search_engine.set_threads(requested),
                };
                debug!(option = name, requested, applied, "option set");
                if self.debug_mode {
                    self.send(&format!("info string Option {} set to {}", name, applied));
                }
            }
        }

        Ok(())
    }

    fn cmd_ucinewgame(&mut self) {
        self.position = Position::startpos(Arc::clone(&self.keys));
        self.search_engine.new_game();
    }

    fn cmd_position(&mut self, args: &[&str]) -> Result<(), UciError> {
        let (mut position, rest) = match args.first() {
            Some(&"startpos") => (Position::startpos(Arc::clone(&self.keys)), &args[1..]),
            Some(&"fen") => {
                let end = args.iter().position(|&a| a == "moves").unwrap_or(args.len());
                let fen = args[1..end].join(" ");
                (Position::from_fen(&fen, Arc::clone(&self.keys))?, &args[end..])
            }
            Some(other) => {
                return Err(UciError::InvalidValue {
                    name: "position".to_string(),
                    value: other.to_string(),
                })
            }
            None => return Err(UciError::MissingArgument("position")),
        };

        match rest.split_first() {
            None => {}
            Some((&"moves", moves)) => {
                for text in moves {
                    let mv = self.movegen().parse_uci_move(&mut position, text)?;
                    position.make_move(mv);
                }
            }
            Some((other, _)) => {
                return Err(UciError::InvalidValue {
                    name: "position".to_string(),
                    value: other.to_string(),
                })
            }
        }

        self.position = position;
        Ok(())
    }

    fn cmd_go(&mut self, args: &[&str]) -> Result<(), UciError> {
        let params = parse_go(args)?;

        let out = &mut self.out;
        let result = self.search_engine.run(&mut self.position, &params, |report| {
            writeln!(out, "{}", format_info(report)).ok();
            out.flush().ok();
        });

        self.send(&format!("bestmove {}", result.best_move.to_uci()));
        Ok(())
    }

    fn cmd_eval(&mut self) {
        let score = self.search_engine.static_eval(&self.position);
        self.send(&format!("info string eval cp {} (side to move)", score));
    }

    fn cmd_display(&mut self) {
        let mut position = self.position.clone();
        let legal = self.movegen().legal_moves(&mut position);
        let in_check = self.movegen().in_check(&position, position.side_to_move());

        self.send(&self.position.display());
        self.send(&format!("Fen: {}", self.position.to_fen()));
        self.send(&format!("Key: {:016X}", self.position.hash()));
        self.send(&format!("Checkers: {}", if in_check { "yes" } else { "no" }));
        self.send(&format!("Legal moves: {}", legal.len()));
    }

    fn cmd_perft(&mut self, args: &[&str]) -> Result<(), UciError> {
        let depth = match args.first() {
            Some(_) => parse_value("perft", args.first())?,
            None => DEFAULT_PERFT_DEPTH,
        };

        let mut position = self.position.clone();
        let report = timed_perft(self.movegen(), &mut position, depth);

        for (mv, nodes) in &report.divide {
            self.send(&format!("{}: {}", mv, nodes));
        }
        self.send("");
        self.send(&format!(
            "info string perft depth {} nodes {} time {} nps {}",
            report.depth,
            report.nodes,
            report.elapsed.as_millis(),
            report.nps()
        ));
        Ok(())
    }

    fn cmd_bench(&mut self, args: &[&str]) -> Result<(), UciError> {
        let depth: i32 = match args.first() {
            Some(_) => parse_value("bench", args.first())?,
            None => DEFAULT_BENCH_DEPTH,
        };

        let result = self.search_engine.bench(&self.keys, depth)?;
        self.send(&format!(
            "info string bench depth {} nodes {} time {} nps {}",
            depth,
            result.nodes,
            result.elapsed.as_millis(),
            result.nps()
        ));
        Ok(())
    }
}
