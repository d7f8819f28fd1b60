//! OpusChess - Search Engine Module
//!
//! This module implements the chess search algorithm using:
//! - Iterative deepening with aspiration windows
//! - Principal variation search with a transposition table
//! - Reverse futility, null move, late move, futility and SEE pruning
//! - Check and singular extensions
//! - Late Move Reductions
//! - Killer, butterfly history and continuation history ordering
//! - Quiescence search over SEE-filtered captures

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::attacks::AttackTables;
use crate::config::EngineConfig;
use crate::error::FenError;
use crate::evaluation::{AccumulatorStack, Evaluator, PstEvaluator};
use crate::history::{ContinuationHistory, QuietHistory};
use crate::move_generator::MoveGenerator;
use crate::moves::{Move, MoveKind, MoveList, ScoredList};
use crate::position::Position;
use crate::see::see;
use crate::tt::{Bound, TranspositionTable};
use crate::types::*;
use crate::zobrist::ZobristKeys;

// Constants for search
pub const INFINITY: i32 = 100000;
pub const MATE_SCORE: i32 = 50000;
pub const MAX_PLY: usize = 256;
/// Scores at or beyond this magnitude are mate scores
pub const MATE_BOUND: i32 = MATE_SCORE - MAX_PLY as i32;
/// Deepest iteration any search will start
pub const MAX_DEPTH: i32 = 64;

const SCORE_NONE: i32 = -INFINITY - 1;

/// Nodes between clock and stop flag checks
const CHECK_INTERVAL: u64 = 2048;

// Aspiration Windows
const ASPIRATION_DELTA: i32 = 20;

// Time management
const MOVE_OVERHEAD_MS: u64 = 10;

// Move ordering
const TT_MOVE_SCORE: i32 = 10_000_000;
const GOOD_CAPTURE_BONUS: i32 = 1_000_000;
const PROMOTION_SCORE: i32 = 900_000;
const KILLER_SCORE: i32 = 800_000;

// Pruning margins
const RFP_MAX_DEPTH: i32 = 5;
const RFP_MARGIN: i32 = 100;
const NMP_MIN_DEPTH: i32 = 3;
const FP_MAX_DEPTH: i32 = 8;
const FP_BASE: i32 = 100;
const FP_MARGIN: i32 = 150;
const SEE_QUIET_MARGIN: i32 = -60;
const SEE_CAPTURE_MARGIN: i32 = -30;
const SE_MIN_DEPTH: i32 = 8;

// History
const HISTORY_BONUS_MAX: i32 = 2500;
const HISTORY_MALUS_MAX: i32 = 1250;

// Positions searched by `bench`
pub const BENCH_POSITIONS: [&str; 8] = [
    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
    "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
    "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
    "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
    "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10",
    "6k1/6p1/6Pp/ppp5/3pn2P/1P3K2/1PP2P2/8 b - - 3 54",
    "r1bq1rk1/pp2bppp/2n2n2/3p4/3P4/2NBPN2/PP3PPP/R2QK2R w KQ - 3 9",
];

pub const DEFAULT_BENCH_DEPTH: i32 = 7;

// ============================================================================
// LIMITS AND RESULTS
// ============================================================================

/// What the caller allows one search to spend. Times are in milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub movetime: Option<u64>,
    pub depth: Option<i32>,
    pub nodes: Option<u64>,
    pub infinite: bool,
}

impl SearchParams {
    pub fn depth(depth: i32) -> Self {
        SearchParams { depth: Some(depth), ..Default::default() }
    }

    pub fn nodes(nodes: u64) -> Self {
        SearchParams { nodes: Some(nodes), ..Default::default() }
    }

    /// Wall-clock budget for `side`, if any
    pub fn time_budget(&self, side: Color) -> Option<Duration> {
        if self.infinite {
            return None;
        }
        if let Some(ms) = self.movetime {
            return Some(Duration::from_millis(ms));
        }

        let (time, inc) = match side {
            Color::White => (self.wtime, self.winc),
            Color::Black => (self.btime, self.binc),
        };
        let time = time?;
        let budget = time / 20 + inc.unwrap_or(0) / 2;
        Some(Duration::from_millis(budget.min(time.saturating_sub(MOVE_OVERHEAD_MS)).max(1)))
    }
}

/// Progress of one completed iteration
#[derive(Clone, Debug)]
pub struct SearchReport {
    pub depth: i32,
    pub score: i32,
    pub nodes: u64,
    pub elapsed: Duration,
    pub hashfull: usize,
    pub pv: Vec<Move>,
}

impl SearchReport {
    pub fn nps(&self) -> u64 {
        let micros = self.elapsed.as_micros().max(1);
        (self.nodes as u128 * 1_000_000 / micros) as u64
    }
}

/// Outcome of `SearchEngine::run`
#[derive(Clone, Debug)]
pub struct SearchResult {
    /// `Move::NULL` only when the root has no legal move
    pub best_move: Move,
    pub score: i32,
    /// Deepest completed iteration, 0 if none completed
    pub depth: i32,
    pub nodes: u64,
    pub pv: Vec<Move>,
}

#[derive(Clone, Copy, Debug)]
pub struct BenchResult {
    pub nodes: u64,
    pub elapsed: Duration,
}

impl BenchResult {
    pub fn nps(&self) -> u64 {
        let micros = self.elapsed.as_micros().max(1);
        (self.nodes as u128 * 1_000_000 / micros) as u64
    }
}

/// Moves to mate for a mate score, negative when being mated
pub fn mate_in(score: i32) -> Option<i32> {
    if score.abs() < MATE_BOUND {
        return None;
    }
    let moves = (MATE_SCORE - score.abs() + 1) / 2;
    Some(if score > 0 { moves } else { -moves })
}

/// Mate scores are stored relative to the node, not the root
#[inline]
fn score_to_tt(score: i32, ply: usize) -> i32 {
    if score >= MATE_BOUND {
        score + ply as i32
    } else if score <= -MATE_BOUND {
        score - ply as i32
    } else {
        score
    }
}

#[inline]
fn score_from_tt(score: i32, ply: usize) -> i32 {
    if score >= MATE_BOUND {
        score - ply as i32
    } else if score <= -MATE_BOUND {
        score + ply as i32
    } else {
        score
    }
}

// ============================================================================
// SEARCH STACK AND PV
// ============================================================================

#[derive(Clone, Copy, Debug)]
struct StackEntry {
    eval: i32,
    killer: Move,
    excluded: Move,
    /// Piece and destination of the move made from this ply
    moved: Option<(Piece, Square)>,
    null_move: bool,
}

impl Default for StackEntry {
    fn default() -> Self {
        StackEntry {
            eval: SCORE_NONE,
            killer: Move::NULL,
            excluded: Move::NULL,
            moved: None,
            null_move: false,
        }
    }
}

/// Principal variation below a node
#[derive(Clone)]
struct Line {
    moves: [Move; MAX_PLY],
    len: usize,
}

impl Line {
    fn new() -> Self {
        Line { moves: [Move::NULL; MAX_PLY], len: 0 }
    }

    #[inline]
    fn clear(&mut self) {
        self.len = 0;
    }

    /// `mv` followed by the child's line
    #[inline]
    fn update(&mut self, mv: Move, child: &Line) {
        let n = child.len.min(MAX_PLY - 1);
        self.moves[0] = mv;
        self.moves[1..=n].copy_from_slice(&child.moves[..n]);
        self.len = n + 1;
    }

    fn as_slice(&self) -> &[Move] {
        &self.moves[..self.len]
    }
}

/// Captured piece type, if `mv` captures
#[inline]
fn captured(pos: &Position, mv: Move) -> Option<PieceType> {
    match mv.kind() {
        MoveKind::EnPassant => Some(PieceType::Pawn),
        MoveKind::Castling => None,
        _ => pos.piece_on(mv.to_sq()).map(|piece| piece.piece_type()),
    }
}

fn build_reductions() -> Vec<[i32; 64]> {
    let mut table = vec![[0; 64]; 64];
    for (depth, row) in table.iter_mut().enumerate().skip(1) {
        for (moves, r) in row.iter_mut().enumerate().skip(1) {
            *r = (0.5 + (depth as f64).ln() * (moves as f64).ln() / 3.0) as i32;
        }
    }
    table
}

// ============================================================================
// SEARCH ENGINE
// ============================================================================

pub struct SearchEngine<E: Evaluator = PstEvaluator> {
    movegen: MoveGenerator,
    evaluator: E,
    config: EngineConfig,
    tt: TranspositionTable,
    quiet_history: QuietHistory,
    cont_history: ContinuationHistory,
    stack: Vec<StackEntry>,
    accumulators: AccumulatorStack<E::Accumulator>,
    reductions: Vec<[i32; 64]>,

    // Limits for the current run
    stop: Arc<AtomicBool>,
    stopped: bool,
    nodes: u64,
    node_limit: Option<u64>,
    start: Instant,
    deadline: Option<Instant>,
}

impl<E: Evaluator> SearchEngine<E> {
    pub fn new(config: EngineConfig, tables: Arc<AttackTables>, evaluator: E) -> Self {
        SearchEngine {
            movegen: MoveGenerator::new(tables),
            evaluator,
            config,
            tt: TranspositionTable::new(config.hash_mb),
            quiet_history: QuietHistory::new(),
            cont_history: ContinuationHistory::new(),
            stack: vec![StackEntry::default(); MAX_PLY + 1],
            accumulators: AccumulatorStack::new(),
            reductions: build_reductions(),
            stop: Arc::new(AtomicBool::new(false)),
            stopped: false,
            nodes: 0,
            node_limit: None,
            start: Instant::now(),
            deadline: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn move_generator(&self) -> &MoveGenerator {
        &self.movegen
    }

    /// Resize the transposition table; entries are lost
    pub fn resize_hash(&mut self, size_mb: usize) {
        let size_mb = self.config.set_hash_mb(size_mb);
        self.tt.resize(size_mb);
    }

    pub fn set_threads(&mut self, threads: usize) -> usize {
        self.config.set_threads(threads)
    }

    pub fn clear_hash(&mut self) {
        self.tt.clear();
    }

    /// Forget everything learned in previous searches
    pub fn new_game(&mut self) {
        self.tt.clear();
        self.quiet_history.clear();
        self.cont_history.clear();
        self.stack.fill(StackEntry::default());
        debug!("search state cleared for new game");
    }

    /// Flag that makes a running search return its last completed iteration
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn hashfull(&self) -> usize {
        self.tt.hashfull()
    }

    /// Evaluation of `pos` for the side to move, without searching
    pub fn static_eval(&self, pos: &Position) -> i32 {
        let acc = self.evaluator.reset(pos);
        self.evaluator.evaluate(&acc, pos.side_to_move())
    }

    // ========================================================================
    // ITERATIVE DEEPENING
    // ========================================================================

    /// Search `pos` within `params`, calling `on_iteration` after every
    /// completed depth. `pos` is returned to its original state.
    pub fn run<F>(&mut self, pos: &mut Position, params: &SearchParams, mut on_iteration: F) -> SearchResult
    where
        F: FnMut(&SearchReport),
    {
        self.start = Instant::now();
        let budget = params.time_budget(pos.side_to_move());
        self.deadline = budget.map(|b| self.start + b);
        self.node_limit = params.nodes;
        self.nodes = 0;
        self.stopped = false;
        self.stop.store(false, Ordering::Relaxed);
        self.stack.fill(StackEntry::default());
        self.accumulators.reset(self.evaluator.reset(pos));

        let max_depth = params.depth.unwrap_or(MAX_DEPTH).clamp(1, MAX_DEPTH);

        let legal = self.movegen.legal_moves(pos);
        let mut result = SearchResult {
            best_move: legal.as_slice().first().copied().unwrap_or(Move::NULL),
            score: 0,
            depth: 0,
            nodes: 0,
            pv: Vec::new(),
        };
        if legal.is_empty() {
            if self.movegen.in_check(pos, pos.side_to_move()) {
                result.score = -MATE_SCORE;
            }
            return result;
        }

        let mut score = 0;
        for depth in 1..=max_depth {
            let mut line = Line::new();
            let iteration_score = self.aspiration(pos, depth, score, &mut line);
            if self.stopped {
                break;
            }
            score = iteration_score;

            if let Some(&best) = line.as_slice().first() {
                result.best_move = best;
                result.pv = line.as_slice().to_vec();
            }
            result.score = score;
            result.depth = depth;

            let report = SearchReport {
                depth,
                score,
                nodes: self.nodes,
                elapsed: self.start.elapsed(),
                hashfull: self.tt.hashfull(),
                pv: result.pv.clone(),
            };
            trace!(depth, score, nodes = self.nodes, "iteration complete");
            on_iteration(&report);

            // Another iteration would not finish in the remaining half of the budget
            if let Some(budget) = budget {
                if self.start.elapsed() >= budget / 2 {
                    break;
                }
            }
        }

        result.nodes = self.nodes;
        result
    }

    fn aspiration(&mut self, pos: &mut Position, depth: i32, previous: i32, line: &mut Line) -> i32 {
        let mut delta = ASPIRATION_DELTA;
        let (mut alpha, mut beta) = if depth == 1 {
            (-INFINITY, INFINITY)
        } else {
            ((previous - delta).max(-INFINITY), (previous + delta).min(INFINITY))
        };

        loop {
            let score = self.negamax(pos, depth, alpha, beta, 0, line);
            if self.stopped {
                return 0;
            }
            if (score > alpha && score < beta) || (alpha == -INFINITY && beta == INFINITY) {
                return score;
            }

            delta *= 2;
            alpha = (previous - delta).max(-INFINITY);
            beta = (previous + delta).min(INFINITY);
        }
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    /// Node limit is exact; clock and stop flag are sampled
    #[inline]
    fn out_of_budget(&mut self) -> bool {
        if self.stopped {
            return true;
        }
        if self.node_limit.is_some_and(|limit| self.nodes >= limit) {
            self.stopped = true;
        } else if self.nodes % CHECK_INTERVAL == 0 {
            let late = self.deadline.is_some_and(|deadline| Instant::now() >= deadline);
            if late || self.stop.load(Ordering::Relaxed) {
                self.stopped = true;
            }
        }
        self.stopped
    }

    #[inline]
    fn evaluate(&self, pos: &Position) -> i32 {
        self.accumulators
            .top()
            .map_or(0, |acc| self.evaluator.evaluate(acc, pos.side_to_move()))
    }

    #[inline]
    fn reduction(&self, depth: i32, num_legal: usize) -> i32 {
        self.reductions[(depth as usize).min(63)][num_legal.min(63)]
    }

    /// Make `mv` and push its accumulator. Returns false, with nothing
    /// changed, if the move leaves the mover in check.
    #[inline]
    fn make(&mut self, pos: &mut Position, mv: Move) -> bool {
        let us = pos.side_to_move();
        let Some(parent) = self.accumulators.top() else {
            return false;
        };
        let next = self.evaluator.update(pos, mv, parent);

        self.accumulators.push(next);
        pos.make_move(mv);
        if self.movegen.in_check(pos, us) {
            pos.unmake_move();
            self.accumulators.pop();
            return false;
        }
        self.nodes += 1;
        true
    }

    #[inline]
    fn unmake(&mut self, pos: &mut Position) {
        pos.unmake_move();
        self.accumulators.pop();
    }

    fn quiet_score(&self, pos: &Position, mv: Move, ply: usize) -> i32 {
        let Some(piece) = pos.piece_on(mv.from_sq()) else {
            return 0;
        };
        let to = mv.to_sq();
        let mut score = self.quiet_history.get(piece.color(), mv.from_sq(), to);
        for back in [1, 2] {
            if ply >= back {
                if let Some((prev_piece, prev_to)) = self.stack[ply - back].moved {
                    score += self.cont_history.get(prev_piece, prev_to, piece, to);
                }
            }
        }
        score
    }

    fn score_moves(&self, pos: &Position, moves: &MoveList, tt_move: Move, ply: usize) -> ScoredList {
        let killer = self.stack[ply].killer;
        let mut scored = ScoredList::new();

        for &mv in moves.iter() {
            let score = if mv == tt_move {
                TT_MOVE_SCORE
            } else if let Some(victim) = captured(pos, mv) {
                let attacker = pos.piece_on(mv.from_sq()).map_or(0, |p| p.piece_type().value());
                let mvv_lva = victim.value() * 10 - attacker;
                if see(&self.movegen, pos, mv, 0) {
                    GOOD_CAPTURE_BONUS + mvv_lva
                } else {
                    mvv_lva
                }
            } else if mv.is_promotion() {
                PROMOTION_SCORE + mv.promotion_piece().value()
            } else if mv == killer {
                KILLER_SCORE
            } else {
                self.quiet_score(pos, mv, ply)
            };
            scored.push(mv, score);
        }

        scored
    }

    fn update_quiet(&mut self, pos: &Position, mv: Move, ply: usize, bonus: i32) {
        let Some(piece) = pos.piece_on(mv.from_sq()) else {
            return;
        };
        let to = mv.to_sq();
        self.quiet_history.update(piece.color(), mv.from_sq(), to, bonus);
        for back in [1, 2] {
            if ply >= back {
                if let Some((prev_piece, prev_to)) = self.stack[ply - back].moved {
                    self.cont_history.update(prev_piece, prev_to, piece, to, bonus);
                }
            }
        }
    }

    /// Reward the quiet move that caused a cutoff and punish the quiets tried before it
    fn update_quiet_stats(&mut self, pos: &Position, mv: Move, ply: usize, depth: i32, tried: &MoveList) {
        self.stack[ply].killer = mv;

        let bonus = (depth * 300).clamp(0, HISTORY_BONUS_MAX);
        let malus = (depth * 300).clamp(0, HISTORY_MALUS_MAX);
        self.update_quiet(pos, mv, ply, bonus);
        for &quiet in tried.iter() {
            self.update_quiet(pos, quiet, ply, -malus);
        }
    }

    // ========================================================================
    // ALPHA-BETA
    // ========================================================================

    fn negamax(&mut self, pos: &mut Position, mut depth: i32, mut alpha: i32, beta: i32, ply: usize, pv: &mut Line) -> i32 {
        pv.clear();
        if self.out_of_budget() {
            return 0;
        }

        let root = ply == 0;
        let pv_node = beta - alpha > 1;
        let us = pos.side_to_move();

        if !root {
            if pos.has_repeated() || pos.is_fifty_move_draw() || pos.is_insufficient() {
                return 0;
            }
            if ply >= MAX_PLY - 1 {
                return self.evaluate(pos);
            }
        }

        let in_check = self.movegen.in_check(pos, us);
        if in_check {
            depth += 1;
        }
        if depth <= 0 {
            return self.quiescence(pos, alpha, beta, ply);
        }

        let original_alpha = alpha;
        let excluded = self.stack[ply].excluded;

        // Probe TT
        let tt_entry = if excluded.is_null() { self.tt.probe(pos.hash()) } else { None };
        let tt_move = tt_entry.map_or(Move::NULL, |entry| entry.best_move);
        if let Some(entry) = tt_entry {
            let score = score_from_tt(entry.score, ply);
            let usable = match entry.bound {
                Bound::Exact => true,
                Bound::Lower => score >= beta,
                Bound::Upper => score <= alpha,
                Bound::None => false,
            };
            if !root && entry.depth as i32 >= depth && usable {
                return score;
            }
        }

        // Static evaluation for pruning
        let eval = if in_check { SCORE_NONE } else { self.evaluate(pos) };
        self.stack[ply].eval = eval;
        let improving = !in_check
            && ply >= 2
            && self.stack[ply - 2].eval != SCORE_NONE
            && eval > self.stack[ply - 2].eval;

        if !pv_node && !in_check && excluded.is_null() {
            // Reverse futility pruning
            let margin = RFP_MARGIN * (depth - improving as i32).max(0);
            if depth <= RFP_MAX_DEPTH && eval.abs() < MATE_BOUND && eval - margin >= beta {
                return eval;
            }

            // Null move pruning
            if depth >= NMP_MIN_DEPTH
                && eval >= beta
                && pos.has_non_pawn_material(us)
                && ply > 0
                && !self.stack[ply - 1].null_move
            {
                let r = 3 + depth / 4;
                self.stack[ply].moved = None;
                self.stack[ply].null_move = true;
                pos.make_null();
                self.nodes += 1;

                let mut child = Line::new();
                let score = -self.negamax(pos, depth - r, -beta, -beta + 1, ply + 1, &mut child);

                pos.unmake_move();
                self.stack[ply].null_move = false;
                if self.stopped {
                    return 0;
                }
                if score >= beta {
                    return if score >= MATE_BOUND { beta } else { score };
                }
            }
        }

        let mut moves = MoveList::new();
        self.movegen.generate_all_moves(pos, &mut moves);
        let mut scored = self.score_moves(pos, &moves, tt_move, ply);

        let mut best_score = -INFINITY;
        let mut best_move = Move::NULL;
        let mut num_legal = 0usize;
        let mut skip_quiets = false;
        let mut quiets_tried = MoveList::new();
        let mut child = Line::new();

        for i in 0..scored.len() {
            let (mv, _) = scored.pick_move(i);
            if mv == excluded {
                continue;
            }
            let quiet = captured(pos, mv).is_none() && !mv.is_promotion();

            if !root && !pv_node && best_score > -MATE_BOUND {
                if quiet {
                    if skip_quiets {
                        continue;
                    }
                    // Late move pruning
                    if num_legal >= (6 + 2 * depth * depth) as usize {
                        skip_quiets = true;
                        continue;
                    }
                    // Futility pruning
                    if !in_check && depth <= FP_MAX_DEPTH && eval + FP_BASE + FP_MARGIN * depth <= alpha {
                        skip_quiets = true;
                        continue;
                    }
                    if !see(&self.movegen, pos, mv, SEE_QUIET_MARGIN * depth) {
                        continue;
                    }
                } else if !see(&self.movegen, pos, mv, SEE_CAPTURE_MARGIN * depth * depth) {
                    continue;
                }
            }

            // Singular extension
            let mut extension = 0;
            if !root && depth >= SE_MIN_DEPTH && mv == tt_move && excluded.is_null() {
                if let Some(entry) = tt_entry {
                    let tt_score = score_from_tt(entry.score, ply);
                    if entry.depth as i32 >= depth - 3 && entry.bound != Bound::Upper && tt_score.abs() < MATE_BOUND {
                        let singular_beta = tt_score - 2 * depth;
                        self.stack[ply].excluded = mv;
                        let score = self.negamax(pos, (depth - 1) / 2, singular_beta - 1, singular_beta, ply, &mut child);
                        self.stack[ply].excluded = Move::NULL;
                        if self.stopped {
                            return 0;
                        }
                        if score < singular_beta {
                            extension = 1;
                        } else if singular_beta >= beta {
                            // Multi-cut: several moves beat beta
                            return singular_beta;
                        }
                    }
                }
            }

            let Some(moved_piece) = pos.piece_on(mv.from_sq()) else {
                continue;
            };
            if !self.make(pos, mv) {
                continue;
            }
            num_legal += 1;
            self.stack[ply].moved = Some((moved_piece, mv.to_sq()));
            self.stack[ply].null_move = false;

            let new_depth = depth - 1 + extension;
            let score = if num_legal == 1 {
                -self.negamax(pos, new_depth, -beta, -alpha, ply + 1, &mut child)
            } else {
                // Late Move Reductions
                let mut score = if num_legal >= 4 && depth >= 3 && quiet {
                    let r = self.reduction(depth, num_legal) + !improving as i32;
                    let reduced = (new_depth - r).clamp(1, new_depth.max(1));
                    let mut s = -self.negamax(pos, reduced, -alpha - 1, -alpha, ply + 1, &mut child);
                    if s > alpha && reduced < new_depth {
                        s = -self.negamax(pos, new_depth, -alpha - 1, -alpha, ply + 1, &mut child);
                    }
                    s
                } else {
                    -self.negamax(pos, new_depth, -alpha - 1, -alpha, ply + 1, &mut child)
                };

                // PVS re-search
                if score > alpha && score < beta {
                    score = -self.negamax(pos, new_depth, -beta, -alpha, ply + 1, &mut child);
                }
                score
            };

            self.unmake(pos);
            if self.stopped {
                return 0;
            }

            if score > best_score {
                best_score = score;
                best_move = mv;

                if score > alpha {
                    alpha = score;
                    pv.update(mv, &child);

                    if score >= beta {
                        if quiet {
                            self.update_quiet_stats(pos, mv, ply, depth, &quiets_tried);
                        }
                        break;
                    }
                }
            }

            if quiet {
                quiets_tried.push(mv);
            }
        }

        // Checkmate / Stalemate
        if num_legal == 0 {
            return if !excluded.is_null() {
                alpha
            } else if in_check {
                -MATE_SCORE + ply as i32
            } else {
                0
            };
        }

        if excluded.is_null() {
            let bound = if best_score >= beta {
                Bound::Lower
            } else if best_score > original_alpha {
                Bound::Exact
            } else {
                Bound::Upper
            };
            self.tt.store(pos.hash(), best_move, score_to_tt(best_score, ply), depth, bound);
        }

        best_score
    }

    fn quiescence(&mut self, pos: &mut Position, mut alpha: i32, beta: i32, ply: usize) -> i32 {
        if self.out_of_budget() {
            return 0;
        }
        if ply >= MAX_PLY - 1 {
            return self.evaluate(pos);
        }

        let original_alpha = alpha;
        let tt_entry = self.tt.probe(pos.hash());
        let tt_move = tt_entry.map_or(Move::NULL, |entry| entry.best_move);
        if let Some(entry) = tt_entry {
            let score = score_from_tt(entry.score, ply);
            let usable = match entry.bound {
                Bound::Exact => true,
                Bound::Lower => score >= beta,
                Bound::Upper => score <= alpha,
                Bound::None => false,
            };
            if usable {
                return score;
            }
        }

        let stand_pat = self.evaluate(pos);
        if stand_pat >= beta {
            return stand_pat;
        }
        alpha = alpha.max(stand_pat);

        let mut moves = MoveList::new();
        self.movegen.generate_captures(pos, &mut moves);
        let mut scored = self.score_moves(pos, &moves, tt_move, ply);

        let mut best_score = stand_pat;
        let mut best_move = Move::NULL;

        for i in 0..scored.len() {
            let (mv, _) = scored.pick_move(i);
            if !see(&self.movegen, pos, mv, 0) {
                continue;
            }
            if !self.make(pos, mv) {
                continue;
            }
            let score = -self.quiescence(pos, -beta, -alpha, ply + 1);
            self.unmake(pos);
            if self.stopped {
                return 0;
            }

            if score > best_score {
                best_score = score;
                best_move = mv;
                if score > alpha {
                    alpha = score;
                    if score >= beta {
                        break;
                    }
                }
            }
        }

        let bound = if best_score >= beta {
            Bound::Lower
        } else if best_score > original_alpha {
            Bound::Exact
        } else {
            Bound::Upper
        };
        self.tt.store(pos.hash(), best_move, score_to_tt(best_score, ply), 0, bound);

        best_score
    }

    // ========================================================================
    // BENCH
    // ========================================================================

    /// Search every bench position to `depth` from a clean state
    pub fn bench(&mut self, keys: &Arc<ZobristKeys>, depth: i32) -> Result<BenchResult, FenError> {
        let start = Instant::now();
        let mut nodes = 0u64;
        let params = SearchParams::depth(depth);

        for fen in BENCH_POSITIONS {
            let mut pos = Position::from_fen(fen, Arc::clone(keys))?;
            self.new_game();
            nodes += self.run(&mut pos, &params, |_| {}).nodes;
        }

        Ok(BenchResult { nodes, elapsed: start.elapsed() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn tables() -> Arc<AttackTables> {
        static TABLES: OnceLock<Arc<AttackTables>> = OnceLock::new();
        TABLES.get_or_init(|| Arc::new(AttackTables::new())).clone()
    }

    fn engine() -> SearchEngine {
        SearchEngine::new(EngineConfig::new(4, 1), tables(), PstEvaluator::new())
    }

    fn pos(fen: &str) -> Position {
        Position::from_fen(fen, Arc::new(ZobristKeys::new())).expect("valid FEN")
    }

    #[test]
    fn finds_back_rank_mate() {
        let mut engine = engine();
        let mut p = pos("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        let result = engine.run(&mut p, &SearchParams::depth(1), |_| {});
        assert_eq!(result.best_move.to_uci(), "a1a8");
        assert_eq!(result.score, MATE_SCORE - 1);
        assert_eq!(mate_in(result.score), Some(1));
    }

    #[test]
    fn mate_survives_deeper_iterations() {
        let mut engine = engine();
        let mut p = pos("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        let result = engine.run(&mut p, &SearchParams::depth(4), |_| {});
        assert_eq!(result.best_move.to_uci(), "a1a8");
        assert_eq!(mate_in(result.score), Some(1));
    }

    #[test]
    fn wins_hanging_queen() {
        let mut engine = engine();
        let mut p = pos("4k3/8/8/3q4/8/8/8/3RK3 w - - 0 1");
        let result = engine.run(&mut p, &SearchParams::depth(4), |_| {});
        assert_eq!(result.best_move.to_uci(), "d1d5");
        assert!(result.score > 300);
    }

    #[test]
    fn reports_every_iteration() {
        let mut engine = engine();
        let mut p = Position::startpos(Arc::new(ZobristKeys::new()));
        let fen = p.to_fen();
        let mut depths = Vec::new();
        let result = engine.run(&mut p, &SearchParams::depth(4), |report| {
            assert!(!report.pv.is_empty());
            depths.push(report.depth);
        });
        assert_eq!(depths, vec![1, 2, 3, 4]);
        assert_eq!(result.depth, 4);
        assert_eq!(p.to_fen(), fen);

        let legal = engine.move_generator().legal_moves(&mut p);
        assert!(legal.contains(result.best_move));
    }

    #[test]
    fn no_move_when_checkmated_or_stalemated() {
        let mut engine = engine();

        let mut mated = pos("R5k1/5ppp/8/8/8/8/8/6K1 b - - 0 1");
        let result = engine.run(&mut mated, &SearchParams::depth(3), |_| {});
        assert!(result.best_move.is_null());
        assert_eq!(result.score, -MATE_SCORE);

        let mut stalemate = pos("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        let result = engine.run(&mut stalemate, &SearchParams::depth(3), |_| {});
        assert!(result.best_move.is_null());
        assert_eq!(result.score, 0);
    }

    #[test]
    fn exhausted_node_budget_falls_back_to_a_legal_move() {
        let mut engine = engine();
        let mut p = Position::startpos(Arc::new(ZobristKeys::new()));
        let result = engine.run(&mut p, &SearchParams::nodes(1), |_| {});
        assert_eq!(result.depth, 0);
        let legal = engine.move_generator().legal_moves(&mut p);
        assert!(legal.contains(result.best_move));
    }

    #[test]
    fn time_budget_rules() {
        let params = SearchParams { wtime: Some(20_000), winc: Some(1000), ..Default::default() };
        assert_eq!(params.time_budget(Color::White), Some(Duration::from_millis(1500)));
        assert_eq!(params.time_budget(Color::Black), None);

        let params = SearchParams { movetime: Some(250), wtime: Some(20_000), ..Default::default() };
        assert_eq!(params.time_budget(Color::White), Some(Duration::from_millis(250)));

        let params = SearchParams { infinite: true, movetime: Some(250), ..Default::default() };
        assert_eq!(params.time_budget(Color::White), None);
    }

    #[test]
    fn tt_mate_scores_are_ply_relative() {
        let stored = score_to_tt(MATE_SCORE - 7, 3);
        assert_eq!(stored, MATE_SCORE - 4);
        assert_eq!(score_from_tt(stored, 5), MATE_SCORE - 9);
        assert_eq!(score_to_tt(123, 9), 123);
        assert_eq!(score_from_tt(-MATE_SCORE + 10, 2), -MATE_SCORE + 12);
    }

    #[test]
    fn mate_display() {
        assert_eq!(mate_in(MATE_SCORE - 1), Some(1));
        assert_eq!(mate_in(MATE_SCORE - 3), Some(2));
        assert_eq!(mate_in(-MATE_SCORE + 2), Some(-1));
        assert_eq!(mate_in(250), None);
    }

    /// Ready the engine for calling `negamax` directly on `p`
    fn prepare(engine: &mut SearchEngine, p: &Position) {
        engine.accumulators.reset(engine.evaluator.reset(p));
        engine.stack.fill(StackEntry::default());
        engine.nodes = 0;
        engine.stopped = false;
    }

    #[test]
    fn quiet_cutoff_updates_killer_and_histories() {
        let mut engine = engine();
        let p = Position::startpos(Arc::new(ZobristKeys::new()));
        let black_knight = Piece::new(PieceType::Knight, Color::Black);
        let black_pawn = Piece::new(PieceType::Pawn, Color::Black);
        let white_knight = Piece::new(PieceType::Knight, Color::White);
        engine.stack[0].moved = Some((black_pawn, 36));
        engine.stack[1].moved = Some((black_knight, 45));

        let cutoff = Move::normal(6, 21);
        let mut tried = MoveList::new();
        tried.push(Move::normal(1, 18));
        tried.push(Move::normal(12, 28));

        engine.update_quiet_stats(&p, cutoff, 2, 4, &tried);

        assert_eq!(engine.stack[2].killer, cutoff);
        assert_eq!(engine.quiet_history.get(Color::White, 6, 21), 1200);
        assert_eq!(engine.cont_history.get(black_knight, 45, white_knight, 21), 1200);
        assert_eq!(engine.cont_history.get(black_pawn, 36, white_knight, 21), 1200);
        assert_eq!(engine.quiet_history.get(Color::White, 1, 18), -1200);
        assert_eq!(engine.quiet_history.get(Color::White, 12, 28), -1200);
        assert!(engine.quiet_score(&p, cutoff, 2) > engine.quiet_score(&p, Move::normal(1, 18), 2));

        // Deep cutoffs clamp the bonus and the malus separately
        engine.update_quiet_stats(&p, Move::normal(11, 19), 2, 20, &tried);
        assert_eq!(engine.stack[2].killer, Move::normal(11, 19));
        assert_eq!(engine.quiet_history.get(Color::White, 11, 19), 2500);
        assert_eq!(engine.quiet_history.get(Color::White, 1, 18), -2359);
    }

    #[test]
    fn excluded_move_bypasses_transposition_table() {
        let mut engine = engine();
        let mut p = pos("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3");
        let excluded = engine.movegen.parse_uci_move(&mut p, "f1c4").expect("legal move");
        let fake = 30000;
        let mut line = Line::new();

        // Without an exclusion the planted entry answers the node
        prepare(&mut engine, &p);
        engine.tt.store(p.hash(), Move::NULL, fake, 20, Bound::Exact);
        assert_eq!(engine.negamax(&mut p, 1, -INFINITY, INFINITY, 1, &mut line), fake);

        // With one it is neither read nor overwritten
        prepare(&mut engine, &p);
        engine.stack[1].excluded = excluded;
        let score = engine.negamax(&mut p, 1, -INFINITY, INFINITY, 1, &mut line);
        assert!(score.abs() < 2000, "searched score {}", score);
        let entry = engine.tt.probe(p.hash()).expect("planted entry");
        assert_eq!((entry.score, entry.best_move, entry.depth), (fake, Move::NULL, 20));

        engine.tt.clear();
        prepare(&mut engine, &p);
        engine.stack[1].excluded = excluded;
        engine.negamax(&mut p, 1, -INFINITY, INFINITY, 1, &mut line);
        assert!(engine.tt.probe(p.hash()).is_none());
    }

    #[test]
    fn aborted_search_unwinds_accumulators() {
        let mut engine = engine();
        let mut p = pos("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
        let fen = p.to_fen();
        for nodes in [1, 2, 7, 50, 333, 2500] {
            let result = engine.run(&mut p, &SearchParams::nodes(nodes), |_| {});
            assert_eq!(engine.accumulators.len(), 1, "after {} nodes", nodes);
            assert!(!result.best_move.is_null());
            assert_eq!(p.to_fen(), fen);
        }
    }

    #[test]
    fn bench_counts_nodes() {
        let mut engine = engine();
        let result = engine.bench(&Arc::new(ZobristKeys::new()), 2).expect("bench FENs parse");
        assert!(result.nodes > 0);
    }
}
