//! OpusChess - Position Evaluation Module
//!
//! The search consumes evaluation through the `Evaluator` trait: a feature
//! accumulator is built once from a position, updated incrementally for
//! each move, and reduced to a score for the side to move. The accumulators
//! live on an explicit `AccumulatorStack` that the search pushes and pops in
//! lockstep with make/unmake.
//!
//! `PstEvaluator` is the built-in implementation: material plus
//! piece-square tables, tapered between middlegame and endgame by the
//! remaining non-pawn material, and a bishop pair bonus.

use crate::moves::{Move, MoveKind};
use crate::position::Position;
use crate::types::*;

// ============================================================================
// EVALUATOR CONTRACT
// ============================================================================

pub trait Evaluator {
    type Accumulator: Clone;

    /// Build the accumulator for `pos` from scratch
    fn reset(&self, pos: &Position) -> Self::Accumulator;

    /// Accumulator after `mv` is played from `pos`. Called before the move
    /// is made, so `pos` still shows the moving and captured pieces.
    fn update(&self, pos: &Position, mv: Move, acc: &Self::Accumulator) -> Self::Accumulator;

    /// Score in centipawns from `side`'s point of view
    fn evaluate(&self, acc: &Self::Accumulator, side: Color) -> i32;
}

/// Caller-managed stack of accumulators, one per ply from the root
#[derive(Clone, Debug)]
pub struct AccumulatorStack<A> {
    stack: Vec<A>,
}

impl<A: Clone> AccumulatorStack<A> {
    pub fn new() -> Self {
        AccumulatorStack { stack: Vec::with_capacity(256) }
    }

    /// Drop everything and start again from `root`
    pub fn reset(&mut self, root: A) {
        self.stack.clear();
        self.stack.push(root);
    }

    pub fn push(&mut self, acc: A) {
        self.stack.push(acc);
    }

    /// Remove the top accumulator; the root is never popped
    pub fn pop(&mut self) {
        debug_assert!(self.stack.len() > 1, "accumulator stack underflow");
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub fn top(&self) -> Option<&A> {
        self.stack.last()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

impl<A: Clone> Default for AccumulatorStack<A> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PIECE-SQUARE TABLES
// ============================================================================

// Pawn PST - encourages central control and advancement
const PAWN_PST: [i32; 64] = [
    0,   0,   0,   0,   0,   0,   0,   0,   // Rank 1
    5,  10,  10, -20, -20,  10,  10,   5,   // Rank 2
    5,  -5, -10,   0,   0, -10,  -5,   5,   // Rank 3
    0,   0,   0,  20,  20,   0,   0,   0,   // Rank 4
    5,   5,  10,  25,  25,  10,   5,   5,   // Rank 5
   10,  10,  20,  30,  30,  20,  10,  10,   // Rank 6
   50,  50,  50,  50,  50,  50,  50,  50,   // Rank 7
    0,   0,   0,   0,   0,   0,   0,   0,   // Rank 8
];

// Knight PST - encourages central positioning
const KNIGHT_PST: [i32; 64] = [
   -50, -40, -30, -30, -30, -30, -40, -50,
   -40, -20,   0,   5,   5,   0, -20, -40,
   -30,   5,  10,  15,  15,  10,   5, -30,
   -30,   0,  15,  20,  20,  15,   0, -30,
   -30,   5,  15,  20,  20,  15,   5, -30,
   -30,   0,  10,  15,  15,  10,   0, -30,
   -40, -20,   0,   0,   0,   0, -20, -40,
   -50, -40, -30, -30, -30, -30, -40, -50,
];

// Bishop PST
const BISHOP_PST: [i32; 64] = [
   -20, -10, -10, -10, -10, -10, -10, -20,
   -10,   5,   0,   0,   0,   0,   5, -10,
   -10,  10,  10,  10,  10,  10,  10, -10,
   -10,   0,  10,  10,  10,  10,   0, -10,
   -10,   5,   5,  10,  10,   5,   5, -10,
   -10,   0,   5,  10,  10,   5,   0, -10,
   -10,   0,   0,   0,   0,   0,   0, -10,
   -20, -10, -10, -10, -10, -10, -10, -20,
];

// Rook PST
const ROOK_PST: [i32; 64] = [
    0,   0,   0,   5,   5,   0,   0,   0,
   -5,   0,   0,   0,   0,   0,   0,  -5,
   -5,   0,   0,   0,   0,   0,   0,  -5,
   -5,   0,   0,   0,   0,   0,   0,  -5,
   -5,   0,   0,   0,   0,   0,   0,  -5,
   -5,   0,   0,   0,   0,   0,   0,  -5,
    5,  10,  10,  10,  10,  10,  10,   5,
    0,   0,   0,   0,   0,   0,   0,   0,
];

// Queen PST
const QUEEN_PST: [i32; 64] = [
   -20, -10, -10,  -5,  -5, -10, -10, -20,
   -10,   0,   5,   0,   0,   0,   0, -10,
   -10,   5,   5,   5,   5,   5,   0, -10,
     0,   0,   5,   5,   5,   5,   0,  -5,
    -5,   0,   5,   5,   5,   5,   0,  -5,
   -10,   0,   5,   5,   5,   5,   0, -10,
   -10,   0,   0,   0,   0,   0,   0, -10,
   -20, -10, -10,  -5,  -5, -10, -10, -20,
];

// King middlegame PST
const KING_MIDDLEGAME_PST: [i32; 64] = [
    20,  30,  10,   0,   0,  10,  30,  20,
    20,  20,   0,   0,   0,   0,  20,  20,
   -10, -20, -20, -20, -20, -20, -20, -10,
   -20, -30, -30, -40, -40, -30, -30, -20,
   -30, -40, -40, -50, -50, -40, -40, -30,
   -30, -40, -40, -50, -50, -40, -40, -30,
   -30, -40, -40, -50, -50, -40, -40, -30,
   -30, -40, -40, -50, -50, -40, -40, -30,
];

// King endgame PST
const KING_ENDGAME_PST: [i32; 64] = [
   -50, -30, -30, -30, -30, -30, -30, -50,
   -30, -30,   0,   0,   0,   0, -30, -30,
   -30, -10,  20,  30,  30,  20, -10, -30,
   -30, -10,  30,  40,  40,  30, -10, -30,
   -30, -10,  30,  40,  40,  30, -10, -30,
   -30, -10,  20,  30,  30,  20, -10, -30,
   -30, -20, -10,   0,   0, -10, -20, -30,
   -50, -40, -30, -20, -20, -30, -40, -50,
];

// ============================================================================
// TAPERED MATERIAL + PST EVALUATOR
// ============================================================================

const BISHOP_PAIR_BONUS: i32 = 50;

/// Game phase weight per piece type; a full board sums to `MAX_PHASE`
const PHASE_WEIGHTS: [i32; 6] = [0, 1, 1, 2, 4, 0];
const MAX_PHASE: i32 = 24;

/// White-relative running sums
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PstAccumulator {
    pub mg: i32,
    pub eg: i32,
    pub phase: i32,
    pub bishops: [u8; 2],
}

impl PstAccumulator {
    #[inline]
    fn add(&mut self, piece: Piece, sq: Square) {
        let (mg, eg) = PstEvaluator::square_value(piece, sq);
        self.mg += mg;
        self.eg += eg;
        self.phase += PHASE_WEIGHTS[piece.piece_type().index()];
        if piece.piece_type() == PieceType::Bishop {
            self.bishops[piece.color().index()] += 1;
        }
    }

    #[inline]
    fn sub(&mut self, piece: Piece, sq: Square) {
        let (mg, eg) = PstEvaluator::square_value(piece, sq);
        self.mg -= mg;
        self.eg -= eg;
        self.phase -= PHASE_WEIGHTS[piece.piece_type().index()];
        if piece.piece_type() == PieceType::Bishop {
            self.bishops[piece.color().index()] -= 1;
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PstEvaluator;

impl PstEvaluator {
    pub fn new() -> Self {
        PstEvaluator
    }

    /// Middlegame and endgame value of `piece` on `sq`, signed for white
    fn square_value(piece: Piece, sq: Square) -> (i32, i32) {
        let idx = match piece.color() {
            Color::White => sq,
            Color::Black => sq ^ 56,
        };

        let (mg, eg) = match piece.piece_type() {
            PieceType::Pawn => (PAWN_PST[idx], PAWN_PST[idx]),
            PieceType::Knight => (KNIGHT_PST[idx], KNIGHT_PST[idx]),
            PieceType::Bishop => (BISHOP_PST[idx], BISHOP_PST[idx]),
            PieceType::Rook => (ROOK_PST[idx], ROOK_PST[idx]),
            PieceType::Queen => (QUEEN_PST[idx], QUEEN_PST[idx]),
            PieceType::King => (KING_MIDDLEGAME_PST[idx], KING_ENDGAME_PST[idx]),
        };
        let material = match piece.piece_type() {
            PieceType::King => 0,
            pt => pt.value(),
        };

        match piece.color() {
            Color::White => (material + mg, material + eg),
            Color::Black => (-(material + mg), -(material + eg)),
        }
    }
}

impl Evaluator for PstEvaluator {
    type Accumulator = PstAccumulator;

    fn reset(&self, pos: &Position) -> PstAccumulator {
        let mut acc = PstAccumulator::default();
        for sq in 0..64 {
            if let Some(piece) = pos.piece_on(sq) {
                acc.add(piece, sq);
            }
        }
        acc
    }

    fn update(&self, pos: &Position, mv: Move, acc: &PstAccumulator) -> PstAccumulator {
        let mut next = *acc;
        let from = mv.from_sq();
        let to = mv.to_sq();
        let Some(piece) = pos.piece_on(from) else {
            debug_assert!(false, "update with empty from square");
            return next;
        };
        let us = piece.color();

        match mv.kind() {
            MoveKind::Normal => {
                if let Some(captured) = pos.piece_on(to) {
                    next.sub(captured, to);
                }
                next.sub(piece, from);
                next.add(piece, to);
            }
            MoveKind::Promotion => {
                if let Some(captured) = pos.piece_on(to) {
                    next.sub(captured, to);
                }
                next.sub(piece, from);
                next.add(Piece::new(mv.promotion_piece(), us), to);
            }
            MoveKind::EnPassant => {
                let captured_sq = match us {
                    Color::White => to - 8,
                    Color::Black => to + 8,
                };
                next.sub(Piece::new(PieceType::Pawn, !us), captured_sq);
                next.sub(piece, from);
                next.add(piece, to);
            }
            MoveKind::Castling => {
                let rank = us.back_rank();
                let kingside = to > from;
                let recorded = if kingside {
                    pos.castling().kingside(us)
                } else {
                    pos.castling().queenside(us)
                };
                let rook_from = recorded.unwrap_or_else(|| make_square(if kingside { 7 } else { 0 }, rank));
                let rook_to = make_square(if kingside { 5 } else { 3 }, rank);
                let rook = Piece::new(PieceType::Rook, us);

                next.sub(piece, from);
                next.sub(rook, rook_from);
                next.add(piece, to);
                next.add(rook, rook_to);
            }
        }

        next
    }

    fn evaluate(&self, acc: &PstAccumulator, side: Color) -> i32 {
        let phase = acc.phase.clamp(0, MAX_PHASE);
        let mut score = (acc.mg * phase + acc.eg * (MAX_PHASE - phase)) / MAX_PHASE;

        if acc.bishops[Color::White.index()] >= 2 {
            score += BISHOP_PAIR_BONUS;
        }
        if acc.bishops[Color::Black.index()] >= 2 {
            score -= BISHOP_PAIR_BONUS;
        }

        match side {
            Color::White => score,
            Color::Black => -score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attacks::AttackTables;
    use crate::move_generator::MoveGenerator;
    use crate::zobrist::ZobristKeys;
    use std::sync::{Arc, OnceLock};

    fn movegen() -> MoveGenerator {
        static TABLES: OnceLock<Arc<AttackTables>> = OnceLock::new();
        MoveGenerator::new(TABLES.get_or_init(|| Arc::new(AttackTables::new())).clone())
    }

    fn pos(fen: &str) -> Position {
        Position::from_fen(fen, Arc::new(ZobristKeys::new())).expect("valid FEN")
    }

    #[test]
    fn start_position_is_balanced() {
        let eval = PstEvaluator::new();
        let p = Position::startpos(Arc::new(ZobristKeys::new()));
        let acc = eval.reset(&p);
        assert_eq!(acc.phase, MAX_PHASE);
        assert_eq!(eval.evaluate(&acc, Color::White), 0);
        assert_eq!(eval.evaluate(&acc, Color::Black), 0);
    }

    #[test]
    fn extra_queen_is_good_for_its_owner() {
        let eval = PstEvaluator::new();
        let acc = eval.reset(&pos("4k3/8/8/8/8/8/8/3QK3 w - - 0 1"));
        assert!(eval.evaluate(&acc, Color::White) > 800);
        assert!(eval.evaluate(&acc, Color::Black) < -800);
    }

    #[test]
    fn incremental_update_matches_reset() {
        // Every move kind occurs somewhere in these positions
        let fens = [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/Pp2P3/2N2Q1p/1PPBBPPP/R3K2R b KQkq a3 0 1",
            "n1n5/PPPk4/8/8/8/8/4Kppp/5N1N b - - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
        ];
        let eval = PstEvaluator::new();
        let mg = movegen();

        for fen in fens {
            let mut p = pos(fen);
            let root = eval.reset(&p);
            for &mv in mg.legal_moves(&mut p).iter() {
                let next = eval.update(&p, mv, &root);
                p.make_move(mv);
                assert_eq!(next, eval.reset(&p), "{fen} {mv}");
                p.unmake_move();
            }
        }
    }

    #[test]
    fn stack_restores_parent() {
        let eval = PstEvaluator::new();
        let mg = movegen();
        let mut p = Position::startpos(Arc::new(ZobristKeys::new()));
        let mut stack = AccumulatorStack::new();
        stack.reset(eval.reset(&p));
        let root = *stack.top().expect("root");

        let mv = mg.parse_uci_move(&mut p, "e2e4").expect("legal");
        let next = eval.update(&p, mv, stack.top().expect("root"));
        stack.push(next);
        p.make_move(mv);
        assert_eq!(stack.len(), 2);

        p.unmake_move();
        stack.pop();
        assert_eq!(stack.len(), 1);
        assert_eq!(*stack.top().expect("root"), root);
    }
}
