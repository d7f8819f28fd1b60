//! OpusChess - Move Generation Module
//!
//! This module generates pseudo-legal moves from bitboards: jump tables for
//! kings and knights, shifted pawn sets, and magic lookups for sliders.
//! Legality is settled by the caller, which makes the move and checks that
//! the mover's king is not attacked. `legal_moves` does exactly that for
//! callers outside the search.

use std::sync::Arc;

use crate::attacks::AttackTables;
use crate::bitboard::*;
use crate::error::MoveParseError;
use crate::moves::{Move, MoveList};
use crate::position::Position;
use crate::types::*;

/// Promotion pieces, best first
const PROMOTIONS: [PieceType; 4] = [PieceType::Queen, PieceType::Knight, PieceType::Rook, PieceType::Bishop];

/// Non-pawn piece types in generation order
const PIECE_TYPES: [PieceType; 5] = [
    PieceType::Knight,
    PieceType::Bishop,
    PieceType::Rook,
    PieceType::Queen,
    PieceType::King,
];

#[derive(Clone)]
pub struct MoveGenerator {
    tables: Arc<AttackTables>,
}

impl MoveGenerator {
    pub fn new(tables: Arc<AttackTables>) -> Self {
        MoveGenerator { tables }
    }

    #[inline]
    pub fn tables(&self) -> &AttackTables {
        &self.tables
    }

    /// All pseudo-legal moves
    pub fn generate_all_moves(&self, pos: &Position, list: &mut MoveList) {
        self.generate(pos, list, true);
    }

    /// Pseudo-legal captures, including capturing promotions and en passant
    pub fn generate_captures(&self, pos: &Position, list: &mut MoveList) {
        self.generate(pos, list, false);
    }

    fn generate(&self, pos: &Position, list: &mut MoveList, quiets: bool) {
        list.clear();
        let us = pos.side_to_move();
        let own = pos.colors(us);
        let them = pos.colors(!us);
        let occupied = own | them;
        let targets = if quiets { !own } else { them };

        self.generate_pawn_moves(pos, list, quiets);
        self.generate_en_passant(pos, list);

        for piece_type in PIECE_TYPES {
            let mut pieces = pos.pieces_of(piece_type, us);
            while pieces != 0 {
                let from = pop_lsb(&mut pieces);
                let mut moves = self.tables.piece(piece_type, from, occupied) & targets;
                while moves != 0 {
                    list.push(Move::normal(from, pop_lsb(&mut moves)));
                }
            }
        }

        if quiets {
            self.generate_castles(pos, list);
        }
    }

    fn generate_pawn_moves(&self, pos: &Position, list: &mut MoveList, quiets: bool) {
        let us = pos.side_to_move();
        let pawns = pos.pieces_of(PieceType::Pawn, us);
        let them = pos.colors(!us);
        let empty = !pos.occupied();

        let forward_shift: fn(u64) -> u64 = match us {
            Color::White => shift_north,
            Color::Black => shift_south,
        };
        let push = forward_shift(pawns) & empty;
        let double = forward_shift(forward_shift(pawns & rank_bb(us.pawn_rank())) & empty) & empty;
        let left = shift_west(forward_shift(pawns)) & them;
        let right = shift_east(forward_shift(pawns)) & them;
        let promo_rank = rank_bb((!us).back_rank());

        // Offsets from source to destination
        let forward: i32 = if us == Color::White { 8 } else { -8 };
        let left_offset: i32 = if us == Color::White { 7 } else { -9 };
        let right_offset: i32 = if us == Color::White { 9 } else { -7 };

        push_pawn_moves(list, left, left_offset, promo_rank, true);
        push_pawn_moves(list, right, right_offset, promo_rank, true);

        if quiets {
            push_pawn_moves(list, push, forward, promo_rank, true);
            push_pawn_moves(list, double, 2 * forward, promo_rank, false);
        }
    }

    fn generate_en_passant(&self, pos: &Position, list: &mut MoveList) {
        let Some(ep) = pos.en_passant() else {
            return;
        };
        let us = pos.side_to_move();
        // Pawns of ours that attack the target are the squares an enemy pawn on it would attack
        let mut capturers = self.tables.pawn(!us, ep) & pos.pieces_of(PieceType::Pawn, us);
        while capturers != 0 {
            list.push(Move::en_passant(pop_lsb(&mut capturers), ep));
        }
    }

    fn generate_castles(&self, pos: &Position, list: &mut MoveList) {
        let us = pos.side_to_move();
        let king = pos.king_square(us);
        let rank = us.back_rank();
        let occupied = pos.occupied();
        let rook = Some(Piece::new(PieceType::Rook, us));

        if self.is_square_attacked(pos, king, !us) {
            return;
        }

        let sides = [
            (pos.castling().kingside(us), 6, 5),
            (pos.castling().queenside(us), 2, 3),
        ];

        'sides: for (rook_from, king_file, rook_file) in sides {
            let Some(rook_from) = rook_from else {
                continue;
            };
            if pos.piece_on(rook_from) != rook {
                continue;
            }

            let king_to = make_square(king_file, rank);
            let rook_to = make_square(rook_file, rank);
            let movers = square_bb(king) | square_bb(rook_from);
            let must_be_empty = (between_on_rank(king, rook_from)
                | span_on_rank(king, king_to)
                | span_on_rank(rook_from, rook_to))
                & !movers;
            if occupied & must_be_empty != 0 {
                continue;
            }

            let mut path = span_on_rank(king, king_to) & !square_bb(king);
            while path != 0 {
                if self.is_square_attacked(pos, pop_lsb(&mut path), !us) {
                    continue 'sides;
                }
            }

            list.push(Move::castling(king, king_to));
        }
    }

    // ========================================================================
    // ATTACK DETECTION
    // ========================================================================

    /// Check if a square is attacked by any piece of the given color
    pub fn is_square_attacked(&self, pos: &Position, sq: Square, by: Color) -> bool {
        let t = &self.tables;
        let occupied = pos.occupied();
        let queens = pos.pieces_of(PieceType::Queen, by);

        t.pawn(!by, sq) & pos.pieces_of(PieceType::Pawn, by) != 0
            || t.knight(sq) & pos.pieces_of(PieceType::Knight, by) != 0
            || t.king(sq) & pos.pieces_of(PieceType::King, by) != 0
            || t.bishop(sq, occupied) & (pos.pieces_of(PieceType::Bishop, by) | queens) != 0
            || t.rook(sq, occupied) & (pos.pieces_of(PieceType::Rook, by) | queens) != 0
    }

    /// Pieces of both colors attacking `sq` under the given occupancy
    pub fn attackers_to(&self, pos: &Position, sq: Square, occupied: u64) -> u64 {
        let t = &self.tables;
        let queens = pos.pieces(PieceType::Queen);

        (t.pawn(Color::Black, sq) & pos.pieces_of(PieceType::Pawn, Color::White))
            | (t.pawn(Color::White, sq) & pos.pieces_of(PieceType::Pawn, Color::Black))
            | (t.knight(sq) & pos.pieces(PieceType::Knight))
            | (t.king(sq) & pos.pieces(PieceType::King))
            | (t.bishop(sq, occupied) & (pos.pieces(PieceType::Bishop) | queens))
            | (t.rook(sq, occupied) & (pos.pieces(PieceType::Rook) | queens))
    }

    /// Whether the king of `color` is attacked
    #[inline]
    pub fn in_check(&self, pos: &Position, color: Color) -> bool {
        self.is_square_attacked(pos, pos.king_square(color), !color)
    }

    // ========================================================================
    // LEGAL MOVES
    // ========================================================================

    /// Fully legal moves, filtered by make/test/unmake
    pub fn legal_moves(&self, pos: &mut Position) -> MoveList {
        let mut pseudo = MoveList::new();
        self.generate_all_moves(pos, &mut pseudo);

        let us = pos.side_to_move();
        let mut legal = MoveList::new();
        for &mv in pseudo.iter() {
            pos.make_move(mv);
            if !self.in_check(pos, us) {
                legal.push(mv);
            }
            pos.unmake_move();
        }
        legal
    }

    /// Parse a move in coordinate notation ("e2e4", "e7e8q", castling as
    /// king from/to) and check it is legal in `pos`.
    pub fn parse_uci_move(&self, pos: &mut Position, text: &str) -> Result<Move, MoveParseError> {
        let malformed = || MoveParseError::Malformed(text.to_string());

        if !text.is_ascii() || !(4..=5).contains(&text.len()) {
            return Err(malformed());
        }
        let from = parse_square(&text[0..2]).ok_or_else(malformed)?;
        let to = parse_square(&text[2..4]).ok_or_else(malformed)?;
        let promotion = match text.as_bytes().get(4) {
            None => None,
            Some(b'q') => Some(PieceType::Queen),
            Some(b'r') => Some(PieceType::Rook),
            Some(b'b') => Some(PieceType::Bishop),
            Some(b'n') => Some(PieceType::Knight),
            Some(_) => return Err(malformed()),
        };

        self.legal_moves(pos)
            .iter()
            .copied()
            .find(|mv| {
                mv.from_sq() == from
                    && mv.to_sq() == to
                    && match promotion {
                        Some(piece) => mv.is_promotion() && mv.promotion_piece() == piece,
                        None => !mv.is_promotion(),
                    }
            })
            .ok_or_else(|| MoveParseError::Illegal(text.to_string()))
    }
}

fn push_pawn_moves(list: &mut MoveList, mut targets: u64, offset: i32, promo_rank: u64, may_promote: bool) {
    while targets != 0 {
        let to = pop_lsb(&mut targets);
        let from = (to as i32 - offset) as Square;
        if may_promote && square_bb(to) & promo_rank != 0 {
            for piece in PROMOTIONS {
                list.push(Move::promotion(from, to, piece));
            }
        } else {
            list.push(Move::normal(from, to));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::STARTING_FEN;
    use crate::zobrist::ZobristKeys;
    use std::sync::OnceLock;

    fn movegen() -> MoveGenerator {
        static TABLES: OnceLock<Arc<AttackTables>> = OnceLock::new();
        MoveGenerator::new(TABLES.get_or_init(|| Arc::new(AttackTables::new())).clone())
    }

    fn pos(fen: &str) -> Position {
        Position::from_fen(fen, Arc::new(ZobristKeys::new())).expect("valid FEN")
    }

    fn uci_set(list: &MoveList) -> Vec<String> {
        let mut moves: Vec<String> = list.iter().map(|m| m.to_uci()).collect();
        moves.sort();
        moves
    }

    #[test]
    fn start_position_has_twenty_moves() {
        let mg = movegen();
        let mut p = pos(STARTING_FEN);
        assert_eq!(mg.legal_moves(&mut p).len(), 20);

        let mut captures = MoveList::new();
        mg.generate_captures(&p, &mut captures);
        assert!(captures.is_empty());
    }

    #[test]
    fn captures_only_mode() {
        let mg = movegen();
        let p = pos("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1");
        let mut captures = MoveList::new();
        mg.generate_captures(&p, &mut captures);
        assert_eq!(uci_set(&captures), vec!["e4d5"]);
    }

    #[test]
    fn promotions_generate_four_pieces() {
        let mg = movegen();
        let mut p = pos("1n2k3/P7/8/8/8/8/8/4K3 w - - 0 1");
        let legal = mg.legal_moves(&mut p);
        let promos: Vec<String> = uci_set(&legal).into_iter().filter(|m| m.len() == 5).collect();
        assert_eq!(promos, vec!["a7a8b", "a7a8n", "a7a8q", "a7a8r", "a7b8b", "a7b8n", "a7b8q", "a7b8r"]);
    }

    #[test]
    fn en_passant_candidates() {
        let mg = movegen();
        let p = pos("4k3/8/8/2PpP3/8/8/8/4K3 w - d6 0 1");
        let mut captures = MoveList::new();
        mg.generate_captures(&p, &mut captures);
        assert_eq!(uci_set(&captures), vec!["c5d6", "e5d6"]);
        assert!(captures.iter().all(|m| m.kind() == crate::moves::MoveKind::EnPassant));
    }

    #[test]
    fn castling_blocked_by_attack_and_pieces() {
        let mg = movegen();
        let mut list = MoveList::new();

        let p = pos("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        mg.generate_all_moves(&p, &mut list);
        assert!(list.contains(Move::castling(E1, G1)));
        assert!(list.contains(Move::castling(E1, C1)));

        // f1 attacked by the rook on f8
        let p = pos("r3kr2/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        mg.generate_all_moves(&p, &mut list);
        assert!(!list.contains(Move::castling(E1, G1)));
        assert!(list.contains(Move::castling(E1, C1)));

        // b1 occupied blocks the queenside even though the king never crosses it
        let p = pos("r3k2r/8/8/8/8/8/8/RN2K2R w KQ - 0 1");
        mg.generate_all_moves(&p, &mut list);
        assert!(!list.contains(Move::castling(E1, C1)));

        // no castling out of check
        let p = pos("4k3/4r3/8/8/8/8/8/R3K2R w KQ - 0 1");
        mg.generate_all_moves(&p, &mut list);
        assert!(!list.iter().any(|m| m.kind() == crate::moves::MoveKind::Castling));
    }

    #[test]
    fn attack_detection() {
        let mg = movegen();
        let p = pos("4k3/8/8/8/8/8/3p4/4K3 w - - 0 1");
        assert!(mg.in_check(&p, Color::White));
        assert!(mg.is_square_attacked(&p, 2, Color::Black));
        assert!(!mg.is_square_attacked(&p, 11, Color::Black));

        let p = pos("4k3/8/8/8/8/8/8/R3K3 w - - 0 1");
        assert!(mg.is_square_attacked(&p, A8, Color::White));
        assert!(!mg.in_check(&p, Color::Black));
        let attackers = mg.attackers_to(&p, A8, p.occupied());
        assert_eq!(attackers, square_bb(A1));
    }

    #[test]
    fn parses_coordinate_moves() {
        let mg = movegen();
        let mut p = pos("1r2k2r/P7/8/8/8/8/8/R3K2R w KQk - 0 1");
        assert_eq!(mg.parse_uci_move(&mut p, "e1g1"), Ok(Move::castling(E1, G1)));
        assert_eq!(mg.parse_uci_move(&mut p, "a7b8n"), Ok(Move::promotion(48, B8, PieceType::Knight)));
        assert_eq!(mg.parse_uci_move(&mut p, "e1e3"), Err(MoveParseError::Illegal("e1e3".into())));
        assert_eq!(mg.parse_uci_move(&mut p, "a7a8"), Err(MoveParseError::Illegal("a7a8".into())));
        assert_eq!(mg.parse_uci_move(&mut p, "z9a1"), Err(MoveParseError::Malformed("z9a1".into())));
        assert_eq!(mg.parse_uci_move(&mut p, "e2"), Err(MoveParseError::Malformed("e2".into())));
        assert_eq!(p.to_fen(), "1r2k2r/P7/8/8/8/8/8/R3K2R w KQk - 0 1");
    }
}
