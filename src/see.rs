//! OpusChess - Static Exchange Evaluation
//!
//! Decides whether a capture sequence on one square wins at least a given
//! amount of material. Both sides recapture with their least valuable
//! attacker; attackers are removed from a scratch occupancy as they move so
//! sliders behind them are discovered.

use crate::bitboard::*;
use crate::move_generator::MoveGenerator;
use crate::moves::{Move, MoveKind};
use crate::position::Position;
use crate::types::*;

#[inline]
fn value_on(pos: &Position, sq: Square) -> i32 {
    pos.piece_on(sq).map_or(0, |piece| piece.piece_type().value())
}

/// True if `mv` does not lose more than `threshold` material after the best
/// sequence of recaptures on its destination square.
pub fn see(movegen: &MoveGenerator, pos: &Position, mv: Move, threshold: i32) -> bool {
    if matches!(mv.kind(), MoveKind::EnPassant | MoveKind::Castling) {
        return threshold <= 0;
    }

    let from = mv.from_sq();
    let to = mv.to_sq();

    let mut swap = value_on(pos, to) - threshold;
    if swap < 0 {
        return false;
    }

    swap = value_on(pos, from) - swap;
    if swap <= 0 {
        return true;
    }

    let tables = movegen.tables();
    let bishops = pos.pieces(PieceType::Bishop) | pos.pieces(PieceType::Queen);
    let rooks = pos.pieces(PieceType::Rook) | pos.pieces(PieceType::Queen);

    let mut occupied = pos.occupied() ^ square_bb(from) ^ square_bb(to);
    let mut attackers = movegen.attackers_to(pos, to, occupied);
    let mut stm = pos.side_to_move();
    let mut res = 1;

    loop {
        stm = !stm;
        attackers &= occupied;

        let stm_attackers = attackers & pos.colors(stm);
        if stm_attackers == 0 {
            break;
        }

        res ^= 1;

        let Some(attacker) = [
            PieceType::Pawn,
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Rook,
            PieceType::Queen,
        ]
        .into_iter()
        .find(|&pt| stm_attackers & pos.pieces(pt) != 0)
        else {
            // Only the king is left: it may capture only if nothing defends
            return if attackers & !pos.colors(stm) != 0 { res ^ 1 == 1 } else { res == 1 };
        };

        swap = attacker.value() - swap;
        if swap < res {
            break;
        }

        occupied ^= square_bb(lsb(stm_attackers & pos.pieces(attacker)));

        if matches!(attacker, PieceType::Pawn | PieceType::Bishop | PieceType::Queen) {
            attackers |= tables.bishop(to, occupied) & bishops;
        }
        if matches!(attacker, PieceType::Rook | PieceType::Queen) {
            attackers |= tables.rook(to, occupied) & rooks;
        }
    }

    res == 1
}
