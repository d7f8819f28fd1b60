//! OpusChess - Bitboard Module
//!
//! This module provides bitboard utilities for fast move generation.
//! A bitboard is a 64-bit integer where each bit represents a square on the board.
//! The slow ray-casting slider attacks defined here are the reference the
//! magic tables in `attacks` are built and tested against.

use crate::types::Square;

// ============================================================================
// CONSTANTS - Files and Ranks
// ============================================================================

pub const FILE_A: u64 = 0x0101010101010101;
pub const FILE_H: u64 = 0x8080808080808080;

pub const RANK_1: u64 = 0x00000000000000FF;
pub const RANK_8: u64 = 0xFF00000000000000;

pub const NOT_FILE_A: u64 = !FILE_A;
pub const NOT_FILE_H: u64 = !FILE_H;

/// Light squares (b1, d1, ..., a2, ...); dark squares are the complement
pub const LIGHT_SQUARES: u64 = 0x55AA55AA55AA55AA;

// ============================================================================
// BITBOARD UTILITIES
// ============================================================================

/// Extract and clear the least significant bit, returning its index
#[inline]
pub fn pop_lsb(bb: &mut u64) -> Square {
    let idx = bb.trailing_zeros() as Square;
    *bb &= *bb - 1;
    idx
}

/// Count the number of set bits in a bitboard
#[inline]
pub fn popcount(bb: u64) -> u32 {
    bb.count_ones()
}

/// Get the index of the least significant bit
#[inline]
pub fn lsb(bb: u64) -> Square {
    bb.trailing_zeros() as Square
}

/// Create a bitboard with a single bit set at the given square
#[inline]
pub const fn square_bb(sq: Square) -> u64 {
    1u64 << sq
}

/// Get the bitboard for a rank (0-7)
#[inline]
pub const fn rank_bb(rank: usize) -> u64 {
    RANK_1 << (rank * 8)
}

/// Shift a bitboard north (up) by one rank
#[inline]
pub const fn shift_north(bb: u64) -> u64 {
    bb << 8
}

/// Shift a bitboard south (down) by one rank
#[inline]
pub const fn shift_south(bb: u64) -> u64 {
    bb >> 8
}

/// Shift a bitboard east (right) by one file
#[inline]
pub const fn shift_east(bb: u64) -> u64 {
    (bb << 1) & NOT_FILE_A
}

/// Shift a bitboard west (left) by one file
#[inline]
pub const fn shift_west(bb: u64) -> u64 {
    (bb >> 1) & NOT_FILE_H
}

/// Squares strictly between two squares on a shared rank.
/// Castling is the only caller, so only the horizontal case is needed.
#[inline]
pub fn between_on_rank(a: Square, b: Square) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    if hi - lo < 2 {
        return 0;
    }
    // bits lo+1 ..= hi-1
    (square_bb(hi) - 1) & !((square_bb(lo) << 1) - 1)
}

/// Inclusive span between two squares on a shared rank
#[inline]
pub fn span_on_rank(a: Square, b: Square) -> u64 {
    between_on_rank(a, b) | square_bb(a) | square_bb(b)
}

// ============================================================================
// SLIDING PIECE ATTACKS (ray casting reference)
// ============================================================================

/// Rook attacks from a square given occupied squares, computed ray by ray
pub fn rook_rays(sq: Square, occupied: u64) -> u64 {
    let mut attacks = 0u64;

    // North
    let mut current = sq;
    while current < 56 {
        current += 8;
        attacks |= 1u64 << current;
        if (1u64 << current) & occupied != 0 {
            break;
        }
    }

    // South
    current = sq;
    while current >= 8 {
        current -= 8;
        attacks |= 1u64 << current;
        if (1u64 << current) & occupied != 0 {
            break;
        }
    }

    // East
    current = sq;
    while current % 8 < 7 {
        current += 1;
        attacks |= 1u64 << current;
        if (1u64 << current) & occupied != 0 {
            break;
        }
    }

    // West
    current = sq;
    while current % 8 > 0 {
        current -= 1;
        attacks |= 1u64 << current;
        if (1u64 << current) & occupied != 0 {
            break;
        }
    }

    attacks
}

/// Bishop attacks from a square given occupied squares, computed ray by ray
pub fn bishop_rays(sq: Square, occupied: u64) -> u64 {
    let mut attacks = 0u64;
    let file = sq % 8;
    let rank = sq / 8;

    for (df, dr) in [(1i32, 1i32), (-1, 1), (1, -1), (-1, -1)] {
        let mut f = file as i32;
        let mut r = rank as i32;
        loop {
            f += df;
            r += dr;
            if !(0..8).contains(&f) || !(0..8).contains(&r) {
                break;
            }
            let target = (r * 8 + f) as usize;
            attacks |= 1u64 << target;
            if (1u64 << target) & occupied != 0 {
                break;
            }
        }
    }

    attacks
}

/// Render a bitboard as an 8x8 grid, rank 8 on top
pub fn bitboard_to_string(bb: u64) -> String {
    let mut out = String::with_capacity(8 * 17);
    for rank in (0..8).rev() {
        for file in 0..8 {
            let sq = rank * 8 + file;
            out.push(if bb & square_bb(sq) != 0 { '1' } else { '.' });
            if file < 7 {
                out.push(' ');
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    #[test]
    fn shifts_do_not_wrap_files() {
        assert_eq!(shift_east(FILE_H), 0);
        assert_eq!(shift_west(FILE_A), 0);
        assert_eq!(shift_north(RANK_8), 0);
        assert_eq!(shift_south(RANK_1), 0);
        assert_eq!(shift_east(square_bb(E1)), square_bb(F1));
    }

    #[test]
    fn between_squares_on_rank() {
        assert_eq!(between_on_rank(E1, H1), square_bb(F1) | square_bb(G1));
        assert_eq!(between_on_rank(E1, A1), square_bb(B1) | square_bb(C1) | square_bb(D1));
        assert_eq!(between_on_rank(E1, F1), 0);
        assert_eq!(span_on_rank(E8, G8), square_bb(E8) | square_bb(F8) | square_bb(G8));
    }

    #[test]
    fn rays_stop_at_blockers() {
        // Rook on a1 with a blocker on a4: a2, a3, a4 and the whole first rank
        let attacks = rook_rays(A1, square_bb(24));
        assert_eq!(attacks, (RANK_1 & !square_bb(A1)) | square_bb(8) | square_bb(16) | square_bb(24));

        // Bishop on d4 on an empty board sees 13 squares
        assert_eq!(popcount(bishop_rays(27, 0)), 13);
    }

    #[test]
    fn light_squares_mask() {
        assert_eq!(LIGHT_SQUARES & square_bb(A1), 0);
        assert_ne!(LIGHT_SQUARES & square_bb(H1), 0);
        assert_eq!(popcount(LIGHT_SQUARES), 32);
    }

    #[test]
    fn grid_rendering() {
        let grid = bitboard_to_string(square_bb(A1));
        assert!(grid.ends_with("1 . . . . . . .\n"));
        assert_eq!(grid.lines().count(), 8);
    }
}
