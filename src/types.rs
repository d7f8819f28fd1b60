//! OpusChess - Type definitions and constants
//!
//! This module provides the core type definitions and constants for
//! representing chess pieces, colors, squares and basic operations.
//! A `Piece` packs its type and color as `type * 2 + color` so that it can
//! index flat tables directly.

use std::ops::Not;

/// Squares are plain indices, a1 = 0, b1 = 1, ..., h8 = 63.
pub type Square = usize;

/// Named squares used by castling and tests
pub const A1: Square = 0;
pub const B1: Square = 1;
pub const C1: Square = 2;
pub const D1: Square = 3;
pub const E1: Square = 4;
pub const F1: Square = 5;
pub const G1: Square = 6;
pub const H1: Square = 7;
pub const A8: Square = 56;
pub const B8: Square = 57;
pub const C8: Square = 58;
pub const D8: Square = 59;
pub const E8: Square = 60;
pub const F8: Square = 61;
pub const G8: Square = 62;
pub const H8: Square = 63;

/// File and rank names for UCI notation
pub const FILE_NAMES: &[u8; 8] = b"abcdefgh";
pub const RANK_NAMES: &[u8; 8] = b"12345678";

// ============================================================================
// COLOR
// ============================================================================

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    White = 0,
    Black = 1,
}

impl Color {
    pub const ALL: [Color; 2] = [Color::White, Color::Black];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Rank a pawn of this color must be on to push two squares
    #[inline]
    pub const fn pawn_rank(self) -> usize {
        match self {
            Color::White => 1,
            Color::Black => 6,
        }
    }

    /// Rank the pieces of this color start on
    #[inline]
    pub const fn back_rank(self) -> usize {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }
}

impl Not for Color {
    type Output = Color;

    #[inline]
    fn not(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

// ============================================================================
// PIECE TYPE
// ============================================================================

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PieceType {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

impl PieceType {
    pub const ALL: [PieceType; 6] = [
        PieceType::Pawn,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
        PieceType::King,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn value(self) -> i32 {
        PIECE_VALUES[self as usize]
    }
}

/// Material value of each piece type, in centipawns
pub const PIECE_VALUES: [i32; 6] = [
    100,    // PAWN
    320,    // KNIGHT
    330,    // BISHOP
    500,    // ROOK
    900,    // QUEEN
    20000,  // KING
];

// ============================================================================
// PIECE
// ============================================================================

/// A colored piece, encoded as `type * 2 + color`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Piece(u8);

impl Piece {
    pub const COUNT: usize = 12;

    #[inline]
    pub const fn new(piece_type: PieceType, color: Color) -> Self {
        Piece(piece_type as u8 * 2 + color as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn color(self) -> Color {
        if self.0 & 1 == 0 { Color::White } else { Color::Black }
    }

    #[inline]
    pub fn piece_type(self) -> PieceType {
        match self.0 >> 1 {
            0 => PieceType::Pawn,
            1 => PieceType::Knight,
            2 => PieceType::Bishop,
            3 => PieceType::Rook,
            4 => PieceType::Queen,
            _ => PieceType::King,
        }
    }

    /// FEN piece character to piece
    pub fn from_fen_char(c: char) -> Option<Self> {
        let color = if c.is_ascii_uppercase() { Color::White } else { Color::Black };
        let piece_type = match c.to_ascii_lowercase() {
            'p' => PieceType::Pawn,
            'n' => PieceType::Knight,
            'b' => PieceType::Bishop,
            'r' => PieceType::Rook,
            'q' => PieceType::Queen,
            'k' => PieceType::King,
            _ => return None,
        };
        Some(Piece::new(piece_type, color))
    }

    /// Piece to FEN character
    pub fn to_fen_char(self) -> char {
        let c = match self.piece_type() {
            PieceType::Pawn => 'p',
            PieceType::Knight => 'n',
            PieceType::Bishop => 'b',
            PieceType::Rook => 'r',
            PieceType::Queen => 'q',
            PieceType::King => 'k',
        };
        match self.color() {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }
}

// ============================================================================
// SQUARE HELPERS
// ============================================================================

/// Get the file (0-7) of a square
#[inline]
pub const fn file_of(sq: Square) -> usize {
    sq & 7
}

/// Get the rank (0-7) of a square
#[inline]
pub const fn rank_of(sq: Square) -> usize {
    sq >> 3
}

#[inline]
pub const fn make_square(file: usize, rank: usize) -> Square {
    rank * 8 + file
}

/// Convert square index (0-63) to algebraic notation (e.g., "e4")
pub fn square_name(sq: Square) -> String {
    format!(
        "{}{}",
        FILE_NAMES[file_of(sq)] as char,
        RANK_NAMES[rank_of(sq)] as char
    )
}

/// Convert algebraic notation to square index
pub fn parse_square(name: &str) -> Option<Square> {
    let bytes = name.as_bytes();
    if bytes.len() != 2 {
        return None;
    }

    let file = match bytes[0] {
        b'a'..=b'h' => (bytes[0] - b'a') as usize,
        _ => return None,
    };

    let rank = match bytes[1] {
        b'1'..=b'8' => (bytes[1] - b'1') as usize,
        _ => return None,
    };

    Some(make_square(file, rank))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_packs_type_and_color() {
        for pt in PieceType::ALL {
            for color in Color::ALL {
                let piece = Piece::new(pt, color);
                assert_eq!(piece.index(), pt.index() * 2 + color.index());
                assert_eq!(piece.piece_type(), pt);
                assert_eq!(piece.color(), color);
            }
        }
    }

    #[test]
    fn fen_chars_map_both_ways() {
        for c in "PNBRQKpnbrqk".chars() {
            let piece = Piece::from_fen_char(c).expect("valid piece char");
            assert_eq!(piece.to_fen_char(), c);
        }
        assert!(Piece::from_fen_char('x').is_none());
    }

    #[test]
    fn square_names() {
        assert_eq!(square_name(A1), "a1");
        assert_eq!(square_name(H8), "h8");
        assert_eq!(parse_square("e4"), Some(28));
        assert_eq!(parse_square("i1"), None);
        assert_eq!(parse_square("e44"), None);
    }
}
