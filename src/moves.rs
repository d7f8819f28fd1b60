//! OpusChess - Move Representation Module
//!
//! Moves are packed into 16 bits:
//!
//! | bits  | field                                            |
//! |-------|--------------------------------------------------|
//! | 0-5   | source square                                    |
//! | 6-11  | destination square                               |
//! | 12-13 | kind (normal, en passant, castling, promotion)   |
//! | 14-15 | promotion piece (knight, bishop, rook, queen)    |
//!
//! The all-zero value is the "no move" sentinel. Castling moves are stored
//! king-from to king-destination, which is also how they are written in UCI.

use std::fmt;

use crate::types::*;

/// Kind of a move, stored in bits 12-13
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveKind {
    Normal = 0,
    EnPassant = 1,
    Castling = 2,
    Promotion = 3,
}

/// Packed chess move
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Move(u16);

impl Move {
    pub const NULL: Move = Move(0);

    const KIND_SHIFT: u16 = 12;
    const PROMO_SHIFT: u16 = 14;

    /// Create a move of the given kind. `promotion` is only encoded for
    /// promotion moves and must be a knight, bishop, rook or queen.
    #[inline]
    pub fn new(from: Square, to: Square, kind: MoveKind, promotion: PieceType) -> Self {
        debug_assert!(from < 64 && to < 64);
        let promo_bits = match kind {
            MoveKind::Promotion => {
                debug_assert!(matches!(
                    promotion,
                    PieceType::Knight | PieceType::Bishop | PieceType::Rook | PieceType::Queen
                ));
                (promotion as u16).saturating_sub(1)
            }
            _ => 0,
        };
        Move(
            from as u16
                | (to as u16) << 6
                | (kind as u16) << Self::KIND_SHIFT
                | promo_bits << Self::PROMO_SHIFT,
        )
    }

    /// Create a normal move
    #[inline]
    pub fn normal(from: Square, to: Square) -> Self {
        Move::new(from, to, MoveKind::Normal, PieceType::Knight)
    }

    /// Create a promotion move
    #[inline]
    pub fn promotion(from: Square, to: Square, promotion: PieceType) -> Self {
        Move::new(from, to, MoveKind::Promotion, promotion)
    }

    /// Create a castling move (king source to king destination)
    #[inline]
    pub fn castling(from: Square, to: Square) -> Self {
        Move::new(from, to, MoveKind::Castling, PieceType::Knight)
    }

    /// Create an en passant move
    #[inline]
    pub fn en_passant(from: Square, to: Square) -> Self {
        Move::new(from, to, MoveKind::EnPassant, PieceType::Knight)
    }

    #[inline]
    pub const fn from_raw(raw: u16) -> Self {
        Move(raw)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_sq(self) -> Square {
        (self.0 & 0x3F) as Square
    }

    #[inline]
    pub const fn to_sq(self) -> Square {
        ((self.0 >> 6) & 0x3F) as Square
    }

    #[inline]
    pub const fn kind(self) -> MoveKind {
        match (self.0 >> Self::KIND_SHIFT) & 0b11 {
            0 => MoveKind::Normal,
            1 => MoveKind::EnPassant,
            2 => MoveKind::Castling,
            _ => MoveKind::Promotion,
        }
    }

    /// Promotion piece; only meaningful when `kind()` is `Promotion`
    #[inline]
    pub const fn promotion_piece(self) -> PieceType {
        match (self.0 >> Self::PROMO_SHIFT) & 0b11 {
            0 => PieceType::Knight,
            1 => PieceType::Bishop,
            2 => PieceType::Rook,
            _ => PieceType::Queen,
        }
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_promotion(self) -> bool {
        self.kind() == MoveKind::Promotion
    }

    /// Convert move to UCI notation (e.g., "e2e4", "e7e8q")
    pub fn to_uci(self) -> String {
        if self.is_null() {
            return "0000".to_string();
        }
        let mut uci = format!("{}{}", square_name(self.from_sq()), square_name(self.to_sq()));
        if self.is_promotion() {
            uci.push(match self.promotion_piece() {
                PieceType::Knight => 'n',
                PieceType::Bishop => 'b',
                PieceType::Rook => 'r',
                _ => 'q',
            });
        }
        uci
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci())
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Move({} {:?})", self.to_uci(), self.kind())
    }
}

// ============================================================================
// MOVE LIST
// ============================================================================

pub const MAX_MOVES: usize = 256;

/// Fixed-capacity move buffer filled by the generator
#[derive(Clone)]
pub struct MoveList {
    moves: [Move; MAX_MOVES],
    len: usize,
}

impl MoveList {
    pub fn new() -> Self {
        MoveList { moves: [Move::NULL; MAX_MOVES], len: 0 }
    }

    #[inline]
    pub fn push(&mut self, mv: Move) {
        debug_assert!(self.len < MAX_MOVES);
        self.moves[self.len] = mv;
        self.len += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[inline]
    pub fn as_slice(&self) -> &[Move] {
        &self.moves[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Move> {
        self.as_slice().iter()
    }

    pub fn contains(&self, mv: Move) -> bool {
        self.as_slice().contains(&mv)
    }
}

impl Default for MoveList {
    fn default() -> Self {
        MoveList::new()
    }
}

impl<'a> IntoIterator for &'a MoveList {
    type Item = &'a Move;
    type IntoIter = std::slice::Iter<'a, Move>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Moves paired with ordering scores, consumed best-first
#[derive(Clone)]
pub struct ScoredList {
    entries: [(Move, i32); MAX_MOVES],
    len: usize,
}

impl ScoredList {
    pub fn new() -> Self {
        ScoredList { entries: [(Move::NULL, 0); MAX_MOVES], len: 0 }
    }

    #[inline]
    pub fn push(&mut self, mv: Move, score: i32) {
        debug_assert!(self.len < MAX_MOVES);
        self.entries[self.len] = (mv, score);
        self.len += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Swap the best remaining entry into `index` and return it.
    /// Entries before `index` are left alone.
    #[inline]
    pub fn pick_move(&mut self, index: usize) -> (Move, i32) {
        let mut best = index;
        for i in index + 1..self.len {
            if self.entries[i].1 > self.entries[best].1 {
                best = i;
            }
        }
        self.entries.swap(index, best);
        self.entries[index]
    }
}

impl Default for ScoredList {
    fn default() -> Self {
        ScoredList::new()
    }
}
