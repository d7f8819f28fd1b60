//! OpusChess - Move History Tables
//!
//! Quiet-move statistics used for ordering: a butterfly table indexed by
//! side, from and to, and a continuation table indexed by the previous
//! move's piece and destination and the current move's piece and
//! destination. Entries are saturating-gravity counters bounded by
//! `MAX_HISTORY`.

use crate::types::{Color, Piece, Square};

pub const MAX_HISTORY: i32 = 16384;

/// Gravity update: moves `entry` toward `bonus` and keeps it in range
#[inline]
fn apply_bonus(entry: &mut i16, bonus: i32) {
    let bonus = bonus.clamp(-MAX_HISTORY, MAX_HISTORY);
    let value = *entry as i32;
    *entry = (value + bonus - value * bonus.abs() / MAX_HISTORY) as i16;
}

/// Butterfly history, side x from x to
pub struct QuietHistory {
    table: Vec<[[i16; 64]; 64]>,
}

impl QuietHistory {
    pub fn new() -> Self {
        QuietHistory { table: vec![[[0; 64]; 64]; 2] }
    }

    #[inline]
    pub fn get(&self, color: Color, from: Square, to: Square) -> i32 {
        self.table[color.index()][from][to] as i32
    }

    #[inline]
    pub fn update(&mut self, color: Color, from: Square, to: Square, bonus: i32) {
        apply_bonus(&mut self.table[color.index()][from][to], bonus);
    }

    pub fn clear(&mut self) {
        for side in self.table.iter_mut() {
            *side = [[0; 64]; 64];
        }
    }
}

impl Default for QuietHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Continuation history, (previous piece, previous to) x (piece, to)
pub struct ContinuationHistory {
    table: Vec<i16>,
}

impl ContinuationHistory {
    const SIZE: usize = Piece::COUNT * 64 * Piece::COUNT * 64;

    pub fn new() -> Self {
        ContinuationHistory { table: vec![0; Self::SIZE] }
    }

    #[inline]
    fn slot(prev_piece: Piece, prev_to: Square, piece: Piece, to: Square) -> usize {
        ((prev_piece.index() * 64 + prev_to) * Piece::COUNT + piece.index()) * 64 + to
    }

    #[inline]
    pub fn get(&self, prev_piece: Piece, prev_to: Square, piece: Piece, to: Square) -> i32 {
        self.table[Self::slot(prev_piece, prev_to, piece, to)] as i32
    }

    #[inline]
    pub fn update(&mut self, prev_piece: Piece, prev_to: Square, piece: Piece, to: Square, bonus: i32) {
        apply_bonus(&mut self.table[Self::slot(prev_piece, prev_to, piece, to)], bonus);
    }

    pub fn clear(&mut self) {
        self.table.fill(0);
    }
}

impl Default for ContinuationHistory {
    fn default() -> Self {
        Self::new()
    }
}
