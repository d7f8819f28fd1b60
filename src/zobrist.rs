//! OpusChess - Zobrist Hashing Module
//!
//! Random keys for incremental position hashing. A hash is the XOR of one key
//! per (piece, square), the castling-rights key for the current rights mask,
//! the en passant file key when an en passant square is set, and the side key
//! when black is to move. The key set is built once and shared by reference
//! between positions.

use rand::prelude::*;

use crate::types::*;

/// Default seed, so hashes are reproducible between runs
pub const ZOBRIST_SEED: u64 = 12345;

pub struct ZobristKeys {
    piece_square: [[u64; 64]; Piece::COUNT],
    castling: [u64; 16],
    en_passant: [u64; 8],
    side: u64,
}

impl ZobristKeys {
    pub fn new() -> Self {
        ZobristKeys::with_seed(ZOBRIST_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut piece_square = [[0u64; 64]; Piece::COUNT];
        for keys in piece_square.iter_mut() {
            for key in keys.iter_mut() {
                *key = rng.gen();
            }
        }

        let mut castling = [0u64; 16];
        for key in castling.iter_mut() {
            *key = rng.gen();
        }

        let mut en_passant = [0u64; 8];
        for key in en_passant.iter_mut() {
            *key = rng.gen();
        }

        let side = rng.gen();

        ZobristKeys { piece_square, castling, en_passant, side }
    }

    #[inline]
    pub fn piece(&self, piece: Piece, sq: Square) -> u64 {
        self.piece_square[piece.index()][sq]
    }

    /// Key for a 4-bit castling rights mask
    #[inline]
    pub fn castling(&self, mask: usize) -> u64 {
        self.castling[mask & 15]
    }

    #[inline]
    pub fn en_passant(&self, sq: Square) -> u64 {
        self.en_passant[file_of(sq)]
    }

    #[inline]
    pub fn side(&self) -> u64 {
        self.side
    }
}

impl Default for ZobristKeys {
    fn default() -> Self {
        ZobristKeys::new()
    }
}
