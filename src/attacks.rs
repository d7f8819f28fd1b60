//! OpusChess - Attack Tables Module
//!
//! Precomputed attack sets for every piece type. King, knight and pawn
//! attacks are plain 64-entry tables. Rook and bishop attacks use magic
//! bitboards: the relevant occupancy under a per-square mask is multiplied by
//! a magic constant and the top bits of the product index a dense table.
//!
//! Magic constants are found at construction time by a seeded random search,
//! so building an `AttackTables` is a one-time startup cost. Consumers hold
//! the tables behind an `Arc` and never mutate them.

use rand::prelude::*;
use tracing::debug;

use crate::bitboard::*;
use crate::types::*;

/// Index width of each rook table (large enough for any square)
pub const ROOK_BITS: u32 = 12;
/// Index width of each bishop table
pub const BISHOP_BITS: u32 = 9;
/// Seed of the magic-number search
pub const MAGIC_SEED: u64 = 42;

const KNIGHT_DELTAS: [(i8, i8); 8] = [(2, 1), (2, -1), (1, 2), (1, -2), (-1, 2), (-1, -2), (-2, 1), (-2, -1)];
const KING_DELTAS: [(i8, i8); 8] = [(0, 1), (1, 1), (1, 0), (1, -1), (0, -1), (-1, -1), (-1, 0), (-1, 1)];

// ============================================================================
// MAGIC SLIDER TABLE
// ============================================================================

#[derive(Clone, Copy, Default)]
struct Magic {
    mask: u64,
    magic: u64,
}

/// Dense attack table for one slider type, `1 << bits` slots per square
struct MagicTable {
    magics: [Magic; 64],
    attacks: Vec<u64>,
    bits: u32,
}

impl MagicTable {
    fn build(bits: u32, mask_of: fn(Square) -> u64, rays: fn(Square, u64) -> u64, rng: &mut StdRng) -> Self {
        let size = 1usize << bits;
        let mut table = MagicTable {
            magics: [Magic::default(); 64],
            attacks: vec![0; 64 * size],
            bits,
        };

        let mut occupancies = Vec::with_capacity(size);
        let mut references = Vec::with_capacity(size);
        let mut stamp = vec![0u32; size];
        let mut slots = vec![0u64; size];
        let mut attempt = 0u32;

        for sq in 0..64 {
            let mask = mask_of(sq);

            // Carry-rippler walk over every subset of the mask
            occupancies.clear();
            references.clear();
            let mut subset = 0u64;
            loop {
                occupancies.push(subset);
                references.push(rays(sq, subset));
                subset = subset.wrapping_sub(mask) & mask;
                if subset == 0 {
                    break;
                }
            }

            let magic = loop {
                let candidate = rng.gen::<u64>() & rng.gen::<u64>() & rng.gen::<u64>();
                if (mask.wrapping_mul(candidate) & RANK_8).count_ones() < 6 {
                    continue;
                }

                attempt += 1;
                let fits = occupancies.iter().zip(&references).all(|(&occ, &reference)| {
                    let idx = (occ.wrapping_mul(candidate) >> (64 - bits)) as usize;
                    if stamp[idx] != attempt {
                        stamp[idx] = attempt;
                        slots[idx] = reference;
                        true
                    } else {
                        slots[idx] == reference
                    }
                });

                if fits {
                    break candidate;
                }
            };

            table.magics[sq] = Magic { mask, magic };
            for (&occ, &reference) in occupancies.iter().zip(&references) {
                let idx = table.index(sq, occ);
                table.attacks[idx] = reference;
            }
        }

        table
    }

    #[inline]
    fn index(&self, sq: Square, occupied: u64) -> usize {
        let entry = &self.magics[sq];
        let hashed = ((occupied & entry.mask).wrapping_mul(entry.magic) >> (64 - self.bits)) as usize;
        (sq << self.bits) + hashed
    }

    #[inline]
    fn attacks(&self, sq: Square, occupied: u64) -> u64 {
        self.attacks[self.index(sq, occupied)]
    }
}

/// Relevant rook occupancy: rays from the square, excluding board edges
fn rook_mask(sq: Square) -> u64 {
    let file = file_of(sq);
    let rank = rank_of(sq);
    let mut mask = 0u64;
    for r in 1..7 {
        if r != rank {
            mask |= square_bb(make_square(file, r));
        }
    }
    for f in 1..7 {
        if f != file {
            mask |= square_bb(make_square(f, rank));
        }
    }
    mask
}

/// Relevant bishop occupancy: diagonal rays, excluding board edges
fn bishop_mask(sq: Square) -> u64 {
    let edges = RANK_1 | RANK_8 | FILE_A | FILE_H;
    bishop_rays(sq, 0) & !edges
}

// ============================================================================
// ATTACK TABLES
// ============================================================================

pub struct AttackTables {
    knight: [u64; 64],
    king: [u64; 64],
    pawn: [[u64; 64]; 2],
    rook: MagicTable,
    bishop: MagicTable,
}

impl AttackTables {
    pub fn new() -> Self {
        AttackTables::with_seed(MAGIC_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        let mut knight = [0u64; 64];
        let mut king = [0u64; 64];
        let mut pawn = [[0u64; 64]; 2];

        for sq in 0..64 {
            let from_rank = rank_of(sq) as i8;
            let from_file = file_of(sq) as i8;

            for (deltas, table) in [(&KNIGHT_DELTAS, &mut knight), (&KING_DELTAS, &mut king)] {
                for &(delta_rank, delta_file) in deltas {
                    let to_rank = from_rank + delta_rank;
                    let to_file = from_file + delta_file;
                    if (0..8).contains(&to_rank) && (0..8).contains(&to_file) {
                        table[sq] |= square_bb(make_square(to_file as usize, to_rank as usize));
                    }
                }
            }

            let bb = square_bb(sq);
            pawn[Color::White.index()][sq] = ((bb & NOT_FILE_A) << 7) | ((bb & NOT_FILE_H) << 9);
            pawn[Color::Black.index()][sq] = ((bb & NOT_FILE_A) >> 9) | ((bb & NOT_FILE_H) >> 7);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let rook = MagicTable::build(ROOK_BITS, rook_mask, rook_rays, &mut rng);
        let bishop = MagicTable::build(BISHOP_BITS, bishop_mask, bishop_rays, &mut rng);
        debug!(seed, "magic attack tables built");

        AttackTables { knight, king, pawn, rook, bishop }
    }

    #[inline]
    pub fn knight(&self, sq: Square) -> u64 {
        self.knight[sq]
    }

    #[inline]
    pub fn king(&self, sq: Square) -> u64 {
        self.king[sq]
    }

    /// Squares a pawn of `color` standing on `sq` attacks
    #[inline]
    pub fn pawn(&self, color: Color, sq: Square) -> u64 {
        self.pawn[color.index()][sq]
    }

    #[inline]
    pub fn rook(&self, sq: Square, occupied: u64) -> u64 {
        self.rook.attacks(sq, occupied)
    }

    #[inline]
    pub fn bishop(&self, sq: Square, occupied: u64) -> u64 {
        self.bishop.attacks(sq, occupied)
    }

    #[inline]
    pub fn queen(&self, sq: Square, occupied: u64) -> u64 {
        self.rook(sq, occupied) | self.bishop(sq, occupied)
    }

    /// Attacks of a non-pawn piece type from `sq`
    #[inline]
    pub fn piece(&self, piece_type: PieceType, sq: Square, occupied: u64) -> u64 {
        match piece_type {
            PieceType::Knight => self.knight(sq),
            PieceType::Bishop => self.bishop(sq, occupied),
            PieceType::Rook => self.rook(sq, occupied),
            PieceType::Queen => self.queen(sq, occupied),
            PieceType::King => self.king(sq),
            PieceType::Pawn => 0,
        }
    }
}

impl Default for AttackTables {
    fn default() -> Self {
        AttackTables::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn tables() -> &'static AttackTables {
        static TABLES: OnceLock<AttackTables> = OnceLock::new();
        TABLES.get_or_init(AttackTables::new)
    }

    #[test]
    fn jump_table_counts() {
        let t = tables();
        assert_eq!(popcount(t.knight(A1)), 2);
        assert_eq!(popcount(t.knight(27)), 8);
        assert_eq!(popcount(t.king(A1)), 3);
        assert_eq!(popcount(t.king(27)), 8);
        assert_eq!(t.pawn(Color::White, 12), square_bb(19) | square_bb(21));
        assert_eq!(t.pawn(Color::Black, 52), square_bb(43) | square_bb(45));
        assert_eq!(t.pawn(Color::White, 8), square_bb(17));
        assert_eq!(t.pawn(Color::White, 63), 0);
    }

    #[test]
    fn relevant_mask_sizes() {
        assert_eq!(popcount(rook_mask(A1)), 12);
        assert_eq!(popcount(rook_mask(27)), 10);
        assert_eq!(popcount(bishop_mask(27)), 9);
        assert_eq!(popcount(bishop_mask(A1)), 6);
    }

    #[test]
    fn magic_lookups_match_ray_casting() {
        let t = tables();
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..2000 {
            let occupied = rng.gen::<u64>() & rng.gen::<u64>();
            let sq = rng.gen_range(0..64);
            assert_eq!(t.rook(sq, occupied), rook_rays(sq, occupied), "rook on {}", square_name(sq));
            assert_eq!(t.bishop(sq, occupied), bishop_rays(sq, occupied), "bishop on {}", square_name(sq));
        }
    }

    #[test]
    fn piece_dispatch() {
        let t = tables();
        assert_eq!(t.piece(PieceType::Queen, 27, 0), rook_rays(27, 0) | bishop_rays(27, 0));
        assert_eq!(t.piece(PieceType::Knight, 27, u64::MAX), t.knight(27));
        assert_eq!(t.piece(PieceType::Pawn, 27, 0), 0);
    }
}
