//! OpusChess - Transposition Table
//!
//! A flat vector of entries, one per slot. A position's slot is its hash
//! scaled into the table length with a 128-bit multiply, and stores always
//! overwrite the slot. The full 64-bit hash is kept in the entry so that a
//! probe only answers for the position that wrote it.

use tracing::debug;

use crate::moves::Move;

/// Bound type of a stored score
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Bound {
    #[default]
    None,
    /// PV node, exact score
    Exact,
    /// All node, score is an upper bound
    Upper,
    /// Cut node, score is a lower bound
    Lower,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TTEntry {
    pub hash_key: u64,
    pub best_move: Move,
    pub score: i32,
    pub depth: i16,
    pub bound: Bound,
}

pub struct TranspositionTable {
    entries: Vec<TTEntry>,
}

impl TranspositionTable {
    pub fn new(size_mb: usize) -> Self {
        let mut tt = TranspositionTable { entries: Vec::new() };
        tt.resize(size_mb);
        tt
    }

    /// Reallocate to `size_mb` megabytes; all entries are lost
    pub fn resize(&mut self, size_mb: usize) {
        let count = (size_mb * 1024 * 1024 / std::mem::size_of::<TTEntry>()).max(1);
        self.entries = vec![TTEntry::default(); count];
        debug!(size_mb, entries = count, "transposition table allocated");
    }

    pub fn clear(&mut self) {
        self.entries.fill(TTEntry::default());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    fn index(&self, hash: u64) -> usize {
        ((hash as u128 * self.entries.len() as u128) >> 64) as usize
    }

    /// Entry stored for exactly this hash, if any
    #[inline]
    pub fn probe(&self, hash: u64) -> Option<TTEntry> {
        let entry = self.entries[self.index(hash)];
        (entry.bound != Bound::None && entry.hash_key == hash).then_some(entry)
    }

    #[inline]
    pub fn store(&mut self, hash: u64, best_move: Move, score: i32, depth: i32, bound: Bound) {
        let idx = self.index(hash);
        self.entries[idx] = TTEntry {
            hash_key: hash,
            best_move,
            score,
            depth: depth.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            bound,
        };
    }

    /// Occupied permille, sampled over the first thousand slots
    pub fn hashfull(&self) -> usize {
        let sample = self.entries.len().min(1000);
        if sample == 0 {
            return 0;
        }
        let used = self.entries[..sample].iter().filter(|e| e.bound != Bound::None).count();
        used * 1000 / sample
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        TranspositionTable::new(crate::config::DEFAULT_HASH_MB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_follows_megabytes() {
        let tt = TranspositionTable::new(1);
        assert_eq!(tt.len(), 1024 * 1024 / std::mem::size_of::<TTEntry>());
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn index_stays_in_range() {
        let tt = TranspositionTable::new(1);
        for hash in [0u64, 1, u64::MAX, 0x8000_0000_0000_0000, 0xDEAD_BEEF_CAFE_F00D] {
            assert!(tt.index(hash) < tt.len());
        }
    }

    #[test]
    fn probe_returns_stored_entry() {
        let mut tt = TranspositionTable::new(1);
        let mv = Move::normal(12, 28);
        tt.store(0x1234_5678_9ABC_DEF0, mv, -35, 6, Bound::Lower);

        let entry = tt.probe(0x1234_5678_9ABC_DEF0).expect("stored entry");
        assert_eq!(entry.best_move, mv);
        assert_eq!(entry.score, -35);
        assert_eq!(entry.depth, 6);
        assert_eq!(entry.bound, Bound::Lower);
        assert!(tt.hashfull() <= 1);

        // A neighbouring key never borrows the entry
        assert!(tt.probe(0x1234_5678_9ABC_DEF1).is_none());

        tt.clear();
        assert!(tt.probe(0x1234_5678_9ABC_DEF0).is_none());
    }

    #[test]
    fn resize_drops_entries() {
        let mut tt = TranspositionTable::new(1);
        tt.store(42, Move::normal(12, 28), 10, 3, Bound::Exact);
        tt.resize(2);
        assert!(tt.probe(42).is_none());
        assert_eq!(tt.len(), 2 * 1024 * 1024 / std::mem::size_of::<TTEntry>());
    }
}
