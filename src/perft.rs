//! OpusChess - Perft Module
//!
//! Legal move-tree node counting, used to validate move generation against
//! known reference counts. Moves are made and tested for legality the same
//! way the search does it.

use std::time::{Duration, Instant};

use crate::move_generator::MoveGenerator;
use crate::moves::{Move, MoveList};
use crate::position::Position;

/// Count leaf nodes of the legal move tree to `depth`
pub fn perft(movegen: &MoveGenerator, pos: &mut Position, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }

    let mut moves = MoveList::new();
    movegen.generate_all_moves(pos, &mut moves);
    let us = pos.side_to_move();

    let mut nodes = 0u64;
    for &mv in moves.iter() {
        pos.make_move(mv);
        if !movegen.in_check(pos, us) {
            nodes += if depth == 1 { 1 } else { perft(movegen, pos, depth - 1) };
        }
        pos.unmake_move();
    }

    nodes
}

/// Node counts below each legal root move
pub fn split_perft(movegen: &MoveGenerator, pos: &mut Position, depth: u32) -> Vec<(Move, u64)> {
    if depth == 0 {
        return Vec::new();
    }

    movegen
        .legal_moves(pos)
        .iter()
        .map(|&mv| {
            pos.make_move(mv);
            let nodes = perft(movegen, pos, depth - 1);
            pos.unmake_move();
            (mv, nodes)
        })
        .collect()
}

/// Result of a timed perft run
#[derive(Clone, Debug)]
pub struct PerftReport {
    pub depth: u32,
    pub nodes: u64,
    pub elapsed: Duration,
    pub divide: Vec<(Move, u64)>,
}

impl PerftReport {
    pub fn nps(&self) -> u64 {
        let micros = self.elapsed.as_micros().max(1);
        (self.nodes as u128 * 1_000_000 / micros) as u64
    }
}

/// Split perft with timing
pub fn timed_perft(movegen: &MoveGenerator, pos: &mut Position, depth: u32) -> PerftReport {
    let start = Instant::now();
    let divide = split_perft(movegen, pos, depth);
    let nodes = if depth == 0 { 1 } else { divide.iter().map(|(_, n)| n).sum() };
    PerftReport { depth, nodes, elapsed: start.elapsed(), divide }
}
