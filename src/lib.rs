//! OpusChess - UCI Chess Engine Core
//!
//! A chess engine written in Rust with support for:
//! - Full FIDE chess rules
//! - UCI protocol
//! - Bitboard representation with magic slider lookups
//! - Principal variation search with a transposition table
//! - Advanced pruning techniques (NMP, LMR, singular extensions, etc.)
//! - Incrementally updated evaluation
//!
//! Attack tables and Zobrist keys are built once by the caller and shared
//! through `Arc`; nothing in the crate holds global mutable state.

pub mod types;
pub mod bitboard;
pub mod moves;
pub mod zobrist;
pub mod attacks;
pub mod error;
pub mod position;
pub mod move_generator;
pub mod see;
pub mod perft;
pub mod tt;
pub mod history;
pub mod evaluation;
pub mod search;
pub mod config;
pub mod uci;
