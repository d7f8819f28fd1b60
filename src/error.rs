//! OpusChess - Error Types
//!
//! Errors for the fallible entry points: FEN parsing, coordinate move
//! parsing and protocol commands. Rejected input never mutates engine state.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FenError {
    #[error("FEN needs at least 4 fields, found {0}")]
    MissingFields(usize),

    #[error("piece placement must describe 8 ranks, found {0}")]
    RankCount(usize),

    #[error("rank {rank} describes {files} files")]
    RankLength { rank: usize, files: usize },

    #[error("invalid piece character '{0}'")]
    InvalidPiece(char),

    #[error("invalid side to move '{0}'")]
    InvalidSide(String),

    #[error("invalid castling field '{0}'")]
    InvalidCastling(String),

    #[error("invalid en passant square '{0}'")]
    InvalidEnPassant(String),

    #[error("invalid move clock '{0}'")]
    InvalidClock(String),

    #[error("each side needs exactly one king")]
    KingCount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveParseError {
    #[error("malformed move '{0}'")]
    Malformed(String),

    #[error("illegal move '{0}'")]
    Illegal(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UciError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("missing argument for '{0}'")]
    MissingArgument(&'static str),

    #[error("invalid value '{value}' for '{name}'")]
    InvalidValue { name: String, value: String },

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error(transparent)]
    Fen(#[from] FenError),

    #[error(transparent)]
    Move(#[from] MoveParseError),
}
