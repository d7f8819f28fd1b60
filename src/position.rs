//! OpusChess - Position Module
//!
//! The authoritative board state. Every position is a `PositionState` value
//! holding both bitboards and a mailbox, castling rights, clocks, the en
//! passant square and the Zobrist hash. `Position` keeps the current state
//! plus the stack of all states since the root: `make_move` pushes a new
//! state and `unmake_move` pops back to the previous one verbatim, so undo
//! never recomputes anything.

use std::fmt;
use std::sync::Arc;

use crate::bitboard::*;
use crate::error::FenError;
use crate::moves::{Move, MoveKind};
use crate::types::*;
use crate::zobrist::ZobristKeys;

/// Starting position FEN
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const HISTORY_CAPACITY: usize = 1024;

/// Color bitboards follow the six piece-type bitboards
const COLOR_OFFSET: usize = 6;

// ============================================================================
// CASTLING RIGHTS
// ============================================================================

/// Origin squares of the rooks a side may still castle with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CastlingRooks {
    pub kingside: Option<Square>,
    pub queenside: Option<Square>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CastlingRights {
    rooks: [CastlingRooks; 2],
}

impl CastlingRights {
    #[inline]
    pub fn kingside(&self, color: Color) -> Option<Square> {
        self.rooks[color.index()].kingside
    }

    #[inline]
    pub fn queenside(&self, color: Color) -> Option<Square> {
        self.rooks[color.index()].queenside
    }

    /// 4-bit mask: white kingside, white queenside, black kingside, black queenside
    #[inline]
    pub fn mask(&self) -> usize {
        let mut mask = 0;
        for color in Color::ALL {
            let rooks = &self.rooks[color.index()];
            if rooks.kingside.is_some() {
                mask |= 1 << (color.index() * 2);
            }
            if rooks.queenside.is_some() {
                mask |= 2 << (color.index() * 2);
            }
        }
        mask
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mask() == 0
    }

    #[inline]
    fn clear(&mut self, color: Color) {
        self.rooks[color.index()] = CastlingRooks::default();
    }

    /// Drop any right whose rook starts on `sq`
    #[inline]
    fn revoke_rook(&mut self, sq: Square) {
        for rooks in self.rooks.iter_mut() {
            if rooks.kingside == Some(sq) {
                rooks.kingside = None;
            }
            if rooks.queenside == Some(sq) {
                rooks.queenside = None;
            }
        }
    }
}

// ============================================================================
// POSITION STATE
// ============================================================================

/// Value snapshot of one position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionState {
    pieces: [u64; 8],
    mailbox: [Option<Piece>; 64],
    castling: CastlingRights,
    side_to_move: Color,
    halfmove_clock: u16,
    fullmove_number: u16,
    en_passant: Option<Square>,
    hash: u64,
}

impl PositionState {
    fn empty() -> Self {
        PositionState {
            pieces: [0; 8],
            mailbox: [None; 64],
            castling: CastlingRights::default(),
            side_to_move: Color::White,
            halfmove_clock: 0,
            fullmove_number: 1,
            en_passant: None,
            hash: 0,
        }
    }

    #[inline]
    fn put(&mut self, keys: &ZobristKeys, piece: Piece, sq: Square) {
        debug_assert!(self.mailbox[sq].is_none(), "square {} is occupied", square_name(sq));
        let bb = square_bb(sq);
        self.pieces[piece.piece_type().index()] ^= bb;
        self.pieces[COLOR_OFFSET + piece.color().index()] ^= bb;
        self.mailbox[sq] = Some(piece);
        self.hash ^= keys.piece(piece, sq);
    }

    #[inline]
    fn remove(&mut self, keys: &ZobristKeys, sq: Square) {
        if let Some(piece) = self.mailbox[sq].take() {
            let bb = square_bb(sq);
            self.pieces[piece.piece_type().index()] ^= bb;
            self.pieces[COLOR_OFFSET + piece.color().index()] ^= bb;
            self.hash ^= keys.piece(piece, sq);
        }
    }
}

// ============================================================================
// POSITION
// ============================================================================

#[derive(Clone)]
pub struct Position {
    state: PositionState,
    history: Vec<PositionState>,
    keys: Arc<ZobristKeys>,
}

impl Position {
    /// Create a position with the standard starting setup
    pub fn startpos(keys: Arc<ZobristKeys>) -> Self {
        const BACK_RANK: [PieceType; 8] = [
            PieceType::Rook,
            PieceType::Knight,
            PieceType::Bishop,
            PieceType::Queen,
            PieceType::King,
            PieceType::Bishop,
            PieceType::Knight,
            PieceType::Rook,
        ];

        let mut state = PositionState::empty();
        for color in Color::ALL {
            let rank = color.back_rank();
            for (file, &pt) in BACK_RANK.iter().enumerate() {
                state.put(&keys, Piece::new(pt, color), make_square(file, rank));
                state.put(&keys, Piece::new(PieceType::Pawn, color), make_square(file, color.pawn_rank()));
            }
            state.castling.rooks[color.index()] = CastlingRooks {
                kingside: Some(make_square(7, rank)),
                queenside: Some(make_square(0, rank)),
            };
        }
        Position::with_state(state, keys)
    }

    fn with_state(state: PositionState, keys: Arc<ZobristKeys>) -> Self {
        let mut position = Position {
            state,
            history: Vec::with_capacity(HISTORY_CAPACITY),
            keys,
        };
        position.state.hash = position.explicit_zobrist();
        position.history.push(position.state);
        position
    }

    /// Create a position from a FEN string. Missing move clocks default to 0 and 1.
    pub fn from_fen(fen: &str, keys: Arc<ZobristKeys>) -> Result<Self, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(FenError::MissingFields(fields.len()));
        }

        let mut state = PositionState::empty();

        // Piece placement
        let ranks: Vec<&str> = fields[0].split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::RankCount(ranks.len()));
        }
        for (i, rank_str) in ranks.iter().enumerate() {
            let rank = 7 - i;
            let mut file = 0usize;
            for c in rank_str.chars() {
                if let Some(skip) = c.to_digit(10) {
                    file += skip as usize;
                } else {
                    let piece = Piece::from_fen_char(c).ok_or(FenError::InvalidPiece(c))?;
                    if file >= 8 {
                        return Err(FenError::RankLength { rank: rank + 1, files: file + 1 });
                    }
                    state.put(&keys, piece, make_square(file, rank));
                    file += 1;
                }
            }
            if file != 8 {
                return Err(FenError::RankLength { rank: rank + 1, files: file });
            }
        }

        for color in Color::ALL {
            let kings = state.pieces[PieceType::King.index()] & state.pieces[COLOR_OFFSET + color.index()];
            if popcount(kings) != 1 {
                return Err(FenError::KingCount);
            }
        }

        // Side to move
        state.side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::InvalidSide(other.to_string())),
        };

        // Castling rights, kept only when king and rook are on their home squares
        if fields[2] != "-" {
            for c in fields[2].chars() {
                let (color, kingside) = match c {
                    'K' => (Color::White, true),
                    'Q' => (Color::White, false),
                    'k' => (Color::Black, true),
                    'q' => (Color::Black, false),
                    _ => return Err(FenError::InvalidCastling(fields[2].to_string())),
                };
                let rank = color.back_rank();
                let king_home = state.mailbox[make_square(4, rank)] == Some(Piece::new(PieceType::King, color));
                let rook_sq = make_square(if kingside { 7 } else { 0 }, rank);
                let rook_home = state.mailbox[rook_sq] == Some(Piece::new(PieceType::Rook, color));
                if king_home && rook_home {
                    let rooks = &mut state.castling.rooks[color.index()];
                    if kingside {
                        rooks.kingside = Some(rook_sq);
                    } else {
                        rooks.queenside = Some(rook_sq);
                    }
                }
            }
        }

        // En passant target
        if fields[3] != "-" {
            // The target sits behind a pawn of the side that just moved
            let ep_rank = match state.side_to_move {
                Color::White => 5,
                Color::Black => 2,
            };
            let sq = parse_square(fields[3])
                .filter(|&sq| rank_of(sq) == ep_rank)
                .ok_or_else(|| FenError::InvalidEnPassant(fields[3].to_string()))?;
            state.en_passant = Some(sq);
        }

        // Move clocks
        if let Some(field) = fields.get(4) {
            state.halfmove_clock = field.parse().map_err(|_| FenError::InvalidClock(field.to_string()))?;
        }
        if let Some(field) = fields.get(5) {
            state.fullmove_number = field.parse().map_err(|_| FenError::InvalidClock(field.to_string()))?;
        }

        Ok(Position::with_state(state, keys))
    }

    /// Convert the position to a FEN string
    pub fn to_fen(&self) -> String {
        let mut fen = String::with_capacity(90);

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.state.mailbox[make_square(file, rank)] {
                    Some(piece) => {
                        if empty > 0 {
                            fen.push_str(&empty.to_string());
                            empty = 0;
                        }
                        fen.push(piece.to_fen_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(match self.state.side_to_move {
            Color::White => 'w',
            Color::Black => 'b',
        });

        fen.push(' ');
        let castling = &self.state.castling;
        if castling.is_empty() {
            fen.push('-');
        } else {
            if castling.kingside(Color::White).is_some() {
                fen.push('K');
            }
            if castling.queenside(Color::White).is_some() {
                fen.push('Q');
            }
            if castling.kingside(Color::Black).is_some() {
                fen.push('k');
            }
            if castling.queenside(Color::Black).is_some() {
                fen.push('q');
            }
        }

        fen.push(' ');
        match self.state.en_passant {
            Some(sq) => fen.push_str(&square_name(sq)),
            None => fen.push('-'),
        }

        fen.push_str(&format!(" {} {}", self.state.halfmove_clock, self.state.fullmove_number));
        fen
    }

    /// Hash recomputed from scratch off the current board
    pub fn explicit_zobrist(&self) -> u64 {
        let keys = &self.keys;
        let mut hash = 0u64;

        for (sq, piece) in self.state.mailbox.iter().enumerate() {
            if let Some(piece) = piece {
                hash ^= keys.piece(*piece, sq);
            }
        }

        hash ^= keys.castling(self.state.castling.mask());
        if let Some(ep) = self.state.en_passant {
            hash ^= keys.en_passant(ep);
        }
        if self.state.side_to_move == Color::Black {
            hash ^= keys.side();
        }

        hash
    }

    // ========================================================================
    // MAKE / UNMAKE
    // ========================================================================

    /// Apply a pseudo-legal move and push the resulting state.
    pub fn make_move(&mut self, mv: Move) {
        let us = self.state.side_to_move;
        let from = mv.from_sq();
        let to = mv.to_sq();

        let piece = match self.state.mailbox[from] {
            Some(piece) if piece.color() == us => piece,
            _ => {
                debug_assert!(false, "no {:?} piece to move on {}", us, square_name(from));
                self.make_null();
                return;
            }
        };

        let keys: &ZobristKeys = &self.keys;
        let st = &mut self.state;

        st.hash ^= keys.castling(st.castling.mask());
        if let Some(ep) = st.en_passant.take() {
            st.hash ^= keys.en_passant(ep);
        }

        let captures = mv.kind() == MoveKind::EnPassant || st.mailbox[to].is_some();
        if piece.piece_type() == PieceType::Pawn || captures {
            st.halfmove_clock = 0;
        } else {
            st.halfmove_clock += 1;
        }
        if us == Color::Black {
            st.fullmove_number += 1;
        }

        match mv.kind() {
            MoveKind::Normal => {
                if st.mailbox[to].is_some() {
                    st.remove(keys, to);
                    st.castling.revoke_rook(to);
                }
                match piece.piece_type() {
                    PieceType::King => st.castling.clear(us),
                    PieceType::Rook => st.castling.revoke_rook(from),
                    _ => {}
                }
                st.remove(keys, from);
                st.put(keys, piece, to);

                if piece.piece_type() == PieceType::Pawn && from.abs_diff(to) == 16 {
                    let ep = (from + to) / 2;
                    st.en_passant = Some(ep);
                    st.hash ^= keys.en_passant(ep);
                }
            }
            MoveKind::Castling => {
                let rank = us.back_rank();
                let kingside = to > from;
                let recorded = if kingside { st.castling.kingside(us) } else { st.castling.queenside(us) };
                let rook_from = recorded.unwrap_or_else(|| make_square(if kingside { 7 } else { 0 }, rank));
                let rook_to = make_square(if kingside { 5 } else { 3 }, rank);

                st.remove(keys, rook_from);
                st.remove(keys, from);
                st.put(keys, piece, to);
                st.put(keys, Piece::new(PieceType::Rook, us), rook_to);
                st.castling.clear(us);
            }
            MoveKind::EnPassant => {
                let captured_sq = match us {
                    Color::White => to - 8,
                    Color::Black => to + 8,
                };
                st.remove(keys, captured_sq);
                st.remove(keys, from);
                st.put(keys, piece, to);
            }
            MoveKind::Promotion => {
                if st.mailbox[to].is_some() {
                    st.remove(keys, to);
                    st.castling.revoke_rook(to);
                }
                st.remove(keys, from);
                st.put(keys, Piece::new(mv.promotion_piece(), us), to);
            }
        }

        st.hash ^= keys.castling(st.castling.mask());
        st.side_to_move = !us;
        st.hash ^= keys.side();

        debug_assert_eq!(self.state.hash, self.explicit_zobrist());
        self.history.push(self.state);
    }

    /// Pass the move to the opponent. Only null-move pruning uses this.
    pub fn make_null(&mut self) {
        let keys: &ZobristKeys = &self.keys;
        let st = &mut self.state;

        if let Some(ep) = st.en_passant.take() {
            st.hash ^= keys.en_passant(ep);
        }
        st.halfmove_clock += 1;
        if st.side_to_move == Color::Black {
            st.fullmove_number += 1;
        }
        st.side_to_move = !st.side_to_move;
        st.hash ^= keys.side();

        self.history.push(self.state);
    }

    /// Restore the state before the last `make_move` or `make_null`
    pub fn unmake_move(&mut self) {
        debug_assert!(self.history.len() > 1, "unmake without a matching make");
        if self.history.len() > 1 {
            self.history.pop();
        }
        if let Some(previous) = self.history.last() {
            self.state = *previous;
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    #[inline]
    pub fn state(&self) -> &PositionState {
        &self.state
    }

    #[inline]
    pub fn keys(&self) -> &Arc<ZobristKeys> {
        &self.keys
    }

    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.state.side_to_move
    }

    /// Bitboard of one piece type, both colors
    #[inline]
    pub fn pieces(&self, piece_type: PieceType) -> u64 {
        self.state.pieces[piece_type.index()]
    }

    /// Bitboard of every piece of one color
    #[inline]
    pub fn colors(&self, color: Color) -> u64 {
        self.state.pieces[COLOR_OFFSET + color.index()]
    }

    #[inline]
    pub fn pieces_of(&self, piece_type: PieceType, color: Color) -> u64 {
        self.pieces(piece_type) & self.colors(color)
    }

    #[inline]
    pub fn occupied(&self) -> u64 {
        self.colors(Color::White) | self.colors(Color::Black)
    }

    #[inline]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.state.mailbox[sq]
    }

    #[inline]
    pub fn king_square(&self, color: Color) -> Square {
        lsb(self.pieces_of(PieceType::King, color))
    }

    #[inline]
    pub fn castling(&self) -> &CastlingRights {
        &self.state.castling
    }

    #[inline]
    pub fn en_passant(&self) -> Option<Square> {
        self.state.en_passant
    }

    #[inline]
    pub fn halfmove_clock(&self) -> u16 {
        self.state.halfmove_clock
    }

    #[inline]
    pub fn fullmove_number(&self) -> u16 {
        self.state.fullmove_number
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.state.hash
    }

    /// Number of moves (including null moves) made since the root
    #[inline]
    pub fn ply_count(&self) -> usize {
        self.history.len() - 1
    }

    /// Whether `color` has anything besides pawns and its king
    #[inline]
    pub fn has_non_pawn_material(&self, color: Color) -> bool {
        let kings_and_pawns = self.pieces(PieceType::King) | self.pieces(PieceType::Pawn);
        self.colors(color) & !kings_and_pawns != 0
    }

    // ========================================================================
    // DRAW DETECTION
    // ========================================================================

    /// How many times the current position occurs in the history, itself included
    pub fn repetition_count(&self) -> usize {
        let hash = self.state.hash;
        self.history.iter().filter(|state| state.hash == hash).count()
    }

    /// Current position has been seen before
    pub fn has_repeated(&self) -> bool {
        self.repetition_count() >= 2
    }

    /// Current position occurred three times
    pub fn is_threefold(&self) -> bool {
        self.repetition_count() >= 3
    }

    /// Check if 50-move rule applies (draw)
    pub fn is_fifty_move_draw(&self) -> bool {
        self.state.halfmove_clock >= 100
    }

    /// Simplified material draw: no pawns, rooks or queens, bishops on one
    /// square color only, never bishop and knight together, at most one knight.
    pub fn is_insufficient(&self) -> bool {
        if self.pieces(PieceType::Pawn) | self.pieces(PieceType::Rook) | self.pieces(PieceType::Queen) != 0 {
            return false;
        }

        let bishops = self.pieces(PieceType::Bishop);
        let knights = self.pieces(PieceType::Knight);

        if bishops & LIGHT_SQUARES != 0 && bishops & !LIGHT_SQUARES != 0 {
            return false;
        }
        if bishops != 0 && knights != 0 {
            return false;
        }
        popcount(knights) <= 1
    }

    /// Display the board as a string
    pub fn display(&self) -> String {
        let mut lines = Vec::new();
        lines.push("  +---+---+---+---+---+---+---+---+".to_string());

        for rank in (0..8).rev() {
            let mut row = format!("{} |", rank + 1);
            for file in 0..8 {
                match self.state.mailbox[make_square(file, rank)] {
                    Some(piece) => row.push_str(&format!(" {} |", piece.to_fen_char())),
                    None => row.push_str("   |"),
                }
            }
            lines.push(row);
            lines.push("  +---+---+---+---+---+---+---+---+".to_string());
        }
        lines.push("    a   b   c   d   e   f   g   h".to_string());

        lines.join("\n")
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self.to_fen())
    }
}
