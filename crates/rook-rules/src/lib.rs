//! # rook-rules
//!
//! Chess rules engine behind the [`rook_core::GameBoard`] capability.
//!
//! Positions are encoded as FEN. Move generation is legal (castling, en
//! passant and promotion included); check and checkmate are derived for the
//! side to move. [`search::best_move`] drives computer play.

#![deny(unsafe_code)]

pub mod board;
pub mod error;
pub mod search;
pub mod types;

pub use board::{Board, STARTING_FEN};
pub use error::{FenError, RuleError};
pub use search::{best_move, SearchResult};
pub use types::{Color, Move, Piece, Role, Square};
