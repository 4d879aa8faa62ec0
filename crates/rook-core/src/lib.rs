//! # rook-core
//!
//! Types shared by every rook crate:
//!
//! - Branded ids for sessions and participants
//! - The browser ↔ server JSON protocol
//! - The [`board::GameBoard`] capability the session layer drives
//! - Game kinds and their durable buckets

#![deny(unsafe_code)]

pub mod board;
pub mod game;
pub mod ids;
pub mod protocol;

pub use board::{GameBoard, GameStatus};
pub use game::GameKind;
pub use ids::{ParticipantId, SessionId};
