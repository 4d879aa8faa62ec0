//! Rules-engine capability consumed by the session layer.

use serde::{Deserialize, Serialize};

/// Post-move status of the side to move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStatus {
    pub check: bool,
    pub checkmate: bool,
}

impl GameStatus {
    /// Announcement for this status. Checkmate wins over check.
    pub fn notice(self) -> &'static str {
        if self.checkmate {
            "Checkmate!"
        } else if self.check {
            "Check!"
        } else {
            ""
        }
    }
}

/// A mutable board that can replay moves and round-trip through its
/// position encoding.
pub trait GameBoard: Sized + Send + 'static {
    /// Rejection raised for illegal moves and unreadable encodings.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Rebuild a board from its position encoding.
    fn from_position(encoding: &str) -> Result<Self, Self::Error>;

    /// Apply a move given as origin/destination squares (`"e2"`, `"e4"`).
    ///
    /// On success returns the new position encoding. On failure the board
    /// is left untouched.
    fn apply_move(&mut self, origin: &str, destination: &str) -> Result<String, Self::Error>;

    /// Canonical position encoding.
    fn position(&self) -> String;

    /// Status of the side to move.
    fn status(&self) -> GameStatus;
}
