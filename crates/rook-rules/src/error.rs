use crate::types::{Color, Square};

/// Why a position encoding could not be read.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    #[error("empty position")]
    Empty,
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("bad piece placement: {0}")]
    BadPlacement(String),
    #[error("bad side to move: {0}")]
    BadSide(String),
    #[error("bad castling rights: {0}")]
    BadCastling(String),
    #[error("bad en passant square: {0}")]
    BadEnPassant(String),
    #[error("bad move clock: {0}")]
    BadClock(String),
    #[error("unexpected trailing fields")]
    TrailingFields,
    #[error("{0} must have exactly one king")]
    Kings(Color),
}

/// Why a move was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("invalid square: {0:?}")]
    InvalidSquare(String),
    #[error("no piece on {0}")]
    NoPiece(Square),
    #[error("it is {to_move}'s turn")]
    WrongTurn { to_move: Color },
    #[error("illegal move {from} to {to}")]
    IllegalMove { from: Square, to: Square },
    #[error("the game is over")]
    GameOver,
    #[error(transparent)]
    Position(#[from] FenError),
}
