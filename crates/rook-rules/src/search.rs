//! Fixed-depth alpha-beta search used for computer play.

use crate::board::Board;
use crate::types::{Color, Move, Role, Square};

/// Score of a mated side, offset by ply so faster mates rank higher.
pub const MATE_SCORE: i32 = 100_000;

/// Best move found and its score from the mover's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchResult {
    pub best: Move,
    pub score: i32,
    pub nodes: u64,
}

/// Search `depth` plies ahead. Returns `None` when the side to move has no
/// legal moves.
pub fn best_move(board: &Board, depth: u8) -> Option<SearchResult> {
    let depth = depth.max(1);
    let mut nodes = 0;
    let mut moves = board.legal_moves();
    order_moves(board, &mut moves);

    let mut alpha = -MATE_SCORE - 1;
    let beta = MATE_SCORE + 1;
    let mut best = None;
    for mv in moves {
        let mut next = board.clone();
        next.play_unchecked(mv);
        let score = -negamax(&next, depth - 1, -beta, -alpha, 1, &mut nodes);
        if best.is_none() || score > alpha {
            alpha = score;
            best = Some(mv);
        }
    }
    tracing::debug!(depth, nodes, score = alpha, "search finished");
    best.map(|best| SearchResult {
        best,
        score: alpha,
        nodes,
    })
}

fn negamax(board: &Board, depth: u8, mut alpha: i32, beta: i32, ply: i32, nodes: &mut u64) -> i32 {
    *nodes += 1;
    let mut moves = board.legal_moves();
    if moves.is_empty() {
        return if board.in_check(board.turn()) {
            -MATE_SCORE + ply
        } else {
            0
        };
    }
    if depth == 0 {
        return evaluate(board);
    }
    order_moves(board, &mut moves);
    for mv in moves {
        let mut next = board.clone();
        next.play_unchecked(mv);
        let score = -negamax(&next, depth - 1, -beta, -alpha, ply + 1, nodes);
        if score >= beta {
            return beta;
        }
        alpha = alpha.max(score);
    }
    alpha
}

/// Captures of valuable pieces first, promotions next.
fn order_moves(board: &Board, moves: &mut [Move]) {
    moves.sort_by_key(|mv| {
        let victim = board.piece_at(mv.to).map_or(0, |p| p.role.value());
        let promo = mv.promotion.map_or(0, Role::value);
        -(victim + promo)
    });
}

/// Material plus a small centralization bonus, from the mover's side.
pub fn evaluate(board: &Board) -> i32 {
    let mut score = 0;
    for sq in Square::all() {
        let Some(piece) = board.piece_at(sq) else {
            continue;
        };
        let value = piece.role.value() + centrality(sq, piece.role);
        if piece.color == Color::White {
            score += value;
        } else {
            score -= value;
        }
    }
    match board.turn() {
        Color::White => score,
        Color::Black => -score,
    }
}

fn centrality(sq: Square, role: Role) -> i32 {
    if matches!(role, Role::King | Role::Rook) {
        return 0;
    }
    let file_dist = (2 * i32::from(sq.file()) - 7).abs();
    let rank_dist = (2 * i32::from(sq.rank()) - 7).abs();
    (14 - file_dist - rank_dist) * 2
}
