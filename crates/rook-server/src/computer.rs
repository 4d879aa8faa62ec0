//! Computer play: one human move, then the engine's reply.
//!
//! The search runs on the blocking pool under a deadline. A search that
//! overruns keeps going in the background and writes its move once it
//! finishes, provided the stored position is still the one it searched.

use std::time::{Duration, Instant};

use metrics::histogram;
use rook_core::{GameKind, SessionId};
use rook_rules::{best_move, Board, Move, SearchResult};
use rook_store::GameRepo;
use rook_telemetry::recorder::ENGINE_THINK_SECONDS;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ServerError;

pub const INVALID_MOVE: &str = "> That's not a Valid Move!";
pub const ENGINE_CHECKMATED: &str = "> I've been Checkmated!";
pub const ENGINE_WINS: &str = "> Game Over, Checkmate";
pub const STALEMATE: &str = "> Game Over, Stalemate";
pub const STILL_THINKING: &str = "> Still thinking, reload in a moment for my move";

/// Reply to one computer-play request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayResponse {
    pub position: String,
    pub message: String,
    /// Destination square of the engine's move, empty if it did not move.
    pub target: String,
    /// Origin square of the engine's move, empty if it did not move.
    pub origin: String,
    pub id: String,
}

impl PlayResponse {
    fn new(board: &Board, message: impl Into<String>, id: &SessionId) -> Self {
        Self {
            position: board.to_fen(),
            message: message.into(),
            target: String::new(),
            origin: String::new(),
            id: id.to_string(),
        }
    }

    fn with_engine_move(mut self, mv: Move) -> Self {
        self.target = mv.to.to_string();
        self.origin = mv.from.to_string();
        self
    }
}

/// Engine settings for one request.
#[derive(Clone, Copy, Debug)]
pub struct EngineLimits {
    pub depth: u8,
    pub think_timeout: Duration,
}

/// Apply `origin`→`destination` to computer game `id`, then let the engine
/// answer.
pub async fn play(
    repo: &GameRepo,
    id: &SessionId,
    origin: &str,
    destination: &str,
    limits: EngineLimits,
) -> Result<PlayResponse, ServerError> {
    let stored = repo.load_position(GameKind::Computer, id)?;
    let mut board = Board::from_fen(&stored)
        .map_err(|e| ServerError::Internal(format!("stored position of {id} is unreadable: {e}")))?;

    if let Err(e) = board.play_squares(origin, destination) {
        debug!(session_id = %id, origin, destination, reason = %e, "human move rejected");
        return Ok(PlayResponse::new(&board, INVALID_MOVE, id));
    }
    let after_human = board.to_fen();
    repo.save_position(GameKind::Computer, id, &after_human)?;

    if board.is_checkmate() {
        return Ok(PlayResponse::new(&board, ENGINE_CHECKMATED, id));
    }
    if board.is_stalemate() {
        return Ok(PlayResponse::new(&board, STALEMATE, id));
    }

    let started = Instant::now();
    let mut search = spawn_search(&board, limits.depth);
    match tokio::time::timeout(limits.think_timeout, &mut search).await {
        Ok(Ok(Some(found))) => {
            let elapsed = started.elapsed();
            histogram!(ENGINE_THINK_SECONDS).record(elapsed.as_secs_f64());
            let position = board
                .play(found.best)
                .map_err(|e| ServerError::Internal(format!("engine chose an illegal move: {e}")))?;
            repo.save_position(GameKind::Computer, id, &position)?;
            debug!(session_id = %id, mv = %found.best, nodes = found.nodes, ?elapsed, "engine replied");
            Ok(PlayResponse::new(&board, reply_message(&board, elapsed), id).with_engine_move(found.best))
        }
        Ok(Ok(None)) => Ok(PlayResponse::new(&board, STALEMATE, id)),
        Ok(Err(e)) => Err(ServerError::Internal(format!("engine search failed: {e}"))),
        Err(_) => {
            info!(session_id = %id, timeout = ?limits.think_timeout, "engine overran its deadline");
            let _ = tokio::spawn(finish_late(repo.clone(), id.clone(), after_human, search, started));
            Ok(PlayResponse::new(&board, STILL_THINKING, id))
        }
    }
}

/// Message announcing the engine's move.
fn reply_message(board: &Board, elapsed: Duration) -> String {
    if board.is_checkmate() {
        ENGINE_WINS.to_owned()
    } else if board.in_check(board.turn()) {
        format!("> Check! My move took {elapsed:?}")
    } else {
        format!("> Your Move, <i>my move took {elapsed:?}</i>")
    }
}

fn spawn_search(board: &Board, depth: u8) -> JoinHandle<Option<SearchResult>> {
    let board = board.clone();
    tokio::task::spawn_blocking(move || best_move(&board, depth))
}

/// Persist a search that outlived its request, unless the game moved on.
async fn finish_late(
    repo: GameRepo,
    id: SessionId,
    searched: String,
    search: JoinHandle<Option<SearchResult>>,
    started: Instant,
) {
    let found = match search.await {
        Ok(Some(found)) => found,
        Ok(None) => return,
        Err(e) => {
            warn!(session_id = %id, error = %e, "background search failed");
            return;
        }
    };
    histogram!(ENGINE_THINK_SECONDS).record(started.elapsed().as_secs_f64());

    match repo.load_position(GameKind::Computer, &id) {
        Ok(current) if current == searched => {}
        Ok(_) => {
            debug!(session_id = %id, "game changed during search, discarding late reply");
            return;
        }
        Err(e) => {
            warn!(session_id = %id, error = %e, "cannot reload game for late reply");
            return;
        }
    }

    let mut board = match Board::from_fen(&searched) {
        Ok(board) => board,
        Err(e) => {
            warn!(session_id = %id, error = %e, "searched position is unreadable");
            return;
        }
    };
    if let Err(e) = board.play(found.best) {
        warn!(session_id = %id, error = %e, "late reply is illegal");
        return;
    }
    match repo.save_position(GameKind::Computer, &id, &board.to_fen()) {
        Ok(()) => info!(session_id = %id, mv = %found.best, "late engine reply stored"),
        Err(e) => warn!(session_id = %id, error = %e, "failed to store late reply"),
    }
}

#[cfg(test)]
mod tests {
    use rook_rules::STARTING_FEN;
    use rook_store::Database;

    use super::*;

    fn repo_with(position: &str) -> (GameRepo, SessionId) {
        let repo = GameRepo::new(Database::in_memory().unwrap());
        repo.ensure_buckets().unwrap();
        let record = repo.create(GameKind::Computer, position).unwrap();
        (repo, record.id)
    }

    fn limits() -> EngineLimits {
        EngineLimits {
            depth: 2,
            think_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn illegal_move_leaves_game_untouched() {
        let (repo, id) = repo_with(STARTING_FEN);
        let resp = play(&repo, &id, "e2", "e5", limits()).await.unwrap();
        assert_eq!(resp.message, INVALID_MOVE);
        assert_eq!(resp.position, STARTING_FEN);
        assert_eq!(resp.id, id.to_string());
        assert!(resp.target.is_empty());
        assert_eq!(repo.load_position(GameKind::Computer, &id).unwrap(), STARTING_FEN);
    }

    #[tokio::test]
    async fn engine_replies_and_both_moves_are_stored() {
        let (repo, id) = repo_with(STARTING_FEN);
        let resp = play(&repo, &id, "e2", "e4", limits()).await.unwrap();

        assert!(resp.message.starts_with("> Your Move"), "got: {}", resp.message);
        assert_eq!(resp.origin.len(), 2);
        assert_eq!(resp.target.len(), 2);
        // White to move again after the engine's reply.
        assert!(resp.position.contains(" w "), "got: {}", resp.position);
        assert_eq!(repo.load_position(GameKind::Computer, &id).unwrap(), resp.position);
    }

    #[tokio::test]
    async fn mating_the_engine_is_announced() {
        // Black to be mated by Qh5xf7.
        let (repo, id) = repo_with(
            "r1bqkb1r/pppp1ppp/2n2n2/4p2Q/2B1P3/8/PPPP1PPP/RNB1K1NR w KQkq - 4 4",
        );
        let resp = play(&repo, &id, "h5", "f7", limits()).await.unwrap();
        assert_eq!(resp.message, ENGINE_CHECKMATED);
        assert_eq!(repo.load_position(GameKind::Computer, &id).unwrap(), resp.position);
    }

    #[tokio::test]
    async fn engine_takes_a_mate_in_one() {
        // Black mates with Qd8-h4 after f3 g4.
        let (repo, id) = repo_with("rnbqkbnr/pppp1ppp/8/4p3/8/5P2/PPPPP1PP/RNBQKBNR w KQkq - 0 2");
        let resp = play(&repo, &id, "g2", "g4", limits()).await.unwrap();
        assert_eq!(resp.message, ENGINE_WINS);
        assert_eq!(resp.origin, "d8");
        assert_eq!(resp.target, "h4");
    }

    #[tokio::test]
    async fn unknown_game_is_not_found() {
        let (repo, _) = repo_with(STARTING_FEN);
        let err = play(&repo, &SessionId::from_raw("missing"), "e2", "e4", limits())
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn overrun_search_is_stored_later() {
        let (repo, id) = repo_with(STARTING_FEN);
        let tight = EngineLimits {
            depth: 3,
            think_timeout: Duration::ZERO,
        };
        let resp = play(&repo, &id, "e2", "e4", tight).await.unwrap();
        assert_eq!(resp.message, STILL_THINKING);
        assert!(resp.position.contains(" b "));

        for _ in 0..500 {
            let stored = repo.load_position(GameKind::Computer, &id).unwrap();
            if stored.contains(" w ") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("late reply never stored");
    }

    #[test]
    fn reply_message_reports_think_time() {
        let msg = reply_message(&Board::new(), Duration::from_millis(12));
        assert_eq!(msg, "> Your Move, <i>my move took 12ms</i>");
    }
}
