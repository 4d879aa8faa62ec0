//! End-to-end realtime sessions over real WebSocket clients.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rook_core::{GameKind, SessionId};
use rook_rules::STARTING_FEN;
use rook_server::{start, ServerConfig, ServerHandle};
use rook_store::{Database, GameRepo};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

struct Harness {
    handle: ServerHandle,
    repo: GameRepo,
    token: CancellationToken,
}

impl Harness {
    async fn start() -> Self {
        let repo = GameRepo::new(Database::in_memory().unwrap());
        repo.ensure_buckets().unwrap();
        let token = CancellationToken::new();
        let handle = start(ServerConfig::default(), repo.clone(), None, token.clone())
            .await
            .unwrap();
        Self {
            handle,
            repo,
            token,
        }
    }

    fn challenge(&self) -> SessionId {
        self.repo.create(GameKind::Challenge, STARTING_FEN).unwrap().id
    }

    async fn connect(&self, id: &str) -> Client {
        let url = format!("ws://127.0.0.1:{}/connect/{id}", self.handle.port);
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }

    async fn participants(&self) -> u64 {
        let url = format!("http://127.0.0.1:{}/health", self.handle.port);
        let body: serde_json::Value = reqwest::get(url).await.unwrap().json().await.unwrap();
        body["participants"].as_u64().unwrap()
    }

    /// Registration trails the handshake, so poll until the hub sees `n`.
    async fn wait_for_participants(&self, n: u64) {
        for _ in 0..200 {
            if self.participants().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("hub never reached {n} participants");
    }

    async fn shutdown(self) {
        self.token.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle.join())
            .await
            .unwrap();
    }
}

async fn send(ws: &mut Client, text: &str) {
    ws.send(Message::text(text)).await.unwrap();
}

async fn next_json(ws: &mut Client) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame within 5s")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn both_seats_see_the_move_and_other_sessions_do_not() {
    let harness = Harness::start().await;
    let game = harness.challenge();
    let other = harness.challenge();

    let mut white = harness.connect(game.as_str()).await;
    let mut black = harness.connect(game.as_str()).await;
    let mut outsider = harness.connect(other.as_str()).await;
    harness.wait_for_participants(3).await;

    send(
        &mut white,
        &format!(r#"{{"type":"move","origin":"e2","destination":"e4","message":"","id":"{game}"}}"#),
    )
    .await;

    for ws in [&mut white, &mut black] {
        let frame = next_json(ws).await;
        assert_eq!(frame["Type"], "move");
        assert_eq!(frame["Position"], AFTER_E4);
        assert_eq!(frame["Error"], "");
    }
    assert!(
        tokio::time::timeout(Duration::from_millis(300), outsider.next())
            .await
            .is_err(),
        "a participant of another session received a frame"
    );

    assert_eq!(
        harness
            .repo
            .load_position(GameKind::Challenge, &game)
            .unwrap(),
        AFTER_E4
    );
    assert_eq!(
        harness
            .repo
            .load_position(GameKind::Challenge, &other)
            .unwrap(),
        STARTING_FEN
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn illegal_move_reports_error_without_persisting() {
    let harness = Harness::start().await;
    let game = harness.challenge();
    let mut white = harness.connect(game.as_str()).await;
    harness.wait_for_participants(1).await;

    send(
        &mut white,
        &format!(r#"{{"type":"move","origin":"e3","destination":"e4","id":"{game}"}}"#),
    )
    .await;
    let frame = next_json(&mut white).await;
    assert_eq!(frame["Position"], STARTING_FEN);
    assert!(!frame["Error"].as_str().unwrap().is_empty());
    assert_eq!(
        harness
            .repo
            .load_position(GameKind::Challenge, &game)
            .unwrap(),
        STARTING_FEN
    );

    harness.shutdown().await;
}

#[tokio::test]
async fn chat_is_relayed_and_garbage_is_ignored() {
    let harness = Harness::start().await;
    let game = harness.challenge();
    let mut white = harness.connect(game.as_str()).await;
    let mut black = harness.connect(game.as_str()).await;
    harness.wait_for_participants(2).await;

    send(&mut white, "not json at all").await;
    send(&mut black, "{\"type\":\"message\",\n\"message\":\"good game\"}").await;

    for ws in [&mut white, &mut black] {
        let frame = next_json(ws).await;
        assert_eq!(frame["Type"], "message");
        assert_eq!(frame["Message"], "good game");
    }

    harness.shutdown().await;
}

#[tokio::test]
async fn unknown_session_is_refused() {
    let harness = Harness::start().await;
    let mut ws = harness.connect("does-not-exist").await;

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["Type"], "connection");
    assert_eq!(frame["Error"], "session not found");

    let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap();
    assert!(
        matches!(next, Some(Ok(Message::Close(_))) | None | Some(Err(_))),
        "expected the connection to close, got {next:?}"
    );
    assert_eq!(harness.participants().await, 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn disconnect_unregisters_participant() {
    let harness = Harness::start().await;
    let game = harness.challenge();
    let mut ws = harness.connect(game.as_str()).await;
    harness.wait_for_participants(1).await;

    ws.close(None).await.unwrap();
    harness.wait_for_participants(0).await;

    harness.shutdown().await;
}
