//! One connected browser and its two pumps.
//!
//! The inbound pump reads frames from the socket and hands them to the hub.
//! The outbound pump drains the participant's queue through the move
//! pipeline and writes the results, pinging the peer on a fixed period.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, Stream};
use rook_core::{GameBoard, ParticipantId, SessionId};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::endpoint::{EndpointError, EndpointReader, EndpointWriter};
use crate::hub::{HubHandle, Payload, Registration};
use crate::pipeline::MovePipeline;

/// A live connection attached to one session.
pub struct Participant {
    id: ParticipantId,
    session: SessionId,
    hub: HubHandle,
}

/// Why the outbound pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundExit {
    /// The hub closed the queue.
    QueueClosed,
    /// A write or ping failed.
    WriteFailed(EndpointError),
}

impl Participant {
    /// Create a participant and its outbound queue, and register it.
    pub async fn join(
        session: SessionId,
        hub: HubHandle,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let participant = Self {
            id: ParticipantId::new(),
            session,
            hub,
        };
        participant
            .hub
            .register(Registration {
                id: participant.id.clone(),
                session: participant.session.clone(),
                queue: tx,
            })
            .await;
        (participant, rx)
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Read frames until the connection ends, forwarding each to the hub,
    /// then unregister. Returns what ended the connection.
    pub async fn run_inbound<S, E>(&self, mut reader: EndpointReader<S>) -> EndpointError
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let reason = loop {
            match reader.next_text().await {
                Ok(text) => {
                    let payload: Payload = Arc::from(normalize(&text));
                    self.hub.broadcast(self.session.clone(), payload).await;
                }
                Err(e) => break e,
            }
        };
        match &reason {
            EndpointError::Closed => debug!(participant_id = %self.id, "peer closed connection"),
            other => info!(participant_id = %self.id, reason = %other, "inbound pump stopped"),
        }
        self.hub.unregister(self.id.clone()).await;
        reason
    }
}

/// Drain `queue` through `pipeline` into `writer` until the queue closes or
/// a write fails. Pings every `ping_period` regardless of queue activity.
pub async fn run_outbound<K, E, B>(
    mut writer: EndpointWriter<K>,
    mut queue: mpsc::Receiver<Payload>,
    mut pipeline: MovePipeline<B>,
    ping_period: Duration,
) -> OutboundExit
where
    K: Sink<Message, Error = E> + Unpin,
    E: Display,
    B: GameBoard,
{
    let mut ticker = interval_at(Instant::now() + ping_period, ping_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(payload) = next else {
                    break OutboundExit::QueueClosed;
                };
                let Some(reply) = pipeline.process(payload.as_bytes()) else {
                    continue;
                };
                let text = match reply.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        error!(error = %e, "failed to encode outbound frame");
                        continue;
                    }
                };
                if let Err(e) = writer.send_text(text).await {
                    break OutboundExit::WriteFailed(e);
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = writer.ping().await {
                    break OutboundExit::WriteFailed(e);
                }
            }
        }
    };

    match &exit {
        OutboundExit::QueueClosed => debug!(session_id = %pipeline.session(), "outbound queue closed"),
        OutboundExit::WriteFailed(e) => warn!(session_id = %pipeline.session(), error = %e, "outbound write failed"),
    }
    writer.close().await;
    exit
}

/// Newlines become spaces; surrounding whitespace is trimmed.
pub fn normalize(text: &str) -> String {
    text.replace('\n', " ").trim().to_owned()
}

#[cfg(test)]
mod tests {
    use rook_rules::{Board, STARTING_FEN};
    use rook_settings::HubScope;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::endpoint::testing::socket;
    use crate::hub::Hub;
    use crate::pipeline::testing::MemoryPositions;

    #[test]
    fn normalize_replaces_newlines_and_trims() {
        assert_eq!(normalize("  hello\nworld\n"), "hello world");
        assert_eq!(normalize("{\"type\":\n\"message\"}"), "{\"type\": \"message\"}");
        assert_eq!(normalize("\n\n"), "");
    }

    fn pipeline(session: &str, store: &Arc<MemoryPositions>) -> MovePipeline<Board> {
        MovePipeline::new(
            Board::new(),
            SessionId::from_raw(session),
            Arc::<MemoryPositions>::clone(store),
        )
    }

    #[tokio::test]
    async fn inbound_forwards_normalized_payloads_then_unregisters() {
        let token = CancellationToken::new();
        let (hub, _task) = Hub::spawn(HubScope::Session, 16, token.clone());
        let (participant, mut queue) = Participant::join(SessionId::from_raw("A1"), hub.clone(), 8).await;

        let (stream, _sink, peer) = socket();
        peer.send_text("  {\"type\":\"message\",\n\"message\":\"hi\"}  ");
        drop(peer);

        let reader = EndpointReader::new(stream, 512, Duration::from_secs(60));
        let reason = participant.run_inbound(reader).await;
        assert_eq!(reason, EndpointError::Closed);

        assert_eq!(
            &*queue.recv().await.unwrap(),
            "{\"type\":\"message\", \"message\":\"hi\"}"
        );
        // Unregistered, so the queue is closed.
        assert!(queue.recv().await.is_none());
        assert_eq!(hub.snapshot().await.unwrap().participants(), 0);
    }

    #[tokio::test]
    async fn oversized_frame_ends_inbound_pump() {
        let token = CancellationToken::new();
        let (hub, _task) = Hub::spawn(HubScope::Session, 16, token);
        let (participant, _queue) = Participant::join(SessionId::from_raw("A1"), hub.clone(), 8).await;

        let (stream, _sink, peer) = socket();
        peer.send_text(&"x".repeat(600));
        let reader = EndpointReader::new(stream, 512, Duration::from_secs(60));
        assert!(matches!(
            participant.run_inbound(reader).await,
            EndpointError::TooLarge { .. }
        ));
        assert_eq!(hub.snapshot().await.unwrap().participants(), 0);
    }

    #[tokio::test]
    async fn outbound_writes_pipeline_output_in_order_and_closes() {
        let store = Arc::new(MemoryPositions::with("A1", STARTING_FEN));
        let (tx, rx) = mpsc::channel(8);
        let (_stream, sink, mut peer) = socket();
        let writer = EndpointWriter::new(sink, Duration::from_secs(1));

        let pump = tokio::spawn(run_outbound(
            writer,
            rx,
            pipeline("A1", &store),
            Duration::from_secs(50),
        ));

        tx.send(Arc::from(r#"{"type":"message","message":"first"}"#)).await.unwrap();
        tx.send(Arc::from("garbage")).await.unwrap();
        tx.send(Arc::from(r#"{"type":"connection","message":"second"}"#)).await.unwrap();
        drop(tx);

        let first = peer.next_json().await;
        assert_eq!(first["Type"], "message");
        assert_eq!(first["Message"], "first");
        let second = peer.next_json().await;
        assert_eq!(second["Type"], "connection");
        assert_eq!(second["Message"], "second");
        assert!(matches!(peer.next_frame().await, Some(Message::Close(None))));

        assert_eq!(pump.await.unwrap(), OutboundExit::QueueClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_pings_while_idle() {
        let store = Arc::new(MemoryPositions::with("A1", STARTING_FEN));
        let (tx, rx) = mpsc::channel(8);
        let (_stream, sink, mut peer) = socket();
        let writer = EndpointWriter::new(sink, Duration::from_secs(1));
        let _pump = tokio::spawn(run_outbound(
            writer,
            rx,
            pipeline("A1", &store),
            Duration::from_secs(54),
        ));

        use futures::StreamExt;
        for _ in 0..3 {
            assert!(matches!(peer.from_server.next().await, Some(Message::Ping(_))));
        }
        drop(tx);
    }

    #[tokio::test]
    async fn outbound_stops_on_write_failure() {
        let store = Arc::new(MemoryPositions::with("A1", STARTING_FEN));
        let (tx, rx) = mpsc::channel(8);
        let (_stream, sink, peer) = socket();
        drop(peer);
        let writer = EndpointWriter::new(sink, Duration::from_secs(1));
        let pump = tokio::spawn(run_outbound(
            writer,
            rx,
            pipeline("A1", &store),
            Duration::from_secs(50),
        ));

        tx.send(Arc::from(r#"{"type":"message","message":"lost"}"#)).await.unwrap();
        assert!(matches!(pump.await.unwrap(), OutboundExit::WriteFailed(_)));
    }
}
