//! Session bootstrap: attach one upgraded connection to its session.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, Stream};
use metrics::counter;
use rook_core::protocol::OutboundMessage;
use rook_core::{GameBoard, SessionId};
use rook_settings::HubScope;
use rook_store::PositionStore;
use rook_telemetry::recorder::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};
use tracing::{info, instrument, warn};

use crate::config::SessionLimits;
use crate::endpoint::{EndpointReader, EndpointWriter};
use crate::hub::HubHandle;
use crate::participant::{run_outbound, Participant};
use crate::pipeline::MovePipeline;

/// Error text sent when the session has no readable position.
pub const SESSION_NOT_FOUND: &str = "session not found";

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct SessionContext {
    pub hub: HubHandle,
    pub store: Arc<dyn PositionStore>,
    pub limits: SessionLimits,
    /// Hub scope; decides where accepted moves persist.
    pub scope: HubScope,
}

/// Run one connection against `session` until it is fully torn down.
///
/// A session without a readable position gets a refusal frame and a close.
#[instrument(skip_all, fields(session_id = %session))]
pub async fn run_session<B, K, S, E>(sink: K, stream: S, session: SessionId, ctx: SessionContext)
where
    B: GameBoard,
    K: Sink<Message> + Unpin + Send + 'static,
    K::Error: Display + Send + 'static,
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut writer = EndpointWriter::new(sink, ctx.limits.write_wait);

    // Register before loading so moves broadcast in between are queued
    // rather than missed.
    let (participant, queue) = Participant::join(
        session.clone(),
        ctx.hub.clone(),
        ctx.limits.outbound_queue_capacity,
    )
    .await;

    let board = match load_board::<B>(ctx.store.as_ref(), &session) {
        Ok(board) => board,
        Err(reason) => {
            warn!(reason = %reason, "refusing connection");
            ctx.hub.unregister(participant.id().clone()).await;
            drop(queue);
            let refusal = OutboundMessage::Refused {
                error: SESSION_NOT_FOUND.into(),
            };
            if let Ok(text) = refusal.encode() {
                let _ = writer.send_text(text).await;
            }
            writer.close().await;
            return;
        }
    };

    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(participant_id = %participant.id(), "participant joined");

    let pipeline =
        MovePipeline::new(board, session, Arc::clone(&ctx.store)).with_scope(ctx.scope);
    let outbound = tokio::spawn(run_outbound(
        writer,
        queue,
        pipeline,
        ctx.limits.ping_period,
    ));

    let reader = EndpointReader::new(stream, ctx.limits.max_message_size, ctx.limits.pong_wait);
    let reason = participant.run_inbound(reader).await;

    // Unregistering closed the queue, so the outbound pump is winding down.
    let exit = match outbound.await {
        Ok(exit) => format!("{exit:?}"),
        Err(e) => format!("outbound task failed: {e}"),
    };
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    info!(participant_id = %participant.id(), reason = %reason, outbound = %exit, "participant left");
}

fn load_board<B: GameBoard>(store: &dyn PositionStore, session: &SessionId) -> Result<B, String> {
    let position = store.load(session).map_err(|e| e.to_string())?;
    B::from_position(&position).map_err(|e| e.to_string())
}
