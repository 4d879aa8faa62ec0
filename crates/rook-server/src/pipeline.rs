//! Move pipeline: turns one broadcast payload into the frame written to one
//! participant, applying moves to that participant's board and persisting
//! accepted positions.

use std::sync::Arc;

use metrics::counter;
use rook_core::protocol::{InboundMessage, OutboundMessage};
use rook_core::{GameBoard, SessionId};
use rook_settings::HubScope;
use rook_store::PositionStore;
use rook_telemetry::recorder::{
    MOVES_APPLIED_TOTAL, MOVES_REJECTED_TOTAL, STORE_WRITE_ERRORS_TOTAL,
};
use tracing::{debug, error, warn};

/// Per-participant pipeline state.
pub struct MovePipeline<B> {
    board: B,
    session: SessionId,
    scope: HubScope,
    store: Arc<dyn PositionStore>,
}

impl<B: GameBoard> MovePipeline<B> {
    /// A session-scoped pipeline: accepted moves persist to `session`.
    pub fn new(board: B, session: SessionId, store: Arc<dyn PositionStore>) -> Self {
        Self {
            board,
            session,
            scope: HubScope::Session,
            store,
        }
    }

    /// Under [`HubScope::Global`] a move persists to the id it carries.
    #[must_use]
    pub fn with_scope(mut self, scope: HubScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Current position of this participant's board.
    pub fn position(&self) -> String {
        self.board.position()
    }

    /// Process one payload. `None` means nothing is written back.
    pub fn process(&mut self, payload: &[u8]) -> Option<OutboundMessage> {
        let msg = match InboundMessage::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(session_id = %self.session, error = %e, "dropping undecodable payload");
                return None;
            }
        };
        match msg {
            InboundMessage::Move {
                origin,
                destination,
                session_id,
            } => {
                let target = self.target(session_id);
                Some(self.apply(&target, &origin, &destination))
            }
            InboundMessage::Chat { text } => Some(OutboundMessage::Chat { text }),
            InboundMessage::Connect { text } => Some(OutboundMessage::Connect { text }),
            InboundMessage::Unknown { kind } => {
                debug!(session_id = %self.session, kind = %kind, "ignoring unknown frame type");
                None
            }
        }
    }

    fn target(&self, requested: SessionId) -> SessionId {
        if requested.is_empty() || requested == self.session {
            return self.session.clone();
        }
        match self.scope {
            HubScope::Global => requested,
            HubScope::Session => {
                debug!(session_id = %self.session, requested = %requested, "ignoring foreign session id on move");
                self.session.clone()
            }
        }
    }

    fn apply(&mut self, target: &SessionId, origin: &str, destination: &str) -> OutboundMessage {
        let position = match self.board.apply_move(origin, destination) {
            Ok(position) => position,
            Err(e) => {
                counter!(MOVES_REJECTED_TOTAL).increment(1);
                debug!(session_id = %target, origin, destination, reason = %e, "move rejected");
                return OutboundMessage::Move {
                    position: self.board.position(),
                    notice: e.to_string(),
                };
            }
        };
        counter!(MOVES_APPLIED_TOTAL).increment(1);

        if cfg!(debug_assertions) {
            self.check_round_trip(&position);
        }

        if let Err(e) = self.store.save(target, &position) {
            counter!(STORE_WRITE_ERRORS_TOTAL).increment(1);
            error!(session_id = %target, error = %e, "failed to persist position");
        }

        OutboundMessage::Move {
            position,
            notice: self.board.status().notice().to_owned(),
        }
    }

    fn check_round_trip(&self, position: &str) {
        match B::from_position(position) {
            Ok(decoded) if decoded.position() == position => {}
            Ok(decoded) => warn!(
                session_id = %self.session,
                position,
                decoded = %decoded.position(),
                "position does not survive a round trip"
            ),
            Err(e) => warn!(
                session_id = %self.session,
                position,
                error = %e,
                "position does not decode"
            ),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory position store.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use rook_core::SessionId;
    use rook_store::{PositionStore, StoreError};

    #[derive(Default)]
    pub(crate) struct MemoryPositions {
        positions: Mutex<HashMap<SessionId, String>>,
        failing: bool,
    }

    impl MemoryPositions {
        pub(crate) fn with(id: &str, position: &str) -> Self {
            let store = Self::default();
            let _ = store
                .positions
                .lock()
                .unwrap()
                .insert(SessionId::from_raw(id), position.to_owned());
            store
        }

        /// A store whose writes always fail.
        pub(crate) fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        pub(crate) fn get(&self, id: &str) -> Option<String> {
            self.positions
                .lock()
                .unwrap()
                .get(&SessionId::from_raw(id))
                .cloned()
        }
    }

    impl PositionStore for MemoryPositions {
        fn load(&self, id: &SessionId) -> Result<String, StoreError> {
            self.positions
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound {
                    bucket: "memory".into(),
                    key: id.to_string(),
                })
        }

        fn save(&self, id: &SessionId, position: &str) -> Result<(), StoreError> {
            if self.failing {
                return Err(StoreError::Database("disk full".into()));
            }
            let _ = self
                .positions
                .lock()
                .unwrap()
                .insert(id.clone(), position.to_owned());
            Ok(())
        }
    }
}
