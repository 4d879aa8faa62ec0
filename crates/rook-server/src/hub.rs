//! Broadcast hub: the single serialization point for participant membership
//! and payload fan-out.
//!
//! One task owns the membership map and processes register, unregister,
//! broadcast and snapshot commands in arrival order. Each member's outbound
//! queue sender lives only in that map, so removing a member closes its
//! queue exactly once. A member whose queue is full when a broadcast arrives
//! is dropped on the spot rather than waited on.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use metrics::{counter, gauge};
use rook_core::{ParticipantId, SessionId};
use rook_settings::HubScope;
use rook_telemetry::recorder::{
    HUB_BACKPRESSURE_DROPS_TOTAL, HUB_BROADCASTS_TOTAL, HUB_PARTICIPANTS_ACTIVE,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Normalized inbound payload, shared by every recipient.
pub type Payload = Arc<str>;

/// A participant joining the hub.
#[derive(Debug)]
pub struct Registration {
    pub id: ParticipantId,
    pub session: SessionId,
    pub queue: mpsc::Sender<Payload>,
}

/// Point-in-time view of hub membership.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Registered participants grouped by session.
    pub members: BTreeMap<SessionId, Vec<ParticipantId>>,
}

impl HubSnapshot {
    /// Total registered participants.
    pub fn participants(&self) -> usize {
        self.members.values().map(Vec::len).sum()
    }

    /// Sessions with at least one participant.
    pub fn sessions(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.members.values().any(|ids| ids.contains(id))
    }
}

enum Command {
    Register(Registration),
    Unregister(ParticipantId),
    Broadcast { from: SessionId, payload: Payload },
    Snapshot(oneshot::Sender<HubSnapshot>),
}

struct Member {
    session: SessionId,
    queue: mpsc::Sender<Payload>,
}

/// Sending side of the hub. Cheap to clone.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
}

impl HubHandle {
    /// Add a participant. Each connection registers once with a fresh id.
    pub async fn register(&self, registration: Registration) {
        self.submit(Command::Register(registration)).await;
    }

    /// Remove a participant and close its queue. No-op if it is not a member.
    pub async fn unregister(&self, id: ParticipantId) {
        self.submit(Command::Unregister(id)).await;
    }

    /// Fan `payload` out to every member in scope of `from`.
    pub async fn broadcast(&self, from: SessionId, payload: Payload) {
        self.submit(Command::Broadcast { from, payload }).await;
    }

    /// Membership as of every command submitted before this one. `None` once
    /// the hub has stopped.
    pub async fn snapshot(&self) -> Option<HubSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::Snapshot(tx)).await;
        rx.await.ok()
    }

    /// Whether the run loop has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn submit(&self, cmd: Command) {
        if self.tx.send(cmd).await.is_err() {
            debug!("hub stopped, dropping command");
        }
    }
}

/// The hub's run loop state.
pub struct Hub {
    scope: HubScope,
    members: HashMap<ParticipantId, Member>,
}

impl Hub {
    /// Start the run loop. It exits when `shutdown` is cancelled or every
    /// handle is dropped, closing all member queues on the way out.
    pub fn spawn(
        scope: HubScope,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let hub = Self {
            scope,
            members: HashMap::new(),
        };
        let task = tokio::spawn(hub.run(rx, shutdown));
        (HubHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        info!(scope = ?self.scope, "hub started");
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }
        let remaining = self.members.len();
        self.members.clear();
        gauge!(HUB_PARTICIPANTS_ACTIVE).set(0.0);
        info!(remaining, "hub stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Register(reg) => {
                debug!(participant_id = %reg.id, session_id = %reg.session, "participant registered");
                let _ = self.members.insert(
                    reg.id,
                    Member {
                        session: reg.session,
                        queue: reg.queue,
                    },
                );
            }
            Command::Unregister(id) => {
                if self.members.remove(&id).is_some() {
                    debug!(participant_id = %id, "participant unregistered");
                }
            }
            Command::Broadcast { from, payload } => self.broadcast(&from, &payload),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
        gauge!(HUB_PARTICIPANTS_ACTIVE).set(self.members.len() as f64);
    }

    fn broadcast(&mut self, from: &SessionId, payload: &Payload) {
        counter!(HUB_BROADCASTS_TOTAL).increment(1);
        let mut dropped = Vec::new();
        for (id, member) in &self.members {
            if self.scope == HubScope::Session && &member.session != from {
                continue;
            }
            match member.queue.try_send(Arc::clone(payload)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(participant_id = %id, session_id = %member.session, "outbound queue full, dropping participant");
                    counter!(HUB_BACKPRESSURE_DROPS_TOTAL).increment(1);
                    dropped.push(id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => dropped.push(id.clone()),
            }
        }
        for id in dropped {
            let _ = self.members.remove(&id);
        }
    }

    fn snapshot(&self) -> HubSnapshot {
        let mut members: BTreeMap<SessionId, Vec<ParticipantId>> = BTreeMap::new();
        for (id, member) in &self.members {
            members
                .entry(member.session.clone())
                .or_default()
                .push(id.clone());
        }
        for ids in members.values_mut() {
            ids.sort();
        }
        HubSnapshot { members }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn spawn(scope: HubScope) -> (HubHandle, CancellationToken) {
        let token = CancellationToken::new();
        let (handle, _task) = Hub::spawn(scope, 64, token.clone());
        (handle, token)
    }

    fn member(session: &str, capacity: usize) -> (Registration, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Registration {
                id: ParticipantId::new(),
                session: SessionId::from_raw(session),
                queue: tx,
            },
            rx,
        )
    }

    fn payload(s: &str) -> Payload {
        Arc::from(s)
    }

    #[tokio::test]
    async fn register_then_unregister() {
        let (hub, _token) = spawn(HubScope::Session);
        let (reg, mut rx) = member("A1", 4);
        let id = reg.id.clone();
        hub.register(reg).await;
        assert!(hub.snapshot().await.unwrap().contains(&id));

        hub.unregister(id.clone()).await;
        let snap = hub.snapshot().await.unwrap();
        assert!(!snap.contains(&id));
        // Queue closed by the hub.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unregister_unknown_is_noop() {
        let (hub, _token) = spawn(HubScope::Session);
        let (reg, _rx) = member("A1", 4);
        hub.register(reg).await;
        hub.unregister(ParticipantId::new()).await;
        assert_eq!(hub.snapshot().await.unwrap().participants(), 1);
    }

    #[tokio::test]
    async fn concurrent_register_unregister_leaves_hub_empty() {
        let (hub, _token) = spawn(HubScope::Session);
        let mut regs = Vec::new();
        let mut receivers = Vec::new();
        for i in 0..100 {
            let (reg, rx) = member(&format!("s{}", i % 7), 2);
            regs.push(reg);
            receivers.push(rx);
        }
        let ids: Vec<ParticipantId> = regs.iter().map(|r| r.id.clone()).collect();

        let joins: Vec<_> = regs
            .into_iter()
            .map(|reg| {
                let hub = hub.clone();
                tokio::spawn(async move { hub.register(reg).await })
            })
            .collect();
        for j in joins {
            j.await.unwrap();
        }
        assert_eq!(hub.snapshot().await.unwrap().participants(), 100);

        let joins: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let hub = hub.clone();
                tokio::spawn(async move { hub.unregister(id).await })
            })
            .collect();
        for j in joins {
            j.await.unwrap();
        }
        let snap = hub.snapshot().await.unwrap();
        assert_eq!(snap.participants(), 0);
        assert_eq!(snap.sessions(), 0);
    }

    #[tokio::test]
    async fn session_scope_only_reaches_same_session() {
        let (hub, _token) = spawn(HubScope::Session);
        let (a, mut rx_a) = member("A1", 4);
        let (b, mut rx_b) = member("A1", 4);
        let (c, mut rx_c) = member("B2", 4);
        hub.register(a).await;
        hub.register(b).await;
        hub.register(c).await;

        hub.broadcast(SessionId::from_raw("A1"), payload("hello")).await;
        let _ = hub.snapshot().await;

        assert_eq!(&*rx_a.recv().await.unwrap(), "hello");
        assert_eq!(&*rx_b.recv().await.unwrap(), "hello");
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn global_scope_reaches_everyone() {
        let (hub, _token) = spawn(HubScope::Global);
        let (a, mut rx_a) = member("A1", 4);
        let (c, mut rx_c) = member("B2", 4);
        hub.register(a).await;
        hub.register(c).await;

        hub.broadcast(SessionId::from_raw("A1"), payload("hello")).await;
        assert_eq!(&*rx_a.recv().await.unwrap(), "hello");
        assert_eq!(&*rx_c.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn full_queue_is_dropped_others_still_served() {
        let (hub, _token) = spawn(HubScope::Session);
        let (slow, mut rx_slow) = member("A1", 1);
        let (fast, mut rx_fast) = member("A1", 1);
        let slow_id = slow.id.clone();
        let fast_id = fast.id.clone();
        // Fill the slow participant's queue before it joins.
        slow.queue.try_send(payload("backlog")).unwrap();
        hub.register(slow).await;
        hub.register(fast).await;

        hub.broadcast(SessionId::from_raw("A1"), payload("move")).await;
        let snap = hub.snapshot().await.unwrap();

        assert!(!snap.contains(&slow_id));
        assert!(snap.contains(&fast_id));
        assert_eq!(&*rx_fast.recv().await.unwrap(), "move");
        // The backlog drains, then the queue reports closed.
        assert_eq!(&*rx_slow.recv().await.unwrap(), "backlog");
        assert!(rx_slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn broadcast_to_many_with_small_queues_is_bounded() {
        let (hub, _token) = spawn(HubScope::Session);
        let mut receivers = Vec::new();
        let mut full = Vec::new();
        for i in 0..300 {
            let (reg, rx) = member("A1", 2);
            if i % 3 == 0 {
                reg.queue.try_send(payload("a")).unwrap();
                reg.queue.try_send(payload("b")).unwrap();
                full.push(reg.id.clone());
            }
            hub.register(reg).await;
            receivers.push(rx);
        }

        let done = tokio::time::timeout(Duration::from_secs(2), async {
            hub.broadcast(SessionId::from_raw("A1"), payload("move")).await;
            hub.snapshot().await.unwrap()
        })
        .await
        .expect("broadcast stalled");

        assert_eq!(done.participants(), 200);
        for id in &full {
            assert!(!done.contains(id));
        }
    }

    #[tokio::test]
    async fn closed_queue_is_pruned_on_broadcast() {
        let (hub, _token) = spawn(HubScope::Session);
        let (reg, rx) = member("A1", 4);
        let id = reg.id.clone();
        hub.register(reg).await;
        drop(rx);
        hub.broadcast(SessionId::from_raw("A1"), payload("x")).await;
        assert!(!hub.snapshot().await.unwrap().contains(&id));
    }

    #[tokio::test]
    async fn shutdown_closes_every_queue() {
        let (hub, token) = spawn(HubScope::Session);
        let (reg, mut rx) = member("A1", 4);
        hub.register(reg).await;
        let _ = hub.snapshot().await;

        token.cancel();
        assert!(rx.recv().await.is_none());
        assert!(hub.snapshot().await.is_none());
    }

    #[test]
    fn snapshot_counts() {
        let mut members = BTreeMap::new();
        let _ = members.insert(SessionId::from_raw("a"), vec![ParticipantId::new(), ParticipantId::new()]);
        let _ = members.insert(SessionId::from_raw("b"), vec![ParticipantId::new()]);
        let snap = HubSnapshot { members };
        assert_eq!(snap.participants(), 3);
        assert_eq!(snap.sessions(), 2);
    }
}
