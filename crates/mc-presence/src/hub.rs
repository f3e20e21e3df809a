//! # Presence Hub
//!
//! The broadcast set and the fan-out path.
//!
//! ## Connection lifecycle
//!
//! [`PresenceHub::connect`] registers a [`Viewer`] and returns a
//! [`ConnectionHandle`] owning the receiving end of that viewer's bounded
//! queue. The transport drains the handle and calls
//! [`PresenceHub::on_message`] for every inbound text frame, then
//! [`PresenceHub::disconnect`] when the socket ends. Disconnecting never
//! touches the location store: a worker's last position outlives the socket.
//!
//! ## Fan-out
//!
//! For a valid `employee_location` frame the hub awaits the store write, then
//! relays the inbound frame text to every viewer the policy admits.
//!
//! Events are sequenced in arrival order. A decoded frame queues on a fair
//! async mutex before its store write and holds it through fan-out, so
//! viewers see events in the order the hub received them, and the last frame
//! a viewer saw for an identity is the record the store holds. Writes to the
//! store are therefore serialized across connections.
//!
//! The broadcast set is snapshotted under a read lock and released before
//! sending; a viewer joining or leaving mid-event may or may not get that
//! event.
//!
//! Sends are `try_send`. A full queue drops the frame for that viewer only.
//! A closed queue means the transport is gone, and the viewer is removed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::Mutex;

use mc_core::{Identity, Role};

use crate::message::{decode, Inbound, LocationUpdate};
use crate::policy::RecipientPolicy;
use crate::store::{LocationRecord, LocationStore};

/// An outbound frame. Shared by every recipient of one event.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Who is on the other end of a connection, as far as the session layer
/// could tell. Both fields are optional; the hub itself never rejects a
/// viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Viewer {
    pub identity: Option<Identity>,
    pub role: Option<Role>,
}

impl Viewer {
    pub fn new(identity: Option<Identity>, role: Option<Role>) -> Self {
        Self { identity, role }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Outbound frames buffered per viewer before further frames are dropped.
    pub queue_depth: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { queue_depth: 64 }
    }
}

/// What the hub did with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Stored and relayed.
    Relayed {
        /// Viewers whose queue accepted the frame.
        delivered: usize,
        /// Viewers admitted by the policy whose queue was full.
        dropped: usize,
    },
    /// Well-formed frame of a type the hub does not handle.
    Ignored { kind: String },
    /// Undecodable frame. Logged and dropped.
    Malformed,
    /// The location store rejected the write. Nothing was relayed.
    StoreFailed,
}

/// Receiving side of one viewer's queue.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    receiver: mpsc::Receiver<Frame>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next frame for this viewer. `None` once the hub has dropped the
    /// viewer. Cancel-safe.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Frame, TryRecvError> {
        self.receiver.try_recv()
    }
}

struct Slot {
    id: ConnectionId,
    viewer: Viewer,
    sender: mpsc::Sender<Frame>,
}

struct HubInner {
    store: Arc<dyn LocationStore>,
    policy: Arc<dyn RecipientPolicy>,
    config: HubConfig,
    viewers: RwLock<HashMap<ConnectionId, Arc<Slot>>>,
    /// Held from store write through fan-out. Tokio's mutex is FIFO.
    sequencer: Mutex<()>,
    next_id: AtomicU64,
}

/// Cheap to clone; clones share one broadcast set.
#[derive(Clone)]
pub struct PresenceHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for PresenceHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceHub")
            .field("store", &self.inner.store.backend())
            .field("policy", &self.inner.policy.name())
            .field("viewers", &self.viewer_count())
            .finish()
    }
}

impl PresenceHub {
    pub fn new(
        store: Arc<dyn LocationStore>,
        policy: Arc<dyn RecipientPolicy>,
        config: HubConfig,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                store,
                policy,
                config,
                viewers: RwLock::new(HashMap::new()),
                sequencer: Mutex::new(()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn LocationStore> {
        &self.inner.store
    }

    pub fn policy_name(&self) -> &'static str {
        self.inner.policy.name()
    }

    pub fn viewer_count(&self) -> usize {
        self.inner.viewers.read().len()
    }

    /// Register a viewer. No authentication happens here.
    pub fn connect(&self, viewer: Viewer) -> ConnectionHandle {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.inner.config.queue_depth.max(1));
        let count = {
            let mut viewers = self.inner.viewers.write();
            viewers.insert(id, Arc::new(Slot { id, viewer, sender }));
            viewers.len()
        };
        metrics::gauge!("mc_presence_viewers").set(count as f64);
        tracing::debug!(connection = %id, viewers = count, "viewer connected");
        ConnectionHandle { id, receiver }
    }

    /// Remove a viewer from the broadcast set. Returns `false` if it was
    /// already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut viewers = self.inner.viewers.write();
            (viewers.remove(&id).is_some(), viewers.len())
        };
        if removed {
            metrics::gauge!("mc_presence_viewers").set(count as f64);
            tracing::debug!(connection = %id, viewers = count, "viewer disconnected");
        }
        removed
    }

    /// Handle one inbound text frame from connection `from`.
    pub async fn on_message(&self, from: ConnectionId, raw: &str) -> Dispatch {
        let update = match decode(raw) {
            Ok(Inbound::Location(update)) => update,
            Ok(Inbound::Unrecognized(kind)) => {
                tracing::trace!(connection = %from, %kind, "ignoring presence frame");
                metrics::counter!("mc_presence_events_total", "outcome" => "ignored").increment(1);
                return Dispatch::Ignored { kind };
            }
            Err(e) => {
                tracing::warn!(connection = %from, error = %e, "dropping malformed presence frame");
                metrics::counter!("mc_presence_events_total", "outcome" => "malformed").increment(1);
                return Dispatch::Malformed;
            }
        };

        let _turn = self.inner.sequencer.lock().await;
        let record = LocationRecord::now(update.coordinate);
        if let Err(e) = self.inner.store.set(&update.email, record).await {
            tracing::error!(
                connection = %from,
                identity = %update.email,
                error = %e,
                "location write failed, frame not relayed"
            );
            metrics::counter!("mc_presence_events_total", "outcome" => "store_failed").increment(1);
            return Dispatch::StoreFailed;
        }

        let dispatch = self.relay(&update, Arc::from(raw));
        metrics::counter!("mc_presence_events_total", "outcome" => "relayed").increment(1);
        dispatch
    }

    fn relay(&self, update: &LocationUpdate, frame: Frame) -> Dispatch {
        let snapshot: Vec<Arc<Slot>> = self.inner.viewers.read().values().cloned().collect();

        let mut delivered = 0;
        let mut dropped = 0;
        let mut closed = Vec::new();
        for slot in &snapshot {
            if !self.inner.policy.admits(&slot.viewer, update) {
                continue;
            }
            match slot.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    tracing::debug!(connection = %slot.id, "viewer queue full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(slot.id),
            }
        }
        if dropped > 0 {
            metrics::counter!("mc_presence_deliveries_dropped_total").increment(dropped as u64);
        }

        for id in closed {
            self.disconnect(id);
        }
        Dispatch::Relayed { delivered, dropped }
    }
}
