//! # mc-presence: Live Location Relay
//!
//! Workers stream `employee_location` frames over a shared real-time channel.
//! Each valid frame is written to the [`LocationStore`] and then relayed,
//! byte-for-byte, to every connected viewer the [`RecipientPolicy`] admits.
//!
//! ## Pieces
//!
//! - [`message`]: decodes raw inbound text into a tagged [`Inbound`] value.
//!   Unknown `type`s are ignored, malformed frames are rejected.
//! - [`store`]: the `LocationStore` trait, `LocationRecord`, the in-memory
//!   backend and the staleness policy.
//! - [`redis_store`]: the Redis backend used in deployment.
//! - [`policy`]: recipient selection (`BroadcastAll`, `RosterScoped`).
//! - [`hub`]: the broadcast set and fan-out.
//!
//! ## Delivery
//!
//! Best-effort, at most once. Every viewer owns a bounded queue; fan-out uses
//! `try_send`, so one slow viewer loses messages instead of stalling the rest.

pub mod hub;
pub mod message;
pub mod policy;
pub mod redis_store;
pub mod store;

pub use hub::{ConnectionHandle, ConnectionId, Dispatch, Frame, HubConfig, PresenceHub, Viewer};
pub use message::{decode, DecodeError, Inbound, LocationUpdate, EMPLOYEE_LOCATION};
pub use policy::{BroadcastAll, RecipientPolicy, RosterLookup, RosterScoped};
pub use redis_store::RedisLocationStore;
pub use store::{
    LocationRecord, LocationStore, LocationStoreError, MemoryLocationStore, StalenessPolicy,
};
