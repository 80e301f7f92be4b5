//! Contracts of the reactor's collaborators.
//!
//! The address book and the connection manager are owned elsewhere and are
//! assumed safe under concurrent access; the reactor never assumes exclusive
//! access and never holds a lock across a call into either.

use std::sync::Arc;

use async_trait::async_trait;
use pex_core::{NetAddress, NodeId};

/// Address book error. `AlreadyStarted` is tolerated by the reactor on
/// startup; anything else aborts it.
#[derive(Debug, thiserror::Error)]
pub enum BookError {
    #[error("address book already started")]
    AlreadyStarted,
    #[error("address book error: {0}")]
    Other(String),
}

/// Transport-level dial failure. The reactor only turns it into a failed
/// attempt mark against the address; it is never surfaced further.
#[derive(Debug, thiserror::Error)]
#[error("dial failed: {0}")]
pub struct DialError(pub String);

/// Known-address storage with vetting buckets and attempt bookkeeping.
pub trait AddrBook: Send + Sync {
    fn start(&self) -> Result<(), BookError>;
    fn stop(&self);
    /// Whether the book wants to be fed more addresses.
    fn need_more_addrs(&self) -> bool;
    /// A selection of addresses suitable to send to a requesting peer.
    /// An empty selection is valid.
    fn get_selection(&self) -> Vec<NetAddress>;
    /// Pick one address; `bias` in [0, 100] weighs vetted over fresh buckets.
    fn pick_address(&self, bias: u8) -> Option<NetAddress>;
    /// Register `addr`, crediting `source` as where it was learned from.
    fn add_address(&self, addr: &NetAddress, source: &NetAddress);
    /// Record a failed dial attempt against `addr`.
    fn mark_attempt(&self, addr: &NetAddress);
}

/// Live peer counts as seen by the connection manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCounts {
    pub outbound: usize,
    pub inbound: usize,
    pub dialing: usize,
}

/// Live peer set and dialing, owned by the connection/session layer.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    fn num_peers(&self) -> PeerCounts;
    fn is_dialing(&self, id: &NodeId) -> bool;
    fn has_peer(&self, id: &NodeId) -> bool;
    fn peers(&self) -> Vec<Arc<dyn Peer>>;
    /// Dial one address. `persistent` peers are redialed on disconnect.
    async fn dial_peer_with_address(
        &self,
        addr: &NetAddress,
        persistent: bool,
    ) -> Result<(), DialError>;
    /// Resolve and dial seed addresses, feeding resolved ones into `book`.
    async fn dial_peers_async(&self, book: Arc<dyn AddrBook>, seeds: &[String], persistent: bool);
}

/// A live connection. The reactor holds no reference beyond a call's duration.
pub trait Peer: Send + Sync {
    fn id(&self) -> NodeId;
    fn addr(&self) -> NetAddress;
    fn is_outbound(&self) -> bool;
    /// Best-effort send; returns false if the peer is unreachable or its
    /// send queue is full.
    fn try_send(&self, channel: u8, payload: Vec<u8>) -> bool;
}
