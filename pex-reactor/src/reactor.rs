//! The PEX reactor: message dispatch, peer add/remove hooks, and the two
//! background loops (ensure-peers and counter flush).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use pex_core::{
    decode_message, encode_message, pex_channel_descriptor, ChannelDescriptor, NetAddress, NodeId,
    PeerMessageCounter, PexMessage, PEX_CHANNEL,
};

use crate::config::ReactorConfig;
use crate::traits::{AddrBook, BookError, ConnectionManager, Peer};

/// Upper bound on concurrently running dial tasks. Tasks past the bound
/// queue on a semaphore instead of piling up.
const MAX_CONCURRENT_DIALS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Started,
    Stopped,
}

/// Reactor lifecycle error.
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error("reactor already started")]
    AlreadyStarted,
    #[error(transparent)]
    Book(#[from] BookError),
}

/// Handles peer exchange and keeps an adequate number of outbound peers
/// connected through the connection manager.
///
/// Abuse prevention is a bounded per-peer message counter flushed on a fixed
/// interval; an abusive peer is only ever logged, never disconnected.
pub struct PexReactor {
    book: Arc<dyn AddrBook>,
    conn: Arc<dyn ConnectionManager>,
    seeds: Vec<String>,

    ensure_peers_period_ms: AtomicU64,
    msg_flush_interval_ms: AtomicU64,
    max_msg_count_by_peer: AtomicU16,
    min_outbound_peers: AtomicUsize,

    msg_count_by_peer: PeerMessageCounter,
    dial_permits: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    state: Mutex<Lifecycle>,
}

impl PexReactor {
    pub fn new(
        book: Arc<dyn AddrBook>,
        conn: Arc<dyn ConnectionManager>,
        config: &ReactorConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            book,
            conn,
            seeds: config.seeds.clone(),
            ensure_peers_period_ms: AtomicU64::new(config.ensure_peers_period().as_millis() as u64),
            msg_flush_interval_ms: AtomicU64::new(config.msg_flush_interval().as_millis() as u64),
            max_msg_count_by_peer: AtomicU16::new(config.max_msg_count_by_peer),
            min_outbound_peers: AtomicUsize::new(config.min_outbound_peers),
            msg_count_by_peer: PeerMessageCounter::new(),
            dial_permits: Arc::new(Semaphore::new(MAX_CONCURRENT_DIALS)),
            shutdown,
            state: Mutex::new(Lifecycle::Created),
        }
    }

    /// Channels this reactor speaks on.
    pub fn channels(&self) -> Vec<ChannelDescriptor> {
        vec![pex_channel_descriptor()]
    }

    pub fn ensure_peers_period(&self) -> Duration {
        Duration::from_millis(self.ensure_peers_period_ms.load(Ordering::Relaxed))
    }

    /// Change the ensure-peers period. Takes effect from the next tick.
    pub fn set_ensure_peers_period(&self, period: Duration) {
        self.ensure_peers_period_ms
            .store(period.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn max_msg_count_by_peer(&self) -> u16 {
        self.max_msg_count_by_peer.load(Ordering::Relaxed)
    }

    /// Change the per-window message allowance per peer.
    pub fn set_max_msg_count_by_peer(&self, max: u16) {
        self.max_msg_count_by_peer.store(max, Ordering::Relaxed);
    }

    pub fn min_outbound_peers(&self) -> usize {
        self.min_outbound_peers.load(Ordering::Relaxed)
    }

    /// Change the outbound-connection target.
    pub fn set_min_outbound_peers(&self, min: usize) {
        self.min_outbound_peers.store(min, Ordering::Relaxed);
    }

    fn msg_flush_interval(&self) -> Duration {
        Duration::from_millis(self.msg_flush_interval_ms.load(Ordering::Relaxed))
    }

    /// Start the address book (tolerating one that is already running) and
    /// spawn the ensure-peers and counter-flush loops. Must be called inside
    /// a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), ReactorError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != Lifecycle::Created {
                return Err(ReactorError::AlreadyStarted);
            }
            *state = Lifecycle::Started;
        }
        match self.book.start() {
            Ok(()) | Err(BookError::AlreadyStarted) => {}
            Err(e) => {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                *state = Lifecycle::Created;
                return Err(e.into());
            }
        }
        // Subscribe before spawning so a stop() racing the spawns is still
        // observed by both loops.
        let reactor = self.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move { reactor.ensure_peers_loop(shutdown).await });
        let reactor = self.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move { reactor.flush_msg_count_loop(shutdown).await });
        Ok(())
    }

    /// Stop the address book and signal both loops to exit. Idempotent.
    /// Does not wait for outstanding dial tasks; a dial that fails after
    /// stop merely marks an attempt against a book that may be stopping too.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != Lifecycle::Started {
                return;
            }
            *state = Lifecycle::Stopped;
        }
        self.book.stop();
        let _ = self.shutdown.send(true);
    }

    /// Hook for a newly connected peer. Outbound: ask it for addresses if
    /// the book wants more. Inbound: the peer vouches for its own address.
    pub fn add_peer(&self, peer: &dyn Peer) {
        if peer.is_outbound() {
            if self.book.need_more_addrs() {
                self.request_pex(peer);
            }
        } else {
            let addr = peer.addr();
            self.book.add_address(&addr, &addr);
        }
    }

    /// Hook for a disconnected peer. No per-peer state is cleaned up here;
    /// the peer's counter entry lives until the next bulk flush.
    pub fn remove_peer(&self, peer: &dyn Peer, reason: &str) {
        debug!(peer = %peer.addr(), reason, "peer removed");
    }

    /// Protocol entry point for raw PEX bytes from `src`.
    pub fn receive(&self, channel: u8, src: &dyn Peer, msg_bytes: &[u8]) {
        let src_addr = src.addr();
        let count = self.msg_count_by_peer.increment(src_addr.id);
        if count > self.max_msg_count_by_peer() {
            warn!(peer = %src_addr, count, "dropping message, peer over per-window limit");
            return;
        }

        let msg = match decode_message(msg_bytes) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(peer = %src_addr, error = %e, "dropping undecodable message");
                return;
            }
        };
        debug!(peer = %src_addr, channel, ?msg, "received message");

        match msg {
            PexMessage::Request => {
                // The selection may be empty; that is a valid reply.
                self.send_addrs(src, self.book.get_selection());
            }
            PexMessage::Addrs { addrs } => {
                for addr in addrs.into_iter().flatten() {
                    self.book.add_address(&addr, &src_addr);
                }
            }
        }
    }

    /// Ask `peer` for more addresses. Fire-and-forget; any reply comes back
    /// through the normal receive path.
    pub fn request_pex(&self, peer: &dyn Peer) {
        match encode_message(&PexMessage::Request) {
            Ok(bytes) => {
                if !peer.try_send(PEX_CHANNEL, bytes) {
                    debug!(peer = %peer.addr(), "pex request not sent");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode pex request"),
        }
    }

    /// Send `addrs` to `peer`. The sequence may be empty.
    pub fn send_addrs(&self, peer: &dyn Peer, addrs: Vec<NetAddress>) {
        let msg = PexMessage::Addrs {
            addrs: addrs.into_iter().map(Some).collect(),
        };
        match encode_message(&msg) {
            Ok(bytes) => {
                if !peer.try_send(PEX_CHANNEL, bytes) {
                    debug!(peer = %peer.addr(), "addrs not sent");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode addrs"),
        }
    }

    /// One ensure-peers run: compute the outbound deficit, pick candidates
    /// from the book with a vetting bias, dial them detached, and fall back
    /// to a PEX request or the seed list when starved.
    pub fn ensure_peers(&self) {
        let counts = self.conn.num_peers();
        let num_to_dial = self
            .min_outbound_peers()
            .saturating_sub(counts.outbound + counts.dialing);
        info!(
            num_out = counts.outbound,
            num_dialing = counts.dialing,
            num_to_dial,
            "ensure peers"
        );
        if num_to_dial == 0 {
            return;
        }

        let bias = dial_bias(counts.outbound);
        let mut to_dial: HashMap<NodeId, NetAddress> = HashMap::new();
        let max_attempts = num_to_dial * 3;
        let mut attempts = 0;
        while attempts < max_attempts && to_dial.len() < num_to_dial {
            attempts += 1;
            let Some(picked) = self.book.pick_address(bias) else {
                continue;
            };
            if to_dial.contains_key(&picked.id) {
                continue;
            }
            if self.conn.is_dialing(&picked.id) {
                continue;
            }
            if self.conn.has_peer(&picked.id) {
                continue;
            }
            info!(addr = %picked, "will dial address");
            to_dial.insert(picked.id, picked);
        }

        let num_dialed = to_dial.len();
        for (_, picked) in to_dial {
            let conn = self.conn.clone();
            let book = self.book.clone();
            let permits = self.dial_permits.clone();
            tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if let Err(e) = conn.dial_peer_with_address(&picked, false).await {
                    debug!(addr = %picked, error = %e, "dial failed");
                    book.mark_attempt(&picked);
                }
            });
        }

        // Ask one connected peer for more addresses if the book is low.
        if self.book.need_more_addrs() {
            let peers = self.conn.peers();
            if let Some(peer) = peers.choose(&mut rand::thread_rng()) {
                info!(peer = %peer.addr(), "need more addresses, sending pex request");
                self.request_pex(peer.as_ref());
            }
        }

        // Fully isolated and nothing picked this tick: dial the seeds.
        if counts.outbound + counts.inbound + counts.dialing + num_dialed == 0 {
            info!(seeds = ?self.seeds, "no peers, no dials in flight, dialing seeds");
            let conn = self.conn.clone();
            let book = self.book.clone();
            let seeds = self.seeds.clone();
            tokio::spawn(async move {
                conn.dial_peers_async(book, &seeds, false).await;
            });
        }
    }

    async fn ensure_peers_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        // Random initial delay so restarted nodes do not tick in lockstep.
        let period_ms = self.ensure_peers_period().as_millis() as u64;
        let jitter = if period_ms > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..period_ms))
        } else {
            Duration::ZERO
        };
        tokio::select! {
            _ = sleep(jitter) => {}
            _ = shutdown.changed() => return,
        }

        loop {
            self.ensure_peers();
            tokio::select! {
                _ = sleep(self.ensure_peers_period()) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn flush_msg_count_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = sleep(self.msg_flush_interval()) => self.msg_count_by_peer.flush(),
                _ = shutdown.changed() => return,
            }
        }
    }

    #[cfg(test)]
    fn msg_count(&self, id: &NodeId) -> u16 {
        self.msg_count_by_peer.count(id)
    }
}

/// Selection bias in [10, 90]: more outbound connections push picks toward
/// vetted addresses, fewer allow exploring fresh ones.
fn dial_bias(num_outbound: usize) -> u8 {
    (num_outbound.min(8) * 10 + 10) as u8
}
