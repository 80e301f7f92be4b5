//! PEX reactor: gossips known peer addresses and keeps a minimum number of
//! outbound connections alive by periodically dialing new ones.
//!
//! Address storage, transport-level dialing and handshakes live behind the
//! traits in [`traits`]; this crate orchestrates them.

pub mod config;
pub mod reactor;
pub mod traits;

pub use config::ReactorConfig;
pub use reactor::{PexReactor, ReactorError};
pub use traits::{AddrBook, BookError, ConnectionManager, DialError, Peer, PeerCounts};
