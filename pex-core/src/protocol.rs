//! PEX message types and channel descriptor.

use serde::{Deserialize, Serialize};

use crate::addr::NetAddress;

/// Channel PEX messages travel on.
pub const PEX_CHANNEL: u8 = 0x00;

/// Wire discriminant for `PexMessage::Request`.
pub const TAG_REQUEST: u8 = 0x01;
/// Wire discriminant for `PexMessage::Addrs`.
pub const TAG_ADDRS: u8 = 0x02;

/// Describes a channel to the connection layer: ID, scheduling priority and
/// a send-queue capacity hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub id: u8,
    pub priority: u8,
    pub send_queue_capacity: usize,
}

/// Descriptor for the PEX channel.
pub const fn pex_channel_descriptor() -> ChannelDescriptor {
    ChannelDescriptor {
        id: PEX_CHANNEL,
        priority: 1,
        send_queue_capacity: 10,
    }
}

/// All PEX wire messages. Encoding is a one-byte tag followed by a bincode
/// payload (see wire module).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PexMessage {
    /// Ask the receiver for a selection of known addresses.
    Request,
    /// Announce known addresses. Entries may be absent; consumers must
    /// filter them out.
    Addrs { addrs: Vec<Option<NetAddress>> },
}
