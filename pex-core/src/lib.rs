//! PEX (peer exchange) protocol core.
//! No I/O; the reactor crate drives these types from tokio.

pub mod addr;
pub mod counter;
pub mod protocol;
pub mod wire;

pub use addr::{NetAddress, NodeId};
pub use counter::PeerMessageCounter;
pub use protocol::{pex_channel_descriptor, ChannelDescriptor, PexMessage, PEX_CHANNEL};
pub use wire::{decode_message, encode_message, MsgDecodeError, MsgEncodeError, MAX_MSG_SIZE};
