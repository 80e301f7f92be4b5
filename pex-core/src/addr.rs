//! Peer identity and network address types.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Opaque peer identity (16 bytes). Assigned by the connection layer during
/// the handshake; this crate only carries it around.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeId(#[serde(with = "bytes_16")] [u8; 16]);

mod bytes_16 {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    pub fn serialize<S: Serializer>(v: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error> {
        v.as_slice().serialize(serializer)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let buf: Vec<u8> = Deserialize::deserialize(d)?;
        buf.try_into()
            .map_err(|_| serde::de::Error::custom("expected 16 bytes"))
    }
}

impl NodeId {
    pub fn new(bytes: [u8; 16]) -> Self {
        NodeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Random ID. Useful for tests and for nodes that have not completed a
    /// handshake yet.
    pub fn random() -> Self {
        NodeId(rand::random())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Network address of a peer: identity plus transport location.
/// Immutable once constructed; de-duplication throughout PEX keys on `id`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetAddress {
    pub id: NodeId,
    pub ip: IpAddr,
    pub port: u16,
}

impl NetAddress {
    pub fn new(id: NodeId, ip: IpAddr, port: u16) -> Self {
        Self { id, ip, port }
    }
}

impl fmt::Display for NetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display_is_hex() {
        let id = NodeId::new([0xab; 16]);
        assert_eq!(id.to_string(), "ab".repeat(16));
    }

    #[test]
    fn net_address_display() {
        let addr = NetAddress::new(NodeId::new([0; 16]), "10.0.0.1".parse().unwrap(), 26656);
        assert_eq!(addr.to_string(), format!("{}@10.0.0.1:26656", "00".repeat(16)));
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(NodeId::random(), NodeId::random());
    }
}
