//! PEX message codec: one tag byte + bincode payload, bounded at 1 MiB.
//!
//! Decoding is a pure transform from bytes to a value or an error; it never
//! touches external state.

use crate::protocol::{PexMessage, TAG_ADDRS, TAG_REQUEST};

/// Maximum encoded message size, tag byte included.
pub const MAX_MSG_SIZE: usize = 1_048_576; // 1 MiB

/// Encode a message: tag byte + bincode payload. `Request` has an empty payload.
pub fn encode_message(msg: &PexMessage) -> Result<Vec<u8>, MsgEncodeError> {
    let mut out = Vec::with_capacity(64);
    match msg {
        PexMessage::Request => out.push(TAG_REQUEST),
        PexMessage::Addrs { addrs } => {
            out.push(TAG_ADDRS);
            let payload = bincode::serialize(addrs).map_err(MsgEncodeError::Encode)?;
            out.extend_from_slice(&payload);
        }
    }
    if out.len() > MAX_MSG_SIZE {
        return Err(MsgEncodeError::TooLarge);
    }
    Ok(out)
}

/// Error encoding a message (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum MsgEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("message exceeds {MAX_MSG_SIZE} bytes")]
    TooLarge,
}

/// Decode a message. Rejects empty input, input over the size bound,
/// unknown tags and malformed payloads.
pub fn decode_message(bytes: &[u8]) -> Result<PexMessage, MsgDecodeError> {
    if bytes.is_empty() {
        return Err(MsgDecodeError::Empty);
    }
    if bytes.len() > MAX_MSG_SIZE {
        return Err(MsgDecodeError::TooLarge);
    }
    let (tag, payload) = (bytes[0], &bytes[1..]);
    match tag {
        TAG_REQUEST => {
            if !payload.is_empty() {
                return Err(MsgDecodeError::TrailingBytes);
            }
            Ok(PexMessage::Request)
        }
        TAG_ADDRS => {
            let addrs = bincode::deserialize(payload).map_err(MsgDecodeError::Decode)?;
            Ok(PexMessage::Addrs { addrs })
        }
        other => Err(MsgDecodeError::UnknownTag(other)),
    }
}

/// Error decoding a message.
#[derive(Debug, thiserror::Error)]
pub enum MsgDecodeError {
    #[error("empty message")]
    Empty,
    #[error("message exceeds {MAX_MSG_SIZE} bytes")]
    TooLarge,
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),
    #[error("unexpected bytes after request tag")]
    TrailingBytes,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::{NetAddress, NodeId};

    fn sample_addr(port: u16) -> NetAddress {
        NetAddress::new(NodeId::random(), "127.0.0.1".parse().unwrap(), port)
    }

    #[test]
    fn request_roundtrip() {
        let bytes = encode_message(&PexMessage::Request).unwrap();
        assert_eq!(bytes, vec![TAG_REQUEST]);
        assert!(matches!(
            decode_message(&bytes).unwrap(),
            PexMessage::Request
        ));
    }

    #[test]
    fn addrs_roundtrip_keeps_absent_entries() {
        let a = sample_addr(1000);
        let b = sample_addr(2000);
        let msg = PexMessage::Addrs {
            addrs: vec![Some(a.clone()), None, Some(b.clone())],
        };
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(bytes[0], TAG_ADDRS);
        match decode_message(&bytes).unwrap() {
            PexMessage::Addrs { addrs } => {
                assert_eq!(addrs, vec![Some(a), None, Some(b)]);
            }
            other => panic!("expected Addrs, got {:?}", other),
        }
    }

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(decode_message(&[]), Err(MsgDecodeError::Empty)));
    }

    #[test]
    fn oversized_input_rejected() {
        let big = vec![TAG_ADDRS; MAX_MSG_SIZE + 1];
        assert!(matches!(
            decode_message(&big),
            Err(MsgDecodeError::TooLarge)
        ));
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(matches!(
            decode_message(&[0x7f]),
            Err(MsgDecodeError::UnknownTag(0x7f))
        ));
    }

    #[test]
    fn request_with_payload_rejected() {
        assert!(matches!(
            decode_message(&[TAG_REQUEST, 0x00]),
            Err(MsgDecodeError::TrailingBytes)
        ));
    }

    #[test]
    fn malformed_addrs_payload_rejected() {
        // Length prefix claims far more entries than the payload holds.
        let bytes = [TAG_ADDRS, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            decode_message(&bytes),
            Err(MsgDecodeError::Decode(_))
        ));
    }
}
