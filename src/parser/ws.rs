//! WebSocket framing (IETF RFC 6455): the handshake key hash and an
//! incremental frame decoder/encoder, adapted to this crate's "parse
//! what's available, ask for more otherwise" convention.

use std::fmt::Display;

/// Opcodes defined in RFC 6455 §11.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Continuation of a fragmented message.
    Continue,
    /// A complete (or first-fragment) text frame.
    Text,
    /// A complete (or first-fragment) binary frame.
    Binary,
    /// Connection close.
    Close,
    /// Ping.
    Ping,
    /// Pong.
    Pong,
}

impl OpCode {
    fn from_nibble(b: u8) -> Option<OpCode> {
        Some(match b {
            0x0 => OpCode::Continue,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            _ => return None,
        })
    }

    fn as_nibble(self) -> u8 {
        match self {
            OpCode::Continue => 0x0,
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
        }
    }

    /// Control frames (RFC 6455 §5.5) may not be fragmented and carry no
    /// more than 125 bytes of payload.
    pub fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }
}

/// Errors that can occur while decoding a frame off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Reserved bits (RSV1-3) were set without an extension to interpret
    /// them.
    ReservedBitsSet,
    /// Opcode nibble did not match a known opcode.
    UnknownOpcode,
    /// A control frame was fragmented or oversized.
    InvalidControlFrame,
    /// A client-originated frame lacked the mandatory mask bit, or a
    /// server-originated one had it set (RFC 6455 §5.1).
    MaskRequirementViolated,
    /// Payload length exceeded the configured maximum.
    TooLarge,
}

impl Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FrameError::ReservedBitsSet => "reserved bits set without an extension",
            FrameError::UnknownOpcode => "unknown websocket opcode",
            FrameError::InvalidControlFrame => "fragmented or oversized control frame",
            FrameError::MaskRequirementViolated => "frame mask bit did not match direction",
            FrameError::TooLarge => "frame payload exceeded the configured maximum",
        })
    }
}

impl std::error::Error for FrameError {}

/// A single decoded frame (after unmasking). One logical message may arrive
/// as several frames when `fin` is false on all but the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Whether this is the final frame of the message.
    pub fin: bool,
    /// The frame's opcode.
    pub opcode: OpCode,
    /// Unmasked application data.
    pub payload: Vec<u8>,
}

const MASK_FLAG: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0f;
const RSV_MASK: u8 = 0x70;
const LEN_MASK: u8 = 0x7f;

/// Attempts to decode one frame from the front of `buf`.
///
/// `is_server` selects which direction's mask requirement is enforced: a
/// server expects every incoming frame to be masked, a client expects the
/// opposite (RFC 6455 §5.1). Returns `Ok(None)` when `buf` does not yet
/// hold a complete frame. On success, returns the frame plus the number of
/// bytes consumed.
pub fn decode_frame(
    buf: &[u8],
    is_server: bool,
    max_payload: usize,
) -> Result<Option<(Frame, usize)>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let first = buf[0];
    let second = buf[1];

    if first & RSV_MASK != 0 {
        return Err(FrameError::ReservedBitsSet);
    }
    let fin = first & 0x80 != 0;
    let opcode = OpCode::from_nibble(first & OPCODE_MASK).ok_or(FrameError::UnknownOpcode)?;
    if opcode.is_control() && !fin {
        return Err(FrameError::InvalidControlFrame);
    }

    let masked = second & MASK_FLAG != 0;
    if masked != is_server {
        return Err(FrameError::MaskRequirementViolated);
    }

    let mut idx = 2;
    let base_len = second & LEN_MASK;
    let payload_len: u64 = match base_len {
        126 => {
            if buf.len() < idx + 2 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([buf[idx], buf[idx + 1]]) as u64;
            idx += 2;
            len
        }
        127 => {
            if buf.len() < idx + 8 {
                return Ok(None);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[idx..idx + 8]);
            idx += 8;
            u64::from_be_bytes(bytes)
        }
        n => n as u64,
    };

    if opcode.is_control() && payload_len > 125 {
        return Err(FrameError::InvalidControlFrame);
    }
    if payload_len > max_payload as u64 {
        return Err(FrameError::TooLarge);
    }
    let payload_len = payload_len as usize;

    let mask_key = if masked {
        if buf.len() < idx + 4 {
            return Ok(None);
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[idx..idx + 4]);
        idx += 4;
        Some(key)
    } else {
        None
    };

    if buf.len() < idx + payload_len {
        return Ok(None);
    }
    let mut payload = buf[idx..idx + payload_len].to_vec();
    idx += payload_len;

    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    Ok(Some((Frame { fin, opcode, payload }, idx)))
}

/// XORs `data` in place against the repeating 4-byte `mask` (RFC 6455
/// §5.3).
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Serializes one unmasked frame (server-to-client direction; this core
/// never originates masked frames since it only ever plays the server
/// role).
pub fn encode_frame(opcode: OpCode, fin: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    let first = (if fin { 0x80 } else { 0 }) | opcode.as_nibble();
    out.push(first);

    let len = payload.len();
    if len <= 125 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Hashes a `Sec-WebSocket-Key` header value into the `Sec-WebSocket-Accept`
/// response value per RFC 6455 §1.3: `base64(sha1(key + GUID))`, always 28
/// bytes.
pub fn accept_key(key: &str) -> String {
    use base64::Engine as _;
    use sha1::Digest as _;

    let mut hasher = sha1::Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID);
    let digest = hasher.finalize();

    base64::engine::general_purpose::STANDARD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_known_vector() {
        // RFC 6455 §1.3 worked example.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn decodes_small_masked_text_frame() {
        let mut frame = vec![0x81, 0x85];
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        frame.extend_from_slice(&mask);
        let mut payload = *b"Hello";
        apply_mask(&mut payload, mask);
        frame.extend_from_slice(&payload);

        let (decoded, consumed) = decode_frame(&frame, true, 1 << 20).unwrap().unwrap();
        assert_eq!(consumed, frame.len());
        assert!(decoded.fin);
        assert_eq!(decoded.opcode, OpCode::Text);
        assert_eq!(decoded.payload, b"Hello");
    }

    #[test]
    fn incomplete_frame_asks_for_more_data() {
        let frame = [0x81, 0x85, 0x00, 0x00];
        assert_eq!(decode_frame(&frame, true, 1 << 20), Ok(None));
    }

    #[test]
    fn server_rejects_unmasked_frame() {
        let frame = [0x81, 0x02, b'h', b'i'];
        assert_eq!(
            decode_frame(&frame, true, 1 << 20),
            Err(FrameError::MaskRequirementViolated)
        );
    }

    #[test]
    fn fragmented_control_frame_is_rejected() {
        // FIN=0, opcode=Ping, masked, zero-length payload.
        let frame = [0x09, 0x80, 0, 0, 0, 0];
        assert_eq!(
            decode_frame(&frame, true, 1 << 20),
            Err(FrameError::InvalidControlFrame)
        );
    }

    #[test]
    fn encode_then_decode_round_trips_unmasked_binary() {
        let encoded = encode_frame(OpCode::Binary, true, b"payload");
        let mut masked = encoded.clone();
        masked[1] |= MASK_FLAG;
        masked.splice(2..2, [0u8; 4]);
        let (decoded, _) = decode_frame(&masked, true, 1 << 20).unwrap().unwrap();
        assert_eq!(decoded.opcode, OpCode::Binary);
        assert_eq!(decoded.payload, b"payload");
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let frame = [0x82, 0xfe, 0xff, 0xff];
        assert_eq!(decode_frame(&frame, true, 10), Err(FrameError::TooLarge));
    }
}
