//! HTTP/2 wire framing (RFC 7540 §4): the 9-byte frame header, frame
//! types, settings identifiers, and error codes, plus encoders for the
//! handful of frames the server originates itself.

/// The 24-byte client connection preface (RFC 7540 §3.5).
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Frame types this server understands. `PUSH_PROMISE` is listed only so
/// an incoming one can be recognized and rejected; this server never
/// sends it (`ENABLE_PUSH=0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    /// Any type this server doesn't recognize; RFC 7540 §4.1 requires
    /// unknown frame types to be ignored, not rejected.
    Unknown(u8),
}

impl FrameType {
    fn from_byte(b: u8) -> Self {
        match b {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x2 => FrameType::Priority,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            0x7 => FrameType::GoAway,
            0x8 => FrameType::WindowUpdate,
            0x9 => FrameType::Continuation,
            other => FrameType::Unknown(other),
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(b) => b,
        }
    }
}

/// Frame header flag bits that matter to this server.
pub mod flags {
    /// Set on SETTINGS/PING to mark the frame as an acknowledgment, and on
    /// HEADERS/DATA to mark the end of a message direction.
    pub const ACK: u8 = 0x1;
    pub const END_STREAM: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// SETTINGS identifiers this server reads (RFC 7540 §6.5.2).
pub mod setting_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// HTTP/2 error codes (RFC 7540 §7), used on both GOAWAY and RST_STREAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
}

impl ErrorCode {
    fn as_u32(self) -> u32 {
        match self {
            ErrorCode::NoError => 0x0,
            ErrorCode::ProtocolError => 0x1,
            ErrorCode::InternalError => 0x2,
            ErrorCode::FlowControlError => 0x3,
            ErrorCode::SettingsTimeout => 0x4,
            ErrorCode::StreamClosed => 0x5,
            ErrorCode::FrameSizeError => 0x6,
            ErrorCode::RefusedStream => 0x7,
            ErrorCode::Cancel => 0x8,
            ErrorCode::CompressionError => 0x9,
        }
    }
}

/// A parsed 9-byte frame header (RFC 7540 §4.1).
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

pub const HEADER_LEN: usize = 9;

/// The clamp RFC 7540 §6.5.2 places on `SETTINGS_MAX_FRAME_SIZE`.
pub const MAX_FRAME_SIZE_RANGE: std::ops::RangeInclusive<u32> = 16384..=16_777_215;

fn write24(out: &mut Vec<u8>, v: u32) {
    out.push((v >> 16) as u8);
    out.push((v >> 8) as u8);
    out.push(v as u8);
}

fn write32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn read24(p: &[u8]) -> u32 {
    (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32
}

impl FrameHeader {
    /// Attempts to parse one frame header plus its payload from the front
    /// of `buf`. Returns `None` if `buf` does not yet hold a complete
    /// frame (header + declared length).
    pub fn parse(buf: &[u8]) -> Option<(FrameHeader, &[u8], usize)> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let length = read24(&buf[0..3]);
        let frame_type = FrameType::from_byte(buf[3]);
        let flags = buf[4];
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
        let total = HEADER_LEN + length as usize;
        if buf.len() < total {
            return None;
        }
        let payload = &buf[HEADER_LEN..total];
        Some((
            FrameHeader {
                length,
                frame_type,
                flags,
                stream_id,
            },
            payload,
            total,
        ))
    }

    fn encode_header(out: &mut Vec<u8>, len: u32, ty: FrameType, flags: u8, stream_id: u32) {
        write24(out, len & 0x00ff_ffff);
        out.push(ty.as_byte());
        out.push(flags);
        write32(out, stream_id & 0x7fff_ffff);
    }
}

/// Builds a complete frame (header + payload) in one buffer.
pub fn make_frame(ty: FrameType, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    FrameHeader::encode_header(&mut out, payload.len() as u32, ty, flags, stream_id);
    out.extend_from_slice(payload);
    out
}

/// A WINDOW_UPDATE frame granting `increment` bytes of credit to
/// `stream_id` (0 for the connection window).
pub fn make_window_update(stream_id: u32, increment: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4);
    write32(&mut payload, increment & 0x7fff_ffff);
    make_frame(FrameType::WindowUpdate, 0, stream_id, &payload)
}

/// An RST_STREAM frame terminating `stream_id` with `code`.
pub fn make_rst_stream(stream_id: u32, code: ErrorCode) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4);
    write32(&mut payload, code.as_u32());
    make_frame(FrameType::RstStream, 0, stream_id, &payload)
}

/// The server's initial SETTINGS frame: `ENABLE_PUSH=0` only, sent on
/// first I/O.
pub fn make_initial_settings() -> Vec<u8> {
    let mut payload = Vec::with_capacity(6);
    payload.extend_from_slice(&setting_id::ENABLE_PUSH.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes());
    make_frame(FrameType::Settings, 0, 0, &payload)
}

/// An empty SETTINGS frame with the ACK flag set.
pub fn make_settings_ack() -> Vec<u8> {
    make_frame(FrameType::Settings, flags::ACK, 0, &[])
}

/// An empty PING frame, or an echo of the peer's 8-byte payload with ACK set.
pub fn make_ping(ack: bool, payload: [u8; 8]) -> Vec<u8> {
    make_frame(FrameType::Ping, if ack { flags::ACK } else { 0 }, 0, &payload)
}

/// A GOAWAY frame reporting the last stream id this endpoint will process.
pub fn make_goaway(last_stream_id: u32, code: ErrorCode, debug: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8 + debug.len());
    write32(&mut payload, last_stream_id & 0x7fff_ffff);
    write32(&mut payload, code.as_u32());
    payload.extend_from_slice(debug);
    make_frame(FrameType::GoAway, 0, 0, &payload)
}

/// A HEADERS frame carrying an already HPACK-encoded block, always with
/// `END_HEADERS` set; no CONTINUATION frame is ever produced.
pub fn make_headers(stream_id: u32, block: &[u8], end_stream: bool) -> Vec<u8> {
    let mut fl = flags::END_HEADERS;
    if end_stream {
        fl |= flags::END_STREAM;
    }
    make_frame(FrameType::Headers, fl, stream_id, block)
}

/// A DATA frame carrying `chunk`, optionally marked `END_STREAM`.
pub fn make_data(stream_id: u32, chunk: &[u8], end_stream: bool) -> Vec<u8> {
    let fl = if end_stream { flags::END_STREAM } else { 0 };
    make_frame(FrameType::Data, fl, stream_id, chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_header_round_trips_length_type_flags_stream() {
        let frame = make_data(3, b"hello", true);
        let (hdr, payload, total) = FrameHeader::parse(&frame).unwrap();
        assert_eq!(hdr.length, 5);
        assert_eq!(hdr.frame_type, FrameType::Data);
        assert_eq!(hdr.flags, flags::END_STREAM);
        assert_eq!(hdr.stream_id, 3);
        assert_eq!(payload, b"hello");
        assert_eq!(total, frame.len());
    }

    #[test]
    fn incomplete_frame_is_not_parsed() {
        let frame = make_data(1, b"hello world", false);
        assert!(FrameHeader::parse(&frame[..HEADER_LEN + 3]).is_none());
    }

    #[test]
    fn stream_id_reserved_bit_is_masked_off() {
        let mut frame = make_window_update(5, 100);
        frame[5] |= 0x80; // set the reserved R bit
        let (hdr, ..) = FrameHeader::parse(&frame).unwrap();
        assert_eq!(hdr.stream_id, 5);
    }

    #[test]
    fn initial_settings_disables_push() {
        let frame = make_initial_settings();
        let (hdr, payload, _) = FrameHeader::parse(&frame).unwrap();
        assert_eq!(hdr.frame_type, FrameType::Settings);
        assert_eq!(hdr.flags, 0);
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), setting_id::ENABLE_PUSH);
        assert_eq!(u32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]), 0);
    }
}
