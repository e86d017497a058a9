//! SPDY frame types.
//!
//! Every frame starts with an 8 byte header. The first bit tells control frames
//! apart from data frames:
//!
//! ```text
//! control: |1| version (15) | type (16) | flags (8) | length (24) | payload
//! data:    |0| stream id (31)           | flags (8) | length (24) | payload
//! ```
//!
//! Control frames keep their payload as raw bytes; the typed views
//! ([`SynStream`], [`RstStream`], [`Ping`], [`GoAway`]) parse it on demand.
//! Header blocks stay compressed here, they can only be inflated in order by
//! the session that owns the compression context.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ensure;
use crate::protocol::DecodeError;

/// Identifier of a stream inside a session, 31 bits wide.
pub type StreamId = u32;

/// The protocol version written into every control frame.
pub const SPDY_VERSION: u16 = 2;

/// Size of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Largest length the 24-bit length field can carry.
pub const MAX_FRAME_LENGTH: usize = 0x00FF_FFFF;

/// Largest payload a stream puts into a single outgoing data frame.
pub const MAX_DATA_LENGTH: usize = 16 * 1024;

/// Stream ids only use the low 31 bits.
pub const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;

/// Marks the last frame a sender emits on a stream.
pub const FLAG_FIN: u8 = 0x01;

/// SynStream flag: the receiver must not reply with data.
pub const FLAG_UNIDIRECTIONAL: u8 = 0x02;

/// Control frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ControlType {
    SynStream = 1,
    SynReply = 2,
    RstStream = 3,
    Settings = 4,
    Noop = 5,
    Ping = 6,
    GoAway = 7,
    Headers = 8,
    WindowUpdate = 9,
}

impl ControlType {
    /// Maps a wire value onto a known control type.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::SynStream),
            2 => Some(Self::SynReply),
            3 => Some(Self::RstStream),
            4 => Some(Self::Settings),
            5 => Some(Self::Noop),
            6 => Some(Self::Ping),
            7 => Some(Self::GoAway),
            8 => Some(Self::Headers),
            9 => Some(Self::WindowUpdate),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// A frame as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Control(ControlFrame),
    Data(DataFrame),
}

impl Frame {
    #[inline]
    pub fn is_control(&self) -> bool {
        matches!(self, Frame::Control(_))
    }
}

impl From<ControlFrame> for Frame {
    fn from(frame: ControlFrame) -> Self {
        Frame::Control(frame)
    }
}

impl From<DataFrame> for Frame {
    fn from(frame: DataFrame) -> Self {
        Frame::Data(frame)
    }
}

/// A session or stream management frame with an unparsed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    pub kind: ControlType,
    pub flags: u8,
    pub payload: Bytes,
}

impl ControlFrame {
    pub fn new(kind: ControlType, flags: u8, payload: Bytes) -> Self {
        Self { kind, flags, payload }
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }
}

/// Body bytes of one stream in one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: StreamId,
    pub flags: u8,
    pub payload: Bytes,
}

impl DataFrame {
    pub fn new(stream_id: StreamId, payload: Bytes) -> Self {
        Self { stream_id: stream_id & STREAM_ID_MASK, flags: 0, payload }
    }

    /// The empty frame closing the sender's half of a stream.
    pub fn fin(stream_id: StreamId) -> Self {
        Self { stream_id: stream_id & STREAM_ID_MASK, flags: FLAG_FIN, payload: Bytes::new() }
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }
}

/// Status codes carried by a RstStream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RstStatus {
    ProtocolError,
    InvalidStream,
    RefusedStream,
    UnsupportedVersion,
    Cancel,
    InternalError,
    FlowControlError,
    Unknown(u32),
}

impl RstStatus {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::ProtocolError,
            2 => Self::InvalidStream,
            3 => Self::RefusedStream,
            4 => Self::UnsupportedVersion,
            5 => Self::Cancel,
            6 => Self::InternalError,
            7 => Self::FlowControlError,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::ProtocolError => 1,
            Self::InvalidStream => 2,
            Self::RefusedStream => 3,
            Self::UnsupportedVersion => 4,
            Self::Cancel => 5,
            Self::InternalError => 6,
            Self::FlowControlError => 7,
            Self::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RstStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolError => f.write_str("PROTOCOL_ERROR"),
            Self::InvalidStream => f.write_str("INVALID_STREAM"),
            Self::RefusedStream => f.write_str("REFUSED_STREAM"),
            Self::UnsupportedVersion => f.write_str("UNSUPPORTED_VERSION"),
            Self::Cancel => f.write_str("CANCEL"),
            Self::InternalError => f.write_str("INTERNAL_ERROR"),
            Self::FlowControlError => f.write_str("FLOW_CONTROL_ERROR"),
            Self::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Opens a stream: stream id, associated stream id, priority and the
/// compressed request header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynStream {
    pub stream_id: StreamId,
    pub associated_stream_id: StreamId,
    pub priority: u8,
    pub flags: u8,
    pub header_block: Bytes,
}

impl SynStream {
    /// stream id (4) + associated stream id (4) + priority and unused (2)
    const FIXED_SIZE: usize = 10;

    pub fn parse(frame: &ControlFrame) -> Result<Self, DecodeError> {
        ensure!(frame.kind == ControlType::SynStream, DecodeError::unexpected_type(ControlType::SynStream, frame.kind));
        ensure!(
            frame.payload.len() >= Self::FIXED_SIZE,
            DecodeError::invalid_payload(frame.kind, format!("need at least {} bytes, got {}", Self::FIXED_SIZE, frame.payload.len()))
        );

        let mut payload = frame.payload.clone();
        let stream_id = payload.get_u32() & STREAM_ID_MASK;
        let associated_stream_id = payload.get_u32() & STREAM_ID_MASK;
        // priority lives in the top two bits, the rest of the 16 bits are unused
        let priority = payload.get_u8() >> 6;
        payload.advance(1);

        Ok(Self { stream_id, associated_stream_id, priority, flags: frame.flags, header_block: payload })
    }

    pub fn into_frame(self) -> ControlFrame {
        let mut payload = BytesMut::with_capacity(Self::FIXED_SIZE + self.header_block.len());
        payload.put_u32(self.stream_id & STREAM_ID_MASK);
        payload.put_u32(self.associated_stream_id & STREAM_ID_MASK);
        payload.put_u8(self.priority << 6);
        payload.put_u8(0);
        payload.put_slice(&self.header_block);
        ControlFrame::new(ControlType::SynStream, self.flags, payload.freeze())
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.flags & FLAG_FIN != 0
    }

    #[inline]
    pub fn is_unidirectional(&self) -> bool {
        self.flags & FLAG_UNIDIRECTIONAL != 0
    }
}

/// Answers a SynStream with the compressed response header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynReply {
    pub stream_id: StreamId,
    pub flags: u8,
    pub header_block: Bytes,
}

impl SynReply {
    /// stream id (4) + unused (2)
    const FIXED_SIZE: usize = 6;

    pub fn parse(frame: &ControlFrame) -> Result<Self, DecodeError> {
        ensure!(frame.kind == ControlType::SynReply, DecodeError::unexpected_type(ControlType::SynReply, frame.kind));
        ensure!(
            frame.payload.len() >= Self::FIXED_SIZE,
            DecodeError::invalid_payload(frame.kind, format!("need at least {} bytes, got {}", Self::FIXED_SIZE, frame.payload.len()))
        );

        let mut payload = frame.payload.clone();
        let stream_id = payload.get_u32() & STREAM_ID_MASK;
        payload.advance(2);

        Ok(Self { stream_id, flags: frame.flags, header_block: payload })
    }

    pub fn into_frame(self) -> ControlFrame {
        let mut payload = BytesMut::with_capacity(Self::FIXED_SIZE + self.header_block.len());
        payload.put_u32(self.stream_id & STREAM_ID_MASK);
        payload.put_u16(0);
        payload.put_slice(&self.header_block);
        ControlFrame::new(ControlType::SynReply, self.flags, payload.freeze())
    }
}

/// Aborts a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStream {
    pub stream_id: StreamId,
    pub status: RstStatus,
}

impl RstStream {
    pub fn new(stream_id: StreamId, status: RstStatus) -> Self {
        Self { stream_id: stream_id & STREAM_ID_MASK, status }
    }

    pub fn parse(frame: &ControlFrame) -> Result<Self, DecodeError> {
        ensure!(frame.kind == ControlType::RstStream, DecodeError::unexpected_type(ControlType::RstStream, frame.kind));
        ensure!(frame.payload.len() == 8, DecodeError::invalid_payload(frame.kind, format!("expect 8 bytes, got {}", frame.payload.len())));

        let mut payload = frame.payload.clone();
        let stream_id = payload.get_u32() & STREAM_ID_MASK;
        let status = RstStatus::from_u32(payload.get_u32());
        Ok(Self { stream_id, status })
    }

    pub fn into_frame(self) -> ControlFrame {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u32(self.stream_id & STREAM_ID_MASK);
        payload.put_u32(self.status.as_u32());
        ControlFrame::new(ControlType::RstStream, 0, payload.freeze())
    }
}

/// Liveness probe, the receiver echoes the opaque id unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub id: u32,
}

impl Ping {
    pub fn parse(frame: &ControlFrame) -> Result<Self, DecodeError> {
        ensure!(frame.kind == ControlType::Ping, DecodeError::unexpected_type(ControlType::Ping, frame.kind));
        ensure!(frame.payload.len() == 4, DecodeError::invalid_payload(frame.kind, format!("expect 4 bytes, got {}", frame.payload.len())));

        let mut payload = frame.payload.clone();
        Ok(Self { id: payload.get_u32() })
    }

    pub fn into_frame(self) -> ControlFrame {
        ControlFrame::new(ControlType::Ping, 0, Bytes::copy_from_slice(&self.id.to_be_bytes()))
    }
}

/// Announces that the sender will not accept streams above `last_good_stream_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAway {
    pub last_good_stream_id: StreamId,
}

impl GoAway {
    pub fn parse(frame: &ControlFrame) -> Result<Self, DecodeError> {
        ensure!(frame.kind == ControlType::GoAway, DecodeError::unexpected_type(ControlType::GoAway, frame.kind));
        // later drafts append a status code, only the stream id is read
        ensure!(frame.payload.len() >= 4, DecodeError::invalid_payload(frame.kind, format!("need at least 4 bytes, got {}", frame.payload.len())));

        let mut payload = frame.payload.clone();
        Ok(Self { last_good_stream_id: payload.get_u32() & STREAM_ID_MASK })
    }

    pub fn into_frame(self) -> ControlFrame {
        ControlFrame::new(ControlType::GoAway, 0, Bytes::copy_from_slice(&(self.last_good_stream_id & STREAM_ID_MASK).to_be_bytes()))
    }
}
