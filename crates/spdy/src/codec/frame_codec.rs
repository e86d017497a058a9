//! Frame boundary codec.
//!
//! [`decode_frame`] and [`encode_frame`] work on plain byte slices and are the
//! single place where the 8 byte frame header is read or written.
//! [`FrameDecoder`] and [`FrameEncoder`] plug them into `tokio_util`'s
//! `FramedRead` / `FramedWrite`.
//!
//! The codec never splits data: a caller that has more than
//! [`MAX_DATA_LENGTH`](crate::protocol::MAX_DATA_LENGTH) bytes to send chunks
//! them itself before building frames.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::ensure;
use crate::protocol::{
    ControlFrame, ControlType, DataFrame, DecodeError, FRAME_HEADER_SIZE, Frame, MAX_FRAME_LENGTH, SPDY_VERSION,
    STREAM_ID_MASK,
};

const CONTROL_BIT: u32 = 0x8000_0000;

/// The fixed 8 byte header, read before the payload is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHead {
    first_word: u32,
    flags: u8,
    length: usize,
}

impl FrameHead {
    fn parse(src: &[u8], max_frame_length: usize) -> Result<Self, DecodeError> {
        ensure!(src.len() >= FRAME_HEADER_SIZE, DecodeError::truncated(FRAME_HEADER_SIZE, src.len()));

        let mut head = &src[..FRAME_HEADER_SIZE];
        let first_word = head.get_u32();
        let flags = head.get_u8();
        let length = head.get_uint(3) as usize;

        ensure!(length <= max_frame_length, DecodeError::oversized(length, max_frame_length));

        Ok(Self { first_word, flags, length })
    }

    #[inline]
    fn frame_len(&self) -> usize {
        FRAME_HEADER_SIZE + self.length
    }

    fn into_frame(self, payload: Bytes) -> Result<Frame, DecodeError> {
        if self.first_word & CONTROL_BIT == 0 {
            let stream_id = self.first_word & STREAM_ID_MASK;
            return Ok(Frame::Data(DataFrame { stream_id, flags: self.flags, payload }));
        }

        let version = ((self.first_word >> 16) & 0x7FFF) as u16;
        ensure!(version == SPDY_VERSION, DecodeError::UnsupportedVersion(version));

        let kind = (self.first_word & 0xFFFF) as u16;
        let kind = ControlType::from_u16(kind).ok_or(DecodeError::UnknownFrameType { kind, length: self.length })?;

        Ok(Frame::Control(ControlFrame { kind, flags: self.flags, payload }))
    }
}

/// Decodes one frame from the front of `src`.
///
/// Returns the frame and the number of bytes it occupied. Fails with
/// [`DecodeError::TruncatedFrame`] when `src` holds less than a full frame and
/// with [`DecodeError::OversizedFrame`] as soon as the declared length is
/// above `max_frame_length`, before any payload is buffered.
pub fn decode_frame(src: &[u8], max_frame_length: usize) -> Result<(Frame, usize), DecodeError> {
    let head = FrameHead::parse(src, max_frame_length)?;
    let frame_len = head.frame_len();
    ensure!(src.len() >= frame_len, DecodeError::truncated(frame_len, src.len()));

    let payload = Bytes::copy_from_slice(&src[FRAME_HEADER_SIZE..frame_len]);
    Ok((head.into_frame(payload)?, frame_len))
}

/// Serializes `frame` into `dst`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> io::Result<()> {
    let (first_word, flags, payload) = match frame {
        Frame::Control(frame) => {
            (CONTROL_BIT | (u32::from(SPDY_VERSION) << 16) | u32::from(frame.kind.as_u16()), frame.flags, &frame.payload)
        }
        Frame::Data(frame) => (frame.stream_id & STREAM_ID_MASK, frame.flags, &frame.payload),
    };

    if payload.len() > MAX_FRAME_LENGTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame length {} exceed the limit {}", payload.len(), MAX_FRAME_LENGTH),
        ));
    }

    dst.reserve(FRAME_HEADER_SIZE + payload.len());
    dst.put_u32(first_word);
    dst.put_u8(flags);
    dst.put_uint(payload.len() as u64, 3);
    dst.put_slice(payload);
    Ok(())
}

/// Streaming frame decoder for `FramedRead`.
///
/// Control frames of an unknown type are skipped and logged, every other
/// decode error is returned and ends the stream of frames.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_frame_length: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self { max_frame_length: max_frame_length.min(MAX_FRAME_LENGTH) }
    }

    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self { max_frame_length: MAX_FRAME_LENGTH }
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < FRAME_HEADER_SIZE {
                return Ok(None);
            }

            let head = FrameHead::parse(&src[..], self.max_frame_length)?;
            let frame_len = head.frame_len();
            if src.len() < frame_len {
                src.reserve(frame_len - src.len());
                return Ok(None);
            }

            let mut bytes = src.split_to(frame_len).freeze();
            bytes.advance(FRAME_HEADER_SIZE);

            match head.into_frame(bytes) {
                Ok(frame) => {
                    trace!(length = head.length, control = frame.is_control(), "decoded frame");
                    return Ok(Some(frame));
                }
                Err(DecodeError::UnknownFrameType { kind, length }) => {
                    warn!(kind, length, "skip control frame with unknown type");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let needed = FrameHead::parse(&src[..], self.max_frame_length).map_or(FRAME_HEADER_SIZE, |head| head.frame_len());
                Err(DecodeError::truncated(needed, src.len()))
            }
        }
    }
}

/// Frame encoder for `FramedWrite`. Header blocks must already be compressed,
/// see [`SessionEncoder`](crate::codec::SessionEncoder) for the deferred form.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder;

impl Encoder<Frame> for FrameEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)
    }
}
