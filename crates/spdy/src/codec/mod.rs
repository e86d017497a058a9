//! SPDY codec module for the connection byte stream
//!
//! This module turns bytes into [`Frame`](crate::protocol::Frame)s and back,
//! and holds the stateful header compression context. It plugs into
//! `tokio_util::codec` so a session simply wraps its halves of the connection
//! in `FramedRead` and `FramedWrite`.
//!
//! # Architecture
//!
//! - Frame boundary:
//!   - [`FrameDecoder`]: splits the inbound stream into frames, skipping
//!     unknown control types
//!   - [`FrameEncoder`]: serializes already complete frames
//!   - [`decode_frame`] / [`encode_frame`]: the same logic on plain buffers
//!
//! - Header blocks, via the [`header`] module:
//!   - [`HeaderDecoder`]: inflate side, owned by the dispatch loop
//!   - [`HeaderEncoder`]: deflate side, owned by the writer
//!
//! - [`SessionEncoder`]: writer side codec compressing reply headers at the
//!   moment their frame is serialized
//!
//! # Example
//!
//! ```no_run
//! use micro_spdy::codec::{FrameDecoder, FrameEncoder};
//! use micro_spdy::protocol::{Frame, Ping};
//! use tokio_util::codec::{Decoder, Encoder};
//! use bytes::BytesMut;
//!
//! let mut buf = BytesMut::new();
//! FrameEncoder.encode(Frame::Control(Ping { id: 1 }.into_frame()), &mut buf).unwrap();
//!
//! let frame = FrameDecoder::new().decode(&mut buf).unwrap();
//! assert!(frame.is_some());
//! ```

mod frame_codec;
pub mod header;
mod session_encoder;

pub use frame_codec::{FrameDecoder, FrameEncoder, decode_frame, encode_frame};
pub use header::{HeaderDecoder, HeaderEncoder};
pub use session_encoder::{Outbound, SessionEncoder};
