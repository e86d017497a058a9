use bytes::BytesMut;
use http::HeaderMap;
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::frame_codec::encode_frame;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Frame, SessionError, StreamId, SynReply};

/// An item on a session's outbound path.
///
/// Reply headers stay uncompressed until the writer serializes them, so the
/// deflate context advances in exactly the order frames hit the wire.
#[derive(Debug)]
pub enum Outbound {
    Frame(Frame),
    SynReply { stream_id: StreamId, flags: u8, headers: HeaderMap },
}

impl From<Frame> for Outbound {
    fn from(frame: Frame) -> Self {
        Outbound::Frame(frame)
    }
}

/// Writer side codec of a session, owns the deflate half of the header
/// compression context.
#[derive(Debug, Default)]
pub struct SessionEncoder {
    header_encoder: HeaderEncoder,
}

impl SessionEncoder {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Encoder<Outbound> for SessionEncoder {
    type Error = SessionError;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Outbound::Frame(frame) => encode_frame(&frame, dst)?,
            Outbound::SynReply { stream_id, flags, headers } => {
                let mut header_block = BytesMut::new();
                self.header_encoder.encode(&headers, &mut header_block)?;
                trace!(stream_id, compressed = header_block.len(), "encoded reply headers");

                let reply = SynReply { stream_id, flags, header_block: header_block.freeze() };
                encode_frame(&Frame::Control(reply.into_frame()), dst)?;
            }
        }
        Ok(())
    }
}
