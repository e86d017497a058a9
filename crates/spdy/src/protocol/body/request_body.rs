use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, ReadBuf};

use crate::protocol::StreamError;
use crate::protocol::body::data_pipe::PipeReader;

/// The request body of one stream.
///
/// Bytes arrive through the stream's data pipe, so polling this body only ever
/// parks the handler task that owns it. A SynStream carrying FIN has no pipe at
/// all and the body is empty from the start.
///
/// `RequestBody` can be consumed either as an [`http_body::Body`] (for example
/// with `http_body_util::BodyExt::collect`) or as a [`tokio::io::AsyncRead`].
#[derive(Debug)]
pub struct RequestBody {
    reader: Option<PipeReader>,
    /// leftover of a chunk partially consumed through `AsyncRead`
    pending: Bytes,
}

impl RequestBody {
    pub(crate) fn empty() -> Self {
        Self { reader: None, pending: Bytes::new() }
    }

    pub(crate) fn from_pipe(reader: PipeReader) -> Self {
        Self { reader: Some(reader), pending: Bytes::new() }
    }

    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, StreamError>>> {
        if !self.pending.is_empty() {
            return Poll::Ready(Some(Ok(std::mem::take(&mut self.pending))));
        }

        match &mut self.reader {
            Some(reader) => reader.poll_chunk(cx),
            None => Poll::Ready(None),
        }
    }

    /// Waits for the next chunk of the body, `None` once the peer finished it.
    pub async fn chunk(&mut self) -> Option<Result<Bytes, StreamError>> {
        std::future::poll_fn(|cx| self.poll_chunk(cx)).await
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = StreamError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(this.poll_chunk(cx)) {
            Some(Ok(bytes)) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Some(Err(e)) => Poll::Ready(Some(Err(e))),
            None => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.pending.is_empty() && self.reader.as_ref().is_none_or(PipeReader::is_end_stream)
    }

    fn size_hint(&self) -> SizeHint {
        match self.reader {
            None => SizeHint::with_exact(self.pending.len() as u64),
            Some(_) => SizeHint::new(),
        }
    }
}

impl AsyncRead for RequestBody {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut chunk = match ready!(this.poll_chunk(cx)) {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Poll::Ready(Err(e.into())),
            None => return Poll::Ready(Ok(())),
        };

        let len = chunk.len().min(buf.remaining());
        buf.put_slice(&chunk[..len]);
        chunk.advance(len);
        this.pending = chunk;
        Poll::Ready(Ok(()))
    }
}
