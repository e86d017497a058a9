//! Bounded handoff of body bytes from the dispatch loop to a handler task.
//!
//! The writer side never waits: the session's dispatch loop pushes chunks and
//! moves on to the next frame. Memory is bounded by refusing writes once the
//! buffered byte count would exceed the configured limit, the session then
//! resets that stream instead of stalling every other stream on the
//! connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use futures::stream::FusedStream;
use thiserror::Error;

use crate::protocol::StreamError;

/// Creates a connected writer/reader pair holding at most `max_buffered` unread bytes.
pub(crate) fn data_pipe(max_buffered: usize) -> (PipeWriter, PipeReader) {
    let (sender, receiver) = mpsc::unbounded();
    let buffered = Arc::new(AtomicUsize::new(0));

    let writer = PipeWriter { sender, buffered: Arc::clone(&buffered), max_buffered, closed: AtomicBool::new(false) };
    let reader = PipeReader { receiver, buffered, error: None };
    (writer, reader)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum PipeError {
    #[error("write on closed pipe")]
    Closed,

    #[error("pipe buffer full, {buffered} bytes buffered exceed the limit {max_buffered}")]
    Full { buffered: usize, max_buffered: usize },
}

#[derive(Debug)]
pub(crate) struct PipeWriter {
    sender: mpsc::UnboundedSender<Result<Bytes, StreamError>>,
    /// bytes sent but not yet taken by the reader
    buffered: Arc<AtomicUsize>,
    max_buffered: usize,
    closed: AtomicBool,
}

impl PipeWriter {
    /// Queues a chunk for the reader without blocking.
    pub(crate) fn write(&self, data: Bytes) -> Result<(), PipeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PipeError::Closed);
        }

        // nobody will ever read it, accept and drop
        if self.sender.is_closed() || data.is_empty() {
            return Ok(());
        }

        let len = data.len();
        let buffered = self.buffered.load(Ordering::Acquire) + len;
        if buffered > self.max_buffered {
            return Err(PipeError::Full { buffered, max_buffered: self.max_buffered });
        }

        self.buffered.fetch_add(len, Ordering::AcqRel);
        if self.sender.unbounded_send(Ok(data)).is_err() {
            // the reader went away in between
            self.buffered.fetch_sub(len, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Marks the end of the body. `None` is a clean end of stream, an error is
    /// handed to the reader once the buffered bytes are drained. Only the
    /// first call has an effect.
    pub(crate) fn close_with_error(&self, error: Option<StreamError>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(error) = error {
            let _ = self.sender.unbounded_send(Err(error));
        }
        self.sender.close_channel();
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub(crate) struct PipeReader {
    receiver: mpsc::UnboundedReceiver<Result<Bytes, StreamError>>,
    buffered: Arc<AtomicUsize>,
    /// once seen, the close error is returned on every later poll
    error: Option<StreamError>,
}

impl PipeReader {
    /// Polls the next chunk. `None` means the writer closed the pipe cleanly
    /// and every buffered chunk has been consumed.
    pub(crate) fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, StreamError>>> {
        if let Some(e) = &self.error {
            return Poll::Ready(Some(Err(e.clone())));
        }

        match ready!(self.receiver.poll_next_unpin(cx)) {
            Some(Ok(chunk)) => {
                self.buffered.fetch_sub(chunk.len(), Ordering::AcqRel);
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                self.error = Some(e.clone());
                Poll::Ready(Some(Err(e)))
            }
            None => Poll::Ready(None),
        }
    }

    #[cfg(test)]
    pub(crate) async fn chunk(&mut self) -> Option<Result<Bytes, StreamError>> {
        std::future::poll_fn(|cx| self.poll_chunk(cx)).await
    }

    pub(crate) fn is_end_stream(&self) -> bool {
        self.error.is_none() && self.receiver.is_terminated()
    }
}
