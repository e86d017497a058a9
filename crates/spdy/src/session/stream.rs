//! Per stream lifecycle.
//!
//! ```text
//!                    Idle
//!                     | SynStream
//!         +-----------+------------+
//!         | no FIN                 | FIN
//!         v                        v
//!        Open --remote FIN--> HalfClosedRemote
//!         |                        |
//!   local FIN                 local FIN
//!         v                        v
//!   HalfClosedLocal --remote FIN--> Closed
//! ```
//!
//! `Reset` can be entered from every state except `Closed` and is terminal.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::protocol::body::RequestBody;
use crate::protocol::body::data_pipe::{PipeError, PipeWriter, data_pipe};
use crate::protocol::{DataFrame, RstStatus, StreamError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StreamState {
    Idle,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
    Reset(StreamError),
}

impl StreamState {
    pub(crate) fn open(&mut self, remote_fin: bool) {
        if *self == StreamState::Idle {
            *self = if remote_fin { StreamState::HalfClosedRemote } else { StreamState::Open };
        }
    }

    pub(crate) fn close_local(&mut self) {
        *self = match self {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            _ => return,
        };
    }

    pub(crate) fn close_remote(&mut self) {
        *self = match self {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            _ => return,
        };
    }

    /// Returns `false` if the stream had already reached a terminal state.
    pub(crate) fn reset(&mut self, error: StreamError) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self = StreamState::Reset(error);
        true
    }

    pub(crate) fn is_remote_closed(&self) -> bool {
        matches!(self, StreamState::HalfClosedRemote | StreamState::Closed | StreamState::Reset(_))
    }

    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Closed | StreamState::Reset(_))
    }

    /// Whether the local side may still send frames.
    pub(crate) fn check_writable(&self) -> Result<(), StreamError> {
        match self {
            StreamState::Reset(e) => Err(e.clone()),
            StreamState::HalfClosedLocal | StreamState::Closed => Err(StreamError::StreamClosed),
            StreamState::Idle | StreamState::Open | StreamState::HalfClosedRemote => Ok(()),
        }
    }
}

/// State shared by the dispatch loop and the stream's response writer.
pub(crate) type SharedState = Arc<Mutex<StreamState>>;

pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, StreamState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// The dispatch loop's view of one stream: its state and the writing end of
/// the request body pipe.
#[derive(Debug)]
pub(crate) struct Stream {
    state: SharedState,
    pipe: Option<PipeWriter>,
}

impl Stream {
    /// Opens a stream for a SynStream. No body pipe exists when the peer
    /// already closed its half.
    pub(crate) fn open(remote_fin: bool, max_buffered_body: usize) -> (Self, RequestBody) {
        let mut state = StreamState::Idle;
        state.open(remote_fin);
        let state = Arc::new(Mutex::new(state));

        if remote_fin {
            return (Self { state, pipe: None }, RequestBody::empty());
        }

        let (writer, reader) = data_pipe(max_buffered_body);
        (Self { state, pipe: Some(writer) }, RequestBody::from_pipe(reader))
    }

    pub(crate) fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Hands a data frame to the body pipe.
    ///
    /// # Errors
    ///
    /// The status to reset the stream with: data after the peer's FIN is a
    /// protocol error, a full pipe a flow control error.
    pub(crate) fn receive_data(&mut self, frame: DataFrame) -> Result<(), RstStatus> {
        let fin = frame.is_fin();
        let mut state = lock(&self.state);

        // reset locally, the peer hasn't seen our RstStream yet
        if matches!(*state, StreamState::Reset(_)) {
            return Ok(());
        }

        if state.is_remote_closed() {
            return Err(RstStatus::ProtocolError);
        }

        let pipe = self.pipe.as_ref().ok_or(RstStatus::ProtocolError)?;
        match pipe.write(frame.payload) {
            Ok(()) | Err(PipeError::Closed) => {}
            Err(PipeError::Full { .. }) => return Err(RstStatus::FlowControlError),
        }

        if fin {
            pipe.close_with_error(None);
            state.close_remote();
        }
        Ok(())
    }

    /// Moves the stream to `Reset` and fails pending and future body reads.
    pub(crate) fn reset(&mut self, error: StreamError) {
        lock(&self.state).reset(error.clone());
        if let Some(pipe) = &self.pipe {
            pipe.close_with_error(Some(error));
        }
    }

    /// The peer can send nothing more, pending reads fail with `error`.
    pub(crate) fn abort_remote(&mut self, error: StreamError) {
        let mut state = lock(&self.state);
        if state.is_remote_closed() {
            return;
        }
        if let Some(pipe) = &self.pipe {
            pipe.close_with_error(Some(error));
        }
        state.close_remote();
    }

    pub(crate) fn is_finished(&self) -> bool {
        lock(&self.state).is_terminal()
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // a body reader must never wait on a stream the session forgot
        if let Some(pipe) = &self.pipe {
            pipe.close_with_error(Some(StreamError::ConnectionClosed));
        }
    }
}
