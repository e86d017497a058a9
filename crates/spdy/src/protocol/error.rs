use std::io;
use thiserror::Error;

use crate::protocol::{ControlType, RstStatus, StreamId};

/// Errors that end a session, plus the non-fatal lookup miss.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("decode error: {source}")]
    Decode {
        #[from]
        source: DecodeError,
    },

    #[error("compression error: {source}")]
    Compression {
        #[from]
        source: CompressionError,
    },

    #[error("stream {stream_id} not found")]
    StreamNotFound { stream_id: StreamId },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SessionError {
    pub fn stream_not_found(stream_id: StreamId) -> Self {
        Self::StreamNotFound { stream_id }
    }

    /// Whether the connection can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Decode { source } => source.is_fatal(),
            SessionError::Compression { source } => source.is_fatal(),
            SessionError::StreamNotFound { .. } => false,
            SessionError::Io { .. } => true,
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("truncated frame, need {needed} bytes but only {available} available")]
    TruncatedFrame { needed: usize, available: usize },

    #[error("unknown control frame type {kind}")]
    UnknownFrameType { kind: u16, length: usize },

    #[error("frame length {length} exceed the limit {max_length}")]
    OversizedFrame { length: usize, max_length: usize },

    #[error("unsupported spdy version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid {kind:?} payload: {reason}")]
    InvalidPayload { kind: ControlType, reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl DecodeError {
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::TruncatedFrame { needed, available }
    }

    pub fn oversized(length: usize, max_length: usize) -> Self {
        Self::OversizedFrame { length, max_length }
    }

    pub fn invalid_payload<S: ToString>(kind: ControlType, str: S) -> Self {
        Self::InvalidPayload { kind, reason: str.to_string() }
    }

    pub(crate) fn unexpected_type(expected: ControlType, actual: ControlType) -> Self {
        Self::InvalidPayload { kind: actual, reason: format!("expect {expected:?} frame") }
    }

    /// Unknown frame types are skipped, everything else leaves the byte stream
    /// in a state that can't be interpreted any further.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DecodeError::UnknownFrameType { .. })
    }
}

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("inflate header block failed: {reason}")]
    Inflate { reason: String },

    #[error("deflate header block failed: {reason}")]
    Deflate { reason: String },

    #[error("header block size exceed the limit {max_size}")]
    TooLargeBlock { max_size: usize },

    #[error("malformed header block: {reason}")]
    MalformedBlock { reason: String },
}

impl CompressionError {
    pub fn inflate<S: ToString>(str: S) -> Self {
        Self::Inflate { reason: str.to_string() }
    }

    pub fn deflate<S: ToString>(str: S) -> Self {
        Self::Deflate { reason: str.to_string() }
    }

    pub fn malformed<S: ToString>(str: S) -> Self {
        Self::MalformedBlock { reason: str.to_string() }
    }

    /// A malformed block inflated fine, so both dictionaries are still in step.
    /// Every other failure leaves the zlib context desynchronized.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CompressionError::MalformedBlock { .. })
    }
}

/// Errors a handler observes on its own stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream is closed for writing")]
    StreamClosed,

    #[error("stream reset: {status}")]
    StreamReset { status: RstStatus },

    #[error("connection closed")]
    ConnectionClosed,
}

impl StreamError {
    pub fn reset(status: RstStatus) -> Self {
        Self::StreamReset { status }
    }
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        let kind = match e {
            StreamError::StreamClosed => io::ErrorKind::BrokenPipe,
            StreamError::StreamReset { .. } => io::ErrorKind::ConnectionReset,
            StreamError::ConnectionClosed => io::ErrorKind::ConnectionAborted,
        };
        io::Error::new(kind, e)
    }
}

/// A SynStream whose header block does not describe a valid request.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("missing request field: {0}")]
    MissingField(&'static str),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid http version: {0}")]
    InvalidVersion(String),
}
