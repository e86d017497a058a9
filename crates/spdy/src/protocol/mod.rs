//! Core SPDY protocol abstractions.
//!
//! This module holds the types shared by the codec and the session:
//!
//! - **Frames** ([`frame`]): the wire level [`Frame`] union of [`ControlFrame`]
//!   and [`DataFrame`], plus typed views over control payloads
//!   ([`SynStream`], [`SynReply`], [`RstStream`], [`Ping`], [`GoAway`])
//!
//! - **Requests** ([`request`]): [`RequestHeader`] built from the decoded
//!   header block of a SynStream
//!
//! - **Body Streaming** ([`body`]): [`RequestBody`](body::RequestBody), the
//!   handler facing end of a stream's data pipe
//!
//! - **Error Handling** ([`error`]):
//!   - [`SessionError`]: errors that terminate a session
//!   - [`DecodeError`]: malformed, truncated or oversized frames
//!   - [`CompressionError`]: header block (de)compression failures
//!   - [`StreamError`]: what a handler sees on its own stream
//!   - [`RequestError`]: header blocks that don't describe a request

mod frame;
pub use frame::ControlFrame;
pub use frame::ControlType;
pub use frame::DataFrame;
pub use frame::Frame;
pub use frame::GoAway;
pub use frame::Ping;
pub use frame::RstStatus;
pub use frame::RstStream;
pub use frame::StreamId;
pub use frame::SynReply;
pub use frame::SynStream;
pub use frame::{FLAG_FIN, FLAG_UNIDIRECTIONAL, FRAME_HEADER_SIZE, MAX_DATA_LENGTH, MAX_FRAME_LENGTH, SPDY_VERSION, STREAM_ID_MASK};

mod request;
pub use request::RequestHeader;
pub(crate) use request::VERSION;

mod error;
pub use error::CompressionError;
pub use error::DecodeError;
pub use error::RequestError;
pub use error::SessionError;
pub use error::StreamError;

pub mod body;
