//! Request body streaming.
//!
//! Each stream that expects a body gets a data pipe: the session's dispatch
//! loop holds the [`PipeWriter`](data_pipe::PipeWriter) in its stream map and
//! the handler reads through [`RequestBody`]. The pipe is the only point where
//! the two sides meet, so a handler that stops reading never holds up frames
//! addressed to other streams.

pub(crate) mod data_pipe;
mod request_body;

pub use request_body::RequestBody;
