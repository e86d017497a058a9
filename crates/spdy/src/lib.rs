//! An asynchronous micro SPDY server implementation
//!
//! This crate serves SPDY/2 sessions on top of tokio. One connection carries
//! many concurrent request/response exchanges, each on a stream of its own,
//! and every stream is answered by a handler running on its own task.
//!
//! # Features
//!
//! - SPDY/2 framing with control and data frames
//! - zlib header compression with the protocol's preset dictionary
//! - Concurrent streams with independent, streaming request bodies
//! - Chunked response writing through a [`session::ResponseWriter`]
//! - Ping echo, GoAway draining and stream resets
//!
//! # Example
//!
//! ```no_run
//! use http::Request;
//! use http_body_util::BodyExt;
//! use micro_spdy::handler::make_handler;
//! use micro_spdy::protocol::body::RequestBody;
//! use micro_spdy::server::Server;
//! use micro_spdy::session::ResponseWriter;
//! use tracing::{Level, error, info};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let handler = make_handler(|request: Request<RequestBody>, response: ResponseWriter| async move {
//!         info!(path = request.uri().path(), "receive request");
//!         let body = match request.into_body().collect().await {
//!             Ok(collected) => collected.to_bytes(),
//!             Err(e) => {
//!                 error!(cause = %e, "failed to read request body");
//!                 return;
//!             }
//!         };
//!         let _ = response.write(format!("Hello World! {} bytes received\r\n", body.len())).await;
//!     });
//!
//!     let server = Server::builder().address("127.0.0.1:8080").handler(handler).build().unwrap();
//!     server.start().await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: frames, request headers, body streaming and errors
//! - [`codec`]: frame encoding/decoding and header block compression
//! - [`session`]: the per connection stream multiplexer
//! - [`handler`]: the application entry point
//! - [`server`]: the TCP accept loop
//!
//! ## Error Handling
//!
//! - [`protocol::SessionError`]: ends the whole session
//! - [`protocol::StreamError`]: what a handler sees on its own stream
//! - [`protocol::DecodeError`] and [`protocol::CompressionError`]: wire level failures
//!
//! # Limitations
//!
//! - SPDY/2 only, no TLS or NPN negotiation (terminate TLS in front, or hand a
//!   wrapped stream to [`server::Server::serve_connection`])
//! - No server push, flow control windows or settings negotiation

pub mod codec;
pub mod handler;
pub mod protocol;
pub mod server;
pub mod session;

mod utils;
pub(crate) use utils::ensure;
