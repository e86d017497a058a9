use std::time::Duration;

use crate::codec::header::DEFAULT_MAX_HEADER_BLOCK_SIZE;
use crate::protocol::MAX_FRAME_LENGTH;

const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 64;
const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 64;
const DEFAULT_MAX_BUFFERED_BODY: usize = 1024 * 1024;

/// Per connection limits of a [`Session`](crate::session::Session).
///
/// ```
/// use std::time::Duration;
/// use micro_spdy::session::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .max_frame_length(64 * 1024)
///     .handler_timeout(Duration::from_secs(30))
///     .build();
/// assert_eq!(config.max_frame_length(), 64 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    max_frame_length: usize,
    max_header_block_size: usize,
    outbound_queue_capacity: usize,
    inbound_queue_capacity: usize,
    max_buffered_body: usize,
    handler_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// Largest frame payload accepted from the peer.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Largest inflated request header block.
    pub fn max_header_block_size(&self) -> usize {
        self.max_header_block_size
    }

    /// Frames queued by handlers before their writes wait for the writer.
    pub fn outbound_queue_capacity(&self) -> usize {
        self.outbound_queue_capacity
    }

    /// Frames queued between the reader and the dispatch loop.
    pub fn inbound_queue_capacity(&self) -> usize {
        self.inbound_queue_capacity
    }

    /// Unread body bytes a stream may hold before it is reset.
    pub fn max_buffered_body(&self) -> usize {
        self.max_buffered_body
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfigBuilder::new().build()
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    fn new() -> Self {
        Self {
            config: SessionConfig {
                max_frame_length: MAX_FRAME_LENGTH,
                max_header_block_size: DEFAULT_MAX_HEADER_BLOCK_SIZE,
                outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
                inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
                max_buffered_body: DEFAULT_MAX_BUFFERED_BODY,
                handler_timeout: None,
            },
        }
    }

    /// Capped at the 24 bit length field maximum.
    pub fn max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.config.max_frame_length = max_frame_length.min(MAX_FRAME_LENGTH);
        self
    }

    pub fn max_header_block_size(mut self, max_header_block_size: usize) -> Self {
        self.config.max_header_block_size = max_header_block_size;
        self
    }

    pub fn outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.outbound_queue_capacity = capacity.max(1);
        self
    }

    pub fn inbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_queue_capacity = capacity.max(1);
        self
    }

    pub fn max_buffered_body(mut self, max_buffered_body: usize) -> Self {
        self.config.max_buffered_body = max_buffered_body;
        self
    }

    /// Handlers running longer are cancelled and their stream reset with CANCEL.
    pub fn handler_timeout(mut self, timeout: Duration) -> Self {
        self.config.handler_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}
