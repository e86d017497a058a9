//! Inflating side of the header compression context.
//!
//! A session owns exactly one [`HeaderDecoder`]. The zlib stream spans every
//! header block the peer sends on the connection, so blocks must be fed in
//! the exact order their frames were read. The session guarantees that by
//! only decoding from its dispatch loop.

use flate2::{Decompress, FlushDecompress, Status};
use http::HeaderMap;
use tracing::trace;

use crate::codec::header::dictionary::SPDY_DICTIONARY;
use crate::codec::header::header_block::parse_header_block;
use crate::ensure;
use crate::protocol::CompressionError;

/// Upper bound for an inflated header block unless configured otherwise.
pub const DEFAULT_MAX_HEADER_BLOCK_SIZE: usize = 64 * 1024;

/// Minimum output room reserved for one inflate round.
const MIN_OUTPUT: usize = 256;

#[derive(Debug)]
pub struct HeaderDecoder {
    inflate: Decompress,
    max_block_size: usize,
}

impl HeaderDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_max_block_size(max_block_size: usize) -> Self {
        Self { inflate: Decompress::new(true), max_block_size }
    }

    /// Inflates `block` and parses the header pairs.
    ///
    /// # Errors
    ///
    /// - fatal [`CompressionError`]s when the zlib stream is corrupt or the
    ///   block inflates past the size limit. The context is out of step with
    ///   the peer from then on and must not be used again.
    /// - [`CompressionError::MalformedBlock`] when the block inflated fine but
    ///   does not hold valid header pairs. The context stays usable.
    pub fn decode(&mut self, block: &[u8]) -> Result<HeaderMap, CompressionError> {
        let raw = self.inflate(block)?;
        trace!(compressed = block.len(), inflated = raw.len(), "inflated header block");
        parse_header_block(&raw)
    }

    fn inflate(&mut self, block: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut out = Vec::with_capacity(block.len().saturating_mul(4).clamp(MIN_OUTPUT, self.max_block_size.max(MIN_OUTPUT)));
        let start = self.inflate.total_in();

        loop {
            let consumed_before = (self.inflate.total_in() - start) as usize;
            let produced_before = out.len();

            match self.inflate.decompress_vec(&block[consumed_before..], &mut out, FlushDecompress::Sync) {
                Ok(Status::StreamEnd) => return Err(CompressionError::inflate("peer ended the compression stream")),
                Ok(Status::Ok | Status::BufError) => {}
                Err(e) => match e.needs_dictionary() {
                    Some(_) => {
                        self.inflate.set_dictionary(SPDY_DICTIONARY).map_err(CompressionError::inflate)?;
                        continue;
                    }
                    None => return Err(CompressionError::inflate(e)),
                },
            }

            ensure!(out.len() <= self.max_block_size, CompressionError::TooLargeBlock { max_size: self.max_block_size });

            let consumed = (self.inflate.total_in() - start) as usize;
            if consumed == block.len() && out.len() < out.capacity() {
                return Ok(out);
            }

            if out.len() == out.capacity() {
                out.reserve(out.capacity().max(MIN_OUTPUT));
                continue;
            }

            // input left, room left, yet zlib made no progress
            ensure!(consumed != consumed_before || out.len() != produced_before, CompressionError::inflate("incomplete header block"));
        }
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::with_max_block_size(DEFAULT_MAX_HEADER_BLOCK_SIZE)
    }
}
