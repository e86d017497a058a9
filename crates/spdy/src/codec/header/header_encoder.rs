//! Deflating side of the header compression context.
//!
//! Like its decoding twin, a [`HeaderEncoder`] is a single zlib stream per
//! connection. Blocks are compressed in the order their frames reach the
//! wire; the session does this in its writer task, nowhere else.

use bytes::{BufMut, BytesMut};
use flate2::{Compress, Compression, FlushCompress};
use http::HeaderMap;

use crate::codec::header::dictionary::SPDY_DICTIONARY;
use crate::codec::header::header_block::write_header_block;
use crate::protocol::CompressionError;

#[derive(Debug)]
pub struct HeaderEncoder {
    deflate: Compress,
    dictionary_set: bool,
    scratch: Vec<u8>,
}

impl HeaderEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_level(level: Compression) -> Self {
        Self { deflate: Compress::new(level, true), dictionary_set: false, scratch: Vec::with_capacity(1024) }
    }

    /// Compresses `headers` as one block, sync flushed, and appends it to `dst`.
    pub fn encode(&mut self, headers: &HeaderMap, dst: &mut BytesMut) -> Result<(), CompressionError> {
        let mut block = std::mem::take(&mut self.scratch);
        block.clear();
        let result = write_header_block(headers, &mut block).and_then(|()| self.deflate_block(&block, dst));
        self.scratch = block;
        result
    }

    /// Compresses an already serialized block, valid or not.
    #[cfg(test)]
    pub(crate) fn encode_raw(&mut self, block: &[u8], dst: &mut BytesMut) -> Result<(), CompressionError> {
        self.deflate_block(block, dst)
    }

    fn deflate_block(&mut self, block: &[u8], dst: &mut BytesMut) -> Result<(), CompressionError> {
        if !self.dictionary_set {
            self.deflate.set_dictionary(SPDY_DICTIONARY).map_err(CompressionError::deflate)?;
            self.dictionary_set = true;
        }

        let mut out = Vec::with_capacity(block.len() / 2 + 64);
        let start = self.deflate.total_in();
        loop {
            let consumed = (self.deflate.total_in() - start) as usize;
            self.deflate.compress_vec(&block[consumed..], &mut out, FlushCompress::Sync).map_err(CompressionError::deflate)?;

            let consumed = (self.deflate.total_in() - start) as usize;
            if consumed == block.len() && out.len() < out.capacity() {
                break;
            }
            out.reserve(out.capacity().max(64));
        }

        dst.put_slice(&out);
        Ok(())
    }
}

impl Default for HeaderEncoder {
    fn default() -> Self {
        Self::with_level(Compression::default())
    }
}
