//! Header block handling for SynStream and SynReply frames
//!
//! One connection carries two independent zlib streams, one per direction.
//! Both are primed with the SPDY/2 preset dictionary and every header block
//! is closed with a sync flush, so a block is decodable as soon as it arrives
//! but only after all earlier blocks of the same direction.
//!
//! # Components
//!
//! - [`HeaderDecoder`]: inflates and parses request header blocks
//!   - Sets the preset dictionary when zlib asks for it
//!   - Enforces an upper bound on the inflated size
//!   - Tells fatal desync apart from a merely malformed block
//!
//! - [`HeaderEncoder`]: serializes and deflates reply header blocks
//!   - Joins repeated values with NUL
//!   - Keeps compression state across blocks

mod dictionary;
mod header_block;
mod header_decoder;
mod header_encoder;

pub use header_decoder::{DEFAULT_MAX_HEADER_BLOCK_SIZE, HeaderDecoder};
pub use header_encoder::HeaderEncoder;
