//! Uncompressed header block layout.
//!
//! ```text
//! | pairs (16) | name len (16) | name | value len (16) | value | ...
//! ```
//!
//! Several values of one header travel as a single value separated by NUL
//! bytes. Names must be lowercase and may appear only once per block.

use bytes::{Buf, BufMut};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::ensure;
use crate::protocol::CompressionError;

const VALUE_SEPARATOR: u8 = 0;

/// Parses an inflated header block.
pub(crate) fn parse_header_block(mut src: &[u8]) -> Result<HeaderMap, CompressionError> {
    ensure!(src.remaining() >= 2, CompressionError::malformed("missing pair count"));
    let pairs = src.get_u16() as usize;

    let mut headers = HeaderMap::with_capacity(pairs);
    for _ in 0..pairs {
        let name = read_string(&mut src, "name")?;
        ensure!(!name.is_empty(), CompressionError::malformed("empty header name"));
        ensure!(!name.iter().any(u8::is_ascii_uppercase), CompressionError::malformed("header name is not lowercase"));

        let name = HeaderName::from_bytes(name).map_err(CompressionError::malformed)?;
        ensure!(!headers.contains_key(&name), CompressionError::malformed(format!("duplicate header name {name}")));

        let value = read_string(&mut src, "value")?;
        for part in value.split(|b| *b == VALUE_SEPARATOR) {
            let value = HeaderValue::from_bytes(part).map_err(CompressionError::malformed)?;
            headers.append(name.clone(), value);
        }
    }

    ensure!(!src.has_remaining(), CompressionError::malformed(format!("{} trailing bytes after header pairs", src.remaining())));
    Ok(headers)
}

fn read_string<'a>(src: &mut &'a [u8], what: &str) -> Result<&'a [u8], CompressionError> {
    ensure!(src.remaining() >= 2, CompressionError::malformed(format!("missing {what} length")));
    let len = src.get_u16() as usize;
    ensure!(src.remaining() >= len, CompressionError::malformed(format!("{what} length {len} exceed block")));

    let (bytes, rest) = src.split_at(len);
    *src = rest;
    Ok(bytes)
}

/// Serializes `headers` into `dst`, joining repeated names with NUL.
pub(crate) fn write_header_block(headers: &HeaderMap, dst: &mut Vec<u8>) -> Result<(), CompressionError> {
    let pairs = u16::try_from(headers.keys_len()).map_err(|_e| CompressionError::deflate("too many header names"))?;
    dst.put_u16(pairs);

    for name in headers.keys() {
        write_string(dst, name.as_str().as_bytes())?;

        let mut joined = Vec::new();
        for (index, value) in headers.get_all(name).iter().enumerate() {
            if index > 0 {
                joined.push(VALUE_SEPARATOR);
            }
            joined.extend_from_slice(value.as_bytes());
        }
        write_string(dst, &joined)?;
    }

    Ok(())
}

fn write_string(dst: &mut Vec<u8>, bytes: &[u8]) -> Result<(), CompressionError> {
    let len = u16::try_from(bytes.len()).map_err(|_e| CompressionError::deflate(format!("header field of {} bytes is too long", bytes.len())))?;
    dst.put_u16(len);
    dst.put_slice(bytes);
    Ok(())
}
