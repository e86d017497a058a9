//! Small helpers shared across the crate.

use http::HeaderValue;

/// Returns early with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
///
/// ```ignore
/// ensure!(payload.len() == 4, DecodeError::invalid_payload(kind, "expect 4 bytes"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;

/// Current time formatted as an IMF-fixdate, ready for the `date` header.
pub(crate) fn http_date() -> Option<HeaderValue> {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    HeaderValue::from_bytes(&buf[..]).ok()
}
