//! Request header handling.
//!
//! SPDY carries the request line inside the header block as the `method`,
//! `url` and `version` pairs. [`RequestHeader`] lifts those into a regular
//! `http::Request<()>` and keeps every other pair as a request header.

use http::request::Parts;
use http::{HeaderMap, HeaderName, Method, Request, Uri, Version};

use crate::protocol::RequestError;

pub(crate) const METHOD: HeaderName = HeaderName::from_static("method");
pub(crate) const URL: HeaderName = HeaderName::from_static("url");
pub(crate) const VERSION: HeaderName = HeaderName::from_static("version");

/// Represents a decoded request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }
}

impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

/// Builds the request from a decoded SynStream header block.
///
/// `method` and `url` are mandatory, a missing `version` falls back to
/// HTTP/1.1.
impl TryFrom<HeaderMap> for RequestHeader {
    type Error = RequestError;

    fn try_from(mut headers: HeaderMap) -> Result<Self, Self::Error> {
        let method = headers.remove(METHOD).ok_or(RequestError::MissingField("method"))?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_e| RequestError::InvalidMethod)?;

        let url = headers.remove(URL).ok_or(RequestError::MissingField("url"))?;
        let uri = Uri::try_from(url.as_bytes()).map_err(|_e| RequestError::InvalidUri)?;

        let version = match headers.remove(VERSION) {
            Some(value) => match value.as_bytes() {
                b"HTTP/1.1" => Version::HTTP_11,
                b"HTTP/1.0" => Version::HTTP_10,
                b"HTTP/0.9" => Version::HTTP_09,
                other => return Err(RequestError::InvalidVersion(String::from_utf8_lossy(other).into_owned())),
            },
            None => Version::HTTP_11,
        };

        let mut inner = Request::new(());
        *inner.method_mut() = method;
        *inner.uri_mut() = uri;
        *inner.version_mut() = version;
        *inner.headers_mut() = headers;

        Ok(Self { inner })
    }
}
