use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use http::header::{CONTENT_TYPE, DATE};
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, error};

use crate::codec::Outbound;
use crate::protocol::{DataFrame, Frame, MAX_DATA_LENGTH, RstStatus, RstStream, StreamError, StreamId, VERSION};
use crate::session::stream::{SharedState, lock};
use crate::utils::http_date;

const STATUS: HeaderName = HeaderName::from_static("status");
const DEFAULT_CONTENT_TYPE: HeaderValue = HeaderValue::from_static("text/html; charset=utf-8");
const HTTP_11: HeaderValue = HeaderValue::from_static("HTTP/1.1");

/// The response side of one stream, handed to the handler.
///
/// Cloning yields another handle to the same stream. Each call holds the
/// stream's write lock for its whole duration, so the frames of one `write`
/// are never interleaved with those of another on the same stream.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    stream_id: StreamId,
    state: SharedState,
    local: Mutex<Local>,
}

#[derive(Debug)]
struct Local {
    headers: HeaderMap,
    wrote_header: bool,
    closed: bool,
    outbound: mpsc::Sender<Outbound>,
}

impl Local {
    async fn send(&mut self, item: Outbound) -> Result<(), StreamError> {
        self.outbound.send(item).await.map_err(|_e| StreamError::ConnectionClosed)
    }
}

impl ResponseWriter {
    pub(crate) fn new(stream_id: StreamId, state: SharedState, outbound: mpsc::Sender<Outbound>) -> Self {
        let local = Local { headers: HeaderMap::new(), wrote_header: false, closed: false, outbound };
        Self { inner: Arc::new(Inner { stream_id, state, local: Mutex::new(local) }) }
    }

    pub fn stream_id(&self) -> StreamId {
        self.inner.stream_id
    }

    /// Response headers sent with the SynReply.
    ///
    /// Changes made after the first [`write_header`](Self::write_header) are
    /// not sent anywhere.
    ///
    /// The guard locks the writer: drop it before calling
    /// [`write_header`](Self::write_header), [`write`](Self::write) or
    /// [`close`](Self::close), or they wait on it forever.
    pub async fn headers_mut(&self) -> MappedMutexGuard<'_, HeaderMap> {
        MutexGuard::map(self.inner.local.lock().await, |local| &mut local.headers)
    }

    /// Sends the SynReply. Only the first call has an effect.
    pub async fn write_header(&self, status: StatusCode) -> Result<(), StreamError> {
        let mut local = self.inner.local.lock().await;
        self.write_header_locked(&mut local, status).await
    }

    /// Writes body bytes, sending a `200 OK` SynReply first if none went out yet.
    ///
    /// Payloads larger than [`MAX_DATA_LENGTH`] are split over several data
    /// frames. Returns the number of bytes written.
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<usize, StreamError> {
        let mut data = data.into();
        let mut local = self.inner.local.lock().await;
        self.write_header_locked(&mut local, StatusCode::OK).await?;

        let written = data.len();
        while !data.is_empty() {
            self.check_writable()?;
            let chunk = data.split_to(data.len().min(MAX_DATA_LENGTH));
            local.send(Frame::Data(DataFrame::new(self.inner.stream_id, chunk)).into()).await?;
        }
        Ok(written)
    }

    /// Ends the response with an empty FIN data frame. Only the first call
    /// has an effect, inbound body data is still delivered afterwards.
    pub async fn close(&self) -> Result<(), StreamError> {
        let mut local = self.inner.local.lock().await;
        if local.closed {
            return Ok(());
        }
        self.write_header_locked(&mut local, StatusCode::OK).await?;
        self.check_writable()?;

        local.send(Frame::Data(DataFrame::fin(self.inner.stream_id)).into()).await?;
        local.closed = true;
        lock(&self.inner.state).close_local();
        Ok(())
    }

    /// Sends a complete response: its head, every data frame of its body and
    /// the closing FIN. A failing body resets the stream with INTERNAL_ERROR.
    pub async fn send_response<B>(&self, response: Response<B>) -> Result<(), StreamError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Display,
    {
        let (parts, mut body) = response.into_parts();
        self.headers_mut().await.extend(parts.headers);
        self.write_header(parts.status).await?;

        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    // trailers have no place in a SPDY/2 stream
                    if let Ok(data) = frame.into_data() {
                        self.write(data).await?;
                    }
                }
                Some(Err(e)) => {
                    error!(stream_id = self.stream_id(), cause = %e, "resolve response body error");
                    self.reset(RstStatus::InternalError).await;
                    return Err(StreamError::reset(RstStatus::InternalError));
                }
                None => return self.close().await,
            }
        }
    }

    /// Called once the handler returned: completes whatever response it left open.
    pub(crate) async fn finish(&self) {
        if let Err(e) = self.close().await {
            debug!(stream_id = self.stream_id(), cause = %e, "stream not finished cleanly");
        }
    }

    /// Aborts the stream from the local side and tells the peer.
    pub(crate) async fn reset(&self, status: RstStatus) {
        if !lock(&self.inner.state).reset(StreamError::reset(status)) {
            return;
        }

        let mut local = self.inner.local.lock().await;
        local.closed = true;
        if let Err(e) = local.send(Frame::Control(RstStream::new(self.inner.stream_id, status).into_frame()).into()).await {
            debug!(stream_id = self.stream_id(), cause = %e, "can't send reset");
        }
    }

    fn check_writable(&self) -> Result<(), StreamError> {
        lock(&self.inner.state).check_writable()
    }

    async fn write_header_locked(&self, local: &mut Local, status: StatusCode) -> Result<(), StreamError> {
        if local.wrote_header {
            return Ok(());
        }
        self.check_writable()?;

        let mut headers = std::mem::take(&mut local.headers);
        headers.insert(STATUS, status_line(status));
        headers.insert(VERSION, HTTP_11);
        headers.entry(CONTENT_TYPE).or_insert(DEFAULT_CONTENT_TYPE);
        if !headers.contains_key(DATE)
            && let Some(date) = http_date()
        {
            headers.insert(DATE, date);
        }

        local.send(Outbound::SynReply { stream_id: self.inner.stream_id, flags: 0, headers }).await?;
        local.wrote_header = true;
        Ok(())
    }
}

fn status_line(status: StatusCode) -> HeaderValue {
    match status.canonical_reason() {
        Some(reason) => HeaderValue::from_str(&format!("{} {}", status.as_str(), reason)).unwrap_or_else(|_| HeaderValue::from(status.as_u16())),
        None => HeaderValue::from(status.as_u16()),
    }
}
