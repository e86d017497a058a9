//! SPDY session handling module
//!
//! A [`Session`] owns one connection and multiplexes its streams. It runs as
//! three tasks talking over queues:
//!
//! - the reader decodes frames and forwards them to the dispatch loop
//! - the dispatch loop owns the stream map and the inflate side of the header
//!   compression context, it only ever waits for its mailbox
//! - the writer serializes outbound frames and owns the deflate side
//!
//! Each stream's handler runs on a task of its own, receiving the body through
//! a non blocking pipe filled by the dispatch loop, and queuing its response
//! frames for the writer through a [`ResponseWriter`].
//!
//! # Teardown
//!
//! A decode error, a compression failure or a write error ends the session:
//! every live stream is reset with
//! [`StreamError::ConnectionClosed`](crate::protocol::StreamError::ConnectionClosed)
//! so blocked body reads return, a GoAway is queued on a best effort basis
//! and the writer drains what is left before shutting the connection down.

mod config;
mod response_writer;
mod stream;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use response_writer::ResponseWriter;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::mpsc;
use futures::{SinkExt, Stream as FuturesStream, StreamExt};
use http::Request;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{FrameDecoder, HeaderDecoder, Outbound, SessionEncoder};
use crate::ensure;
use crate::handler::Handler;
use crate::protocol::body::RequestBody;
use crate::protocol::{
    ControlFrame, ControlType, DataFrame, DecodeError, Frame, GoAway, Ping, RequestHeader, RstStatus, RstStream, SessionError, StreamError,
    StreamId, SynStream,
};
use stream::Stream;

/// Upper bound for the writer to flush what was queued before teardown.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Frames encoded before the writer flushes the connection.
const WRITE_BATCH: usize = 32;

/// Bytes reserved for the read buffer.
const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Mailbox of the dispatch loop.
#[derive(Debug)]
enum Event {
    Frame(Frame),
    ReadEof,
    ReadError(DecodeError),
    WriteError(SessionError),
    StreamFinished(StreamId),
}

/// A SPDY server session over one connection.
///
/// # Type Parameters
///
/// * `R`: The async readable half of the connection
/// * `W`: The async writable half of the connection
///
/// When the peer address is known, every request handed to the handler
/// carries it as a [`SocketAddr`] extension.
pub struct Session<R, W> {
    reader: R,
    writer: W,
    config: SessionConfig,
    remote_addr: Option<SocketAddr>,
}

impl<R, W> std::fmt::Debug for Session<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("remote_addr", &self.remote_addr).field("config", &self.config).finish_non_exhaustive()
    }
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, SessionConfig::default())
    }

    pub fn with_config(reader: R, writer: W, config: SessionConfig) -> Self {
        Self { reader, writer, config, remote_addr: None }
    }

    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    /// Serves streams until the connection ends.
    ///
    /// Returns `Ok(())` when the peer closed the connection or sent a GoAway
    /// and every stream finished, and the fatal error otherwise.
    pub async fn process<H>(self, handler: Arc<H>) -> Result<(), SessionError>
    where
        H: Handler + ?Sized + 'static,
    {
        let config = self.config;

        let (events_tx, events_rx) = mpsc::channel(config.inbound_queue_capacity());
        let (control_tx, control_rx) = mpsc::unbounded::<Frame>();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue_capacity());

        let framed_read =
            FramedRead::with_capacity(self.reader, FrameDecoder::with_max_frame_length(config.max_frame_length()), READ_BUFFER_CAPACITY);
        let reader = tokio::spawn(read_frames(framed_read, events_tx.clone()));

        // control frames from the dispatch loop never wait behind handler output
        let outbound = futures::stream::select(control_rx.map(Outbound::from), outbound_rx);
        let framed_write = FramedWrite::new(self.writer, SessionEncoder::new());
        let mut writer = tokio::spawn(write_frames(framed_write, outbound, events_tx.clone()));

        let mut dispatcher = Dispatcher {
            handler,
            header_decoder: HeaderDecoder::with_max_block_size(config.max_header_block_size()),
            config,
            remote_addr: self.remote_addr,
            streams: HashMap::new(),
            events: events_tx,
            control: control_tx,
            outbound: outbound_tx,
            last_stream_id: 0,
            going_away: false,
        };

        let result = dispatcher.run(events_rx).await;
        dispatcher.shutdown(result.as_ref().err());
        reader.abort();

        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
            warn!("writer didn't drain in time, abort it");
            writer.abort();
        }

        match &result {
            Ok(()) => info!("finished process, session shutdown"),
            Err(e) => error!(cause = %e, "session has error, shutdown"),
        }
        result
    }
}

async fn read_frames<R>(mut framed_read: FramedRead<R, FrameDecoder>, mut events: mpsc::Sender<Event>)
where
    R: AsyncRead + Unpin,
{
    loop {
        let event = match framed_read.next().await {
            Some(Ok(frame)) => Event::Frame(frame),
            Some(Err(e)) => Event::ReadError(e),
            None => Event::ReadEof,
        };

        let last = !matches!(event, Event::Frame(_));
        if events.send(event).await.is_err() || last {
            return;
        }
    }
}

async fn write_frames<W, S>(mut framed_write: FramedWrite<W, SessionEncoder>, outbound: S, mut events: mpsc::Sender<Event>)
where
    W: AsyncWrite + Unpin,
    S: FuturesStream<Item = Outbound> + Unpin,
{
    let mut batches = outbound.ready_chunks(WRITE_BATCH);

    let result: Result<(), SessionError> = async {
        while let Some(batch) = batches.next().await {
            for item in batch {
                framed_write.feed(item).await?;
            }
            framed_write.flush().await?;
        }
        framed_write.close().await
    }
    .await;

    if let Err(e) = result {
        error!(cause = %e, "can't write frames");
        let _ = events.send(Event::WriteError(e)).await;
    }
}

/// The single owner of the stream map and the inflate context.
struct Dispatcher<H: ?Sized> {
    handler: Arc<H>,
    config: SessionConfig,
    remote_addr: Option<SocketAddr>,
    streams: HashMap<StreamId, Stream>,
    header_decoder: HeaderDecoder,
    events: mpsc::Sender<Event>,
    control: mpsc::UnboundedSender<Frame>,
    outbound: mpsc::Sender<Outbound>,
    last_stream_id: StreamId,
    going_away: bool,
}

impl<H> Dispatcher<H>
where
    H: Handler + ?Sized + 'static,
{
    async fn run(&mut self, mut events: mpsc::Receiver<Event>) -> Result<(), SessionError> {
        while let Some(event) = events.next().await {
            match event {
                Event::Frame(frame) => self.dispatch(frame)?,
                Event::StreamFinished(stream_id) => self.on_stream_finished(stream_id),
                Event::ReadEof => self.on_read_eof(),
                Event::ReadError(e) => return Err(e.into()),
                Event::WriteError(e) => return Err(e),
            }

            if self.going_away && self.streams.is_empty() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, frame: Frame) -> Result<(), SessionError> {
        let control = match frame {
            Frame::Data(data) => {
                self.on_data(data);
                return Ok(());
            }
            Frame::Control(control) => control,
        };

        match control.kind {
            ControlType::SynStream => self.on_syn_stream(SynStream::parse(&control)?)?,
            ControlType::SynReply | ControlType::Headers => self.on_unexpected_headers(&control)?,
            ControlType::RstStream => self.on_rst_stream(RstStream::parse(&control)?),
            ControlType::Ping => self.on_ping(Ping::parse(&control)?),
            ControlType::GoAway => self.on_go_away(GoAway::parse(&control)?),
            ControlType::Settings | ControlType::Noop | ControlType::WindowUpdate => {
                debug!(kind = ?control.kind, length = control.payload.len(), "ignore control frame");
            }
        }
        Ok(())
    }

    fn on_syn_stream(&mut self, syn_stream: SynStream) -> Result<(), SessionError> {
        let stream_id = syn_stream.stream_id;

        // inflate first, whatever happens to the stream the context must see the block
        let headers = match self.header_decoder.decode(&syn_stream.header_block) {
            Ok(headers) => headers,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) if self.streams.contains_key(&stream_id) => {
                warn!(stream_id, cause = %e, "ignore duplicate SynStream with malformed header block");
                return Ok(());
            }
            Err(e) => {
                warn!(stream_id, cause = %e, "refuse stream with malformed header block");
                self.reset_stream(stream_id, RstStatus::ProtocolError);
                return Ok(());
            }
        };

        if stream_id == 0 || stream_id % 2 == 0 {
            warn!(stream_id, "client opened a stream with a server side id");
            self.reset_stream(stream_id, RstStatus::ProtocolError);
            return Ok(());
        }

        if self.streams.contains_key(&stream_id) {
            warn!(stream_id, "ignore duplicate SynStream");
            return Ok(());
        }

        if stream_id <= self.last_stream_id {
            warn!(stream_id, last_stream_id = self.last_stream_id, "stream id is not increasing");
            self.reset_stream(stream_id, RstStatus::ProtocolError);
            return Ok(());
        }

        if self.going_away {
            debug!(stream_id, "refuse stream after GoAway");
            self.reset_stream(stream_id, RstStatus::RefusedStream);
            return Ok(());
        }

        let header = match RequestHeader::try_from(headers) {
            Ok(header) => header,
            Err(e) => {
                warn!(stream_id, cause = %e, "refuse stream with invalid request");
                self.reset_stream(stream_id, RstStatus::ProtocolError);
                return Ok(());
            }
        };

        self.last_stream_id = stream_id;
        let (stream, body) = Stream::open(syn_stream.is_fin(), self.config.max_buffered_body());
        let response = ResponseWriter::new(stream_id, stream.state(), self.outbound.clone());
        self.streams.insert(stream_id, stream);

        debug!(stream_id, method = %header.method(), uri = %header.uri(), "open stream");
        let mut request = header.body(body);
        if let Some(remote_addr) = self.remote_addr {
            request.extensions_mut().insert(remote_addr);
        }
        self.spawn_handler(stream_id, request, response);
        Ok(())
    }

    fn spawn_handler(&self, stream_id: StreamId, request: Request<RequestBody>, response: ResponseWriter) {
        let handler = Arc::clone(&self.handler);
        let handler_timeout = self.config.handler_timeout();
        let mut events = self.events.clone();

        tokio::spawn(async move {
            let serve = {
                let response = response.clone();
                tokio::spawn(async move { handler.serve(request, response).await })
            };

            run_handler(serve, &response, handler_timeout).await;
            // the dispatch loop may be gone already
            let _ = events.send(Event::StreamFinished(stream_id)).await;
        });
    }

    /// SynReply and Headers are never sent to a server, their block is still
    /// inflated to keep the context in step.
    fn on_unexpected_headers(&mut self, control: &ControlFrame) -> Result<(), SessionError> {
        ensure!(control.payload.len() >= 6, DecodeError::invalid_payload(control.kind, "missing stream id").into());

        match self.header_decoder.decode(&control.payload[6..]) {
            Err(e) if e.is_fatal() => Err(e.into()),
            _ => {
                warn!(kind = ?control.kind, "ignore header frame sent to a server");
                Ok(())
            }
        }
    }

    fn on_data(&mut self, data: DataFrame) {
        let stream_id = data.stream_id;
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            let e = SessionError::stream_not_found(stream_id);
            debug!(cause = %e, length = data.payload.len(), "drop data frame");
            return;
        };

        trace!(stream_id, length = data.payload.len(), fin = data.is_fin(), "receive data frame");
        match stream.receive_data(data) {
            Ok(()) if stream.is_finished() => {
                self.streams.remove(&stream_id);
            }
            Ok(()) => {}
            Err(status) => {
                warn!(stream_id, %status, "reset stream on bad data frame");
                self.reset_stream(stream_id, status);
            }
        }
    }

    fn on_rst_stream(&mut self, rst_stream: RstStream) {
        let stream_id = rst_stream.stream_id;
        match self.streams.remove(&stream_id) {
            Some(mut stream) => {
                info!(stream_id, status = %rst_stream.status, "stream reset by peer");
                stream.reset(StreamError::reset(rst_stream.status));
            }
            None => debug!(stream_id, status = %rst_stream.status, "reset for unknown stream"),
        }
    }

    fn on_ping(&mut self, ping: Ping) {
        trace!(id = ping.id, "echo ping");
        self.send_control(ping.into_frame());
    }

    fn on_go_away(&mut self, go_away: GoAway) {
        info!(last_good_stream_id = go_away.last_good_stream_id, live_streams = self.streams.len(), "receive GoAway");
        self.going_away = true;
    }

    fn on_read_eof(&mut self) {
        info!(live_streams = self.streams.len(), "cant read more frames, finish live streams");
        self.going_away = true;

        for stream in self.streams.values_mut() {
            stream.abort_remote(StreamError::ConnectionClosed);
        }
        self.streams.retain(|_, stream| !stream.is_finished());
    }

    fn on_stream_finished(&mut self, stream_id: StreamId) {
        if self.streams.get(&stream_id).is_some_and(Stream::is_finished) {
            trace!(stream_id, "remove finished stream");
            self.streams.remove(&stream_id);
        }
    }

    /// Resets a stream locally, if it still exists, and tells the peer.
    fn reset_stream(&mut self, stream_id: StreamId, status: RstStatus) {
        if let Some(mut stream) = self.streams.remove(&stream_id) {
            stream.reset(StreamError::reset(status));
        }
        self.send_control(RstStream::new(stream_id, status).into_frame());
    }

    fn send_control(&self, frame: ControlFrame) {
        if let Err(e) = self.control.unbounded_send(Frame::Control(frame)) {
            debug!(cause = %e, "drop control frame, writer is gone");
        }
    }

    fn shutdown(&mut self, error: Option<&SessionError>) {
        for (stream_id, mut stream) in self.streams.drain() {
            debug!(stream_id, "reset live stream on session shutdown");
            stream.reset(StreamError::ConnectionClosed);
        }

        if error.is_some() {
            self.send_control(GoAway { last_good_stream_id: self.last_stream_id }.into_frame());
        }

        self.control.close_channel();
        self.outbound.close_channel();
    }
}

async fn run_handler(mut serve: JoinHandle<()>, response: &ResponseWriter, handler_timeout: Option<Duration>) {
    let stream_id = response.stream_id();

    let result = match handler_timeout {
        Some(duration) => match tokio::time::timeout(duration, &mut serve).await {
            Ok(result) => result,
            Err(_elapsed) => {
                serve.abort();
                warn!(stream_id, timeout = ?duration, "handler timed out, cancel stream");
                response.reset(RstStatus::Cancel).await;
                return;
            }
        },
        None => (&mut serve).await,
    };

    match result {
        Ok(()) => response.finish().await,
        Err(e) => {
            error!(stream_id, cause = %e, "handler failed");
            response.reset(RstStatus::InternalError).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameEncoder, HeaderEncoder};
    use crate::handler::make_handler;
    use crate::protocol::{FLAG_FIN, SynReply};
    use bytes::{Bytes, BytesMut};
    use http::{HeaderMap, HeaderValue, StatusCode};
    use http_body_util::BodyExt;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::sync::mpsc as tokio_mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    /// A connection whose write side is already broken.
    #[derive(Debug)]
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// The browser side of a session.
    struct Client {
        frames: FramedRead<ReadHalf<DuplexStream>, FrameDecoder>,
        sink: FramedWrite<WriteHalf<DuplexStream>, FrameEncoder>,
        header_encoder: HeaderEncoder,
        header_decoder: HeaderDecoder,
    }

    impl Client {
        async fn send(&mut self, frame: impl Into<Frame>) {
            self.sink.send(frame.into()).await.unwrap();
        }

        async fn syn_stream_with(&mut self, stream_id: StreamId, headers: &HeaderMap, fin: bool) {
            let mut header_block = BytesMut::new();
            self.header_encoder.encode(headers, &mut header_block).unwrap();
            let syn_stream = SynStream {
                stream_id,
                associated_stream_id: 0,
                priority: 0,
                flags: if fin { FLAG_FIN } else { 0 },
                header_block: header_block.freeze(),
            };
            self.send(syn_stream.into_frame()).await;
        }

        async fn syn_stream_raw(&mut self, stream_id: StreamId, block: &[u8], fin: bool) {
            let mut header_block = BytesMut::new();
            self.header_encoder.encode_raw(block, &mut header_block).unwrap();
            let syn_stream = SynStream {
                stream_id,
                associated_stream_id: 0,
                priority: 0,
                flags: if fin { FLAG_FIN } else { 0 },
                header_block: header_block.freeze(),
            };
            self.send(syn_stream.into_frame()).await;
        }

        async fn syn_stream(&mut self, stream_id: StreamId, url: &'static str, fin: bool) {
            let mut headers = HeaderMap::new();
            headers.insert("method", HeaderValue::from_static("GET"));
            headers.insert("url", HeaderValue::from_static(url));
            headers.insert("version", HeaderValue::from_static("HTTP/1.1"));
            headers.insert("host", HeaderValue::from_static("localhost"));
            self.syn_stream_with(stream_id, &headers, fin).await;
        }

        async fn data(&mut self, stream_id: StreamId, payload: impl Into<Bytes>, fin: bool) {
            let mut frame = DataFrame::new(stream_id, payload.into());
            if fin {
                frame.flags |= FLAG_FIN;
            }
            self.send(frame).await;
        }

        async fn next(&mut self) -> Option<Frame> {
            tokio::time::timeout(WAIT, self.frames.next()).await.expect("wait frame timeout").map(Result::unwrap)
        }

        async fn reply(&mut self) -> (StreamId, HeaderMap) {
            match self.next().await {
                Some(Frame::Control(control)) if control.kind == ControlType::SynReply => self.decode_reply(&control),
                other => panic!("expect SynReply, got {other:?}"),
            }
        }

        fn decode_reply(&mut self, control: &ControlFrame) -> (StreamId, HeaderMap) {
            let reply = SynReply::parse(control).unwrap();
            (reply.stream_id, self.header_decoder.decode(&reply.header_block).unwrap())
        }

        async fn rst_stream(&mut self) -> RstStream {
            match self.next().await {
                Some(Frame::Control(control)) if control.kind == ControlType::RstStream => RstStream::parse(&control).unwrap(),
                other => panic!("expect RstStream, got {other:?}"),
            }
        }

        async fn close(&mut self) {
            SinkExt::close(&mut self.sink).await.unwrap();
        }
    }

    fn start<H: Handler + 'static>(handler: H, config: SessionConfig) -> (Client, JoinHandle<Result<(), SessionError>>) {
        start_with(handler, config, None)
    }

    fn start_with<H: Handler + 'static>(
        handler: H,
        config: SessionConfig,
        remote_addr: Option<SocketAddr>,
    ) -> (Client, JoinHandle<Result<(), SessionError>>) {
        let (client, server) = tokio::io::duplex(256 * 1024);

        let (reader, writer) = tokio::io::split(server);
        let mut session = Session::with_config(reader, writer, config);
        if let Some(remote_addr) = remote_addr {
            session = session.with_remote_addr(remote_addr);
        }
        let session = tokio::spawn(session.process(Arc::new(handler)));

        let (reader, writer) = tokio::io::split(client);
        let client = Client {
            frames: FramedRead::new(reader, FrameDecoder::new()),
            sink: FramedWrite::new(writer, FrameEncoder),
            header_encoder: HeaderEncoder::new(),
            header_decoder: HeaderDecoder::new(),
        };
        (client, session)
    }

    fn assert_data(frame: Option<Frame>, stream_id: StreamId, payload: &str, fin: bool) {
        match frame {
            Some(Frame::Data(data)) => {
                assert_eq!(data.stream_id, stream_id);
                assert_eq!(data.payload, payload.as_bytes());
                assert_eq!(data.is_fin(), fin);
            }
            other => panic!("expect data frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_request_gets_reply_body_and_fin() {
        let handler = make_handler(|request: Request<RequestBody>, response: ResponseWriter| async move {
            assert_eq!(request.uri().path(), "/");
            let body = request.into_body().collect().await.unwrap().to_bytes();
            assert!(body.is_empty());

            response.write_header(StatusCode::OK).await.unwrap();
            response.write("ok").await.unwrap();
            response.close().await.unwrap();
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/", true).await;

        let (stream_id, headers) = client.reply().await;
        assert_eq!(stream_id, 1);
        assert_eq!(headers["status"], "200 OK");
        assert_eq!(headers["version"], "HTTP/1.1");
        assert_eq!(headers["content-type"], "text/html; charset=utf-8");
        assert_data(client.next().await, 1, "ok", false);
        assert_data(client.next().await, 1, "", true);

        client.close().await;
        session.await.unwrap().unwrap();
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn handler_sees_the_peer_address() {
        let peer: SocketAddr = "192.0.2.7:41000".parse().unwrap();
        let handler = make_handler(|request: Request<RequestBody>, response: ResponseWriter| async move {
            let remote_addr = request.extensions().get::<SocketAddr>().copied();
            response.write(format!("{remote_addr:?}")).await.unwrap();
        });
        let (mut client, session) = start_with(handler, SessionConfig::default(), Some(peer));

        client.syn_stream(1, "/", true).await;
        client.reply().await;
        assert_data(client.next().await, 1, "Some(192.0.2.7:41000)", false);
        assert_data(client.next().await, 1, "", true);

        client.close().await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn no_peer_address_without_one() {
        let handler = make_handler(|request: Request<RequestBody>, response: ResponseWriter| async move {
            assert!(request.extensions().get::<SocketAddr>().is_none());
            response.write("none").await.unwrap();
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/", true).await;
        client.reply().await;
        assert_data(client.next().await, 1, "none", false);
        assert_data(client.next().await, 1, "", true);

        client.close().await;
        session.await.unwrap().unwrap();
    }

    #[test]
    fn debug_shows_peer_and_config() {
        let (reader, writer) = tokio::io::split(tokio::io::duplex(64).0);
        let session = Session::new(reader, writer).with_remote_addr("192.0.2.1:80".parse().unwrap());
        let debug = format!("{session:?}");
        assert!(debug.starts_with("Session"));
        assert!(debug.contains("192.0.2.1:80"));
    }

    #[tokio::test]
    async fn ping_is_echoed_verbatim() {
        let handler = make_handler(|_request: Request<RequestBody>, _response: ResponseWriter| async move {});
        let (mut client, session) = start(handler, SessionConfig::default());

        client.send(Ping { id: 0x1234_5678 }.into_frame()).await;
        match client.next().await {
            Some(Frame::Control(control)) => assert_eq!(Ping::parse(&control).unwrap(), Ping { id: 0x1234_5678 }),
            other => panic!("expect ping, got {other:?}"),
        }

        client.close().await;
        session.await.unwrap().unwrap();
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn header_and_close_go_out_once() {
        let handler = make_handler(|_request: Request<RequestBody>, response: ResponseWriter| async move {
            response.write_header(StatusCode::OK).await.unwrap();
            response.write_header(StatusCode::NOT_FOUND).await.unwrap();
            response.write("ok").await.unwrap();
            response.close().await.unwrap();
            response.close().await.unwrap();
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/", true).await;
        let (_, headers) = client.reply().await;
        assert_eq!(headers["status"], "200 OK");
        assert_data(client.next().await, 1, "ok", false);
        assert_data(client.next().await, 1, "", true);

        client.close().await;
        session.await.unwrap().unwrap();
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn interleaved_streams_keep_their_bytes() {
        let handler = make_handler(|request: Request<RequestBody>, response: ResponseWriter| async move {
            let body = request.into_body().collect().await.unwrap().to_bytes();
            response.write(body).await.unwrap();
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/a", false).await;
        client.syn_stream(3, "/b", false).await;
        client.data(1, "a1", false).await;
        client.data(3, "b1", false).await;
        client.data(3, "b2", true).await;
        client.data(1, "a2", true).await;

        let mut bodies: HashMap<StreamId, Vec<u8>> = HashMap::new();
        let mut replies = 0;
        let mut finished = 0;
        while finished < 2 {
            match client.next().await {
                Some(Frame::Control(control)) => {
                    let (stream_id, headers) = client.decode_reply(&control);
                    assert!(stream_id == 1 || stream_id == 3);
                    assert_eq!(headers["status"], "200 OK");
                    replies += 1;
                }
                Some(Frame::Data(data)) => {
                    bodies.entry(data.stream_id).or_default().extend_from_slice(&data.payload);
                    if data.is_fin() {
                        finished += 1;
                    }
                }
                None => panic!("connection closed early"),
            }
        }

        assert_eq!(replies, 2);
        assert_eq!(bodies[&1], b"a1a2");
        assert_eq!(bodies[&3], b"b1b2");

        client.close().await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn reset_mid_body_leaves_other_streams_intact() {
        let (results_tx, mut results_rx) = tokio_mpsc::unbounded_channel();
        let handler = make_handler(move |request: Request<RequestBody>, response: ResponseWriter| {
            let results_tx = results_tx.clone();
            async move {
                let path = request.uri().path().to_string();
                match request.into_body().collect().await {
                    Ok(collected) => {
                        response.write(collected.to_bytes()).await.unwrap();
                    }
                    Err(e) => results_tx.send((path, e)).unwrap(),
                }
            }
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/a", false).await;
        client.syn_stream(3, "/b", false).await;
        client.syn_stream(5, "/c", false).await;
        client.data(1, "a1", false).await;
        client.data(5, "c1", false).await;
        client.data(3, "b1", false).await;
        client.send(RstStream::new(5, RstStatus::Cancel).into_frame()).await;
        client.data(1, "a2", true).await;
        client.data(5, "c2", false).await;
        client.data(3, "b2", false).await;
        client.data(3, "b3", true).await;

        let (path, error) = tokio::time::timeout(WAIT, results_rx.recv()).await.unwrap().unwrap();
        assert_eq!(path, "/c");
        assert_eq!(error, StreamError::reset(RstStatus::Cancel));

        let mut bodies: HashMap<StreamId, Vec<u8>> = HashMap::new();
        let mut finished = 0;
        while finished < 2 {
            match client.next().await {
                Some(Frame::Control(control)) => {
                    let (stream_id, _) = client.decode_reply(&control);
                    assert!(stream_id == 1 || stream_id == 3);
                }
                Some(Frame::Data(data)) => {
                    assert_ne!(data.stream_id, 5);
                    bodies.entry(data.stream_id).or_default().extend_from_slice(&data.payload);
                    if data.is_fin() {
                        finished += 1;
                    }
                }
                None => panic!("connection closed early"),
            }
        }

        assert_eq!(bodies[&1], b"a1a2");
        assert_eq!(bodies[&3], b"b1b2b3");

        client.close().await;
        session.await.unwrap().unwrap();
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn write_failure_fails_blocked_body_reads() {
        let (started_tx, mut started_rx) = tokio_mpsc::unbounded_channel();
        let (results_tx, mut results_rx) = tokio_mpsc::unbounded_channel();
        let handler = make_handler(move |request: Request<RequestBody>, _response: ResponseWriter| {
            let started_tx = started_tx.clone();
            let results_tx = results_tx.clone();
            async move {
                started_tx.send(()).unwrap();
                let result = request.into_body().collect().await.map(|collected| collected.to_bytes());
                results_tx.send(result).unwrap();
            }
        });

        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_reader, _server_writer) = tokio::io::split(server);
        let session = tokio::spawn(Session::new(server_reader, BrokenWriter).process(Arc::new(handler)));

        let (reader, writer) = tokio::io::split(client);
        let mut client = Client {
            frames: FramedRead::new(reader, FrameDecoder::new()),
            sink: FramedWrite::new(writer, FrameEncoder),
            header_encoder: HeaderEncoder::new(),
            header_decoder: HeaderDecoder::new(),
        };

        client.syn_stream(1, "/upload", false).await;
        tokio::time::timeout(WAIT, started_rx.recv()).await.unwrap().unwrap();

        // the echo is the first frame the session tries to write
        client.send(Ping { id: 9 }.into_frame()).await;

        let result = tokio::time::timeout(WAIT, results_rx.recv()).await.unwrap().unwrap();
        assert_eq!(result.unwrap_err(), StreamError::ConnectionClosed);

        let error = tokio::time::timeout(WAIT, session).await.unwrap().unwrap().unwrap_err();
        assert!(matches!(error, SessionError::Io { .. }));
    }

    #[tokio::test]
    async fn oversized_frame_tears_down_the_session() {
        let (results_tx, mut results_rx) = tokio_mpsc::unbounded_channel();
        let handler = make_handler(move |request: Request<RequestBody>, _response: ResponseWriter| {
            let results_tx = results_tx.clone();
            async move {
                let result = request.into_body().collect().await.map(|collected| collected.to_bytes());
                results_tx.send(result).unwrap();
            }
        });
        let (mut client, session) = start(handler, SessionConfig::builder().max_frame_length(1024).build());

        client.syn_stream(1, "/upload", false).await;
        client.syn_stream(3, "/upload", false).await;
        client.data(1, "hello", false).await;
        client.data(3, vec![0u8; 2048], false).await;

        for _ in 0..2 {
            let result = tokio::time::timeout(WAIT, results_rx.recv()).await.unwrap().unwrap();
            assert_eq!(result.unwrap_err(), StreamError::ConnectionClosed);
        }

        let error = session.await.unwrap().unwrap_err();
        assert!(matches!(error, SessionError::Decode { source: DecodeError::OversizedFrame { length: 2048, max_length: 1024 } }));

        match client.next().await {
            Some(Frame::Control(control)) => assert_eq!(GoAway::parse(&control).unwrap().last_good_stream_id, 3),
            other => panic!("expect GoAway, got {other:?}"),
        }
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn rst_stream_unblocks_pending_read() {
        let (started_tx, mut started_rx) = tokio_mpsc::unbounded_channel();
        let (results_tx, mut results_rx) = tokio_mpsc::unbounded_channel();
        let handler = make_handler(move |request: Request<RequestBody>, _response: ResponseWriter| {
            let started_tx = started_tx.clone();
            let results_tx = results_tx.clone();
            async move {
                started_tx.send(()).unwrap();
                let result = request.into_body().collect().await.map(|collected| collected.to_bytes());
                results_tx.send(result).unwrap();
            }
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(7, "/slow", false).await;
        tokio::time::timeout(WAIT, started_rx.recv()).await.unwrap().unwrap();

        client.send(RstStream::new(7, RstStatus::Cancel).into_frame()).await;
        let result = tokio::time::timeout(WAIT, results_rx.recv()).await.unwrap().unwrap();
        assert_eq!(result.unwrap_err(), StreamError::reset(RstStatus::Cancel));

        client.close().await;
        session.await.unwrap().unwrap();
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn invalid_request_is_refused_but_session_survives() {
        let handler = make_handler(|_request: Request<RequestBody>, _response: ResponseWriter| async move {});
        let (mut client, session) = start(handler, SessionConfig::default());

        let mut headers = HeaderMap::new();
        headers.insert("method", HeaderValue::from_static("GET"));
        client.syn_stream_with(1, &headers, true).await;
        assert_eq!(client.rst_stream().await, RstStream::new(1, RstStatus::ProtocolError));

        // the inflate context is still in step
        client.syn_stream(3, "/", true).await;
        let (stream_id, _) = client.reply().await;
        assert_eq!(stream_id, 3);
        assert_data(client.next().await, 3, "", true);

        client.close().await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn even_stream_id_is_refused() {
        let handler = make_handler(|_request: Request<RequestBody>, _response: ResponseWriter| async move {});
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(2, "/", true).await;
        assert_eq!(client.rst_stream().await, RstStream::new(2, RstStatus::ProtocolError));

        client.close().await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn duplicate_syn_stream_is_ignored() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = {
            let calls = Arc::clone(&calls);
            make_handler(move |_request: Request<RequestBody>, response: ResponseWriter| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    response.write("ok").await.unwrap();
                }
            })
        };
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/", false).await;
        client.syn_stream(1, "/again", false).await;
        client.data(1, "", true).await;

        let (stream_id, _) = client.reply().await;
        assert_eq!(stream_id, 1);
        assert_data(client.next().await, 1, "ok", false);
        assert_data(client.next().await, 1, "", true);

        client.close().await;
        session.await.unwrap().unwrap();
        assert!(client.next().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_duplicate_syn_stream_leaves_live_stream_alone() {
        let handler = make_handler(|request: Request<RequestBody>, response: ResponseWriter| async move {
            let body = request.into_body().collect().await.unwrap().to_bytes();
            response.write(body).await.unwrap();
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/", false).await;
        // inflates fine but carries an uppercase name
        client.syn_stream_raw(1, &[0, 1, 0, 3, b'U', b'R', b'L', 0, 1, b'/'], false).await;
        client.data(1, "x", true).await;

        let (stream_id, _) = client.reply().await;
        assert_eq!(stream_id, 1);
        assert_data(client.next().await, 1, "x", false);
        assert_data(client.next().await, 1, "", true);

        // the inflate context stayed in step
        client.syn_stream(3, "/", true).await;
        let (stream_id, _) = client.reply().await;
        assert_eq!(stream_id, 3);
        assert_data(client.next().await, 3, "", true);

        client.close().await;
        session.await.unwrap().unwrap();
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn go_away_refuses_new_streams_and_drains_live_ones() {
        let handler = make_handler(|request: Request<RequestBody>, response: ResponseWriter| async move {
            let body = request.into_body().collect().await.unwrap().to_bytes();
            response.write(body).await.unwrap();
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/", false).await;
        client.send(GoAway { last_good_stream_id: 0 }.into_frame()).await;
        client.syn_stream(3, "/", true).await;
        assert_eq!(client.rst_stream().await, RstStream::new(3, RstStatus::RefusedStream));

        client.data(1, "bye", true).await;
        let (stream_id, _) = client.reply().await;
        assert_eq!(stream_id, 1);
        assert_data(client.next().await, 1, "bye", false);
        assert_data(client.next().await, 1, "", true);

        // ends without the client closing its side
        tokio::time::timeout(WAIT, session).await.unwrap().unwrap().unwrap();
        assert!(client.next().await.is_none());
    }

    #[tokio::test]
    async fn slow_handler_is_cancelled() {
        let handler = make_handler(|_request: Request<RequestBody>, _response: ResponseWriter| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let (mut client, session) = start(handler, SessionConfig::builder().handler_timeout(Duration::from_millis(50)).build());

        client.syn_stream(1, "/", true).await;
        assert_eq!(client.rst_stream().await, RstStream::new(1, RstStatus::Cancel));

        client.close().await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn panicking_handler_resets_its_stream() {
        let handler = make_handler(|request: Request<RequestBody>, _response: ResponseWriter| async move {
            if request.uri().path() == "/panic" {
                panic!("handler bug");
            }
        });
        let (mut client, session) = start(handler, SessionConfig::default());

        client.syn_stream(1, "/panic", true).await;
        assert_eq!(client.rst_stream().await, RstStream::new(1, RstStatus::InternalError));

        client.close().await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unread_body_overflow_resets_the_stream() {
        let handler = make_handler(|_request: Request<RequestBody>, _response: ResponseWriter| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let (mut client, session) = start(handler, SessionConfig::builder().max_buffered_body(8).build());

        client.syn_stream(1, "/upload", false).await;
        client.data(1, "0123456789abcdef", false).await;
        assert_eq!(client.rst_stream().await, RstStream::new(1, RstStatus::FlowControlError));

        // frames of the reset stream are dropped quietly
        client.data(1, "more", true).await;
        client.send(Ping { id: 1 }.into_frame()).await;
        assert!(matches!(client.next().await, Some(Frame::Control(control)) if control.kind == ControlType::Ping));

        client.close().await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn corrupt_header_block_is_fatal() {
        let handler = make_handler(|_request: Request<RequestBody>, _response: ResponseWriter| async move {});
        let (mut client, session) = start(handler, SessionConfig::default());

        let syn_stream = SynStream {
            stream_id: 1,
            associated_stream_id: 0,
            priority: 0,
            flags: FLAG_FIN,
            header_block: Bytes::from_static(b"not a zlib stream"),
        };
        client.send(syn_stream.into_frame()).await;

        let error = session.await.unwrap().unwrap_err();
        assert!(matches!(error, SessionError::Compression { .. }));
        assert!(error.is_fatal());

        match client.next().await {
            Some(Frame::Control(control)) => assert_eq!(GoAway::parse(&control).unwrap().last_good_stream_id, 0),
            other => panic!("expect GoAway, got {other:?}"),
        }
    }
}
