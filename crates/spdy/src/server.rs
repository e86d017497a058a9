//! Accept loop running one [`Session`] per connection.

use std::future::{self, Future};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::handler::Handler;
use crate::protocol::SessionError;
use crate::session::{Session, SessionConfig};

pub struct ServerBuilder {
    handler: Option<Arc<dyn Handler>>,
    address: Option<io::Result<Vec<SocketAddr>>>,
    config: SessionConfig,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { handler: None, address: None, config: SessionConfig::default() }
    }

    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect));
        self
    }

    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Server, ServerBuildError> {
        let handler = self.handler.ok_or(ServerBuildError::MissingHandler)?;
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?.map_err(|source| ServerBuildError::InvalidAddress { source })?;
        if address.is_empty() {
            return Err(ServerBuildError::MissingAddress);
        }
        Ok(Server { handler, address, config: self.config })
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder").field("address", &self.address).field("config", &self.config).finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("handler must be set")]
    MissingHandler,
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {source}")]
    InvalidAddress { source: io::Error },
}

pub struct Server {
    handler: Arc<dyn Handler>,
    address: Vec<SocketAddr>,
    config: SessionConfig,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("address", &self.address).field("config", &self.config).finish_non_exhaustive()
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the configured address and serves until the process ends.
    pub async fn start(self) -> io::Result<()> {
        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return Err(e);
            }
        };

        self.serve_with_shutdown(tcp_listener, future::pending()).await;
        Ok(())
    }

    /// Accepts connections from `tcp_listener` until `signal` completes.
    ///
    /// Requests carry the peer's [`SocketAddr`] as an extension. Sessions
    /// already running are left to finish on their own.
    pub async fn serve_with_shutdown<F>(&self, tcp_listener: TcpListener, signal: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);

        loop {
            let (tcp_stream, remote_addr) = tokio::select! {
                biased;
                () = &mut signal => {
                    info!("receive shutdown signal, stop accepting");
                    return;
                }
                accepted = tcp_listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            let handler = Arc::clone(&self.handler);
            let config = self.config.clone();

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let session = Session::with_config(reader, writer, config).with_remote_addr(remote_addr);
                match session.process(handler).await {
                    Ok(()) => info!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => error!(%remote_addr, cause = %e, "session has error, connection shutdown"),
                }
            });
        }
    }

    /// Runs one session over an already established transport, TLS wrapped or not.
    pub async fn serve_connection<IO>(&self, io: IO) -> Result<(), SessionError>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Session::with_config(reader, writer, self.config.clone()).process(Arc::clone(&self.handler)).await
    }
}
