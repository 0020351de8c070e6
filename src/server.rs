//! RPC server: accept loop, per-connection stream serving, dispatch.
//!
//! Built through [`RpcServerBuilder`]; `listen()` validates TLS material
//! before binding, binds, and hands back a [`ServerHandle`] for the bound
//! address and lifecycle control. Each accepted connection runs on its own
//! task; streams on one connection are served in arrival order, so a slow
//! handler delays only its own connection. Protocol errors are logged and
//! isolate to the offending connection.
//!
//! # Example
//!
//! ```no_run
//! use wirecall::codec::MsgPackCoder;
//! use wirecall::handler::TypedHandler;
//! use wirecall::RpcServer;
//!
//! # async fn run() -> wirecall::Result<()> {
//! let handle = RpcServer::builder("127.0.0.1", 8080)
//!     .handler(
//!         "calc.service/Double",
//!         TypedHandler::new(
//!             MsgPackCoder::<u32>::new(),
//!             MsgPackCoder::<u32>::new(),
//!             |_headers, n| async move { Ok(n * 2) },
//!         ),
//!     )
//!     .listen()
//!     .await?;
//! println!("listening on {}", handle.local_addr());
//! handle.wait().await;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use h2::server::SendResponse;
use h2::RecvStream;
use http::header::CONTENT_TYPE;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::error::{Result, WirecallError};
use crate::handler::{Handler, HandlerRegistry};
use crate::message::{self, GRPC_CONTENT_TYPE, GRPC_ENCODING, GRPC_STATUS};
use crate::status::Status;
use crate::transport::conn::read_body;
use crate::transport::sock::{server_tls_acceptor, verify_server_alpn, IoStream};
use crate::transport::TlsOptions;

/// Entry point for building a server. See [`RpcServerBuilder`].
pub struct RpcServer;

impl RpcServer {
    pub fn builder(host: &str, port: u16) -> RpcServerBuilder {
        RpcServerBuilder {
            host: host.to_string(),
            port,
            registry: HandlerRegistry::new(),
            tls: None,
        }
    }
}

/// Configures handlers and transport before the server starts listening.
pub struct RpcServerBuilder {
    host: String,
    port: u16,
    registry: HandlerRegistry,
    tls: Option<TlsOptions>,
}

impl RpcServerBuilder {
    /// Register a handler under a `service/Method` path.
    pub fn handler<H>(mut self, path: &str, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.registry.register(path, handler);
        self
    }

    /// Replace the whole handler table.
    ///
    /// Handlers registered through earlier [`handler`](Self::handler) calls
    /// are discarded; register into the new table (or call `handler` after
    /// this) to keep them.
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Serve TLS with ALPN pinned to `h2`. Certificate and key are required.
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Validate configuration, bind, and start accepting.
    ///
    /// Missing TLS material fails with a configuration error before any
    /// socket is bound.
    pub async fn listen(self) -> Result<ServerHandle> {
        let acceptor = match &self.tls {
            Some(tls) => Some(server_tls_acceptor(tls)?),
            None => None,
        };

        let listener = TcpListener::bind((self.host.as_str(), self.port)).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, secure = acceptor.is_some(), "server listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::new(self.registry);
        let task = tokio::spawn(accept_loop(listener, acceptor, registry, shutdown_rx));

        Ok(ServerHandle {
            local_addr,
            shutdown: shutdown_tx,
            task,
        })
    }
}

/// Control handle for a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and wait for the accept loop to exit.
    ///
    /// Connections already accepted run to completion on their own tasks.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Block until the accept loop exits on its own.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<HandlerRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((tcp, peer)) => {
                let acceptor = acceptor.clone();
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(tcp, acceptor, registry).await {
                        tracing::warn!(%peer, error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
            }
        }
    }
    tracing::debug!("accept loop stopped");
}

/// Serve one peer: optional TLS accept + ALPN check, h2 handshake, then
/// streams in arrival order.
async fn serve_connection(
    tcp: TcpStream,
    acceptor: Option<TlsAcceptor>,
    registry: Arc<HandlerRegistry>,
) -> Result<()> {
    tcp.set_nodelay(true)?;

    let io = match acceptor {
        Some(acceptor) => {
            let stream = acceptor
                .accept(tcp)
                .await
                .map_err(WirecallError::Connection)?;
            verify_server_alpn(&stream)?;
            IoStream::Tls(Box::new(stream.into()))
        }
        None => IoStream::Plain(tcp),
    };

    let mut conn = h2::server::handshake(io).await?;
    while let Some(accepted) = conn.accept().await {
        let (request, respond) = accepted?;
        if let Err(e) = handle_stream(&registry, request, respond).await {
            tracing::warn!(error = %e, "stream failed");
        }
    }
    Ok(())
}

/// Run one stream: read the request, dispatch, reply.
///
/// Always answers `:status 200` with the outcome in `grpc-status`; an
/// unmatched path answers `Unimplemented` with an empty body.
async fn handle_stream(
    registry: &HandlerRegistry,
    request: http::Request<RecvStream>,
    mut respond: SendResponse<Bytes>,
) -> Result<()> {
    let path = request.uri().path().trim_start_matches('/').to_string();
    let (parts, body) = request.into_parts();
    let (payload, _trailers) = read_body(body).await?;

    let (status, reply) = match registry.get(&path) {
        None => {
            tracing::debug!(%path, "no handler registered");
            (Status::Unimplemented, Vec::new())
        }
        Some(handler) => match message::decompress(&payload) {
            Ok(raw) => handler.call(parts.headers, raw).await,
            Err(e) => {
                tracing::warn!(%path, error = %e, "failed to decompress request body");
                (Status::InvalidArgument, Vec::new())
            }
        },
    };

    let compressed = message::compress(&reply)?;
    let response = http::Response::builder()
        .status(200)
        .header(CONTENT_TYPE, GRPC_CONTENT_TYPE)
        .header(GRPC_ENCODING, "gzip")
        .header(GRPC_STATUS, status.code().to_string())
        .body(())?;

    let mut stream = respond.send_response(response, false)?;
    crate::transport::send_body(&mut stream, compressed).await?;
    Ok(())
}
