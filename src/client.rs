//! RPC client: typed unary calls over one multiplexed connection.
//!
//! An [`RpcClient`] owns a single [`Connection`] to one peer. The connection
//! is established lazily on the first call and reused for every call after
//! it; concurrent calls multiplex as independent HTTP/2 streams.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use serde::{Serialize, Deserialize};
//! use wirecall::codec::MsgPackCoder;
//! use wirecall::{RpcClient, Status};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Search { name: String }
//! #[derive(Serialize, Deserialize)]
//! struct SearchReply { foos: Vec<(String, u32)> }
//!
//! # async fn run() -> wirecall::Result<()> {
//! let client = RpcClient::new("localhost", 8080);
//! let (status, reply) = client
//!     .call(
//!         "foo.service/Search",
//!         &Search { name: "foo".into() },
//!         &MsgPackCoder::<Search>::new(),
//!         &MsgPackCoder::<SearchReply>::new(),
//!         Duration::from_secs(5),
//!     )
//!     .await?;
//! assert_eq!(status, Status::Ok);
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use crate::codec::Coder;
use crate::error::{Result, WirecallError};
use crate::message::Request;
use crate::promise::Promise;
use crate::status::Status;
use crate::transport::{CallResult, Connection, SocketBuilder, TlsOptions};

/// Client endpoint for unary calls against one `host:port` peer.
pub struct RpcClient {
    authority: String,
    connection: Connection,
}

impl RpcClient {
    /// Client over plain TCP.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            authority: format!("{host}:{port}"),
            connection: Connection::new(SocketBuilder::plain(host, port)),
        }
    }

    /// Client over TLS with ALPN pinned to `h2`.
    pub fn with_tls(host: &str, port: u16, tls: TlsOptions) -> Self {
        Self {
            authority: format!("{host}:{port}"),
            connection: Connection::new(SocketBuilder::secure(host, port, tls)),
        }
    }

    /// Issue a call and return its promise without waiting for the reply.
    ///
    /// Encodes and compresses `message`, then submits the stream. Connection
    /// establishment failures (refused, TLS, ALPN) surface here; anything
    /// after submission resolves through the promise. The timeout budget is
    /// advertised to the peer in the `grpc-timeout` header but not enforced
    /// here; bound the wait on the returned promise to enforce it locally.
    pub async fn rpc<C: Coder>(
        &self,
        path: &str,
        message: &C::Message,
        coder: &C,
        timeout: Duration,
    ) -> Result<Promise<CallResult>> {
        let encoded = coder.encode(message)?;
        let request = Request::new(&self.authority, path, &encoded, timeout)?;
        self.connection.call(request).await
    }

    /// Issue a call and wait for its reply, bounded by `timeout`.
    ///
    /// Returns the RPC status and, when the status is `Ok`, the decoded
    /// reply. A deadline expiry returns [`WirecallError::Timeout`] and
    /// leaves the call outstanding on the connection; it does not tear
    /// anything down.
    pub async fn call<CReq, CRep>(
        &self,
        path: &str,
        message: &CReq::Message,
        request_coder: &CReq,
        reply_coder: &CRep,
        timeout: Duration,
    ) -> Result<(Status, Option<CRep::Message>)>
    where
        CReq: Coder,
        CRep: Coder,
    {
        let promise = self.rpc(path, message, request_coder, timeout).await?;
        let response = match promise.get_timeout(timeout).await {
            None => return Err(WirecallError::Timeout),
            Some(result) => result?,
        };

        let status = response.status();
        let reply = if status == Status::Ok {
            Some(response.decode(reply_coder)?)
        } else {
            tracing::debug!(%path, %status, "call failed at the peer");
            None
        };
        Ok((status, reply))
    }

    /// Tear down the connection, faulting any in-flight calls.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    /// The `host:port` this client targets.
    pub fn authority(&self) -> &str {
        &self.authority
    }
}
