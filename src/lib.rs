//! # wirecall
//!
//! Minimal unary RPC over HTTP/2 with a gRPC-flavored wire convention.
//!
//! One client [`Connection`] multiplexes many concurrent calls over a single
//! socket; each call is an HTTP/2 stream carrying a gzip-compressed,
//! coder-encoded payload. The RPC outcome travels in the `grpc-status`
//! header while the HTTP status stays 200. Transport is plain TCP or TLS
//! with ALPN pinned to `h2`.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use serde::{Serialize, Deserialize};
//! use wirecall::codec::MsgPackCoder;
//! use wirecall::handler::TypedHandler;
//! use wirecall::{RpcClient, RpcServer, Status};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Search { name: String }
//! #[derive(Serialize, Deserialize, Debug)]
//! struct SearchReply { foos: Vec<(String, u32)> }
//!
//! #[tokio::main]
//! async fn main() -> wirecall::Result<()> {
//!     let handle = RpcServer::builder("127.0.0.1", 0)
//!         .handler(
//!             "foo.service/Search",
//!             TypedHandler::new(
//!                 MsgPackCoder::<Search>::new(),
//!                 MsgPackCoder::<SearchReply>::new(),
//!                 |_headers, search: Search| async move {
//!                     Ok(SearchReply {
//!                         foos: vec![(search.name, 1)],
//!                     })
//!                 },
//!             ),
//!         )
//!         .listen()
//!         .await?;
//!
//!     let client = RpcClient::new("127.0.0.1", handle.local_addr().port());
//!     let (status, reply) = client
//!         .call(
//!             "foo.service/Search",
//!             &Search { name: "foo".into() },
//!             &MsgPackCoder::<Search>::new(),
//!             &MsgPackCoder::<SearchReply>::new(),
//!             Duration::from_secs(5),
//!         )
//!         .await?;
//!     assert_eq!(status, Status::Ok);
//!     println!("{:?}", reply);
//!
//!     client.close().await;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`codec`]: pluggable message encode/decode ([`codec::MsgPackCoder`],
//!   [`codec::FnCoder`])
//! - [`message`]: request/response envelopes and the wire header convention
//! - [`promise`]: single-assignment result cells for asynchronous calls
//! - [`transport`]: socket establishment (TCP / TLS+ALPN) and the client
//!   HTTP/2 session
//! - [`client`] / [`server`]: the typed RPC surfaces
//! - [`handler`]: path-keyed server dispatch

pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod message;
pub mod promise;
pub mod server;
pub mod status;
pub mod transport;

pub use client::RpcClient;
pub use error::{CallFault, Result, WirecallError};
pub use handler::{Handler, HandlerRegistry, TypedHandler};
pub use message::{Request, Response};
pub use promise::Promise;
pub use server::{RpcServer, RpcServerBuilder, ServerHandle};
pub use status::Status;
pub use transport::{CallResult, Connection, SocketBuilder, TlsOptions};
