//! Server-side request dispatch.
//!
//! A [`Handler`] services one call path (`service/Method`). The
//! [`HandlerRegistry`] maps paths to handlers; a path with no registered
//! handler resolves to [`Status::Unimplemented`] at the server, never to a
//! reset stream or a crash.
//!
//! [`TypedHandler`] is the usual entry point: it pairs request and reply
//! coders with an async function so application code works with typed
//! messages, not wire bytes.
//!
//! # Example
//!
//! ```
//! use wirecall::codec::MsgPackCoder;
//! use wirecall::handler::{HandlerRegistry, TypedHandler};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(
//!     "calc.service/Double",
//!     TypedHandler::new(
//!         MsgPackCoder::<u32>::new(),
//!         MsgPackCoder::<u32>::new(),
//!         |_headers, n| async move { Ok(n * 2) },
//!     ),
//! );
//! assert!(registry.get("calc.service/Double").is_some());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;

use crate::codec::Coder;
use crate::status::Status;

/// Boxed future alias used throughout the dispatch path.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A unary request handler bound to one call path.
///
/// Receives the request headers and the decompressed payload, and produces
/// the RPC status plus the encoded (not yet compressed) reply bytes.
/// Failures are expressed as non-`Ok` statuses; a handler never tears down
/// the connection.
pub trait Handler: Send + Sync {
    fn call(&self, headers: HeaderMap, payload: Bytes) -> BoxFuture<'static, (Status, Vec<u8>)>;
}

/// Handler adapter pairing coders with an async function.
///
/// Decode failures on the inbound payload map to
/// [`Status::InvalidArgument`]; encode failures on the reply map to
/// [`Status::Internal`]. The function itself reports failure by returning a
/// `Status`.
pub struct TypedHandler<CReq, CRep, F> {
    request_coder: CReq,
    reply_coder: CRep,
    func: F,
}

impl<CReq, CRep, F> TypedHandler<CReq, CRep, F> {
    pub fn new(request_coder: CReq, reply_coder: CRep, func: F) -> Self {
        Self {
            request_coder,
            reply_coder,
            func,
        }
    }
}

impl<CReq, CRep, F, Fut> Handler for TypedHandler<CReq, CRep, F>
where
    CReq: Coder + 'static,
    CRep: Coder + Clone + Send + 'static,
    CReq::Message: Send,
    CRep::Message: Send,
    F: Fn(HeaderMap, CReq::Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<CRep::Message, Status>> + Send + 'static,
{
    fn call(&self, headers: HeaderMap, payload: Bytes) -> BoxFuture<'static, (Status, Vec<u8>)> {
        let request = match self.request_coder.decode(&payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode request payload");
                return Box::pin(async { (Status::InvalidArgument, Vec::new()) });
            }
        };

        let reply = (self.func)(headers, request);
        let reply_coder = self.reply_coder.clone();
        Box::pin(async move {
            match reply.await {
                Ok(reply) => match reply_coder.encode(&reply) {
                    Ok(bytes) => (Status::Ok, bytes),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode reply");
                        (Status::Internal, Vec::new())
                    }
                },
                Err(status) => (status, Vec::new()),
            }
        })
    }
}

/// Path-keyed handler table.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a `service/Method` path.
    ///
    /// Leading slashes are normalized away so registration and dispatch
    /// agree on the key. Re-registering a path replaces the old handler.
    pub fn register<H>(&mut self, path: &str, handler: H)
    where
        H: Handler + 'static,
    {
        self.handlers
            .insert(path.trim_start_matches('/').to_string(), Arc::new(handler));
    }

    /// Look up the handler for a path.
    pub fn get(&self, path: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(path.trim_start_matches('/')).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }
}
