//! Request/Response envelopes and the wire header convention.
//!
//! A [`Request`] is immutable once constructed: call path, target authority,
//! timeout budget, and the encoded-then-compressed payload. It produces the
//! deterministic header set of the wire convention. A [`Response`] is built
//! only after its stream reaches terminal state, from the accumulated headers
//! and body bytes.
//!
//! Bodies travel gzip-compressed (`grpc-encoding: gzip`); the RPC-level
//! outcome travels in the `grpc-status` header while the HTTP `:status`
//! stays 200 even for failed calls.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, Method, Uri};

use crate::codec::Coder;
use crate::error::{Result, WirecallError};
use crate::status::Status;

/// Content type for coder-encoded bodies.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc+proto";
/// Header carrying the body compression scheme.
pub const GRPC_ENCODING: &str = "grpc-encoding";
/// Header carrying the RPC-level status code on responses.
pub const GRPC_STATUS: &str = "grpc-status";
/// Header carrying the caller's timeout budget in milliseconds.
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

const AGENT: &str = concat!("wirecall/", env!("CARGO_PKG_VERSION"));

/// Gzip-compress a payload.
pub fn compress(data: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2 + 16),
        Compression::default(),
    );
    encoder.write_all(data)?;
    Ok(Bytes::from(encoder.finish()?))
}

/// Gzip-decompress a received payload.
///
/// A malformed stream is a decode-class failure, not an I/O failure.
pub fn decompress(data: &[u8]) -> Result<Bytes> {
    let mut out = Vec::with_capacity(data.len() * 2 + 16);
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| WirecallError::Decode(format!("gzip: {e}")))?;
    Ok(Bytes::from(out))
}

/// An outbound unary call, immutable once constructed.
#[derive(Debug)]
pub struct Request {
    authority: String,
    path: String,
    timeout: Duration,
    payload: Bytes,
}

impl Request {
    /// Build a request from already-encoded message bytes.
    ///
    /// Compresses the payload eagerly; construction failures surface here,
    /// before any stream exists.
    pub fn new(authority: &str, path: &str, encoded: &[u8], timeout: Duration) -> Result<Self> {
        Ok(Self {
            authority: authority.to_string(),
            path: path.trim_start_matches('/').to_string(),
            timeout,
            payload: compress(encoded)?,
        })
    }

    /// The `service/Method` call path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The compressed body.
    pub fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    /// Build the HTTP/2 request head with the fixed header set.
    pub fn to_http(&self) -> Result<http::Request<()>> {
        let uri = Uri::builder()
            .scheme("http")
            .authority(self.authority.as_str())
            .path_and_query(format!("/{}", self.path))
            .build()?;

        let request = http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(GRPC_TIMEOUT, format!("{}m", self.timeout.as_millis()))
            .header(CONTENT_TYPE, GRPC_CONTENT_TYPE)
            .header(USER_AGENT, AGENT)
            .header(GRPC_ENCODING, "gzip")
            .body(())?;

        Ok(request)
    }
}

/// A completed call's reply: headers plus the compressed payload.
///
/// Constructed only once the stream reaches terminal state. Cloneable so
/// every reader of a promise observes the same value.
#[derive(Debug, Clone)]
pub struct Response {
    http_status: u16,
    headers: HeaderMap,
    payload: Bytes,
}

impl Response {
    /// Assemble a response from captured headers and accumulated body bytes.
    ///
    /// Trailers, when present, are merged into the header map with
    /// last-write-wins semantics.
    pub fn new(
        http_status: u16,
        mut headers: HeaderMap,
        trailers: Option<HeaderMap>,
        payload: Bytes,
    ) -> Self {
        if let Some(trailers) = trailers {
            for (name, value) in trailers.iter() {
                headers.insert(name, value.clone());
            }
        }
        Self {
            http_status,
            headers,
            payload,
        }
    }

    /// Transport-level HTTP status (200 even for failed calls).
    pub fn http_status(&self) -> u16 {
        self.http_status
    }

    /// The RPC-level status from the `grpc-status` header.
    pub fn status(&self) -> Status {
        Status::from_headers(&self.headers)
    }

    /// All response headers (initial headers merged with trailers).
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The compressed body as received.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Decompress and decode the body with the given coder.
    pub fn decode<C: Coder>(&self, coder: &C) -> Result<C::Message> {
        let raw = decompress(&self.payload)?;
        coder.decode(&raw)
    }
}
