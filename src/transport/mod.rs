//! Transport layer: socket establishment and HTTP/2 session plumbing.
//!
//! [`sock`] produces connected byte streams (plain TCP or TLS with the `h2`
//! ALPN token pinned); [`conn`] drives the client-side HTTP/2 session and
//! multiplexes unary calls over it.

pub mod conn;
pub mod sock;

pub use conn::{CallResult, Connection};
pub use sock::{IoStream, SocketBuilder, TlsOptions, ALPN_H2};

use std::future::poll_fn;

use bytes::Bytes;

use crate::error::CallFault;

/// Write a full body to an h2 send stream, then end it.
///
/// Respects flow control: reserves capacity and writes in whatever chunks
/// the peer's window allows, so bodies larger than the initial window do not
/// stall or error.
pub(crate) async fn send_body(
    stream: &mut h2::SendStream<Bytes>,
    mut payload: Bytes,
) -> std::result::Result<(), CallFault> {
    if payload.is_empty() {
        return stream
            .send_data(payload, true)
            .map_err(conn::stream_fault);
    }

    while !payload.is_empty() {
        stream.reserve_capacity(payload.len());
        let granted = poll_fn(|cx| stream.poll_capacity(cx))
            .await
            .ok_or(CallFault::ConnectionClosed)?
            .map_err(conn::stream_fault)?;
        if granted == 0 {
            continue;
        }

        let chunk = payload.split_to(granted.min(payload.len()));
        let end = payload.is_empty();
        stream.send_data(chunk, end).map_err(conn::stream_fault)?;
    }

    Ok(())
}
