//! Client-side connection: one socket, one HTTP/2 session, many calls.
//!
//! A [`Connection`] connects lazily on the first call. Calls are handed to a
//! single command task over an mpsc channel, which opens streams strictly in
//! submission order; the h2 connection driver runs on its own task and owns
//! all socket I/O. Each in-flight call is tracked in a pending registry so a
//! teardown can resolve every outstanding promise with a connection-closed
//! fault instead of leaving readers parked forever.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use h2::client::SendRequest;
use h2::RecvStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{CallFault, Result, WirecallError};
use crate::message::{Request, Response};
use crate::promise::Promise;
use crate::transport::sock::SocketBuilder;

/// Outcome of one call, delivered through its promise.
///
/// `Ok` means the stream completed and a [`Response`] was assembled, even if
/// the RPC-level status inside it is a failure. `Err` means the stream never
/// reached terminal state.
pub type CallResult = std::result::Result<Response, CallFault>;

/// Command-channel depth; submissions beyond this apply backpressure.
const COMMAND_QUEUE_DEPTH: usize = 64;

struct Command {
    id: u64,
    request: Request,
    promise: Promise<CallResult>,
}

/// Registry of in-flight calls, shared between the call paths and teardown.
#[derive(Default)]
pub(crate) struct PendingCalls {
    next: AtomicU64,
    calls: StdMutex<HashMap<u64, Promise<CallResult>>>,
}

impl PendingCalls {
    fn insert(&self, promise: Promise<CallResult>) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, promise);
        id
    }

    fn remove(&self, id: u64) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    /// Resolve every outstanding promise with `fault`. Promises are
    /// set-once, so a call that resolves concurrently keeps its real result.
    fn fail_all(&self, fault: CallFault) {
        let drained: Vec<_> = self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (_, promise) in drained {
            promise.set(Err(fault.clone()));
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

enum ConnState {
    Idle,
    Open {
        cmd_tx: mpsc::Sender<Command>,
        command_task: JoinHandle<()>,
        driver_task: JoinHandle<()>,
    },
    Closed,
}

/// A lazily-connected HTTP/2 client connection multiplexing unary calls.
pub struct Connection {
    builder: SocketBuilder,
    state: Mutex<ConnState>,
    pending: Arc<PendingCalls>,
}

impl Connection {
    /// Wrap a socket builder; no I/O happens until the first call.
    pub fn new(builder: SocketBuilder) -> Self {
        Self {
            builder,
            state: Mutex::new(ConnState::Idle),
            pending: Arc::new(PendingCalls::default()),
        }
    }

    /// Submit a call and return its promise.
    ///
    /// Connects on first use. Connection establishment failures (refused,
    /// TLS, ALPN) surface synchronously here; stream-level failures after
    /// submission resolve the promise with a [`CallFault`].
    pub async fn call(&self, request: Request) -> Result<Promise<CallResult>> {
        let mut state = self.state.lock().await;
        let cmd_tx = loop {
            match &*state {
                ConnState::Open { cmd_tx, .. } => break cmd_tx.clone(),
                ConnState::Closed => return Err(WirecallError::ConnectionClosed),
                ConnState::Idle => *state = self.open().await?,
            }
        };
        drop(state);

        let promise = Promise::new();
        let id = self.pending.insert(promise.clone());
        let command = Command {
            id,
            request,
            promise: promise.clone(),
        };
        if cmd_tx.send(command).await.is_err() {
            // Command task gone: the session died between open and submit.
            self.pending.remove(id);
            promise.set(Err(CallFault::ConnectionClosed));
        }

        Ok(promise)
    }

    async fn open(&self) -> Result<ConnState> {
        let io = self.builder.build().await?;
        let (send_request, h2_conn) = h2::client::handshake(io).await?;

        let pending = Arc::clone(&self.pending);
        let driver_task = tokio::spawn(async move {
            if let Err(e) = h2_conn.await {
                tracing::debug!(error = %e, "connection driver exited with error");
            }
            pending.fail_all(CallFault::ConnectionClosed);
        });

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let pending = Arc::clone(&self.pending);
        let command_task = tokio::spawn(command_loop(send_request, cmd_rx, pending));

        tracing::debug!("connection established");
        Ok(ConnState::Open {
            cmd_tx,
            command_task,
            driver_task,
        })
    }

    /// Tear the connection down.
    ///
    /// Every call still pending resolves with
    /// [`CallFault::ConnectionClosed`]; waiters are woken, never stranded.
    /// Idempotent, and a closed connection stays closed.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, ConnState::Closed);
        drop(state);

        if let ConnState::Open {
            cmd_tx,
            command_task,
            driver_task,
        } = previous
        {
            // Kill the driver first: dropping the h2 connection errors any
            // pending ready()/response futures, so the command task cannot
            // wedge waiting on a dead peer.
            driver_task.abort();
            let _ = driver_task.await;
            drop(cmd_tx);
            let _ = command_task.await;
        }
        self.pending.fail_all(CallFault::ConnectionClosed);
    }

    /// Whether `close` has been called.
    pub async fn is_closed(&self) -> bool {
        matches!(*self.state.lock().await, ConnState::Closed)
    }
}

/// Drains the command queue, opening streams strictly in submission order.
async fn command_loop(
    mut send_request: SendRequest<Bytes>,
    mut cmd_rx: mpsc::Receiver<Command>,
    pending: Arc<PendingCalls>,
) {
    while let Some(command) = cmd_rx.recv().await {
        let Command {
            id,
            request,
            promise,
        } = command;

        // ready() serializes stream opens against h2's concurrency limit.
        send_request = match send_request.ready().await {
            Ok(sr) => sr,
            Err(e) => {
                tracing::debug!(error = %e, "session lost while waiting for stream credit");
                pending.remove(id);
                promise.set(Err(CallFault::ConnectionClosed));
                break;
            }
        };

        let head = match request.to_http() {
            Ok(head) => head,
            Err(e) => {
                pending.remove(id);
                promise.set(Err(CallFault::Stream(e.to_string())));
                continue;
            }
        };

        match send_request.send_request(head, false) {
            Ok((response, stream)) => {
                let pending = Arc::clone(&pending);
                tokio::spawn(async move {
                    let result = drive_call(response, stream, request.payload()).await;
                    pending.remove(id);
                    promise.set(result);
                });
            }
            Err(e) => {
                pending.remove(id);
                promise.set(Err(CallFault::Stream(e.to_string())));
            }
        }
    }

    // Channel closed by teardown: fail anything still queued.
    while let Ok(command) = cmd_rx.try_recv() {
        pending.remove(command.id);
        command.promise.set(Err(CallFault::ConnectionClosed));
    }
}

/// Run one stream to terminal state and assemble the response.
async fn drive_call(
    response: h2::client::ResponseFuture,
    mut stream: h2::SendStream<Bytes>,
    payload: Bytes,
) -> CallResult {
    super::send_body(&mut stream, payload).await?;

    let response = response.await.map_err(stream_fault)?;
    let http_status = response.status().as_u16();
    let (parts, body) = response.into_parts();

    let (payload, trailers) = read_body(body).await?;
    Ok(Response::new(http_status, parts.headers, trailers, payload))
}

/// Accumulate a stream's body chunks, releasing flow-control credit as they
/// arrive, then collect trailers.
pub(crate) async fn read_body(
    mut body: RecvStream,
) -> std::result::Result<(Bytes, Option<http::HeaderMap>), CallFault> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(stream_fault)?;
        buf.extend_from_slice(&chunk);
        let _ = body.flow_control().release_capacity(chunk.len());
    }
    let trailers = body.trailers().await.map_err(stream_fault)?;
    Ok((Bytes::from(buf), trailers))
}

pub(crate) fn stream_fault(e: h2::Error) -> CallFault {
    CallFault::Stream(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request() -> Request {
        Request::new("localhost:1", "svc/Method", b"x", Duration::from_millis(10)).unwrap()
    }

    #[tokio::test]
    async fn test_connect_refused_surfaces_synchronously() {
        // Bind then drop to get a port that actively refuses.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let conn = Connection::new(SocketBuilder::plain("127.0.0.1", port));
        let result = conn.call(request()).await;
        assert!(matches!(result, Err(WirecallError::Connection(_))));
    }

    #[tokio::test]
    async fn test_call_after_close_is_rejected() {
        let conn = Connection::new(SocketBuilder::plain("127.0.0.1", 1));
        conn.close().await;
        assert!(conn.is_closed().await);

        let result = conn.call(request()).await;
        assert!(matches!(result, Err(WirecallError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let conn = Connection::new(SocketBuilder::plain("127.0.0.1", 1));
        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed().await);
    }

    #[tokio::test]
    async fn test_fail_all_resolves_pending() {
        let pending = PendingCalls::default();
        let first: Promise<CallResult> = Promise::new();
        let second: Promise<CallResult> = Promise::new();
        pending.insert(first.clone());
        pending.insert(second.clone());

        pending.fail_all(CallFault::ConnectionClosed);
        assert_eq!(pending.len(), 0);
        assert!(matches!(first.get().await, Err(CallFault::ConnectionClosed)));
        assert!(matches!(second.get().await, Err(CallFault::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_fail_all_does_not_clobber_resolved() {
        let pending = PendingCalls::default();
        let promise: Promise<CallResult> = Promise::new();
        pending.insert(promise.clone());

        promise.set(Err(CallFault::Stream("reset".into())));
        pending.fail_all(CallFault::ConnectionClosed);
        assert!(matches!(
            promise.get().await,
            Err(CallFault::Stream(msg)) if msg == "reset"
        ));
    }
}
