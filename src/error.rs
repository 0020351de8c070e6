//! Error types for wirecall.

use thiserror::Error;

/// Main error type for all wirecall operations.
#[derive(Debug, Error)]
pub enum WirecallError {
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket connect/accept failure (refused, reset, TLS handshake).
    #[error("connection error: {0}")]
    Connection(#[source] std::io::Error),

    /// ALPN negotiated something other than the required protocol token.
    #[error("ALPN negotiation failed: expected {expected:?}, peer selected {selected:?}")]
    Negotiation {
        expected: String,
        selected: Option<String>,
    },

    /// Secure mode requested without the required certificate/key material,
    /// or other invalid configuration. Surfaced before any socket is opened.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed HTTP/2 framing or stream-level protocol violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] h2::Error),

    /// TLS configuration or handshake error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid header or URI construction.
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// Coder or decompression failure on a received payload.
    #[error("decode error: {0}")]
    Decode(String),

    /// Coder failure while encoding an outgoing payload.
    #[error("encode error: {0}")]
    Encode(String),

    /// Caller-specified deadline elapsed before the call resolved.
    /// The in-flight call is left outstanding.
    #[error("deadline elapsed before the call resolved")]
    Timeout,

    /// The connection was closed before or during the call.
    #[error("connection closed")]
    ConnectionClosed,

    /// A call-level fault delivered through the promise.
    #[error(transparent)]
    Call(#[from] CallFault),
}

/// Terminal call-level failure delivered through a [`Promise`](crate::Promise).
///
/// Kept separate from [`WirecallError`] because promise values are observable
/// by multiple readers and must be cloneable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallFault {
    /// The connection was torn down with the call still pending.
    #[error("connection closed before the call completed")]
    ConnectionClosed,

    /// The stream failed (reset, GOAWAY, transport error).
    #[error("stream failed: {0}")]
    Stream(String),
}

/// Result type alias using WirecallError.
pub type Result<T> = std::result::Result<T, WirecallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_display() {
        let err = WirecallError::Negotiation {
            expected: "h2".to_string(),
            selected: Some("http/1.1".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("h2"));
        assert!(msg.contains("http/1.1"));
    }

    #[test]
    fn test_fault_is_cloneable() {
        let fault = CallFault::Stream("reset".to_string());
        assert_eq!(fault.clone(), fault);
    }

    #[test]
    fn test_fault_converts_to_error() {
        let err: WirecallError = CallFault::ConnectionClosed.into();
        assert_eq!(
            err.to_string(),
            "connection closed before the call completed"
        );
    }
}
