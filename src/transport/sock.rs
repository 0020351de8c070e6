//! Socket builders: plain TCP or TLS with ALPN pinned to `h2`.
//!
//! The secure paths advertise exactly one application protocol and fail
//! connection establishment when the peer negotiates anything else. Server
//! acceptor construction validates certificate material before any socket
//! is opened.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector, TlsStream};

use crate::error::{Result, WirecallError};

/// The single application-layer protocol token this framework negotiates.
pub const ALPN_H2: &[u8] = b"h2";

/// TLS material for either side of a connection.
///
/// Client role: `ca` anchors server verification (empty trust store when
/// absent), `cert`/`key` optionally present a client certificate.
/// Server role: `cert` and `key` are mandatory.
#[derive(Default)]
pub struct TlsOptions {
    /// Trust anchors for verifying the peer.
    pub ca: Option<Vec<CertificateDer<'static>>>,
    /// Local certificate chain.
    pub cert: Option<Vec<CertificateDer<'static>>>,
    /// Private key matching `cert`.
    pub key: Option<PrivateKeyDer<'static>>,
}

impl std::fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOptions")
            .field("ca", &self.ca.as_ref().map(Vec::len))
            .field("cert", &self.cert.as_ref().map(Vec::len))
            .field("key", &self.key.is_some())
            .finish()
    }
}

/// Unified byte-stream endpoint: plain TCP or TLS. Implements
/// `AsyncRead` + `AsyncWrite`.
pub enum IoStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for IoStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            IoStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            IoStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for IoStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            IoStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            IoStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            IoStream::Plain(s) => Pin::new(s).poll_flush(cx),
            IoStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            IoStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            IoStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Produces a connected, optionally TLS-wrapped, ALPN-verified endpoint.
pub struct SocketBuilder {
    host: String,
    port: u16,
    tls: Option<TlsOptions>,
}

impl SocketBuilder {
    /// Plain TCP variant.
    pub fn plain(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            tls: None,
        }
    }

    /// TLS variant with the fixed `h2` ALPN token.
    pub fn secure(host: &str, port: u16, tls: TlsOptions) -> Self {
        Self {
            host: host.to_string(),
            port,
            tls: Some(tls),
        }
    }

    /// Connect, optionally handshake TLS, and verify the negotiated
    /// application protocol.
    pub async fn build(&self) -> Result<IoStream> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(WirecallError::Connection)?;
        tcp.set_nodelay(true)?;

        let Some(tls) = &self.tls else {
            return Ok(IoStream::Plain(tcp));
        };

        let config = client_config(tls)?;
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| WirecallError::Configuration(format!("invalid server name: {e}")))?;

        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(WirecallError::Connection)?;

        let negotiated = stream.get_ref().1.alpn_protocol().map(<[u8]>::to_vec);
        if negotiated.as_deref() != Some(ALPN_H2) {
            return Err(negotiation_error(negotiated));
        }

        Ok(IoStream::Tls(Box::new(stream.into())))
    }
}

/// Build the server-side TLS acceptor, advertising only `h2`.
///
/// Fails with a configuration error when certificate or key is absent,
/// before any socket is opened.
pub fn server_tls_acceptor(tls: &TlsOptions) -> Result<TlsAcceptor> {
    let certs = tls
        .cert
        .clone()
        .ok_or_else(|| WirecallError::Configuration("server certificate is required".into()))?;
    let key = tls
        .key
        .as_ref()
        .ok_or_else(|| WirecallError::Configuration("server private key is required".into()))?
        .clone_key();

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![ALPN_H2.to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Verify the ALPN outcome of an accepted server-side handshake.
pub fn verify_server_alpn(
    stream: &tokio_rustls::server::TlsStream<TcpStream>,
) -> Result<()> {
    let negotiated = stream.get_ref().1.alpn_protocol().map(<[u8]>::to_vec);
    if negotiated.as_deref() != Some(ALPN_H2) {
        return Err(negotiation_error(negotiated));
    }
    Ok(())
}

fn negotiation_error(selected: Option<Vec<u8>>) -> WirecallError {
    WirecallError::Negotiation {
        expected: String::from_utf8_lossy(ALPN_H2).into_owned(),
        selected: selected.map(|p| String::from_utf8_lossy(&p).into_owned()),
    }
}

fn client_config(tls: &TlsOptions) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    if let Some(ca) = &tls.ca {
        for cert in ca {
            roots.add(cert.clone())?;
        }
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let mut config = match (&tls.cert, &tls.key) {
        (Some(cert), Some(key)) => {
            builder.with_client_auth_cert(cert.clone(), key.clone_key())?
        }
        _ => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![ALPN_H2.to_vec()];

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptor_requires_certificate() {
        let tls = TlsOptions::default();
        let result = server_tls_acceptor(&tls);
        assert!(matches!(result, Err(WirecallError::Configuration(_))));
    }

    #[test]
    fn test_acceptor_requires_key() {
        let tls = TlsOptions {
            cert: Some(Vec::new()),
            ..TlsOptions::default()
        };
        let result = server_tls_acceptor(&tls);
        assert!(matches!(result, Err(WirecallError::Configuration(_))));
    }

    #[test]
    fn test_client_config_without_material() {
        // Empty trust store is allowed at construction time; verification
        // failures happen at handshake.
        let config = client_config(&TlsOptions::default()).unwrap();
        assert_eq!(config.alpn_protocols, vec![ALPN_H2.to_vec()]);
    }

    #[test]
    fn test_negotiation_error_contents() {
        let err = negotiation_error(Some(b"http/1.1".to_vec()));
        match err {
            WirecallError::Negotiation { expected, selected } => {
                assert_eq!(expected, "h2");
                assert_eq!(selected.as_deref(), Some("http/1.1"));
            }
            other => panic!("expected Negotiation, got {other:?}"),
        }
    }
}
