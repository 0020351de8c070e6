//! End-to-end tests running a real server and client over loopback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use serde::{Deserialize, Serialize};
use wirecall::codec::MsgPackCoder;
use wirecall::handler::TypedHandler;
use wirecall::{RpcClient, RpcServer, ServerHandle, Status, TlsOptions, WirecallError};

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Search {
    name: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Foo {
    name: String,
    id: u32,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SearchReply {
    foos: Vec<Foo>,
}

fn search_handler() -> impl wirecall::Handler {
    TypedHandler::new(
        MsgPackCoder::<Search>::new(),
        MsgPackCoder::<SearchReply>::new(),
        |_headers, _search: Search| async move {
            Ok(SearchReply {
                foos: vec![
                    Foo {
                        name: "Mike".into(),
                        id: 1,
                    },
                    Foo {
                        name: "Bill".into(),
                        id: 2,
                    },
                ],
            })
        },
    )
}

async fn start_search_server() -> ServerHandle {
    RpcServer::builder("127.0.0.1", 0)
        .handler("foo.service/Search", search_handler())
        .listen()
        .await
        .unwrap()
}

/// Self-signed certificate for `localhost`, as server and client views.
fn tls_material() -> (TlsOptions, TlsOptions) {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));

    let server = TlsOptions {
        ca: None,
        cert: Some(vec![cert.clone()]),
        key: Some(key),
    };
    let client = TlsOptions {
        ca: Some(vec![cert]),
        cert: None,
        key: None,
    };
    (server, client)
}

#[tokio::test]
async fn test_search_end_to_end() {
    let handle = start_search_server().await;
    let client = RpcClient::new("127.0.0.1", handle.local_addr().port());

    let (status, reply) = client
        .call(
            "foo.service/Search",
            &Search { name: "foo".into() },
            &MsgPackCoder::<Search>::new(),
            &MsgPackCoder::<SearchReply>::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(status, Status::Ok);
    assert_eq!(
        reply.unwrap(),
        SearchReply {
            foos: vec![
                Foo {
                    name: "Mike".into(),
                    id: 1
                },
                Foo {
                    name: "Bill".into(),
                    id: 2
                },
            ]
        }
    );

    client.close().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_unmatched_path_answers_unimplemented() {
    let handle = start_search_server().await;
    let client = RpcClient::new("127.0.0.1", handle.local_addr().port());

    let (status, reply) = client
        .call(
            "foo.service/NoSuchMethod",
            &Search { name: "foo".into() },
            &MsgPackCoder::<Search>::new(),
            &MsgPackCoder::<SearchReply>::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(status, Status::Unimplemented);
    assert!(reply.is_none());

    // The connection stays healthy for further calls.
    let (status, reply) = client
        .call(
            "foo.service/Search",
            &Search { name: "foo".into() },
            &MsgPackCoder::<Search>::new(),
            &MsgPackCoder::<SearchReply>::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(status, Status::Ok);
    assert!(reply.is_some());

    client.close().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_builder_registry_replaces_earlier_handlers() {
    let mut table = wirecall::HandlerRegistry::new();
    table.register("foo.service/Search", search_handler());

    // `registry()` swaps in the whole table; the handler registered before
    // it is gone, the one inside the table answers.
    let handle = RpcServer::builder("127.0.0.1", 0)
        .handler(
            "calc.service/Double",
            TypedHandler::new(
                MsgPackCoder::<u32>::new(),
                MsgPackCoder::<u32>::new(),
                |_headers, n: u32| async move { Ok(n * 2) },
            ),
        )
        .registry(table)
        .listen()
        .await
        .unwrap();
    let client = RpcClient::new("127.0.0.1", handle.local_addr().port());

    let (status, _) = client
        .call(
            "calc.service/Double",
            &2u32,
            &MsgPackCoder::<u32>::new(),
            &MsgPackCoder::<u32>::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(status, Status::Unimplemented);

    let (status, reply) = client
        .call(
            "foo.service/Search",
            &Search { name: "foo".into() },
            &MsgPackCoder::<Search>::new(),
            &MsgPackCoder::<SearchReply>::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(status, Status::Ok);
    assert!(reply.is_some());

    client.close().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_call_timeout_is_bounded() {
    let handle = RpcServer::builder("127.0.0.1", 0)
        .handler(
            "slow.service/Stall",
            TypedHandler::new(
                MsgPackCoder::<u32>::new(),
                MsgPackCoder::<u32>::new(),
                |_headers, n: u32| async move {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Ok(n)
                },
            ),
        )
        .listen()
        .await
        .unwrap();
    let client = RpcClient::new("127.0.0.1", handle.local_addr().port());

    let start = Instant::now();
    let result = client
        .call(
            "slow.service/Stall",
            &1u32,
            &MsgPackCoder::<u32>::new(),
            &MsgPackCoder::<u32>::new(),
            Duration::from_millis(50),
        )
        .await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(WirecallError::Timeout)));
    assert!(elapsed >= Duration::from_millis(45));
    assert!(elapsed < Duration::from_millis(1000));

    client.close().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_calls_multiplex_one_connection() {
    let handle = RpcServer::builder("127.0.0.1", 0)
        .handler(
            "calc.service/Double",
            TypedHandler::new(
                MsgPackCoder::<u32>::new(),
                MsgPackCoder::<u32>::new(),
                |_headers, n: u32| async move { Ok(n * 2) },
            ),
        )
        .listen()
        .await
        .unwrap();
    let client = Arc::new(RpcClient::new("127.0.0.1", handle.local_addr().port()));

    let mut promises = Vec::new();
    for n in 0..8u32 {
        let promise = client
            .rpc(
                "calc.service/Double",
                &n,
                &MsgPackCoder::<u32>::new(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        promises.push((n, promise));
    }

    let coder = MsgPackCoder::<u32>::new();
    for (n, promise) in promises {
        let response = promise
            .get_timeout(Duration::from_secs(5))
            .await
            .expect("call resolved")
            .expect("stream completed");
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.decode(&coder).unwrap(), n * 2);
    }

    client.close().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_tls_end_to_end() {
    let (server_tls, client_tls) = tls_material();
    let handle = RpcServer::builder("127.0.0.1", 0)
        .handler("foo.service/Search", search_handler())
        .tls(server_tls)
        .listen()
        .await
        .unwrap();
    let client = RpcClient::with_tls("localhost", handle.local_addr().port(), client_tls);

    let (status, reply) = client
        .call(
            "foo.service/Search",
            &Search { name: "foo".into() },
            &MsgPackCoder::<Search>::new(),
            &MsgPackCoder::<SearchReply>::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(reply.unwrap().foos.len(), 2);

    client.close().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_alpn_mismatch_is_fatal_at_connect() {
    // A TLS server that never advertises an application protocol: the
    // handshake succeeds but no ALPN token is selected.
    let (server_tls, client_tls) = tls_material();
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(server_tls.cert.unwrap(), server_tls.key.unwrap())
        .unwrap();
    let acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        if let Ok((tcp, _)) = listener.accept().await {
            let _ = acceptor.accept(tcp).await;
        }
    });

    let client = RpcClient::with_tls("localhost", port, client_tls);
    let result = client
        .call(
            "foo.service/Search",
            &Search { name: "foo".into() },
            &MsgPackCoder::<Search>::new(),
            &MsgPackCoder::<SearchReply>::new(),
            Duration::from_secs(5),
        )
        .await;

    match result {
        Err(WirecallError::Negotiation { expected, selected }) => {
            assert_eq!(expected, "h2");
            assert_eq!(selected, None);
        }
        other => panic!("expected Negotiation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_rejects_client_without_alpn() {
    let (server_tls, client_tls) = tls_material();
    let handle = RpcServer::builder("127.0.0.1", 0)
        .handler("foo.service/Search", search_handler())
        .tls(server_tls)
        .listen()
        .await
        .unwrap();
    let port = handle.local_addr().port();

    // A raw TLS client that never offers an application protocol. The TLS
    // handshake itself succeeds with no token selected.
    let mut roots = rustls::RootCertStore::empty();
    for cert in client_tls.ca.as_ref().unwrap() {
        roots.add(cert.clone()).unwrap();
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
    let tcp = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    let name = rustls::pki_types::ServerName::try_from("localhost".to_string()).unwrap();
    let mut stream = connector.connect(name, tcp).await.unwrap();
    assert!(stream.get_ref().1.alpn_protocol().is_none());

    // The server drops the connection instead of speaking HTTP/2 on it:
    // the next read observes EOF (or a reset), never server frames.
    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("server closed the connection")
        .unwrap_or(0);
    assert_eq!(n, 0);

    // Conforming clients are still served afterwards.
    let client = RpcClient::with_tls("localhost", port, client_tls);
    let (status, reply) = client
        .call(
            "foo.service/Search",
            &Search { name: "foo".into() },
            &MsgPackCoder::<Search>::new(),
            &MsgPackCoder::<SearchReply>::new(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(status, Status::Ok);
    assert!(reply.is_some());

    client.close().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_close_faults_pending_calls() {
    let handle = RpcServer::builder("127.0.0.1", 0)
        .handler(
            "slow.service/Stall",
            TypedHandler::new(
                MsgPackCoder::<u32>::new(),
                MsgPackCoder::<u32>::new(),
                |_headers, n: u32| async move {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(n)
                },
            ),
        )
        .listen()
        .await
        .unwrap();
    let client = RpcClient::new("127.0.0.1", handle.local_addr().port());

    let promise = client
        .rpc(
            "slow.service/Stall",
            &1u32,
            &MsgPackCoder::<u32>::new(),
            Duration::from_secs(10),
        )
        .await
        .unwrap();
    // Let the stream open before tearing down.
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.close().await;

    // The promise resolves with a terminal fault instead of stranding its
    // readers; close() has already returned, so no waiting is involved.
    let result = promise
        .get_timeout(Duration::from_millis(500))
        .await
        .expect("promise resolved at teardown");
    assert!(result.is_err());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_large_payload_round_trip() {
    // Bigger than the default 64 KiB h2 flow-control window in both
    // directions, exercising chunked sends.
    let handle = RpcServer::builder("127.0.0.1", 0)
        .handler(
            "blob.service/Echo",
            TypedHandler::new(
                MsgPackCoder::<Vec<u8>>::new(),
                MsgPackCoder::<Vec<u8>>::new(),
                |_headers, blob: Vec<u8>| async move { Ok(blob) },
            ),
        )
        .listen()
        .await
        .unwrap();
    let client = RpcClient::new("127.0.0.1", handle.local_addr().port());

    // Random-ish bytes so gzip cannot shrink it below the window.
    let blob: Vec<u8> = (0..300_000u32)
        .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
        .collect();
    let (status, reply) = client
        .call(
            "blob.service/Echo",
            &blob,
            &MsgPackCoder::<Vec<u8>>::new(),
            &MsgPackCoder::<Vec<u8>>::new(),
            Duration::from_secs(10),
        )
        .await
        .unwrap();

    assert_eq!(status, Status::Ok);
    assert_eq!(reply.unwrap(), blob);

    client.close().await;
    handle.shutdown().await;
}
