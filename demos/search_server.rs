//! Demo server: serves `foo.service/Search` on 127.0.0.1:8080.
//!
//! Run with `cargo run --example search_server`, then run the matching
//! `search_client` demo.

use serde::{Deserialize, Serialize};
use wirecall::codec::MsgPackCoder;
use wirecall::handler::TypedHandler;
use wirecall::RpcServer;

#[derive(Serialize, Deserialize, Debug)]
struct Search {
    name: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct Foo {
    name: String,
    id: u32,
}

#[derive(Serialize, Deserialize, Debug)]
struct SearchReply {
    foos: Vec<Foo>,
}

#[tokio::main]
async fn main() -> wirecall::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wirecall=debug,search_server=info".into()),
        )
        .init();

    let handle = RpcServer::builder("127.0.0.1", 8080)
        .handler(
            "foo.service/Search",
            TypedHandler::new(
                MsgPackCoder::<Search>::new(),
                MsgPackCoder::<SearchReply>::new(),
                |_headers, search: Search| async move {
                    tracing::info!(name = %search.name, "search request");
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
            ),
        )
        .listen()
        .await?;

    tracing::info!("listening on {}", handle.local_addr());
    handle.wait().await;
    Ok(())
}
