//! Demo client: one `foo.service/Search` call against the demo server.
//!
//! Start `cargo run --example search_server` first, then
//! `cargo run --example search_client`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wirecall::codec::MsgPackCoder;
use wirecall::RpcClient;

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
                .unwrap_or_else(|_| "wirecall=debug,search_client=info".into()),
        )
        .init();

    let client = RpcClient::new("127.0.0.1", 8080);
    let (status, reply) = client
        .call(
            "foo.service/Search",
            &Search { name: "foo".into() },
            &MsgPackCoder::<Search>::new(),
            &MsgPackCoder::<SearchReply>::new(),
            Duration::from_secs(5),
        )
        .await?;

    tracing::info!(%status, ?reply, "search finished");
    client.close().await;
    Ok(())
}
