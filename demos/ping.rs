//! Ping a service over the in-memory transport.
//!
//! Run with `RUST_LOG=rpc_envelope=debug cargo run --example ping` to watch
//! the dispatcher attach trace contexts and correlate the reply.

use std::sync::Arc;

use rpc_envelope::{
    // ---
    create_memory_transport,
    current_trace,
    trace_scope,
    Result,
    RpcClient,
    RpcConfig,
    RpcServer,
    TraceContext,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Serialize, Deserialize)]
struct Ping {
    seq: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Pong {
    seq: u32,
    trace_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = RpcServer::with_transport(create_memory_transport("pinger").await?, "pinger");
    let (notes_tx, mut notes_rx) = mpsc::unbounded_channel::<String>();

    server.register("ping", |req: Ping| async move {
        // ---
        let trace_id = current_trace().map(|ctx| ctx.trace_id().to_string());
        Ok(Pong { seq: req.seq, trace_id })
    });
    server.register("note", move |text: String| {
        let notes_tx = notes_tx.clone();
        async move {
            notes_tx.send(text).ok();
            Ok(())
        }
    });

    let handle = server.spawn().await?;

    let transport = create_memory_transport("ping-client").await?;
    let config = RpcConfig::new("ping-client");
    let client = RpcClient::with_transport(transport, "pinger", config).await?;

    let root = Arc::new(TraceContext::root().with_sampled(Some(true)));
    println!("root trace {}", root.trace_id());

    let pong: Pong = trace_scope(root.clone(), client.call("ping", Ping { seq: 1 })).await?;
    println!("pong seq={} trace={:?}", pong.seq, pong.trace_id);

    client.send_oneway("note", "ping done").await?;
    if let Some(note) = notes_rx.recv().await {
        println!("server got note: {note}");
    }

    server.shutdown().await?;
    handle.await.ok();
    Ok(())
}
