//! Embedding the server and changing endpoints at runtime.
//!
//! Run with: cargo run --example embedded
//! Then: curl localhost:3000/hello/ferris

use std::time::Duration;

use axum::http::Method;
use dynhttp::routing::PathParams;
use dynhttp::{DynHttpServer, Endpoint, ServerConfig, Shutdown};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("dynhttp=debug").init();

    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:3000".to_string();

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = DynHttpServer::new(config)?;
    let registry = server.registry();

    let hello = Endpoint::builder(|params: PathParams| async move {
        format!("Hello, {}!\n", params.get("name").unwrap_or("world"))
    })
    .name("hello")
    .methods([Method::GET])
    .paths(["/hello/{name}"])
    .build();
    registry.add(hello.clone())?;

    let shutdown = Shutdown::new();
    let (_updates_tx, updates_rx) = mpsc::unbounded_channel();
    let running = tokio::spawn(server.run(listener, updates_rx, shutdown.subscribe()));

    // After ten seconds every request falls through to a catch-all.
    tokio::time::sleep(Duration::from_secs(10)).await;
    registry.add(
        Endpoint::builder(|| async { "Nothing to see here\n" })
            .name("fallback")
            .build(),
    )?;
    registry.remove(&hello)?;
    println!("hello removed, catch-all installed");

    tokio::signal::ctrl_c().await?;
    shutdown.trigger();
    running.await??;
    Ok(())
}
