//! # Messenger Demo
//!
//! Wires a [`Server`] and a [`Client`] over two in-memory windows and plays
//! a short ping exchange.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=better_messenger=debug cargo run -p messenger-demo
//! cargo run -p messenger-demo -- client.json
//! ```
//!
//! The optional argument is a JSON [`ClientConfig`]; omitted fields keep
//! their defaults.

use anyhow::{Context, Result};
use better_messenger::{
    Client, ClientConfig, ClientError, HandlerError, MemoryWindow, Next, Request, Responder,
    Server, ServerConfig,
};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Load the client configuration from the path given on the command line.
fn load_config() -> Result<ClientConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(ClientConfig::default());
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {path}"))?;
    let config: ClientConfig =
        serde_json::from_str(&raw).with_context(|| format!("invalid config file {path}"))?;
    Ok(config)
}

/// Log every application request, then pass it on.
async fn log_requests(
    request: Request,
    responder: Responder,
    next: Next,
) -> Result<(), HandlerError> {
    info!(
        id = %request.id,
        message_type = %request.message_type,
        origin = %responder.origin(),
        "Request received"
    );
    next.run().await;
    Ok(())
}

/// Answer `n` with `n + 1`.
async fn ping(request: Request, responder: Responder, _next: Next) -> Result<(), HandlerError> {
    let n = request
        .data
        .as_i64()
        .ok_or_else(|| HandlerError::failed(json!({ "error": "expected an integer" })))?;
    responder.resolve(json!(n + 1));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = load_config()?;
    config.validate().context("invalid client configuration")?;

    let app = MemoryWindow::new("https://app.example");
    let frame = MemoryWindow::new("https://frame.example");

    let server = Server::new(frame.clone(), ServerConfig::default())?;
    server.listen_any(log_requests);
    server.listen("ping", ping);

    let client = Client::new(frame.proxy_for(&app), app.clone(), config)?;
    client.connect().await?;
    info!("Client connected");

    for n in [1, 41, 99] {
        let response = client.request("ping", json!(n)).await?;
        info!(sent = n, received = %response.data, "Ping answered");
    }

    match client.request("ping", json!("not a number")).await {
        Err(ClientError::Rejected(response)) => {
            info!(data = %response.data, "Bad ping rejected");
        }
        other => warn!(result = ?other, "Unexpected outcome for bad ping"),
    }

    match client
        .request_with_timeout("unknown", json!(null), Duration::from_millis(200))
        .await
    {
        Err(e) if e.is_timeout() => info!(error = %e, "Unhandled type timed out"),
        other => warn!(result = ?other, "Unexpected outcome for unhandled type"),
    }

    client.close();
    server.close();
    info!(
        delivered_to_app = app.delivered(),
        delivered_to_frame = frame.delivered(),
        "Demo finished"
    );

    Ok(())
}
