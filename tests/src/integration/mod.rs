//! # Integration Scenarios
//!
//! Every scenario runs a client in an "app" window against a server in a
//! "frame" window, the way an embedding page talks to an embedded one.

pub mod handshake;
pub mod round_trip;

use better_messenger::{
    Client, ClientConfig, HandlerError, MemoryWindow, Next, Request, RequestHandler, Responder,
    Server, ServerBuilder, Transport,
};
use serde_json::json;
use std::sync::Arc;

/// Origin of the embedding window.
pub const APP_ORIGIN: &str = "https://app.example";

/// Origin of the embedded window.
pub const FRAME_ORIGIN: &str = "https://frame.example";

/// A client and a server wired over two windows.
pub struct Link {
    pub app: Arc<MemoryWindow>,
    pub frame: Arc<MemoryWindow>,
    pub server: Server,
    pub client: Client,
}

impl Link {
    pub fn new() -> Self {
        Self::with(ClientConfig::default(), Server::builder)
    }

    pub fn with_client_config(config: ClientConfig) -> Self {
        Self::with(config, Server::builder)
    }

    /// Build both ends; `server` customizes the server builder.
    pub fn with(
        config: ClientConfig,
        server: impl FnOnce(Arc<dyn Transport>) -> ServerBuilder,
    ) -> Self {
        let app = MemoryWindow::new(APP_ORIGIN);
        let frame = MemoryWindow::new(FRAME_ORIGIN);

        let endpoint: Arc<dyn Transport> = frame.clone();
        let server = server(endpoint).build().expect("server");
        let client = client_for(&app, &frame, config);

        Self {
            app,
            frame,
            server,
            client,
        }
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

/// Client in `app` talking to whatever listens on `frame`.
pub fn client_for(
    app: &Arc<MemoryWindow>,
    frame: &Arc<MemoryWindow>,
    config: ClientConfig,
) -> Client {
    Client::new(frame.proxy_for(app), app.clone(), config).expect("client")
}

/// Handler answering `n` with `n + 1`.
pub fn plus_one() -> impl RequestHandler {
    |request: Request, responder: Responder, _next: Next| async move {
        let n = request
            .data
            .as_i64()
            .ok_or_else(|| HandlerError::failed(json!("expected an integer")))?;
        responder.resolve(json!(n + 1));
        Ok::<(), HandlerError>(())
    }
}
