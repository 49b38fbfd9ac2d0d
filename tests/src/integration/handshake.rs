//! # Handshake Scenarios
//!
//! A client confirms the server is reachable before its first request,
//! retrying with linear back-off while the other side comes up.

#[cfg(test)]
mod tests {
    use super::super::{client_for, plus_one, Link, APP_ORIGIN, FRAME_ORIGIN};
    use better_messenger::{
        ClientConfig, ClientError, ConnectionState, HandlerError, HandshakeConfig, MemoryWindow,
        Next, Request, Responder, Server, ServerConfig, HANDSHAKE_TYPE,
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    // =============================================================================
    // LIVE SERVER
    // =============================================================================

    #[tokio::test]
    async fn test_connect_against_live_server() {
        let link = Link::new();
        link.client.connect().await.unwrap();
        assert_eq!(link.client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_first_request_connects_implicitly() {
        let link = Link::new();
        link.server.listen("ping", plus_one());

        assert_eq!(link.client.state(), ConnectionState::NotConnected);
        link.client.request("ping", json!(1)).await.unwrap();
        assert_eq!(link.client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_wildcard_middleware_never_sees_handshake() {
        let link = Link::new();
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let record = Arc::clone(&seen);
        link.server.listen_any(
            move |request: Request, responder: Responder, _next: Next| {
                let record = Arc::clone(&record);
                async move {
                    record.lock().push(request.message_type.clone());
                    responder.reject(json!("blocked"));
                    Ok::<(), HandlerError>(())
                }
            },
        );

        link.client.connect().await.unwrap();
        let err = link.client.request("ping", json!(1)).await.unwrap_err();

        assert!(err.response().is_some());
        assert_eq!(*seen.lock(), vec!["ping".to_string()]);
        assert!(!seen.lock().iter().any(|t| t == HANDSHAKE_TYPE));
    }

    // =============================================================================
    // RETRY
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_connects_once_server_comes_up() {
        let app = MemoryWindow::new(APP_ORIGIN);
        let frame = MemoryWindow::new(FRAME_ORIGIN);
        let client = client_for(&app, &frame, ClientConfig::default());

        // Attempts go out at 0, 600 and 1500ms; the server appears at 1000ms.
        let late_frame = Arc::clone(&frame);
        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_000)).await;
            Server::new(late_frame, ServerConfig::default()).unwrap()
        });

        let start = Instant::now();
        client.connect().await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(1_500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1_600), "{elapsed:?}");
        assert_eq!(client.state(), ConnectionState::Connected);

        let server = server.await.unwrap();
        server.listen("ping", plus_one());
        assert_eq!(client.request("ping", json!(1)).await.unwrap().data, json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_attempt_and_allows_retry() {
        let link = Link::new();
        link.server.close();

        let start = Instant::now();
        let err = link.client.connect().await.unwrap_err();

        let ClientError::HandshakeExhausted { attempts, last } = err else {
            panic!("expected exhaustion, got {err:?}");
        };
        assert_eq!(attempts, 5);
        assert!(last.is_timeout());
        // 5 x 300ms attempts plus 300 + 600 + 900 + 1200ms of back-off.
        assert!(start.elapsed() >= Duration::from_millis(4_500));
        assert_eq!(link.client.state(), ConnectionState::NotConnected);
        assert_eq!(link.frame.delivered(), 5);

        link.server.open();
        link.client.connect().await.unwrap();
        assert_eq!(link.client.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_retry_policy() {
        let mut config = ClientConfig::default();
        config.handshake = HandshakeConfig {
            attempts: 2,
            attempt_timeout: Duration::from_millis(100),
            interval: Duration::from_millis(50),
        };
        let link = Link::with_client_config(config);
        link.server.close();

        let start = Instant::now();
        let err = link.client.request("ping", json!(1)).await.unwrap_err();

        assert!(matches!(
            err,
            ClientError::HandshakeExhausted { attempts: 2, .. }
        ));
        // 100ms + 50ms back-off + 100ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_handshake() {
        let link = Link::new();
        link.server.listen("ping", plus_one());

        let (a, b, c) = tokio::join!(
            link.client.request("ping", json!(1)),
            link.client.request("ping", json!(2)),
            link.client.request("ping", json!(3)),
        );

        assert_eq!(a.unwrap().data, json!(2));
        assert_eq!(b.unwrap().data, json!(3));
        assert_eq!(c.unwrap().data, json!(4));
        // One handshake plus three requests reached the frame.
        assert_eq!(link.frame.delivered(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_handshake_rejects_waiters() {
        let link = Link::new();
        link.server.close();

        let waiter = tokio::spawn({
            let client = link.client.clone();
            async move { client.connect().await }
        });
        tokio::time::sleep(Duration::from_millis(700)).await;
        link.client.close();

        assert_eq!(waiter.await.unwrap(), Err(ClientError::Closed));
        assert_eq!(link.client.state(), ConnectionState::Closed);
    }
}
