//! # Round-Trip Scenarios
//!
//! Requests resolve with the response carrying their own id, regardless of
//! the order responses come back in.

#[cfg(test)]
mod tests {
    use super::super::{plus_one, Link};
    use async_trait::async_trait;
    use better_messenger::{
        ClientConfig, ClientError, HandlerError, InterceptorError, Next, Request, RequestHandler,
        Responder, Status,
    };
    use futures::future::join_all;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    /// Stateful handler: counts calls and answers with the running total.
    #[derive(Default)]
    struct Counter {
        total: AtomicU64,
    }

    #[async_trait]
    impl RequestHandler for Counter {
        async fn handle(
            &self,
            request: Request,
            responder: Responder,
            _next: Next,
        ) -> Result<(), HandlerError> {
            let by = request.data.as_u64().unwrap_or(1);
            let total = self.total.fetch_add(by, Ordering::SeqCst) + by;
            responder.resolve(json!(total));
            Ok(())
        }
    }

    /// Answers after sleeping for `data` milliseconds.
    fn delayed_echo() -> impl RequestHandler {
        |request: Request, responder: Responder, _next: Next| async move {
            let ms = request.data.as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            responder.resolve(request.data.clone());
            Ok::<(), HandlerError>(())
        }
    }

    // =============================================================================
    // BASIC EXCHANGE
    // =============================================================================

    #[tokio::test]
    async fn test_ping_round_trip() {
        let link = Link::new();
        link.server.listen("ping", plus_one());

        let response = link.client.request("ping", json!(42)).await.unwrap();

        assert_eq!(response.status, Status::Success);
        assert_eq!(response.data, json!(43));
        assert_eq!(response.message_type, "ping");
        assert_eq!(link.client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_status_rejects_with_response() {
        let link = Link::new();
        link.server.listen("ping", plus_one());

        let err = link.client.request("ping", json!("x")).await.unwrap_err();

        let response = err.response().expect("failure response");
        assert_eq!(response.status, Status::Failure);
        assert_eq!(response.data, json!("expected an integer"));
        assert_eq!(link.client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_struct_handler_keeps_state() {
        let link = Link::new();
        link.server.listen("add", Counter::default());

        let first = link.client.request("add", json!(2)).await.unwrap();
        let second = link.client.request("add", json!(5)).await.unwrap();

        assert_eq!(first.data, json!(2));
        assert_eq!(second.data, json!(7));
    }

    // =============================================================================
    // CORRELATION
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_responses_correlate_by_id() {
        let link = Link::new();
        link.server.listen("echo", delayed_echo());
        link.client.connect().await.unwrap();

        let finished: Arc<Mutex<Vec<u64>>> = Arc::default();
        let calls = [300u64, 100, 200].map(|ms| {
            let client = link.client.clone();
            let finished = Arc::clone(&finished);
            async move {
                let response = client.request("echo", json!(ms)).await.unwrap();
                finished.lock().push(ms);
                response.data
            }
        });

        let results = join_all(calls).await;

        // Each caller got its own answer; completion followed the delays.
        assert_eq!(results, vec![json!(300), json!(100), json!(200)]);
        assert_eq!(*finished.lock(), vec![100, 200, 300]);
        assert_eq!(link.client.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhandled_type_times_out_after_window() {
        let config = ClientConfig::default().with_timeout(Duration::from_millis(800));
        let link = Link::with_client_config(config);
        link.client.connect().await.unwrap();

        let start = tokio::time::Instant::now();
        let err = link.client.request("nobody", Value::Null).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(start.elapsed() >= Duration::from_millis(800));
        assert_eq!(link.client.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_disturb_other_requests() {
        let link = Link::new();
        link.server.listen("echo", delayed_echo());
        link.client.connect().await.unwrap();

        let (slow, fast) = tokio::join!(
            link.client
                .request_with_timeout("echo", json!(1_000), Duration::from_millis(100)),
            link.client.request("echo", json!(50)),
        );

        assert!(slow.unwrap_err().is_timeout());
        assert_eq!(fast.unwrap().data, json!(50));

        // The late answer to the timed-out request is dropped quietly.
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(link.client.stats().discarded.load(Ordering::Relaxed), 1);
        assert_eq!(link.client.pending_count(), 0);
    }

    // =============================================================================
    // INTERCEPTORS MEET MIDDLEWARE
    // =============================================================================

    #[tokio::test]
    async fn test_interceptors_and_middleware_cooperate() {
        let app = better_messenger::MemoryWindow::new(super::super::APP_ORIGIN);
        let frame = better_messenger::MemoryWindow::new(super::super::FRAME_ORIGIN);
        let server = better_messenger::Server::new(frame.clone(), Default::default()).unwrap();

        // Server side: middleware checks the token, the handler reads the body.
        server.listen_any(
            |request: Request, responder: Responder, next: Next| async move {
                if request.data["token"] != json!("secret") {
                    responder.reject(json!("unauthorized"));
                    return Ok::<(), HandlerError>(());
                }
                next.run().await;
                Ok(())
            },
        );
        server.listen(
            "ping",
            |request: Request, responder: Responder, _next: Next| async move {
                let n = request.data["body"].as_i64().unwrap_or_default();
                responder.resolve(json!(n + 1));
                Ok::<(), HandlerError>(())
            },
        );

        let anonymous = better_messenger::Client::new(
            frame.proxy_for(&app),
            app.clone(),
            ClientConfig::default(),
        )
        .unwrap();
        let err = anonymous.request("ping", json!(1)).await.unwrap_err();
        assert_eq!(err.response().map(|r| r.data.clone()), Some(json!("unauthorized")));
        anonymous.close();

        let client = better_messenger::Client::builder(frame.proxy_for(&app), app.clone())
            .request_interceptor(|mut request: Request| async move {
                request.data = json!({ "token": "secret", "body": request.data });
                Ok::<Request, InterceptorError>(request)
            })
            .response_interceptor(|mut response: better_messenger::Response| async move {
                response.data = json!({ "value": response.data });
                Ok::<better_messenger::Response, InterceptorError>(response)
            })
            .build()
            .unwrap();

        let response = client.request("ping", json!(1)).await.unwrap();
        assert_eq!(response.data, json!({ "value": 2 }));
    }

    #[tokio::test]
    async fn test_middleware_mutation_is_local_to_its_call() {
        let link = Link::new();
        let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
        let record = Arc::clone(&seen);
        link.server.listen_any(
            move |mut request: Request, _responder: Responder, next: Next| {
                let record = Arc::clone(&record);
                async move {
                    request.data = json!("rewritten");
                    record.lock().push(request.data.clone());
                    next.run().await;
                    Ok::<(), HandlerError>(())
                }
            },
        );
        link.server.listen("ping", plus_one());

        // Each handler receives the request as it arrived.
        let response = link.client.request("ping", json!(1)).await.unwrap();
        assert_eq!(response.data, json!(2));
        assert_eq!(*seen.lock(), vec![json!("rewritten")]);
    }

    #[tokio::test]
    async fn test_reserved_type_never_reaches_server() {
        let link = Link::new();
        let err = link
            .client
            .request(better_messenger::HANDSHAKE_TYPE, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Usage(_)));
        assert_eq!(link.frame.delivered(), 0);
    }
}
