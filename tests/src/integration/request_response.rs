//! # Unicast Request/Response
//!
//! A caller and one or more responders on a shared bus.
//!
//! 1. **Round trip**: query in, computed body out
//! 2. **Nesting**: handlers call other services through their publisher
//! 3. **Depth limit**: runaway recursion is cut off with 508
//! 4. **Remote errors**: the stack survives the trip and gains the caller's frame

#[cfg(test)]
mod tests {
    use crate::integration::harness::TestFabric;
    use bytes::Bytes;
    use http::StatusCode;
    use mf_04_pub::{get, json, post, time_budget, Publisher};
    use mf_05_sub::{handler, json_response, ok, Incoming};
    use mf_06_connector::{ConnectorConfig, LOOP_DETECTED};
    use serde_json::{json as value, Value};
    use shared_types::{new_error, CallContext, ErrorKind, TracedError};
    use std::time::Duration;

    fn query_int(incoming: &Incoming, name: &str) -> Result<i64, TracedError> {
        let query = incoming.request.uri().query().unwrap_or_default();
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .and_then(|(_, v)| v.parse().ok())
            .ok_or_else(|| TracedError::invalid_argument(format!("missing {}", name)))
    }

    #[tokio::test]
    async fn test_unicast_round_trip() {
        let mut fabric = TestFabric::new();
        let calc = fabric.connector("calc.example");
        let client = fabric.connector("client.example");

        calc.subscribe(
            "/add",
            [],
            handler(|incoming: Incoming| async move {
                let sum = query_int(&incoming, "x")? + query_int(&incoming, "y")?;
                ok(sum.to_string())
            }),
        )
        .await
        .unwrap();
        fabric.start_all().await;

        let res = client
            .request(
                &CallContext::background(),
                vec![get("https://calc.example/add?x=3&y=4")],
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body(), &Bytes::from("7"));
        assert!(res.headers().get(shared_types::frame::MSG_ID).is_none());
        assert_eq!(client.pending_calls(), 0);

        let err = client
            .request(
                &CallContext::background(),
                vec![get("https://calc.example/add?x=3")],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.status_code(), 400);

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_json_body_and_budget_reach_handler() {
        let mut fabric = TestFabric::new();
        let echo = fabric.connector("echo.example");
        let client = fabric.connector("client.example");

        echo.subscribe(
            "/echo",
            [],
            handler(|incoming: Incoming| async move {
                let body: Value = incoming.json()?;
                let remaining = incoming.ctx.remaining().unwrap_or_default();
                json_response(
                    StatusCode::CREATED,
                    &value!({ "echo": body, "bounded": remaining <= Duration::from_secs(1) }),
                )
            }),
        )
        .await
        .unwrap();
        fabric.start_all().await;

        let res = client
            .request(
                &CallContext::background(),
                vec![
                    post("https://echo.example/echo"),
                    json(&value!({ "name": "fabric" })),
                    time_budget(Duration::from_secs(1)),
                ],
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["echo"]["name"], "fabric");
        assert_eq!(body["bounded"], true);

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_handlers_call_other_services() {
        let mut fabric = TestFabric::new();
        let front = fabric.connector("front.example");
        let back = fabric.connector("back.example");
        let client = fabric.connector("client.example");

        back.subscribe(
            "/depth",
            [],
            handler(|incoming: Incoming| async move { ok(incoming.ctx.call_depth().to_string()) }),
        )
        .await
        .unwrap();
        front.subscribe(
            "/relay",
            [],
            handler(|incoming: Incoming| async move {
                let inner = incoming
                    .publisher
                    .request(&incoming.ctx, vec![get("https://back.example/depth")])
                    .await?;
                let inner = String::from_utf8_lossy(inner.body()).to_string();
                ok(format!("{}>{}", incoming.ctx.call_depth(), inner))
            }),
        )
        .await
        .unwrap();
        fabric.start_all().await;

        let res = client
            .request(&CallContext::background(), vec![get("https://front.example/relay")])
            .await
            .unwrap();
        assert_eq!(res.body(), &Bytes::from("1>2"));

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_call_depth_limit() {
        let mut fabric = TestFabric::new();
        let looping = fabric
            .builder("loop.example")
            .config(ConnectorConfig {
                max_call_depth: 3,
                ..crate::integration::harness::fast_config()
            })
            .build()
            .unwrap();
        let looping = fabric.add(looping);
        let client = fabric.connector("client.example");

        looping
            .subscribe(
                "/again",
                [],
                handler(|incoming: Incoming| async move {
                    incoming
                        .publisher
                        .request(&incoming.ctx, vec![get("https://loop.example/again")])
                        .await
                }),
            )
            .await
            .unwrap();
        fabric.start_all().await;

        let err = client
            .request(&CallContext::background(), vec![get("https://loop.example/again")])
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), LOOP_DETECTED);
        assert!(err.message().contains("call depth 4 exceeds 3"));

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_remote_error_keeps_stack() {
        let mut fabric = TestFabric::new();
        let db = fabric.connector("db.example");
        let client = fabric.connector("client.example");

        db.subscribe(
            "/query",
            [],
            handler(|_incoming: Incoming| async move {
                Err(new_error!("db down", "replica 2").of_kind(ErrorKind::Internal))
            }),
        )
        .await
        .unwrap();
        fabric.start_all().await;

        let err = client
            .request(&CallContext::background(), vec![get("https://db.example/query")])
            .await
            .unwrap_err();
        assert_eq!(err.message(), "db down");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.status_code(), 500);

        let stack = err.stack();
        assert_eq!(stack.len(), 2);
        assert!(stack[0].file.ends_with("request_response.rs"));
        assert_eq!(stack[0].annotations, vec!["replica 2".to_string()]);
        assert!(stack[1].file.contains("mf-06-connector"));

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_request_before_startup_fails() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        let err = client
            .request(&CallContext::background(), vec![get("https://any.example/")])
            .await
            .unwrap_err();
        assert!(err.message().contains("not started"));
    }
}
