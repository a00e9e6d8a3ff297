//! # Failure Modes
//!
//! | Situation | Caller sees |
//! |-----------|-------------|
//! | Nobody subscribes to the URL | `NoResponder` |
//! | Handler outlives the budget | `Timeout` |
//! | Handler panics | `HandlerPanic` |
//! | Caller cancels its context | `Cancelled` |
//! | Caller shuts down mid-call | `Cancelled` |

#[cfg(test)]
mod tests {
    use crate::integration::harness::TestFabric;
    use mf_04_pub::{get, time_budget, Publisher};
    use mf_05_sub::{handler, ok, Incoming};
    use mf_06_connector::Connector;
    use shared_types::{CallContext, ErrorKind};
    use std::time::Duration;

    async fn sleepy(fabric: &mut TestFabric) -> Connector {
        let slow = fabric.connector("slow.example");
        slow.subscribe(
            "/sleep",
            [],
            handler(|_incoming: Incoming| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ok("finally")
            }),
        )
        .await
        .unwrap();
        slow
    }

    #[tokio::test]
    async fn test_no_responder() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        fabric.start_all().await;

        let err = client
            .request(&CallContext::background(), vec![get("https://nobody.example/x")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResponder);
        assert_eq!(err.status_code(), 503);
        assert_eq!(client.pending_calls(), 0);

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_handler_past_budget_times_out() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        sleepy(&mut fabric).await;
        fabric.start_all().await;

        let started = std::time::Instant::now();
        let err = client
            .request(
                &CallContext::background(),
                vec![
                    get("https://slow.example/sleep"),
                    time_budget(Duration::from_millis(300)),
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_inherited_deadline_bounds_the_call() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        sleepy(&mut fabric).await;
        fabric.start_all().await;

        let ctx = CallContext::background().with_timeout(Duration::from_millis(300));
        let err = client
            .request(
                &ctx,
                vec![get("https://slow.example/sleep"), time_budget(Duration::from_secs(30))],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_handler_panic() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        let crashy = fabric.connector("crashy.example");
        crashy
            .subscribe(
                "/crash",
                [],
                handler(|_incoming: Incoming| async move {
                    if true {
                        panic!("index out of bounds");
                    }
                    ok("unreachable")
                }),
            )
            .await
            .unwrap();
        fabric.start_all().await;

        let err = client
            .request(&CallContext::background(), vec![get("https://crashy.example/crash")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HandlerPanic);
        assert_eq!(err.status_code(), 500);
        assert!(err.message().contains("index out of bounds"));

        let err = client
            .request(&CallContext::background(), vec![get("https://crashy.example/crash")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HandlerPanic, "responder survives a panic");

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        sleepy(&mut fabric).await;
        fabric.start_all().await;

        let ctx = CallContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            canceller.cancel();
        });

        let err = client
            .request(&ctx, vec![get("https://slow.example/sleep")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(client.pending_calls(), 0);

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_calls() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        sleepy(&mut fabric).await;
        fabric.start_all().await;

        let caller = client.clone();
        let call = tokio::spawn(async move {
            caller
                .request(&CallContext::background(), vec![get("https://slow.example/sleep")])
                .await
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        client.shutdown().await.unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        fabric.shutdown_all().await;
    }
}
