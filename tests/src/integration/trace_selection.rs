//! # Trace Selection
//!
//! A request that fails with a server error selects its trace in the
//! responder's selective processor, so the buffered spans of that trace get
//! exported. Client errors leave the trace unselected.

#[cfg(test)]
mod tests {
    use crate::integration::harness::TestFabric;
    use fabric_telemetry::SelectiveProcessor;
    use mf_04_pub::{get, header, Publisher};
    use mf_05_sub::{handler, ok, Incoming};
    use mf_06_connector::TraceSelector;
    use opentelemetry::trace::{TraceId, TraceResult};
    use opentelemetry::Context;
    use opentelemetry_sdk::export::trace::SpanData;
    use opentelemetry_sdk::trace::{Span, SpanProcessor};
    use parking_lot::Mutex;
    use shared_types::{CallContext, TracedError};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct NoopProcessor;

    impl SpanProcessor for NoopProcessor {
        fn on_start(&self, _span: &mut Span, _cx: &Context) {}

        fn on_end(&self, _span: SpanData) {}

        fn force_flush(&self) -> TraceResult<()> {
            Ok(())
        }

        fn shutdown(&self) -> TraceResult<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<TraceId>>);

    impl TraceSelector for Recorder {
        fn select(&self, trace_id: TraceId) {
            self.0.lock().push(trace_id);
        }
    }

    const TRACE: &str = "4bf92f3577b34da6a3ce929d0e0e4736";

    fn traceparent() -> String {
        format!("00-{}-00f067aa0ba902b7-01", TRACE)
    }

    async fn failing_service(fabric: &mut TestFabric, selector: Arc<dyn TraceSelector>) {
        let svc = fabric
            .builder("flaky.example")
            .trace_selector(selector)
            .build()
            .unwrap();
        let svc = fabric.add(svc);
        svc.subscribe(
            "/broken",
            [],
            handler(|_incoming: Incoming| async move { Err(TracedError::internal("broken")) }),
        )
        .await
        .unwrap();
        svc.subscribe(
            "/picky",
            [],
            handler(|_incoming: Incoming| async move {
                Err(TracedError::invalid_argument("bad input"))
            }),
        )
        .await
        .unwrap();
        svc.subscribe(
            "/fine",
            [],
            handler(|_incoming: Incoming| async move { ok("fine") }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_selects_trace() {
        let mut fabric = TestFabric::new();
        let processor = SelectiveProcessor::new(NoopProcessor);
        failing_service(&mut fabric, Arc::new(processor.clone())).await;
        let client = fabric.connector("client.example");
        fabric.start_all().await;

        let trace_id = TraceId::from_hex(TRACE).unwrap();
        let err = client
            .request(
                &CallContext::background(),
                vec![get("https://flaky.example/broken"), header("traceparent", traceparent())],
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(processor.is_selected(trace_id));

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_client_errors_and_successes_do_not_select() {
        let mut fabric = TestFabric::new();
        let recorder = Arc::new(Recorder::default());
        failing_service(&mut fabric, recorder.clone()).await;
        let client = fabric.connector("client.example");
        fabric.start_all().await;

        let ctx = CallContext::background();
        let err = client
            .request(
                &ctx,
                vec![get("https://flaky.example/picky"), header("traceparent", traceparent())],
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        client
            .request(
                &ctx,
                vec![get("https://flaky.example/fine"), header("traceparent", traceparent())],
            )
            .await
            .unwrap();
        assert!(recorder.0.lock().is_empty());

        client
            .request(
                &ctx,
                vec![get("https://flaky.example/broken"), header("traceparent", traceparent())],
            )
            .await
            .unwrap_err();
        assert_eq!(*recorder.0.lock(), vec![TraceId::from_hex(TRACE).unwrap()]);

        fabric.shutdown_all().await;
    }
}
