//! # Service Lifecycle
//!
//! Startup callbacks that call other services, tickers doing periodic
//! requests, and service config loaded from a lookup.

#[cfg(test)]
mod tests {
    use crate::integration::harness::TestFabric;
    use mf_01_config::{default_value, validation, Lookup};
    use mf_04_pub::{get, Publisher};
    use mf_05_sub::{handler, ok, Incoming};
    use mf_06_connector::callback;
    use parking_lot::Mutex;
    use shared_types::{CallContext, TracedError};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_startup_callback_calls_another_service() {
        let mut fabric = TestFabric::new();
        let settings = fabric.connector("settings.example");
        settings
            .subscribe(
                "/motd",
                [],
                handler(|_incoming: Incoming| async move { ok("welcome") }),
            )
            .await
            .unwrap();
        settings.startup().await.unwrap();

        let app = fabric.connector("app.example");
        let motd = Arc::new(Mutex::new(String::new()));
        let (publisher, sink) = (app.clone(), motd.clone());
        app.on_startup(
            "fetch motd",
            Duration::from_secs(1),
            callback(move |ctx: CallContext| {
                let (publisher, sink) = (publisher.clone(), sink.clone());
                async move {
                    let res = publisher
                        .request(&ctx, vec![get("https://settings.example/motd")])
                        .await?;
                    *sink.lock() = String::from_utf8_lossy(res.body()).to_string();
                    Ok(())
                }
            }),
        );
        app.startup().await.unwrap();
        assert_eq!(*motd.lock(), "welcome");

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_ticker_polls_a_service() {
        let mut fabric = TestFabric::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let beacon = fabric.connector("beacon.example");
        beacon
            .subscribe(
                "/ping",
                [],
                handler(move |_incoming: Incoming| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { ok("pong") }
                }),
            )
            .await
            .unwrap();

        let poller = fabric.connector("poller.example");
        let publisher = poller.clone();
        poller
            .start_ticker(
                "ping",
                Duration::from_millis(30),
                Duration::from_millis(500),
                callback(move |ctx: CallContext| {
                    let publisher = publisher.clone();
                    async move {
                        publisher
                            .request(&ctx, vec![get("https://beacon.example/ping")])
                            .await
                            .map(|_| ())
                    }
                }),
            )
            .unwrap();
        fabric.start_all().await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        fabric.shutdown_all().await;
        assert!(hits.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_service_config_from_lookup() {
        let mut fabric = TestFabric::new();
        let app = fabric.connector("app.example");
        app.define_config("Workers", [validation("int [1,64]"), default_value("4")])
            .unwrap();
        app.define_config("Mode", [validation("set fast|safe"), default_value("safe")])
            .unwrap();

        let changed = Arc::new(Mutex::new(Vec::new()));
        let sink = changed.clone();
        app.on_config_changed(move |names| sink.lock().extend(names.iter().cloned()));

        let lookup = Lookup::new().with_file(HashMap::from([
            ("Workers".to_string(), "16".to_string()),
            ("Mode".to_string(), "reckless".to_string()),
        ]));
        assert_eq!(app.load_config(&lookup), vec!["Workers"]);
        assert_eq!(app.config("Workers").as_deref(), Some("16"));
        assert_eq!(app.config("Mode").as_deref(), Some("safe"));
        assert_eq!(app.config_registry().int("Workers"), Some(16));
        assert_eq!(*changed.lock(), vec!["Workers"]);

        let err: TracedError = app.set_config("Workers", "0").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
