//! # Fragmented Round Trips
//!
//! Bodies several times the bus payload limit travel in fragments both
//! ways and arrive byte for byte.

#[cfg(test)]
mod tests {
    use crate::integration::harness::TestFabric;
    use bytes::Bytes;
    use fabric_telemetry::FabricMetrics;
    use mf_04_pub::{body, post, Publisher};
    use mf_05_sub::{handler, Incoming};
    use prometheus::Registry;
    use rand::RngCore;
    use shared_types::CallContext;

    const MAX_PAYLOAD: usize = 64 * 1024;

    fn random_body(len: usize) -> Bytes {
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        Bytes::from(data)
    }

    #[tokio::test]
    async fn test_large_bodies_both_ways() {
        let mut fabric = TestFabric::with_limits(MAX_PAYLOAD, 1000);
        let registry = Registry::new();
        let client = fabric
            .builder("client.example")
            .metrics(FabricMetrics::new(&registry, "client").unwrap())
            .build()
            .unwrap();
        let client = fabric.add(client);
        let store = fabric.connector("store.example");

        store
            .subscribe(
                "/reverse",
                [],
                handler(|incoming: Incoming| async move {
                    let mut data = incoming.body().to_vec();
                    data.reverse();
                    let mut res = http::Response::new(Bytes::from(data));
                    res.headers_mut()
                        .insert("x-length", incoming.body().len().into());
                    Ok(res)
                }),
            )
            .await
            .unwrap();
        fabric.start_all().await;

        let payload = random_body(256 * 1024);
        let res = client
            .request(
                &CallContext::background(),
                vec![post("https://store.example/reverse"), body(payload.clone())],
            )
            .await
            .unwrap();

        let mut expected = payload.to_vec();
        expected.reverse();
        assert_eq!(res.body().len(), expected.len());
        assert!(res.body().as_ref() == expected.as_slice());
        assert_eq!(res.headers()["x-length"], "262144");
        assert_eq!(res.headers()[http::header::CONTENT_LENGTH], "262144");

        let sent = client
            .metrics()
            .unwrap()
            .fragments_sent
            .with_label_values(&["req"])
            .get();
        assert!(sent >= 5.0, "only {} request fragments", sent);

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_concurrent_fragmented_calls_do_not_mix() {
        let mut fabric = TestFabric::with_limits(MAX_PAYLOAD, 1000);
        let client = fabric.connector("client.example");
        let store = fabric.connector("store.example");

        store
            .subscribe(
                "/echo",
                [],
                handler(|incoming: Incoming| async move { Ok(http::Response::new(incoming.body().clone())) }),
            )
            .await
            .unwrap();
        fabric.start_all().await;

        let calls = (0..4).map(|i| {
            let client = client.clone();
            async move {
                let payload = random_body(100 * 1024 + i * 777);
                let res = client
                    .request(
                        &CallContext::background(),
                        vec![post("https://store.example/echo"), body(payload.clone())],
                    )
                    .await
                    .unwrap();
                assert_eq!(res.body(), &payload);
            }
        });
        futures::future::join_all(calls).await;

        fabric.shutdown_all().await;
    }
}
