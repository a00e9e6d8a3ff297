//! # Multicast
//!
//! ```text
//!                     ┌──► who.example #1 (pervasive)
//! client ── publish ──┼──► who.example #2 (pervasive)
//!                     └──► who.example #3 (pervasive)
//! ```
//!
//! Pervasive subscribers all answer. Subscribers sharing a queue answer
//! once between them.

#[cfg(test)]
mod tests {
    use crate::integration::harness::TestFabric;
    use mf_04_pub::{get, multicast, Publisher};
    use mf_05_sub::{handler, load_balanced, ok, pervasive, Incoming, SubOption};
    use mf_06_connector::Connector;
    use shared_types::CallContext;
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    const TOPIC: &str = "who.example:443/who";

    async fn responders(fabric: &mut TestFabric, option: SubOption) -> Vec<Connector> {
        let mut all = Vec::new();
        for _ in 0..3 {
            let con = fabric.connector("who.example");
            let id = con.id().to_string();
            con.subscribe(
                "/who",
                [option.clone()],
                handler(move |_incoming: Incoming| {
                    let id = id.clone();
                    async move { ok(id) }
                }),
            )
            .await
            .unwrap();
            all.push(con);
        }
        all
    }

    #[tokio::test]
    async fn test_pervasive_subscribers_all_answer() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        let who = responders(&mut fabric, pervasive()).await;
        fabric.start_all().await;

        let stream = client
            .publish(
                &CallContext::background(),
                vec![get("https://who.example/who"), multicast()],
            )
            .await
            .unwrap();
        let items = stream.collect_all().await;
        assert_eq!(items.len(), 3);

        let ids: HashSet<String> = items
            .into_iter()
            .map(|item| String::from_utf8(item.unwrap().body().to_vec()).unwrap())
            .collect();
        let expected: HashSet<String> = who.iter().map(|c| c.id().to_string()).collect();
        assert_eq!(ids, expected);
        assert_eq!(client.known_responders(TOPIC), Some(3));

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_known_responders_end_multicast_early() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        responders(&mut fabric, pervasive()).await;
        fabric.start_all().await;

        let ctx = CallContext::background();
        let options = || vec![get("https://who.example/who"), multicast()];
        client.publish(&ctx, options()).await.unwrap().collect_all().await;

        let started = Instant::now();
        let items = client.publish(&ctx, options()).await.unwrap().collect_all().await;
        assert_eq!(items.len(), 3);
        assert!(
            started.elapsed() < client.settings().ack_timeout,
            "second multicast waited {:?}",
            started.elapsed()
        );

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_load_balanced_subscribers_answer_once() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        responders(&mut fabric, load_balanced()).await;
        fabric.start_all().await;

        let items = client
            .publish(
                &CallContext::background(),
                vec![get("https://who.example/who"), multicast()],
            )
            .await
            .unwrap()
            .collect_all()
            .await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_ok());

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_multicast_without_subscribers_is_empty() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        fabric.start_all().await;

        let items = client
            .publish(
                &CallContext::background(),
                vec![get("https://nobody.example/who"), multicast()],
            )
            .await
            .unwrap()
            .collect_all()
            .await;
        assert!(items.is_empty());
        assert_eq!(client.known_responders("nobody.example:443/who"), None);

        fabric.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_dropping_the_stream_releases_the_call() {
        let mut fabric = TestFabric::new();
        let client = fabric.connector("client.example");
        responders(&mut fabric, pervasive()).await;
        fabric.start_all().await;

        let mut stream = client
            .publish(
                &CallContext::background(),
                vec![get("https://who.example/who"), multicast()],
            )
            .await
            .unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.pending_calls(), 0);

        fabric.shutdown_all().await;
    }
}
