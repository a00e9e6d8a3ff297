//! Test fabric: one bus, any number of connectors.

use mf_06_connector::{Connector, ConnectorBuilder, ConnectorConfig};
use shared_bus::{InMemoryBus, Transport};
use std::sync::Arc;
use std::time::Duration;

/// Settings that keep failing scenarios short.
pub fn fast_config() -> ConnectorConfig {
    ConnectorConfig {
        default_time_budget: Duration::from_secs(2),
        ack_timeout: Duration::from_millis(100),
        fragment_timeout: Duration::from_secs(1),
        reaper_interval: Duration::from_millis(50),
        ..ConnectorConfig::default()
    }
}

/// A shared bus and the connectors attached to it.
pub struct TestFabric {
    pub bus: Arc<InMemoryBus>,
    connectors: Vec<Connector>,
}

impl Default for TestFabric {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFabric {
    pub fn new() -> Self {
        Self::on(InMemoryBus::new())
    }

    /// Fabric over a bus with a small payload limit.
    pub fn with_limits(max_payload: usize, capacity: usize) -> Self {
        Self::on(InMemoryBus::with_limits(max_payload, capacity))
    }

    fn on(bus: InMemoryBus) -> Self {
        Self {
            bus: Arc::new(bus),
            connectors: Vec::new(),
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.bus.clone()
    }

    /// Builder on this bus with the fast settings.
    pub fn builder(&self, hostname: &str) -> ConnectorBuilder {
        Connector::builder(hostname, self.transport()).config(fast_config())
    }

    /// Connector that `shutdown_all` will stop.
    pub fn add(&mut self, connector: Connector) -> Connector {
        self.connectors.push(connector.clone());
        connector
    }

    pub fn connector(&mut self, hostname: &str) -> Connector {
        let connector = self
            .builder(hostname)
            .build()
            .expect("test hostname is valid");
        self.add(connector)
    }

    pub async fn start_all(&self) {
        for connector in &self.connectors {
            if !connector.is_started() {
                connector.startup().await.expect("connector starts");
            }
        }
    }

    pub async fn shutdown_all(&self) {
        for connector in &self.connectors {
            if connector.is_started() {
                let _ = connector.shutdown().await;
            }
        }
    }
}
