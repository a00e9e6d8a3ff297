//! Prometheus metrics for fabric services.
//!
//! All metrics follow the naming convention: `fabric_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., requests_published_total)
//! - **Gauge**: Value that can go up or down
//! - **Histogram**: Distribution of values (e.g., handler_duration_seconds)
//!
//! Collectors are registered on a caller-owned `Registry`, or on the
//! process-wide `REGISTRY` via `FabricMetrics::register_default`.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();
}

/// A named, labeled measurement sink.
pub trait Metric: Send + Sync {
    /// Record a sample (histograms) or set the value (gauges).
    fn observe(&self, value: f64, labels: &[&str]) -> Result<(), TelemetryError>;

    /// Increment by `value`. Counters reject negative increments.
    fn add(&self, value: f64, labels: &[&str]) -> Result<(), TelemetryError>;
}

#[derive(Clone)]
pub struct CounterMetric(CounterVec);

#[derive(Clone)]
pub struct GaugeMetric(GaugeVec);

#[derive(Clone)]
pub struct HistogramMetric(HistogramVec);

fn label_error(e: prometheus::Error) -> TelemetryError {
    TelemetryError::InvalidArgument(e.to_string())
}

impl Metric for CounterMetric {
    fn observe(&self, _value: f64, _labels: &[&str]) -> Result<(), TelemetryError> {
        Err(TelemetryError::InvalidArgument(
            "counters cannot be observed".to_string(),
        ))
    }

    fn add(&self, value: f64, labels: &[&str]) -> Result<(), TelemetryError> {
        if value < 0.0 {
            return Err(TelemetryError::InvalidArgument(format!(
                "counter increment must be non-negative, got {}",
                value
            )));
        }
        self.0
            .get_metric_with_label_values(labels)
            .map_err(label_error)?
            .inc_by(value);
        Ok(())
    }
}

impl Metric for GaugeMetric {
    fn observe(&self, value: f64, labels: &[&str]) -> Result<(), TelemetryError> {
        self.0
            .get_metric_with_label_values(labels)
            .map_err(label_error)?
            .set(value);
        Ok(())
    }

    fn add(&self, value: f64, labels: &[&str]) -> Result<(), TelemetryError> {
        self.0
            .get_metric_with_label_values(labels)
            .map_err(label_error)?
            .add(value);
        Ok(())
    }
}

impl Metric for HistogramMetric {
    fn observe(&self, value: f64, labels: &[&str]) -> Result<(), TelemetryError> {
        self.0
            .get_metric_with_label_values(labels)
            .map_err(label_error)?
            .observe(value);
        Ok(())
    }

    fn add(&self, _value: f64, _labels: &[&str]) -> Result<(), TelemetryError> {
        Err(TelemetryError::InvalidArgument(
            "histograms cannot be incremented".to_string(),
        ))
    }
}

/// The fabric's own collectors, plus a factory for service-defined metrics.
#[derive(Clone)]
pub struct FabricMetrics {
    registry: Registry,
    service: String,

    /// Requests published, by topic and cardinality
    pub requests_published: CounterVec,

    /// Requests handled, by topic and status code
    pub requests_handled: CounterVec,

    /// Handler duration, by topic
    pub handler_duration: HistogramVec,

    /// Fragments put on the bus, by op code
    pub fragments_sent: CounterVec,

    /// Errors surfaced, by kind
    pub errors: CounterVec,
}

impl std::fmt::Debug for FabricMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricMetrics")
            .field("service", &self.service)
            .finish()
    }
}

impl FabricMetrics {
    /// Create and register the fabric collectors on `registry`.
    pub fn new(registry: &Registry, service: &str) -> Result<Self, TelemetryError> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help).const_label("service", service)
        };
        let err = |e: prometheus::Error| TelemetryError::MetricsInit(e.to_string());

        let requests_published = CounterVec::new(
            opts("fabric_requests_published_total", "Requests published to the bus"),
            &["topic", "cast"],
        )
        .map_err(err)?;
        let requests_handled = CounterVec::new(
            opts("fabric_requests_handled_total", "Requests handled by this service"),
            &["topic", "status"],
        )
        .map_err(err)?;
        let handler_duration = HistogramVec::new(
            HistogramOpts::new(
                "fabric_handler_duration_seconds",
                "Time spent in request handlers",
            )
            .const_label("service", service)
            .buckets(exponential_buckets(0.0005, 2.0, 16).map_err(err)?),
            &["topic"],
        )
        .map_err(err)?;
        let fragments_sent = CounterVec::new(
            opts("fabric_fragments_sent_total", "Fragments put on the bus"),
            &["op"],
        )
        .map_err(err)?;
        let errors = CounterVec::new(
            opts("fabric_errors_total", "Errors by kind"),
            &["kind"],
        )
        .map_err(err)?;

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(requests_published.clone()),
            Box::new(requests_handled.clone()),
            Box::new(handler_duration.clone()),
            Box::new(fragments_sent.clone()),
            Box::new(errors.clone()),
        ];
        for collector in collectors {
            registry.register(collector).map_err(err)?;
        }

        Ok(Self {
            registry: registry.clone(),
            service: service.to_string(),
            requests_published,
            requests_handled,
            handler_duration,
            fragments_sent,
            errors,
        })
    }

    /// Register on the process-wide `REGISTRY`.
    pub fn register_default(service: &str) -> Result<Self, TelemetryError> {
        Self::new(&REGISTRY, service)
    }

    /// Define a service counter on the same registry.
    pub fn define_counter(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<Arc<dyn Metric>, TelemetryError> {
        let counter = CounterVec::new(self.opts(name, help), labels).map_err(Self::init_err)?;
        self.register(Box::new(counter.clone()))?;
        Ok(Arc::new(CounterMetric(counter)))
    }

    /// Define a service gauge on the same registry.
    pub fn define_gauge(
        &self,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<Arc<dyn Metric>, TelemetryError> {
        let gauge = GaugeVec::new(self.opts(name, help), labels).map_err(Self::init_err)?;
        self.register(Box::new(gauge.clone()))?;
        Ok(Arc::new(GaugeMetric(gauge)))
    }

    /// Define a service histogram on the same registry.
    pub fn define_histogram(
        &self,
        name: &str,
        help: &str,
        buckets: Vec<f64>,
        labels: &[&str],
    ) -> Result<Arc<dyn Metric>, TelemetryError> {
        let opts = HistogramOpts::new(name, help)
            .const_label("service", self.service.as_str())
            .buckets(buckets);
        let histogram = HistogramVec::new(opts, labels).map_err(Self::init_err)?;
        self.register(Box::new(histogram.clone()))?;
        Ok(Arc::new(HistogramMetric(histogram)))
    }

    /// Encode every metric on the registry in Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        encode_metrics(&self.registry)
    }

    fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help).const_label("service", self.service.as_str())
    }

    fn register(&self, collector: Box<dyn prometheus::core::Collector>) -> Result<(), TelemetryError> {
        self.registry.register(collector).map_err(Self::init_err)
    }

    fn init_err(e: prometheus::Error) -> TelemetryError {
        TelemetryError::MetricsInit(e.to_string())
    }
}

/// Encode all metrics of a registry as Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
    ($histogram:expr, $labels:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram.with_label_values($labels))
    };
}
