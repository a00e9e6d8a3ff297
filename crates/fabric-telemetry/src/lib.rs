//! # Fabric Telemetry
//!
//! Observability for fabric services.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter and pretty or JSON output
//! - **Spans**: an OpenTelemetry layer feeding a caller-supplied `SpanProcessor`
//! - **Selective export**: `SelectiveProcessor` holds spans until their trace is selected
//! - **Propagation**: W3C `traceparent` in and out of bus messages
//! - **Metrics**: Prometheus collectors behind the `Metric` trait
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fabric_telemetry::{init_tracing, SelectiveProcessor, TelemetryConfig};
//!
//! let config = TelemetryConfig::for_service("calc.example");
//! let selective = SelectiveProcessor::new(my_batch_processor);
//! let _guard = init_tracing(&config, selective.clone())?;
//! // hand `selective` to the connector so failed requests get exported
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `FABRIC_SERVICE_NAME` | `micro-fabric` | Service name in spans |
//! | `FABRIC_LOG_LEVEL` | `info` | Log level filter |
//! | `FABRIC_JSON_LOGS` | `false` | JSON formatted logs |
//! | `FABRIC_CONSOLE_OUTPUT` | `true` | Write logs to the console |
//! | `FABRIC_DEPLOYMENT` | `LOCAL` | Deployment environment |

mod config;
mod context;
mod logging;
pub mod metrics;
pub mod selective;

pub use config::TelemetryConfig;
pub use context::PropagatedContext;
pub use logging::{build_provider, init_logging, init_tracing, TracingGuard};
pub use metrics::{encode_metrics, FabricMetrics, Metric, REGISTRY};
pub use selective::SelectiveProcessor;

use shared_types::{ErrorKind, TracedError};
use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<TelemetryError> for TracedError {
    fn from(err: TelemetryError) -> Self {
        let kind = match err {
            TelemetryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::Internal,
        };
        TracedError::from_error(err).of_kind(kind)
    }
}
