//! Logging and tracing setup.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter`, a pretty or
//! JSON `fmt` layer, and optionally a `tracing-opentelemetry` layer whose
//! spans are handed to a caller-supplied `SpanProcessor`. Exporting is the
//! processor's business; nothing here talks to a collector.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::{Config, Sampler, SpanProcessor, TracerProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Guard that shuts down the tracer provider on drop.
pub struct TracingGuard {
    provider: Option<TracerProvider>,
}

impl TracingGuard {
    /// The provider feeding the OpenTelemetry layer, if one was installed.
    pub fn provider(&self) -> Option<&TracerProvider> {
        self.provider.as_ref()
    }
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = ?e, "Error shutting down tracer provider");
            }
        }
    }
}

/// Build a tracer provider around a span processor.
pub fn build_provider<P>(config: &TelemetryConfig, processor: P) -> TracerProvider
where
    P: SpanProcessor + 'static,
{
    TracerProvider::builder()
        .with_span_processor(processor)
        .with_config(
            Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", config.service_name.clone()),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    KeyValue::new("deployment.environment", config.deployment.clone()),
                ])),
        )
        .build()
}

/// Initialize structured logging without span export.
pub fn init_logging(config: &TelemetryConfig) -> Result<TracingGuard, TelemetryError> {
    install(config, None)
}

/// Initialize structured logging with spans flowing into `processor`.
pub fn init_tracing<P>(config: &TelemetryConfig, processor: P) -> Result<TracingGuard, TelemetryError>
where
    P: SpanProcessor + 'static,
{
    install(config, Some(build_provider(config, processor)))
}

fn install(
    config: &TelemetryConfig,
    provider: Option<TracerProvider>,
) -> Result<TracingGuard, TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    let otel_layer = provider.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer(config.service_name.clone()))
    });

    // JSON output for containers/production
    let json_layer = (config.console_output && config.json_logs).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    // Pretty output for development
    let pretty_layer = (config.console_output && !config.json_logs).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true)
    });

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        spans = provider.is_some(),
        "Logging initialized"
    );

    Ok(TracingGuard { provider })
}
