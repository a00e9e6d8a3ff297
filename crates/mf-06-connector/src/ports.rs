//! Outbound ports of the connector.

use fabric_telemetry::SelectiveProcessor;
use opentelemetry::trace::TraceId;
use opentelemetry_sdk::trace::SpanProcessor;

/// Receives the trace IDs of failed requests so their spans get exported.
pub trait TraceSelector: Send + Sync {
    fn select(&self, trace_id: TraceId);
}

impl<P: SpanProcessor> TraceSelector for SelectiveProcessor<P> {
    fn select(&self, trace_id: TraceId) {
        SelectiveProcessor::select(self, trace_id);
    }
}
