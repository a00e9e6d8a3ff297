//! Outbound port: the capability to publish requests.
//!
//! Services and handlers depend on `Publisher`, never on the connector
//! itself.

use crate::domain::PubOption;
use crate::stream::ResponseStream;
use async_trait::async_trait;
use bytes::Bytes;
use http::Response;
use shared_types::{CallContext, TracedError};

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Unicast request. Resolves to the single response, or to `Timeout`,
    /// `NoResponder`, `Cancelled` or the error returned by the remote handler.
    async fn request(
        &self,
        ctx: &CallContext,
        options: Vec<PubOption>,
    ) -> Result<Response<Bytes>, TracedError>;

    /// Request with any cardinality. Responses arrive on the stream in
    /// arrival order; the stream ends when every expected responder has
    /// answered or the budget elapses.
    async fn publish(
        &self,
        ctx: &CallContext,
        options: Vec<PubOption>,
    ) -> Result<ResponseStream, TracedError>;
}
