//! `Publisher` implementations backed by a connector.

use crate::domain::ConnectorError;
use crate::service::{Connector, Inner};
use async_trait::async_trait;
use bytes::Bytes;
use http::Response;
use mf_04_pub::{unicast, PubOption, Publisher, ResponseStream};
use shared_types::{CallContext, TracedError};
use std::sync::{Arc, Weak};

/// First response of a unicast stream.
#[track_caller]
fn first_response(item: Option<Result<Response<Bytes>, TracedError>>) -> Result<Response<Bytes>, TracedError> {
    item.unwrap_or_else(|| Err(TracedError::no_responder("no response")))
}

async fn request(
    inner: &Arc<Inner>,
    ctx: &CallContext,
    mut options: Vec<PubOption>,
) -> Result<Response<Bytes>, TracedError> {
    options.push(unicast());
    let mut stream = inner.publish(ctx, options).await?;
    first_response(stream.next().await)
}

#[async_trait]
impl Publisher for Connector {
    async fn request(
        &self,
        ctx: &CallContext,
        options: Vec<PubOption>,
    ) -> Result<Response<Bytes>, TracedError> {
        request(&self.inner, ctx, options).await
    }

    async fn publish(
        &self,
        ctx: &CallContext,
        options: Vec<PubOption>,
    ) -> Result<ResponseStream, TracedError> {
        self.inner.publish(ctx, options).await
    }
}

/// Publisher handed to handlers. It does not keep the connector alive.
#[derive(Clone)]
pub struct WeakPublisher {
    inner: Weak<Inner>,
}

impl WeakPublisher {
    pub(crate) fn new(inner: Weak<Inner>) -> Self {
        Self { inner }
    }

    fn upgrade(&self) -> Result<Arc<Inner>, TracedError> {
        self.inner
            .upgrade()
            .ok_or_else(|| TracedError::from(ConnectorError::Gone).trace())
    }
}

#[async_trait]
impl Publisher for WeakPublisher {
    async fn request(
        &self,
        ctx: &CallContext,
        options: Vec<PubOption>,
    ) -> Result<Response<Bytes>, TracedError> {
        request(&self.upgrade()?, ctx, options).await
    }

    async fn publish(
        &self,
        ctx: &CallContext,
        options: Vec<PubOption>,
    ) -> Result<ResponseStream, TracedError> {
        self.upgrade()?.publish(ctx, options).await
    }
}
