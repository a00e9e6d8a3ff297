//! # Handlers
//!
//! A handler receives the reassembled request together with the call
//! context of the remote caller and a `Publisher` for making its own
//! downstream calls. It returns a response or a `TracedError`, which the
//! connector sends back as an error response.

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use mf_04_pub::Publisher;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{CallContext, TracedError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub type HandlerResult = Result<Response<Bytes>, TracedError>;

pub type Handler = Arc<dyn Fn(Incoming) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wraps an async function as a `Handler`.
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Incoming) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |incoming| Box::pin(f(incoming)))
}

/// An inbound request as seen by a handler.
pub struct Incoming {
    pub ctx: CallContext,
    pub request: Request<Bytes>,
    pub publisher: Arc<dyn Publisher>,
}

impl fmt::Debug for Incoming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incoming")
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("call_depth", &self.ctx.call_depth())
            .finish_non_exhaustive()
    }
}

impl Incoming {
    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    /// Decodes the body as JSON. Failures are `InvalidArgument`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TracedError> {
        serde_json::from_slice(self.request.body()).map_err(|e| TracedError::from(e).trace())
    }
}

/// A `200 OK` response with the given body.
pub fn ok(body: impl Into<Bytes>) -> HandlerResult {
    Ok(Response::new(body.into()))
}

/// A response with the given status and a JSON body.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HandlerResult {
    let body = serde_json::to_vec(value).map_err(|e| TracedError::from(e).trace())?;
    let mut res = Response::new(Bytes::from(body));
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mf_04_pub::{PubOption, ResponseStream};
    use serde::Deserialize;
    use shared_types::ErrorKind;

    struct NoopPublisher;

    #[async_trait]
    impl Publisher for NoopPublisher {
        async fn request(
            &self,
            _ctx: &CallContext,
            _options: Vec<PubOption>,
        ) -> Result<Response<Bytes>, TracedError> {
            Err(TracedError::no_responder("noop"))
        }

        async fn publish(
            &self,
            _ctx: &CallContext,
            _options: Vec<PubOption>,
        ) -> Result<ResponseStream, TracedError> {
            Ok(ResponseStream::empty())
        }
    }

    fn incoming(body: &'static str) -> Incoming {
        Incoming {
            ctx: CallContext::background(),
            request: Request::new(Bytes::from_static(body.as_bytes())),
            publisher: Arc::new(NoopPublisher),
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Greeting {
        name: String,
    }

    #[tokio::test]
    async fn test_handler_wraps_async_fn() {
        let echo = handler(|inc: Incoming| async move { ok(inc.body().clone()) });
        let res = echo(incoming("hi")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"hi");
    }

    #[tokio::test]
    async fn test_handler_can_call_publisher() {
        let relay = handler(|inc: Incoming| async move {
            inc.publisher.request(&inc.ctx, vec![]).await
        });
        let err = relay(incoming("")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoResponder);
    }

    #[test]
    fn test_json_helpers() {
        let greeting: Greeting = incoming(r#"{"name":"ada"}"#).json().unwrap();
        assert_eq!(greeting.name, "ada");

        let err = incoming("{").json::<Greeting>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let res = json_response(StatusCode::CREATED, &greeting).unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[CONTENT_TYPE], "application/json");
    }
}
