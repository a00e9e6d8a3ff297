//! # Outbound Path
//!
//! Publishes a request and gathers its replies.
//!
//! ## Caller Flow
//!
//! 1. Register a pending call; its ID becomes the message ID
//! 2. Publish fragment 1 on the topic, where one queue member per group
//!    (or every pervasive subscriber) receives it
//! 3. Each responder acks; the remaining fragments go to its direct subject
//! 4. Responses are reassembled by the reply reader and delivered here
//!
//! A unicast call resolves to its one response. A multicast call streams
//! responses until every responder that acked has answered, the known
//! responder count is reached, or the budget runs out.

use crate::domain::{ConnectorError, PendingGuard, Reply};
use crate::service::Inner;
use bytes::Bytes;
use fabric_telemetry::PropagatedContext;
use http::Response;
use mf_04_pub::{PubOption, Request, ResponseSink, ResponseStream};
use shared_types::{CallContext, ErrorKind, FrameMut, HttpMessage, OpCode, TracedError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};

/// Reply buffer of a unicast call.
const UNICAST_REPLY_CAPACITY: usize = 16;

/// An outbound request in flight.
struct OutboundCall {
    ctx: CallContext,
    topic: String,
    rest: Vec<HttpMessage>,
    replies: mpsc::Receiver<Reply>,
    ack_deadline: Instant,
    known_responders: Option<usize>,
    _guard: PendingGuard,
}

impl Inner {
    pub(crate) async fn publish(
        self: &Arc<Self>,
        ctx: &CallContext,
        options: Vec<PubOption>,
    ) -> Result<ResponseStream, TracedError> {
        if !self.is_started() {
            return Err(TracedError::from(ConnectorError::NotStarted).trace());
        }
        let request = Request::new(options).map_err(|e| TracedError::from(e).trace())?;

        let depth = ctx.call_depth() + 1;
        if depth > self.config.max_call_depth {
            return Err(TracedError::from(ConnectorError::CallDepthExceeded {
                depth,
                max: self.config.max_call_depth,
            })
            .trace());
        }
        let budget = request
            .effective_budget(ctx.remaining())
            .unwrap_or(self.config.default_time_budget);

        let topic = request.topic();
        let multicast = request.is_multicast();
        let span = info_span!(
            "publish",
            method = %request.method(),
            url = %request.url(),
            multicast,
            depth
        );

        let known_responders = if multicast {
            self.known_responders.load(&topic)
        } else {
            None
        };
        let capacity = if multicast {
            self.transport.channel_capacity()
        } else {
            UNICAST_REPLY_CAPACITY
        };
        let (guard, replies) = self.pending.register(&topic, capacity);

        let mut message = request
            .to_message()
            .map_err(|e| TracedError::from(e).trace())?;
        {
            let msg_id = guard.id().to_string();
            let reply_to = self.reply_subject();
            let mut frame = FrameMut::of(&mut message.headers);
            frame
                .set_msg_id(&msg_id)
                .set_from_host(&self.hostname)
                .set_from_id(&self.id)
                .set_reply_to(&reply_to)
                .set_op_code(OpCode::Request)
                .set_time_budget(budget)
                .set_call_depth(depth)
                .set_multicast(multicast);
            if let Some(traceparent) = PropagatedContext::from_span(&span).to_traceparent() {
                frame.set_traceparent(&traceparent);
            }
            if let Some(count) = known_responders {
                frame.set_known_responders(count);
            }
        }

        let mut parts = mf_03_frag::fragment(&message, self.max_fragment_size())
            .map_err(|e| TracedError::from(e).trace())?
            .into_iter();
        let Some(first) = parts.next() else {
            return Err(TracedError::internal("request produced no fragments"));
        };
        let delivered = self
            .transport
            .publish(&topic, first.encode())
            .await
            .map_err(|e| TracedError::from(e).trace())?;
        self.with_metrics(|m| {
            let cast = if multicast { "multicast" } else { "unicast" };
            m.requests_published
                .with_label_values(&[topic.as_str(), cast])
                .inc();
            m.fragments_sent.with_label_values(&["req"]).inc();
        });

        if delivered == 0 {
            debug!(topic = %topic, "No subscribers");
            if multicast {
                return Ok(ResponseStream::empty());
            }
            return Err(self.count_error(TracedError::no_responder(format!(
                "no responder for {}",
                topic
            ))));
        }

        let call = OutboundCall {
            ctx: ctx.with_timeout(budget).with_call_depth(depth),
            topic,
            rest: parts.collect(),
            replies,
            ack_deadline: Instant::now() + self.config.ack_timeout,
            known_responders,
            _guard: guard,
        };

        if multicast {
            let (sink, stream) = ResponseStream::channel(capacity);
            let inner = self.clone();
            tokio::spawn(async move { inner.collect(call, sink).await }.instrument(span));
            Ok(stream)
        } else {
            let result = self.await_unicast(call).instrument(span).await;
            Ok(ResponseStream::single(result))
        }
    }

    /// Waits for the one response of a unicast call.
    async fn await_unicast(&self, mut call: OutboundCall) -> Result<Response<Bytes>, TracedError> {
        let lifetime = self.lifetime();
        let mut acked = false;
        loop {
            tokio::select! {
                kind = call.ctx.done() => {
                    return Err(self.count_error(ended(kind, &call.topic)));
                }
                _ = lifetime.cancelled() => {
                    return Err(TracedError::cancelled("connector is shutting down"));
                }
                _ = tokio::time::sleep_until(call.ack_deadline), if !acked => {
                    return Err(self.count_error(TracedError::no_responder(format!(
                        "no responder acknowledged {}",
                        call.topic
                    ))));
                }
                reply = call.replies.recv() => match reply {
                    Some(Reply::Ack { responder, .. }) => {
                        if !acked {
                            acked = true;
                            self.send_rest(&responder, &call).await?;
                        }
                    }
                    Some(Reply::Response { message, .. }) => return Reply::into_result(message),
                    Some(Reply::Failed(err)) => return Err(err.trace()),
                    None => return Err(TracedError::cancelled("reply channel closed")),
                },
            }
        }
    }

    /// Streams the responses of a multicast call into `sink`.
    async fn collect(self: Arc<Self>, mut call: OutboundCall, sink: ResponseSink) {
        let lifetime = self.lifetime();
        let mut acked: HashSet<String> = HashSet::new();
        let mut answered: HashSet<String> = HashSet::new();
        let mut failures = 0usize;
        let mut ack_window_open = true;

        loop {
            if call.known_responders.is_some_and(|n| answered.len() >= n) {
                break;
            }
            if !ack_window_open && answered.len() + failures >= acked.len() {
                break;
            }
            tokio::select! {
                _ = sink.closed() => break,
                kind = call.ctx.done() => {
                    if kind == ErrorKind::Cancelled || answered.len() < acked.len() {
                        let err = self.count_error(ended(kind, &call.topic));
                        let _ = sink.send(Err(err)).await;
                    }
                    break;
                }
                _ = lifetime.cancelled() => {
                    let _ = sink.send(Err(TracedError::cancelled("connector is shutting down"))).await;
                    break;
                }
                _ = tokio::time::sleep_until(call.ack_deadline), if ack_window_open => {
                    ack_window_open = false;
                }
                reply = call.replies.recv() => match reply {
                    Some(Reply::Ack { responder, .. }) => {
                        if acked.insert(responder.clone()) {
                            if let Err(err) = self.send_rest(&responder, &call).await {
                                failures += 1;
                                let _ = sink.send(Err(err)).await;
                            }
                        }
                    }
                    Some(Reply::Response { responder, message }) => {
                        answered.insert(responder);
                        if sink.send(Reply::into_result(message)).await.is_err() {
                            break;
                        }
                    }
                    Some(Reply::Failed(err)) => {
                        failures += 1;
                        if sink.send(Err(err.trace())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        if !answered.is_empty() {
            self.known_responders.put(call.topic.clone(), answered.len());
        }
        debug!(
            topic = %call.topic,
            acked = acked.len(),
            answered = answered.len(),
            "Multicast complete"
        );
    }

    /// Sends fragments 2..N to the responder that acked fragment 1.
    async fn send_rest(&self, responder: &str, call: &OutboundCall) -> Result<(), TracedError> {
        if call.rest.is_empty() {
            return Ok(());
        }
        let subject = Inner::direct_subject(responder, &call.topic);
        for part in &call.rest {
            self.transport
                .publish(&subject, part.encode())
                .await
                .map_err(|e| TracedError::from(e).trace())?;
            self.with_metrics(|m| m.fragments_sent.with_label_values(&["req"]).inc());
        }
        Ok(())
    }

    fn count_error(&self, err: TracedError) -> TracedError {
        self.with_metrics(|m| m.errors.with_label_values(&[err.kind().as_str()]).inc());
        err
    }
}

#[track_caller]
fn ended(kind: ErrorKind, topic: &str) -> TracedError {
    match kind {
        ErrorKind::Timeout => TracedError::timeout(format!("request to {} timed out", topic)),
        _ => TracedError::cancelled(format!("request to {} was cancelled", topic)),
    }
}
