//! # Inbound Path
//!
//! Requests arriving on a route's topic or on this instance's direct
//! subject, and replies arriving on the reply subject.
//!
//! ## Responder Flow
//!
//! ```text
//! fragment 1 ──► ack to caller ──┐
//! fragments 2..N ────────────────┼──► defrag ──► serve task ──► reply fragments
//! ```
//!
//! Each complete request is served on its own task with the budget and
//! call depth taken from its frame. Handler panics and overruns become
//! error responses; they never take down the reader.

use crate::domain::{Reply, ReplyFrame};
use crate::publisher::WeakPublisher;
use crate::service::{run_isolated, Inner, Route};
use fabric_telemetry::PropagatedContext;
use mf_05_sub::Incoming;
use shared_bus::BusMessage;
use shared_types::{CallContext, ErrorKind, Frame, FrameMut, HttpMessage, OpCode, TracedError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument, Span};

/// Where a request came from and where its replies go.
#[derive(Debug, Clone)]
struct Caller {
    msg_id: String,
    from_host: String,
    from_id: String,
    reply_to: String,
}

impl Inner {
    pub(crate) async fn on_request(self: &Arc<Self>, route: &Arc<Route>, msg: BusMessage) {
        let message = match HttpMessage::decode(msg.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(subject = %msg.subject, error = %e, "Dropping undecodable request");
                return;
            }
        };

        let frame = Frame::of(&message.headers);
        let (Some(msg_id), Some(from_id), Some(reply_to)) =
            (frame.msg_id(), frame.from_id(), frame.reply_to())
        else {
            debug!(subject = %msg.subject, "Dropping request without a frame");
            return;
        };
        let caller = Caller {
            msg_id: msg_id.to_string(),
            from_host: frame.from_host().unwrap_or_default().to_string(),
            from_id: from_id.to_string(),
            reply_to: reply_to.to_string(),
        };
        let fragment = frame.fragment();

        let reply = ReplyFrame {
            msg_id: &caller.msg_id,
            from_host: &self.hostname,
            from_id: &self.id,
            queue: route.sub.queue(),
        };
        match fragment {
            Ok((1, _)) => self.send(&caller.reply_to, reply.ack(), "ack").await,
            Ok(_) => {}
            Err(e) => {
                let err = TracedError::from(e).trace();
                self.send(&caller.reply_to, reply.error(&err), "err").await;
                return;
            }
        }

        let key = format!("{}|{}", caller.from_id, caller.msg_id);
        match self.request_defrag.add(&key, message) {
            Ok(None) => {}
            Ok(Some(whole)) => {
                let inner = self.clone();
                let route = route.clone();
                tokio::spawn(async move { inner.serve(route, whole, caller).await });
            }
            Err(e) => {
                let err = TracedError::from(e).trace();
                self.send(&caller.reply_to, reply.error(&err), "err").await;
            }
        }
    }

    async fn serve(self: Arc<Self>, route: Arc<Route>, mut message: HttpMessage, caller: Caller) {
        let frame = Frame::of(&message.headers);
        let budget = frame
            .time_budget()
            .filter(|b| !b.is_zero())
            .unwrap_or(self.config.default_time_budget);
        let depth = frame.call_depth();
        let remote = frame
            .traceparent()
            .and_then(PropagatedContext::parse_traceparent);

        let topic = route.sub.topic();
        let span = info_span!(
            "serve",
            topic = %topic,
            from = %caller.from_host,
            msg_id = %caller.msg_id,
            depth
        );
        if let Some(remote) = &remote {
            remote.attach_to(&span);
        }

        let ctx = CallContext::from_token(self.lifetime().child_token())
            .with_timeout(budget)
            .with_call_depth(depth);
        FrameMut::of(&mut message.headers).clear();

        let started = Instant::now();
        let result = match message.into_request() {
            Ok(request) => {
                let incoming = Incoming {
                    ctx: ctx.clone(),
                    request,
                    publisher: Arc::new(WeakPublisher::new(Arc::downgrade(&self))),
                };
                let what = format!("handler of {}", route.sub);
                run_isolated(&what, &ctx, (route.handler)(incoming).instrument(span.clone())).await
            }
            Err(e) => Err(TracedError::from(e)
                .of_kind(ErrorKind::InvalidArgument)
                .trace()),
        };

        let status = match &result {
            Ok(res) => res.status().as_u16(),
            Err(err) => err.status_code(),
        };
        self.with_metrics(|m| {
            let status = status.to_string();
            m.requests_handled
                .with_label_values(&[topic.as_str(), status.as_str()])
                .inc();
            m.handler_duration
                .with_label_values(&[topic.as_str()])
                .observe(started.elapsed().as_secs_f64());
        });
        if status >= 500 {
            self.select_trace(&span, remote.as_ref());
        }

        let reply = ReplyFrame {
            msg_id: &caller.msg_id,
            from_host: &self.hostname,
            from_id: &self.id,
            queue: route.sub.queue(),
        };
        let (message, op) = match result {
            Ok(res) => (reply.response(HttpMessage::from_response(res)), "res"),
            Err(err) => {
                self.with_metrics(|m| m.errors.with_label_values(&[err.kind().as_str()]).inc());
                span.in_scope(|| debug!(error = %err, status, "Handler failed"));
                (reply.error(&err), "err")
            }
        };
        self.send(&caller.reply_to, message, op).await;
    }

    /// Marks the trace of a failed request for export.
    fn select_trace(&self, span: &Span, remote: Option<&PropagatedContext>) {
        let Some(selector) = &self.selector else {
            return;
        };
        let trace_id = PropagatedContext::from_span(span)
            .trace_id()
            .or_else(|| remote.and_then(PropagatedContext::trace_id));
        if let Some(trace_id) = trace_id {
            debug!(%trace_id, "Selecting trace of failed request");
            selector.select(trace_id);
        }
    }

    /// Fragments `message` and puts every part on `subject`. Returns the
    /// delivery count of the first part.
    pub(crate) async fn publish_fragments(
        &self,
        subject: &str,
        message: &HttpMessage,
        op: &str,
    ) -> Result<usize, TracedError> {
        let parts = mf_03_frag::fragment(message, self.max_fragment_size())
            .map_err(|e| TracedError::from(e).trace())?;
        let mut first = None;
        for part in parts {
            let delivered = self
                .transport
                .publish(subject, part.encode())
                .await
                .map_err(|e| TracedError::from(e).trace())?;
            first.get_or_insert(delivered);
            self.with_metrics(|m| m.fragments_sent.with_label_values(&[op]).inc());
        }
        Ok(first.unwrap_or_default())
    }

    /// Replies are fire and forget; a caller that went away is not an error.
    async fn send(&self, subject: &str, message: HttpMessage, op: &str) {
        match self.publish_fragments(subject, &message, op).await {
            Ok(0) => debug!(subject, op, "Nobody waits for this reply"),
            Ok(_) => {}
            Err(err) => warn!(subject, op, error = %err, "Failed to send reply"),
        }
    }

    /// Routes a reply to the pending call it answers.
    pub(crate) fn on_reply(&self, msg: BusMessage) {
        let message = match HttpMessage::decode(msg.payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable reply");
                return;
            }
        };
        let frame = Frame::of(&message.headers);
        let Some(id) = frame.msg_id().and_then(|id| id.parse::<u64>().ok()) else {
            debug!("Dropping reply without a message ID");
            return;
        };
        let responder = frame.from_id().unwrap_or_default().to_string();
        let op = frame.op_code();
        let queue = frame.queue().map(str::to_string);

        if op == Some(OpCode::Ack) {
            self.pending.deliver(id, Reply::Ack { responder, queue });
            return;
        }
        let key = format!("{}|{}", responder, id);
        match self.response_defrag.add(&key, message) {
            Ok(None) => {}
            Ok(Some(message)) => {
                self.pending.deliver(id, Reply::Response { responder, message });
            }
            Err(e) => {
                self.pending.fail(id, TracedError::from(e).trace());
            }
        }
    }

    /// Drops partial messages idle for longer than the fragment timeout.
    /// Callers waiting on a dropped response fail with `Timeout`.
    pub(crate) fn reap(&self) {
        let timeout = self.config.fragment_timeout;
        for key in self.request_defrag.reap_expired(timeout) {
            debug!(key = %key, "Dropped incomplete request");
        }
        for key in self.response_defrag.reap_expired(timeout) {
            let Some(id) = key.rsplit('|').next().and_then(|id| id.parse::<u64>().ok()) else {
                continue;
            };
            self.pending.fail(
                id,
                TracedError::timeout(format!("response {} stopped arriving", key)),
            );
        }
    }
}
