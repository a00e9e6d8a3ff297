//! Messages exchanged between callers and responders.
//!
//! Every reply travels to the caller's reply subject with the caller's
//! message ID and the responder's ID in its frame. The op code tells acks,
//! responses and error responses apart. Error responses carry the
//! serialized `TracedError`, stack included.

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use shared_types::{ErrorKind, Frame, FrameMut, HttpMessage, OpCode, TracedError};

/// What a waiting caller receives.
#[derive(Debug)]
pub enum Reply {
    /// A responder took the request.
    Ack {
        responder: String,
        queue: Option<String>,
    },
    /// A complete response or error response.
    Response {
        responder: String,
        message: HttpMessage,
    },
    /// A local failure, such as a broken or stale fragment.
    Failed(TracedError),
}

impl Reply {
    /// The response as the caller sees it. Error responses become the
    /// remote error with the caller's frame appended.
    #[track_caller]
    pub fn into_result(message: HttpMessage) -> Result<http::Response<Bytes>, TracedError> {
        if Frame::of(&message.headers).op_code() == Some(OpCode::Error) {
            return Err(decode_error(&message).trace());
        }
        let mut message = message;
        FrameMut::of(&mut message.headers).clear();
        message
            .into_response()
            .map_err(|e| TracedError::from(e).trace())
    }
}

/// Frame fields shared by every reply of a responder.
#[derive(Debug, Clone)]
pub struct ReplyFrame<'a> {
    pub msg_id: &'a str,
    pub from_host: &'a str,
    pub from_id: &'a str,
    pub queue: Option<&'a str>,
}

impl ReplyFrame<'_> {
    fn stamp(&self, msg: &mut HttpMessage, op: OpCode) {
        let mut frame = FrameMut::of(&mut msg.headers);
        frame
            .clear()
            .set_msg_id(self.msg_id)
            .set_from_host(self.from_host)
            .set_from_id(self.from_id)
            .set_op_code(op);
        if let Some(queue) = self.queue {
            frame.set_queue(queue);
        }
    }

    pub fn ack(&self) -> HttpMessage {
        let mut msg = HttpMessage::response(StatusCode::ACCEPTED).with_body(Bytes::new());
        self.stamp(&mut msg, OpCode::Ack);
        msg
    }

    pub fn response(&self, mut msg: HttpMessage) -> HttpMessage {
        self.stamp(&mut msg, OpCode::Response);
        msg
    }

    pub fn error(&self, err: &TracedError) -> HttpMessage {
        let mut msg = encode_error(err);
        self.stamp(&mut msg, OpCode::Error);
        msg
    }
}

/// An error response carrying `err` as JSON.
pub fn encode_error(err: &TracedError) -> HttpMessage {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_vec(err).unwrap_or_else(|_| err.message().into_bytes());
    let mut msg = HttpMessage::response(status).with_body(body);
    msg.headers
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    msg
}

/// Restores the remote error of an error response. Bodies that are not a
/// serialized error become an error of the kind matching the status.
pub fn decode_error(msg: &HttpMessage) -> TracedError {
    let body = msg.body.clone().unwrap_or_default();
    if let Ok(err) = serde_json::from_slice::<TracedError>(&body) {
        return err;
    }
    let status = msg.status().map_or(500, |s| s.as_u16());
    let text = String::from_utf8_lossy(&body);
    let text = if text.is_empty() {
        format!("remote error {}", status)
    } else {
        text.into_owned()
    };
    TracedError::bare(text)
        .of_kind(ErrorKind::from_status_code(status))
        .with_status(status)
}
