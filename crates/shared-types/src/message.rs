//! # HTTP Message Model
//!
//! `HttpMessage` is the shape that travels over the bus: a start line, a
//! header map and an optional body. It is encoded as an HTTP/1.1 message.
//! Requests carry the absolute URL in the request line so the receiving side
//! can recover host, port and path without a `Host` header.

use crate::errors::{ErrorKind, TracedError};
use bytes::{BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use thiserror::Error;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const HTTP_VERSION: &str = "HTTP/1.1";

/// Codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("message head is not terminated")]
    MissingHeadTerminator,

    #[error("invalid start line: {0}")]
    InvalidStartLine(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("invalid content length: {0}")]
    InvalidContentLength(String),

    #[error("body truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("expected a {expected} message")]
    WrongMessageType { expected: &'static str },
}

impl From<CodecError> for TracedError {
    fn from(err: CodecError) -> Self {
        TracedError::from_error(err).of_kind(ErrorKind::MalformedFragment)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: Method, uri: Uri },
    Response { status: StatusCode },
}

/// An HTTP request or response as carried on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMessage {
    pub start: StartLine,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpMessage {
    pub fn request(method: Method, uri: Uri) -> Self {
        Self {
            start: StartLine::Request { method, uri },
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn response(status: StatusCode) -> Self {
        Self {
            start: StartLine::Response { status },
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.set_content_length(body.len());
        self.body = Some(body);
        self
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start, StartLine::Request { .. })
    }

    pub fn uri(&self) -> Option<&Uri> {
        match &self.start {
            StartLine::Request { uri, .. } => Some(uri),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.start {
            StartLine::Response { status } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }

    /// Parsed `Content-Length`. `None` when absent or unparseable.
    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .get(CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    pub fn set_content_length(&mut self, len: usize) {
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    }

    /// Serializes as an HTTP/1.1 message. Adds `Content-Length` when missing.
    pub fn encode(&self) -> Bytes {
        let body = self.body.as_deref().unwrap_or_default();
        let mut buf = BytesMut::with_capacity(256 + body.len());

        match &self.start {
            StartLine::Request { method, uri } => {
                buf.put_slice(format!("{} {} {}\r\n", method, uri, HTTP_VERSION).as_bytes());
            }
            StartLine::Response { status } => {
                let reason = status.canonical_reason().unwrap_or("");
                buf.put_slice(
                    format!("{} {} {}\r\n", HTTP_VERSION, status.as_u16(), reason).as_bytes(),
                );
            }
        }

        for (name, value) in &self.headers {
            buf.put_slice(name.as_str().as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        if !self.headers.contains_key(CONTENT_LENGTH) {
            buf.put_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(body);
        buf.freeze()
    }

    /// Parses an HTTP/1.1 message. The body is sliced by `Content-Length`
    /// when present, otherwise it is the remainder of the buffer.
    pub fn decode(raw: Bytes) -> Result<Self, CodecError> {
        let head_end = raw
            .windows(HEAD_TERMINATOR.len())
            .position(|w| w == HEAD_TERMINATOR)
            .ok_or(CodecError::MissingHeadTerminator)?;

        let head = std::str::from_utf8(&raw[..head_end])
            .map_err(|e| CodecError::InvalidStartLine(e.to_string()))?;
        let mut lines = head.split("\r\n");
        let start = parse_start_line(lines.next().unwrap_or_default())?;

        let mut headers = HeaderMap::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| CodecError::InvalidHeader(line.to_string()))?;
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|_| CodecError::InvalidHeader(line.to_string()))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|_| CodecError::InvalidHeader(line.to_string()))?;
            headers.append(name, value);
        }

        let rest = raw.slice(head_end + HEAD_TERMINATOR.len()..);
        let body = match headers.get(CONTENT_LENGTH) {
            Some(value) => {
                let text = value.to_str().unwrap_or_default();
                let expected: usize = text
                    .trim()
                    .parse()
                    .map_err(|_| CodecError::InvalidContentLength(text.to_string()))?;
                if rest.len() < expected {
                    return Err(CodecError::Truncated {
                        expected,
                        actual: rest.len(),
                    });
                }
                rest.slice(..expected)
            }
            None => rest,
        };

        Ok(Self {
            start,
            headers,
            body: Some(body),
        })
    }

    pub fn from_request(req: Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        let mut msg = Self {
            start: StartLine::Request {
                method: parts.method,
                uri: parts.uri,
            },
            headers: parts.headers,
            body: None,
        };
        msg.set_content_length(body.len());
        msg.body = Some(body);
        msg
    }

    pub fn from_response(res: Response<Bytes>) -> Self {
        let (parts, body) = res.into_parts();
        let mut msg = Self {
            start: StartLine::Response {
                status: parts.status,
            },
            headers: parts.headers,
            body: None,
        };
        msg.set_content_length(body.len());
        msg.body = Some(body);
        msg
    }

    pub fn into_request(self) -> Result<Request<Bytes>, CodecError> {
        let StartLine::Request { method, uri } = self.start else {
            return Err(CodecError::WrongMessageType {
                expected: "request",
            });
        };
        let mut req = Request::new(self.body.unwrap_or_default());
        *req.method_mut() = method;
        *req.uri_mut() = uri;
        *req.headers_mut() = self.headers;
        Ok(req)
    }

    pub fn into_response(self) -> Result<Response<Bytes>, CodecError> {
        let StartLine::Response { status } = self.start else {
            return Err(CodecError::WrongMessageType {
                expected: "response",
            });
        };
        let mut res = Response::new(self.body.unwrap_or_default());
        *res.status_mut() = status;
        *res.headers_mut() = self.headers;
        Ok(res)
    }
}

fn parse_start_line(line: &str) -> Result<StartLine, CodecError> {
    let invalid = || CodecError::InvalidStartLine(line.to_string());
    let mut parts = line.splitn(3, ' ');
    let first = parts.next().ok_or_else(invalid)?;

    if first.starts_with("HTTP/") {
        let code = parts.next().ok_or_else(invalid)?;
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or_else(invalid)?;
        return Ok(StartLine::Response { status });
    }

    let method = Method::from_bytes(first.as_bytes()).map_err(|_| invalid())?;
    let uri = parts
        .next()
        .ok_or_else(invalid)?
        .parse::<Uri>()
        .map_err(|_| invalid())?;
    Ok(StartLine::Request { method, uri })
}
