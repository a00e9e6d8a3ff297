//! # Frame Headers
//!
//! Reserved headers stamped on every message the fabric puts on the bus.
//! Names are lowercase since the header map is case-insensitive.
//!
//! `Frame` reads them off a header map and `FrameMut` writes them.

use crate::errors::{ErrorKind, TracedError};
use http::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const MSG_ID: &str = "fabric-msg-id";
pub const FROM_HOST: &str = "fabric-from-host";
pub const FROM_ID: &str = "fabric-from-id";
pub const TIME_BUDGET: &str = "fabric-time-budget";
pub const FRAGMENT: &str = "fabric-fragment";
pub const REPLY_TO: &str = "fabric-reply-to";
pub const MULTICAST: &str = "fabric-multicast";
pub const OP_CODE: &str = "fabric-op-code";
pub const QUEUE: &str = "fabric-queue";
pub const CALL_DEPTH: &str = "fabric-call-depth";
pub const KNOWN_RESPONDERS: &str = "fabric-known-responders";
pub const TRACEPARENT: &str = "traceparent";

/// Every reserved header.
pub const RESERVED: [&str; 12] = [
    MSG_ID,
    FROM_HOST,
    FROM_ID,
    TIME_BUDGET,
    FRAGMENT,
    REPLY_TO,
    MULTICAST,
    OP_CODE,
    QUEUE,
    CALL_DEPTH,
    KNOWN_RESPONDERS,
    TRACEPARENT,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Request,
    Response,
    Error,
    Ack,
}

impl OpCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "Req",
            Self::Response => "Res",
            Self::Error => "Err",
            Self::Ack => "Ack",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Req" => Some(Self::Request),
            "Res" => Some(Self::Response),
            "Err" => Some(Self::Error),
            "Ack" => Some(Self::Ack),
            _ => None,
        }
    }
}

/// Bus subject of an endpoint: `host:port/path`, host lowercase. The path
/// always starts with `/`, so the root path renders as `host:port/`.
pub fn topic(host: &str, port: u16, path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    format!("{}:{}{}", host.to_ascii_lowercase(), port, path)
}

/// Frame header errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed fragment header: {0:?}")]
    BadFragment(String),

    #[error("fragment {index}/{count} out of range")]
    FragmentOutOfRange { index: u32, count: u32 },
}

impl From<FrameError> for TracedError {
    fn from(err: FrameError) -> Self {
        TracedError::from_error(err).of_kind(ErrorKind::MalformedFragment)
    }
}

/// Read-only view of the frame headers.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    headers: &'a HeaderMap,
}

impl<'a> Frame<'a> {
    pub fn of(headers: &'a HeaderMap) -> Self {
        Self { headers }
    }

    fn get(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn msg_id(&self) -> Option<&'a str> {
        self.get(MSG_ID)
    }

    pub fn from_host(&self) -> Option<&'a str> {
        self.get(FROM_HOST)
    }

    pub fn from_id(&self) -> Option<&'a str> {
        self.get(FROM_ID)
    }

    pub fn reply_to(&self) -> Option<&'a str> {
        self.get(REPLY_TO)
    }

    pub fn queue(&self) -> Option<&'a str> {
        self.get(QUEUE)
    }

    pub fn traceparent(&self) -> Option<&'a str> {
        self.get(TRACEPARENT)
    }

    pub fn op_code(&self) -> Option<OpCode> {
        self.get(OP_CODE).and_then(OpCode::parse)
    }

    pub fn is_multicast(&self) -> bool {
        self.get(MULTICAST) == Some("1")
    }

    /// `None` when absent or unparseable. Zero means no bound.
    pub fn time_budget(&self) -> Option<Duration> {
        self.get(TIME_BUDGET)?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_millis)
    }

    pub fn call_depth(&self) -> u32 {
        self.get(CALL_DEPTH)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn known_responders(&self) -> Option<usize> {
        self.get(KNOWN_RESPONDERS)?.trim().parse().ok()
    }

    /// `(index, count)`. An absent header means a single-message frame.
    pub fn fragment(&self) -> Result<(u32, u32), FrameError> {
        let Some(raw) = self.headers.get(FRAGMENT) else {
            return Ok((1, 1));
        };
        let text = raw
            .to_str()
            .map_err(|_| FrameError::BadFragment(String::from_utf8_lossy(raw.as_bytes()).into()))?;
        let bad = || FrameError::BadFragment(text.to_string());
        let (index, count) = text.split_once('/').ok_or_else(bad)?;
        let index: u32 = index.trim().parse().map_err(|_| bad())?;
        let count: u32 = count.trim().parse().map_err(|_| bad())?;
        if index < 1 || index > count {
            return Err(FrameError::FragmentOutOfRange { index, count });
        }
        Ok((index, count))
    }
}

/// Mutable view of the frame headers.
#[derive(Debug)]
pub struct FrameMut<'a> {
    headers: &'a mut HeaderMap,
}

impl<'a> FrameMut<'a> {
    pub fn of(headers: &'a mut HeaderMap) -> Self {
        Self { headers }
    }

    fn set(&mut self, name: &'static str, value: &str) -> &mut Self {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(_) => warn!(header = name, value, "Skipping frame header with invalid value"),
        }
        self
    }

    pub fn set_msg_id(&mut self, id: &str) -> &mut Self {
        self.set(MSG_ID, id)
    }

    pub fn set_from_host(&mut self, host: &str) -> &mut Self {
        self.set(FROM_HOST, host)
    }

    pub fn set_from_id(&mut self, id: &str) -> &mut Self {
        self.set(FROM_ID, id)
    }

    pub fn set_reply_to(&mut self, subject: &str) -> &mut Self {
        self.set(REPLY_TO, subject)
    }

    pub fn set_queue(&mut self, queue: &str) -> &mut Self {
        self.set(QUEUE, queue)
    }

    pub fn set_traceparent(&mut self, value: &str) -> &mut Self {
        self.set(TRACEPARENT, value)
    }

    pub fn set_op_code(&mut self, op: OpCode) -> &mut Self {
        self.set(OP_CODE, op.as_str())
    }

    pub fn set_multicast(&mut self, multicast: bool) -> &mut Self {
        if multicast {
            self.set(MULTICAST, "1")
        } else {
            self.headers.remove(MULTICAST);
            self
        }
    }

    pub fn set_time_budget(&mut self, budget: Duration) -> &mut Self {
        self.set(TIME_BUDGET, &budget.as_millis().to_string())
    }

    pub fn set_call_depth(&mut self, depth: u32) -> &mut Self {
        self.set(CALL_DEPTH, &depth.to_string())
    }

    pub fn set_known_responders(&mut self, count: usize) -> &mut Self {
        self.set(KNOWN_RESPONDERS, &count.to_string())
    }

    pub fn set_fragment(&mut self, index: u32, count: u32) -> &mut Self {
        self.set(FRAGMENT, &format!("{}/{}", index, count))
    }

    /// Removes every reserved header.
    pub fn clear(&mut self) -> &mut Self {
        for name in RESERVED {
            self.headers.remove(name);
        }
        self
    }
}
