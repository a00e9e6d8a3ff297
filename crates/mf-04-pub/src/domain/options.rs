//! Request options.
//!
//! Options are plain values applied in the order given. Constructors that
//! can fail while preparing a value (JSON encoding, reading a body) produce
//! an `Invalid` option which fails the request when applied.

use bytes::Bytes;
use serde::Serialize;
use std::io::Read;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum PubOption {
    Method(String),
    Url(String),
    Endpoint(String, String),
    Header(String, String),
    Query(String, String),
    ContentType(String),
    Body(Bytes),
    Json(Bytes),
    TimeBudget(Duration),
    Multicast(bool),
    Invalid(String),
}

pub fn method(name: impl Into<String>) -> PubOption {
    PubOption::Method(name.into())
}

pub fn url(url: impl Into<String>) -> PubOption {
    PubOption::Url(url.into())
}

/// Method and URL in one option.
pub fn endpoint(method: &str, url: impl Into<String>) -> PubOption {
    PubOption::Endpoint(method.to_string(), url.into())
}

pub fn get(url: impl Into<String>) -> PubOption {
    endpoint("GET", url)
}

pub fn post(url: impl Into<String>) -> PubOption {
    endpoint("POST", url)
}

pub fn put(url: impl Into<String>) -> PubOption {
    endpoint("PUT", url)
}

pub fn delete(url: impl Into<String>) -> PubOption {
    endpoint("DELETE", url)
}

pub fn patch(url: impl Into<String>) -> PubOption {
    endpoint("PATCH", url)
}

pub fn header(name: impl Into<String>, value: impl Into<String>) -> PubOption {
    PubOption::Header(name.into(), value.into())
}

pub fn query(name: impl Into<String>, value: impl Into<String>) -> PubOption {
    PubOption::Query(name.into(), value.into())
}

pub fn content_type(value: impl Into<String>) -> PubOption {
    PubOption::ContentType(value.into())
}

pub fn body(body: impl Into<Bytes>) -> PubOption {
    PubOption::Body(body.into())
}

/// Reads the body to the end.
pub fn body_reader(mut reader: impl Read) -> PubOption {
    let mut buf = Vec::new();
    match reader.read_to_end(&mut buf) {
        Ok(_) => PubOption::Body(buf.into()),
        Err(e) => PubOption::Invalid(format!("reading body: {}", e)),
    }
}

/// Serializes `value` as the JSON body.
pub fn json<T: Serialize + ?Sized>(value: &T) -> PubOption {
    match serde_json::to_vec(value) {
        Ok(buf) => PubOption::Json(buf.into()),
        Err(e) => PubOption::Invalid(format!("encoding JSON: {}", e)),
    }
}

pub fn time_budget(budget: Duration) -> PubOption {
    PubOption::TimeBudget(budget)
}

pub fn unicast() -> PubOption {
    PubOption::Multicast(false)
}

pub fn multicast() -> PubOption {
    PubOption::Multicast(true)
}
