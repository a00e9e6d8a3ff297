//! Outbound request.

use super::error::PubError;
use super::options::PubOption;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, Uri};
use shared_types::{topic, HttpMessage};
use std::time::Duration;
use url::Url;

/// Parses and checks an absolute URL with a host.
pub fn parse_url(raw: &str) -> Result<Url, PubError> {
    let url = Url::parse(raw).map_err(|e| PubError::url(raw, e))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(PubError::url(raw, "missing host")),
    }
}

/// A logical request, before framing and fragmentation.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
    time_budget: Option<Duration>,
    multicast: bool,
}

impl Request {
    /// Applies `options` in order. The method defaults to `GET`; a URL is
    /// required.
    pub fn new(options: impl IntoIterator<Item = PubOption>) -> Result<Self, PubError> {
        let mut method = Method::GET;
        let mut url = None;
        let mut headers = HeaderMap::new();
        let mut body = Bytes::new();
        let mut queries = Vec::new();
        let mut time_budget = None;
        let mut multicast = false;

        for option in options {
            match option {
                PubOption::Method(name) => method = parse_method(&name)?,
                PubOption::Url(raw) => url = Some(parse_url(&raw)?),
                PubOption::Endpoint(name, raw) => {
                    method = parse_method(&name)?;
                    url = Some(parse_url(&raw)?);
                }
                PubOption::Header(name, value) => {
                    if value.is_empty() {
                        continue;
                    }
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|_| PubError::InvalidHeader(name.clone()))?;
                    let value = HeaderValue::from_str(&value)
                        .map_err(|_| PubError::InvalidHeader(name.to_string()))?;
                    headers.append(name, value);
                }
                PubOption::Query(name, value) => queries.push((name, value)),
                PubOption::ContentType(value) => {
                    let value = HeaderValue::from_str(&value)
                        .map_err(|_| PubError::InvalidHeader(CONTENT_TYPE.to_string()))?;
                    headers.insert(CONTENT_TYPE, value);
                }
                PubOption::Body(bytes) => body = bytes,
                PubOption::Json(bytes) => {
                    body = bytes;
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                PubOption::TimeBudget(budget) if budget.is_zero() => {}
                PubOption::TimeBudget(budget) => {
                    time_budget = Some(time_budget.map_or(budget, |b: Duration| b.min(budget)))
                }
                PubOption::Multicast(flag) => multicast = flag,
                PubOption::Invalid(reason) => return Err(PubError::InvalidBody(reason)),
            }
        }

        let mut url = url.ok_or(PubError::MissingUrl)?;
        if !queries.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &queries {
                pairs.append_pair(name, value);
            }
        }

        Ok(Self {
            method,
            url,
            headers,
            body,
            time_budget,
            multicast,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget
    }

    pub fn is_multicast(&self) -> bool {
        self.multicast
    }

    /// Lowercase host.
    pub fn host(&self) -> String {
        self.url.host_str().unwrap_or_default().to_ascii_lowercase()
    }

    /// Explicit port, else the scheme default, else 443.
    pub fn port(&self) -> u16 {
        self.url.port_or_known_default().unwrap_or(443)
    }

    /// The bus subject the request is published on.
    pub fn topic(&self) -> String {
        topic(&self.host(), self.port(), self.url.path())
    }

    /// The budget to stamp on the frame: the smaller of the request budget
    /// and what the caller has left. Zero means no bound.
    pub fn effective_budget(&self, inherited: Option<Duration>) -> Option<Duration> {
        let own = self.time_budget.filter(|d| !d.is_zero());
        match (own, inherited) {
            (Some(own), Some(inherited)) => Some(own.min(inherited)),
            (own, inherited) => own.or(inherited),
        }
    }

    /// The request as a bus message, without frame headers.
    pub fn to_message(&self) -> Result<HttpMessage, PubError> {
        let uri: Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e| PubError::url(self.url.as_str(), e))?;
        let mut msg = HttpMessage::request(self.method.clone(), uri);
        msg.headers = self.headers.clone();
        Ok(msg.with_body(self.body.clone()))
    }
}

fn parse_method(name: &str) -> Result<Method, PubError> {
    Method::from_bytes(name.to_ascii_uppercase().as_bytes())
        .map_err(|_| PubError::InvalidMethod(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::options::*;
    use serde::Serialize;

    #[test]
    fn test_defaults_and_required_url() {
        assert_eq!(Request::new([]).unwrap_err(), PubError::MissingUrl);

        let req = Request::new([url("https://Store.Example/items")]).unwrap();
        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.port(), 443);
        assert_eq!(req.topic(), "store.example:443/items");
        assert!(!req.is_multicast());
        assert!(req.body().is_empty());
    }

    #[test]
    fn test_options_apply_in_order() {
        let req = Request::new([
            post("http://svc/a"),
            method("put"),
            multicast(),
            unicast(),
            time_budget(Duration::from_secs(1)),
            time_budget(Duration::from_secs(2)),
        ])
        .unwrap();
        assert_eq!(req.method(), Method::PUT);
        assert_eq!(req.topic(), "svc:80/a");
        assert!(!req.is_multicast());
        assert_eq!(req.time_budget(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_repeated_time_budget_keeps_minimum() {
        let req = Request::new([
            get("https://svc/a"),
            time_budget(Duration::from_secs(1)),
            time_budget(Duration::from_secs(2)),
        ])
        .unwrap();
        assert_eq!(req.effective_budget(None), Some(Duration::from_secs(1)));
        assert_eq!(
            req.effective_budget(Some(Duration::from_millis(500))),
            Some(Duration::from_millis(500))
        );

        let req = Request::new([
            get("https://svc/a"),
            time_budget(Duration::from_secs(3)),
            time_budget(Duration::ZERO),
            time_budget(Duration::from_secs(5)),
        ])
        .unwrap();
        assert_eq!(req.effective_budget(None), Some(Duration::from_secs(3)));

        let req = Request::new([get("https://svc/a"), time_budget(Duration::ZERO)]).unwrap();
        assert_eq!(req.effective_budget(None), None);
    }

    #[test]
    fn test_headers_and_query() {
        let req = Request::new([
            get("https://svc:8443/search"),
            header("X-Tag", "a"),
            header("x-tag", "b"),
            header("X-Empty", ""),
            query("q", "a b"),
            query("n", "1"),
        ])
        .unwrap();
        let tags: Vec<_> = req.headers().get_all("x-tag").iter().collect();
        assert_eq!(tags, vec!["a", "b"]);
        assert!(!req.headers().contains_key("x-empty"));
        assert_eq!(req.url().query(), Some("q=a+b&n=1"));
        assert_eq!(req.topic(), "svc:8443/search");
    }

    #[test]
    fn test_json_body() {
        #[derive(Serialize)]
        struct Item {
            id: u32,
        }
        let req = Request::new([post("https://svc/items"), json(&Item { id: 7 })]).unwrap();
        assert_eq!(req.body().as_ref(), br#"{"id":7}"#);
        assert_eq!(req.headers()[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            Request::new([url("not a url")]),
            Err(PubError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Request::new([url("file:///tmp/x")]),
            Err(PubError::InvalidUrl { .. })
        ));
        assert!(matches!(
            Request::new([method("NOT VALID"), url("https://svc")]),
            Err(PubError::InvalidMethod(_))
        ));
        assert!(matches!(
            Request::new([url("https://svc"), header("bad name", "v")]),
            Err(PubError::InvalidHeader(_))
        ));
        assert!(matches!(
            Request::new([url("https://svc"), PubOption::Invalid("boom".into())]),
            Err(PubError::InvalidBody(_))
        ));
    }

    #[test]
    fn test_effective_budget_takes_minimum() {
        let req = Request::new([get("https://svc"), time_budget(Duration::from_secs(5))]).unwrap();
        assert_eq!(
            req.effective_budget(Some(Duration::from_secs(2))),
            Some(Duration::from_secs(2))
        );
        assert_eq!(req.effective_budget(None), Some(Duration::from_secs(5)));

        let unbounded = Request::new([get("https://svc"), time_budget(Duration::ZERO)]).unwrap();
        assert_eq!(
            unbounded.effective_budget(Some(Duration::from_secs(3))),
            Some(Duration::from_secs(3))
        );
        assert_eq!(unbounded.effective_budget(None), None);
    }

    #[test]
    fn test_to_message() {
        let req = Request::new([post("https://svc/echo"), body("ping"), header("Foo", "Bar")]).unwrap();
        let msg = req.to_message().unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.uri().unwrap().to_string(), "https://svc/echo");
        assert_eq!(msg.content_length(), Some(4));
        assert_eq!(msg.headers["foo"], "Bar");
    }
}
