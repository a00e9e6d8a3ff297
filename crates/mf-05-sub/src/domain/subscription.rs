//! Subscription endpoint.
//!
//! Path specs are normalized against the service's default host:
//!
//! | Path                          | Endpoint                              |
//! |-------------------------------|---------------------------------------|
//! | `""`                          | `https://host:443`                    |
//! | `:P[/path]`                   | `https://host:P[/path]`               |
//! | `/path`                       | `https://host:443/path`               |
//! | `path`                        | `https://host:443/path`               |
//! | `scheme://h[:port][/path]`    | as given, port 443 (https) or 80 (http) by default |

use super::error::SubError;
use super::options::SubOption;
use lazy_static::lazy_static;
use regex::Regex;
use shared_types::topic;
use std::fmt;

lazy_static! {
    static ref QUEUE_NAME: Regex = Regex::new(r"^[a-zA-Z0-9.]+$").expect("queue pattern is valid");
}

const DEFAULT_SCHEME: &str = "https";
const DEFAULT_PORT: u16 = 443;

/// A parsed subscription endpoint and its queue policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    scheme: String,
    host: String,
    port: u16,
    path: String,
    queue: Option<String>,
    default_host: String,
}

/// Parses `path_spec` against `default_host` and applies `options` in order.
/// The queue defaults to the service host.
pub fn new_sub(
    default_host: &str,
    path_spec: &str,
    options: impl IntoIterator<Item = SubOption>,
) -> Result<Subscription, SubError> {
    let mut sub = Subscription::parse(default_host, path_spec)?;
    for option in options {
        sub.apply(option)?;
    }
    Ok(sub)
}

impl Subscription {
    pub fn parse(default_host: &str, path_spec: &str) -> Result<Self, SubError> {
        let default_host = default_host.to_ascii_lowercase();
        let local = |port: u16, path: &str| {
            if default_host.is_empty() {
                return Err(SubError::MissingHost);
            }
            Ok(Self {
                scheme: DEFAULT_SCHEME.to_string(),
                host: default_host.clone(),
                port,
                path: path.to_string(),
                queue: Some(default_host.clone()),
                default_host: default_host.clone(),
            })
        };

        if path_spec.is_empty() {
            return local(DEFAULT_PORT, "");
        }
        if let Some(rest) = path_spec.strip_prefix(':') {
            let (port, path) = split_path(rest);
            return local(parse_port(port)?, path);
        }
        if path_spec.starts_with('/') {
            return local(DEFAULT_PORT, path_spec);
        }
        let Some((scheme, rest)) = path_spec.split_once("://") else {
            return local(DEFAULT_PORT, &format!("/{}", path_spec));
        };

        let valid_scheme = scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if scheme.is_empty() || !valid_scheme {
            return Err(SubError::InvalidSpec(path_spec.to_string()));
        }
        let scheme = scheme.to_ascii_lowercase();
        let (authority, path) = split_path(rest);
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, parse_port(port)?),
            None => (authority, if scheme == "http" { 80 } else { DEFAULT_PORT }),
        };
        if host.is_empty() {
            return Err(SubError::MissingHost);
        }
        if host.contains(|c: char| c.is_whitespace() || c == '@') {
            return Err(SubError::InvalidSpec(path_spec.to_string()));
        }

        Ok(Self {
            scheme,
            host: host.to_ascii_lowercase(),
            port,
            path: path.to_string(),
            queue: Some(default_host.clone()),
            default_host,
        })
    }

    pub fn apply(&mut self, option: SubOption) -> Result<(), SubError> {
        match option {
            SubOption::Queue(name) => {
                if !QUEUE_NAME.is_match(&name) {
                    return Err(SubError::InvalidQueue(name));
                }
                self.queue = Some(name);
            }
            SubOption::NoQueue => self.queue = None,
            SubOption::DefaultQueue => self.queue = Some(self.default_host.clone()),
        }
        Ok(())
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Queue group, `None` when every instance receives every request.
    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref().filter(|q| !q.is_empty())
    }

    pub fn is_pervasive(&self) -> bool {
        self.queue().is_none()
    }

    /// Canonical URL, with the port always explicit.
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }

    /// Bus subject: `host:port/path`. An empty path is rendered as the root
    /// `/`, matching the topic of a request to `scheme://host:port`.
    pub fn topic(&self) -> String {
        topic(&self.host, self.port, &self.path)
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

fn split_path(s: &str) -> (&str, &str) {
    match s.find('/') {
        Some(i) => s.split_at(i),
        None => (s, ""),
    }
}

fn parse_port(s: &str) -> Result<u16, SubError> {
    s.parse::<u16>()
        .map_err(|_| SubError::InvalidPort(s.to_string()))
}
