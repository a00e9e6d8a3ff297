//! Queue-group options.

/// How instances of a service share a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubOption {
    /// Load-balance within the named group.
    Queue(String),
    /// Every instance receives every request.
    NoQueue,
    /// Load-balance within the group named after the service host.
    DefaultQueue,
}

pub fn queue(name: impl Into<String>) -> SubOption {
    SubOption::Queue(name.into())
}

pub fn no_queue() -> SubOption {
    SubOption::NoQueue
}

/// Alias of `no_queue`.
pub fn pervasive() -> SubOption {
    SubOption::NoQueue
}

pub fn default_queue() -> SubOption {
    SubOption::DefaultQueue
}

/// Alias of `default_queue`.
pub fn load_balanced() -> SubOption {
    SubOption::DefaultQueue
}
