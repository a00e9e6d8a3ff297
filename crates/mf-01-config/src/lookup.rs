//! # Config Lookup
//!
//! Resolves a key in priority order:
//!
//! 1. The in-memory stack (`push_env` / `pop_env`)
//! 2. A file mapping supplied by the caller
//! 3. The process environment
//!
//! Keys are case-sensitive. The in-memory stack is process-wide and exists
//! so tests can override configuration without touching the environment.

use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::env;

lazy_static! {
    static ref ENV_STACK: Mutex<HashMap<String, Vec<String>>> = Mutex::new(HashMap::new());
}

/// Pushes an override for `key` on the process-wide stack.
pub fn push_env(key: &str, value: &str) {
    ENV_STACK
        .lock()
        .entry(key.to_string())
        .or_default()
        .push(value.to_string());
}

/// Pops the most recent override for `key`.
pub fn pop_env(key: &str) -> Option<String> {
    let mut stack = ENV_STACK.lock();
    let values = stack.get_mut(key)?;
    let popped = values.pop();
    if values.is_empty() {
        stack.remove(key);
    }
    popped
}

fn stacked(key: &str) -> Option<String> {
    ENV_STACK.lock().get(key).and_then(|v| v.last().cloned())
}

/// Layered key lookup.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    file: HashMap<String, String>,
}

impl Lookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file mapping below the in-memory stack.
    pub fn with_file(mut self, mapping: HashMap<String, String>) -> Self {
        self.file.extend(mapping);
        self
    }

    /// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped and
    /// surrounding quotes are removed from values.
    pub fn parse_env_file(content: &str) -> HashMap<String, String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                Some((key.trim().to_string(), value.to_string()))
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        stacked(key)
            .or_else(|| self.file.get(key).cloned())
            .or_else(|| env::var(key).ok())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}
