//! Domain layer: rules, properties and errors.

pub mod error;
pub mod property;
pub mod rule;

pub use error::ConfigError;
pub use property::{default_value, description, secret, validation, ConfigProperty, PropertyOption};
pub use rule::{check_rule, parse_bool, parse_duration, validate, Bound, Range, Rule};
