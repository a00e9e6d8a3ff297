//! # MF-01 Config
//!
//! Typed configuration properties for fabric services.
//!
//! ## Overview
//!
//! A service defines its properties at startup with a description, a default
//! value, a validation rule and a secret flag. Values arrive later from the
//! layered `Lookup` or from a configurator calling `set`. A value that fails
//! its rule is rejected; a stored value that no longer validates reads as the
//! default.
//!
//! ```rust,ignore
//! use mf_01_config::{default_value, validation, ConfigRegistry, Lookup};
//!
//! let registry = ConfigRegistry::new();
//! registry.define("Workers", [validation("int [1,64]"), default_value("4")])?;
//! registry.load(&Lookup::new());
//! let workers = registry.int("Workers");
//! ```
//!
//! ## Rule Language
//!
//! See [`domain::rule`] for the grammar.

pub mod domain;
pub mod lookup;
pub mod service;

pub use domain::*;
pub use lookup::{pop_env, push_env, Lookup};
pub use service::{ChangeCallback, ConfigRegistry};
