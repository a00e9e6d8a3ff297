//! # Config Registry
//!
//! Holds the config properties of one service.

use crate::domain::{parse_bool, parse_duration, ConfigError, ConfigProperty, PropertyOption};
use crate::lookup::Lookup;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Invoked with the names of the properties whose value changed.
pub type ChangeCallback = Arc<dyn Fn(&[String]) + Send + Sync>;

/// The config properties of a service, keyed by name.
#[derive(Default)]
pub struct ConfigRegistry {
    properties: RwLock<BTreeMap<String, ConfigProperty>>,
    callbacks: RwLock<Vec<ChangeCallback>>,
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry")
            .field("properties", &self.names())
            .finish()
    }
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(
        &self,
        name: &str,
        options: impl IntoIterator<Item = PropertyOption>,
    ) -> Result<(), ConfigError> {
        let property = ConfigProperty::define(name, options)?;
        let mut properties = self.properties.write();
        if properties.contains_key(name) {
            return Err(ConfigError::Duplicate(name.to_string()));
        }
        debug!(name, default = %property.printable(), "Config defined");
        properties.insert(name.to_string(), property);
        Ok(())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.properties.read().contains_key(name)
    }

    /// Sorted property names.
    pub fn names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    pub fn property(&self, name: &str) -> Option<ConfigProperty> {
        self.properties.read().get(name).cloned()
    }

    /// The effective value, or `None` if the property is not defined.
    pub fn value(&self, name: &str) -> Option<String> {
        self.properties.read().get(name).map(|p| p.value().to_string())
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.value(name)?.parse().ok()
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.value(name)?.parse().ok()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        parse_bool(&self.value(name)?)
    }

    pub fn duration(&self, name: &str) -> Option<Duration> {
        parse_duration(&self.value(name)?)
    }

    /// Sets a value, firing change callbacks if the effective value changed.
    pub fn set(&self, name: &str, value: &str) -> Result<(), ConfigError> {
        let changed = {
            let mut properties = self.properties.write();
            let property = properties
                .get_mut(name)
                .ok_or_else(|| ConfigError::Undefined(name.to_string()))?;
            let changed = property.set(value)?;
            if changed {
                info!(name, value = %property.printable(), "Config changed");
            }
            changed
        };
        if changed {
            self.fire(&[name.to_string()]);
        }
        Ok(())
    }

    /// Reverts to the default value.
    pub fn reset(&self, name: &str) -> Result<(), ConfigError> {
        let changed = {
            let mut properties = self.properties.write();
            let property = properties
                .get_mut(name)
                .ok_or_else(|| ConfigError::Undefined(name.to_string()))?;
            property.reset()
        };
        if changed {
            self.fire(&[name.to_string()]);
        }
        Ok(())
    }

    /// Pulls every defined property from `lookup`. Values that fail
    /// validation are skipped with a warning. Returns the changed names.
    pub fn load(&self, lookup: &Lookup) -> Vec<String> {
        let mut changed = Vec::new();
        {
            let mut properties = self.properties.write();
            for (name, property) in properties.iter_mut() {
                let Some(value) = lookup.get(name) else {
                    continue;
                };
                match property.set(&value) {
                    Ok(true) => {
                        info!(name = %name, value = %property.printable(), "Config loaded");
                        changed.push(name.clone());
                    }
                    Ok(false) => {}
                    Err(e) => warn!(name = %name, error = %e, "Ignoring invalid config value"),
                }
            }
        }
        if !changed.is_empty() {
            self.fire(&changed);
        }
        changed
    }

    pub fn on_changed(&self, callback: impl Fn(&[String]) + Send + Sync + 'static) {
        self.callbacks.write().push(Arc::new(callback));
    }

    fn fire(&self, names: &[String]) {
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback(names);
        }
    }
}
