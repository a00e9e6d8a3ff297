//! Config property definition.

use super::error::ConfigError;
use super::rule::Rule;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("name pattern is valid");
}

/// Options of `ConfigProperty::define`, applied in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyOption {
    Description(String),
    DefaultValue(String),
    Validation(String),
    Secret,
}

pub fn description(text: impl Into<String>) -> PropertyOption {
    PropertyOption::Description(text.into())
}

pub fn default_value(value: impl Into<String>) -> PropertyOption {
    PropertyOption::DefaultValue(value.into())
}

pub fn validation(rule: impl Into<String>) -> PropertyOption {
    PropertyOption::Validation(rule.into())
}

pub fn secret() -> PropertyOption {
    PropertyOption::Secret
}

/// A typed, validated configuration property.
#[derive(Debug, Clone)]
pub struct ConfigProperty {
    name: String,
    description: String,
    default_value: String,
    validation: String,
    rule: Rule,
    secret: bool,
    value: Option<String>,
}

impl ConfigProperty {
    /// Defines a property. The default is checked against the rule after all
    /// options are applied, so option order does not matter.
    pub fn define(
        name: &str,
        options: impl IntoIterator<Item = PropertyOption>,
    ) -> Result<Self, ConfigError> {
        if !NAME.is_match(name) {
            return Err(ConfigError::InvalidName(name.to_string()));
        }

        let mut property = Self {
            name: name.to_string(),
            description: String::new(),
            default_value: String::new(),
            validation: String::new(),
            rule: Rule::Str(None),
            secret: false,
            value: None,
        };
        for option in options {
            match option {
                PropertyOption::Description(text) => property.description = text,
                PropertyOption::DefaultValue(value) => property.default_value = value,
                PropertyOption::Validation(rule) => {
                    property.rule = Rule::parse(&rule)?;
                    property.validation = rule;
                }
                PropertyOption::Secret => property.secret = true,
            }
        }

        if !property.default_value.is_empty() && !property.rule.validate(&property.default_value) {
            return Err(ConfigError::InvalidDefault {
                name: property.name,
                rule: property.validation,
            });
        }
        Ok(property)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_value(&self) -> &str {
        &self.default_value
    }

    pub fn validation(&self) -> &str {
        &self.validation
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    /// The current value if it is set and still valid, else the default.
    pub fn value(&self) -> &str {
        match &self.value {
            Some(v) if self.rule.validate(v) => v,
            _ => &self.default_value,
        }
    }

    pub fn validate(&self, value: &str) -> bool {
        self.rule.validate(value)
    }

    /// Sets the current value. Returns whether the effective value changed.
    pub fn set(&mut self, value: &str) -> Result<bool, ConfigError> {
        if !self.rule.validate(value) {
            return Err(ConfigError::InvalidValue {
                name: self.name.clone(),
                rule: self.validation.clone(),
            });
        }
        let before = self.value().to_string();
        self.value = Some(value.to_string());
        Ok(before != self.value())
    }

    /// Clears the current value. Returns whether the effective value changed.
    pub fn reset(&mut self) -> bool {
        let before = self.value().to_string();
        self.value = None;
        before != self.value()
    }

    /// The value as it may appear in logs.
    pub fn printable(&self) -> &str {
        if self.secret {
            "***"
        } else {
            self.value()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_validates_default_regardless_of_order() {
        let err = ConfigProperty::define("Port", [default_value("99999"), validation("int [1,65535]")]);
        assert!(matches!(err, Err(ConfigError::InvalidDefault { .. })));

        let err = ConfigProperty::define("Port", [validation("int [1,65535]"), default_value("99999")]);
        assert!(matches!(err, Err(ConfigError::InvalidDefault { .. })));

        let ok = ConfigProperty::define(
            "Port",
            [
                description("Listening port"),
                default_value("8080"),
                validation("int [1,65535]"),
            ],
        )
        .unwrap();
        assert_eq!(ok.value(), "8080");
        assert_eq!(ok.description(), "Listening port");
    }

    #[test]
    fn test_define_rejects_bad_rule_and_name() {
        assert!(matches!(
            ConfigProperty::define("X", [validation("int [a,b]")]),
            Err(ConfigError::InvalidRule { .. })
        ));
        assert!(matches!(
            ConfigProperty::define("bad name", []),
            Err(ConfigError::InvalidName(_))
        ));
    }

    #[test]
    fn test_set_and_reset() {
        let mut p = ConfigProperty::define("Color", [validation("set Red|Green"), default_value("Red")])
            .unwrap();
        assert!(p.set("Blue").is_err());
        assert_eq!(p.value(), "Red");

        assert!(p.set("Green").unwrap());
        assert!(!p.set("Green").unwrap());
        assert_eq!(p.value(), "Green");

        assert!(p.reset());
        assert_eq!(p.value(), "Red");
    }

    #[test]
    fn test_secret_is_masked() {
        let mut p = ConfigProperty::define("Password", [secret()]).unwrap();
        p.set("hunter2").unwrap();
        assert_eq!(p.value(), "hunter2");
        assert_eq!(p.printable(), "***");
    }
}
