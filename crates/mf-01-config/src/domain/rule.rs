//! # Validation Rules
//!
//! A rule is `<type>[ <spec>]`. The type is case-insensitive and has
//! synonyms; the spec depends on the type.
//!
//! | Type    | Synonyms                  | Spec                   |
//! |---------|---------------------------|------------------------|
//! | `str`   | `string`, `text`, empty   | optional regex         |
//! | `bool`  | `boolean`                 | none                   |
//! | `int`   | `integer`, `long`         | optional range         |
//! | `float` | `double`, `decimal`, `number` | optional range     |
//! | `dur`   | `duration`                | optional range         |
//! | `set`   |                           | `A\|B\|C` (required)   |
//! | `url`   |                           | none                   |
//! | `email` |                           | none                   |
//! | `json`  |                           | none                   |
//!
//! Ranges use `[` / `(` for a closed / open low bound and `]` / `)` for a
//! closed / open high bound. Either bound may be omitted: `[0,)`, `(,10]`.

use super::error::ConfigError;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^.+@.+\..{2,}$").expect("email pattern is valid");
}

const TRUE_VALUES: [&str; 6] = ["1", "t", "T", "TRUE", "true", "True"];
const FALSE_VALUES: [&str; 6] = ["0", "f", "F", "FALSE", "false", "False"];

/// One end of a range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound<T> {
    pub value: T,
    pub inclusive: bool,
}

/// A range with optional bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    pub low: Option<Bound<T>>,
    pub high: Option<Bound<T>>,
}

impl<T> Default for Range<T> {
    fn default() -> Self {
        Self {
            low: None,
            high: None,
        }
    }
}

impl<T: PartialOrd + Copy> Range<T> {
    pub fn contains(&self, v: T) -> bool {
        let above = match self.low {
            Some(Bound { value, inclusive: true }) => v >= value,
            Some(Bound { value, inclusive: false }) => v > value,
            None => true,
        };
        let below = match self.high {
            Some(Bound { value, inclusive: true }) => v <= value,
            Some(Bound { value, inclusive: false }) => v < value,
            None => true,
        };
        above && below
    }

    fn parse(rule: &str, spec: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Self, ConfigError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(Self::default());
        }

        let low_inclusive = match spec.chars().next() {
            Some('[') => true,
            Some('(') => false,
            _ => return Err(ConfigError::rule(rule, "range must start with [ or (")),
        };
        let high_inclusive = match spec.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(ConfigError::rule(rule, "range must end with ] or )")),
        };
        if spec.len() < 2 {
            return Err(ConfigError::rule(rule, "range is empty"));
        }

        let inner = &spec[1..spec.len() - 1];
        let (low, high) = inner
            .split_once(',')
            .ok_or_else(|| ConfigError::rule(rule, "range must have two comma-separated bounds"))?;
        if high.contains(',') {
            return Err(ConfigError::rule(rule, "range has too many bounds"));
        }

        let bound = |text: &str, inclusive: bool| -> Result<Option<Bound<T>>, ConfigError> {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            let value = parse(text)
                .ok_or_else(|| ConfigError::rule(rule, format!("invalid bound {:?}", text)))?;
            Ok(Some(Bound { value, inclusive }))
        };

        Ok(Self {
            low: bound(low, low_inclusive)?,
            high: bound(high, high_inclusive)?,
        })
    }
}

/// A parsed validation rule.
#[derive(Debug, Clone)]
pub enum Rule {
    Str(Option<Regex>),
    Bool,
    Int(Range<i64>),
    Float(Range<f64>),
    Dur(Range<Duration>),
    Set(Vec<String>),
    Url,
    Email,
    Json,
}

impl Rule {
    /// Parses a rule string. This is the rule check.
    pub fn parse(rule: &str) -> Result<Self, ConfigError> {
        let trimmed = rule.trim();
        let (kind, spec) = match trimmed.split_once(char::is_whitespace) {
            Some((kind, spec)) => (kind, spec.trim()),
            None => (trimmed, ""),
        };

        let no_spec = |parsed: Rule| {
            if spec.is_empty() {
                Ok(parsed)
            } else {
                Err(ConfigError::rule(rule, format!("{} takes no spec", kind)))
            }
        };

        match kind.to_lowercase().as_str() {
            "" | "str" | "string" | "text" => {
                if spec.is_empty() {
                    return Ok(Self::Str(None));
                }
                Regex::new(spec)
                    .map(|re| Self::Str(Some(re)))
                    .map_err(|e| ConfigError::rule(rule, e.to_string()))
            }
            "bool" | "boolean" => no_spec(Self::Bool),
            "int" | "integer" | "long" => {
                Range::parse(rule, spec, |s| s.parse::<i64>().ok()).map(Self::Int)
            }
            "float" | "double" | "decimal" | "number" => {
                Range::parse(rule, spec, |s| s.parse::<f64>().ok().filter(|f| !f.is_nan()))
                    .map(Self::Float)
            }
            "dur" | "duration" => Range::parse(rule, spec, parse_duration).map(Self::Dur),
            "set" => {
                if spec.is_empty() {
                    return Err(ConfigError::rule(rule, "set requires a spec"));
                }
                Ok(Self::Set(spec.split('|').map(str::to_string).collect()))
            }
            "url" => no_spec(Self::Url),
            "email" => no_spec(Self::Email),
            "json" => no_spec(Self::Json),
            other => Err(ConfigError::rule(rule, format!("unknown type {:?}", other))),
        }
    }

    /// Tests a value against the rule.
    pub fn validate(&self, value: &str) -> bool {
        match self {
            Self::Str(None) => true,
            Self::Str(Some(re)) => re.is_match(value),
            Self::Bool => parse_bool(value).is_some(),
            Self::Int(range) => value.parse::<i64>().is_ok_and(|v| range.contains(v)),
            Self::Float(range) => value
                .parse::<f64>()
                .is_ok_and(|v| !v.is_nan() && range.contains(v)),
            Self::Dur(range) => parse_duration(value).is_some_and(|v| range.contains(v)),
            Self::Set(options) => options.iter().any(|o| o == value),
            Self::Url => url::Url::parse(value)
                .is_ok_and(|u| u.host_str().is_some_and(|h| !h.is_empty())),
            Self::Email => EMAIL.is_match(email_address(value)),
            Self::Json => serde_json::from_str::<serde_json::Value>(value).is_ok(),
        }
    }
}

impl FromStr for Rule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(None) => write!(f, "str"),
            Self::Str(Some(re)) => write!(f, "str {}", re.as_str()),
            Self::Bool => write!(f, "bool"),
            Self::Int(_) => write!(f, "int"),
            Self::Float(_) => write!(f, "float"),
            Self::Dur(_) => write!(f, "dur"),
            Self::Set(options) => write!(f, "set {}", options.join("|")),
            Self::Url => write!(f, "url"),
            Self::Email => write!(f, "email"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Validates a rule string.
pub fn check_rule(rule: &str) -> Result<(), ConfigError> {
    Rule::parse(rule).map(|_| ())
}

/// Tests a value against a rule string. An invalid rule validates nothing.
pub fn validate(rule: &str, value: &str) -> bool {
    Rule::parse(rule).is_ok_and(|r| r.validate(value))
}

/// Parses `1`, `t`, `true`, `0`, `f`, `false` and their capitalized forms.
pub fn parse_bool(value: &str) -> Option<bool> {
    if TRUE_VALUES.contains(&value) {
        Some(true)
    } else if FALSE_VALUES.contains(&value) {
        Some(false)
    } else {
        None
    }
}

/// Parses duration literals such as `250ms`, `1h30m` or `1us`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value == "0" {
        return Some(Duration::ZERO);
    }
    humantime::parse_duration(value).ok()
}

/// `Name <addr>` and `<addr>` yield `addr`.
fn email_address(value: &str) -> &str {
    let value = value.trim();
    match (value.rfind('<'), value.ends_with('>')) {
        (Some(open), true) => &value[open + 1..value.len() - 1],
        _ => value,
    }
}
