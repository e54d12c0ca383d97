//! Typed configuration values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use crate::error::{ConfigError, ConfigResult};

/// A variable value taken from a project configuration.
///
/// Only shapes that have a literal form in the provisioning tool's variable
/// syntax are representable; everything else is rejected while loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Convert a YAML value, using `key` to name the offending entry on error.
    pub fn from_yaml(value: Value, key: &str) -> ConfigResult<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else if n.is_f64() {
                    match n.as_f64() {
                        Some(f) if f.is_finite() => Ok(Self::Float(f)),
                        _ => Err(unsupported(key, "non-finite numbers have no literal form")),
                    }
                } else {
                    Err(unsupported(key, "integer is out of range"))
                }
            }
            Value::String(s) => Ok(Self::String(s)),
            Value::Sequence(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| Self::from_yaml(item, &format!("{}[{}]", key, i)))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Self::List),
            Value::Mapping(mapping) => {
                let mut map = BTreeMap::new();
                for (k, v) in mapping {
                    let name = scalar_key(&k).ok_or_else(|| {
                        unsupported(key, "map keys must be strings, numbers or booleans")
                    })?;
                    let child = Self::from_yaml(v, &format!("{}.{}", key, name))?;
                    map.insert(name, child);
                }
                Ok(Self::Map(map))
            }
            Value::Null => Err(unsupported(key, "null values are not supported")),
            Value::Tagged(tagged) => Err(unsupported(
                key,
                &format!("tagged value {} is not supported", tagged.tag),
            )),
        }
    }

    /// Short name of the variant, used in messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Render a YAML scalar used as a map key.
pub(crate) fn scalar_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn unsupported(key: &str, reason: &str) -> ConfigError {
    ConfigError::UnsupportedValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

impl<'de> Deserialize<'de> for ConfigValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_yaml(value, "value").map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::String(s) => write!(f, "{}", s),
            Self::List(items) => write!(f, "<list of {}>", items.len()),
            Self::Map(map) => write!(f, "<map of {}>", map.len()),
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigValue {
    fn from(value: BTreeMap<String, ConfigValue>) -> Self {
        Self::Map(value)
    }
}
