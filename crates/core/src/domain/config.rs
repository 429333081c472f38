// Flat component configuration (one map per source / output)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::error::{DomainError, Result};

/// String-keyed settings for one source or output.
///
/// Lookups fall back to agent-wide defaults, so keys such as `ssh_username`
/// can be set once at the top level of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(flatten)]
    values: Map<String, Value>,
    #[serde(skip)]
    defaults: Option<Arc<Map<String, Value>>>,
}

impl ComponentConfig {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values,
            defaults: None,
        }
    }

    /// Build from a JSON object literal (mostly for tests)
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self::new(values)),
            other => Err(DomainError::ValidationError(format!(
                "component configuration must be a map, got {}",
                other
            ))),
        }
    }

    pub fn with_defaults(mut self, defaults: Arc<Map<String, Value>>) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Raw lookup: own keys first, then agent-wide defaults
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values
            .get(key)
            .or_else(|| self.defaults.as_ref().and_then(|d| d.get(key)))
            .filter(|v| !v.is_null())
    }

    /// Lookup restricted to this component's own keys
    pub fn get_local(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(invalid(key, format!("expected a string, got {}", other))),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String> {
        self.str(key)?
            .ok_or_else(|| DomainError::MissingSetting(key.to_string()))
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| invalid(key, "not representable as a float")),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|e| invalid(key, e.to_string())),
            Some(other) => Err(invalid(key, format!("expected a number, got {}", other))),
        }
    }

    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64> {
        Ok(self.f64(key)?.unwrap_or(default))
    }

    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64> {
        match self.f64(key)? {
            None => Ok(default),
            Some(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as u64),
            Some(v) => Err(invalid(key, format!("expected a non-negative integer, got {}", v))),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(true),
                "false" | "no" | "off" | "0" => Ok(false),
                _ => Err(invalid(key, format!("expected a boolean, got '{}'", s))),
            },
            Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(0.0) != 0.0),
            Some(other) => Err(invalid(key, format!("expected a boolean, got {}", other))),
        }
    }

    /// A list given either as a YAML sequence or as a `sep`-separated string
    pub fn list(&self, key: &str, sep: char) -> Result<Vec<String>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s
                .split(sep)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.trim().to_string()),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(invalid(key, format!("unsupported list item {}", other))),
                })
                .collect(),
            Some(other) => Err(invalid(key, format!("expected a list, got {}", other))),
        }
    }

    /// A string-to-string map; non-string scalars are stringified
    pub fn string_map(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(obj)) => Ok(Some(
                obj.iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), v)
                    })
                    .collect(),
            )),
            Some(other) => Err(invalid(key, format!("expected a map, got {}", other))),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> DomainError {
    DomainError::InvalidSetting {
        key: key.to_string(),
        reason: reason.into(),
    }
}
