//! Harness configuration loaded from TOML.
//!
//! ```toml
//! timeout_ms = 5000
//! interval_ms = 100
//! exact = false
//!
//! [bindings]
//! namespace = "default"
//! replicas = 3
//! ```

use crate::errors::{HarnessError, HarnessResult};
use kube_assert::{Bindings, CheckOptions, Mapping, MatchMode, Value};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Polling and matching configuration for the harness.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Overall deadline for one `eventually` / `consistently` run.
    pub timeout_ms: u64,
    /// Pause between polls.
    pub interval_ms: u64,
    /// Report actual fields the template does not declare.
    pub exact: bool,
    /// Default bindings for every template.
    pub bindings: toml::Table,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            interval_ms: 100,
            exact: false,
            bindings: toml::Table::new(),
        }
    }
}

impl HarnessConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| HarnessError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| HarnessError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn mode(&self) -> MatchMode {
        if self.exact {
            MatchMode::Exact
        } else {
            MatchMode::Subset
        }
    }

    /// The `[bindings]` table as a binding environment.
    pub fn bindings(&self) -> Bindings {
        self.bindings
            .iter()
            .map(|(name, value)| (name.as_str(), toml_to_value(value)))
            .collect()
    }

    /// Options for one check call; the store deadline is set per poll.
    pub fn check_options(&self) -> CheckOptions {
        CheckOptions::new()
            .bindings(&self.bindings())
            .mode(self.mode())
    }
}

fn toml_to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::from(s.as_str()),
        toml::Value::Integer(n) => Value::from(*n),
        toml::Value::Float(n) => Value::from(*n),
        toml::Value::Boolean(b) => Value::from(*b),
        toml::Value::Datetime(dt) => Value::from(dt.to_string()),
        toml::Value::Array(items) => {
            Value::from(items.iter().map(toml_to_value).collect::<Vec<_>>())
        }
        toml::Value::Table(table) => Value::from(
            table
                .iter()
                .map(|(key, value)| (key.as_str(), toml_to_value(value)))
                .collect::<Mapping>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("harness.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.mode(), MatchMode::Subset);
    }

    #[test]
    fn test_load_with_bindings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
timeout_ms = 250
exact = true

[bindings]
namespace = "default"
replicas = 3
teams = ["x", "y"]

[bindings.owner]
name = "ops"
"#
        )
        .unwrap();

        let config = HarnessConfig::load(file.path()).unwrap();
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.interval_ms, 100);
        assert_eq!(config.mode(), MatchMode::Exact);

        let bindings = config.bindings();
        assert_eq!(bindings.get("namespace"), Some(&Value::from("default")));
        assert_eq!(bindings.get("replicas"), Some(&Value::from(3i64)));
        assert_eq!(
            bindings.get("teams"),
            Some(&Value::from(vec![Value::from("x"), Value::from("y")]))
        );
        assert_eq!(
            bindings.get("owner").and_then(|o| o.get("name")),
            Some(&Value::from("ops"))
        );
    }

    #[test]
    fn test_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "timeout_ms = \"soon\"\n").unwrap();
        let error = HarnessConfig::load(file.path()).unwrap_err();
        assert!(matches!(error, HarnessError::Config { .. }));
    }

    #[test]
    fn test_check_options() {
        let mut config = HarnessConfig::default().with_exact(true);
        config
            .bindings
            .insert("ns".to_string(), toml::Value::String("default".into()));
        let options = config.check_options();
        assert_eq!(options.mode, MatchMode::Exact);
        assert_eq!(options.bindings.get("ns"), Some(&Value::from("default")));
        assert_eq!(options.deadline, None);
    }
}
