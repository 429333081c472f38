// Agent configuration file
//
// YAML layered with DUCT_* environment variables. Keys the agent does not
// know itself become defaults that every source and output can fall back to.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use duct_core::domain::settings::{DEFAULT_SOURCE_INTERVAL, DEFAULT_TTL};
use duct_core::domain::ComponentConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/duct/duct.yml";

fn default_interval() -> f64 {
    DEFAULT_SOURCE_INTERVAL
}

fn default_ttl() -> f64 {
    DEFAULT_TTL
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Default source interval (seconds)
    #[serde(default = "default_interval")]
    pub interval: f64,

    /// Default event ttl (seconds)
    #[serde(default = "default_ttl")]
    pub ttl: f64,

    /// Hostname stamped on events; the system hostname when absent
    #[serde(default)]
    pub hostname: Option<String>,

    /// Silence the SSH substrate's own log lines
    #[serde(default)]
    pub ssh_quiet: bool,

    #[serde(default)]
    pub sources: Vec<Map<String, Value>>,

    #[serde(default)]
    pub outputs: Vec<Map<String, Value>>,

    #[serde(flatten)]
    pub globals: Map<String, Value>,
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();

        Config::builder()
            .add_source(File::new(&expanded, FileFormat::Yaml))
            .add_source(Environment::with_prefix("DUCT").try_parsing(true))
            .build()
            .with_context(|| format!("reading {}", expanded))?
            .try_deserialize()
            .with_context(|| format!("parsing {}", expanded))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(contents, FileFormat::Yaml))
            .build()?
            .try_deserialize()
            .context("parsing configuration")
    }

    /// Defaults seen by sources: the globals plus the agent interval and ttl
    pub fn source_defaults(&self) -> Arc<Map<String, Value>> {
        let mut defaults = self.globals.clone();
        defaults.insert("interval".to_string(), Value::from(self.interval));
        defaults.insert("ttl".to_string(), Value::from(self.ttl));
        Arc::new(defaults)
    }

    /// Defaults seen by outputs. The agent interval is a source setting and
    /// must not leak into output flush intervals.
    pub fn output_defaults(&self) -> Arc<Map<String, Value>> {
        Arc::new(self.globals.clone())
    }

    pub fn source_configs(&self) -> Vec<ComponentConfig> {
        let defaults = self.source_defaults();
        self.sources
            .iter()
            .map(|values| ComponentConfig::new(values.clone()).with_defaults(Arc::clone(&defaults)))
            .collect()
    }

    pub fn output_configs(&self) -> Vec<ComponentConfig> {
        let defaults = self.output_defaults();
        self.outputs
            .iter()
            .map(|values| ComponentConfig::new(values.clone()).with_defaults(Arc::clone(&defaults)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duct_core::domain::{OutputSettings, SourceSettings};
    use std::time::Duration;

    const YAML: &str = r#"
interval: 30
ttl: 90
ssh_username: monitor
ssh_key: "-----BEGIN KEY-----"
sources:
  - source: load
    service: load
  - source: command
    service: disk
    interval: 5
    command: check_disk
outputs:
  - output: logger
"#;

    #[test]
    fn test_agent_settings() {
        let config = AgentConfig::from_yaml(YAML).unwrap();

        assert_eq!(config.interval, 30.0);
        assert_eq!(config.ttl, 90.0);
        assert!(!config.ssh_quiet);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.outputs.len(), 1);
        assert_eq!(config.globals.get("ssh_username"), Some(&Value::from("monitor")));
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = AgentConfig::from_yaml("{}").unwrap();

        assert_eq!(config.interval, DEFAULT_SOURCE_INTERVAL);
        assert_eq!(config.ttl, DEFAULT_TTL);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_sources_inherit_agent_interval_and_globals() {
        let config = AgentConfig::from_yaml(YAML).unwrap();
        let sources = config.source_configs();

        let load = SourceSettings::from_config(&sources[0], "web01").unwrap();
        assert_eq!(load.interval, Duration::from_secs(30));
        assert_eq!(load.ttl, 90.0);

        let disk = SourceSettings::from_config(&sources[1], "web01").unwrap();
        assert_eq!(disk.interval, Duration::from_secs(5));

        assert_eq!(sources[0].str("ssh_username").unwrap().as_deref(), Some("monitor"));
    }

    #[test]
    fn test_outputs_keep_their_own_interval() {
        let config = AgentConfig::from_yaml(YAML).unwrap();
        let outputs = config.output_configs();

        let settings = OutputSettings::from_config(&outputs[0]).unwrap();
        assert_eq!(settings, OutputSettings::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("duct.yml");
        std::fs::write(&path, YAML).unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.sources.len(), 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AgentConfig::load(Path::new("/nonexistent/duct.yml")).is_err());
    }
}
