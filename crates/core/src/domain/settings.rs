// Typed settings parsed from a ComponentConfig

use std::collections::BTreeMap;
use std::time::Duration;

use super::config::ComponentConfig;
use super::error::{DomainError, Result};
use super::event::EventTemplate;

/// Default polling interval for sources (seconds)
pub const DEFAULT_SOURCE_INTERVAL: f64 = 60.0;

/// Default event ttl (seconds)
pub const DEFAULT_TTL: f64 = 60.0;

/// Default flush interval for outputs (seconds)
pub const DEFAULT_OUTPUT_INTERVAL: f64 = 1.0;

/// Default output backlog bound (events)
pub const DEFAULT_OUTPUT_MAXSIZE: usize = 250_000;

/// Default output rate (events per second)
pub const DEFAULT_OUTPUT_MAXRATE: f64 = 100.0;

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default trust-on-first-use store
pub const DEFAULT_KNOWN_HOSTS_FILE: &str = "/var/lib/duct/known_hosts";

/// Source configuration
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub service: String,
    pub interval: Duration,
    pub ttl: f64,
    pub tags: Vec<String>,
    pub attributes: Option<BTreeMap<String, String>>,
    pub hostname: String,
    pub use_ssh: bool,
    pub sync: bool,
    pub debug: bool,
}

impl SourceSettings {
    /// Parse source settings; `default_hostname` applies when no `hostname` key is set
    pub fn from_config(config: &ComponentConfig, default_hostname: &str) -> Result<Self> {
        let service = config.require_str("service")?;
        let interval = config.f64_or("interval", DEFAULT_SOURCE_INTERVAL)?;
        if interval <= 0.0 || !interval.is_finite() {
            return Err(DomainError::InvalidSetting {
                key: "interval".to_string(),
                reason: format!("must be a positive number of seconds, got {}", interval),
            });
        }

        let hostname = config
            .str("hostname")?
            .unwrap_or_else(|| default_hostname.to_string());

        Ok(Self {
            service,
            interval: Duration::from_secs_f64(interval),
            ttl: config.f64_or("ttl", DEFAULT_TTL)?,
            tags: config.list("tags", ',')?,
            attributes: config.string_map("attributes")?,
            hostname,
            use_ssh: config.bool_or("use_ssh", false)?,
            sync: config.bool_or("sync", false)?,
            debug: config.bool_or("debug", false)?,
        })
    }

    pub fn event_template(&self) -> EventTemplate {
        EventTemplate {
            service: self.service.clone(),
            hostname: self.hostname.clone(),
            ttl: self.ttl,
            tags: self.tags.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// Output queue configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub interval: Duration,
    /// Backlog bound; 0 means unbounded
    pub maxsize: usize,
    /// Events per second; <= 0 means unlimited
    pub maxrate: f64,
}

impl OutputSettings {
    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        let interval = config.f64_or("interval", DEFAULT_OUTPUT_INTERVAL)?;
        if interval <= 0.0 || !interval.is_finite() {
            return Err(DomainError::InvalidSetting {
                key: "interval".to_string(),
                reason: format!("must be a positive number of seconds, got {}", interval),
            });
        }

        Ok(Self {
            interval: Duration::from_secs_f64(interval),
            maxsize: config.u64_or("maxsize", DEFAULT_OUTPUT_MAXSIZE as u64)? as usize,
            maxrate: config.f64_or("maxrate", DEFAULT_OUTPUT_MAXRATE)?,
        })
    }

    /// Maximum number of events removed per flush; `None` drains the whole backlog.
    ///
    /// A positive rate that rounds down to zero still allows one event per
    /// flush rather than lifting the limit.
    pub fn queue_depth(&self) -> Option<usize> {
        if self.maxrate <= 0.0 {
            return None;
        }
        let depth = (self.maxrate * self.interval.as_secs_f64()).floor() as usize;
        Some(depth.max(1))
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs_f64(DEFAULT_OUTPUT_INTERVAL),
            maxsize: DEFAULT_OUTPUT_MAXSIZE,
            maxrate: DEFAULT_OUTPUT_MAXRATE,
        }
    }
}

/// Remote target and credentials for a source with `use_ssh`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub key: Option<String>,
    pub keyfile: Option<String>,
    pub keypass: Option<String>,
    pub known_hosts_file: String,
}

impl RemoteSettings {
    /// Parse remote settings; `ssh_host` defaults to the source hostname
    pub fn from_config(config: &ComponentConfig, source_hostname: &str) -> Result<Self> {
        let host = config
            .str("ssh_host")?
            .unwrap_or_else(|| source_hostname.to_string());

        let port = config.u64_or("ssh_port", DEFAULT_SSH_PORT as u64)?;
        let port = u16::try_from(port).map_err(|_| DomainError::InvalidSetting {
            key: "ssh_port".to_string(),
            reason: format!("{} is not a valid port", port),
        })?;

        let username = config
            .str("ssh_username")?
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DomainError::MissingSetting("ssh_username".to_string()))?;

        let settings = Self {
            host,
            port,
            username,
            password: config.str("ssh_password")?.filter(|s| !s.is_empty()),
            key: config.str("ssh_key")?.filter(|s| !s.is_empty()),
            keyfile: config.str("ssh_keyfile")?.filter(|s| !s.is_empty()),
            keypass: config.str("ssh_keypass")?.filter(|s| !s.is_empty()),
            known_hosts_file: config
                .str("ssh_knownhosts_file")?
                .unwrap_or_else(|| DEFAULT_KNOWN_HOSTS_FILE.to_string()),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// At least one credential must be present
    pub fn validate(&self) -> Result<()> {
        if self.password.is_none() && self.key.is_none() && self.keyfile.is_none() {
            return Err(DomainError::ValidationError(
                "to use SSH specify one of ssh_key, ssh_keyfile or ssh_password for this source or globally"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
