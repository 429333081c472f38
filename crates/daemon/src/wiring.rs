// Composition root: configuration -> outputs, sources and their channels

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use duct_core::application::{Agent, ExecutionChannel, Output, Source};
use duct_core::domain::{OutputSettings, RemoteSettings, SourceSettings};
use duct_core::port::{CommandExecutor, TimeProvider};
use duct_infra_ssh::ConnectionRegistry;
use duct_plugins::{build_output, build_source};

use crate::config::AgentConfig;

/// Shared services every component is built against
pub struct Services {
    pub hostname: String,
    pub registry: Arc<ConnectionRegistry>,
    pub local: Arc<dyn CommandExecutor>,
    pub time_provider: Arc<dyn TimeProvider>,
}

/// Build the agent described by `config`. Any invalid component aborts startup.
pub fn build_agent(config: &AgentConfig, services: &Services) -> Result<Agent> {
    let mut outputs = Vec::new();
    for (index, component) in config.output_configs().into_iter().enumerate() {
        let name = component
            .str("output")?
            .with_context(|| format!("outputs[{}] has no output type", index))?;
        let settings = OutputSettings::from_config(&component)
            .with_context(|| format!("outputs[{}] ({})", index, name))?;
        let plugin = build_output(&component).with_context(|| format!("outputs[{}] ({})", index, name))?;

        info!(output = %name, interval = ?settings.interval, maxsize = settings.maxsize, maxrate = settings.maxrate, "Configured output");
        outputs.push(Arc::new(Output::new(name, settings, plugin)));
    }

    let mut agent = Agent::new(outputs);

    for (index, component) in config.source_configs().into_iter().enumerate() {
        let settings = SourceSettings::from_config(&component, &services.hostname)
            .with_context(|| format!("sources[{}]", index))?;
        let service = settings.service.clone();
        let plugin = build_source(&component).with_context(|| format!("sources[{}] ({})", index, service))?;

        let channel = if settings.use_ssh {
            let remote = RemoteSettings::from_config(&component, &settings.hostname)
                .with_context(|| format!("sources[{}] ({})", index, service))?;
            let connection = services
                .registry
                .acquire(&remote)
                .with_context(|| format!("sources[{}] ({})", index, service))?;
            connection.channel()
        } else {
            ExecutionChannel::Local(Arc::clone(&services.local))
        };

        let source = Source::new(
            settings,
            plugin,
            channel,
            agent.dispatcher(),
            Arc::clone(&services.time_provider),
        )
        .with_context(|| format!("sources[{}] ({})", index, service))?;

        info!(service = %service, mode = source.sampling_mode(), "Configured source");
        agent.add_source(source);
    }

    Ok(agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duct_core::port::time_provider::FixedTimeProvider;
    use duct_core::port::NoopLog;
    use duct_infra_ssh::RusshTransport;
    use duct_infra_system::ProcessRunner;
    use tempfile::TempDir;

    fn services() -> Services {
        Services {
            hostname: "web01".to_string(),
            registry: Arc::new(ConnectionRegistry::new(
                Arc::new(RusshTransport::new(Arc::new(NoopLog))),
                Arc::new(NoopLog),
            )),
            local: Arc::new(ProcessRunner::default()),
            time_provider: Arc::new(FixedTimeProvider(0)),
        }
    }

    #[test]
    fn test_builds_local_sources_and_outputs() {
        let config = AgentConfig::from_yaml(
            r#"
sources:
  - source: command
    service: uptime
    command: uptime
  - source: load
    service: load
outputs:
  - output: "null"
  - output: logger
"#,
        )
        .unwrap();

        let agent = build_agent(&config, &services()).unwrap();

        assert_eq!(agent.sources().len(), 2);
        assert_eq!(agent.outputs().len(), 2);
        assert_eq!(agent.sources()[0].service(), "uptime");
        assert_eq!(agent.sources()[0].sampling_mode(), "local");
    }

    #[test]
    fn test_remote_sources_share_one_connection() {
        let dir = TempDir::new().unwrap();
        let yaml = format!(
            r#"
ssh_username: monitor
ssh_password: secret
ssh_knownhosts_file: {}
sources:
  - source: load
    service: load
    hostname: db01
    use_ssh: true
  - source: command
    service: disk
    hostname: db01
    use_ssh: true
    command: df
"#,
            dir.path().join("known_hosts").display()
        );
        let config = AgentConfig::from_yaml(&yaml).unwrap();
        let services = services();

        let agent = build_agent(&config, &services).unwrap();

        assert_eq!(agent.sources().len(), 2);
        assert!(agent.sources().iter().all(|s| s.sampling_mode() == "remote"));
        assert_eq!(services.registry.len(), 1);
    }

    #[test]
    fn test_remote_source_without_credentials_aborts() {
        let config = AgentConfig::from_yaml(
            r#"
sources:
  - source: load
    service: load
    use_ssh: true
    ssh_username: monitor
"#,
        )
        .unwrap();

        assert!(build_agent(&config, &services()).is_err());
    }

    #[test]
    fn test_unknown_plugin_aborts() {
        let config = AgentConfig::from_yaml(
            r#"
sources:
  - source: telepathy
    service: mind
"#,
        )
        .unwrap();

        let Err(err) = build_agent(&config, &services()) else {
            panic!("an unknown source plugin should abort startup");
        };
        assert!(format!("{:#}", err).contains("telepathy"));
    }
}
