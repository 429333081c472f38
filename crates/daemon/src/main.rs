//! Duct monitoring agent - main entry point

mod config;
mod logging;
mod wiring;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use duct_core::port::time_provider::SystemTimeProvider;
use duct_core::port::{NoopLog, SubstrateLog, TracingLog};
use duct_infra_ssh::{ConnectionRegistry, RusshTransport};
use duct_infra_system::ProcessRunner;

use crate::config::{AgentConfig, DEFAULT_CONFIG_PATH};
use crate::logging::LogFormat;
use crate::wiring::{build_agent, Services};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "ductd", version, about = "Duct monitoring agent")]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, env = "DUCT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Console log format
    #[arg(long, env = "DUCT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Also write logs to this file, rolled daily
    #[arg(long, env = "DUCT_LOGFILE")]
    logfile: Option<PathBuf>,
}

fn system_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Logging (guard keeps the file writer alive)
    let _log_guard = logging::init(cli.log_format, cli.logfile.as_deref())?;
    info!("Duct agent v{} starting...", VERSION);

    // 2. Configuration
    let config = AgentConfig::load(&cli.config)?;
    let hostname = config.hostname.clone().unwrap_or_else(system_hostname);
    info!(config = %cli.config.display(), hostname = %hostname, "Configuration loaded");

    // 3. Shared services
    let substrate_log: Arc<dyn SubstrateLog> = if config.ssh_quiet {
        Arc::new(NoopLog)
    } else {
        Arc::new(TracingLog)
    };
    let registry = Arc::new(ConnectionRegistry::new(
        Arc::new(RusshTransport::new(Arc::clone(&substrate_log))),
        substrate_log,
    ));
    let services = Services {
        hostname,
        registry: Arc::clone(&registry),
        local: Arc::new(ProcessRunner::default()),
        time_provider: Arc::new(SystemTimeProvider),
    };

    // 4. Components
    let agent = build_agent(&config, &services)?;
    if agent.sources().is_empty() {
        warn!("No sources configured");
    }
    info!(
        sources = agent.sources().len(),
        outputs = agent.outputs().len(),
        remote_connections = registry.len(),
        "Agent built"
    );

    // 5. Run until signalled
    agent.start().await;
    info!("Agent running");

    wait_for_signal().await?;
    info!("Shutdown signal received, stopping agent...");

    agent.stop().await;
    registry.shutdown().await;

    info!("Agent stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
