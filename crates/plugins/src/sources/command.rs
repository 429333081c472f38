// Command source: run a check command and turn its exit code into a state

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use duct_core::application::constants::DEFAULT_COMMAND_TIMEOUT;
use duct_core::domain::{ComponentConfig, DomainError, Event, EventState};
use duct_core::port::{CommandOutput, SampleContext, SampleError, SourcePlugin};

/// Runs `command` through the source's execution channel, locally or over SSH.
///
/// Exit code 0 is ok, 1 warning, 2 critical, anything else unknown. The
/// metric is the first token of stdout when it is numeric, otherwise the
/// exit code.
///
/// **Configuration**: `command` (required), `args` (list or string),
/// `env` (map), `timeout` (seconds, default 30)
pub struct CommandSource {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
}

impl CommandSource {
    pub fn from_config(config: &ComponentConfig) -> Result<Self, DomainError> {
        let timeout = config.f64_or("timeout", DEFAULT_COMMAND_TIMEOUT.as_secs_f64())?;
        if timeout <= 0.0 || !timeout.is_finite() {
            return Err(DomainError::InvalidSetting {
                key: "timeout".to_string(),
                reason: format!("must be a positive number of seconds, got {}", timeout),
            });
        }

        Ok(Self {
            command: config.require_str("command")?,
            args: config.list("args", ' ')?,
            env: config.string_map("env")?.unwrap_or_default(),
            timeout: Duration::from_secs_f64(timeout),
        })
    }

    fn event(ctx: &SampleContext, output: &CommandOutput) -> Event {
        let state = match output.exit_code {
            0 => EventState::Ok,
            1 => EventState::Warning,
            2 => EventState::Critical,
            _ => EventState::Unknown,
        };

        let metric = output
            .stdout
            .split_whitespace()
            .next()
            .and_then(|token| token.parse::<f64>().ok())
            .filter(|m| m.is_finite())
            .unwrap_or(output.exit_code as f64);

        let description = match output.stdout.trim() {
            "" => output.stderr.trim(),
            stdout => stdout,
        };

        ctx.event(Some(state), description, metric).build()
    }

    async fn check(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
        let output = ctx
            .executor
            .run(&self.command, &self.args, &self.env, self.timeout)
            .await?;
        Ok(Some(vec![Self::event(ctx, &output)]))
    }
}

#[async_trait]
impl SourcePlugin for CommandSource {
    fn name(&self) -> &str {
        "command"
    }

    fn supports_remote(&self) -> bool {
        true
    }

    async fn sample(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
        self.check(ctx).await
    }

    async fn sample_remote(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
        self.check(ctx).await
    }
}
