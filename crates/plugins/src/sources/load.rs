// Load average source

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use sysinfo::System;

use duct_core::domain::Event;
use duct_core::port::{SampleContext, SampleError, SourcePlugin};

const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reports the 1 minute load average. Locally this reads the kernel via
/// `sysinfo`; remotely it reads `/proc/loadavg` over the connection.
#[derive(Default)]
pub struct LoadSource;

impl LoadSource {
    pub fn new() -> Self {
        Self
    }
}

/// First field of a `/proc/loadavg` line
fn parse_loadavg(contents: &str) -> Result<f64, SampleError> {
    let field = contents
        .split_whitespace()
        .next()
        .ok_or_else(|| SampleError::Parse("empty /proc/loadavg".to_string()))?;
    field
        .parse::<f64>()
        .map_err(|e| SampleError::Parse(format!("load average '{}': {}", field, e)))
}

#[async_trait]
impl SourcePlugin for LoadSource {
    fn name(&self) -> &str {
        "load"
    }

    fn supports_remote(&self) -> bool {
        true
    }

    async fn sample(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
        let load = System::load_average();
        Ok(Some(vec![ctx.event(None, "Load average", load.one).build()]))
    }

    async fn sample_remote(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
        let output = ctx
            .executor
            .run("cat", &["/proc/loadavg".to_string()], &BTreeMap::new(), REMOTE_TIMEOUT)
            .await?;
        if !output.success() {
            return Err(SampleError::Other(format!(
                "cat /proc/loadavg exited {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let load = parse_loadavg(&output.stdout)?;
        Ok(Some(vec![ctx.event(None, "Load average", load).build()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duct_core::domain::EventTemplate;
    use duct_core::port::command_executor::mocks::MockCommandExecutor;
    use duct_core::port::time_provider::FixedTimeProvider;
    use duct_core::port::CommandOutput;
    use std::sync::Arc;

    fn context(executor: Arc<MockCommandExecutor>) -> SampleContext {
        SampleContext {
            template: EventTemplate {
                service: "load".to_string(),
                hostname: "db01".to_string(),
                ttl: 60.0,
                tags: Vec::new(),
                attributes: None,
            },
            executor,
            time_provider: Arc::new(FixedTimeProvider(0)),
        }
    }

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/467 12345\n").unwrap(), 0.52);
        assert!(parse_loadavg("").is_err());
        assert!(parse_loadavg("abc").is_err());
    }

    #[tokio::test]
    async fn test_remote_sample_reads_proc() {
        let executor = Arc::new(MockCommandExecutor::with_stdout("1.25 0.90 0.40 2/300 999\n"));
        let events = LoadSource::new()
            .sample_remote(&context(executor.clone()))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(events[0].metric(), 1.25);
        assert_eq!(events[0].service(), "load");
        assert_eq!(executor.calls()[0].args, vec!["/proc/loadavg".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_not_connected_fails_sample() {
        let executor = Arc::new(MockCommandExecutor::new(Ok(CommandOutput::not_connected())));
        let result = LoadSource::new().sample_remote(&context(executor)).await;

        assert!(matches!(result, Err(SampleError::Other(_))));
    }

    #[tokio::test]
    async fn test_local_sample_emits_one_event() {
        let executor = Arc::new(MockCommandExecutor::with_stdout(""));
        let events = LoadSource::new().sample(&context(executor.clone())).await.unwrap().unwrap();

        assert_eq!(events.len(), 1);
        assert!(events[0].metric() >= 0.0);
        assert!(executor.calls().is_empty());
    }
}
