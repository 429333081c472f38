// Source Plugin Port
// Contract implemented by every leaf source (load, command, ...)

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Event, EventBuilder, EventState, EventTemplate};
use crate::port::{CommandExecutor, ExecutionError, TimeProvider};

/// Sampling errors. All of them are contained by the source scheduler.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Could not parse output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote sampling not supported by {0}")]
    RemoteUnsupported(String),

    #[error("Sampling task aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Other(String),
}

/// Everything a plugin needs to produce events for one tick.
///
/// `executor` is the source's execution channel: a local process runner, or
/// the shared remote connection when the source samples over SSH.
#[derive(Clone)]
pub struct SampleContext {
    pub template: EventTemplate,
    pub executor: Arc<dyn CommandExecutor>,
    pub time_provider: Arc<dyn TimeProvider>,
}

impl SampleContext {
    /// Metric event stamped with the source defaults and the current time
    pub fn event(
        &self,
        state: Option<EventState>,
        description: impl Into<String>,
        metric: f64,
    ) -> EventBuilder {
        self.template
            .metric_event(state, description, metric, None, self.time_provider.now_secs())
    }

    /// Metric event whose service is `service.prefix`
    pub fn prefixed_event(
        &self,
        prefix: &str,
        state: Option<EventState>,
        description: impl Into<String>,
        metric: f64,
    ) -> EventBuilder {
        self.template.metric_event(
            state,
            description,
            metric,
            Some(prefix),
            self.time_provider.now_secs(),
        )
    }

    pub fn log(&self, log_type: impl Into<String>, data: impl Into<String>) -> Event {
        self.template
            .log_event(log_type, data, self.time_provider.now_secs())
    }
}

/// Source plugin trait
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    /// Plugin name as used in configuration
    fn name(&self) -> &str;

    /// Whether [`SourcePlugin::sample_remote`] is implemented
    fn supports_remote(&self) -> bool {
        false
    }

    /// Called once before the source timer starts
    async fn start(&self) -> Result<(), SampleError> {
        Ok(())
    }

    /// Sample on the local host. `None` and an empty list both mean "nothing to report".
    async fn sample(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError>;

    /// Sample through the remote execution channel (sources with `use_ssh`)
    async fn sample_remote(&self, _ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
        Err(SampleError::RemoteUnsupported(self.name().to_string()))
    }

    /// Teardown hook invoked when the source is stopped
    async fn stop(&self) {}
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Mock source behavior
    #[derive(Debug, Clone)]
    pub enum MockSample {
        /// Emit this many metric events (metric = index)
        Emit(usize),
        /// Return Ok(None)
        Nothing,
        /// Fail with message
        Fail(String),
        /// Panic with message (panic isolation testing)
        Panic(String),
    }

    /// Scriptable source; optionally blocks inside `sample` until released
    pub struct MockSource {
        behavior: Mutex<MockSample>,
        gate: Option<Arc<Notify>>,
        entered: Arc<Notify>,
        calls: AtomicUsize,
        remote_calls: AtomicUsize,
        stopped: AtomicUsize,
        remote: bool,
    }

    impl MockSource {
        pub fn new(behavior: MockSample) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                gate: None,
                entered: Arc::new(Notify::new()),
                calls: AtomicUsize::new(0),
                remote_calls: AtomicUsize::new(0),
                stopped: AtomicUsize::new(0),
                remote: true,
            }
        }

        /// Block every sample until `gate` is notified
        pub fn gated(behavior: MockSample, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(behavior)
            }
        }

        /// Plugin without a remote sampling implementation
        pub fn local_only(mut self) -> Self {
            self.remote = false;
            self
        }

        pub fn set_behavior(&self, behavior: MockSample) {
            *self.behavior.lock() = behavior;
        }

        /// Notified every time a sample begins
        pub fn entered(&self) -> Arc<Notify> {
            Arc::clone(&self.entered)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn remote_calls(&self) -> usize {
            self.remote_calls.load(Ordering::SeqCst)
        }

        pub fn stop_count(&self) -> usize {
            self.stopped.load(Ordering::SeqCst)
        }

        async fn produce(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            let behavior = self.behavior.lock().clone();
            match behavior {
                MockSample::Emit(n) => Ok(Some(
                    (0..n)
                        .map(|i| ctx.event(Some(EventState::Ok), "mock", i as f64).build())
                        .collect(),
                )),
                MockSample::Nothing => Ok(None),
                MockSample::Fail(msg) => Err(SampleError::Other(msg)),
                MockSample::Panic(msg) => panic!("{}", msg),
            }
        }
    }

    #[async_trait]
    impl SourcePlugin for MockSource {
        fn name(&self) -> &str {
            "mock"
        }

        fn supports_remote(&self) -> bool {
            self.remote
        }

        async fn sample(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.produce(ctx).await
        }

        async fn sample_remote(&self, ctx: &SampleContext) -> Result<Option<Vec<Event>>, SampleError> {
            self.remote_calls.fetch_add(1, Ordering::SeqCst);
            self.produce(ctx).await
        }

        async fn stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}
