// Agent - owns every source and output and orders their lifecycle

use std::sync::Arc;
use tracing::{info, warn};

use crate::application::constants::GRACEFUL_SHUTDOWN_TIMEOUT;
use crate::application::dispatcher::FanOutDispatcher;
use crate::application::output::Output;
use crate::application::source::Source;
use crate::port::Dispatcher;

/// The running set of sources and outputs.
///
/// Outputs are fixed at construction because the dispatcher handed to each
/// source fans out to exactly those outputs.
pub struct Agent {
    outputs: Vec<Arc<Output>>,
    sources: Vec<Arc<Source>>,
    dispatcher: Arc<FanOutDispatcher>,
}

impl Agent {
    pub fn new(outputs: Vec<Arc<Output>>) -> Self {
        let dispatcher = Arc::new(FanOutDispatcher::new(outputs.clone()));
        Self {
            outputs,
            sources: Vec::new(),
            dispatcher,
        }
    }

    /// Dispatcher to pass to [`Source::new`]
    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn add_source(&mut self, source: Source) {
        self.sources.push(Arc::new(source));
    }

    pub fn sources(&self) -> &[Arc<Source>] {
        &self.sources
    }

    pub fn outputs(&self) -> &[Arc<Output>] {
        &self.outputs
    }

    /// Start outputs first so no early event finds a missing backlog timer
    pub async fn start(&self) {
        for output in &self.outputs {
            output.start().await;
        }
        for source in &self.sources {
            source.start().await;
        }
        info!(
            sources = self.sources.len(),
            outputs = self.outputs.len(),
            "Agent started"
        );
    }

    /// Stop sources, then outputs. Teardown hooks that hang are abandoned
    /// after a grace period.
    pub async fn stop(&self) {
        for source in &self.sources {
            if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, source.stop()).await.is_err() {
                warn!(service = %source.service(), "Source teardown timed out");
            }
        }
        for output in &self.outputs {
            if tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, output.stop()).await.is_err() {
                warn!(output = %output.name(), "Output teardown timed out");
            }
        }
        info!("Agent stopped");
    }
}
