// Sampling strategies: chosen once per source, never re-decided per tick

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::domain::Event;
use crate::port::{CommandExecutor, RemoteLink, SampleContext, SampleError, SourcePlugin};

/// Where a source's commands run
#[derive(Clone)]
pub enum ExecutionChannel {
    /// Local subprocesses
    Local(Arc<dyn CommandExecutor>),
    /// A shared remote connection, seen through both of its faces
    Remote {
        executor: Arc<dyn CommandExecutor>,
        link: Arc<dyn RemoteLink>,
    },
}

impl ExecutionChannel {
    pub fn executor(&self) -> Arc<dyn CommandExecutor> {
        match self {
            ExecutionChannel::Local(executor) => Arc::clone(executor),
            ExecutionChannel::Remote { executor, .. } => Arc::clone(executor),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ExecutionChannel::Remote { .. })
    }
}

/// Capability selected at construction from the execution channel
#[async_trait]
pub(crate) trait SamplingStrategy: Send + Sync {
    async fn sample(
        &self,
        plugin: &dyn SourcePlugin,
        ctx: &SampleContext,
    ) -> Result<Option<Vec<Event>>, SampleError>;

    /// Runs when the source starts
    async fn prepare(&self, service: &str);

    fn label(&self) -> &'static str;
}

pub(crate) struct LocalSampling;

#[async_trait]
impl SamplingStrategy for LocalSampling {
    async fn sample(
        &self,
        plugin: &dyn SourcePlugin,
        ctx: &SampleContext,
    ) -> Result<Option<Vec<Event>>, SampleError> {
        plugin.sample(ctx).await
    }

    async fn prepare(&self, _service: &str) {}

    fn label(&self) -> &'static str {
        "local"
    }
}

pub(crate) struct RemoteSampling {
    link: Arc<dyn RemoteLink>,
}

impl RemoteSampling {
    pub(crate) fn new(link: Arc<dyn RemoteLink>) -> Self {
        Self { link }
    }
}

#[async_trait]
impl SamplingStrategy for RemoteSampling {
    async fn sample(
        &self,
        plugin: &dyn SourcePlugin,
        ctx: &SampleContext,
    ) -> Result<Option<Vec<Event>>, SampleError> {
        plugin.sample_remote(ctx).await
    }

    /// Ask the shared link to connect. Connection-establishment failures are
    /// reported here and not retried; the link's own loss handling covers drops.
    async fn prepare(&self, service: &str) {
        let link = Arc::clone(&self.link);
        let service = service.to_string();
        tokio::spawn(async move {
            match establish(link.as_ref()).await {
                LinkReadiness::Ready => {
                    info!(service = %service, remote = %link.describe(), "Remote link ready")
                }
                LinkReadiness::Pending => debug!(
                    service = %service,
                    remote = %link.describe(),
                    "Remote link connect already in progress"
                ),
                LinkReadiness::Failed(e) => error!(
                    service = %service,
                    remote = %link.describe(),
                    error = %e,
                    "Could not establish remote link"
                ),
            }
        });
    }

    fn label(&self) -> &'static str {
        "remote"
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum LinkReadiness {
    Ready,
    /// Connect returned without the link being up; another attempt owns it
    Pending,
    Failed(String),
}

pub(crate) async fn establish(link: &dyn RemoteLink) -> LinkReadiness {
    match link.connect().await {
        Ok(()) if link.is_connected() => LinkReadiness::Ready,
        Ok(()) => LinkReadiness::Pending,
        Err(e) => LinkReadiness::Failed(e.to_string()),
    }
}

pub(crate) fn strategy_for(channel: &ExecutionChannel) -> Arc<dyn SamplingStrategy> {
    match channel {
        ExecutionChannel::Local(_) => Arc::new(LocalSampling),
        ExecutionChannel::Remote { link, .. } => Arc::new(RemoteSampling::new(Arc::clone(link))),
    }
}
