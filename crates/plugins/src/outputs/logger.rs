// Logger output: events to the tracing log or to a JSON lines file

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

use duct_core::domain::{ComponentConfig, DomainError, Event};
use duct_core::port::{DeliveryError, OutputPlugin};

/// **Configuration**: `logfile` (optional path; events are appended one JSON
/// object per line)
pub struct LoggerOutput {
    logfile: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl LoggerOutput {
    pub fn from_config(config: &ComponentConfig) -> Result<Self, DomainError> {
        Ok(Self {
            logfile: config.str("logfile")?.map(PathBuf::from),
            file: Mutex::new(None),
        })
    }

    async fn open(path: &PathBuf) -> Result<File, DeliveryError> {
        Ok(OpenOptions::new().create(true).append(true).open(path).await?)
    }
}

#[async_trait]
impl OutputPlugin for LoggerOutput {
    fn name(&self) -> &str {
        "logger"
    }

    async fn start(&self) -> Result<(), DeliveryError> {
        if let Some(path) = &self.logfile {
            *self.file.lock().await = Some(Self::open(path).await?);
        }
        Ok(())
    }

    async fn send(&self, events: &[Event]) -> Result<(), DeliveryError> {
        let Some(path) = &self.logfile else {
            for event in events {
                info!(target: "duct::events", event = %serde_json::to_string(event)?, "Event");
            }
            return Ok(());
        };

        let mut lines = Vec::new();
        for event in events {
            serde_json::to_writer(&mut lines, event)?;
            lines.push(b'\n');
        }

        let mut file = self.file.lock().await;
        if file.is_none() {
            *file = Some(Self::open(path).await?);
        }
        if let Some(file) = file.as_mut() {
            file.write_all(&lines).await?;
            file.flush().await?;
        }
        Ok(())
    }

    async fn stop(&self) {
        if let Some(mut file) = self.file.lock().await.take() {
            let _ = file.flush().await;
        }
    }
}
