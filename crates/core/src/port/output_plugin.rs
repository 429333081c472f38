// Output Plugin Port
// Contract implemented by every delivery target (logger, http, ...)

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Event;

/// Delivery errors. A failed batch is requeued at the head of the backlog.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delivery task aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Other(String),
}

/// Output plugin trait
#[async_trait]
pub trait OutputPlugin: Send + Sync {
    /// Plugin name as used in configuration
    fn name(&self) -> &str;

    /// Set up clients before the flush timer starts
    async fn start(&self) -> Result<(), DeliveryError> {
        Ok(())
    }

    /// Deliver one batch, in order
    async fn send(&self, events: &[Event]) -> Result<(), DeliveryError>;

    /// Release resources at shutdown
    async fn stop(&self) {}
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::Notify;

    /// Records delivered batches; can be switched into failure mode or gated
    pub struct RecordingOutput {
        delivered: Mutex<Vec<Vec<Event>>>,
        failing: Mutex<Option<String>>,
        gate: Option<Arc<Notify>>,
        entered: Arc<Notify>,
    }

    impl RecordingOutput {
        pub fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                failing: Mutex::new(None),
                gate: None,
                entered: Arc::new(Notify::new()),
            }
        }

        /// Block every send until `gate` is notified
        pub fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new()
            }
        }

        pub fn fail_with(&self, message: impl Into<String>) {
            *self.failing.lock() = Some(message.into());
        }

        pub fn recover(&self) {
            *self.failing.lock() = None;
        }

        /// Notified every time a send begins
        pub fn entered(&self) -> Arc<Notify> {
            Arc::clone(&self.entered)
        }

        pub fn batches(&self) -> Vec<Vec<Event>> {
            self.delivered.lock().clone()
        }

        pub fn delivered(&self) -> Vec<Event> {
            self.delivered.lock().iter().flatten().cloned().collect()
        }
    }

    impl Default for RecordingOutput {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl OutputPlugin for RecordingOutput {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, events: &[Event]) -> Result<(), DeliveryError> {
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            if let Some(message) = self.failing.lock().clone() {
                return Err(DeliveryError::Transport(message));
            }
            self.delivered.lock().push(events.to_vec());
            Ok(())
        }
    }
}
