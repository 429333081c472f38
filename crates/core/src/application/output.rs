// Output - bounded backlog with rate-shaped flushing and requeue-on-failure

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::domain::{Event, OutputSettings};
use crate::port::OutputPlugin;

/// Result of handing a batch to an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted(usize),
    /// The backlog was full; the whole batch was discarded
    Dropped(usize),
}

/// Result of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Idle,
    Delivered(usize),
    /// Delivery failed and this many events went back to the head of the backlog
    Requeued(usize),
}

/// A configured output plugin plus its backlog and flush timer
pub struct Output {
    name: String,
    settings: OutputSettings,
    queue_depth: Option<usize>,
    plugin: Arc<dyn OutputPlugin>,
    backlog: Mutex<VecDeque<Event>>,
    timer: Mutex<Option<ShutdownSender>>,
}

impl Output {
    pub fn new(name: impl Into<String>, settings: OutputSettings, plugin: Arc<dyn OutputPlugin>) -> Self {
        Self {
            name: name.into(),
            queue_depth: settings.queue_depth(),
            settings,
            plugin,
            backlog: Mutex::new(VecDeque::new()),
            timer: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &OutputSettings {
        &self.settings
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().len()
    }

    /// Copy of the backlog in delivery order
    pub fn snapshot(&self) -> Vec<Event> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Append a batch to the backlog.
    ///
    /// Admission is all-or-nothing: with a non-zero `maxsize` a batch that
    /// would take the backlog past the bound is dropped whole, so the backlog
    /// never exceeds `maxsize`.
    pub fn events_received(&self, events: Vec<Event>) -> Admission {
        let count = events.len();
        let mut backlog = self.backlog.lock();

        if self.settings.maxsize > 0 && backlog.len() + count > self.settings.maxsize {
            drop(backlog);
            debug!(output = %self.name, dropped = count, "Backlog full, batch dropped");
            return Admission::Dropped(count);
        }

        backlog.extend(events);
        Admission::Admitted(count)
    }

    /// Deliver at most one queue depth worth of events from the head of the backlog
    pub async fn flush(&self) -> FlushOutcome {
        let batch: Vec<Event> = {
            let mut backlog = self.backlog.lock();
            if backlog.is_empty() {
                return FlushOutcome::Idle;
            }
            let take = match self.queue_depth {
                Some(depth) => depth.min(backlog.len()),
                None => backlog.len(),
            };
            backlog.drain(..take).collect()
        };

        match self.plugin.send(&batch).await {
            Ok(()) => {
                debug!(output = %self.name, delivered = batch.len(), "Batch delivered");
                FlushOutcome::Delivered(batch.len())
            }
            Err(e) => {
                let count = batch.len();
                let mut backlog = self.backlog.lock();
                // Reverse so the failed slice keeps its order ahead of later arrivals
                for event in batch.into_iter().rev() {
                    backlog.push_front(event);
                }
                let pending = backlog.len();
                drop(backlog);

                warn!(
                    output = %self.name,
                    error = %e,
                    requeued = count,
                    backlog = pending,
                    "Delivery failed, batch requeued"
                );
                FlushOutcome::Requeued(count)
            }
        }
    }

    /// Run the plugin start hook and arm the flush timer. Starting twice is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.timer.lock().is_some() {
            return;
        }

        if let Err(e) = self.plugin.start().await {
            error!(output = %self.name, error = %e, "Output start hook failed");
        }

        let (tx, token) = shutdown_channel();
        {
            let mut timer = self.timer.lock();
            if timer.is_some() {
                return;
            }
            *timer = Some(tx);
        }

        tokio::spawn(Arc::clone(self).run_timer(token));
        info!(
            output = %self.name,
            interval_secs = self.settings.interval.as_secs_f64(),
            maxsize = self.settings.maxsize,
            queue_depth = ?self.queue_depth,
            "Output started"
        );
    }

    /// Cancel the flush timer and run the teardown hook. Events still in the
    /// backlog are not flushed.
    pub async fn stop(&self) {
        let timer = self.timer.lock().take();
        let Some(tx) = timer else {
            return;
        };
        tx.shutdown();

        self.plugin.stop().await;
        info!(output = %self.name, pending = self.backlog_len(), "Output stopped");
    }

    async fn run_timer(self: Arc<Self>, mut token: ShutdownToken) {
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.wait() => break,
                _ = ticker.tick() => {
                    // Flushes never overlap: the next tick waits for this one
                    self.flush().await;
                }
            }
        }

        debug!(output = %self.name, "Output timer finished");
    }
}
