// Source - periodic sampling with reentrancy protection and failure isolation

mod strategy;

pub use strategy::ExecutionChannel;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::domain::SourceSettings;
use crate::error::{AppError, Result};
use crate::port::{Dispatcher, SampleContext, SampleError, SourcePlugin, TimeProvider};
use strategy::{strategy_for, SamplingStrategy};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A serialized source was still busy; nothing ran
    Skipped,
    /// The plugin produced nothing
    Empty,
    /// This many events were forwarded to the dispatcher
    Emitted(usize),
    /// The plugin failed; the error was logged
    Failed,
}

/// Resets the running flag on every exit path, including unwinding
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A configured source plugin plus its timer
pub struct Source {
    settings: SourceSettings,
    plugin: Arc<dyn SourcePlugin>,
    strategy: Arc<dyn SamplingStrategy>,
    context: SampleContext,
    dispatcher: Arc<dyn Dispatcher>,
    running: AtomicBool,
    stopped: AtomicBool,
    timer: Mutex<Option<ShutdownSender>>,
}

impl Source {
    /// Create a source. The sampling strategy is fixed here from `channel`.
    ///
    /// # Errors
    /// - AppError::Config if `use_ssh` disagrees with the channel, or the plugin
    ///   cannot sample remotely but was given a remote channel
    pub fn new(
        settings: SourceSettings,
        plugin: Arc<dyn SourcePlugin>,
        channel: ExecutionChannel,
        dispatcher: Arc<dyn Dispatcher>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        if settings.use_ssh != channel.is_remote() {
            return Err(AppError::Config(format!(
                "[{}] use_ssh is {} but a {} execution channel was supplied",
                settings.service,
                settings.use_ssh,
                if channel.is_remote() { "remote" } else { "local" }
            )));
        }
        if channel.is_remote() && !plugin.supports_remote() {
            return Err(AppError::Config(format!(
                "[{}] source '{}' does not implement remote checks",
                settings.service,
                plugin.name()
            )));
        }

        let context = SampleContext {
            template: settings.event_template(),
            executor: channel.executor(),
            time_provider,
        };

        Ok(Self {
            strategy: strategy_for(&channel),
            settings,
            plugin,
            context,
            dispatcher,
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            timer: Mutex::new(None),
        })
    }

    pub fn service(&self) -> &str {
        &self.settings.service
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.settings
    }

    /// True while a sample is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// "local" or "remote"
    pub fn sampling_mode(&self) -> &'static str {
        self.strategy.label()
    }

    /// Run the plugin start hook, arm the timer and, for remote sources, ask
    /// the shared link to connect. Starting twice is a no-op.
    pub async fn start(self: &Arc<Self>) {
        if self.timer.lock().is_some() {
            return;
        }

        if let Err(e) = self.plugin.start().await {
            error!(service = %self.settings.service, error = %e, "Source start hook failed");
        }

        let (tx, token) = shutdown_channel();
        {
            let mut timer = self.timer.lock();
            if timer.is_some() {
                return;
            }
            *timer = Some(tx);
        }
        self.stopped.store(false, Ordering::Release);

        tokio::spawn(Arc::clone(self).run_timer(token));
        self.strategy.prepare(&self.settings.service).await;

        info!(
            service = %self.settings.service,
            interval_secs = self.settings.interval.as_secs_f64(),
            mode = self.strategy.label(),
            sync = self.settings.sync,
            "Source started"
        );
    }

    /// Cancel the timer and run the teardown hook. In-flight samples finish
    /// on their own; no new tick starts once this returns.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let timer = self.timer.lock().take();
        if let Some(tx) = timer {
            tx.shutdown();
        }

        self.plugin.stop().await;
        info!(service = %self.settings.service, "Source stopped");
    }

    async fn run_timer(self: Arc<Self>, mut token: ShutdownToken) {
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.wait() => break,
                _ = ticker.tick() => {
                    if self.stopped.load(Ordering::Acquire) {
                        break;
                    }
                    // Each firing is its own task so a slow sample never delays the timer
                    let source = Arc::clone(&self);
                    tokio::spawn(async move {
                        if !source.stopped.load(Ordering::Acquire) {
                            source.tick().await;
                        }
                    });
                }
            }
        }

        debug!(service = %self.settings.service, "Source timer finished");
    }

    fn begin(&self) -> Option<RunningGuard<'_>> {
        if self.settings.sync {
            if self
                .running
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return None;
            }
        } else {
            self.running.store(true, Ordering::Release);
        }
        Some(RunningGuard(&self.running))
    }

    /// One sampling round: guard, sample, forward, contain errors
    pub async fn tick(&self) -> TickOutcome {
        let Some(_running) = self.begin() else {
            debug!(service = %self.settings.service, "Previous sample still running, tick dropped");
            return TickOutcome::Skipped;
        };

        let strategy = Arc::clone(&self.strategy);
        let plugin = Arc::clone(&self.plugin);
        let ctx = self.context.clone();

        // Sampling runs on its own task so a panicking plugin is contained
        let sampled = tokio::spawn(async move { strategy.sample(plugin.as_ref(), &ctx).await })
            .await
            .unwrap_or_else(|join_err| {
                let reason = if join_err.is_panic() {
                    "plugin panicked".to_string()
                } else {
                    join_err.to_string()
                };
                Err(SampleError::Aborted(reason))
            });

        match sampled {
            Ok(Some(events)) if !events.is_empty() => {
                if self.settings.debug {
                    debug!(service = %self.settings.service, events = ?events, "Tick");
                }
                let count = events.len();
                self.dispatcher.forward(&self.settings.service, events);
                TickOutcome::Emitted(count)
            }
            Ok(_) => TickOutcome::Empty,
            Err(SampleError::Aborted(reason)) => {
                warn!(service = %self.settings.service, reason = %reason, "Sampling task aborted");
                TickOutcome::Failed
            }
            Err(e) => {
                error!(service = %self.settings.service, error = %e, "Unhandled error");
                TickOutcome::Failed
            }
        }
    }
}
