//! Daily trigger loop
//!
//! Wakes up every `tick` and hands a [`RunTrigger::Scheduled`] to the
//! handler. Whether a run actually happens is the handler's decision; the
//! loop only provides the clock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::error::{SchedulerError, SchedulerResult};

// ============================================================================
// Trigger Kinds
// ============================================================================

/// What started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Periodic tick inside the configured window
    Scheduled,
    /// Operator request; bypasses the timing gate
    Manual,
    /// Catch-up run when the process starts
    Startup,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
            Self::Startup => "startup",
        }
    }
}

impl fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives trigger events
#[async_trait]
pub trait RunHandler: Send + Sync {
    async fn handle(&self, trigger: RunTrigger);
}

// ============================================================================
// Daily Trigger
// ============================================================================

/// Periodic driver for [`RunHandler`]
pub struct DailyTrigger {
    handler: Arc<dyn RunHandler>,
    tick: Duration,
    run_on_startup: bool,
}

impl DailyTrigger {
    pub fn new(
        handler: Arc<dyn RunHandler>,
        tick: Duration,
        run_on_startup: bool,
    ) -> SchedulerResult<Self> {
        if tick.is_zero() {
            return Err(SchedulerError::trigger_config(
                "tick_secs",
                "tick interval must be positive",
            ));
        }
        Ok(Self {
            handler,
            tick,
            run_on_startup,
        })
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped
    ///
    /// A run in progress is awaited before the shutdown signal is observed.
    /// Ticks that fire while a run is still going are skipped, not queued.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_secs = self.tick.as_secs(),
            run_on_startup = self.run_on_startup,
            "Daily trigger started"
        );

        if self.run_on_startup && !*shutdown.borrow() {
            self.handler.handle(RunTrigger::Startup).await;
        }

        let start = tokio::time::Instant::now() + self.tick;
        let mut interval = tokio::time::interval_at(start, self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    debug!("Trigger tick");
                    self.handler.handle(RunTrigger::Scheduled).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Daily trigger stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<RunTrigger>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<RunTrigger> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RunHandler for Recorder {
        async fn handle(&self, trigger: RunTrigger) {
            self.seen.lock().unwrap().push(trigger);
        }
    }

    #[test]
    fn test_trigger_names() {
        assert_eq!(RunTrigger::Scheduled.as_str(), "scheduled");
        assert_eq!(RunTrigger::Manual.to_string(), "manual");
        assert_eq!(
            serde_json::to_string(&RunTrigger::Startup).unwrap(),
            "\"startup\""
        );
    }

    #[test]
    fn test_zero_tick_rejected() {
        let recorder = Arc::new(Recorder::default());
        assert!(DailyTrigger::new(recorder, Duration::ZERO, false).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_then_ticks() {
        let recorder = Arc::new(Recorder::default());
        let trigger = DailyTrigger::new(recorder.clone(), Duration::from_secs(60), true).unwrap();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(trigger.run(rx));
        tokio::time::sleep(Duration::from_secs(150)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(
            recorder.seen(),
            vec![RunTrigger::Startup, RunTrigger::Scheduled, RunTrigger::Scheduled]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_sender_dropped() {
        let recorder = Arc::new(Recorder::default());
        let trigger = DailyTrigger::new(recorder.clone(), Duration::from_secs(60), false).unwrap();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(trigger.run(rx));
        drop(tx);
        task.await.unwrap();

        assert!(recorder.seen().is_empty());
    }
}
