//! Periodic task runner.
//!
//! Each long-running component implements [`PeriodicTask`]; [`run_periodic`]
//! drives it until the cancellation token fires. Sleeps go through tokio's
//! clock, so paused-time tests control the interval.

use async_trait::async_trait;
use ingest_core::{Result, Schedule};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One unit of periodic work.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &str;

    /// Run a single cycle. Returns whether the cycle did any work.
    ///
    /// Implementations should check `cancel` between items and return early.
    async fn run_cycle(&self, cancel: &CancellationToken) -> Result<bool>;
}

/// Counts of how cycles ended, returned once the loop stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub busy: u64,
    pub idle: u64,
    pub errors: u64,
}

impl LoopStats {
    pub fn cycles(&self) -> u64 {
        self.busy + self.idle + self.errors
    }
}

/// Run `task` until `cancel` fires.
///
/// Errors are logged and treated as idle cycles; nothing here ends the loop
/// except cancellation.
pub async fn run_periodic(
    task: Arc<dyn PeriodicTask>,
    schedule: Schedule,
    cancel: CancellationToken,
) -> LoopStats {
    let mut stats = LoopStats::default();
    info!(
        task = task.name(),
        busy_secs = schedule.busy.as_secs(),
        idle_secs = schedule.idle.as_secs(),
        "Periodic task started"
    );

    while !cancel.is_cancelled() {
        let pause = match task.run_cycle(&cancel).await {
            Ok(true) => {
                stats.busy += 1;
                schedule.busy
            }
            Ok(false) => {
                stats.idle += 1;
                debug!(task = task.name(), "Nothing to do");
                schedule.idle
            }
            Err(e) if e.is_transient() => {
                stats.errors += 1;
                warn!(
                    task = task.name(),
                    code = ?e.error_code(),
                    error = %e,
                    "Cycle aborted, retrying next cycle"
                );
                schedule.idle
            }
            Err(e) => {
                stats.errors += 1;
                error!(task = task.name(), code = ?e.error_code(), error = %e, "Cycle failed");
                schedule.idle
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!(
        task = task.name(),
        cycles = stats.cycles(),
        errors = stats.errors,
        "Periodic task stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::Error;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays scripted outcomes and records when each cycle started.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<bool>>>,
        started: Mutex<Vec<Instant>>,
        cancel_when_drained: CancellationToken,
    }

    #[async_trait]
    impl PeriodicTask for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run_cycle(&self, _cancel: &CancellationToken) -> Result<bool> {
            self.started.lock().push(Instant::now());
            let next = self.outcomes.lock().pop_front();
            match next {
                Some(outcome) => outcome,
                None => {
                    self.cancel_when_drained.cancel();
                    Ok(false)
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_and_idle_intervals() {
        let cancel = CancellationToken::new();
        let task = Arc::new(Scripted {
            outcomes: Mutex::new(VecDeque::from([
                Ok(true),
                Ok(false),
                Err(Error::storage("unreachable")),
            ])),
            started: Mutex::new(Vec::new()),
            cancel_when_drained: cancel.clone(),
        });
        let schedule = Schedule {
            busy: Duration::from_secs(1),
            idle: Duration::from_secs(10),
        };

        let stats = run_periodic(task.clone(), schedule, cancel).await;
        assert_eq!(
            stats,
            LoopStats {
                busy: 1,
                idle: 2,
                errors: 1
            }
        );

        let started = task.started.lock().clone();
        assert_eq!(started.len(), 4);
        assert_eq!(started[1] - started[0], Duration::from_secs(1));
        assert_eq!(started[2] - started[1], Duration::from_secs(10));
        assert_eq!(started[3] - started[2], Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let task = Arc::new(Scripted {
            outcomes: Mutex::new(VecDeque::from([Ok(false)])),
            started: Mutex::new(Vec::new()),
            cancel_when_drained: CancellationToken::new(),
        });
        let schedule = Schedule::fixed(Duration::from_secs(3600));

        let handle = tokio::spawn(run_periodic(task.clone(), schedule, cancel.clone()));
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        let stats = handle.await.unwrap();
        assert_eq!(stats.cycles(), 1);
    }
}
