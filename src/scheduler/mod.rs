// dbsnapshot/src/scheduler/mod.rs
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::breaker::{CircuitBreaker, FAILURE_THRESHOLD};

/// Work fired by the scheduler on a fixed interval.
#[async_trait]
pub trait PeriodicTask: Send + 'static {
    fn name(&self) -> &'static str;

    /// One run. An error counts as a failure for this task's circuit breaker.
    async fn run(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A task reached the consecutive failure threshold.
    FailureThreshold { task: &'static str },
    /// Stopped from outside, e.g. on ctrl-c.
    Shutdown,
}

/// Cloneable handle that halts every task of one scheduler.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl StopHandle {
    /// Prevents all future firings. Only the first call's reason is kept.
    pub fn stop(&self, reason: StopReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!(?reason, "stopping scheduler");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }
}

/// Drives periodic tasks until stopped.
///
/// Each task runs in its own loop: a tick waits for the previous run of the
/// same task to finish, while different tasks proceed independently.
pub struct Scheduler {
    stop: StopHandle,
    loops: JoinSet<()>,
    threshold: u32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_threshold(FAILURE_THRESHOLD)
    }

    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            stop: StopHandle::default(),
            loops: JoinSet::new(),
            threshold,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Starts firing `task` every `period`; the first run happens one period from now.
    pub fn every<T: PeriodicTask>(&mut self, period: Duration, task: T) {
        let breaker = CircuitBreaker::new(task.name(), self.threshold, self.stop.clone());
        tracing::info!(task = task.name(), period_secs = period.as_secs(), "scheduled task");
        self.loops.spawn(drive(task, period, breaker, self.stop.clone()));
    }

    /// Waits until the scheduler is stopped and every task loop has exited.
    pub async fn run(mut self) -> StopReason {
        while let Some(joined) = self.loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "task loop terminated abnormally");
            }
        }
        self.stop.reason().unwrap_or(StopReason::Shutdown)
    }
}

async fn drive<T: PeriodicTask>(
    mut task: T,
    period: Duration,
    mut breaker: CircuitBreaker,
    stop: StopHandle,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        run_guarded(&mut task, &mut breaker).await;
    }

    tracing::info!(task = task.name(), failures = breaker.failures(), "task stopped");
}

/// Runs one task iteration and feeds the outcome to its breaker.
pub async fn run_guarded<T>(task: &mut T, breaker: &mut CircuitBreaker)
where
    T: PeriodicTask + ?Sized,
{
    match task.run().await {
        Ok(()) => breaker.record_success(),
        Err(e) => {
            tracing::error!(task = task.name(), "run failed: {e:#}");
            breaker.record_failure();
        }
    }
}
