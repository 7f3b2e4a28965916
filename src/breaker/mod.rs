// dbsnapshot/src/breaker/mod.rs
use crate::scheduler::{StopHandle, StopReason};

/// Consecutive failures after which a task halts the whole scheduler.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Per-task consecutive failure counter.
///
/// Reaching the threshold stops the scheduler for the rest of the process
/// lifetime; there is no automatic recovery.
#[derive(Debug)]
pub struct CircuitBreaker {
    task: &'static str,
    threshold: u32,
    failures: u32,
    stop: StopHandle,
}

impl CircuitBreaker {
    pub fn new(task: &'static str, threshold: u32, stop: StopHandle) -> Self {
        Self {
            task,
            threshold,
            failures: 0,
            stop,
        }
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.threshold {
            tracing::error!(
                task = self.task,
                errors = self.failures,
                "stopping scheduler: consecutive failure threshold reached"
            );
            self.stop.stop(StopReason::FailureThreshold { task: self.task });
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_exactly_at_threshold() {
        let stop = StopHandle::default();
        let mut breaker = CircuitBreaker::new("dump", 3, stop.clone());

        breaker.record_failure();
        breaker.record_failure();
        assert!(!stop.is_stopped());

        breaker.record_failure();
        assert!(stop.is_stopped());
        assert_eq!(stop.reason(), Some(StopReason::FailureThreshold { task: "dump" }));
    }

    #[test]
    fn success_resets_the_streak() {
        let stop = StopHandle::default();
        let mut breaker = CircuitBreaker::new("cleanup", 3, stop.clone());

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failures(), 0);

        breaker.record_failure();
        breaker.record_failure();
        assert!(!stop.is_stopped());
    }

    #[test]
    fn breakers_of_different_tasks_are_independent() {
        let stop = StopHandle::default();
        let mut dump = CircuitBreaker::new("dump", 3, stop.clone());
        let mut cleanup = CircuitBreaker::new("cleanup", 3, stop.clone());

        dump.record_failure();
        dump.record_failure();
        cleanup.record_failure();
        cleanup.record_failure();

        assert_eq!(dump.failures(), 2);
        assert_eq!(cleanup.failures(), 2);
        assert!(!stop.is_stopped());
    }
}
