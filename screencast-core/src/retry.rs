//! Reconnect backoff policy and the cancellable timer the controller arms
//! with it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounded exponential backoff. Attempt 1 waits `first_delay`, each
/// further attempt doubles, capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub first_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            first_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before reconnect attempt `attempt` (1-based). Attempt 0 is
    /// treated as attempt 1.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.first_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

/// One cancellable scheduled callback. Each arm bumps a generation
/// counter; the fired callback carries the generation it was armed with,
/// so events from cancelled or superseded timers are recognisably stale.
pub(crate) struct ScheduledTask {
    generation: u64,
    token: CancellationToken,
}

impl Default for ScheduledTask {
    fn default() -> Self {
        Self {
            generation: 0,
            token: CancellationToken::new(),
        }
    }
}

impl ScheduledTask {
    /// Arm the timer, cancelling any previous one. Returns the generation
    /// the fire callback will be invoked with.
    pub fn schedule<F>(&mut self, delay: Duration, fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.generation += 1;

        let generation = self.generation;
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => fire(generation),
            }
        });
        generation
    }

    pub fn cancel(&mut self) {
        self.token.cancel();
        self.generation += 1;
    }

    /// Whether a fired generation is still the armed one.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Backoff-driven retry timer.
pub(crate) struct RetryScheduler {
    policy: RetryPolicy,
    task: ScheduledTask,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            task: ScheduledTask::default(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Arm the timer for reconnect attempt `attempt`. Returns the chosen
    /// delay.
    pub fn schedule_attempt<F>(&mut self, attempt: u32, fire: F) -> Duration
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let delay = self.policy.delay(attempt);
        debug!(attempt, ?delay, "reconnect scheduled");
        self.task.schedule(delay, fire);
        delay
    }

    pub fn cancel(&mut self) {
        self.task.cancel();
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.task.is_current(generation)
    }
}
