//! Step execution: retry backoff and deferral in one place.
//!
//! Steps report deferral as a result variant instead of rescheduling
//! themselves, so the delay/attempt bookkeeping lives here and can be
//! tested with a recording scheduler.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use curio_core::{defaults, Error, Result, RetryPolicy, Scheduler};

/// What one invocation of a step produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<T> {
    /// The step finished and produced its output.
    Done(T),
    /// The step cannot make progress yet; run it again after the delay.
    Deferred { delay: Duration },
}

/// Drives a step closure to completion under a retry policy.
///
/// Retryable errors consume an attempt and wait out the policy's backoff.
/// Deferrals wait out the step's own delay and do not consume attempts,
/// but are capped so a permanently-stuck prerequisite cannot spin forever.
pub struct StepRunner {
    scheduler: Arc<dyn Scheduler>,
    policy: RetryPolicy,
    max_defers: u32,
}

impl StepRunner {
    pub fn new(scheduler: Arc<dyn Scheduler>, policy: RetryPolicy) -> Self {
        Self {
            scheduler,
            policy,
            max_defers: defaults::STEP_MAX_DEFERS,
        }
    }

    pub async fn run<T, F, Fut>(&self, step_name: &str, step: F) -> Result<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<StepOutcome<T>>>,
    {
        let mut attempt: u32 = 0;
        let mut defers: u32 = 0;

        loop {
            match step(attempt).await {
                Ok(StepOutcome::Done(output)) => return Ok(output),
                Ok(StepOutcome::Deferred { delay }) => {
                    defers += 1;
                    if defers > self.max_defers {
                        return Err(Error::Scheduler(format!(
                            "step '{step_name}' deferred {defers} times without progress"
                        )));
                    }
                    debug!(step = step_name, defers, delay_ms = delay.as_millis() as u64, "Step deferred");
                    self.scheduler.delay(delay).await;
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.policy.max_attempts => {
                    let backoff = self.policy.backoff(attempt);
                    warn!(
                        step = step_name,
                        attempt,
                        delay_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Step failed, retrying"
                    );
                    self.scheduler.delay(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(step = step_name, attempt, error = %e, "Step failed permanently");
                    return Err(e);
                }
            }
        }
    }
}
