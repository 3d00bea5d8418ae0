use std::time::Duration;

/// Total classification attempts per event, the first one included.
pub const MAX_ATTEMPTS: u32 = 3;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 10_000;

/// What the worker does after a classification attempt fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait `delay`, then run attempt number `attempt` (zero-based).
    Retry { attempt: u32, delay: Duration },
    /// The attempt budget is spent.
    GiveUp,
}

/// Exponential backoff for a zero-based attempt number, capped at ten
/// seconds so a misconfigured attempt budget cannot stall the queue.
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = BASE_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

/// Decide the next step once attempt `failed_attempt` has failed.
pub fn after_failure(failed_attempt: u32) -> RetryStep {
    let next = failed_attempt + 1;
    if next >= MAX_ATTEMPTS {
        RetryStep::GiveUp
    } else {
        RetryStep::Retry {
            attempt: next,
            delay: backoff_delay(next),
        }
    }
}
