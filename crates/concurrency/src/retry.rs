//! Conflict retry
//!
//! Contains [`RetryPolicy`] for bounded retry behavior, [`CancellationToken`]
//! for stopping a retry loop from outside, and the driver shared by the
//! optimistic protocols in this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablekeep_core::{Error, Result};
use tracing::{debug, warn};

// ============================================================================
// Retry Configuration
// ============================================================================

/// Configuration for conflict retry behavior
///
/// Every read-modify-write cycle that loses a race against another writer is
/// retried from scratch, at most `max_attempts` times in total. Between
/// attempts the caller sleeps with exponential backoff.
///
/// # Example
/// ```
/// use tablekeep_concurrency::RetryPolicy;
///
/// let policy = RetryPolicy::new()
///     .with_max_attempts(20)
///     .with_base_delay_ms(2)
///     .with_max_delay_ms(40);
/// assert_eq!(policy.max_attempts, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (0 behaves as 1)
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            base_delay_ms: 1,
            max_delay_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Create a new RetryPolicy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RetryPolicy that makes a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Set maximum number of attempts
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between attempts
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Number of attempts the driver will actually make
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// Calculate delay after a failed attempt (exponential backoff)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        // 1 << 63 is the largest shift that fits in u64
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation for retry loops
///
/// Clones share state: cancelling one cancels all. A token can also carry a
/// deadline, after which it reports itself cancelled. Retry loops check the
/// token before every attempt, never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Token that is never cancelled unless [`cancel`](Self::cancel) is called
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Token that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Cancel this token and all its clones
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Result of one optimistic attempt
pub(crate) enum Outcome<T> {
    /// Attempt finished; stop retrying
    Done(T),
    /// Attempt lost a race; start over from a fresh read
    Conflict,
}

/// Run `attempt` until it finishes, fails, or the policy gives up
///
/// Errors from `attempt` are returned unchanged. Conflicts are retried until
/// `policy.attempts()` is reached, which yields `ContentionExhausted`.
pub(crate) fn run<T, F>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    target: &dyn fmt::Display,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut(usize) -> Result<Outcome<T>>,
{
    let attempts = policy.attempts();

    for n in 0..attempts {
        if cancel.is_cancelled() {
            warn!(row = %target, attempt = n, "Optimistic retry cancelled");
            return Err(Error::Cancelled);
        }

        match attempt(n)? {
            Outcome::Done(value) => return Ok(value),
            Outcome::Conflict => {
                debug!(row = %target, attempt = n, "Lost optimistic race, retrying");
                if n + 1 < attempts {
                    let delay = policy.calculate_delay(n);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }

    warn!(row = %target, attempts, "Optimistic retry exhausted");
    Err(Error::ContentionExhausted { attempts })
}
