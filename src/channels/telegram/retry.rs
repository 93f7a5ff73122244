//! Backoff policy for outbound Telegram Bot API calls
//!
//! Only replies are retried. Retrying a send never touches the transcript,
//! which was already written (or deliberately left alone) before the reply.

use std::time::{Duration, SystemTime};

/// How often and how patiently a failed send is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry; doubles each attempt
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Whether a failed response is worth another attempt
///
/// Rate limits (429) and server errors (5xx) are transient; everything else,
/// such as a blocked bot or an unknown chat, will fail the same way again.
#[must_use]
pub fn is_recoverable(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// `parameters.retry_after` (seconds) from a Bot API error body
#[must_use]
pub fn parse_retry_after(body: &str) -> Option<Duration> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let secs = v.get("parameters")?.get("retry_after")?.as_u64()?;

    Some(Duration::from_secs(secs))
}

/// Delay before retry number `attempt` (0-based)
///
/// A server-provided `retry_after` wins, capped at `max_delay`. Otherwise
/// `base_delay * 2^attempt` plus up to 25% jitter, also capped.
#[must_use]
pub fn delay_for_attempt(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(ra) = retry_after {
        return ra.min(policy.max_delay);
    }

    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay);

    // Clock nanos are random enough to spread retries from one process
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let jitter = base.mul_f64(f64::from(nanos % 250) / 1000.0);

    (base + jitter).min(policy.max_delay)
}
