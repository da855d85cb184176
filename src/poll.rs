//! Bounded poll-until-condition primitive.
//!
//! Browser waits and captcha-solver polling both reduce to "probe, and if not ready,
//! sleep and probe again, up to a limit". [`poll_until`] is that loop.

use std::future::Future;
use std::time::Duration;

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// The condition holds; stop polling with this value
    Ready(T),
    /// Not yet; sleep and probe again
    Pending,
}

/// Interval and attempt bound for [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Sleep between probes
    pub interval: Duration,
    /// Maximum number of probes, at least one
    pub max_attempts: u32,
    /// Sleep once before the first probe
    pub delay_first: bool,
}

impl PollPolicy {
    /// Probe immediately, then every `interval`, at most `max_attempts` times.
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            delay_first: false,
        }
    }

    /// Policy that covers roughly `timeout` by probing every `interval`.
    #[must_use]
    pub fn within(timeout: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = timeout.as_millis().div_ceil(interval_ms) + 1;
        Self::new(interval, u32::try_from(attempts).unwrap_or(u32::MAX))
    }

    /// Sleep for one interval before the first probe.
    #[must_use]
    pub const fn delayed(mut self) -> Self {
        self.delay_first = true;
        self
    }
}

/// Run `probe` until it reports [`Probe::Ready`], returns an error, or the policy runs out.
///
/// Returns `Ok(None)` when every attempt was [`Probe::Pending`]. Errors stop the loop
/// immediately.
pub async fn poll_until<T, E, F, Fut>(policy: PollPolicy, mut probe: F) -> Result<Option<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if attempt > 1 || policy.delay_first {
            tokio::time::sleep(policy.interval).await;
        }
        if let Probe::Ready(value) = probe(attempt).await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}
