use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rand::Rng;

use crate::error::Error;
use crate::util::parse_retry_after;

pub type RetryPredicate = Arc<dyn Fn(usize, &Error) -> bool + Send + Sync>;
pub type RetryDelayFn = Arc<dyn Fn(usize, &Error) -> Duration + Send + Sync>;

/// Wait applied between a failed attempt and the next one.
#[derive(Clone, Default)]
pub enum RetryDelay {
    #[default]
    None,
    Fixed(Duration),
    Computed(RetryDelayFn),
}

impl std::fmt::Debug for RetryDelay {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => formatter.write_str("None"),
            Self::Fixed(delay) => formatter.debug_tuple("Fixed").field(delay).finish(),
            Self::Computed(_) => formatter.write_str("Computed(..)"),
        }
    }
}

impl RetryDelay {
    pub fn computed<F>(delay: F) -> Self
    where
        F: Fn(usize, &Error) -> Duration + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(delay))
    }

    /// `step * (attempt + 1)`.
    pub fn linear(step: Duration) -> Self {
        Self::computed(move |attempt, _error| {
            step.saturating_mul(u32::try_from(attempt + 1).unwrap_or(u32::MAX))
        })
    }

    /// `base * 2^attempt`, capped at `max_backoff`.
    pub fn exponential(base_backoff: Duration, max_backoff: Duration) -> Self {
        Self::exponential_with_jitter(base_backoff, max_backoff, 0.0)
    }

    pub fn exponential_with_jitter(
        base_backoff: Duration,
        max_backoff: Duration,
        jitter_ratio: f64,
    ) -> Self {
        let base_backoff = base_backoff.max(Duration::from_millis(1));
        let max_backoff = max_backoff.max(base_backoff);
        let jitter_ratio = jitter_ratio.clamp(0.0, 1.0);
        Self::computed(move |attempt, _error| {
            let backoff = exponential_backoff(base_backoff, max_backoff, attempt);
            apply_jitter(backoff, max_backoff, jitter_ratio)
        })
    }

    /// Honors a `Retry-After` header on HTTP errors and falls back to `fallback` otherwise.
    pub fn retry_after_or(fallback: RetryDelay) -> Self {
        Self::computed(move |attempt, error| {
            error
                .response()
                .and_then(|response| parse_retry_after(response.headers(), SystemTime::now()))
                .unwrap_or_else(|| fallback.delay_for(attempt, error))
        })
    }

    pub(crate) fn delay_for(&self, attempt: usize, error: &Error) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => *delay,
            Self::Computed(delay) => delay(attempt, error),
        }
    }
}

impl From<Duration> for RetryDelay {
    fn from(delay: Duration) -> Self {
        Self::Fixed(delay)
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    limit: usize,
    delay: RetryDelay,
    retry_on: Option<RetryPredicate>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RetryPolicy")
            .field("limit", &self.limit)
            .field("delay", &self.delay)
            .field("retry_on", &self.retry_on.as_ref().map(|_| ".."))
            .finish()
    }
}

impl RetryPolicy {
    /// A policy allowing up to `limit` additional attempts after the first one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            delay: RetryDelay::None,
            retry_on: None,
        }
    }

    pub fn delay(mut self, delay: impl Into<RetryDelay>) -> Self {
        self.delay = delay.into();
        self
    }

    pub fn retry_on<F>(mut self, retry_on: F) -> Self
    where
        F: Fn(usize, &Error) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Some(Arc::new(retry_on));
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn delay_rule(&self) -> &RetryDelay {
        &self.delay
    }

    pub(crate) fn should_retry(&self, attempt: usize, error: &Error) -> bool {
        attempt < self.limit
            && self
                .retry_on
                .as_ref()
                .is_none_or(|retry_on| retry_on(attempt, error))
    }

    pub(crate) fn delay_for(&self, attempt: usize, error: &Error) -> Duration {
        self.delay.delay_for(attempt, error)
    }
}

fn exponential_backoff(base_backoff: Duration, max_backoff: Duration, attempt: usize) -> Duration {
    let capped_exponent = attempt.min(31) as u32;
    let multiplier = 1_u128 << capped_exponent;
    let base_ms = base_backoff.as_millis().max(1);
    let max_ms = max_backoff.as_millis().max(base_ms);
    let delay_ms = base_ms
        .saturating_mul(multiplier)
        .min(max_ms)
        .min(u64::MAX as u128) as u64;
    Duration::from_millis(delay_ms)
}

fn apply_jitter(backoff: Duration, max_backoff: Duration, jitter_ratio: f64) -> Duration {
    if jitter_ratio <= f64::EPSILON {
        return backoff;
    }

    let backoff_ms = backoff.as_millis().min(u64::MAX as u128) as u64;
    if backoff_ms <= 1 {
        return backoff;
    }
    let max_backoff_ms = max_backoff.as_millis().min(u64::MAX as u128) as u64;

    let jitter_span = ((backoff_ms as f64) * jitter_ratio).round().max(1.0) as u64;
    let low = backoff_ms.saturating_sub(jitter_span);
    let high = backoff_ms.saturating_add(jitter_span).max(low);
    let mut rng = rand::rng();
    let sampled_ms = rng.random_range(low..=high).min(max_backoff_ms.max(1));
    Duration::from_millis(sampled_ms)
}
