//! Bounded exponential backoff with jitter

use std::time::Duration;

use rand::Rng;
use tern_domain::QueueConfig;

/// Jitter type for adding randomness to retry delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Uniform extra delay in `[0, max]`
    Uniform { max: Duration },
}

impl Jitter {
    /// Draw an extra delay.
    #[must_use]
    pub fn sample(&self) -> Duration {
        match self {
            Jitter::None => Duration::ZERO,
            Jitter::Uniform { max } => {
                let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                if max_ms == 0 {
                    return Duration::ZERO;
                }
                Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
            }
        }
    }
}

/// `min(max, base · 2^(attempt-1))` plus jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
    pub jitter: Jitter,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max, jitter: Jitter::None }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Deterministic part of the delay after `attempt` failures (1-based).
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }

    /// Full delay including jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + self.jitter.sample()
    }
}

impl From<&QueueConfig> for ExponentialBackoff {
    fn from(config: &QueueConfig) -> Self {
        let jitter = if config.jitter_ms == 0 {
            Jitter::None
        } else {
            Jitter::Uniform { max: config.jitter() }
        };
        Self::new(config.base_delay(), config.max_delay()).with_jitter(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(20));
        assert_eq!(backoff.base_delay(1), Duration::from_secs(2));
        assert_eq!(backoff.base_delay(2), Duration::from_secs(4));
        assert_eq!(backoff.base_delay(3), Duration::from_secs(8));
        assert_eq!(backoff.base_delay(5), Duration::from_secs(20));
        assert_eq!(backoff.base_delay(64), Duration::from_secs(20));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
    }

    #[test]
    fn jitter_stays_in_range() {
        let jitter = Jitter::Uniform { max: Duration::from_millis(250) };
        for _ in 0..200 {
            assert!(jitter.sample() <= Duration::from_millis(250));
        }
        assert_eq!(Jitter::Uniform { max: Duration::ZERO }.sample(), Duration::ZERO);
    }

    #[test]
    fn built_from_queue_config() {
        let backoff = ExponentialBackoff::from(&QueueConfig::default());
        assert_eq!(backoff.base, Duration::from_secs(2));
        assert_eq!(backoff.max, Duration::from_secs(300));
        assert_eq!(backoff.jitter, Jitter::Uniform { max: Duration::from_secs(1) });
    }
}
