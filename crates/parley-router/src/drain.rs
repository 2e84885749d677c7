//! Backoff schedule for the shutdown drain loop.

use std::time::Duration;

use crate::config::DrainConfig;

const MIN_STEP: Duration = Duration::from_millis(1);

/// An endless, capped, exponentially growing sequence of wait intervals.
#[derive(Debug, Clone)]
pub struct DrainBackoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl DrainBackoff {
    /// Creates a schedule starting at `initial`, growing by `multiplier`
    /// per step and never exceeding `max`.
    ///
    /// Steps are at least one millisecond. Multipliers below one (or not
    /// finite) are treated as one.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let max = max.max(MIN_STEP);
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            current: initial.clamp(MIN_STEP, max),
            max,
            multiplier,
        }
    }

    pub fn from_config(config: &DrainConfig) -> Self {
        Self::new(
            config.initial_backoff(),
            config.max_backoff(),
            config.multiplier,
        )
    }
}

impl Iterator for DrainBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let step = self.current;
        self.current = Duration::try_from_secs_f64(step.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        Some(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_grows_then_caps() {
        let steps: Vec<_> = DrainBackoff::new(ms(50), ms(300), 2.0).take(5).collect();
        assert_eq!(steps, vec![ms(50), ms(100), ms(200), ms(300), ms(300)]);
    }

    #[test]
    fn test_degenerate_inputs() {
        let steps: Vec<_> = DrainBackoff::new(Duration::ZERO, ms(10), f64::NAN)
            .take(3)
            .collect();
        assert_eq!(steps, vec![ms(1), ms(1), ms(1)]);

        let mut huge = DrainBackoff::new(ms(10), Duration::MAX, f64::MAX);
        assert_eq!(huge.next(), Some(ms(10)));
        assert_eq!(huge.next(), Some(Duration::MAX));
    }

    #[test]
    fn test_from_config() {
        let config = DrainConfig::default();
        let mut backoff = DrainBackoff::from_config(&config);
        assert_eq!(backoff.next(), Some(config.initial_backoff()));
    }
}
