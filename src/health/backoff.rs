// src/health/backoff.rs
use crate::config::HealthCheckConfig;
use std::time::Duration;

/// Spacing of re-probes for a failing backend.
#[derive(Debug, Clone)]
pub struct ProbeBackoff {
    base: Duration,
    max: Duration,
}

impl ProbeBackoff {
    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self {
            base: config.backoff_base(),
            max: config.backoff_max(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.base.is_zero()
    }

    /// Exponential delay with up to 25% jitter: `base * 2^(failures - 1)`,
    /// capped at `max`. Zero while disabled or before the first failure.
    pub fn delay(&self, consecutive_failures: usize) -> Duration {
        if !self.is_enabled() || consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.base.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        let exp = (consecutive_failures - 1).min(32) as u32;

        let exponential = base.saturating_mul(2u64.saturating_pow(exp));
        let capped = exponential.min(max);
        let jitter = (capped as f64 * rand::random::<f64>() * 0.25) as u64;

        Duration::from_millis(capped + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(base_ms: u64, max_ms: u64) -> ProbeBackoff {
        let config = HealthCheckConfig {
            backoff_base_ms: base_ms,
            backoff_max_ms: max_ms,
            ..HealthCheckConfig::default()
        };
        ProbeBackoff::from_config(&config)
    }

    #[test]
    fn test_disabled_by_default() {
        let b = ProbeBackoff::from_config(&HealthCheckConfig::default());
        assert!(!b.is_enabled());
        assert_eq!(b.delay(10), Duration::ZERO);
    }

    #[test]
    fn test_exponential_with_cap() {
        let b = backoff(100, 1000);
        assert_eq!(b.delay(0), Duration::ZERO);

        for (failures, expected) in [(1, 100), (2, 200), (3, 400), (5, 1000), (60, 1000)] {
            let d = b.delay(failures).as_millis() as u64;
            assert!(d >= expected && d <= expected + expected / 4, "{} -> {}", failures, d);
        }
    }
}
