// src/health/status.rs
use std::fmt;

/// Per-backend health state.
///
/// ```text
/// Unknown ──> Healthy <──> Unhealthy
/// ```
///
/// Backends start `Healthy` unless `health_check.assume_healthy` is off, in
/// which case they sit in `Unknown` (not routable) until the first probe.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl HealthStatus {
    pub fn is_routable(self) -> bool {
        self == HealthStatus::Healthy
    }
}

impl From<u8> for HealthStatus {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthStatus::Healthy,
            2 => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        }
    }
}

impl From<bool> for HealthStatus {
    fn from(healthy: bool) -> Self {
        if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_roundtrip_and_routability() {
        for status in [HealthStatus::Unknown, HealthStatus::Healthy, HealthStatus::Unhealthy] {
            assert_eq!(HealthStatus::from(status as u8), status);
        }
        assert_eq!(HealthStatus::from(42), HealthStatus::Unknown);
        assert!(HealthStatus::Healthy.is_routable());
        assert!(!HealthStatus::Unknown.is_routable());
        assert!(!HealthStatus::Unhealthy.is_routable());
    }
}
