// src/health/mod.rs
mod backoff;
mod checker;
mod status;

pub use backoff::ProbeBackoff;
pub use checker::{HealthCheckResult, HealthChecker, ProbeRound};
pub use status::HealthStatus;
