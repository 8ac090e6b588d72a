// src/proxy/backend.rs
use crate::health::HealthStatus;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Backend identity. Unique within a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendAddr {
    pub host: String,
    pub port: u16,
}

impl BackendAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BackendAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
pub struct Backend {
    pub addr: BackendAddr,

    // Runtime state
    active_connections: AtomicUsize,
    health_status: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
    last_health_check: RwLock<Option<DateTime<Utc>>>,
}

impl Backend {
    pub fn new(addr: BackendAddr, initial: HealthStatus) -> Self {
        Self {
            addr,
            active_connections: AtomicUsize::new(0),
            health_status: AtomicU8::new(initial as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
            last_health_check: RwLock::new(None),
        }
    }

    pub fn id(&self) -> String {
        self.addr.to_string()
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    /// Saturates at zero. Returns false if the counter was already zero.
    pub fn decrement_connections(&self) -> bool {
        let released = self
            .active_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if !released {
            warn!(backend = %self.addr, "Connection release on backend with no active connections");
        }
        released
    }

    /// Count one connection against this backend until the guard is dropped.
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.increment_connections();
        ConnectionGuard {
            backend: self.clone(),
        }
    }

    pub fn status(&self) -> HealthStatus {
        HealthStatus::from(self.health_status.load(Ordering::SeqCst))
    }

    pub fn is_healthy(&self) -> bool {
        self.status().is_routable()
    }

    /// Force the health flag. Returns the previous status.
    pub fn set_status(&self, status: HealthStatus) -> HealthStatus {
        HealthStatus::from(self.health_status.swap(status as u8, Ordering::SeqCst))
    }

    /// Feed one probe outcome through the threshold state machine.
    ///
    /// Returns `Some((from, to))` when the status changed.
    pub async fn record_probe(
        &self,
        success: bool,
        healthy_threshold: usize,
        unhealthy_threshold: usize,
    ) -> Option<(HealthStatus, HealthStatus)> {
        *self.last_health_check.write().await = Some(Utc::now());

        let current = self.status();
        let next = if success {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if current != HealthStatus::Healthy && successes >= healthy_threshold {
                HealthStatus::Healthy
            } else {
                current
            }
        } else {
            self.consecutive_successes.store(0, Ordering::SeqCst);
            let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if current != HealthStatus::Unhealthy && failures >= unhealthy_threshold {
                HealthStatus::Unhealthy
            } else {
                current
            }
        };

        if next == current {
            return None;
        }
        let previous = self.set_status(next);
        Some((previous, next))
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn consecutive_successes(&self) -> usize {
        self.consecutive_successes.load(Ordering::SeqCst)
    }

    pub async fn last_health_check(&self) -> Option<DateTime<Utc>> {
        *self.last_health_check.read().await
    }

    pub async fn get_status(&self) -> BackendStatus {
        BackendStatus {
            addr: self.addr.clone(),
            status: self.status(),
            active_connections: self.active_connections(),
            consecutive_failures: self.consecutive_failures(),
            last_health_check: self.last_health_check().await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub addr: BackendAddr,
    pub status: HealthStatus,
    pub active_connections: usize,
    pub consecutive_failures: usize,
    pub last_health_check: Option<DateTime<Utc>>,
}

/// Holds one active connection on a backend; releases it exactly once on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    backend: Arc<Backend>,
}

impl ConnectionGuard {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend.decrement_connections();
    }
}
