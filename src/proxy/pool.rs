// src/proxy/pool.rs
use super::backend::{Backend, BackendAddr, BackendStatus};
use crate::config::BackendConfig;
use crate::health::HealthStatus;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The registry of known backends.
///
/// The list itself sits behind one lock and is only replaced wholesale; the
/// per-backend flag and counter are atomics, so a reader never sees a
/// half-applied update.
#[derive(Debug)]
pub struct BackendPool {
    backends: RwLock<Vec<Arc<Backend>>>,
    initial_status: HealthStatus,
}

impl BackendPool {
    pub fn new(configs: Vec<BackendConfig>, assume_healthy: bool) -> Self {
        let initial_status = if assume_healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        };
        let backends = build_list(configs, initial_status, &[]);

        Self {
            backends: RwLock::new(backends),
            initial_status,
        }
    }

    /// Healthy backends in configuration order.
    pub async fn list_healthy(&self) -> Vec<Arc<Backend>> {
        self.backends
            .read()
            .await
            .iter()
            .filter(|b| b.is_healthy())
            .cloned()
            .collect()
    }

    pub async fn all_backends(&self) -> Vec<Arc<Backend>> {
        self.backends.read().await.clone()
    }

    pub async fn get_backend(&self, addr: &BackendAddr) -> Option<Arc<Backend>> {
        self.backends
            .read()
            .await
            .iter()
            .find(|b| &b.addr == addr)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.backends.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Force a backend's health flag. Returns false for an unknown address.
    pub async fn set_health(&self, addr: &BackendAddr, healthy: bool) -> bool {
        match self.get_backend(addr).await {
            Some(backend) => {
                backend.set_status(HealthStatus::from(healthy));
                true
            }
            None => false,
        }
    }

    pub async fn increment_connections(&self, addr: &BackendAddr) -> bool {
        match self.get_backend(addr).await {
            Some(backend) => {
                backend.increment_connections();
                true
            }
            None => false,
        }
    }

    pub async fn decrement_connections(&self, addr: &BackendAddr) -> bool {
        match self.get_backend(addr).await {
            Some(backend) => backend.decrement_connections(),
            None => false,
        }
    }

    /// Swap in a new backend list. Backends that keep their address keep
    /// their health and connection state.
    pub async fn replace(&self, configs: Vec<BackendConfig>) {
        let mut backends = self.backends.write().await;
        let next = build_list(configs, self.initial_status, &backends);
        *backends = next;

        tracing::info!(total = backends.len(), "Backend list replaced");
    }

    pub async fn snapshot(&self) -> Vec<BackendStatus> {
        let backends = self.all_backends().await;
        let mut rows = Vec::with_capacity(backends.len());
        for backend in backends {
            rows.push(backend.get_status().await);
        }
        rows
    }
}

fn build_list(
    configs: Vec<BackendConfig>,
    initial_status: HealthStatus,
    existing: &[Arc<Backend>],
) -> Vec<Arc<Backend>> {
    let mut seen = HashSet::new();
    let mut list = Vec::with_capacity(configs.len());

    for config in configs {
        let addr = BackendAddr::new(config.host, config.port);
        if !seen.insert(addr.clone()) {
            tracing::warn!(backend = %addr, "Duplicate backend in topology, ignoring");
            continue;
        }

        let backend = existing
            .iter()
            .find(|b| b.addr == addr)
            .cloned()
            .unwrap_or_else(|| Arc::new(Backend::new(addr, initial_status)));
        list.push(backend);
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs(ports: &[u16]) -> Vec<BackendConfig> {
        ports
            .iter()
            .map(|p| BackendConfig::new("127.0.0.1", *p))
            .collect()
    }

    fn ports(backends: &[Arc<Backend>]) -> Vec<u16> {
        backends.iter().map(|b| b.addr.port).collect()
    }

    #[tokio::test]
    async fn test_list_healthy_keeps_order() {
        let pool = BackendPool::new(configs(&[8001, 8002, 8003]), true);
        assert_eq!(ports(&pool.list_healthy().await), vec![8001, 8002, 8003]);

        assert!(pool.set_health(&BackendAddr::new("127.0.0.1", 8002), false).await);
        assert_eq!(ports(&pool.list_healthy().await), vec![8001, 8003]);

        // idempotent
        assert!(pool.set_health(&BackendAddr::new("127.0.0.1", 8002), false).await);
        assert_eq!(ports(&pool.list_healthy().await), vec![8001, 8003]);
        assert_eq!(pool.len().await, 3);
    }

    #[tokio::test]
    async fn test_not_assumed_healthy_until_probed() {
        let pool = BackendPool::new(configs(&[8001]), false);
        assert!(pool.list_healthy().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_dropped() {
        let pool = BackendPool::new(configs(&[8001, 8001, 8002]), true);
        assert_eq!(ports(&pool.all_backends().await), vec![8001, 8002]);
    }

    #[tokio::test]
    async fn test_connection_counts_by_address() {
        let pool = BackendPool::new(configs(&[8001]), true);
        let addr = BackendAddr::new("127.0.0.1", 8001);

        assert!(pool.increment_connections(&addr).await);
        assert!(pool.decrement_connections(&addr).await);
        assert!(!pool.decrement_connections(&addr).await);
        assert_eq!(pool.get_backend(&addr).await.unwrap().active_connections(), 0);

        let missing = BackendAddr::new("127.0.0.1", 1);
        assert!(!pool.increment_connections(&missing).await);
        assert!(!pool.set_health(&missing, true).await);
    }

    #[tokio::test]
    async fn test_replace_preserves_surviving_state() {
        let pool = BackendPool::new(configs(&[8001, 8002]), true);
        let kept = BackendAddr::new("127.0.0.1", 8002);
        pool.increment_connections(&kept).await;
        pool.set_health(&BackendAddr::new("127.0.0.1", 8001), false).await;

        pool.replace(configs(&[8002, 8003])).await;

        assert_eq!(ports(&pool.all_backends().await), vec![8002, 8003]);
        assert_eq!(pool.get_backend(&kept).await.unwrap().active_connections(), 1);
        assert_eq!(ports(&pool.list_healthy().await), vec![8002, 8003]);

        let rows = pool.snapshot().await;
        assert_eq!(rows[0].active_connections, 1);
        assert_eq!(rows[1].status, HealthStatus::Healthy);
    }
}
