// src/load_balancer/algorithm.rs
use crate::proxy::Backend;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Picks one backend out of an already health-filtered list.
///
/// Implementations never look at health themselves; `None` means the list
/// was empty.
#[async_trait]
pub trait LoadBalancer: Send + Sync {
    async fn select_backend(
        &self,
        backends: &[Arc<Backend>],
        client_key: Option<&str>,
    ) -> Option<Arc<Backend>>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancerAlgorithm {
    RoundRobin,
    LeastConnections,
    SourceHash,
}

impl LoadBalancerAlgorithm {
    /// Resolve a configured algorithm name. `hashing` and `ip_hash` are
    /// accepted as aliases for source hashing.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Some(Self::RoundRobin),
            "least_connections" | "least_conn" => Some(Self::LeastConnections),
            "source_hash" | "hashing" | "ip_hash" => Some(Self::SourceHash),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastConnections => "least_connections",
            Self::SourceHash => "source_hash",
        }
    }
}

impl fmt::Display for LoadBalancerAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
