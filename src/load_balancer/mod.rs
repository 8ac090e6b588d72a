// src/load_balancer/mod.rs
mod algorithm;
mod least_connections;
mod round_robin;
mod source_hash;

pub use algorithm::{LoadBalancer, LoadBalancerAlgorithm};
pub use least_connections::LeastConnectionsBalancer;
pub use round_robin::RoundRobinBalancer;
pub use source_hash::{fnv1a_64, SourceHashBalancer};

pub fn create_load_balancer(algorithm: LoadBalancerAlgorithm) -> Box<dyn LoadBalancer> {
    match algorithm {
        LoadBalancerAlgorithm::RoundRobin => Box::new(RoundRobinBalancer::new()),
        LoadBalancerAlgorithm::LeastConnections => Box::new(LeastConnectionsBalancer::new()),
        LoadBalancerAlgorithm::SourceHash => Box::new(SourceHashBalancer::new()),
    }
}

/// Resolve a configured name into a strategy. Unknown names fall back to
/// round robin with a warning.
pub fn load_balancer_from_name(name: &str) -> Box<dyn LoadBalancer> {
    let algorithm = LoadBalancerAlgorithm::from_name(name).unwrap_or_else(|| {
        tracing::warn!(
            "Unsupported load balancing algorithm {:?}, falling back to round robin",
            name
        );
        LoadBalancerAlgorithm::RoundRobin
    });
    create_load_balancer(algorithm)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::health::HealthStatus;
    use crate::proxy::{Backend, BackendAddr};
    use std::future::Future;
    use std::sync::Arc;

    pub fn backends(ports: &[u16]) -> Vec<Arc<Backend>> {
        ports
            .iter()
            .map(|p| Arc::new(Backend::new(BackendAddr::new("127.0.0.1", *p), HealthStatus::Healthy)))
            .collect()
    }

    pub fn ports(backends: &[Arc<Backend>]) -> Vec<u16> {
        backends.iter().map(|b| b.addr.port).collect()
    }

    pub fn block_on<F: Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("test runtime")
            .block_on(fut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_resolution() {
        assert_eq!(load_balancer_from_name("round_robin").name(), "round_robin");
        assert_eq!(load_balancer_from_name("least_connections").name(), "least_connections");
        assert_eq!(load_balancer_from_name("hashing").name(), "source_hash");
        assert_eq!(load_balancer_from_name("Source-Hash").name(), "source_hash");
        assert_eq!(load_balancer_from_name("weighted_random").name(), "round_robin");
        assert_eq!(load_balancer_from_name("").name(), "round_robin");
    }
}
