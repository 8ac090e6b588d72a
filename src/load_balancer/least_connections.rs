// src/load_balancer/least_connections.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::Arc;

/// Picks the backend with the fewest live connections.
///
/// Counts are read straight from the registry's backends, not from a private
/// tally, so sessions that already ended are not counted. Ties go to the
/// earliest backend in the list.
#[derive(Debug, Default)]
pub struct LeastConnectionsBalancer;

impl LeastConnectionsBalancer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoadBalancer for LeastConnectionsBalancer {
    async fn select_backend(
        &self,
        backends: &[Arc<Backend>],
        _client_key: Option<&str>,
    ) -> Option<Arc<Backend>> {
        // min_by_key keeps the first of equal minimums
        backends
            .iter()
            .min_by_key(|b| b.active_connections())
            .cloned()
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{backends, block_on};
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_picks_least_loaded_and_counts_it() {
        let list = backends(&[1, 2, 3]);
        for _ in 0..2 {
            list[0].increment_connections();
        }
        list[2].increment_connections();

        let lb = LeastConnectionsBalancer::new();
        let chosen = lb.select_backend(&list, None).await.unwrap();
        assert_eq!(chosen.addr.port, 2);

        let _guard = chosen.acquire();
        assert_eq!(list[1].active_connections(), 1);
    }

    #[tokio::test]
    async fn test_tie_goes_to_first() {
        let list = backends(&[1, 2, 3]);
        let lb = LeastConnectionsBalancer::new();
        assert_eq!(lb.select_backend(&list, None).await.unwrap().addr.port, 1);

        list[0].increment_connections();
        assert_eq!(lb.select_backend(&list, None).await.unwrap().addr.port, 2);
    }

    #[tokio::test]
    async fn test_empty_returns_none() {
        let lb = LeastConnectionsBalancer::new();
        assert!(lb.select_backend(&[], Some("10.0.0.1")).await.is_none());
    }

    proptest! {
        #[test]
        fn prop_never_picks_a_busier_backend(counts in proptest::collection::vec(0usize..20, 1..12)) {
            let port_list: Vec<u16> = (1..=counts.len() as u16).collect();
            let list = backends(&port_list);
            for (backend, count) in list.iter().zip(&counts) {
                for _ in 0..*count {
                    backend.increment_connections();
                }
            }

            let lb = LeastConnectionsBalancer::new();
            let chosen = block_on(lb.select_backend(&list, None)).unwrap();
            let min = *counts.iter().min().unwrap();
            let first_min = counts.iter().position(|c| *c == min).unwrap();

            prop_assert_eq!(chosen.active_connections(), min);
            prop_assert_eq!(chosen.addr.port as usize, first_min + 1);
        }
    }
}
