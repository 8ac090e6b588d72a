// src/load_balancer/round_robin.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Cycles through the healthy list.
///
/// The cursor only ever grows and is reduced modulo the length of whatever
/// list the current call sees. When the healthy set changes size between
/// calls a backend can be skipped or repeated once; that is accepted.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LoadBalancer for RoundRobinBalancer {
    async fn select_backend(
        &self,
        backends: &[Arc<Backend>],
        _client_key: Option<&str>,
    ) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let index = self.counter.fetch_add(1, Ordering::Relaxed) % backends.len();
        Some(backends[index].clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{backends, block_on, ports};
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_ten_selections_over_three() {
        let list = backends(&[1, 2, 3]);
        let lb = RoundRobinBalancer::new();

        let mut picked = Vec::new();
        for _ in 0..10 {
            picked.push(lb.select_backend(&list, None).await.unwrap());
        }
        assert_eq!(ports(&picked), vec![1, 2, 3, 1, 2, 3, 1, 2, 3, 1]);
    }

    #[tokio::test]
    async fn test_empty_returns_none() {
        let lb = RoundRobinBalancer::new();
        assert!(lb.select_backend(&[], None).await.is_none());
    }

    #[tokio::test]
    async fn test_cursor_advances_modulo_current_size() {
        let lb = RoundRobinBalancer::new();
        let three = backends(&[1, 2, 3]);
        let two = backends(&[1, 3]);

        assert_eq!(lb.select_backend(&three, None).await.unwrap().addr.port, 1);
        assert_eq!(lb.select_backend(&three, None).await.unwrap().addr.port, 2);
        // cursor is now 2; 2 % 2 == 0
        assert_eq!(lb.select_backend(&two, None).await.unwrap().addr.port, 1);
        assert_eq!(lb.select_backend(&two, None).await.unwrap().addr.port, 3);
    }

    proptest! {
        #[test]
        fn prop_visits_every_backend_before_repeating(n in 1usize..16, warmup in 0usize..40) {
            let port_list: Vec<u16> = (1..=n as u16).collect();
            let list = backends(&port_list);
            let lb = RoundRobinBalancer::new();

            let window = block_on(async {
                for _ in 0..warmup {
                    lb.select_backend(&list, None).await;
                }
                let mut picked = Vec::new();
                for _ in 0..n {
                    picked.push(lb.select_backend(&list, None).await.unwrap());
                }
                picked
            });

            let mut seen = ports(&window);
            seen.sort_unstable();
            prop_assert_eq!(seen, port_list);
        }
    }
}
