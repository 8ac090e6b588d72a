// src/load_balancer/source_hash.rs
use crate::load_balancer::LoadBalancer;
use crate::proxy::Backend;
use async_trait::async_trait;
use std::sync::Arc;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Fixed and unseeded, so a key maps to the same value in
/// every process.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Maps a client key onto the healthy list with `fnv1a_64(key) % len`.
///
/// Without a key the first backend is used. Stateless.
#[derive(Debug, Default)]
pub struct SourceHashBalancer;

impl SourceHashBalancer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoadBalancer for SourceHashBalancer {
    async fn select_backend(
        &self,
        backends: &[Arc<Backend>],
        client_key: Option<&str>,
    ) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let index = match client_key {
            Some(key) => (fnv1a_64(key.as_bytes()) % backends.len() as u64) as usize,
            None => 0,
        };
        Some(backends[index].clone())
    }

    fn name(&self) -> &'static str {
        "source_hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::test_support::{backends, block_on};
    use proptest::prelude::*;

    #[test]
    fn test_fnv_reference_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b"foobar"), 0x85944171f73967e8);
    }

    #[tokio::test]
    async fn test_missing_key_uses_first() {
        let list = backends(&[7, 8, 9]);
        let lb = SourceHashBalancer::new();
        assert_eq!(lb.select_backend(&list, None).await.unwrap().addr.port, 7);
    }

    #[tokio::test]
    async fn test_index_is_hash_mod_len() {
        let list = backends(&[1, 2, 3, 4, 5]);
        let lb = SourceHashBalancer::new();
        let key = "192.168.1.20";
        let expected = (fnv1a_64(key.as_bytes()) % 5) as usize;

        let chosen = lb.select_backend(&list, Some(key)).await.unwrap();
        assert_eq!(chosen.addr.port as usize, expected + 1);
    }

    #[tokio::test]
    async fn test_empty_returns_none() {
        let lb = SourceHashBalancer::new();
        assert!(lb.select_backend(&[], Some("10.0.0.1")).await.is_none());
    }

    proptest! {
        #[test]
        fn prop_same_key_same_backend(key in "[0-9a-f:.]{1,40}", n in 1u16..20) {
            let port_list: Vec<u16> = (1..=n).collect();
            let list = backends(&port_list);

            // separate instances stand in for separate processes
            let first = block_on(SourceHashBalancer::new().select_backend(&list, Some(key.as_str()))).unwrap();
            let second = block_on(SourceHashBalancer::new().select_backend(&list, Some(key.as_str()))).unwrap();
            prop_assert_eq!(&first.addr, &second.addr);
        }
    }
}
