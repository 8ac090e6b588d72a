// src/server/router.rs
use crate::config::{BackendConfig, ProxyConfig};
use crate::load_balancer::{load_balancer_from_name, LoadBalancer};
use crate::metrics::{Event, EventSink};
use crate::proxy::{Backend, BackendPool, ProxyError, ProxySession};
use arc_swap::ArcSwap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// Accepts client connections and hands each one to its own session task.
///
/// The strategy is resolved from its name only in [`Router::new`] and
/// [`Router::load_topology`]; the per-connection path loads it lock-free.
pub struct Router {
    pool: Arc<BackendPool>,
    strategy: ArcSwap<Box<dyn LoadBalancer>>,
    events: Arc<dyn EventSink>,
    proxy_config: Arc<ProxyConfig>,
}

impl Router {
    pub fn new(
        pool: Arc<BackendPool>,
        algorithm: &str,
        events: Arc<dyn EventSink>,
        proxy_config: ProxyConfig,
    ) -> Self {
        let strategy = load_balancer_from_name(algorithm);
        info!(strategy = strategy.name(), "Load balancing strategy resolved");

        Self {
            pool,
            strategy: ArcSwap::from_pointee(strategy),
            events,
            proxy_config: Arc::new(proxy_config),
        }
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.load().name()
    }

    /// Replace the backend list and the strategy. Connections already
    /// dispatched keep the backend they were given.
    pub async fn load_topology(&self, backends: Vec<BackendConfig>, algorithm: &str) {
        let strategy = load_balancer_from_name(algorithm);
        self.pool.replace(backends).await;
        self.strategy.store(Arc::new(strategy));

        info!(
            strategy = self.strategy_name(),
            backends = self.pool.len().await,
            "Topology loaded"
        );
    }

    /// Pick a backend from the current healthy set.
    pub async fn select(&self, client_key: Option<&str>) -> Result<Arc<Backend>, ProxyError> {
        self.select_with_strategy(client_key)
            .await
            .map(|(backend, _)| backend)
    }

    /// Like [`Router::select`], also naming the strategy that made the pick.
    async fn select_with_strategy(
        &self,
        client_key: Option<&str>,
    ) -> Result<(Arc<Backend>, &'static str), ProxyError> {
        let healthy = self.pool.list_healthy().await;
        let strategy = self.strategy.load_full();

        strategy
            .select_backend(&healthy, client_key)
            .await
            .map(|backend| (backend, strategy.name()))
            .ok_or(ProxyError::NoHealthyBackends)
    }

    /// Run the accept loop until `shutdown` turns true.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        info!(address = %listener.local_addr()?, "Load balancer listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let router = self.clone();
                            tokio::spawn(async move {
                                router.handle_connection(stream, peer).await;
                            });
                        }
                        Err(e) => {
                            // usually fd exhaustion; back off instead of spinning
                            warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Router shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let session = Uuid::new_v4();
        self.events.emit(&Event::ConnectionAccepted { session, peer });

        let client_key = peer.ip().to_string();
        let (backend, strategy) = match self.select_with_strategy(Some(client_key.as_str())).await {
            Ok(picked) => picked,
            Err(e) => {
                drop(stream);
                self.events.emit(&Event::SessionClosed {
                    session,
                    backend: None,
                    reason: e.close_reason(),
                    bytes_to_backend: 0,
                    bytes_to_client: 0,
                });
                return;
            }
        };

        self.events.emit(&Event::BackendSelected {
            session,
            backend: backend.addr.clone(),
            strategy,
        });

        let report = ProxySession::new(session, stream, backend.clone(), self.proxy_config.clone())
            .run()
            .await;

        self.events.emit(&Event::SessionClosed {
            session,
            backend: Some(backend.addr.clone()),
            reason: report.close_reason(),
            bytes_to_backend: report.stats.bytes_to_backend,
            bytes_to_client: report.stats.bytes_to_client,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::test_support::RecordingSink;
    use crate::proxy::BackendAddr;

    fn router(ports: &[u16], algorithm: &str) -> Router {
        let configs = ports.iter().map(|p| BackendConfig::new("127.0.0.1", *p)).collect();
        let pool = Arc::new(BackendPool::new(configs, true));
        Router::new(pool, algorithm, Arc::new(RecordingSink::default()), ProxyConfig::default())
    }

    #[tokio::test]
    async fn test_unknown_algorithm_falls_back() {
        let r = router(&[1], "fastest_response");
        assert_eq!(r.strategy_name(), "round_robin");
    }

    #[tokio::test]
    async fn test_unhealthy_backend_never_selected_after_transition() {
        let r = router(&[1, 2, 3], "round_robin");
        let b = BackendAddr::new("127.0.0.1", 2);
        r.pool().set_health(&b, false).await;

        for _ in 0..12 {
            assert_ne!(r.select(None).await.unwrap().addr, b);
        }
    }

    #[tokio::test]
    async fn test_all_unhealthy_is_no_backend() {
        let r = router(&[1, 2], "least_connections");
        for port in [1, 2] {
            r.pool().set_health(&BackendAddr::new("127.0.0.1", port), false).await;
        }
        assert!(matches!(r.select(Some("10.0.0.1")).await, Err(ProxyError::NoHealthyBackends)));
    }

    #[tokio::test]
    async fn test_load_topology_swaps_list_and_strategy() {
        let r = router(&[1, 2], "round_robin");
        r.load_topology(
            vec![BackendConfig::new("127.0.0.1", 5), BackendConfig::new("127.0.0.1", 6)],
            "source_hash",
        )
        .await;

        assert_eq!(r.strategy_name(), "source_hash");
        let chosen = r.select(None).await.unwrap();
        assert_eq!(chosen.addr.port, 5);
        assert_eq!(r.pool().len().await, 2);
    }

    #[tokio::test]
    async fn test_selected_event_names_strategy_that_picked() {
        let sink = Arc::new(RecordingSink::default());
        let pool = Arc::new(BackendPool::new(vec![BackendConfig::new("127.0.0.1", 1)], true));
        let r = Router::new(pool, "round_robin", sink.clone(), ProxyConfig::default());

        r.load_topology(vec![BackendConfig::new("127.0.0.1", 1)], "least_connections")
            .await;
        let (picked, strategy) = r.select_with_strategy(None).await.unwrap();
        assert_eq!(picked.addr.port, 1);
        assert_eq!(strategy, "least_connections");

        // port 1 refuses, so the session ends right after selection
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();
        r.handle_connection(stream, peer).await;

        let names: Vec<_> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                Event::BackendSelected { strategy, .. } => Some(strategy),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["least_connections"]);
    }
}
