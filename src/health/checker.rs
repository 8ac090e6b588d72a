// src/health/checker.rs
use super::backoff::ProbeBackoff;
use crate::config::HealthCheckConfig;
use crate::metrics::{Event, EventSink, MetricsCollector};
use crate::proxy::{Backend, BackendAddr, BackendPool};
use anyhow::Result;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info};
use url::Url;

/// Periodically probes every backend and writes the outcome into the pool.
///
/// Probe failures never escape this type; they only move health flags.
pub struct HealthChecker {
    config: HealthCheckConfig,
    pool: Arc<BackendPool>,
    client: Client,
    backoff: ProbeBackoff,
    events: Arc<dyn EventSink>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: tokio::sync::watch::Sender<bool>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct HealthCheckResult {
    pub backend: BackendAddr,
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRound {
    pub probed: usize,
    pub skipped: usize,
    pub healthy: usize,
    pub total: usize,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        pool: Arc<BackendPool>,
        events: Arc<dyn EventSink>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .no_proxy()
            .build()?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        Ok(Self {
            backoff: ProbeBackoff::from_config(&config),
            config,
            pool,
            client,
            events,
            metrics,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub async fn start(self: Arc<Self>) {
        if !self.config.enabled {
            info!("Active health checks disabled");
            return;
        }

        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(
            interval = ?self.config.interval(),
            path = %self.config.path,
            "Starting health checker"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.clone().check_all_backends().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Probe every backend once, concurrently.
    pub async fn check_all_backends(self: Arc<Self>) -> ProbeRound {
        let backends = self.pool.all_backends().await;
        let mut tasks = Vec::with_capacity(backends.len());

        for backend in backends.iter().cloned() {
            let checker = self.clone();
            tasks.push(tokio::spawn(async move { checker.check_backend(backend).await }));
        }

        let mut round = ProbeRound {
            total: backends.len(),
            ..ProbeRound::default()
        };

        for result in futures::future::join_all(tasks).await {
            match result {
                Ok(Some(check)) => {
                    round.probed += 1;
                    if check.healthy {
                        debug!(backend = %check.backend, ms = check.response_time_ms, "Probe ok");
                    } else {
                        debug!(
                            backend = %check.backend,
                            error = check.error.as_deref().unwrap_or(""),
                            "Probe failed"
                        );
                    }
                }
                Ok(None) => round.skipped += 1,
                Err(e) => error!("Health check task failed: {}", e),
            }
        }

        round.healthy = backends.iter().filter(|b| b.is_healthy()).count();

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(round.healthy, round.total);
        }

        debug!(
            healthy = round.healthy,
            total = round.total,
            skipped = round.skipped,
            "Health check round complete"
        );
        round
    }

    /// Returns `None` when the backend is still inside its backoff window.
    async fn check_backend(&self, backend: Arc<Backend>) -> Option<HealthCheckResult> {
        if self.in_backoff(&backend).await {
            return None;
        }

        let start = std::time::Instant::now();
        let (healthy, error) = self.probe(&backend.addr).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let transition = backend
            .record_probe(
                healthy,
                self.config.healthy_threshold as usize,
                self.config.unhealthy_threshold as usize,
            )
            .await;

        if let Some((from, to)) = transition {
            self.events.emit(&Event::HealthTransition {
                backend: backend.addr.clone(),
                from,
                to,
            });
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_health(&backend.id(), backend.is_healthy());
        }

        Some(HealthCheckResult {
            backend: backend.addr.clone(),
            healthy,
            response_time_ms,
            error,
        })
    }

    async fn in_backoff(&self, backend: &Backend) -> bool {
        if !self.backoff.is_enabled() || backend.is_healthy() {
            return false;
        }
        let Some(last) = backend.last_health_check().await else {
            return false;
        };

        let since = (Utc::now() - last).to_std().unwrap_or_default();
        since < self.backoff.delay(backend.consecutive_failures())
    }

    async fn probe(&self, addr: &BackendAddr) -> (bool, Option<String>) {
        let url = match probe_url(addr, &self.config.path) {
            Ok(url) => url,
            Err(e) => return (false, Some(format!("invalid probe url: {}", e))),
        };

        let result = timeout(self.config.timeout(), self.client.get(url).send()).await;

        match result {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    (true, None)
                } else {
                    (false, Some(format!("HTTP {}", status)))
                }
            }
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some("Request timeout".to_string())),
        }
    }
}

fn probe_url(addr: &BackendAddr, path: &str) -> Result<Url, url::ParseError> {
    let host = if addr.host.contains(':') && !addr.host.starts_with('[') {
        format!("[{}]", addr.host)
    } else {
        addr.host.clone()
    };
    Url::parse(&format!("http://{}:{}", host, addr.port))?.join(path)
}
