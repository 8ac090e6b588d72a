// src/metrics/collector.rs
use super::events::{Event, EventSink};
use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Connection metrics
    pub connections_accepted_total: IntCounter,
    pub sessions_closed_total: IntCounterVec,
    pub active_sessions: IntGauge,
    pub bytes_relayed_total: IntCounterVec,

    // Backend metrics
    pub backend_selections_total: IntCounterVec,
    pub backend_connections_active: IntGaugeVec,
    pub backend_health_status: IntGaugeVec,

    // Pool metrics
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let connections_accepted_total = IntCounter::new(
            "lb_connections_accepted_total",
            "Total client connections accepted",
        )?;
        registry.register(Box::new(connections_accepted_total.clone()))?;

        let sessions_closed_total = IntCounterVec::new(
            Opts::new("lb_sessions_closed_total", "Sessions closed, by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(sessions_closed_total.clone()))?;

        let active_sessions = IntGauge::new("lb_active_sessions", "Sessions currently open")?;
        registry.register(Box::new(active_sessions.clone()))?;

        let bytes_relayed_total = IntCounterVec::new(
            Opts::new("lb_bytes_relayed_total", "Bytes relayed, by direction"),
            &["direction"],
        )?;
        registry.register(Box::new(bytes_relayed_total.clone()))?;

        let backend_selections_total = IntCounterVec::new(
            Opts::new("lb_backend_selections_total", "Times a backend was selected"),
            &["backend"],
        )?;
        registry.register(Box::new(backend_selections_total.clone()))?;

        let backend_connections_active = IntGaugeVec::new(
            Opts::new(
                "lb_backend_connections_active",
                "Sessions currently assigned to a backend",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_connections_active.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "lb_backend_health_status",
                "Backend health status (1=healthy, 0=unhealthy)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let healthy_backends =
            IntGauge::new("lb_healthy_backends", "Number of healthy backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends =
            IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            connections_accepted_total,
            sessions_closed_total,
            active_sessions,
            bytes_relayed_total,
            backend_selections_total,
            backend_connections_active,
            backend_health_status,
            healthy_backends,
            total_backends,
        })
    }

    pub fn update_backend_health(&self, backend: &str, healthy: bool) {
        let value = if healthy { 1 } else { 0 };
        self.backend_health_status
            .with_label_values(&[backend])
            .set(value);
    }

    pub fn update_backend_counts(&self, healthy: usize, total: usize) {
        self.healthy_backends.set(healthy as i64);
        self.total_backends.set(total as i64);
    }
}

impl EventSink for MetricsCollector {
    fn emit(&self, event: &Event) {
        match event {
            Event::ConnectionAccepted { .. } => {
                self.connections_accepted_total.inc();
                self.active_sessions.inc();
            }
            Event::BackendSelected { backend, .. } => {
                let label = backend.to_string();
                self.backend_selections_total
                    .with_label_values(&[label.as_str()])
                    .inc();
                self.backend_connections_active
                    .with_label_values(&[label.as_str()])
                    .inc();
            }
            Event::HealthTransition { backend, to, .. } => {
                self.update_backend_health(&backend.to_string(), to.is_routable());
            }
            Event::SessionClosed {
                backend,
                reason,
                bytes_to_backend,
                bytes_to_client,
                ..
            } => {
                self.active_sessions.dec();
                // every BackendSelected is closed by a SessionClosed naming the same backend
                if let Some(backend) = backend {
                    let label = backend.to_string();
                    self.backend_connections_active
                        .with_label_values(&[label.as_str()])
                        .dec();
                }
                self.sessions_closed_total
                    .with_label_values(&[reason.label()])
                    .inc();
                self.bytes_relayed_total
                    .with_label_values(&["to_backend"])
                    .inc_by(*bytes_to_backend);
                self.bytes_relayed_total
                    .with_label_values(&["to_client"])
                    .inc_by(*bytes_to_client);
            }
        }
    }
}
