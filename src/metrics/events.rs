// src/metrics/events.rs
use crate::health::HealthStatus;
use crate::proxy::BackendAddr;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Both directions reached end-of-stream.
    Completed,
    /// The healthy set was empty; the client was closed without forwarding.
    NoBackend,
    ConnectFailed(String),
    ConnectTimeout,
    RelayError(String),
    IdleTimeout,
}

impl CloseReason {
    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::NoBackend => "no_backend",
            CloseReason::ConnectFailed(_) => "connect_failed",
            CloseReason::ConnectTimeout => "connect_timeout",
            CloseReason::RelayError(_) => "relay_error",
            CloseReason::IdleTimeout => "idle_timeout",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ConnectFailed(e) | CloseReason::RelayError(e) => {
                write!(f, "{}: {}", self.label(), e)
            }
            _ => f.write_str(self.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ConnectionAccepted {
        session: Uuid,
        peer: SocketAddr,
    },
    BackendSelected {
        session: Uuid,
        backend: BackendAddr,
        strategy: &'static str,
    },
    HealthTransition {
        backend: BackendAddr,
        from: HealthStatus,
        to: HealthStatus,
    },
    SessionClosed {
        session: Uuid,
        backend: Option<BackendAddr>,
        reason: CloseReason,
        bytes_to_backend: u64,
        bytes_to_client: u64,
    },
}

/// Receives core events. Must not block: it is called inline on the
/// connection and probe paths.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Renders events as `tracing` records.
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &Event) {
        match event {
            Event::ConnectionAccepted { session, peer } => {
                debug!(%session, %peer, "Connection accepted");
            }
            Event::BackendSelected {
                session,
                backend,
                strategy,
            } => {
                debug!(%session, %backend, strategy, "Backend selected");
            }
            Event::HealthTransition { backend, from, to } => {
                if to.is_routable() {
                    info!(%backend, %from, %to, "Backend health changed");
                } else {
                    warn!(%backend, %from, %to, "Backend health changed");
                }
            }
            Event::SessionClosed {
                session,
                backend,
                reason,
                bytes_to_backend,
                bytes_to_client,
            } => {
                let backend = backend.as_ref().map(|b| b.to_string()).unwrap_or_default();
                match reason {
                    CloseReason::Completed => {
                        debug!(%session, %backend, bytes_to_backend, bytes_to_client, "Session closed");
                    }
                    CloseReason::NoBackend => {
                        warn!(%session, "No healthy backend available, closing client");
                    }
                    other => {
                        warn!(
                            %session, %backend, reason = %other, bytes_to_backend, bytes_to_client,
                            "Session closed with error"
                        );
                    }
                }
            }
        }
    }
}

/// Sends every event to each inner sink in order.
#[derive(Default, Clone)]
pub struct Fanout {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for Fanout {
    fn emit(&self, event: &Event) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Keeps every event for later assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;

    #[test]
    fn test_fanout_reaches_every_sink() {
        let a = Arc::new(RecordingSink::default());
        let b = Arc::new(RecordingSink::default());
        let fanout = Fanout::new()
            .with(a.clone())
            .with(Arc::new(TracingSink))
            .with(b.clone());

        let event = Event::HealthTransition {
            backend: BackendAddr::new("127.0.0.1", 8001),
            from: HealthStatus::Healthy,
            to: HealthStatus::Unhealthy,
        };
        fanout.emit(&event);

        assert_eq!(a.events(), vec![event.clone()]);
        assert_eq!(b.events(), vec![event]);
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::Completed.to_string(), "completed");
        assert_eq!(
            CloseReason::ConnectFailed("refused".into()).to_string(),
            "connect_failed: refused"
        );
    }
}
