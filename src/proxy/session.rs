// src/proxy/session.rs
use super::backend::{Backend, BackendAddr};
use crate::config::ProxyConfig;
use crate::metrics::CloseReason;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("No healthy backends available")]
    NoHealthyBackends,

    #[error("Failed to connect to backend {backend}: {source}")]
    Connect {
        backend: BackendAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to backend {0}")]
    ConnectTimeout(BackendAddr),

    #[error("Relay I/O error: {0}")]
    Relay(#[source] std::io::Error),

    #[error("Relay idle for {0:?}")]
    IdleTimeout(Duration),

    #[error("Relay task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ProxyError {
    pub fn close_reason(&self) -> CloseReason {
        match self {
            ProxyError::NoHealthyBackends => CloseReason::NoBackend,
            ProxyError::Connect { source, .. } => CloseReason::ConnectFailed(source.to_string()),
            ProxyError::ConnectTimeout(_) => CloseReason::ConnectTimeout,
            ProxyError::Relay(e) => CloseReason::RelayError(e.to_string()),
            ProxyError::IdleTimeout(_) => CloseReason::IdleTimeout,
            ProxyError::Task(e) => CloseReason::RelayError(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub bytes_to_backend: u64,
    pub bytes_to_client: u64,
}

#[derive(Debug)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub outcome: Result<(), ProxyError>,
}

impl SessionReport {
    pub fn close_reason(&self) -> CloseReason {
        match &self.outcome {
            Ok(()) => CloseReason::Completed,
            Err(e) => e.close_reason(),
        }
    }
}

/// One client connection relayed to one backend.
///
/// Owns both sockets. The backend's connection count is held from a
/// successful connect until both relay directions have ended.
pub struct ProxySession {
    id: Uuid,
    client: TcpStream,
    backend: Arc<Backend>,
    config: Arc<ProxyConfig>,
}

impl ProxySession {
    pub fn new(id: Uuid, client: TcpStream, backend: Arc<Backend>, config: Arc<ProxyConfig>) -> Self {
        Self {
            id,
            client,
            backend,
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn run(self) -> SessionReport {
        let addr = &self.backend.addr;
        let connect = timeout(
            self.config.connect_timeout(),
            TcpStream::connect((addr.host.as_str(), addr.port)),
        )
        .await;

        let upstream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return SessionReport {
                    stats: SessionStats::default(),
                    outcome: Err(ProxyError::Connect {
                        backend: addr.clone(),
                        source,
                    }),
                };
            }
            Err(_) => {
                return SessionReport {
                    stats: SessionStats::default(),
                    outcome: Err(ProxyError::ConnectTimeout(addr.clone())),
                };
            }
        };

        let _guard = self.backend.acquire();
        debug!(session = %self.id, backend = %addr, "Backend connected");

        let to_backend_bytes = Arc::new(AtomicU64::new(0));
        let to_client_bytes = Arc::new(AtomicU64::new(0));

        let (client_read, client_write) = self.client.into_split();
        let (upstream_read, upstream_write) = upstream.into_split();

        let buffer_size = self.config.buffer_size;
        let idle = self.config.idle_timeout();
        let activity = Arc::new(Activity::new());

        let mut to_backend = tokio::spawn(relay(
            client_read,
            upstream_write,
            to_backend_bytes.clone(),
            buffer_size,
            idle,
            activity.clone(),
        ));
        let mut to_client = tokio::spawn(relay(
            upstream_read,
            client_write,
            to_client_bytes.clone(),
            buffer_size,
            idle,
            activity,
        ));

        let (first, backend_leg_first) = tokio::select! {
            res = &mut to_backend => (res, true),
            res = &mut to_client => (res, false),
        };
        let other = if backend_leg_first { to_client } else { to_backend };

        let outcome = finish(first, other).await;

        SessionReport {
            stats: SessionStats {
                bytes_to_backend: to_backend_bytes.load(Ordering::Relaxed),
                bytes_to_client: to_client_bytes.load(Ordering::Relaxed),
            },
            outcome,
        }
    }
}

/// A clean end-of-stream on one leg lets the other drain; an error on one
/// leg tears the other down.
async fn finish(
    first: Result<Result<(), ProxyError>, tokio::task::JoinError>,
    other: JoinHandle<Result<(), ProxyError>>,
) -> Result<(), ProxyError> {
    match first {
        Ok(Ok(())) => other.await?,
        Ok(Err(e)) => {
            other.abort();
            let _ = other.await;
            Err(e)
        }
        Err(e) => {
            other.abort();
            let _ = other.await;
            Err(ProxyError::Task(e))
        }
    }
}

/// Last time either direction of a session moved bytes.
#[derive(Debug)]
struct Activity {
    started: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(now, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }
}

/// Copy one direction until EOF, then half-close the destination.
///
/// With an idle limit, the read only gives up once the whole session has
/// been quiet for that long; traffic in the other direction keeps it alive.
async fn relay<R, W>(
    mut reader: R,
    mut writer: W,
    counter: Arc<AtomicU64>,
    buffer_size: usize,
    idle: Option<Duration>,
    activity: Arc<Activity>,
) -> Result<(), ProxyError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];

    loop {
        let read = match idle {
            Some(limit) => loop {
                let remaining = limit.saturating_sub(activity.idle_for());
                if remaining.is_zero() {
                    return Err(ProxyError::IdleTimeout(limit));
                }
                // read is cancel safe, so an expired wait loses nothing
                if let Ok(read) = timeout(remaining, reader.read(&mut buf)).await {
                    break read;
                }
            },
            None => reader.read(&mut buf).await,
        };
        let n = read.map_err(ProxyError::Relay)?;
        if n == 0 {
            break;
        }
        activity.touch();

        writer.write_all(&buf[..n]).await.map_err(ProxyError::Relay)?;
        counter.fetch_add(n as u64, Ordering::Relaxed);
        activity.touch();
    }

    // the peer may already be gone; nothing left to signal then
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Half-close failed");
    }
    Ok(())
}
