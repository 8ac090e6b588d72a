// src/main.rs
use anyhow::{Context, Result};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use tcp_load_balancer::{
    config,
    health::HealthChecker,
    metrics::{EventSink, Fanout, MetricsRegistry, TracingSink},
    proxy::BackendPool,
    server::{bind_tcp, Router},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tcp_load_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());

    info!("Loading configuration from: {}", config_path);
    let config = config::load_config_or_default(&config_path).await;

    // Event sinks
    let mut events = Fanout::new().with(Arc::new(TracingSink));
    let mut metrics = None;
    if config.metrics.enabled {
        let registry = MetricsRegistry::new()?;
        let collector = registry.collector();
        events = events.with(collector.clone());
        metrics = Some(collector);

        let metrics_addr: SocketAddr = ([0, 0, 0, 0], config.metrics.port).into();
        start_metrics_server(metrics_addr, registry, config.metrics.path.clone())?;
    }
    let events: Arc<dyn EventSink> = Arc::new(events);

    // Registry + router
    let pool = Arc::new(BackendPool::new(
        config.backends.clone(),
        config.health_check.assume_healthy,
    ));
    for row in pool.snapshot().await {
        info!(backend = %row.addr, status = %row.status, "Backend registered");
    }
    let router = Arc::new(Router::new(
        pool.clone(),
        &config.algorithm,
        events.clone(),
        config.proxy.clone(),
    ));

    // Start health checker
    let checker = Arc::new(HealthChecker::new(
        config.health_check.clone(),
        pool.clone(),
        events.clone(),
        metrics,
    )?);
    tokio::spawn(checker.clone().start());

    // Bind failure is fatal
    let listener = bind_tcp(&config.listen.address()).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(router.serve(listener, shutdown_rx));

    shutdown_signal().await;
    checker.shutdown();
    let _ = shutdown_tx.send(true);

    server
        .await
        .context("Router task panicked")?
        .context("Router stopped with an error")?;

    info!("Load balancer stopped");
    Ok(())
}

fn start_metrics_server(addr: SocketAddr, registry: MetricsRegistry, path: String) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    let response = if req.uri().path() == path.as_str() {
                        match registry.gather() {
                            Ok(body) => {
                                let mut response = Response::new(Body::from(body));
                                response.headers_mut().insert(
                                    hyper::header::CONTENT_TYPE,
                                    hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                                );
                                response
                            }
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                status_response(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                            }
                        }
                    } else {
                        status_response(StatusCode::NOT_FOUND, "Not Found")
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?
        .serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

fn status_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
