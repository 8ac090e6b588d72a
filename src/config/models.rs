// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            backends: Vec::new(),
            algorithm: default_algorithm(),
            health_check: HealthCheckConfig::default(),
            proxy: ProxyConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.host.is_empty() {
            return Err(ConfigError::Invalid("listen.host must not be empty".into()));
        }

        for backend in &self.backends {
            if backend.host.is_empty() {
                return Err(ConfigError::Invalid("backend host must not be empty".into()));
            }
            if backend.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "backend {} has port 0",
                    backend.host
                )));
            }
        }

        let hc = &self.health_check;
        if hc.interval_secs == 0 {
            return Err(ConfigError::Invalid("health_check.interval_secs must be > 0".into()));
        }
        if hc.timeout_ms == 0 {
            return Err(ConfigError::Invalid("health_check.timeout_ms must be > 0".into()));
        }
        if hc.unhealthy_threshold == 0 || hc.healthy_threshold == 0 {
            return Err(ConfigError::Invalid("health_check thresholds must be >= 1".into()));
        }
        if !hc.enabled && !hc.assume_healthy {
            // nothing would ever move a backend out of Unknown
            return Err(ConfigError::Invalid(
                "health_check.assume_healthy must be true when health checks are disabled".into(),
            ));
        }
        if !hc.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "health_check.path must be absolute, got {:?}",
                hc.path
            )));
        }

        if self.proxy.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("proxy.connect_timeout_ms must be > 0".into()));
        }
        if self.proxy.buffer_size == 0 {
            return Err(ConfigError::Invalid("proxy.buffer_size must be > 0".into()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
        }
    }
}

impl ListenConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One upstream endpoint. Order in the file is the base ordering used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
}

impl BackendConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_path")]
    pub path: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_threshold")]
    pub unhealthy_threshold: u32,
    #[serde(default = "default_threshold")]
    pub healthy_threshold: u32,
    /// Start every backend HEALTHY so traffic flows before the first probe round.
    #[serde(default = "default_true")]
    pub assume_healthy: bool,
    /// 0 disables backoff: unhealthy backends are probed every interval.
    #[serde(default)]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_health_path(),
            interval_secs: default_interval_secs(),
            timeout_ms: default_timeout_ms(),
            unhealthy_threshold: default_threshold(),
            healthy_threshold: default_threshold(),
            assume_healthy: true,
            backoff_base_ms: 0,
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Session inactivity limit: fires once neither direction has moved bytes for this long.
    /// Unset means idle connections live forever.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_secs: None,
            buffer_size: default_buffer_size(),
        }
    }
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_algorithm() -> String {
    "round_robin".to_string()
}

fn default_listen_host() -> String {
    "127.0.0.1".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_interval_secs() -> u64 {
    10
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_threshold() -> u32 {
    1
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_buffer_size() -> usize {
    8192
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
