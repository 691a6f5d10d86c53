//! Active Health Checker
//!
//! Health monitors for routes and backend servers: a probing monitor that
//! checks one target periodically via TCP or HTTP, and a static monitor whose
//! status is set by its owner.

use crate::domain::ports::HealthMonitor;
use crate::domain::value_objects::HealthStatus;
use crate::error::{GatewayError, Result};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between health checks
    pub interval: Duration,
    /// Timeout for each probe
    pub timeout: Duration,
    /// Number of consecutive failures before marking unhealthy
    pub unhealthy_threshold: u32,
    /// Number of consecutive successes before marking healthy again
    pub healthy_threshold: u32,
    /// Type of health check
    pub check_type: HealthCheckType,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            unhealthy_threshold: 3,
            healthy_threshold: 2,
            check_type: HealthCheckType::Tcp,
        }
    }
}

/// Type of health check probe.
#[derive(Debug, Clone)]
pub enum HealthCheckType {
    /// Simple TCP connection check
    Tcp,
    /// HTTP GET request (expects 2xx response)
    Http { path: String },
}

/// Result of a single probe.
#[derive(Debug, Clone)]
pub enum HealthCheckResult {
    /// Target answered as expected.
    Success { latency: Duration },
    /// Target is unreachable or answered with a failure.
    Failure { error: String, latency: Duration },
    /// The probe itself could not be executed.
    Error { error: String },
}

impl HealthCheckResult {
    pub fn is_success(&self) -> bool {
        matches!(self, HealthCheckResult::Success { .. })
    }
}

#[derive(Debug)]
struct ProbeState {
    status: HealthStatus,
    up_since: Option<Instant>,
    latency: Duration,
    last_error: Option<String>,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl Default for ProbeState {
    fn default() -> Self {
        Self {
            status: HealthStatus::Starting,
            up_since: None,
            latency: Duration::ZERO,
            last_error: None,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

/// Periodically probes one `host:port` target.
///
/// Reports `Starting` until the first verdict, then `Healthy` or `Unhealthy`
/// according to the configured thresholds. A probe that cannot run at all
/// (for example a malformed target) reports `Error`.
pub struct ProbeHealthMonitor {
    target: String,
    config: HealthCheckConfig,
    state: RwLock<ProbeState>,
}

impl ProbeHealthMonitor {
    pub fn new(target: impl Into<String>, config: HealthCheckConfig) -> Self {
        Self {
            target: target.into(),
            config,
            state: RwLock::new(ProbeState::default()),
        }
    }

    /// Build a monitor for the authority of an `http://` or `https://` URL.
    pub fn from_url(url: &str, config: HealthCheckConfig) -> Result<Self> {
        let uri: http::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            GatewayError::InvalidUpstream {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let host = uri.host().ok_or_else(|| GatewayError::InvalidUpstream {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?;
        let port = uri
            .port_u16()
            .unwrap_or(if uri.scheme_str() == Some("https") { 443 } else { 80 });

        Ok(Self::new(format!("{}:{}", host, port), config))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Start the probe loop.
    ///
    /// The loop holds a weak reference and ends once the monitor is dropped.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(monitor) = weak.upgrade() else {
                    break;
                };
                let result = monitor.check_once().await;
                monitor.apply(result);
            }
        })
    }

    /// Perform a single probe without updating state.
    pub async fn check_once(&self) -> HealthCheckResult {
        let start = Instant::now();

        let result = match &self.config.check_type {
            HealthCheckType::Tcp => Self::tcp_check(&self.target, self.config.timeout).await,
            HealthCheckType::Http { path } => {
                Self::http_check(&self.target, path, self.config.timeout).await
            }
        };

        let latency = start.elapsed();

        match result {
            Ok(()) => HealthCheckResult::Success { latency },
            Err(ProbeError::Setup(error)) => HealthCheckResult::Error { error },
            Err(ProbeError::Failed(error)) => HealthCheckResult::Failure { error, latency },
        }
    }

    /// Fold a probe result into the monitor state.
    pub fn apply(&self, result: HealthCheckResult) {
        let mut state = self.state.write();

        match result {
            HealthCheckResult::Success { latency } => {
                state.consecutive_successes += 1;
                state.consecutive_failures = 0;
                state.latency = latency;
                state.last_error = None;

                let recovered = state.status == HealthStatus::Starting
                    || state.consecutive_successes >= self.config.healthy_threshold;
                if state.status != HealthStatus::Healthy && recovered {
                    state.status = HealthStatus::Healthy;
                    state.up_since = Some(Instant::now());
                    tracing::info!("{} is now healthy", self.target);
                }
            }
            HealthCheckResult::Failure { error, latency } => {
                state.consecutive_failures += 1;
                state.consecutive_successes = 0;
                state.latency = latency;

                if state.status != HealthStatus::Unhealthy
                    && state.consecutive_failures >= self.config.unhealthy_threshold
                {
                    state.status = HealthStatus::Unhealthy;
                    state.up_since = None;
                    tracing::warn!("{} is now unhealthy: {}", self.target, error);
                }
                state.last_error = Some(error);
            }
            HealthCheckResult::Error { error } => {
                state.consecutive_successes = 0;
                if state.status != HealthStatus::Error {
                    tracing::error!("health check for {} failed to run: {}", self.target, error);
                }
                state.status = HealthStatus::Error;
                state.up_since = None;
                state.last_error = Some(error);
            }
        }
    }

    /// TCP connection check.
    async fn tcp_check(addr: &str, timeout: Duration) -> std::result::Result<(), ProbeError> {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(mut stream)) => {
                let _ = stream.shutdown().await;
                Ok(())
            }
            Ok(Err(e)) => Err(ProbeError::Failed(format!("connection failed: {}", e))),
            Err(_) => Err(ProbeError::Failed("connection timeout".to_string())),
        }
    }

    /// HTTP health check.
    async fn http_check(
        addr: &str,
        path: &str,
        timeout: Duration,
    ) -> std::result::Result<(), ProbeError> {
        let url = format!("http://{}{}", addr, path);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Setup(format!("client error: {}", e)))?;

        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(ProbeError::Failed(format!("unhealthy status: {}", resp.status()))),
            Err(e) if e.is_builder() => Err(ProbeError::Setup(format!("invalid probe url: {}", e))),
            Err(e) => Err(ProbeError::Failed(format!("request failed: {}", e))),
        }
    }
}

enum ProbeError {
    Setup(String),
    Failed(String),
}

impl HealthMonitor for ProbeHealthMonitor {
    fn status(&self) -> HealthStatus {
        self.state.read().status
    }

    fn uptime(&self) -> Duration {
        self.state
            .read()
            .up_since
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    fn latency(&self) -> Duration {
        self.state.read().latency
    }

    fn detail(&self) -> String {
        let state = self.state.read();
        match &state.last_error {
            Some(err) => format!("{}: {}", state.status, err),
            None => state.status.to_string(),
        }
    }
}

/// A monitor whose status is set explicitly by its owner.
pub struct StaticHealth {
    status: RwLock<HealthStatus>,
    since: RwLock<Instant>,
}

impl StaticHealth {
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status: RwLock::new(status),
            since: RwLock::new(Instant::now()),
        }
    }

    pub fn set_status(&self, status: HealthStatus) {
        let mut current = self.status.write();
        if *current != status {
            *current = status;
            *self.since.write() = Instant::now();
        }
    }
}

impl HealthMonitor for StaticHealth {
    fn status(&self) -> HealthStatus {
        *self.status.read()
    }

    fn uptime(&self) -> Duration {
        if self.status().good() {
            self.since.read().elapsed()
        } else {
            Duration::ZERO
        }
    }

    fn latency(&self) -> Duration {
        Duration::ZERO
    }

    fn detail(&self) -> String {
        self.status().to_string()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn failure() -> HealthCheckResult {
        HealthCheckResult::Failure {
            error: "conn refused".to_string(),
            latency: Duration::from_millis(5),
        }
    }

    fn success() -> HealthCheckResult {
        HealthCheckResult::Success {
            latency: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_health_check_config_default() {
        let config = HealthCheckConfig::default();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.unhealthy_threshold, 3);
        assert_eq!(config.healthy_threshold, 2);
    }

    #[test]
    fn test_monitor_starts_in_starting() {
        let monitor = ProbeHealthMonitor::new("127.0.0.1:1", HealthCheckConfig::default());
        assert_eq!(monitor.status(), HealthStatus::Starting);
        assert!(monitor.status().good());
        assert_eq!(monitor.uptime(), Duration::ZERO);
    }

    #[test]
    fn test_from_url_derives_target() {
        let config = HealthCheckConfig::default();
        let monitor = ProbeHealthMonitor::from_url("http://10.0.0.1:3000/app", config.clone()).unwrap();
        assert_eq!(monitor.target(), "10.0.0.1:3000");

        let monitor = ProbeHealthMonitor::from_url("https://example.com", config.clone()).unwrap();
        assert_eq!(monitor.target(), "example.com:443");

        let monitor = ProbeHealthMonitor::from_url("http://example.com", config.clone()).unwrap();
        assert_eq!(monitor.target(), "example.com:80");

        assert!(ProbeHealthMonitor::from_url("/relative", config).is_err());
    }

    #[test]
    fn test_first_success_is_healthy() {
        let monitor = ProbeHealthMonitor::new("t", HealthCheckConfig::default());
        monitor.apply(success());
        assert_eq!(monitor.status(), HealthStatus::Healthy);
        assert_eq!(monitor.latency(), Duration::from_millis(10));
    }

    #[test]
    fn test_becomes_unhealthy_after_threshold() {
        let monitor = ProbeHealthMonitor::new(
            "t",
            HealthCheckConfig {
                unhealthy_threshold: 2,
                ..Default::default()
            },
        );
        monitor.apply(success());

        monitor.apply(failure());
        assert_eq!(monitor.status(), HealthStatus::Healthy);

        monitor.apply(failure());
        assert_eq!(monitor.status(), HealthStatus::Unhealthy);
        assert!(monitor.detail().contains("conn refused"));
    }

    #[test]
    fn test_recovers_after_healthy_threshold() {
        let monitor = ProbeHealthMonitor::new(
            "t",
            HealthCheckConfig {
                unhealthy_threshold: 1,
                healthy_threshold: 2,
                ..Default::default()
            },
        );
        monitor.apply(failure());
        assert_eq!(monitor.status(), HealthStatus::Unhealthy);

        monitor.apply(success());
        assert_eq!(monitor.status(), HealthStatus::Unhealthy);

        monitor.apply(success());
        assert_eq!(monitor.status(), HealthStatus::Healthy);
        assert_eq!(monitor.detail(), "healthy");
    }

    #[test]
    fn test_probe_error_reports_error() {
        let monitor = ProbeHealthMonitor::new("t", HealthCheckConfig::default());
        monitor.apply(HealthCheckResult::Error {
            error: "bad target".to_string(),
        });
        assert_eq!(monitor.status(), HealthStatus::Error);
        assert!(monitor.status().bad());
    }

    #[tokio::test]
    async fn test_tcp_check_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let monitor = ProbeHealthMonitor::new(addr.to_string(), HealthCheckConfig::default());
        assert!(monitor.check_once().await.is_success());
    }

    #[tokio::test]
    async fn test_tcp_check_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let monitor = ProbeHealthMonitor::new(
            addr.to_string(),
            HealthCheckConfig {
                timeout: Duration::from_millis(200),
                ..Default::default()
            },
        );
        assert!(!monitor.check_once().await.is_success());
    }

    #[tokio::test]
    async fn test_start_updates_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let monitor = Arc::new(ProbeHealthMonitor::new(
            addr.to_string(),
            HealthCheckConfig {
                interval: Duration::from_millis(20),
                ..Default::default()
            },
        ));
        let handle = monitor.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(monitor.status(), HealthStatus::Healthy);

        handle.abort();
    }

    // ===== StaticHealth Tests =====

    #[test]
    fn test_static_health() {
        let health = StaticHealth::new(HealthStatus::Healthy);
        assert_eq!(health.status(), HealthStatus::Healthy);

        health.set_status(HealthStatus::Unhealthy);
        assert_eq!(health.status(), HealthStatus::Unhealthy);
        assert_eq!(health.uptime(), Duration::ZERO);
        assert_eq!(health.detail(), "unhealthy");
    }
}
