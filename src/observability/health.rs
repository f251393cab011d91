//! Health check HTTP server for container orchestration
//!
//! Provides HTTP endpoints for monitoring relay status, supporting both
//! human operators and container orchestration platforms.

use crate::observability::metrics::{current_timestamp, metrics};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warp::http::StatusCode;
use warp::Filter;

/// HTTP health check server
pub struct HealthServer {
    service_name: String,
    port: u16,
    telegram_connected: Arc<AtomicBool>,
    client_available: Arc<AtomicBool>,
    last_message_handled: Arc<AtomicU64>,
}

impl HealthServer {
    /// Create new health server
    pub fn new(service_name: String, port: u16) -> Self {
        Self {
            service_name,
            port,
            telegram_connected: Arc::new(AtomicBool::new(false)),
            client_available: Arc::new(AtomicBool::new(false)),
            last_message_handled: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Update Telegram polling status
    pub fn set_telegram_connected(&self, connected: bool) {
        self.telegram_connected.store(connected, Ordering::Relaxed);
    }

    /// Record whether the generation client initialized
    pub fn set_client_available(&self, available: bool) {
        self.client_available.store(available, Ordering::Relaxed);
    }

    /// Update last message handled timestamp
    pub fn set_last_message_handled(&self, timestamp: u64) {
        self.last_message_handled.store(timestamp, Ordering::Relaxed);
    }

    /// Start the HTTP health server, stopping when `shutdown` is cancelled
    pub async fn start(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), warp::Error> {
        let health_server = self.clone();
        let ready_server = self.clone();

        // GET /health - overall status with individual checks
        let health_route = warp::path("health").and(warp::get()).and_then(move || {
            let server = health_server.clone();
            async move {
                let status = server.get_health_status();
                let code = if status.status == "healthy" {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&status), code))
            }
        });

        // GET /metrics - complete metrics export
        let metrics_route = warp::path("metrics").and(warp::get()).and_then(|| async move {
            Ok::<_, Infallible>(warp::reply::json(&metrics().get_metrics()))
        });

        // GET /ready - ready once Telegram polling is up
        let ready_route = warp::path("ready").and(warp::get()).and_then(move || {
            let server = ready_server.clone();
            async move {
                let ready = server.telegram_connected.load(Ordering::Relaxed);
                let response = ReadinessResponse {
                    ready,
                    timestamp: current_timestamp(),
                };
                let code = if ready {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&response), code))
            }
        });

        // GET /live - process liveness
        let live_route = warp::path("live").and(warp::get()).and_then(|| async move {
            let response = LivenessResponse {
                alive: true,
                timestamp: current_timestamp(),
            };
            Ok::<_, Infallible>(warp::reply::json(&response))
        });

        let routes = health_route.or(metrics_route).or(ready_route).or(live_route);

        tracing::info!(port = self.port, "Starting health server");

        let (_, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(([0, 0, 0, 0], self.port), async move {
                shutdown.cancelled().await;
            })?;
        server.await;

        tracing::info!("Health server stopped");
        Ok(())
    }

    fn get_health_status(&self) -> HealthStatus {
        let now = current_timestamp();

        let mut checks = HashMap::new();
        checks.insert("telegram".to_string(), self.check_telegram());
        checks.insert("generation_client".to_string(), self.check_client());

        let overall_healthy = checks.values().all(|check| check.status == "healthy");
        let status = if overall_healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        };

        HealthStatus {
            status,
            timestamp: now,
            service: self.service_name.clone(),
            uptime_seconds: metrics().get_metrics().lifecycle.uptime_seconds,
            last_message_handled: self.last_message_handled.load(Ordering::Relaxed),
            checks,
        }
    }

    fn check_telegram(&self) -> HealthCheck {
        let now = current_timestamp();
        if self.telegram_connected.load(Ordering::Relaxed) {
            HealthCheck {
                status: "healthy".to_string(),
                message: Some("Polling Telegram for updates".to_string()),
                last_check: now,
            }
        } else {
            HealthCheck {
                status: "unhealthy".to_string(),
                message: Some("Telegram polling not running".to_string()),
                last_check: now,
            }
        }
    }

    // An unavailable client still answers users with a notice
    fn check_client(&self) -> HealthCheck {
        let now = current_timestamp();
        if self.client_available.load(Ordering::Relaxed) {
            HealthCheck {
                status: "healthy".to_string(),
                message: Some("Generation client initialized".to_string()),
                last_check: now,
            }
        } else {
            HealthCheck {
                status: "unavailable".to_string(),
                message: Some("Generation client failed to initialize".to_string()),
                last_check: now,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    service: String,
    uptime_seconds: u64,
    last_message_handled: u64,
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}
