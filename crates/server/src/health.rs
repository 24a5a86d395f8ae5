//! Upstream health probing and the `/health` surfaces.
//!
//! Probes never fail: every outcome, including timeouts and cancellation, is folded into a
//! [`HealthReport`]. Nothing is cached; each request runs its checks afresh.

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bookstack_api::BookStackClient;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tri-state health; ordering is worst-first so the aggregate is the minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthStatus {
    Unhealthy,
    Degraded,
    Healthy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub description: Option<String>,
    pub data: Map<String, Value>,
    pub duration: Duration,
}

impl HealthReport {
    fn new(status: HealthStatus, description: impl Into<String>, data: Value) -> Self {
        Self {
            status,
            description: Some(description.into()),
            data: match data {
                Value::Object(m) => m,
                _ => Map::new(),
            },
            duration: Duration::ZERO,
        }
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    fn tags(&self) -> &[&'static str] {
        &[]
    }

    /// Must return promptly once `cancel` fires.
    async fn check(&self, cancel: &CancellationToken) -> HealthReport;
}

pub const READY_TAG: &str = "ready";

/// Calls BookStack's unauthenticated `/api/status` endpoint.
pub struct UpstreamStatusCheck {
    client: BookStackClient,
    timeout: Duration,
}

impl UpstreamStatusCheck {
    #[must_use]
    pub fn new(client: BookStackClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn timed_out(&self) -> HealthReport {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        tracing::error!(timeout_ms, "BookStack status check timed out");
        HealthReport::new(
            HealthStatus::Unhealthy,
            "BookStack API health check timed out",
            json!({ "error": "timed out", "timeoutMs": timeout_ms }),
        )
    }
}

#[async_trait]
impl HealthCheck for UpstreamStatusCheck {
    fn name(&self) -> &str {
        "bookstack"
    }

    fn tags(&self) -> &[&'static str] {
        &[READY_TAG]
    }

    async fn check(&self, cancel: &CancellationToken) -> HealthReport {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!("BookStack status check cancelled");
                return HealthReport::new(
                    HealthStatus::Unhealthy,
                    "BookStack API health check was cancelled",
                    json!({ "error": "cancelled" }),
                );
            }
            r = tokio::time::timeout(self.timeout, self.client.status()) => r,
        };

        let probe = match outcome {
            Err(_elapsed) => return self.timed_out(),
            Ok(Err(e)) if e.is_timeout() => return self.timed_out(),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "BookStack status check failed");
                return HealthReport::new(
                    HealthStatus::Unhealthy,
                    "BookStack API is not reachable",
                    json!({ "error": e.to_string() }),
                );
            }
            Ok(Ok(probe)) => probe,
        };

        if probe.is_success() {
            tracing::debug!(url = %probe.url, "BookStack status check succeeded");
            HealthReport::new(
                HealthStatus::Healthy,
                "BookStack API is responding",
                json!({ "statusUrl": probe.url, "response": probe.body }),
            )
        } else {
            tracing::warn!(
                url = %probe.url,
                status = probe.status,
                "BookStack status check returned non-success"
            );
            HealthReport::new(
                HealthStatus::Degraded,
                format!("BookStack API returned status code: {}", probe.status),
                json!({ "statusUrl": probe.url, "statusCode": probe.status }),
            )
        }
    }
}

/// Result of running a set of checks.
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub status: HealthStatus,
    pub checks: Vec<(String, HealthReport)>,
    pub total_duration: Duration,
}

impl AggregateReport {
    #[must_use]
    pub fn to_json(&self) -> Value {
        let checks: Vec<Value> = self
            .checks
            .iter()
            .map(|(name, r)| {
                json!({
                    "name": name,
                    "status": r.status,
                    "description": r.description,
                    "data": r.data,
                    "duration": format_duration(r.duration),
                })
            })
            .collect();
        json!({
            "status": self.status,
            "checks": checks,
            "totalDuration": format_duration(self.total_duration),
        })
    }

    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AggregateReport {
    fn into_response(self) -> Response {
        (self.http_status(), Json(self.to_json())).into_response()
    }
}

/// `hh:mm:ss.fffffff`.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let ticks = d.subsec_nanos() / 100;
    format!(
        "{:02}:{:02}:{:02}.{ticks:07}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    )
}

/// Registered checks plus the liveness/readiness/full compositions over them.
pub struct HealthService {
    checks: Vec<Arc<dyn HealthCheck>>,
    shutdown: CancellationToken,
}

impl HealthService {
    /// In-flight probes are cancelled when `shutdown` fires.
    #[must_use]
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            checks: Vec::new(),
            shutdown,
        }
    }

    #[must_use]
    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Runs no checks.
    #[must_use]
    pub fn live(&self) -> AggregateReport {
        AggregateReport {
            status: HealthStatus::Healthy,
            checks: Vec::new(),
            total_duration: Duration::ZERO,
        }
    }

    pub async fn ready(&self) -> AggregateReport {
        self.run(|c| c.tags().contains(&READY_TAG)).await
    }

    pub async fn full(&self) -> AggregateReport {
        self.run(|_| true).await
    }

    async fn run(&self, include: impl Fn(&dyn HealthCheck) -> bool) -> AggregateReport {
        let started = Instant::now();
        let cancel = self.shutdown.child_token();
        let selected: Vec<_> = self.checks.iter().filter(|c| include(Arc::as_ref(c))).collect();

        let checks = futures::future::join_all(selected.into_iter().map(|c| {
            let cancel = &cancel;
            async move {
                let t0 = Instant::now();
                let mut report = c.check(cancel).await;
                report.duration = t0.elapsed();
                (c.name().to_string(), report)
            }
        }))
        .await;

        let status = checks
            .iter()
            .map(|(_, r)| r.status)
            .min()
            .unwrap_or(HealthStatus::Healthy);
        AggregateReport {
            status,
            checks,
            total_duration: started.elapsed(),
        }
    }
}

async fn health_full(State(svc): State<Arc<HealthService>>) -> AggregateReport {
    svc.full().await
}

async fn health_ready(State(svc): State<Arc<HealthService>>) -> AggregateReport {
    svc.ready().await
}

async fn health_live(State(svc): State<Arc<HealthService>>) -> AggregateReport {
    svc.live()
}

/// `/health`, `/health/ready` and `/health/live`.
pub fn routes(svc: Arc<HealthService>) -> Router {
    Router::new()
        .route("/health", get(health_full))
        .route("/health/ready", get(health_ready))
        .route("/health/live", get(health_live))
        .with_state(svc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;
    use bookstack_api::ApiConfig;
    use tokio::net::TcpListener;
    use tower::ServiceExt as _;

    async fn upstream(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    fn status_check(base_url: &str, timeout: Duration) -> UpstreamStatusCheck {
        status_check_with_client_timeout(base_url, timeout, Duration::from_secs(30))
    }

    fn status_check_with_client_timeout(
        base_url: &str,
        timeout: Duration,
        client_timeout: Duration,
    ) -> UpstreamStatusCheck {
        let client = BookStackClient::new(&ApiConfig {
            base_url: base_url.to_string(),
            token_id: String::new(),
            token_secret: String::new(),
            timeout: client_timeout,
        })
        .expect("client");
        UpstreamStatusCheck::new(client, timeout)
    }

    fn status_app(code: StatusCode, body: &'static str) -> Router {
        Router::new().route("/api/status", get(move || async move { (code, body) }))
    }

    fn slow_app() -> Router {
        Router::new().route(
            "/api/status",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        )
    }

    #[tokio::test]
    async fn success_is_healthy_with_body() {
        let base = upstream(status_app(StatusCode::OK, r#"{"version":"v24"}"#)).await;
        let report = status_check(&base, Duration::from_secs(5))
            .check(&CancellationToken::new())
            .await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.description.as_deref(), Some("BookStack API is responding"));
        assert_eq!(report.data["response"], r#"{"version":"v24"}"#);
        assert_eq!(report.data["statusUrl"], format!("{base}/api/status"));
    }

    #[tokio::test]
    async fn non_success_is_degraded_with_status_code() {
        let base = upstream(status_app(StatusCode::SERVICE_UNAVAILABLE, "down")).await;
        let report = status_check(&base, Duration::from_secs(5))
            .check(&CancellationToken::new())
            .await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.data["statusCode"], 503);
        assert_eq!(
            report.description.as_deref(),
            Some("BookStack API returned status code: 503")
        );
    }

    #[tokio::test]
    async fn connection_failure_is_unhealthy() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let report = status_check(&format!("http://127.0.0.1:{port}"), Duration::from_secs(5))
            .check(&CancellationToken::new())
            .await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.description.as_deref(), Some("BookStack API is not reachable"));
        assert!(report.data["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn timeout_and_cancellation_are_distinguished() {
        let base = upstream(slow_app()).await;

        let report = status_check(&base, Duration::from_millis(50))
            .check(&CancellationToken::new())
            .await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.data["error"], "timed out");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let report = status_check(&base, Duration::from_secs(5)).check(&cancel).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.data["error"], "cancelled");
    }

    #[tokio::test]
    async fn client_timeout_is_reported_as_timed_out() {
        let base = upstream(slow_app()).await;
        let check = status_check_with_client_timeout(
            &base,
            Duration::from_secs(5),
            Duration::from_millis(50),
        );
        let report = check.check(&CancellationToken::new()).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.data["error"], "timed out");
    }

    struct Fixed {
        name: &'static str,
        status: HealthStatus,
        tags: &'static [&'static str],
    }

    #[async_trait]
    impl HealthCheck for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn tags(&self) -> &[&'static str] {
            self.tags
        }

        async fn check(&self, _cancel: &CancellationToken) -> HealthReport {
            HealthReport::new(self.status, self.name, json!({}))
        }
    }

    fn service() -> Arc<HealthService> {
        Arc::new(
            HealthService::new(CancellationToken::new())
                .with_check(Arc::new(Fixed {
                    name: "upstream",
                    status: HealthStatus::Degraded,
                    tags: &[READY_TAG],
                }))
                .with_check(Arc::new(Fixed {
                    name: "disk",
                    status: HealthStatus::Unhealthy,
                    tags: &[],
                })),
        )
    }

    #[tokio::test]
    async fn compositions_select_checks_and_take_the_worst() {
        let svc = service();

        let live = svc.live();
        assert_eq!(live.status, HealthStatus::Healthy);
        assert!(live.checks.is_empty());

        let ready = svc.ready().await;
        assert_eq!(ready.status, HealthStatus::Degraded);
        assert_eq!(ready.checks.len(), 1);
        assert_eq!(ready.checks[0].0, "upstream");

        let full = svc.full().await;
        assert_eq!(full.status, HealthStatus::Unhealthy);
        assert_eq!(full.checks.len(), 2);
    }

    #[tokio::test]
    async fn routes_map_status_to_http_codes() {
        let app = routes(service());
        let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).expect("request");

        let resp = app.clone().oneshot(get("/health/live")).await.expect("live");
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let v: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(v["status"], "Healthy");
        assert_eq!(v["checks"], json!([]));

        let resp = app.clone().oneshot(get("/health/ready")).await.expect("ready");
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(get("/health")).await.expect("full");
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("body");
        let v: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(v["status"], "Unhealthy");
        assert_eq!(v["checks"][1]["name"], "disk");
        assert!(v["totalDuration"].as_str().is_some());
    }

    #[test]
    fn durations_render_like_timespans() {
        assert_eq!(format_duration(Duration::ZERO), "00:00:00.0000000");
        assert_eq!(
            format_duration(Duration::from_millis(3_723_456)),
            "01:02:03.4560000"
        );
    }
}
