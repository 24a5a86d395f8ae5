use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::net::TcpListener;
use std::process::Child;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; it's still possible for another process to bind it
/// before you do.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the bound socket's
/// local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll an HTTP URL until it returns a success status (2xx/3xx).
///
/// # Errors
///
/// Returns an error if the timeout elapses before the endpoint returns a success status.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// A request observed by [`MockBookStack`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: Value,
}

/// In-process stand-in for a BookStack instance.
///
/// `GET /api/status` answers with the configured status code; entity endpoints echo what they
/// received so tests can assert on the forwarded call.
#[derive(Clone)]
pub struct MockBookStack {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Clone)]
struct MockState {
    status_code: StatusCode,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBookStack {
    /// Start a mock whose status endpoint returns 200.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with_status(StatusCode::OK).await
    }

    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start_with_status(status_code: StatusCode) -> anyhow::Result<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            status_code,
            requests: Arc::clone(&requests),
        };
        let app = Router::new()
            .route("/api/status", get(status))
            .route("/api/{collection}", any(collection))
            .route("/api/{collection}/{id}", any(entity))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock BookStack")?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });

        Ok(Self {
            base_url: format!("http://{addr}"),
            requests,
        })
    }

    /// Entity requests received so far (status probes are not recorded).
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

fn record(
    state: &MockState,
    method: &Method,
    path: String,
    query: Option<String>,
    headers: &HeaderMap,
    body: &Bytes,
) {
    let req = RecordedRequest {
        method: method.to_string(),
        path,
        query: query.unwrap_or_default(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_slice(body).unwrap_or(Value::Null),
    };
    state.requests.lock().push(req);
}

async fn status(State(state): State<MockState>) -> Response {
    (
        state.status_code,
        axum::Json(json!({ "version": "v24.10", "cache": true, "database": true })),
    )
        .into_response()
}

async fn collection(
    State(state): State<MockState>,
    method: Method,
    Path(collection): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &method, format!("/api/{collection}"), query.clone(), &headers, &body);
    if method == Method::POST {
        let mut created = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| json!({}));
        if let Some(obj) = created.as_object_mut() {
            obj.insert("id".to_string(), json!(1));
        }
        return axum::Json(created).into_response();
    }
    axum::Json(json!({
        "data": [{ "id": 1, "name": format!("first of {collection}") }],
        "total": 1,
        "query": query.unwrap_or_default(),
    }))
    .into_response()
}

async fn entity(
    State(state): State<MockState>,
    method: Method,
    Path((collection, id)): Path<(String, i64)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    record(&state, &method, format!("/api/{collection}/{id}"), None, &headers, &body);
    if method == Method::DELETE {
        return StatusCode::NO_CONTENT.into_response();
    }
    if id == 404 {
        return (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": { "code": 404, "message": "Entity not found" } })),
        )
            .into_response();
    }
    axum::Json(json!({ "id": id, "name": format!("{collection} #{id}") })).into_response()
}
