//! HTTP client for the BookStack REST API.

use crate::error::{ApiError, Result};
use crate::query::{EntityKind, ListParams};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Connection settings for a BookStack instance.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_id: String,
    pub token_secret: String,
    pub timeout: Duration,
}

/// Raw outcome of `GET /api/status`.
///
/// Non-success status codes are not errors here; callers classify them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusProbe {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl StatusProbe {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The document operations the MCP tools forward to.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn list(&self, kind: EntityKind, params: &ListParams) -> Result<Value>;

    async fn read(&self, kind: EntityKind, id: i64) -> Result<Value>;

    async fn create(&self, kind: EntityKind, body: Value) -> Result<Value>;

    async fn delete(&self, kind: EntityKind, id: i64) -> Result<()>;
}

#[derive(Clone)]
pub struct BookStackClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: Url,
    authorization: String,
    http: Client,
}

impl std::fmt::Debug for BookStackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookStackClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl BookStackClient {
    /// Build a client for the given instance.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Config`] if the base URL is empty or not an absolute `http(s)` URL,
    /// or if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                base_url,
                authorization: format!("Token {}:{}", config.token_id, config.token_secret),
                http,
            }),
        })
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.inner.base_url.as_str().trim_end_matches('/')
    }

    #[must_use]
    pub fn status_url(&self) -> String {
        format!("{}/api/status", self.base_url())
    }

    /// Call the unauthenticated status endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] or [`ApiError::Timeout`] when no HTTP response could be
    /// obtained. Any HTTP status (including 5xx) is returned as a [`StatusProbe`].
    pub async fn status(&self) -> Result<StatusProbe> {
        let url = self.status_url();
        let resp = self.inner.http.get(&url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(StatusProbe { url, status, body })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.inner.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::Config("base URL cannot be a base".to_string()))?;
            path.pop_if_empty().push("api");
            for s in segments {
                path.push(s);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, &self.inner.authorization)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send_json(&self, req: RequestBuilder) -> Result<Value> {
        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ApiError::Config("BookStack base URL is required".to_string()));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| ApiError::Config(format!("invalid BookStack base URL '{trimmed}': {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ApiError::Config(format!(
            "unsupported URL scheme '{}' in BookStack base URL",
            url.scheme()
        )));
    }
    Ok(url)
}

#[async_trait]
impl DocumentApi for BookStackClient {
    async fn list(&self, kind: EntityKind, params: &ListParams) -> Result<Value> {
        let url = self.endpoint(&[kind.collection()])?;
        tracing::debug!(kind = %kind, offset = params.offset, count = params.count, "listing");
        let req = self
            .request(Method::GET, url)
            .query(&params.query_pairs());
        self.send_json(req).await
    }

    async fn read(&self, kind: EntityKind, id: i64) -> Result<Value> {
        let url = self.endpoint(&[kind.collection(), &id.to_string()])?;
        self.send_json(self.request(Method::GET, url)).await
    }

    async fn create(&self, kind: EntityKind, body: Value) -> Result<Value> {
        let url = self.endpoint(&[kind.collection()])?;
        self.send_json(self.request(Method::POST, url).json(&body))
            .await
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> Result<()> {
        let url = self.endpoint(&[kind.collection(), &id.to_string()])?;
        self.send_json(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
