//! Header-equality auth gate.

use crate::config::SecurityConfig;
use crate::error::{Result, ServerError};
use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse as _, Response};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    MissingHeader,
    InvalidHeader,
}

impl DenyReason {
    /// Plain-text 401 body.
    #[must_use]
    pub fn body(self) -> &'static str {
        match self {
            Self::MissingHeader => "Unauthorized: Missing authentication header",
            Self::InvalidHeader => "Unauthorized: Invalid authentication header",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone)]
struct ExpectedHeader {
    name: HeaderName,
    value: String,
}

/// Requires a configured header to carry an exact value.
///
/// The gate is open when either the header name or the value is unset or empty.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    expected: Option<ExpectedHeader>,
}

impl AuthGate {
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the configured header name is not a valid HTTP header
    /// name.
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let name = config.auth_header_name.as_deref().unwrap_or_default().trim();
        let value = config.auth_header_value.as_deref().unwrap_or_default();
        if name.is_empty() || value.is_empty() {
            return Ok(Self::default());
        }
        let name = HeaderName::try_from(name).map_err(|e| {
            ServerError::Config(format!("invalid security.authHeaderName '{name}': {e}"))
        })?;
        Ok(Self {
            expected: Some(ExpectedHeader {
                name,
                value: value.to_string(),
            }),
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// The header must appear exactly once; repeated instances are rejected as invalid.
    #[must_use]
    pub fn authorize(&self, headers: &HeaderMap) -> AuthDecision {
        let Some(expected) = &self.expected else {
            tracing::debug!("auth gate disabled; allowing request");
            return AuthDecision::Allow;
        };
        let mut values = headers.get_all(&expected.name).iter();
        let Some(got) = values.next() else {
            tracing::warn!(header = %expected.name, "authentication header missing");
            return AuthDecision::Deny(DenyReason::MissingHeader);
        };
        if values.next().is_some() {
            tracing::warn!(header = %expected.name, "authentication header repeated");
            return AuthDecision::Deny(DenyReason::InvalidHeader);
        }
        if got.as_bytes() != expected.value.as_bytes() {
            tracing::warn!(header = %expected.name, "authentication header has an invalid value");
            return AuthDecision::Deny(DenyReason::InvalidHeader);
        }
        tracing::debug!(header = %expected.name, "request authenticated");
        AuthDecision::Allow
    }
}

fn unauthorized(reason: DenyReason) -> Response {
    (StatusCode::UNAUTHORIZED, reason.body()).into_response()
}

/// axum middleware wrapping [`AuthGate::authorize`].
pub async fn require_auth(State(gate): State<Arc<AuthGate>>, req: Request, next: Next) -> Response {
    match gate.authorize(req.headers()) {
        AuthDecision::Allow => next.run(req).await,
        AuthDecision::Deny(reason) => unauthorized(reason),
    }
}
