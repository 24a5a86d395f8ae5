//! Error types for the BookStack client.

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The client could not be built from its configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Connection refused, DNS failure or any other transport-level failure.
    #[error("http transport error: {0}")]
    Transport(String),

    /// No response arrived within the configured request timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The API answered with a non-success status code.
    #[error("API returned {status} {reason}: {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    /// The API answered 2xx but the body was not valid JSON.
    #[error("invalid JSON response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(value: reqwest::Error) -> Self {
        let msg = sanitize_reqwest_error(&value);
        if value.is_timeout() {
            Self::Timeout(msg)
        } else {
            Self::Transport(msg)
        }
    }
}

/// Render a reqwest error without leaking query strings or URL credentials.
#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    // Best-effort: drop credentials + query + fragment.
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}
