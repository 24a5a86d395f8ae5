//! Process flags and the YAML service configuration.
//!
//! Sections are loaded once at startup, overridden from the command line, validated, and then
//! handed by reference to each component's constructor.

use crate::error::{Result, ServerError};
use bookstack_api::ApiConfig;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "bookstack-mcp-server", version, about = "Expose a BookStack wiki as MCP tools")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, env = "BOOKSTACK_MCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "BOOKSTACK_MCP_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Default log level (`RUST_LOG` takes precedence)
    #[arg(long, env = "BOOKSTACK_MCP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "BOOKSTACK_MCP_LOG_JSON")]
    pub log_json: bool,

    /// BookStack base URL (overrides `bookStack.baseUrl`)
    #[arg(long, env = "BOOKSTACK_BASE_URL")]
    pub base_url: Option<String>,

    /// BookStack API token id
    #[arg(long, env = "BOOKSTACK_TOKEN_ID")]
    pub token_id: Option<String>,

    /// BookStack API token secret
    #[arg(long, env = "BOOKSTACK_TOKEN_SECRET", hide_env_values = true)]
    pub token_secret: Option<String>,

    /// Header that inbound requests must carry
    #[arg(long, env = "BOOKSTACK_MCP_AUTH_HEADER_NAME")]
    pub auth_header_name: Option<String>,

    /// Expected value of the auth header
    #[arg(long, env = "BOOKSTACK_MCP_AUTH_HEADER_VALUE", hide_env_values = true)]
    pub auth_header_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default, alias = "BookStack")]
    pub book_stack: BookStackConfig,
    #[serde(default, alias = "Security")]
    pub security: SecurityConfig,
    #[serde(default, alias = "Throttling")]
    pub throttling: ThrottlingConfig,
    #[serde(default, alias = "Health")]
    pub health: HealthConfig,
    #[serde(default, alias = "Tools")]
    pub tools: ToolsConfig,
    #[serde(default, alias = "Http")]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookStackConfig {
    #[serde(default, alias = "BaseUrl")]
    pub base_url: String,
    #[serde(default, alias = "TokenId")]
    pub token_id: String,
    #[serde(default, alias = "TokenSecret")]
    pub token_secret: String,
    #[serde(default = "default_api_timeout_secs", alias = "TimeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for BookStackConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token_id: String::new(),
            token_secret: String::new(),
            timeout_secs: default_api_timeout_secs(),
        }
    }
}

impl BookStackConfig {
    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            token_id: self.token_id.clone(),
            token_secret: self.token_secret.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Inbound header gate. Both fields must be non-empty for the gate to be active.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default, alias = "AuthHeaderName")]
    pub auth_header_name: Option<String>,
    #[serde(default, alias = "AuthHeaderValue")]
    pub auth_header_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottlingConfig {
    #[serde(default = "default_true", alias = "Enabled")]
    pub enabled: bool,
    #[serde(default = "default_permit_limit", alias = "PermitLimit")]
    pub permit_limit: u32,
    #[serde(default = "default_window_seconds", alias = "WindowSeconds")]
    pub window_seconds: u64,
    #[serde(default, alias = "QueueLimit")]
    pub queue_limit: u32,
}

impl Default for ThrottlingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            permit_limit: default_permit_limit(),
            window_seconds: default_window_seconds(),
            queue_limit: 0,
        }
    }
}

impl ThrottlingConfig {
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthConfig {
    #[serde(default = "default_health_timeout_secs", alias = "TimeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_health_timeout_secs(),
        }
    }
}

impl HealthConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    #[serde(default = "default_true", alias = "ExposeWriteTools")]
    pub expose_write_tools: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            expose_write_tools: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Serve `GET /tools` and `POST /invoke/{name}` next to `/mcp`.
    #[serde(default, alias = "DebugRoutes")]
    pub debug_routes: bool,
}

fn default_true() -> bool {
    true
}

fn default_api_timeout_secs() -> u64 {
    30
}

fn default_permit_limit() -> u32 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

/// Upper bound for `throttling.windowSeconds` (one day).
pub const MAX_WINDOW_SECONDS: u64 = 86_400;

fn default_health_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Parse a YAML document. An empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or has values of the wrong type.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Load the config file named on the command line (if any), apply flag overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the merged result is invalid.
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut cfg = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        cfg.apply_cli(cli);
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = &cli.base_url {
            self.book_stack.base_url.clone_from(v);
        }
        if let Some(v) = &cli.token_id {
            self.book_stack.token_id.clone_from(v);
        }
        if let Some(v) = &cli.token_secret {
            self.book_stack.token_secret.clone_from(v);
        }
        if cli.auth_header_name.is_some() {
            self.security.auth_header_name.clone_from(&cli.auth_header_name);
        }
        if cli.auth_header_value.is_some() {
            self.security.auth_header_value.clone_from(&cli.auth_header_value);
        }
    }

    /// # Errors
    ///
    /// Returns [`ServerError::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.book_stack.base_url.trim();
        if base_url.is_empty() {
            return Err(ServerError::Config(
                "bookStack.baseUrl is required (or pass --base-url / BOOKSTACK_BASE_URL)"
                    .to_string(),
            ));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ServerError::Config(format!(
                "bookStack.baseUrl must be an http(s) URL, got '{base_url}'"
            )));
        }
        if self.book_stack.timeout_secs == 0 {
            return Err(ServerError::Config("bookStack.timeoutSecs must be > 0".to_string()));
        }
        if self.throttling.enabled {
            if self.throttling.permit_limit == 0 {
                return Err(ServerError::Config(
                    "throttling.permitLimit must be > 0 when throttling is enabled".to_string(),
                ));
            }
            if self.throttling.window_seconds == 0 {
                return Err(ServerError::Config(
                    "throttling.windowSeconds must be > 0 when throttling is enabled".to_string(),
                ));
            }
            if self.throttling.window_seconds > MAX_WINDOW_SECONDS {
                return Err(ServerError::Config(format!(
                    "throttling.windowSeconds must be at most {MAX_WINDOW_SECONDS}"
                )));
            }
        }
        if self.health.timeout_secs == 0 {
            return Err(ServerError::Config("health.timeoutSecs must be > 0".to_string()));
        }
        Ok(())
    }
}
