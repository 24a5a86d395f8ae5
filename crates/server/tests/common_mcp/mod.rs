#![allow(dead_code)]

use anyhow::Context as _;
use futures::StreamExt as _;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::AsyncBufReadExt as _;
use tokio_util::io::StreamReader;

/// Minimal MCP client for the server's streamable HTTP endpoint (`/mcp`), for integration tests.
pub struct McpStreamableHttpSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    headers: Vec<(String, String)>,
}

impl McpStreamableHttpSession {
    pub async fn connect(base_url: &str) -> anyhow::Result<Self> {
        Self::connect_with_headers(base_url, &[]).await
    }

    /// `headers` are sent on every request (e.g. the auth gate header).
    pub async fn connect_with_headers(
        base_url: &str,
        headers: &[(&str, &str)],
    ) -> anyhow::Result<Self> {
        let mut session = Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: String::new(),
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        };

        let init_resp = session
            .post(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {
                        "name": "bookstack-mcp-server-integration-tests",
                        "version": "0"
                    }
                }
            }))
            .await?;

        session.session_id = init_resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let init_msg = read_first_event_stream_json_message(init_resp).await?;
        anyhow::ensure!(init_msg.get("id") == Some(&json!(0)), "unexpected init id");

        let initialized_resp = session
            .post(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await?;
        anyhow::ensure!(
            initialized_resp.status().as_u16() == 202,
            "POST /mcp notifications/initialized returned {}",
            initialized_resp.status()
        );

        Ok(session)
    }

    pub async fn request(&self, id: u64, method: &str, params: Value) -> anyhow::Result<Value> {
        let resp = self
            .post(json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .await?;

        tokio::time::timeout(Duration::from_secs(10), read_first_event_stream_json_message(resp))
            .await
            .context("timeout waiting for event-stream response")?
    }

    /// `tools/call`, returning `(isError, parsed text payload)`.
    pub async fn call_tool(
        &self,
        id: u64,
        name: &str,
        arguments: Value,
    ) -> anyhow::Result<(bool, Value)> {
        let msg = self
            .request(id, "tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        let result = msg.get("result").context("tools/call missing result")?;
        let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
        let text = result
            .get("content")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .context("tools/call missing result.content[0].text")?;
        let payload = serde_json::from_str(text).context("tools/call text is not JSON")?;
        Ok((is_error, payload))
    }

    async fn post(&self, body: Value) -> anyhow::Result<reqwest::Response> {
        let mut req = self
            .client
            .post(format!("{}/mcp", self.base_url))
            .header("Accept", "application/json, text/event-stream")
            .header("Content-Type", "application/json")
            .json(&body);

        if !self.session_id.is_empty() {
            req = req.header("Mcp-Session-Id", &self.session_id);
        }
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        req.send()
            .await
            .context("POST /mcp")?
            .error_for_status()
            .context("POST /mcp status")
    }
}

async fn read_first_event_stream_json_message(resp: reqwest::Response) -> anyhow::Result<Value> {
    let mut stream = resp.bytes_stream();
    let byte_stream = futures::stream::poll_fn(move |cx| stream.poll_next_unpin(cx))
        .map(|r| r.map_err(std::io::Error::other));
    let reader = StreamReader::new(byte_stream);
    let mut lines = tokio::io::BufReader::new(reader).lines();

    let mut data_lines: Vec<String> = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end().to_string();

        if line.is_empty() {
            if data_lines.is_empty() {
                continue;
            }
            let data = data_lines.join("\n");
            return serde_json::from_str(&data).context("parse event-stream data as JSON");
        }

        if let Some(v) = line.strip_prefix("data:").map(str::trim)
            && !v.is_empty()
        {
            data_lines.push(v.to_string());
        }
    }

    anyhow::bail!("event-stream ended without a JSON message")
}
