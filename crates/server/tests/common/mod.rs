#![allow(dead_code, unused_imports)]

use anyhow::Context as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

pub use bookstack_test_support::{KillOnDrop, MockBookStack, pick_unused_port, wait_http_ok};

/// Write a YAML config pointing at `upstream` with the extra `sections` appended verbatim.
pub fn write_config(
    dir: &tempfile::TempDir,
    upstream: &str,
    sections: &str,
) -> anyhow::Result<PathBuf> {
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        format!(
            "bookStack:\n  baseUrl: {upstream}\n  tokenId: test-id\n  \
             tokenSecret: test-secret\n{sections}"
        ),
    )
    .context("write config")?;
    Ok(path)
}

pub fn spawn_server(config_path: &Path, port: u16) -> anyhow::Result<KillOnDrop> {
    let bin = env!("CARGO_BIN_EXE_bookstack-mcp-server");
    let child = Command::new(bin)
        .arg("--config")
        .arg(config_path)
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--log-level")
        .arg("info")
        .env_remove("BOOKSTACK_BASE_URL")
        .env_remove("BOOKSTACK_MCP_AUTH_HEADER_NAME")
        .env_remove("BOOKSTACK_MCP_AUTH_HEADER_VALUE")
        .stdout(Stdio::null())
        .spawn()
        .context("spawn bookstack-mcp-server")?;
    Ok(KillOnDrop(child))
}

/// Spawn the server with `sections` and wait until it answers liveness probes.
pub async fn start_server(
    upstream: &str,
    sections: &str,
) -> anyhow::Result<(String, KillOnDrop, tempfile::TempDir)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let cfg = write_config(&dir, upstream, sections)?;
    let port = pick_unused_port()?;
    let child = spawn_server(&cfg, port)?;

    let base_url = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base_url}/health/live"), Duration::from_secs(20)).await?;
    Ok((base_url, child, dir))
}
