mod common;
mod common_mcp;

use common::{MockBookStack, start_server};
use common_mcp::McpStreamableHttpSession;
use serde_json::{Value, json};

#[tokio::test]
async fn tools_list_and_call_roundtrip() -> anyhow::Result<()> {
    let upstream = MockBookStack::start().await?;
    let (base_url, _server, _dir) = start_server(&upstream.base_url, "").await?;

    let session = McpStreamableHttpSession::connect(&base_url).await?;

    let list = session.request(1, "tools/list", json!({})).await?;
    let tools = list["result"]["tools"].as_array().cloned().unwrap_or_default();
    assert_eq!(tools.len(), 25);
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"advanced_search"));
    assert!(names.contains(&"create_page"));
    let list_books = tools
        .iter()
        .find(|t| t["name"] == "list_books")
        .expect("list_books advertised");
    assert_eq!(list_books["inputSchema"]["properties"]["offset"]["default"], 0);

    let (is_error, payload) = session
        .call_tool(2, "list_books", json!({ "count": 5 }))
        .await?;
    assert!(!is_error);
    assert_eq!(payload["total"], 1);

    let requests = upstream.requests();
    let last = requests.last().expect("upstream saw a request");
    assert_eq!(last.method, "GET");
    assert_eq!(last.path, "/api/books");
    assert_eq!(last.query, "offset=0&count=5");
    assert_eq!(last.authorization.as_deref(), Some("Token test-id:test-secret"));

    let (is_error, payload) = session
        .call_tool(3, "create_book", json!({ "name": "Handbook", "description": "Team handbook" }))
        .await?;
    assert!(!is_error);
    assert_eq!(payload["id"], 1);
    assert_eq!(
        upstream.requests().last().map(|r| r.body.clone()),
        Some(json!({ "name": "Handbook", "description": "Team handbook" }))
    );

    Ok(())
}

#[tokio::test]
async fn failures_come_back_as_error_results() -> anyhow::Result<()> {
    let upstream = MockBookStack::start().await?;
    let (base_url, _server, _dir) = start_server(&upstream.base_url, "").await?;
    let session = McpStreamableHttpSession::connect(&base_url).await?;

    let (is_error, payload) = session.call_tool(1, "get_page", json!({ "id": 404 })).await?;
    assert!(is_error);
    assert_eq!(payload["error"], "Failed to execute get_page");
    assert!(payload["message"].as_str().unwrap_or_default().contains("404"));

    let (is_error, payload) = session.call_tool(2, "get_page", json!({})).await?;
    assert!(is_error);
    assert_eq!(payload["error"], "Invalid arguments");
    assert_eq!(payload["parameter"], "id");

    let (is_error, payload) = session.call_tool(3, "rename_page", json!({})).await?;
    assert!(is_error);
    assert_eq!(payload["error"], "Unknown tool");

    Ok(())
}

#[tokio::test]
async fn read_only_deployment_serves_read_tools_only() -> anyhow::Result<()> {
    let upstream = MockBookStack::start().await?;
    let (base_url, _server, _dir) =
        start_server(&upstream.base_url, "tools:\n  exposeWriteTools: false\n").await?;
    let session = McpStreamableHttpSession::connect(&base_url).await?;

    let list = session.request(1, "tools/list", json!({})).await?;
    let tools = list["result"]["tools"].as_array().cloned().unwrap_or_default();
    assert_eq!(tools.len(), 17);
    assert!(
        tools
            .iter()
            .filter_map(|t| t["name"].as_str())
            .all(|n| !n.starts_with("create_") && !n.starts_with("delete_"))
    );

    let (is_error, payload) = session.call_tool(2, "delete_book", json!({ "id": 1 })).await?;
    assert!(is_error);
    assert_eq!(payload["tool"], Value::from("delete_book"));
    assert!(upstream.requests().is_empty());

    Ok(())
}

#[tokio::test]
async fn mcp_endpoint_requires_configured_header() -> anyhow::Result<()> {
    let upstream = MockBookStack::start().await?;
    let (base_url, _server, _dir) = start_server(
        &upstream.base_url,
        "security:\n  authHeaderName: X-Auth-Token\n  authHeaderValue: secret-token\n",
    )
    .await?;

    assert!(McpStreamableHttpSession::connect(&base_url).await.is_err());
    assert!(
        McpStreamableHttpSession::connect_with_headers(&base_url, &[("X-Auth-Token", "wrong")])
            .await
            .is_err()
    );

    let session = McpStreamableHttpSession::connect_with_headers(
        &base_url,
        &[("X-Auth-Token", "secret-token")],
    )
    .await?;
    let (is_error, _) = session.call_tool(1, "get_shelf", json!({ "id": "3" })).await?;
    assert!(!is_error);

    Ok(())
}
