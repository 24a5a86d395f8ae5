//! MCP server handler backed by the tool registry.

use crate::tools::{InvocationResult, ToolRegistry};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const INSTRUCTIONS: &str = "Tools for browsing, searching and editing a BookStack wiki. \
Books contain chapters and pages; chapters contain pages; shelves group books. \
Tool results are the BookStack API's JSON responses.";

#[derive(Clone)]
pub struct BookStackMcp {
    registry: Arc<ToolRegistry>,
}

impl BookStackMcp {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn list_result(&self) -> ListToolsResult {
        ListToolsResult::with_all_items(
            self.registry
                .list_tools()
                .map(crate::tools::ToolDescriptor::to_mcp_tool)
                .collect(),
        )
    }

    /// Dispatch and wrap the outcome as MCP content; failures set `isError`.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<&JsonObject>,
        cancel: &CancellationToken,
    ) -> CallToolResult {
        let result = self.registry.dispatch(name, arguments, cancel).await;
        let content = vec![Content::text(result.render())];
        match result {
            InvocationResult::Success(_) => CallToolResult::success(content),
            InvocationResult::Failure(_) => CallToolResult::error(content),
        }
    }
}

impl ServerHandler for BookStackMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(self.list_result())
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::debug!(tool = %request.name, "tools/call");
        Ok(self
            .call(&request.name, request.arguments.as_ref(), &context.ct)
            .await)
    }
}

/// Streamable HTTP service to mount at `/mcp`.
#[must_use]
pub fn streamable_service(
    registry: Arc<ToolRegistry>,
) -> StreamableHttpService<BookStackMcp, LocalSessionManager> {
    let handler = BookStackMcp::new(registry);
    StreamableHttpService::new(
        move || Ok(handler.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    )
}
