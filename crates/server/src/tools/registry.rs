//! Tool registry and dispatcher.
//!
//! The registry is built once at startup from explicit [`ToolDefinition`]s and never mutated
//! afterwards. `dispatch` is the single entry point used by both the MCP handler and the
//! plain-HTTP debugging routes: lookup, bind, invoke, serialize.

use super::ToolError;
use super::params::{self, BindError, BoundArgs, ParamDescriptor};
use futures::FutureExt as _;
use futures::future::BoxFuture;
use rmcp::model::{JsonObject, Tool};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type ToolFuture = BoxFuture<'static, Result<Value, ToolError>>;
pub type ToolHandler = Arc<dyn Fn(BoundArgs) -> ToolFuture + Send + Sync>;

/// Public, immutable description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamDescriptor>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn input_schema(&self) -> JsonObject {
        params::input_schema(&self.params)
    }

    /// MCP wire representation.
    #[must_use]
    pub fn to_mcp_tool(&self) -> Tool {
        Tool::new(
            self.name.clone(),
            self.description.clone(),
            Arc::new(self.input_schema()),
        )
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": Value::Object(self.input_schema()),
        })
    }
}

/// A tool plus the metadata the dispatcher needs to report its failures.
#[derive(Clone)]
pub struct ToolDefinition {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
    failure_label: Option<String>,
    /// `(parameter name, payload field)` pairs copied into InternalError payloads.
    error_context: Vec<(String, String)>,
}

impl ToolDefinition {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            descriptor: ToolDescriptor {
                name: name.into(),
                description: description.into(),
                params: Vec::new(),
            },
            handler: Arc::new(move |args| handler(args).boxed()),
            failure_label: None,
            error_context: Vec::new(),
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParamDescriptor) -> Self {
        self.descriptor.params.push(param);
        self
    }

    /// Headline used as `error` when the handler fails (e.g. `"Failed to create book"`).
    #[must_use]
    pub fn failure_label(mut self, label: impl Into<String>) -> Self {
        self.failure_label = Some(label.into());
        self
    }

    /// Echo a bound argument into failure payloads under `field`.
    #[must_use]
    pub fn error_context(mut self, parameter: impl Into<String>, field: impl Into<String>) -> Self {
        self.error_context.push((parameter.into(), field.into()));
        self
    }

    #[must_use]
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    NotFound,
    BadRequest,
    InternalError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: FailureKind,
    pub error: String,
    pub message: String,
    pub context: Map<String, Value>,
}

impl Failure {
    fn not_found(tool: &str) -> Self {
        let mut context = Map::new();
        context.insert("tool".to_string(), json!(tool));
        Self {
            kind: FailureKind::NotFound,
            error: "Unknown tool".to_string(),
            message: format!("Tool '{tool}' is not registered"),
            context,
        }
    }

    fn bad_request(tool: &str, parameter: &str, message: String) -> Self {
        let mut context = Map::new();
        context.insert("tool".to_string(), json!(tool));
        context.insert("parameter".to_string(), json!(parameter));
        Self {
            kind: FailureKind::BadRequest,
            error: "Invalid arguments".to_string(),
            message,
            context,
        }
    }

    /// `{error, message, ...context}`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("error".to_string(), json!(self.error));
        obj.insert("message".to_string(), json!(self.message));
        for (k, v) in &self.context {
            obj.insert(k.clone(), v.clone());
        }
        Value::Object(obj)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    Success(Value),
    Failure(Failure),
}

impl InvocationResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(f) => Some(f.kind),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Success(v) => v.clone(),
            Self::Failure(f) => f.to_json(),
        }
    }

    /// Indented JSON text, as returned to MCP clients.
    #[must_use]
    pub fn render(&self) -> String {
        let v = self.to_json();
        serde_json::to_string_pretty(&v).unwrap_or_else(|_| v.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate tool name '{0}'")]
    DuplicateTool(String),
    #[error("duplicate parameter '{param}' on tool '{tool}'")]
    DuplicateParam { tool: String, param: String },
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistryBuilder {
    #[must_use]
    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        self.tools.extend(tools);
        self
    }

    /// Freeze the registration table.
    ///
    /// # Errors
    ///
    /// Returns an error if two tools share a name or a tool declares the same parameter twice.
    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut index = HashMap::with_capacity(self.tools.len());
        for (i, t) in self.tools.iter().enumerate() {
            let name = &t.descriptor.name;
            if index.insert(name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateTool(name.clone()));
            }
            let mut seen = std::collections::HashSet::new();
            for p in &t.descriptor.params {
                if !seen.insert(p.name.as_str()) {
                    return Err(RegistryError::DuplicateParam {
                        tool: name.clone(),
                        param: p.name.clone(),
                    });
                }
            }
        }
        Ok(ToolRegistry {
            tools: self.tools,
            index,
        })
    }
}

pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// Descriptors in registration order.
    pub fn list_tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter().map(ToolDefinition::descriptor)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i].descriptor)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool by name with raw arguments.
    ///
    /// Never fails: unknown tools, bad arguments, handler errors, handler panics and cancellation
    /// all come back as [`InvocationResult::Failure`]. Firing `cancel` drops the handler future,
    /// which aborts any upstream request it has in flight.
    pub async fn dispatch(
        &self,
        name: &str,
        raw: Option<&Map<String, Value>>,
        cancel: &CancellationToken,
    ) -> InvocationResult {
        let Some(tool) = self.index.get(name).map(|&i| &self.tools[i]) else {
            tracing::warn!(tool = %name, "unknown tool");
            return InvocationResult::Failure(Failure::not_found(name));
        };

        let args = match params::bind(&tool.descriptor.params, raw) {
            Ok(args) => args,
            Err(BindError { parameter, message }) => {
                tracing::warn!(tool = %name, parameter = %parameter, "{message}");
                return InvocationResult::Failure(Failure::bad_request(name, &parameter, message));
            }
        };

        tracing::debug!(tool = %name, "invoking tool");
        let fut = AssertUnwindSafe((tool.handler)(args.clone())).catch_unwind();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ToolError::Cancelled),
            r = fut => r.unwrap_or_else(|_| {
                Err(ToolError::Internal(format!("tool '{name}' panicked")))
            }),
        };

        match outcome {
            Ok(payload) => InvocationResult::Success(payload),
            Err(ToolError::InvalidArgument { parameter, message }) => {
                tracing::warn!(tool = %name, parameter = %parameter, "{message}");
                InvocationResult::Failure(Failure::bad_request(name, &parameter, message))
            }
            Err(e @ ToolError::Cancelled) => {
                tracing::info!(tool = %name, "tool invocation cancelled");
                InvocationResult::Failure(internal_failure(tool, &args, &e))
            }
            Err(e) => {
                tracing::error!(tool = %name, error = %e, "tool invocation failed");
                InvocationResult::Failure(internal_failure(tool, &args, &e))
            }
        }
    }
}

fn internal_failure(tool: &ToolDefinition, args: &BoundArgs, err: &ToolError) -> Failure {
    let mut context = Map::new();
    for (param, field) in &tool.error_context {
        let value = args.get(param).map_or(Value::Null, params::ParamValue::to_json);
        context.insert(field.clone(), value);
    }
    Failure {
        kind: FailureKind::InternalError,
        error: tool
            .failure_label
            .clone()
            .unwrap_or_else(|| format!("Failed to execute {}", tool.descriptor.name)),
        message: err.to_string(),
        context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::params::{ParamKind, ParamValue};

    fn echo_tool() -> ToolDefinition {
        ToolDefinition::new("echo", "Echo bound arguments", |args: BoundArgs| async move {
            Ok(json!({
                "name": args.str("name")?,
                "count": args.opt_int("count"),
                "tag": args.opt_str("tag"),
            }))
        })
        .param(ParamDescriptor::required("name", ParamKind::String))
        .param(ParamDescriptor::with_default("count", 50))
        .param(ParamDescriptor::optional("tag", ParamKind::String))
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::builder()
            .tool(echo_tool())
            .tool(
                ToolDefinition::new("explode", "Always fails", |_args: BoundArgs| async move {
                    Err::<Value, _>(ToolError::Internal("upstream unavailable".to_string()))
                })
                .param(ParamDescriptor::required("id", ParamKind::Integer))
                .failure_label("Failed to delete book")
                .error_context("id", "bookId"),
            )
            .tool(ToolDefinition::new(
                "panics",
                "Panics",
                |_args: BoundArgs| async move {
                    if true {
                        panic!("boom");
                    }
                    Ok(Value::Null)
                },
            ))
            .build()
            .expect("registry")
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let result = registry().dispatch("nope", None, &CancellationToken::new()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(result.to_json()["tool"], "nope");
    }

    #[tokio::test]
    async fn missing_required_parameter_is_bad_request() {
        let result = registry()
            .dispatch(
                "echo",
                Some(&obj(json!({"count": 1}))),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::BadRequest));
        let payload = result.to_json();
        assert_eq!(payload["parameter"], "name");
        assert_eq!(payload["message"], "Missing required parameter 'name'");
    }

    #[tokio::test]
    async fn success_renders_indented_json() {
        let result = registry()
            .dispatch(
                "echo",
                Some(&obj(json!({"name": "a"}))),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_success());
        assert_eq!(result.to_json(), json!({"name": "a", "count": 50, "tag": null}));
        assert!(result.render().contains("\n  \"count\": 50"));
    }

    #[tokio::test]
    async fn handler_error_becomes_internal_error_with_context() {
        let result = registry()
            .dispatch(
                "explode",
                Some(&obj(json!({"id": "9"}))),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::InternalError));
        assert_eq!(
            result.to_json(),
            json!({
                "error": "Failed to delete book",
                "message": "upstream unavailable",
                "bookId": 9,
            })
        );
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let result = registry().dispatch("panics", None, &CancellationToken::new()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::InternalError));
        assert_eq!(result.to_json()["message"], "tool 'panics' panicked");
    }

    #[tokio::test]
    async fn cancellation_drops_the_running_handler() {
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
        let (held_tx, mut held_rx) = tokio::sync::oneshot::channel::<()>();
        let started_tx = Arc::new(parking_lot::Mutex::new(Some(started_tx)));
        let held_tx = Arc::new(parking_lot::Mutex::new(Some(held_tx)));

        let registry = ToolRegistry::builder()
            .tool(
                ToolDefinition::new("hang", "Never finishes", move |_args: BoundArgs| {
                    let started = started_tx.lock().take();
                    let held = held_tx.lock().take();
                    async move {
                        let _held = held;
                        if let Some(tx) = started {
                            let _ = tx.send(());
                        }
                        std::future::pending::<Result<Value, ToolError>>().await
                    }
                })
                .param(ParamDescriptor::required("id", ParamKind::Integer))
                .failure_label("Failed to get book")
                .error_context("id", "bookId"),
            )
            .build()
            .expect("registry");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            let _ = started_rx.await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            registry.dispatch("hang", Some(&obj(json!({"id": 7}))), &cancel),
        )
        .await
        .expect("dispatch returns once cancelled");

        assert_eq!(result.failure_kind(), Some(FailureKind::InternalError));
        assert_eq!(
            result.to_json(),
            json!({"error": "Failed to get book", "message": "cancelled", "bookId": 7})
        );
        // The handler future, and the sender it owned, are gone.
        assert!(matches!(
            held_rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = registry()
            .dispatch("echo", Some(&obj(json!({"name": "a"}))), &cancel)
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::InternalError));
        assert_eq!(result.to_json()["message"], "cancelled");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = ToolRegistry::builder()
            .tool(echo_tool())
            .tool(echo_tool())
            .build()
            .err()
            .expect("duplicate");
        assert!(matches!(err, RegistryError::DuplicateTool(name) if name == "echo"));
    }

    #[test]
    fn listing_preserves_registration_order() {
        let names: Vec<_> = registry().list_tools().map(|t| t.name.clone()).collect();
        assert_eq!(names, ["echo", "explode", "panics"]);

        let reg = registry();
        let tool = reg.get("echo").expect("echo").to_mcp_tool();
        assert_eq!(tool.name, "echo");
        assert_eq!(
            tool.input_schema.get("required"),
            Some(&json!(["name"]))
        );
        assert_eq!(
            reg.get("echo").expect("echo").params[1].default,
            Some(ParamValue::Int(50))
        );
    }
}
