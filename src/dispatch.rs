//! Request dispatch.
//!
//! [`Dispatcher`] is built once from the tool handlers and then shared by
//! every transport. It holds no mutable state, so concurrent calls only
//! interact through the collaborators inside [`crate::context::ServerContext`].

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::batch::panic_message;
use crate::error::{FieldIssue, IssueKind, RegistryError, RpcError};
use crate::protocol::{Method, RpcRequest, RpcResponse};
use crate::registry::ToolRegistry;
use crate::tools::{ToolHandler, ToolId};

pub const SERVER_NAME: &str = "agentic-web-scraper";
pub const SERVER_DESCRIPTION: &str = "Advanced web scraping and deep research MCP server";

/// Routes requests to tool handlers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    handlers: Arc<HashMap<ToolId, Arc<dyn ToolHandler>>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tool_count", &self.registry.len())
            .finish()
    }
}

impl Dispatcher {
    /// Registers each handler's contract in order.
    ///
    /// Fails if two handlers share a tool name or a contract is declared
    /// under a different name than its handler's id.
    pub fn new(handlers: Vec<Arc<dyn ToolHandler>>) -> Result<Self, RegistryError> {
        let mut registry = ToolRegistry::new();
        let mut by_id = HashMap::with_capacity(handlers.len());

        for handler in handlers {
            let id = handler.id();
            let contract = handler.contract();
            if contract.name != id.as_str() {
                return Err(RegistryError::ContractMismatch {
                    name: id.as_str().to_string(),
                    declared: contract.name,
                });
            }
            registry.register(contract)?;
            by_id.insert(id, handler);
        }

        Ok(Self {
            registry: Arc::new(registry),
            handlers: Arc::new(by_id),
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Server descriptor, as sent by `initialize` and the push endpoint.
    pub fn server_info(&self) -> Value {
        let tools: Vec<&str> = self.registry.list().iter().map(|c| c.name.as_str()).collect();
        json!({
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "description": SERVER_DESCRIPTION,
            "protocols": ["stdio", "sse"],
            "tools": tools,
        })
    }

    /// `tools/list` payload.
    pub fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self.registry.list().iter().map(|c| c.describe()).collect();
        json!({ "tools": tools })
    }

    /// Parses one wire message and dispatches it.
    pub async fn dispatch_text(&self, text: &str) -> RpcResponse {
        match RpcRequest::parse(text) {
            Ok(request) => self.dispatch(request).await,
            Err(error) => {
                warn!(name: "rpc.parse_error", error = %error, "Rejected malformed request");
                RpcResponse::failure(None, &error)
            }
        }
    }

    /// Produces exactly one response for `request`.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id.clone();
        match self.route(&request).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(error) => RpcResponse::failure(id, &error),
        }
    }

    async fn route(&self, request: &RpcRequest) -> Result<Value, RpcError> {
        match Method::parse(&request.method)? {
            Method::Initialize => Ok(json!({
                "server_info": self.server_info(),
                "capabilities": {"tools": true, "resources": false, "prompts": false},
            })),
            Method::ToolsList => Ok(self.list_tools()),
            Method::ToolsCall => {
                let Some(name) = request.params.name.as_deref() else {
                    return Err(RpcError::InvalidArguments {
                        tool: Method::ToolsCall.as_str().to_string(),
                        issues: vec![FieldIssue {
                            field: "name".to_string(),
                            kind: IssueKind::Missing,
                        }],
                    });
                };
                self.call_tool(name, &request.arguments()).await
            }
        }
    }

    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<Value, RpcError> {
        let args = self.registry.validate(name, arguments)?;
        let handler = name
            .parse::<ToolId>()
            .ok()
            .and_then(|id| self.handlers.get(&id))
            .ok_or_else(|| RpcError::UnknownTool {
                name: name.to_string(),
            })?;

        info!(name: "mcp.tool.call", tool = name, "Calling tool");
        let started = Instant::now();
        let outcome = AssertUnwindSafe(handler.call(args)).catch_unwind().await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(tree)) => {
                debug!(name: "mcp.tool.completed", tool = name, elapsed_ms, "Tool completed");
                Ok(Value::from(tree))
            }
            Ok(Err(error)) => {
                warn!(name: "mcp.tool.failed", tool = name, elapsed_ms, error = %format!("{error:#}"), "Tool failed");
                Err(RpcError::internal(&error))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(name: "mcp.tool.failed", tool = name, elapsed_ms, error = %message, "Tool panicked");
                Err(RpcError::Internal { message })
            }
        }
    }
}
