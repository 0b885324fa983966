//! Method routing for MCP requests.
//!
//! The router answers the cheap methods inline. `tools/call` is exposed
//! separately so the connection loop can run it on its own task with a
//! per-request cancellation token.

use super::protocol::{
    initialize_result, CallToolParams, CallToolResult, CancelledParams, JsonRpcRequest,
    JsonRpcResponse, RpcError, ServerInfo, ToolInfo,
};
use crate::tools::ToolDispatcher;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_PING: &str = "ping";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_CANCELLED: &str = "notifications/cancelled";

/// What the connection loop should do with a request.
#[derive(Debug)]
pub enum Route {
    /// Send this response now.
    Reply(JsonRpcResponse),
    /// Nothing to send (notifications).
    Ignore,
    /// Run a tool call on its own task.
    CallTool(CallToolParams),
    /// Cancel an in-flight call.
    Cancel(CancelledParams),
}

/// Maps JSON-RPC methods onto the tool dispatcher.
#[derive(Debug)]
pub struct McpRouter {
    dispatcher: Arc<ToolDispatcher>,
    info: ServerInfo,
}

impl McpRouter {
    pub fn new(dispatcher: Arc<ToolDispatcher>, info: ServerInfo) -> Self {
        Self { dispatcher, info }
    }

    pub fn dispatcher(&self) -> &Arc<ToolDispatcher> {
        &self.dispatcher
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Decide how to handle a request.
    pub fn route(&self, request: &JsonRpcRequest) -> Route {
        let id = request.id.clone();
        let notification = request.is_notification();

        match request.method.as_str() {
            METHOD_INITIALIZE => {
                if let Some(version) = request
                    .params
                    .as_ref()
                    .and_then(|p| str_field(p, "protocolVersion"))
                {
                    tracing::info!(client_protocol = version, "mcp_initialize");
                }
                Route::Reply(JsonRpcResponse::success(id, initialize_result(&self.info)))
            }
            METHOD_INITIALIZED => Route::Ignore,
            METHOD_PING => Route::Reply(JsonRpcResponse::success(id, json!({}))),
            METHOD_TOOLS_LIST => Route::Reply(JsonRpcResponse::success(id, self.list_tools())),
            METHOD_TOOLS_CALL if notification => {
                tracing::debug!("tools/call sent as a notification, ignoring");
                Route::Ignore
            }
            METHOD_TOOLS_CALL => match parse_params::<CallToolParams>(request.params.clone()) {
                Ok(params) => Route::CallTool(params),
                Err(e) => Route::Reply(JsonRpcResponse::failure(id, e)),
            },
            METHOD_CANCELLED => match parse_params::<CancelledParams>(request.params.clone()) {
                Ok(params) => Route::Cancel(params),
                Err(e) => {
                    tracing::debug!(error = %e.message, "malformed cancellation notification");
                    Route::Ignore
                }
            },
            other if notification => {
                tracing::debug!(method = other, "unhandled notification");
                Route::Ignore
            }
            other => Route::Reply(JsonRpcResponse::failure(id, RpcError::method_not_found(other))),
        }
    }

    /// `tools/list` result.
    pub fn list_tools(&self) -> Value {
        let tools: Vec<ToolInfo> = self
            .dispatcher
            .registry()
            .list()
            .iter()
            .map(|d| ToolInfo::from(d.as_ref()))
            .collect();
        json!({ "tools": tools })
    }

    /// Run a tool call to completion and build the `tools/call` result.
    pub async fn call_tool(
        &self,
        params: CallToolParams,
        cancel: &CancellationToken,
    ) -> Result<Value, RpcError> {
        let envelope = self
            .dispatcher
            .invoke(&params.name, params.arguments, cancel)
            .await;
        let result = CallToolResult::from_envelope(&envelope).map_err(RpcError::internal)?;
        serde_json::to_value(result).map_err(RpcError::internal)
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(RpcError::invalid_params)
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}
