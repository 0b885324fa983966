//! Model Context Protocol transport.
//!
//! - `protocol` - JSON-RPC 2.0 and MCP message types
//! - `codec` - newline-delimited framing
//! - `router` - method routing onto the tool dispatcher
//! - `server` - stdio and TCP servers with per-call cancellation

pub mod codec;
pub mod protocol;
pub mod router;
pub mod server;

pub use protocol::{JsonRpcRequest, JsonRpcResponse, RequestId, RpcError, ServerInfo, MCP_PROTOCOL_VERSION};
pub use router::McpRouter;
pub use server::{serve_connection, ConnectionLimits, McpServer};
