//! # GMS MCP - Microscope Tool Server
//!
//! Exposes an electron microscope (Gatan Microscopy Suite) to AI clients over
//! the Model Context Protocol:
//! - Tool catalog with typed parameters, defaults and JSON input schemas
//! - Dispatcher that validates, times out, cancels and normalizes every call
//!   into a `{"success": bool, ...}` envelope
//! - Live stream sessions with expiry, quotas and monotonic frame numbering
//! - Pre-declared experiment workflows with parameter validation
//! - Simulated instrument and analysis backends behind traits
//!
//! ## Architecture
//!
//! ```text
//!   MCP client ── stdio / TCP ──▶ McpServer ──▶ McpRouter
//!                                                  │ tools/call
//!                                                  ▼
//!                                           ToolDispatcher ──▶ ToolHandler
//!                                                  │                │
//!                                        ToolHealthTracker     ToolContext
//!                                                          ┌────────┼────────┐
//!                                                     Instrument  Streams  Workflows
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod analysis;
pub mod envelope;
pub mod instrument;
pub mod mcp;
pub mod streams;
pub mod tools;
pub mod types;
pub mod workflows;

// Internal utilities
pub mod observability;
pub mod validation;

pub use envelope::Envelope;
pub use types::{Config, Error, ErrorKind, Result};
