//! Core types for the tool server.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (StreamId, ConnectionId)
//! - **Errors**: Typed error taxonomy with thiserror derives
//! - **Config**: Configuration structures and figment loading

mod config;
mod errors;
mod ids;

pub use config::{
    Config, DispatchConfig, InstrumentConfig, ObservabilityConfig, ServerConfig, StreamConfig,
    Transport, ENV_PREFIX,
};
pub use errors::{Error, ErrorKind, Result};
pub use ids::{ConnectionId, StreamId};
