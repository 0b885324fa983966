//! Built-in tool handlers, grouped by what they touch.
//!
//! Each handler deserializes its already-validated arguments into a typed
//! struct, does its work against the [`ToolContext`](super::ToolContext)
//! collaborators, and serializes a typed result back into envelope fields.

pub mod acquisition;
pub mod analysis;
pub mod assist;
pub mod streaming;
pub mod workflow;

use crate::envelope::Fields;
use crate::types::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Deserialize tool arguments into a typed struct.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(args)).map_err(|e| Error::invalid_arguments(e.to_string()))
}

/// Serialize a typed result into envelope fields.
pub(crate) fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::internal(format!(
            "tool result must serialize to an object, got {}",
            other
        ))),
    }
}
