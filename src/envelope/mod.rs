//! Result envelope - the uniform `{"success": bool, ...}` wrapper every tool returns.
//!
//! Wire shape (flat object):
//! ```text
//! success:  {"success": true,  <operation fields>...}
//! failure:  {"success": false, "error": "<message>", <discoverability fields>...}
//! ```
//! `error` is present iff `success` is false. Handlers never build failure
//! envelopes themselves; they return typed errors and the dispatcher converts
//! them here.

pub mod enums;

use crate::types::{Error, ErrorKind};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Operation-specific fields carried alongside `success` / `error`.
pub type Fields = Map<String, Value>;

/// Uniform tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    outcome: Outcome,
    fields: Fields,
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Success,
    Failure { message: String, kind: ErrorKind },
}

impl Envelope {
    /// Successful result with the given fields.
    ///
    /// Reserved keys (`success`, `error`) in `fields` are dropped so the
    /// envelope invariant cannot be broken by handler output.
    pub fn success(mut fields: Fields) -> Self {
        fields.remove("success");
        fields.remove("error");
        Self {
            outcome: Outcome::Success,
            fields,
        }
    }

    /// Failure result with a human-readable message.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.is_empty() {
            message = kind.as_str().to_lowercase();
        }
        Self {
            outcome: Outcome::Failure { message, kind },
            fields: Fields::new(),
        }
    }

    /// Flatten a typed error into the client-visible envelope.
    pub fn from_error(err: &Error) -> Self {
        let mut envelope = Self::failure(err.kind(), err.to_string());
        match err {
            Error::UnknownWorkflow { available, .. } => {
                envelope
                    .fields
                    .insert("available_workflows".to_string(), Value::from(available.clone()));
            }
            Error::MissingParameters { missing, required } => {
                envelope
                    .fields
                    .insert("missing_params".to_string(), Value::from(missing.clone()));
                envelope
                    .fields
                    .insert("required_params".to_string(), Value::from(required.clone()));
            }
            _ => {}
        }
        envelope
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success)
    }

    /// Failure message, if this is a failure.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failure { message, .. } => Some(message),
        }
    }

    /// Internal error classification (never serialized).
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Success => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Look up an operation-specific field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Render as a flat JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 2);
        map.insert("success".to_string(), Value::Bool(self.is_success()));
        if let Some(message) = self.error() {
            map.insert("error".to_string(), Value::String(message.to_string()));
        }
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl From<Error> for Envelope {
    fn from(err: Error) -> Self {
        Envelope::from_error(&err)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = if self.is_success() { 1 } else { 2 };
        let mut map = serializer.serialize_map(Some(self.fields.len() + extra))?;
        map.serialize_entry("success", &self.is_success())?;
        if let Some(message) = self.error() {
            map.serialize_entry("error", message)?;
        }
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut map = Map::deserialize(deserializer)?;
        let success = map
            .remove("success")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| de::Error::missing_field("success"))?;
        let error = map.remove("error");
        if success {
            if error.is_some() {
                return Err(de::Error::custom("success envelope must not carry an error"));
            }
            return Ok(Envelope::success(map));
        }
        let message = error
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| de::Error::missing_field("error"))?;
        let mut envelope = Envelope::failure(ErrorKind::Internal, message);
        envelope.fields = map;
        Ok(envelope)
    }
}
