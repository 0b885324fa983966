//! Tool registry - name → descriptor (metadata + handler).
//!
//! Descriptors are immutable once registered and shared via `Arc`, so every
//! resolve of a name hands out the same object. The registry never validates
//! arguments; that is the dispatcher's job.

use super::catalog::ToolEntry;
use super::context::ToolContext;
use crate::envelope::Fields;
use crate::types::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Executes one tool. Arguments arrive with defaults filled and types
/// already checked against the entry's parameter list.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields>;
}

/// Registered tool: metadata plus handler.
pub struct ToolDescriptor {
    pub entry: ToolEntry,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(entry: ToolEntry, handler: impl ToolHandler + 'static) -> Self {
        Self {
            entry,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.entry.name
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

/// Tool lookup table.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be non-empty and unique.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<Arc<ToolDescriptor>> {
        let name = descriptor.name().to_string();
        if name.is_empty() {
            return Err(Error::validation("tool name cannot be empty"));
        }
        if self.tools.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        let descriptor = Arc::new(descriptor);
        self.tools.insert(name, descriptor.clone());
        Ok(descriptor)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ToolDescriptor>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All descriptors, sorted by name.
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        let mut tools: Vec<Arc<ToolDescriptor>> = self.tools.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn names(&self) -> Vec<String> {
        self.list().iter().map(|d| d.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
