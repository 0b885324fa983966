//! Tool infrastructure - catalog, registry, dispatch, health tracking and the
//! built-in microscope tools.

pub mod builtin;
pub mod catalog;
pub mod context;
pub mod dispatch;
pub mod handlers;
pub mod health;
pub mod recovery;
pub mod registry;

pub use builtin::{builtin_registry, builtin_tools};
pub use catalog::{ParamDef, ParamType, ToolEntry};
pub use context::ToolContext;
pub use dispatch::ToolDispatcher;
pub use health::{HealthConfig, SystemHealthReport, ToolHealthReport, ToolHealthTracker};
pub use registry::{ToolDescriptor, ToolHandler, ToolRegistry};
