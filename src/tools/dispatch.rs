//! Tool dispatcher - the single boundary where typed errors become envelopes.
//!
//! ```text
//! invoke(name, args, cancel)
//!   → resolve → fill defaults → validate
//!   → handler.call  (panic-guarded, raced against cancel + call_timeout)
//!   → log + record health
//!   → Envelope
//! ```

use super::catalog::value_type_name;
use super::context::ToolContext;
use super::health::{HealthConfig, SystemHealthReport, ToolHealthReport, ToolHealthTracker};
use super::recovery::with_recovery;
use super::registry::ToolRegistry;
use crate::envelope::{Envelope, Fields};
use crate::types::{DispatchConfig, Error, ErrorKind, Result};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Routes tool calls to their handlers and normalizes every outcome.
#[derive(Debug)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
    call_timeout: Duration,
    health: Mutex<ToolHealthTracker>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext, config: &DispatchConfig) -> Self {
        let mut health = ToolHealthTracker::new(HealthConfig::from(config));
        health.set_registered_tools(registry.names());
        Self {
            registry,
            context,
            call_timeout: config.call_timeout,
            health: Mutex::new(health),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Invoke a tool by name. Never fails: every error is flattened into a
    /// failure envelope.
    pub async fn invoke(&self, name: &str, arguments: Value, cancel: &CancellationToken) -> Envelope {
        let started = Instant::now();
        let result = self.try_invoke(name, arguments, cancel).await;
        let latency = started.elapsed();
        let latency_ms = latency.as_millis() as u64;

        match result {
            Ok(fields) => {
                tracing::debug!(tool = name, latency_ms, "tool_call_succeeded");
                self.record(name, latency, None);
                Envelope::success(fields)
            }
            Err(err) => {
                let kind = err.kind();
                if err.retryable() {
                    tracing::warn!(tool = name, latency_ms, error_kind = %kind, error = %err, "tool_call_failed");
                } else {
                    tracing::info!(tool = name, latency_ms, error_kind = %kind, error = %err, "tool_call_failed");
                }
                self.record(name, latency, Some(kind));
                Envelope::from_error(&err)
            }
        }
    }

    async fn try_invoke(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Fields> {
        let descriptor = self.registry.resolve(name)?;

        let mut args = match arguments {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(Error::invalid_arguments(format!(
                    "arguments must be an object, got {}",
                    value_type_name(&other)
                )))
            }
        };

        descriptor.entry.fill_defaults(&mut args);
        let problems = descriptor.entry.validate_args(&args);
        if !problems.is_empty() {
            return Err(Error::invalid_arguments(problems.join("; ")));
        }

        let call = with_recovery(descriptor.handler.call(&self.context, args), name);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(self.call_timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Error::timeout(format!(
                    "{} did not complete within {:?}",
                    name, self.call_timeout
                ))),
            },
        }
    }

    fn record(&self, name: &str, latency: Duration, failure: Option<ErrorKind>) {
        // Unknown names are not tools; keep them out of the health table.
        if !self.registry.has_tool(name) {
            return;
        }
        if let Ok(mut health) = self.health.lock() {
            health.record(name, latency, failure);
        }
    }

    pub fn tool_health(&self, name: &str) -> Option<ToolHealthReport> {
        self.health.lock().ok().map(|h| h.check_tool_health(name))
    }

    pub fn system_health(&self) -> Option<SystemHealthReport> {
        self.health.lock().ok().map(|h| h.check_system_health())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::enums::{RiskSemantic, ToolCategory};
    use crate::tools::catalog::{ParamDef, ParamType, ToolEntry};
    use crate::tools::registry::{ToolDescriptor, ToolHandler};
    use crate::types::Config;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, _ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
            Ok(args)
        }
    }

    struct Sleepy;

    #[async_trait]
    impl ToolHandler for Sleepy {
        async fn call(&self, _ctx: &ToolContext, _args: Map<String, Value>) -> Result<Fields> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Fields::new())
        }
    }

    struct Panicky;

    #[async_trait]
    impl ToolHandler for Panicky {
        async fn call(&self, _ctx: &ToolContext, _args: Map<String, Value>) -> Result<Fields> {
            tokio::task::yield_now().await;
            panic!("frame counter overflowed");
        }
    }

    struct Broken;

    #[async_trait]
    impl ToolHandler for Broken {
        async fn call(&self, _ctx: &ToolContext, _args: Map<String, Value>) -> Result<Fields> {
            Err(Error::instrument_unavailable("driver offline"))
        }
    }

    fn entry(name: &str, parameters: Vec<ParamDef>) -> ToolEntry {
        ToolEntry {
            name: name.to_string(),
            description: String::new(),
            parameters,
            category: ToolCategory::Acquisition,
            risk: RiskSemantic::ReadOnly,
        }
    }

    fn dispatcher(timeout: Duration) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolDescriptor::new(
                entry(
                    "echo",
                    vec![
                        ParamDef::with_default("mode", ParamType::String, "", json!("TEM")),
                        ParamDef::with_default("exposure_time", ParamType::Float, "", json!(0.1)),
                    ],
                ),
                Echo,
            ))
            .unwrap();
        registry
            .register(ToolDescriptor::new(entry("sleepy", vec![]), Sleepy))
            .unwrap();
        registry
            .register(ToolDescriptor::new(entry("broken", vec![]), Broken))
            .unwrap();
        registry
            .register(ToolDescriptor::new(entry("panicky", vec![]), Panicky))
            .unwrap();
        let config = Config::default();
        ToolDispatcher::new(
            Arc::new(registry),
            ToolContext::simulated(&config),
            &DispatchConfig {
                call_timeout: timeout,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_defaults_filled_around_supplied_args() {
        let envelope = dispatcher(Duration::from_secs(5))
            .invoke("echo", json!({"mode": "STEM"}), &CancellationToken::new())
            .await;
        assert!(envelope.is_success());
        assert_eq!(envelope.get("mode"), Some(&json!("STEM")));
        assert_eq!(envelope.get("exposure_time"), Some(&json!(0.1)));
    }

    #[tokio::test]
    async fn test_null_arguments_treated_as_empty() {
        let envelope = dispatcher(Duration::from_secs(5))
            .invoke("echo", Value::Null, &CancellationToken::new())
            .await;
        assert!(envelope.is_success());
        assert_eq!(envelope.get("mode"), Some(&json!("TEM")));
    }

    #[tokio::test]
    async fn test_non_object_arguments_rejected() {
        let envelope = dispatcher(Duration::from_secs(5))
            .invoke("echo", json!([1, 2]), &CancellationToken::new())
            .await;
        assert_eq!(envelope.error_kind(), Some(ErrorKind::InvalidArguments));
    }

    #[tokio::test]
    async fn test_validation_problems_joined() {
        let envelope = dispatcher(Duration::from_secs(5))
            .invoke(
                "echo",
                json!({"exposure_time": "long", "colour": "red"}),
                &CancellationToken::new(),
            )
            .await;
        let message = envelope.error().unwrap();
        assert!(message.contains("exposure_time"));
        assert!(message.contains("Unknown parameter: colour"));
        assert!(message.contains("; "));
    }

    #[tokio::test]
    async fn test_unknown_tool_envelope() {
        let envelope = dispatcher(Duration::from_secs(5))
            .invoke("teleport", json!({}), &CancellationToken::new())
            .await;
        assert_eq!(
            envelope.to_value(),
            json!({"success": false, "error": "Unknown tool: teleport"})
        );
    }

    #[tokio::test]
    async fn test_cancellation_yields_cancelled() {
        let dispatcher = dispatcher(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let envelope = dispatcher.invoke("sleepy", json!({}), &cancel).await;
        assert_eq!(envelope.error(), Some("cancelled"));
        assert_eq!(envelope.error_kind(), Some(ErrorKind::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_timeout_kind() {
        let envelope = dispatcher(Duration::from_secs(2))
            .invoke("sleepy", json!({}), &CancellationToken::new())
            .await;
        assert_eq!(envelope.error_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_handler_errors_recorded_in_health() {
        let dispatcher = dispatcher(Duration::from_secs(5));
        let envelope = dispatcher
            .invoke("broken", json!({}), &CancellationToken::new())
            .await;
        assert!(!envelope.is_success());
        assert!(!envelope.error().unwrap().is_empty());

        let report = dispatcher.tool_health("broken").unwrap();
        assert_eq!(report.total_calls, 1);
        assert_eq!(report.failures_by_kind[&ErrorKind::InstrumentUnavailable], 1);

        dispatcher
            .invoke("teleport", json!({}), &CancellationToken::new())
            .await;
        let system = dispatcher.system_health().unwrap();
        assert_eq!(system.tool_reports.len(), 4);
    }

    #[tokio::test]
    async fn test_panicking_handler_yields_internal_failure() {
        let dispatcher = dispatcher(Duration::from_secs(5));
        let envelope = dispatcher
            .invoke("panicky", json!({}), &CancellationToken::new())
            .await;
        assert_eq!(envelope.to_value()["success"], json!(false));
        assert_eq!(envelope.error_kind(), Some(ErrorKind::Internal));
        assert!(envelope.error().unwrap().contains("frame counter overflowed"));

        let report = dispatcher.tool_health("panicky").unwrap();
        assert_eq!(report.failures_by_kind[&ErrorKind::Internal], 1);

        // the dispatcher keeps serving after a panic
        assert!(dispatcher
            .invoke("echo", json!({}), &CancellationToken::new())
            .await
            .is_success());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_failure_logs_error_kind() {
        dispatcher(Duration::from_secs(5))
            .invoke("broken", json!({}), &CancellationToken::new())
            .await;
        assert!(logs_contain("tool_call_failed"));
        assert!(logs_contain("INSTRUMENT_UNAVAILABLE"));
    }
}
