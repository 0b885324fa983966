//! Workflow execution backends.

use super::WorkflowDescriptor;
use crate::types::Result;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of a completed workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub files_created: Vec<String>,
    pub duration_seconds: u64,
    pub summary: String,
}

/// Runs a validated workflow. Implementations can assume required
/// parameters are present.
#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn execute(
        &self,
        workflow: &WorkflowDescriptor,
        parameters: &Map<String, Value>,
    ) -> Result<WorkflowOutcome>;
}

/// Reports a completed run without touching the instrument.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedWorkflowExecutor;

#[async_trait]
impl WorkflowExecutor for SimulatedWorkflowExecutor {
    async fn execute(
        &self,
        workflow: &WorkflowDescriptor,
        parameters: &Map<String, Value>,
    ) -> Result<WorkflowOutcome> {
        let duration_seconds = rand::thread_rng().gen_range(10..300);
        Ok(WorkflowOutcome {
            files_created: vec![format!(
                "{}_result_{}.dm4",
                workflow.name,
                Utc::now().timestamp()
            )],
            duration_seconds,
            summary: format!(
                "Completed {} workflow with parameters {}",
                workflow.name,
                Value::Object(parameters.clone())
            ),
        })
    }
}
