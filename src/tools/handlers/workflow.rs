//! Pre-declared experiment workflows.

use super::{parse_args, to_fields};
use crate::envelope::Fields;
use crate::tools::context::ToolContext;
use crate::tools::registry::ToolHandler;
use crate::types::Result;
use crate::workflows::WorkflowOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct WorkflowArgs {
    workflow_name: String,
    parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct WorkflowReport {
    workflow_name: String,
    parameters: Map<String, Value>,
    status: &'static str,
    results: WorkflowOutcome,
}

/// Validate and run a named workflow.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunExperimentWorkflow;

#[async_trait]
impl ToolHandler for RunExperimentWorkflow {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: WorkflowArgs = parse_args(args)?;
        let parameters = args.parameters.unwrap_or_default();

        let workflow = ctx.workflows.validate(&args.workflow_name, &parameters)?;
        tracing::info!(workflow = workflow.name, "workflow_started");
        let results = ctx.executor.execute(workflow, &parameters).await?;
        tracing::info!(
            workflow = workflow.name,
            duration_seconds = results.duration_seconds,
            "workflow_completed"
        );

        to_fields(&WorkflowReport {
            workflow_name: args.workflow_name,
            parameters,
            status: "completed",
            results,
        })
    }
}
