//! Experiment workflows - static catalog, required-parameter validation,
//! pluggable execution.

mod executor;

pub use executor::{SimulatedWorkflowExecutor, WorkflowExecutor, WorkflowOutcome};

use crate::types::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// A pre-declared multi-parameter operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub required_params: &'static [&'static str],
}

/// Built-in workflows, in catalog order.
pub const WORKFLOWS: &[WorkflowDescriptor] = &[
    WorkflowDescriptor {
        name: "tomography_tilt_series",
        description: "Acquire a tomography tilt series",
        required_params: &["start_angle", "end_angle", "angle_step"],
    },
    WorkflowDescriptor {
        name: "eels_spectrum_imaging",
        description: "Acquire an EELS spectrum image",
        required_params: &["scan_size_x", "scan_size_y", "exposure_time"],
    },
    WorkflowDescriptor {
        name: "4d_stem_mapping",
        description: "Acquire a 4D STEM dataset",
        required_params: &["scan_size_x", "scan_size_y", "camera_length"],
    },
];

/// Checks workflow requests against the catalog.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowValidator {
    catalog: &'static [WorkflowDescriptor],
}

impl Default for WorkflowValidator {
    fn default() -> Self {
        Self::new(WORKFLOWS)
    }
}

impl WorkflowValidator {
    pub fn new(catalog: &'static [WorkflowDescriptor]) -> Self {
        Self { catalog }
    }

    /// Known workflow names, in catalog order.
    pub fn names(&self) -> Vec<String> {
        self.catalog.iter().map(|w| w.name.to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&'static WorkflowDescriptor> {
        self.catalog.iter().find(|w| w.name == name)
    }

    /// Validate a workflow request.
    ///
    /// Fails with `UnknownWorkflow` (listing the known names) or
    /// `MissingParameters` (missing names in declaration order).
    pub fn validate(
        &self,
        workflow_name: &str,
        parameters: &Map<String, Value>,
    ) -> Result<&'static WorkflowDescriptor> {
        let workflow = self.get(workflow_name).ok_or_else(|| Error::UnknownWorkflow {
            name: workflow_name.to_string(),
            available: self.names(),
        })?;

        let missing: Vec<String> = workflow
            .required_params
            .iter()
            .filter(|p| !parameters.contains_key(**p))
            .map(|p| p.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(Error::MissingParameters {
                missing,
                required: workflow
                    .required_params
                    .iter()
                    .map(|p| p.to_string())
                    .collect(),
            });
        }

        Ok(workflow)
    }
}
