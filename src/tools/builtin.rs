//! The built-in tool catalog exposed over MCP.

use super::catalog::{ParamDef, ParamType, ToolEntry};
use super::handlers::{acquisition, analysis, assist, streaming, workflow};
use super::registry::{ToolDescriptor, ToolHandler, ToolRegistry};
use crate::envelope::enums::{FeatureType, RiskSemantic, ToolCategory};
use crate::types::Result;
use serde_json::{json, Value};

fn tool(
    name: &str,
    description: &str,
    category: ToolCategory,
    risk: RiskSemantic,
    parameters: Vec<ParamDef>,
    handler: impl ToolHandler + 'static,
) -> ToolDescriptor {
    ToolDescriptor::new(
        ToolEntry {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            category,
            risk,
        },
        handler,
    )
}

/// Every built-in tool, in catalog order.
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    use RiskSemantic::{ReadOnly, Write};
    use ToolCategory::*;

    let all_features: Vec<Value> = FeatureType::ALL.iter().map(|t| json!(t.as_str())).collect();

    vec![
        tool(
            "acquire_image",
            "Acquire a new microscopy image with the given acquisition mode and exposure",
            Acquisition,
            ReadOnly,
            vec![
                ParamDef::with_default(
                    "mode",
                    ParamType::String,
                    "Acquisition mode (TEM, STEM, Diffraction, ...)",
                    json!("TEM"),
                ),
                ParamDef::with_default(
                    "exposure_time",
                    ParamType::Float,
                    "Exposure time in seconds",
                    json!(0.1),
                ),
            ],
            acquisition::AcquireImage,
        ),
        tool(
            "analyze_diffraction_pattern",
            "Analyze the current diffraction pattern",
            Analysis,
            ReadOnly,
            vec![],
            analysis::AnalyzeDiffractionPattern,
        ),
        tool(
            "set_microscope_parameters",
            "Set accelerating voltage, spot size and/or camera length",
            Control,
            Write,
            vec![
                ParamDef::optional("voltage", ParamType::Float, "Accelerating voltage in kV"),
                ParamDef::optional("spot_size", ParamType::Int, "Spot size (1-11)"),
                ParamDef::optional("camera_length", ParamType::Float, "Camera length in mm"),
            ],
            acquisition::SetMicroscopeParameters,
        ),
        tool(
            "get_4d_stem_data",
            "Get the summary and metadata of a 4D STEM dataset",
            Acquisition,
            ReadOnly,
            vec![ParamDef::optional(
                "dataset_path",
                ParamType::String,
                "Path to the dataset; the currently open dataset when null",
            )],
            acquisition::Get4dStemData,
        ),
        tool(
            "run_live_analysis",
            "Run live analysis on streaming microscopy data",
            Analysis,
            ReadOnly,
            vec![
                ParamDef::required(
                    "analysis_type",
                    ParamType::String,
                    "Analysis to perform (e.g. particle_tracking, drift_correction)",
                ),
                ParamDef::with_default(
                    "duration_seconds",
                    ParamType::Float,
                    "How long to run the analysis",
                    json!(10.0),
                ),
            ],
            analysis::RunLiveAnalysis,
        ),
        tool(
            "process_4d_stem_data",
            "Process a 4D STEM dataset (virtual_detector or strain_mapping)",
            Analysis,
            ReadOnly,
            vec![
                ParamDef::required("dataset_path", ParamType::String, "Path to the dataset"),
                ParamDef::with_default(
                    "processing_type",
                    ParamType::String,
                    "virtual_detector or strain_mapping",
                    json!("virtual_detector"),
                ),
                ParamDef::optional(
                    "parameters",
                    ParamType::Object,
                    "Processing parameters (inner_angle/outer_angle or reference_point)",
                ),
            ],
            analysis::Process4dStemData,
        ),
        tool(
            "start_live_stream",
            "Start a live data stream from the microscope",
            Streaming,
            ReadOnly,
            vec![
                ParamDef::with_default(
                    "stream_type",
                    ParamType::String,
                    "Stream source (camera, eels, eds, ...)",
                    json!("camera"),
                ),
                ParamDef::with_default(
                    "frame_rate",
                    ParamType::Float,
                    "Frames per second",
                    json!(10.0),
                ),
                ParamDef::with_default(
                    "duration",
                    ParamType::Float,
                    "Stream lifetime in seconds",
                    json!(60.0),
                ),
            ],
            streaming::StartLiveStream,
        ),
        tool(
            "get_stream_frame",
            "Get the next frame from a live stream",
            Streaming,
            ReadOnly,
            vec![ParamDef::required(
                "stream_id",
                ParamType::String,
                "Stream id returned by start_live_stream",
            )],
            streaming::GetStreamFrame,
        ),
        tool(
            "stop_stream",
            "Stop a live data stream",
            Streaming,
            ReadOnly,
            vec![ParamDef::required(
                "stream_id",
                ParamType::String,
                "Stream id returned by start_live_stream",
            )],
            streaming::StopStream,
        ),
        tool(
            "run_experiment_workflow",
            "Run a predefined experiment workflow",
            Workflow,
            Write,
            vec![
                ParamDef::required("workflow_name", ParamType::String, "Workflow to run"),
                ParamDef::optional("parameters", ParamType::Object, "Workflow parameters"),
            ],
            workflow::RunExperimentWorkflow,
        ),
        tool(
            "ai_assisted_focus",
            "Step the focus until image quality reaches the threshold",
            Assist,
            Write,
            vec![
                ParamDef::optional(
                    "target_area",
                    ParamType::FloatList,
                    "Region to optimize as [x, y, width, height]",
                ),
                ParamDef::with_default(
                    "quality_threshold",
                    ParamType::Float,
                    "Target quality in [0, 1]",
                    json!(0.8),
                ),
            ],
            assist::AiAssistedFocus,
        ),
        tool(
            "ai_identify_features",
            "Identify particles, defects and interfaces in the current image",
            Assist,
            ReadOnly,
            vec![ParamDef::with_default(
                "feature_types",
                ParamType::StringList,
                "Feature types to identify",
                Value::Array(all_features),
            )],
            assist::AiIdentifyFeatures,
        ),
    ]
}

/// Registry pre-populated with every built-in tool.
pub fn builtin_registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for descriptor in builtin_tools() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}
