//! Diffraction, live analysis and 4D-STEM processing.

use super::{parse_args, to_fields};
use crate::analysis::{DiffractionResult, LiveAnalysisResult, ProcessingRequest};
use crate::envelope::Fields;
use crate::instrument::Image;
use crate::tools::context::ToolContext;
use crate::tools::registry::ToolHandler;
use crate::types::{Error, Result};
use crate::validation::{validate_non_empty, validate_positive};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DEFAULT_INNER_ANGLE: f64 = 0.0;
const DEFAULT_OUTER_ANGLE: f64 = 30.0;
const DEFAULT_REFERENCE_POINT: [f64; 2] = [32.0, 32.0];

// =============================================================================
// analyze_diffraction_pattern
// =============================================================================

#[derive(Debug, Serialize)]
struct DiffractionAnalysis {
    #[serde(flatten)]
    result: DiffractionResult,
    image_data: Image,
}

/// Analyze the current front image as a diffraction pattern.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnalyzeDiffractionPattern;

#[async_trait]
impl ToolHandler for AnalyzeDiffractionPattern {
    async fn call(&self, ctx: &ToolContext, _args: Map<String, Value>) -> Result<Fields> {
        let image = ctx.instrument.current_image().await?;
        let result = ctx.analysis.analyze_diffraction(&image).await?;
        to_fields(&DiffractionAnalysis {
            result,
            image_data: image,
        })
    }
}

// =============================================================================
// run_live_analysis
// =============================================================================

#[derive(Debug, Deserialize)]
struct LiveAnalysisArgs {
    analysis_type: String,
    duration_seconds: f64,
}

#[derive(Debug, Serialize)]
struct LiveAnalysisReport {
    analysis_type: String,
    duration: f64,
    results: LiveAnalysisResult,
}

/// Run an analysis over the live data stream for a fixed duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunLiveAnalysis;

#[async_trait]
impl ToolHandler for RunLiveAnalysis {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: LiveAnalysisArgs = parse_args(args)?;
        validate_non_empty(&args.analysis_type, "analysis_type")?;
        validate_positive(args.duration_seconds, "duration_seconds")?;

        let results = ctx
            .analysis
            .live_analysis(&args.analysis_type, args.duration_seconds)
            .await?;
        to_fields(&LiveAnalysisReport {
            analysis_type: args.analysis_type,
            duration: args.duration_seconds,
            results,
        })
    }
}

// =============================================================================
// process_4d_stem_data
// =============================================================================

#[derive(Debug, Deserialize)]
struct ProcessArgs {
    dataset_path: String,
    processing_type: String,
    parameters: Option<Map<String, Value>>,
}

/// Build a processing request, filling per-type defaults.
fn processing_request(
    processing_type: &str,
    parameters: &Map<String, Value>,
) -> Result<ProcessingRequest> {
    match processing_type {
        "virtual_detector" => Ok(ProcessingRequest::VirtualDetector {
            inner_angle: number_or(parameters, "inner_angle", DEFAULT_INNER_ANGLE)?,
            outer_angle: number_or(parameters, "outer_angle", DEFAULT_OUTER_ANGLE)?,
        }),
        "strain_mapping" => {
            let reference_point = match parameters.get("reference_point") {
                None | Some(Value::Null) => DEFAULT_REFERENCE_POINT,
                Some(value) => serde_json::from_value::<[f64; 2]>(value.clone()).map_err(|_| {
                    Error::invalid_arguments("reference_point must be a pair of numbers [x, y]")
                })?,
            };
            Ok(ProcessingRequest::StrainMapping { reference_point })
        }
        other => Err(Error::UnknownProcessingType(other.to_string())),
    }
}

fn number_or(parameters: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    match parameters.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| Error::invalid_arguments(format!("{} must be a number", key))),
    }
}

/// Process a stored 4D-STEM dataset.
#[derive(Debug, Default, Clone, Copy)]
pub struct Process4dStemData;

#[async_trait]
impl ToolHandler for Process4dStemData {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: ProcessArgs = parse_args(args)?;
        validate_non_empty(&args.dataset_path, "dataset_path")?;
        let request =
            processing_request(&args.processing_type, &args.parameters.unwrap_or_default())?;

        let dataset = ctx.instrument.open_dataset(Some(args.dataset_path)).await?;
        let result = ctx.analysis.process_4d_stem(&dataset, &request).await?;
        tracing::debug!(processing_type = request.processing_type(), "4d_stem_processed");
        to_fields(&result)
    }
}
