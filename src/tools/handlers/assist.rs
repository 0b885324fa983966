//! Assisted focusing and feature identification.

use super::{parse_args, to_fields};
use crate::analysis::{FeatureMap, FocusResult, TargetArea};
use crate::envelope::enums::FeatureType;
use crate::envelope::Fields;
use crate::tools::context::ToolContext;
use crate::tools::registry::ToolHandler;
use crate::types::{Error, Result};
use crate::validation::validate_range;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// ai_assisted_focus
// =============================================================================

#[derive(Debug, Deserialize)]
struct FocusArgs {
    target_area: Option<Vec<f64>>,
    quality_threshold: f64,
}

/// Step the focus until the image quality reaches the threshold.
#[derive(Debug, Default, Clone, Copy)]
pub struct AiAssistedFocus;

#[async_trait]
impl ToolHandler for AiAssistedFocus {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: FocusArgs = parse_args(args)?;
        validate_range(args.quality_threshold, 0.0, 1.0, "quality_threshold")?;
        let target_area = args.target_area.map(target_area).transpose()?;

        let result: FocusResult = ctx
            .analysis
            .optimize_focus(target_area, args.quality_threshold)
            .await?;
        tracing::info!(
            steps = result.steps.len(),
            final_quality = result.final_quality,
            status = ?result.status,
            "focus_optimized"
        );
        to_fields(&result)
    }
}

fn target_area(values: Vec<f64>) -> Result<TargetArea> {
    let len = values.len();
    let area: TargetArea = values.try_into().map_err(|_| {
        Error::validation(format!(
            "target_area must be [x, y, width, height], got {} values",
            len
        ))
    })?;
    if area.iter().any(|v| !v.is_finite()) {
        return Err(Error::validation("target_area values must be finite"));
    }
    Ok(area)
}

// =============================================================================
// ai_identify_features
// =============================================================================

#[derive(Debug, Deserialize)]
struct FeatureArgs {
    feature_types: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FeatureReport {
    feature_types: Vec<FeatureType>,
    features: FeatureMap,
    summary: String,
}

/// Identify particles, defects and/or interfaces in the current image.
#[derive(Debug, Default, Clone, Copy)]
pub struct AiIdentifyFeatures;

#[async_trait]
impl ToolHandler for AiIdentifyFeatures {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: FeatureArgs = parse_args(args)?;
        let feature_types = args
            .feature_types
            .iter()
            .map(|t| t.parse::<FeatureType>().map_err(Error::validation))
            .collect::<Result<Vec<_>>>()?;

        let image = ctx.instrument.current_image().await?;
        let features = ctx.analysis.identify_features(&image, &feature_types).await?;
        let summary = format!(
            "Identified features in image: {}",
            feature_types
                .iter()
                .map(|t| format!("{} {}", features.count(*t), t))
                .collect::<Vec<_>>()
                .join(", ")
        );

        to_fields(&FeatureReport {
            feature_types,
            features,
            summary,
        })
    }
}
