//! Analysis strategies - focus optimization, feature detection, diffraction,
//! 4D-STEM processing and live analysis.
//!
//! The server assumes no particular algorithm. A strategy only has to return
//! data in the shapes defined here; [`SimulatedAnalysis`] is the stand-in used
//! until a real implementation is attached.

mod simulated;

pub use simulated::SimulatedAnalysis;

use crate::envelope::enums::{FeatureType, FocusStatus};
use crate::instrument::{DatasetHandle, Image};
use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Maximum number of focus adjustments per optimization run.
pub const MAX_FOCUS_STEPS: usize = 10;

// =============================================================================
// Focus
// =============================================================================

/// `[x, y, width, height]` region of the image to optimize.
pub type TargetArea = [f64; 4];

/// One focus adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusStep {
    pub defocus_change_nm: f64,
    pub quality_before: f64,
    pub quality_after: f64,
}

/// Result of a focus optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusResult {
    pub target_area: Option<TargetArea>,
    pub initial_quality: f64,
    pub final_quality: f64,
    pub steps: Vec<FocusStep>,
    pub status: FocusStatus,
}

// =============================================================================
// Feature detection
// =============================================================================

/// Detected particle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: usize,
    pub center_x: i64,
    pub center_y: i64,
    pub diameter_nm: f64,
    pub circularity: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
}

/// Detected point or line defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    pub id: usize,
    pub position_x: i64,
    pub position_y: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
}

/// Detected boundary, as a polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub id: usize,
    pub points: Vec<[i64; 2]>,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f64,
}

/// Features grouped by type. Only requested types are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particles: Option<Vec<Particle>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defects: Option<Vec<Defect>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Vec<Interface>>,
}

impl FeatureMap {
    /// Number of features found for a type (0 when not requested).
    pub fn count(&self, feature_type: FeatureType) -> usize {
        match feature_type {
            FeatureType::Particles => self.particles.as_ref().map_or(0, Vec::len),
            FeatureType::Defects => self.defects.as_ref().map_or(0, Vec::len),
            FeatureType::Interfaces => self.interfaces.as_ref().map_or(0, Vec::len),
        }
    }

    /// Every confidence score in the map.
    pub fn confidences(&self) -> Vec<f64> {
        let mut out = Vec::new();
        if let Some(p) = &self.particles {
            out.extend(p.iter().map(|f| f.confidence));
        }
        if let Some(d) = &self.defects {
            out.extend(d.iter().map(|f| f.confidence));
        }
        if let Some(i) = &self.interfaces {
            out.extend(i.iter().map(|f| f.confidence));
        }
        out
    }
}

// =============================================================================
// Diffraction / 4D-STEM / live analysis
// =============================================================================

/// Diffraction pattern analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffractionResult {
    pub pattern_type: String,
    pub d_spacings: Vec<f64>,
    pub intensities: Vec<f64>,
}

/// 4D-STEM processing request, parsed from the tool's `parameters` object.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingRequest {
    VirtualDetector { inner_angle: f64, outer_angle: f64 },
    StrainMapping { reference_point: [f64; 2] },
}

impl ProcessingRequest {
    pub fn processing_type(&self) -> &'static str {
        match self {
            ProcessingRequest::VirtualDetector { .. } => "virtual_detector",
            ProcessingRequest::StrainMapping { .. } => "strain_mapping",
        }
    }
}

/// 4D-STEM processing outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub processing_type: String,
    pub parameters: serde_json::Value,
    pub result_summary: String,
}

/// Live analysis outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveAnalysisResult {
    pub frames_processed: u64,
    pub summary: String,
}

// =============================================================================
// Strategy
// =============================================================================

/// Pluggable analysis backend.
#[async_trait]
pub trait AnalysisStrategy: Send + Sync {
    /// Step the focus until `quality_threshold` is reached or the step budget runs out.
    async fn optimize_focus(
        &self,
        target_area: Option<TargetArea>,
        quality_threshold: f64,
    ) -> Result<FocusResult>;

    /// Detect the requested feature types in `image`.
    async fn identify_features(
        &self,
        image: &Image,
        feature_types: &[FeatureType],
    ) -> Result<FeatureMap>;

    async fn analyze_diffraction(&self, image: &Image) -> Result<DiffractionResult>;

    async fn process_4d_stem(
        &self,
        dataset: &DatasetHandle,
        request: &ProcessingRequest,
    ) -> Result<ProcessingResult>;

    async fn live_analysis(
        &self,
        analysis_type: &str,
        duration_seconds: f64,
    ) -> Result<LiveAnalysisResult>;
}
