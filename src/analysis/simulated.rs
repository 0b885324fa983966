//! Random-output analysis used when no real algorithm is attached.
//!
//! Output is random but always inside the documented ranges: confidences in
//! `[0.7, 0.99)`, positions inside the image, at most [`MAX_FOCUS_STEPS`]
//! focus steps.

use super::{
    AnalysisStrategy, DatasetHandle, Defect, DiffractionResult, FeatureMap, FocusResult,
    FocusStep, Image, Interface, LiveAnalysisResult, Particle, ProcessingRequest,
    ProcessingResult, TargetArea, MAX_FOCUS_STEPS,
};
use crate::envelope::enums::{FeatureType, FocusStatus};
use crate::types::{Error, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;

/// Frame rate assumed for live analysis.
const LIVE_ANALYSIS_FPS: f64 = 10.0;

const DEFECT_KINDS: [&str; 3] = ["vacancy", "dislocation", "stacking_fault"];
const INTERFACE_KINDS: [&str; 2] = ["grain_boundary", "phase_boundary"];

#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedAnalysis;

impl SimulatedAnalysis {
    pub fn new() -> Self {
        Self
    }
}

fn simulate_focus(target_area: Option<TargetArea>, threshold: f64) -> FocusResult {
    let mut rng = rand::thread_rng();
    let mut steps = Vec::new();
    let mut quality: f64 = rng.gen_range(0.3..0.6);

    while quality < threshold && steps.len() < MAX_FOCUS_STEPS {
        let next = (quality + rng.gen_range(0.05..0.15)).min(1.0);
        steps.push(FocusStep {
            defocus_change_nm: rng.gen_range(-100.0..100.0),
            quality_before: quality,
            quality_after: next,
        });
        quality = next;
    }

    let initial_quality = steps.first().map_or(quality, |s| s.quality_before);
    FocusResult {
        target_area,
        initial_quality,
        final_quality: quality,
        steps,
        status: if quality >= threshold {
            FocusStatus::OptimalFocus
        } else {
            FocusStatus::BestPossible
        },
    }
}

fn simulate_features(width: i64, height: i64, feature_types: &[FeatureType]) -> FeatureMap {
    let mut rng = rand::thread_rng();
    let width = width.max(1);
    let height = height.max(1);
    let mut map = FeatureMap::default();

    if feature_types.contains(&FeatureType::Particles) {
        let n = rng.gen_range(5..20);
        map.particles = Some(
            (0..n)
                .map(|id| Particle {
                    id,
                    center_x: rng.gen_range(0..width),
                    center_y: rng.gen_range(0..height),
                    diameter_nm: rng.gen_range(1.0..10.0),
                    circularity: rng.gen_range(0.7..1.0),
                    kind: "particle".to_string(),
                    confidence: rng.gen_range(0.7..0.99),
                })
                .collect(),
        );
    }

    if feature_types.contains(&FeatureType::Defects) {
        let n = rng.gen_range(0..5);
        map.defects = Some(
            (0..n)
                .map(|id| Defect {
                    id,
                    position_x: rng.gen_range(0..width),
                    position_y: rng.gen_range(0..height),
                    kind: pick(&mut rng, &DEFECT_KINDS),
                    confidence: rng.gen_range(0.7..0.99),
                })
                .collect(),
        );
    }

    if feature_types.contains(&FeatureType::Interfaces) {
        let n = rng.gen_range(0..3);
        map.interfaces = Some(
            (0..n)
                .map(|id| {
                    let start_x = rng.gen_range(0..width);
                    let start_y = rng.gen_range(0..height);
                    let points = (0..rng.gen_range(5..15))
                        .map(|j: i64| {
                            [
                                (start_x + rng.gen_range(-20..20) * j).clamp(0, width),
                                (start_y + rng.gen_range(-20..20) * j).clamp(0, height),
                            ]
                        })
                        .collect();
                    Interface {
                        id,
                        points,
                        kind: pick(&mut rng, &INTERFACE_KINDS),
                        confidence: rng.gen_range(0.7..0.99),
                    }
                })
                .collect(),
        );
    }

    map
}

fn pick(rng: &mut impl Rng, options: &[&str]) -> String {
    options.choose(rng).copied().unwrap_or_default().to_string()
}

#[async_trait]
impl AnalysisStrategy for SimulatedAnalysis {
    async fn optimize_focus(
        &self,
        target_area: Option<TargetArea>,
        quality_threshold: f64,
    ) -> Result<FocusResult> {
        Ok(simulate_focus(target_area, quality_threshold))
    }

    async fn identify_features(
        &self,
        image: &Image,
        feature_types: &[FeatureType],
    ) -> Result<FeatureMap> {
        let width = i64::try_from(image.width).map_err(|e| Error::internal(e.to_string()))?;
        let height = i64::try_from(image.height).map_err(|e| Error::internal(e.to_string()))?;
        Ok(simulate_features(width, height, feature_types))
    }

    async fn analyze_diffraction(&self, _image: &Image) -> Result<DiffractionResult> {
        Ok(DiffractionResult {
            pattern_type: "crystalline".to_string(),
            d_spacings: vec![2.1, 1.8, 1.5, 1.2],
            intensities: vec![100.0, 80.0, 60.0, 40.0],
        })
    }

    async fn process_4d_stem(
        &self,
        _dataset: &DatasetHandle,
        request: &ProcessingRequest,
    ) -> Result<ProcessingResult> {
        let (parameters, result_summary) = match request {
            ProcessingRequest::VirtualDetector {
                inner_angle,
                outer_angle,
            } => (
                json!({"inner_angle": inner_angle, "outer_angle": outer_angle}),
                format!(
                    "Virtual detector image created with angles {}-{} mrad",
                    inner_angle, outer_angle
                ),
            ),
            ProcessingRequest::StrainMapping { reference_point } => (
                json!({"reference_point": reference_point}),
                format!(
                    "Strain map created with reference point [{}, {}]",
                    reference_point[0], reference_point[1]
                ),
            ),
        };
        Ok(ProcessingResult {
            processing_type: request.processing_type().to_string(),
            parameters,
            result_summary,
        })
    }

    async fn live_analysis(
        &self,
        analysis_type: &str,
        duration_seconds: f64,
    ) -> Result<LiveAnalysisResult> {
        Ok(LiveAnalysisResult {
            frames_processed: (duration_seconds * LIVE_ANALYSIS_FPS).floor() as u64,
            summary: format!("Completed {} analysis on live data stream", analysis_type),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: usize, height: usize) -> Image {
        Image {
            width,
            height,
            data: vec![vec![0.0; width]; height],
        }
    }

    #[tokio::test]
    async fn test_focus_respects_step_budget_and_threshold() {
        let analysis = SimulatedAnalysis::new();
        for threshold in [0.0, 0.5, 0.8, 1.0] {
            let result = analysis.optimize_focus(None, threshold).await.unwrap();
            assert!(result.steps.len() <= MAX_FOCUS_STEPS);
            assert!(result.final_quality <= 1.0);
            match result.status {
                FocusStatus::OptimalFocus => assert!(result.final_quality >= threshold),
                FocusStatus::BestPossible => {
                    assert!(result.final_quality < threshold);
                    assert_eq!(result.steps.len(), MAX_FOCUS_STEPS);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_focus_steps_never_lose_quality() {
        let result = SimulatedAnalysis::new()
            .optimize_focus(Some([0.0, 0.0, 64.0, 64.0]), 0.95)
            .await
            .unwrap();
        for step in &result.steps {
            assert!(step.quality_after >= step.quality_before);
        }
        assert_eq!(result.target_area, Some([0.0, 0.0, 64.0, 64.0]));
    }

    #[tokio::test]
    async fn test_features_only_requested_types() {
        let map = SimulatedAnalysis::new()
            .identify_features(&blank(64, 32), &[FeatureType::Defects])
            .await
            .unwrap();
        assert!(map.particles.is_none());
        assert!(map.interfaces.is_none());
        assert!(map.defects.is_some());
    }

    #[tokio::test]
    async fn test_features_within_bounds_and_confidence_range() {
        let map = SimulatedAnalysis::new()
            .identify_features(&blank(64, 32), &FeatureType::ALL)
            .await
            .unwrap();
        for p in map.particles.as_deref().unwrap_or_default() {
            assert!((0..64).contains(&p.center_x));
            assert!((0..32).contains(&p.center_y));
        }
        for i in map.interfaces.as_deref().unwrap_or_default() {
            for [x, y] in &i.points {
                assert!((0..=64).contains(x));
                assert!((0..=32).contains(y));
            }
        }
        assert!(map.confidences().iter().all(|c| (0.0..=1.0).contains(c)));
        assert!(map.count(FeatureType::Particles) >= 5);
    }

    #[tokio::test]
    async fn test_strain_mapping_summary() {
        let dataset = DatasetHandle {
            path: None,
            dimensions: [64, 64, 256, 256],
            pixel_size_nm: 0.1,
            convergence_angle_mrad: 1.5,
            camera_length_mm: 100.0,
            simulated: true,
        };
        let result = SimulatedAnalysis::new()
            .process_4d_stem(
                &dataset,
                &ProcessingRequest::StrainMapping {
                    reference_point: [32.0, 32.0],
                },
            )
            .await
            .unwrap();
        assert_eq!(result.processing_type, "strain_mapping");
        assert_eq!(result.parameters, json!({"reference_point": [32.0, 32.0]}));
        assert!(result.result_summary.contains("[32, 32]"));
    }

    #[tokio::test]
    async fn test_live_analysis_frames() {
        let result = SimulatedAnalysis::new()
            .live_analysis("drift_correction", 2.5)
            .await
            .unwrap();
        assert_eq!(result.frames_processed, 25);
        assert!(result.summary.contains("drift_correction"));
    }
}
