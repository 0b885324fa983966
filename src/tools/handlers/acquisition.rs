//! Image acquisition, optics control and dataset access.

use super::{parse_args, to_fields};
use crate::envelope::Fields;
use crate::instrument::{Image, MicroscopeParameters};
use crate::tools::context::ToolContext;
use crate::tools::registry::ToolHandler;
use crate::types::{Error, Result};
use crate::validation::validate_positive;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Valid spot sizes on the column.
const SPOT_SIZE_RANGE: std::ops::RangeInclusive<i64> = 1..=11;

// =============================================================================
// acquire_image
// =============================================================================

#[derive(Debug, Deserialize)]
struct AcquireImageArgs {
    mode: String,
    exposure_time: f64,
}

#[derive(Debug, Serialize)]
struct AcquiredImage {
    #[serde(flatten)]
    image: Image,
    mode: String,
    exposure_time: f64,
}

/// Acquire an image in the given mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcquireImage;

#[async_trait]
impl ToolHandler for AcquireImage {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: AcquireImageArgs = parse_args(args)?;
        validate_positive(args.exposure_time, "exposure_time")?;

        let image = ctx.instrument.current_image().await?;
        tracing::debug!(mode = %args.mode, exposure_time = args.exposure_time, "image_acquired");
        to_fields(&AcquiredImage {
            image,
            mode: args.mode,
            exposure_time: args.exposure_time,
        })
    }
}

// =============================================================================
// set_microscope_parameters
// =============================================================================

#[derive(Debug, Serialize)]
struct AppliedParameters {
    parameters: MicroscopeParameters,
}

/// Apply voltage, spot size and/or camera length. Omitted fields are left
/// unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetMicroscopeParameters;

#[async_trait]
impl ToolHandler for SetMicroscopeParameters {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let params: MicroscopeParameters = parse_args(args)?;
        if let Some(voltage) = params.voltage {
            validate_positive(voltage, "voltage")?;
        }
        if let Some(camera_length) = params.camera_length {
            validate_positive(camera_length, "camera_length")?;
        }
        if let Some(spot_size) = params.spot_size {
            if !SPOT_SIZE_RANGE.contains(&spot_size) {
                return Err(Error::validation(format!(
                    "spot_size must be between {} and {}, got {}",
                    SPOT_SIZE_RANGE.start(),
                    SPOT_SIZE_RANGE.end(),
                    spot_size
                )));
            }
        }

        let applied = ctx.instrument.set_parameters(params).await?;
        tracing::info!(
            voltage = ?applied.voltage,
            spot_size = ?applied.spot_size,
            camera_length = ?applied.camera_length,
            "microscope_parameters_set"
        );
        to_fields(&AppliedParameters {
            parameters: applied,
        })
    }
}

// =============================================================================
// get_4d_stem_data
// =============================================================================

#[derive(Debug, Deserialize)]
struct DatasetArgs {
    dataset_path: Option<String>,
}

/// Describe a 4D-STEM dataset (the currently open one by default).
#[derive(Debug, Default, Clone, Copy)]
pub struct Get4dStemData;

#[async_trait]
impl ToolHandler for Get4dStemData {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: DatasetArgs = parse_args(args)?;
        let dataset = ctx.instrument.open_dataset(args.dataset_path).await?;
        let [scan_x, scan_y, diff_x, diff_y] = dataset.dimensions;

        let mut fields = to_fields(&dataset)?;
        fields.insert(
            "summary".to_string(),
            Value::String(format!(
                "4D STEM dataset with {}x{} scan points and {}x{} diffraction patterns",
                scan_x, scan_y, diff_x, diff_y
            )),
        );
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{DatasetHandle, MockInstrument};
    use crate::types::{Config, ErrorKind};
    use serde_json::json;
    use std::sync::Arc;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn context_with(mock: MockInstrument) -> ToolContext {
        ToolContext::new(&Config::default(), Arc::new(mock))
    }

    #[tokio::test]
    async fn test_acquire_image_echoes_mode_and_exposure() {
        let mut mock = MockInstrument::new();
        mock.expect_current_image().times(1).returning(|| {
            Ok(Image {
                width: 2,
                height: 1,
                data: vec![vec![0.5, 0.25]],
            })
        });
        let fields = AcquireImage
            .call(
                &context_with(mock),
                args(json!({"mode": "STEM", "exposure_time": 0.1})),
            )
            .await
            .unwrap();
        assert_eq!(fields["mode"], json!("STEM"));
        assert_eq!(fields["exposure_time"], json!(0.1));
        assert_eq!(fields["width"], json!(2));
        assert_eq!(fields["data"], json!([[0.5, 0.25]]));
    }

    #[tokio::test]
    async fn test_acquire_image_propagates_instrument_failure() {
        let mut mock = MockInstrument::new();
        mock.expect_current_image()
            .returning(|| Err(Error::instrument_unavailable("no link")));
        let err = AcquireImage
            .call(
                &context_with(mock),
                args(json!({"mode": "TEM", "exposure_time": 0.1})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InstrumentUnavailable);
    }

    #[tokio::test]
    async fn test_acquire_image_rejects_zero_exposure() {
        let mock = MockInstrument::new();
        let err = AcquireImage
            .call(
                &context_with(mock),
                args(json!({"mode": "TEM", "exposure_time": 0.0})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_set_parameters_passes_only_supplied_fields() {
        let mut mock = MockInstrument::new();
        mock.expect_set_parameters()
            .withf(|p| p.voltage == Some(200.0) && p.spot_size.is_none())
            .returning(|p| Ok(p));
        let fields = SetMicroscopeParameters
            .call(
                &context_with(mock),
                args(json!({"voltage": 200.0, "spot_size": null, "camera_length": null})),
            )
            .await
            .unwrap();
        assert_eq!(
            fields["parameters"],
            json!({"voltage": 200.0, "spot_size": null, "camera_length": null})
        );
    }

    #[tokio::test]
    async fn test_set_parameters_rejects_bad_spot_size() {
        let err = SetMicroscopeParameters
            .call(
                &context_with(MockInstrument::new()),
                args(json!({"spot_size": 12})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_4d_stem_summary_from_dimensions() {
        let mut mock = MockInstrument::new();
        mock.expect_open_dataset().returning(|path| {
            Ok(DatasetHandle {
                path,
                dimensions: [32, 16, 128, 128],
                pixel_size_nm: 0.2,
                convergence_angle_mrad: 2.0,
                camera_length_mm: 80.0,
                simulated: false,
            })
        });
        let fields = Get4dStemData
            .call(&context_with(mock), args(json!({"dataset_path": "/data/a.dm4"})))
            .await
            .unwrap();
        assert_eq!(fields["dimensions"], json!([32, 16, 128, 128]));
        assert_eq!(fields["path"], json!("/data/a.dm4"));
        assert_eq!(
            fields["summary"],
            json!("4D STEM dataset with 32x16 scan points and 128x128 diffraction patterns")
        );
    }
}
