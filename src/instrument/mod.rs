//! Instrument facade - the narrow boundary to the microscope driver.
//!
//! The core only depends on this contract. Every call is treated as
//! potentially slow I/O: callers must not hold session locks across an await
//! on the instrument.
//!
//! # Contract
//! - `current_image()` returns the detector's front image, or
//!   `InstrumentUnavailable` when the driver cannot be reached
//! - `open_dataset(path)` opens a stored dataset (`None` = the dataset the
//!   operator currently has open)
//! - `set_parameters(partial)` applies only the supplied fields and returns
//!   the applied set

mod simulated;

pub use simulated::SimulatedInstrument;

use crate::types::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A 2D detector image, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub data: Vec<Vec<f64>>,
}

impl Image {
    /// Nearest-neighbour resample to the requested size.
    ///
    /// Fails with `Internal` when `data` is smaller than the declared
    /// `width`/`height`, which only a misbehaving driver produces.
    pub fn resized(&self, width: usize, height: usize) -> Result<Image> {
        if (width, height) == (self.width, self.height) || self.width == 0 || self.height == 0 {
            return Ok(self.clone());
        }
        let data = (0..height)
            .map(|y| {
                let src_y = y * self.height / height;
                let src_row = self.data.get(src_y).ok_or_else(|| self.malformed())?;
                (0..width)
                    .map(|x| {
                        src_row
                            .get(x * self.width / width)
                            .copied()
                            .ok_or_else(|| self.malformed())
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Image {
            width,
            height,
            data,
        })
    }

    fn malformed(&self) -> Error {
        let rows = self.data.len();
        let min_cols = self.data.iter().map(Vec::len).min().unwrap_or(0);
        Error::internal(format!(
            "instrument returned a {}x{} image with {} rows of at least {} values",
            self.width, self.height, rows, min_cols
        ))
    }
}

/// Handle to an opened 4D-STEM dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetHandle {
    /// Path as passed through to the driver; `None` for the current dataset.
    pub path: Option<String>,
    /// `[scan_x, scan_y, diff_x, diff_y]`
    pub dimensions: [usize; 4],
    pub pixel_size_nm: f64,
    pub convergence_angle_mrad: f64,
    pub camera_length_mm: f64,
    pub simulated: bool,
}

/// Microscope optics parameters. `None` means "leave unchanged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MicroscopeParameters {
    /// Accelerating voltage in kV.
    pub voltage: Option<f64>,
    /// Spot size (1-11).
    pub spot_size: Option<i64>,
    /// Camera length in mm.
    pub camera_length: Option<f64>,
}

/// Microscope driver facade.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Get the current front image.
    async fn current_image(&self) -> Result<Image>;

    /// Open a dataset by path (`None` = currently open dataset).
    async fn open_dataset(&self, path: Option<String>) -> Result<DatasetHandle>;

    /// Apply the supplied parameters and return the applied set.
    async fn set_parameters(&self, params: MicroscopeParameters) -> Result<MicroscopeParameters>;
}
