//! Simulated microscope used when no vendor driver is attached.

use super::{DatasetHandle, Image, Instrument, MicroscopeParameters};
use crate::types::{Error, InstrumentConfig, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Simulated instrument: random front images, canned dataset metadata,
/// in-memory optics state.
#[derive(Debug)]
pub struct SimulatedInstrument {
    width: usize,
    height: usize,
    latency: Option<Duration>,
    online: AtomicBool,
    optics: Mutex<MicroscopeParameters>,
}

impl SimulatedInstrument {
    pub fn new(config: &InstrumentConfig) -> Self {
        Self {
            width: config.image_width,
            height: config.image_height,
            latency: None,
            online: AtomicBool::new(true),
            optics: Mutex::new(MicroscopeParameters::default()),
        }
    }

    /// Delay every call by `latency` to mimic a slow driver.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggle reachability. Offline instruments fail every call.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Current optics state, merged from every applied parameter set.
    pub fn optics(&self) -> MicroscopeParameters {
        self.optics.lock().map(|g| *g).unwrap_or_default()
    }

    async fn round_trip(&self) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::instrument_unavailable(
                "microscope driver is not connected",
            ))
        }
    }
}

fn random_image(width: usize, height: usize) -> Image {
    let mut rng = rand::thread_rng();
    let data = (0..height)
        .map(|_| (0..width).map(|_| rng.gen::<f64>()).collect())
        .collect();
    Image {
        width,
        height,
        data,
    }
}

#[async_trait]
impl Instrument for SimulatedInstrument {
    async fn current_image(&self) -> Result<Image> {
        self.round_trip().await?;
        Ok(random_image(self.width, self.height))
    }

    async fn open_dataset(&self, path: Option<String>) -> Result<DatasetHandle> {
        self.round_trip().await?;
        tracing::debug!(path = ?path, "simulated dataset opened");
        Ok(DatasetHandle {
            path,
            dimensions: [64, 64, 256, 256],
            pixel_size_nm: 0.1,
            convergence_angle_mrad: 1.5,
            camera_length_mm: 100.0,
            simulated: true,
        })
    }

    async fn set_parameters(&self, params: MicroscopeParameters) -> Result<MicroscopeParameters> {
        self.round_trip().await?;
        let mut optics = self
            .optics
            .lock()
            .map_err(|_| Error::internal("optics state poisoned"))?;
        if let Some(v) = params.voltage {
            optics.voltage = Some(v);
        }
        if let Some(s) = params.spot_size {
            optics.spot_size = Some(s);
        }
        if let Some(c) = params.camera_length {
            optics.camera_length = Some(c);
        }
        Ok(params)
    }
}
