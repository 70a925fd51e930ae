//! User facing configuration, decoded with serde.
//!
//! The caller persists these values. Missing keys fall back to the defaults below.

use crate::batch::{BatchJob, BatchPlan, OutputChannels, DEFAULT_MAX_PLANES};
use crate::error::{PropagationError, Result};
use crate::filter::SpectralRoi;
use crate::params::{Illumination, PropagationParameters};
use crate::propagator::Method;
use serde::{Deserialize, Serialize};

/// Curvature radius offered for spherical illumination before the user sets one, 1 m in micrometres.
pub const DEFAULT_CURVATURE_RADIUS: f64 = 1e6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub method: Method,
    pub wavelength: f64,
    pub distance: f64,
    /// Distance change applied by one refocus step
    pub step: f64,
    /// Physical width and height of the input field
    pub input_size: (f64, f64),
    /// Physical output size, used by the Fresnel-Bluestein method only
    pub output_size: Option<(f64, f64)>,
    pub plane_illumination: bool,
    pub curvature_radius: f64,
    pub filter_enabled: bool,
    pub roi: Option<SpectralRoi>,
    pub batch: Option<BatchPlan>,
    pub max_planes: usize,
    pub channels: OutputChannels,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            method: Method::default(),
            wavelength: 0.0,
            distance: 0.0,
            step: 0.0,
            input_size: (0.0, 0.0),
            output_size: None,
            plane_illumination: true,
            curvature_radius: DEFAULT_CURVATURE_RADIUS,
            filter_enabled: true,
            roi: None,
            batch: None,
            max_planes: DEFAULT_MAX_PLANES,
            channels: OutputChannels::default(),
        }
    }
}

impl Settings {
    pub fn illumination(&self) -> Illumination {
        if self.plane_illumination {
            Illumination::Plane
        } else {
            Illumination::Spherical {
                radius: self.curvature_radius,
            }
        }
    }

    /// Parameters for a field of `shape`, validated.
    pub fn parameters(&self, shape: [usize; 2]) -> Result<PropagationParameters> {
        let mut params =
            PropagationParameters::from_physical_size(self.wavelength, self.distance, self.input_size, shape);
        if let Some(size) = self.output_size {
            params = params.with_output_size(size, shape);
        }
        params.validate()?;
        if self.method.uses_output_pitch() {
            params.checked_output_pitch()?;
        }
        Ok(params)
    }

    /// Batch over the configured plan, with the plane limit from these settings.
    pub fn batch_job(&self, shape: [usize; 2]) -> Result<BatchJob> {
        let plan = self
            .batch
            .ok_or_else(|| PropagationError::InvalidPlan("no batch bounds configured".to_string()))?;
        let params = self.parameters(shape)?;
        Ok(BatchJob::new(plan, self.method, params, self.channels).with_max_planes(self.max_planes))
    }
}
