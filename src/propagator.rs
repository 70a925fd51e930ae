use crate::angular_spectrum::angular_spectrum;
use crate::error::{PropagationError, Result};
use crate::fresnel::{fresnel, fresnel_bluestein};
use crate::params::PropagationParameters;
use crate::Field;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A diffraction algorithm. Implementations never modify their input and return a field carrying its own pitch.
pub trait Propagator {
    fn propagate(&self, field: &Field, params: &PropagationParameters) -> Result<Field>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AngularSpectrum;

#[derive(Clone, Copy, Debug, Default)]
pub struct Fresnel;

#[derive(Clone, Copy, Debug, Default)]
pub struct FresnelBluestein;

/// Angular spectrum below the critical distance `M·dx²/λ`, single transform Fresnel from there on.
#[derive(Clone, Copy, Debug, Default)]
pub struct Automatic {
    near: AngularSpectrum,
    far: Fresnel,
}

impl Propagator for AngularSpectrum {
    fn propagate(&self, field: &Field, params: &PropagationParameters) -> Result<Field> {
        angular_spectrum(field, params)
    }
}

impl Propagator for Fresnel {
    fn propagate(&self, field: &Field, params: &PropagationParameters) -> Result<Field> {
        fresnel(field, params)
    }
}

impl Propagator for FresnelBluestein {
    fn propagate(&self, field: &Field, params: &PropagationParameters) -> Result<Field> {
        fresnel_bluestein(field, params)
    }
}

impl Automatic {
    /// The method used for `params` on a field of `shape`.
    pub fn select(&self, shape: [usize; 2], params: &PropagationParameters) -> Method {
        let z_crit = params.critical_distance(shape);
        let method = if params.distance.abs() < z_crit {
            Method::AngularSpectrum
        } else {
            Method::Fresnel
        };
        tracing::debug!(
            z = params.distance,
            z_crit,
            %method,
            "automatic propagator selection"
        );
        method
    }
}

impl Propagator for Automatic {
    fn propagate(&self, field: &Field, params: &PropagationParameters) -> Result<Field> {
        params.validate()?;
        match self.select(field.shape(), params) {
            Method::AngularSpectrum => self.near.propagate(field, params),
            _ => self.far.propagate(field, params),
        }
    }
}

/// Tag for the available propagators, as stored in settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    AngularSpectrum,
    Fresnel,
    FresnelBluestein,
    Automatic,
}

impl Default for Method {
    fn default() -> Self {
        Method::AngularSpectrum
    }
}

impl Method {
    /// True for the method that needs an explicit output pitch.
    pub fn uses_output_pitch(self) -> bool {
        self == Method::FresnelBluestein
    }

    /// Output pitch this method will produce, without propagating. Fails where `propagate` would reject the parameters.
    pub fn output_pitch(self, shape: [usize; 2], params: &PropagationParameters) -> Result<(f64, f64)> {
        params.validate()?;
        match self {
            Method::Fresnel | Method::FresnelBluestein if params.distance == 0.0 => {
                Err(PropagationError::InvalidDistance(params.distance))
            }
            Method::AngularSpectrum => Ok(params.pitch),
            Method::Fresnel => Ok(params.fresnel_output_pitch(shape)),
            Method::FresnelBluestein => params.checked_output_pitch(),
            Method::Automatic => Automatic::default()
                .select(shape, params)
                .output_pitch(shape, params),
        }
    }
}

impl Propagator for Method {
    fn propagate(&self, field: &Field, params: &PropagationParameters) -> Result<Field> {
        match self {
            Method::AngularSpectrum => AngularSpectrum.propagate(field, params),
            Method::Fresnel => Fresnel.propagate(field, params),
            Method::FresnelBluestein => FresnelBluestein.propagate(field, params),
            Method::Automatic => Automatic::default().propagate(field, params),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::AngularSpectrum => "Angular Spectrum",
            Method::Fresnel => "Fresnel",
            Method::FresnelBluestein => "Fresnel-Bluestein",
            Method::Automatic => "Automatic",
        };
        f.write_str(name)
    }
}
