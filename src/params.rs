//! Physical parameters of a single propagation call.
//!
//! All lengths share one unit (micrometres in the usual workflow); nothing here converts units.

use crate::error::{PropagationError, Result};
use crate::field::check_pitch;
use serde::{Deserialize, Serialize};

/// Wavelength, signed distance and sampling of one propagation.
///
/// `output_pitch` is only consulted by the Fresnel-Bluestein method. Its sign must match the sign of `distance`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropagationParameters {
    pub wavelength: f64,
    pub distance: f64,
    pub pitch: (f64, f64),
    #[serde(default)]
    pub output_pitch: Option<(f64, f64)>,
}

impl PropagationParameters {
    pub fn new(wavelength: f64, distance: f64, pitch: (f64, f64)) -> Self {
        PropagationParameters {
            wavelength,
            distance,
            pitch,
            output_pitch: None,
        }
    }

    /// Derives the input pitch from the physical size of the field: `dx = width / M`, `dy = height / N`.
    pub fn from_physical_size(wavelength: f64, distance: f64, size: (f64, f64), shape: [usize; 2]) -> Self {
        Self::new(
            wavelength,
            distance,
            (size.0 / shape[0] as f64, size.1 / shape[1] as f64),
        )
    }

    pub fn with_output_pitch(mut self, output_pitch: (f64, f64)) -> Self {
        self.output_pitch = Some(output_pitch);
        self
    }

    /// Sets the output pitch from the physical output size, signed by the distance.
    pub fn with_output_size(self, size: (f64, f64), shape: [usize; 2]) -> Self {
        let sign = signum(self.distance);
        self.with_output_pitch((
            sign * size.0 / shape[0] as f64,
            sign * size.1 / shape[1] as f64,
        ))
    }

    /// Same parameters at another distance. The output pitch magnitude is kept and its sign follows `distance`.
    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = distance;
        let sign = signum(distance);
        self.output_pitch = self
            .output_pitch
            .map(|(dx, dy)| (sign * dx.abs(), sign * dy.abs()));
        self
    }

    /// Checks the wavelength, the input pitch and the distance.
    pub fn validate(&self) -> Result<()> {
        if !(self.wavelength > 0.0) || !self.wavelength.is_finite() {
            return Err(PropagationError::InvalidWavelength(self.wavelength));
        }
        check_pitch("input", self.pitch)?;
        if !self.distance.is_finite() {
            return Err(PropagationError::InvalidDistance(self.distance));
        }
        Ok(())
    }

    /// Output pitch for the Fresnel-Bluestein method, checked against the distance.
    pub fn checked_output_pitch(&self) -> Result<(f64, f64)> {
        let (dx, dy) = match self.output_pitch {
            Some(pitch) => pitch,
            None => {
                return Err(PropagationError::InvalidPitch {
                    which: "output",
                    dx: 0.0,
                    dy: 0.0,
                    reason: "is required by the Fresnel-Bluestein method",
                })
            }
        };
        if dx == 0.0 || dy == 0.0 || !dx.is_finite() || !dy.is_finite() {
            return Err(PropagationError::InvalidPitch {
                which: "output",
                dx,
                dy,
                reason: "must be finite and non-zero",
            });
        }
        let sign = signum(self.distance);
        if signum(dx) != sign || signum(dy) != sign {
            return Err(PropagationError::InvalidPitch {
                which: "output",
                dx,
                dy,
                reason: "sign must match the sign of the distance",
            });
        }
        Ok((dx, dy))
    }

    /// `M·dx²/λ`, below which the angular spectrum method is preferred over Fresnel.
    pub fn critical_distance(&self, shape: [usize; 2]) -> f64 {
        shape[0] as f64 * self.pitch.0 * self.pitch.0 / self.wavelength
    }

    /// Pitch produced by the single transform Fresnel method: `λz/(M·dx)`, `λz/(N·dy)`.
    pub fn fresnel_output_pitch(&self, shape: [usize; 2]) -> (f64, f64) {
        (
            self.wavelength * self.distance / (shape[0] as f64 * self.pitch.0),
            self.wavelength * self.distance / (shape[1] as f64 * self.pitch.1),
        )
    }
}

/// Illumination of the recorded field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Illumination {
    /// Collimated reference, nothing to compensate
    Plane,
    /// Divergent (positive radius) or convergent (negative radius) reference wave
    Spherical { radius: f64 },
}

impl Default for Illumination {
    fn default() -> Self {
        Illumination::Plane
    }
}

// like f64::signum, but 0.0 for zero
fn signum(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_size_gives_pitch() {
        let params = PropagationParameters::from_physical_size(0.633, 1e4, (5120.0, 2560.0), [1024, 512])
            .with_output_size((2048.0, 1024.0), [1024, 512]);
        assert_eq!(params.pitch, (5.0, 5.0));
        assert_eq!(params.output_pitch, Some((2.0, 2.0)));
    }

    #[test]
    fn output_pitch_sign_follows_distance() {
        let params = PropagationParameters::new(0.5, 100.0, (1.0, 1.0)).with_output_pitch((2.0, 3.0));
        let back = params.with_distance(-50.0);
        assert_eq!(back.output_pitch, Some((-2.0, -3.0)));
        assert_eq!(back.checked_output_pitch().unwrap(), (-2.0, -3.0));
        assert_eq!(back.with_distance(10.0).output_pitch, Some((2.0, 3.0)));
    }

    #[test]
    fn wavelength_must_be_positive() {
        for &lambda in &[0.0, -0.5, f64::NAN, f64::INFINITY] {
            let err = PropagationParameters::new(lambda, 10.0, (1.0, 1.0))
                .validate()
                .unwrap_err();
            assert!(matches!(err, PropagationError::InvalidWavelength(_)));
            assert!(err.is_invalid_parameter());
        }
    }

    #[test]
    fn pitch_must_be_positive() {
        let err = PropagationParameters::new(0.5, 10.0, (1.0, -1.0))
            .validate()
            .unwrap_err();
        assert!(matches!(err, PropagationError::InvalidPitch { .. }));
    }

    #[test]
    fn output_pitch_is_checked() {
        let params = PropagationParameters::new(0.5, 10.0, (1.0, 1.0));
        assert!(params.checked_output_pitch().is_err());
        assert!(params.with_output_pitch((0.0, 1.0)).checked_output_pitch().is_err());
        assert!(params.with_output_pitch((-1.0, 1.0)).checked_output_pitch().is_err());
        assert!(params.with_output_pitch((1.0, 1.0)).checked_output_pitch().is_ok());
    }

    #[test]
    fn fresnel_pitch_is_signed() {
        let params = PropagationParameters::new(0.5, -2000.0, (4.0, 2.0));
        assert_eq!(params.fresnel_output_pitch([100, 50]), (-2.5, -10.0));
        assert_eq!(params.critical_distance([100, 50]), 3200.0);
    }
}
