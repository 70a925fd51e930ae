use crate::error::{PropagationError, Result};
use crate::Field;
use ndarray::{Array2, Zip};
use num_complex::Complex;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq)]
struct WaveKey {
    radius: f64,
    shape: [usize; 2],
    pitch: (f64, f64),
}

/// Memoised reference wavefront `exp(iφ)` with `φ(i, j) = (dx²(i − M/2 + 1)² + dy²(j − N/2 + 1)²)/(2R)`.
///
/// The array is rebuilt only when the radius, the shape or the pitch differ from the last request,
/// so successive planes of a batch share one allocation.
#[derive(Clone, Debug, Default)]
pub struct SphericalWaveCache {
    key: Option<WaveKey>,
    wave: Option<Arc<Array2<Complex<f64>>>>,
}

impl SphericalWaveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wavefront for curvature radius `radius` on a `shape` grid with the given pitch.
    pub fn wavefront(
        &mut self,
        radius: f64,
        shape: [usize; 2],
        pitch: (f64, f64),
    ) -> Result<Arc<Array2<Complex<f64>>>> {
        if radius == 0.0 || !radius.is_finite() {
            return Err(PropagationError::InvalidCurvature(radius));
        }
        let key = WaveKey {
            radius,
            shape,
            pitch,
        };
        if let (Some(cached), Some(wave)) = (self.key, &self.wave) {
            if cached == key {
                tracing::debug!(radius, "reusing cached spherical wave");
                return Ok(Arc::clone(wave));
            }
        }

        tracing::debug!(radius, m = shape[0], n = shape[1], "computing spherical wave");
        let wave = Arc::new(spherical_phase(radius, shape, pitch));
        self.key = Some(key);
        self.wave = Some(Arc::clone(&wave));
        Ok(wave)
    }

    /// Multiplies a copy of `field` by the reference wave of curvature `radius`, sampled at `pitch`.
    ///
    /// `pitch` is the physical sampling of the propagation, which may differ from the pitch the field was loaded with.
    pub fn compensate(&mut self, field: &Field, radius: f64, pitch: (f64, f64)) -> Result<Field> {
        let wave = self.wavefront(radius, field.shape(), pitch)?;
        let mut out = field.clone();
        out.multiply_inplace(wave.view())?;
        Ok(out)
    }

    /// Forgets the cached wavefront.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.wave = None;
    }
}

fn spherical_phase(radius: f64, shape: [usize; 2], pitch: (f64, f64)) -> Array2<Complex<f64>> {
    let f = 1.0 / (2.0 * radius);
    let half = (shape[0] / 2) as f64;
    let half1 = (shape[1] / 2) as f64;
    let (dx, dy) = pitch;

    let mut wave = Array2::zeros(shape);
    Zip::indexed(&mut wave).par_for_each(|(i, j), e| {
        let i2 = i as f64 - half + 1.0;
        let j2 = j as f64 - half1 + 1.0;
        let phase = f * (dx * dx * i2 * i2 + dy * dy * j2 * j2);
        *e = Complex::new(phase.cos(), phase.sin());
    });
    wave
}
