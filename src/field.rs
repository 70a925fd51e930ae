use crate::error::{PropagationError, Result};
use crate::fft2::{fft2_shift_inplace, ifft2_shift_inplace, _fft2};
use ndarray::{Array2, ArrayBase, ArrayView2, Ix2, RawData, Zip};
use num_complex::Complex;
use rustfft::FftDirection;
use std::f64::consts::PI;

/// Represents a complex scalar field sampled at a given pitch.
///
/// Axis 0 has `M` samples spaced by `pitch.0` (dx), axis 1 has `N` samples spaced by `pitch.1` (dy).
/// The pitch is metadata: it is never folded into the sample values.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub values: Array2<Complex<f64>>,
    pub pitch: (f64, f64),
}

impl Field {
    /// Wraps an existing complex array.
    pub fn new(values: Array2<Complex<f64>>, pitch: (f64, f64)) -> Result<Self> {
        check_pitch("input", pitch)?;
        if values.is_empty() {
            return Err(PropagationError::Dimension {
                expected: [1, 1],
                actual: shape_of(&values),
            });
        }
        Ok(Field { values, pitch })
    }

    /// Builds a field from a real and an imaginary image. A missing channel is taken as zero.
    pub fn from_channels(
        real: Option<ArrayView2<f64>>,
        imaginary: Option<ArrayView2<f64>>,
        pitch: (f64, f64),
    ) -> Result<Self> {
        let values = match (real, imaginary) {
            (Some(re), Some(im)) => {
                if re.shape() != im.shape() {
                    return Err(PropagationError::Dimension {
                        expected: shape_of(&re),
                        actual: shape_of(&im),
                    });
                }
                let mut values = Array2::zeros(re.raw_dim());
                Zip::from(&mut values)
                    .and(&re)
                    .and(&im)
                    .par_for_each(|e, &re, &im| *e = Complex::new(re, im));
                values
            }
            (Some(re), None) => re.mapv(|re| Complex::new(re, 0.0)),
            (None, Some(im)) => im.mapv(|im| Complex::new(0.0, im)),
            (None, None) => return Err(PropagationError::MissingChannel),
        };
        Field::new(values, pitch)
    }

    /// `[M, N]`
    pub fn shape(&self) -> [usize; 2] {
        shape_of(&self.values)
    }

    /// In place unnormalised forward 2D FFT.
    pub fn forward_fft(&mut self) {
        _fft2(self.values.view_mut(), FftDirection::Forward, 1.0);
    }

    /// In place inverse 2D FFT, divided by `M·N` when `normalise` is set.
    pub fn inverse_fft(&mut self, normalise: bool) {
        let scale = if normalise {
            1.0 / self.values.len() as f64
        } else {
            1.0
        };
        _fft2(self.values.view_mut(), FftDirection::Inverse, scale);
    }

    /// Swaps quadrants so that the zero frequency sits at (M/2, N/2).
    pub fn shift(&mut self) {
        fft2_shift_inplace(self.values.view_mut());
    }

    /// Undoes `shift`.
    pub fn inverse_shift(&mut self) {
        ifft2_shift_inplace(self.values.view_mut());
    }

    pub fn modulus(&self) -> Array2<f64> {
        self.values.mapv(|e| e.norm())
    }

    pub fn modulus_squared(&self) -> Array2<f64> {
        self.values.mapv(|e| e.norm_sqr())
    }

    /// Argument of every sample, in (−π, π].
    pub fn phase(&self) -> Array2<f64> {
        self.values.mapv(|e| {
            let phase = e.arg();
            if phase <= -PI {
                phase + 2.0 * PI
            } else {
                phase
            }
        })
    }

    pub fn real(&self) -> Array2<f64> {
        self.values.mapv(|e| e.re)
    }

    pub fn imaginary(&self) -> Array2<f64> {
        self.values.mapv(|e| e.im)
    }

    /// Largest sample modulus, 0.0 for an all zero field.
    pub fn max_modulus(&self) -> f64 {
        self.values.iter().fold(0.0, |max, e| e.norm().max(max))
    }

    /// Calculates the area weighted sum of the squared norm of the field.
    ///
    /// This results in a conserved value, Radiant flux.
    pub fn intensity_integral(&self) -> f64 {
        self.values.iter().fold(0.0, |sum, &v| sum + v.norm_sqr()) * (self.pitch.0 * self.pitch.1).abs()
    }

    /// Sample-wise sum. The pitch of `self` is kept.
    pub fn add(&self, other: &Field) -> Result<Field> {
        self.combine(other, |a, b| a + b)
    }

    /// Sample-wise difference. The pitch of `self` is kept.
    pub fn subtract(&self, other: &Field) -> Result<Field> {
        self.combine(other, |a, b| a - b)
    }

    /// Sample-wise complex product. The pitch of `self` is kept.
    pub fn multiply(&self, other: &Field) -> Result<Field> {
        self.combine(other, |a, b| a * b)
    }

    /// Multiplies every sample in place by the matching sample of `wave`.
    pub fn multiply_inplace(&mut self, wave: ArrayView2<Complex<f64>>) -> Result<()> {
        if wave.shape() != self.values.shape() {
            return Err(PropagationError::Dimension {
                expected: self.shape(),
                actual: shape_of(&wave),
            });
        }
        Zip::from(&mut self.values)
            .and(&wave)
            .par_for_each(|e, &w| *e *= w);
        Ok(())
    }

    fn combine<F>(&self, other: &Field, f: F) -> Result<Field>
    where
        F: Fn(Complex<f64>, Complex<f64>) -> Complex<f64> + Sync + Send,
    {
        if other.values.shape() != self.values.shape() {
            return Err(PropagationError::Dimension {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        let mut values = self.values.clone();
        Zip::from(&mut values)
            .and(&other.values)
            .par_for_each(|a, &b| *a = f(*a, b));
        Ok(Field {
            values,
            pitch: self.pitch,
        })
    }
}

pub(crate) fn shape_of<S: RawData>(array: &ArrayBase<S, Ix2>) -> [usize; 2] {
    let (m, n) = array.dim();
    [m, n]
}

pub(crate) fn check_pitch(which: &'static str, pitch: (f64, f64)) -> Result<()> {
    let (dx, dy) = pitch;
    if !dx.is_finite() || !dy.is_finite() {
        return Err(PropagationError::InvalidPitch {
            which,
            dx,
            dy,
            reason: "must be finite",
        });
    }
    if dx <= 0.0 || dy <= 0.0 {
        return Err(PropagationError::InvalidPitch {
            which,
            dx,
            dy,
            reason: "must be positive",
        });
    }
    Ok(())
}
