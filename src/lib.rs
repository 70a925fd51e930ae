//! Scalar diffraction of sampled complex wavefields.
//!
//! A [`Field`] is propagated over a signed distance by one of the [`Propagator`]s: angular spectrum,
//! single transform Fresnel, Fresnel with a chirp-z transform for a free output pitch, or an automatic choice
//! between the first two. Off-axis holograms are first reduced to one diffraction order with
//! [`filter_and_recenter`], and a spherical reference wave can be compensated with [`SphericalWaveCache`].
//! [`Engine`] ties these steps together and drives [`batch`] runs over a range of distances.
//!
//! All lengths share one unit, and the axis 0 of every array is `x` with `M` samples spaced by `dx`.

use ndarray::{Array2, Zip};
use num_complex::Complex;

mod czt;
mod fft2;

pub mod angular_spectrum;
pub mod batch;
pub mod engine;
pub mod error;
pub mod field;
pub mod filter;
pub mod fresnel;
pub mod params;
pub mod propagator;
pub mod settings;
pub mod spherical;
pub mod wavefront;

pub use batch::{BatchJob, BatchOutput, BatchPlan, CancelToken, Channel, Frame, OutputChannels};
pub use engine::Engine;
pub use error::{PropagationError, Result};
pub use field::Field;
pub use filter::{filter_and_recenter, SpectralRoi, Spectrum};
pub use params::{Illumination, PropagationParameters};
pub use propagator::{AngularSpectrum, Automatic, Fresnel, FresnelBluestein, Method, Propagator};
pub use settings::Settings;
pub use spherical::SphericalWaveCache;

/// Frequency step of the DFT of an array with the given shape and sample pitch.
fn freq_res(array_shape: &[usize], spatial_res: (f64, f64)) -> (f64, f64) {
    (
        1.0 / (spatial_res.0 * array_shape[0] as f64),
        1.0 / (spatial_res.1 * array_shape[1] as f64),
    )
}

fn spatial_res(array_shape: &[usize], freq_res: (f64, f64)) -> (f64, f64) {
    (
        1.0 / (freq_res.0 * array_shape[0] as f64),
        1.0 / (freq_res.1 * array_shape[1] as f64),
    )
}

/// Calls `f` on every element with its coordinates relative to index `len/2` on each axis.
fn centered_par_iter<F: Fn((f64, f64), &mut Complex<f64>) + Sync + Send>(
    array: &mut Array2<Complex<f64>>,
    (dx, dy): (f64, f64),
    f: F,
) {
    let m = array.shape()[0];
    let n = array.shape()[1];
    Zip::indexed(array).par_for_each(|(i, j), e| {
        let x = (i as f64 - (m / 2) as f64) * dx;
        let y = (j as f64 - (n / 2) as f64) * dy;
        f((x, y), e)
    });
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Gaussian beam `exp(−((x − x0)² + (y − y0)²)/w²)` on centred coordinates, flat phase.
    pub fn gaussian(shape: [usize; 2], pitch: (f64, f64), waist: f64, center: (f64, f64)) -> Field {
        let mut values = Array2::zeros(shape);
        centered_par_iter(&mut values, pitch, |(x, y), e| {
            let r2 = (x - center.0).powi(2) + (y - center.1).powi(2);
            *e = Complex::new((-r2 / (waist * waist)).exp(), 0.0);
        });
        Field { values, pitch }
    }

    pub fn assert_fields_close(actual: &Field, expected: &Field, tol: f64) {
        assert_eq!(actual.shape(), expected.shape());
        for &(a, e) in &[
            (actual.pitch.0, expected.pitch.0),
            (actual.pitch.1, expected.pitch.1),
        ] {
            assert!(
                (a - e).abs() <= 1e-12 * e.abs(),
                "pitch {:?} vs {:?}",
                actual.pitch,
                expected.pitch
            );
        }
        for ((idx, a), e) in actual.values.indexed_iter().zip(expected.values.iter()) {
            assert!((a - e).norm() <= tol, "{:?}: {} vs {}", idx, a, e);
        }
    }
}
