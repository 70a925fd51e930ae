//! Synthetic wavefronts for testing and for building reference waves by hand.
//!
//! Coordinates are centred like the compensator's: sample `i` sits at `(i − M/2 + 1)·dx`.

use crate::error::{PropagationError, Result};
use crate::field::check_pitch;
use crate::Field;
use ndarray::{Array2, Zip};
use num_complex::Complex;
use std::f64::consts::PI;

/// Unit amplitude plane wave travelling along the direction with angles `a`, `b` (degrees) to the x and y axes.
///
/// The direction cosines must satisfy `cos²a + cos²b ≤ 1`, and the phase ramp must be sampled with at least
/// three samples per period: `3k·cos(a)·dx ≤ 2π` and likewise for `b`.
pub fn tilted_plane_wave(
    shape: [usize; 2],
    pitch: (f64, f64),
    wavelength: f64,
    angles: (f64, f64),
) -> Result<Field> {
    check_wave(shape, pitch, wavelength)?;

    let (a, b) = angles;
    for &(name, angle) in &[("a", a), ("b", b)] {
        if !(0.0..=180.0).contains(&angle) {
            return Err(PropagationError::InvalidDirection(format!(
                "director angle {} = {} is outside [0, 180] degrees",
                name, angle
            )));
        }
    }
    let alpha = a.to_radians().cos();
    let beta = b.to_radians().cos();
    let gamma = (1.0 - alpha * alpha - beta * beta).sqrt();
    if gamma.is_nan() {
        return Err(PropagationError::InvalidDirection(format!(
            "director angles ({}, {}) give cos²a + cos²b > 1",
            a, b
        )));
    }

    let k = 2.0 * PI / wavelength;
    let k3 = 3.0 * k;
    for &(name, cosine, d) in &[("a", alpha, pitch.0), ("b", beta, pitch.1)] {
        if k3 * cosine * d > 2.0 * PI {
            let min_angle = (2.0 * PI / (k3 * d)).acos().to_degrees();
            return Err(PropagationError::InvalidDirection(format!(
                "director angle {} must be at least {:.2} degrees to satisfy the sampling theorem",
                name, min_angle
            )));
        }
    }

    let values = centred_wave(shape, pitch, |x, y| {
        let phase = k * (x * alpha + y * beta + gamma);
        Complex::new(phase.cos(), phase.sin())
    });
    Ok(Field { values, pitch })
}

/// Diverging (positive `radius`) or converging spherical wave with `1/r` amplitude,
/// `r = sqrt(R² + x² + y²)`, and phase `k(x² + y²)/(2R)`.
pub fn spherical_wave(shape: [usize; 2], pitch: (f64, f64), wavelength: f64, radius: f64) -> Result<Field> {
    check_wave(shape, pitch, wavelength)?;
    if radius == 0.0 || !radius.is_finite() {
        return Err(PropagationError::InvalidCurvature(radius));
    }

    let f = PI / (wavelength * radius);
    let r2 = radius * radius;
    let values = centred_wave(shape, pitch, |x, y| {
        let rho2 = x * x + y * y;
        let phase = f * rho2;
        Complex::new(phase.cos(), phase.sin()) / (r2 + rho2).sqrt()
    });
    Ok(Field { values, pitch })
}

fn check_wave(shape: [usize; 2], pitch: (f64, f64), wavelength: f64) -> Result<()> {
    if !(wavelength > 0.0) || !wavelength.is_finite() {
        return Err(PropagationError::InvalidWavelength(wavelength));
    }
    check_pitch("input", pitch)?;
    if shape[0] == 0 || shape[1] == 0 {
        return Err(PropagationError::Dimension {
            expected: [1, 1],
            actual: shape,
        });
    }
    Ok(())
}

fn centred_wave<F>(shape: [usize; 2], pitch: (f64, f64), f: F) -> Array2<Complex<f64>>
where
    F: Fn(f64, f64) -> Complex<f64> + Sync + Send,
{
    let (m2, n2) = ((shape[0] / 2) as f64, (shape[1] / 2) as f64);
    let mut values = Array2::zeros(shape);
    Zip::indexed(&mut values).par_for_each(|(i, j), e| {
        let x = (i as f64 - m2 + 1.0) * pitch.0;
        let y = (j as f64 - n2 + 1.0) * pitch.1;
        *e = f(x, y);
    });
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Spectrum;

    #[test]
    fn normal_incidence_is_flat() {
        let wave = tilted_plane_wave([8, 8], (2.0, 2.0), 0.5, (90.0, 90.0)).unwrap();
        let first = wave.values[[0, 0]];
        for e in wave.values.iter() {
            assert!((e - first).norm() < 1e-9);
            assert!((e.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn tilt_puts_energy_on_one_frequency() {
        // cos(a) = λ·4/(M·dx) puts the carrier four bins from the centre
        let (m, dx, lambda) = (32, 1.0, 0.5);
        let a = (lambda * 4.0 / (m as f64 * dx)).acos().to_degrees();
        let wave = tilted_plane_wave([m, m], (dx, dx), lambda, (a, 90.0)).unwrap();

        let magnitude = Spectrum::from_field(&wave).magnitude();
        let peak = magnitude[[m / 2 + 4, m / 2]];
        assert!((peak - (m * m) as f64).abs() < 1e-6, "{}", peak);
    }

    #[test]
    fn director_angles_are_checked() {
        assert!(tilted_plane_wave([8, 8], (1.0, 1.0), 0.5, (190.0, 90.0)).is_err());
        // cos²(10°) + cos²(10°) > 1
        assert!(tilted_plane_wave([8, 8], (1.0, 1.0), 0.5, (10.0, 10.0)).is_err());
        // three samples per fringe need cos(a) ≤ λ/(3dx)
        assert!(tilted_plane_wave([8, 8], (1.0, 1.0), 0.5, (60.0, 90.0)).is_err());
        assert!(tilted_plane_wave([8, 8], (1.0, 1.0), 0.5, (85.0, 90.0)).is_ok());
    }

    #[test]
    fn spherical_wave_decays_off_axis() {
        let radius = 1e3;
        let wave = spherical_wave([16, 16], (10.0, 10.0), 0.5, radius).unwrap();

        // on axis at (M/2 − 1, N/2 − 1)
        assert!((wave.values[[7, 7]] - Complex::new(1.0 / radius, 0.0)).norm() < 1e-15);

        let (x, y) = (8.0 * 10.0, 0.0);
        let r = (radius * radius + x * x + y * y).sqrt();
        assert!((wave.values[[15, 7]].norm() - 1.0 / r).abs() < 1e-15);
        let phase = PI * x * x / (0.5 * radius);
        let expected = Complex::new(phase.cos(), phase.sin()) / r;
        assert!((wave.values[[15, 7]] - expected).norm() < 1e-12);
    }

    #[test]
    fn spherical_wave_needs_curvature() {
        assert_eq!(
            spherical_wave([4, 4], (1.0, 1.0), 0.5, 0.0).unwrap_err(),
            PropagationError::InvalidCurvature(0.0)
        );
        assert!(matches!(
            spherical_wave([4, 4], (1.0, 1.0), -0.5, 10.0),
            Err(PropagationError::InvalidWavelength(_))
        ));
    }
}
