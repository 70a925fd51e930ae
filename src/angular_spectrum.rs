use crate::error::{PropagationError, Result};
use crate::fft2::{fft2, fft2_shift_inplace, ifft2, ifft2_shift_inplace};
use crate::params::PropagationParameters;
use crate::{centered_par_iter, freq_res, Field};
use num_complex::Complex;
use rustfft::num_traits::Zero;
use std::f64::consts::PI;

/// Propagates by multiplying the spectrum with the exact transfer function
/// `H(fx, fy) = exp(2πi·z·sqrt(1/λ² − fx² − fy²))`.
///
/// Evanescent frequencies (`fx² + fy² > 1/λ²`) are removed. The output pitch is the input pitch.
pub fn angular_spectrum(field: &Field, params: &PropagationParameters) -> Result<Field> {
    params.validate()?;

    let inv_lambda_sqr = 1.0 / (params.wavelength * params.wavelength);
    let phase_scale = 2.0 * PI * params.distance;
    if !inv_lambda_sqr.is_finite() || !phase_scale.is_finite() {
        return Err(PropagationError::NumericOverflow("angular spectrum transfer function"));
    }

    let f_step = freq_res(field.values.shape(), params.pitch);

    let mut spectrum = fft2(field.values.clone());
    fft2_shift_inplace(spectrum.view_mut());

    centered_par_iter(&mut spectrum, f_step, |(fx, fy), e| {
        let kz_sqr = inv_lambda_sqr - (fx * fx + fy * fy);
        if kz_sqr >= 0.0 {
            *e = *e * Complex::new(0.0, phase_scale * kz_sqr.sqrt()).exp();
        } else {
            *e = Zero::zero();
        }
    });

    ifft2_shift_inplace(spectrum.view_mut());

    Ok(Field {
        values: ifft2(spectrum, true),
        pitch: params.pitch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{assert_fields_close, gaussian};

    #[test]
    fn forward_then_backward_restores_field() {
        let field = gaussian([64, 48], (5.0, 4.0), 40.0, (3.0, -2.0));
        let params = PropagationParameters::new(0.633, 2500.0, field.pitch);

        let forward = angular_spectrum(&field, &params).unwrap();
        let back = angular_spectrum(&forward, &params.with_distance(-2500.0)).unwrap();

        assert_fields_close(&back, &field, 1e-9);
    }

    #[test]
    fn energy_is_conserved() {
        let field = gaussian([64, 64], (5.0, 5.0), 30.0, (0.0, 0.0));
        let params = PropagationParameters::new(0.633, 1500.0, field.pitch);

        let out = angular_spectrum(&field, &params).unwrap();

        let before = field.intensity_integral();
        let after = out.intensity_integral();
        assert!((before - after).abs() < 1e-9 * before, "{} vs {}", before, after);
        assert_eq!(out.pitch, field.pitch);
    }

    #[test]
    fn zero_distance_is_identity() {
        let field = gaussian([16, 20], (2.0, 2.0), 6.0, (1.0, 0.5));
        let params = PropagationParameters::new(0.5, 0.0, field.pitch);

        let out = angular_spectrum(&field, &params).unwrap();

        assert_fields_close(&out, &field, 1e-12);
    }

    #[test]
    fn evanescent_waves_are_removed() {
        // pitch below half a wavelength puts the Nyquist frequency outside the propagating disc
        let field = gaussian([8, 8], (0.1, 0.1), 0.15, (0.0, 0.0));
        let params = PropagationParameters::new(0.5, 1e-3, field.pitch);

        let mut out = angular_spectrum(&field, &params).unwrap();
        out.forward_fft();
        out.shift();

        // (fx, fy) = (−5, −5) cycles/unit, well beyond 1/λ = 2
        assert!(out.values[[0, 0]].norm() < 1e-12);
    }

    #[test]
    fn invalid_wavelength_is_rejected() {
        let field = gaussian([8, 8], (1.0, 1.0), 2.0, (0.0, 0.0));
        let params = PropagationParameters::new(-0.5, 10.0, field.pitch);
        let err = angular_spectrum(&field, &params).unwrap_err();
        assert!(err.is_invalid_parameter());
    }

    #[test]
    fn tiny_wavelength_overflows() {
        let field = gaussian([8, 8], (1.0, 1.0), 2.0, (0.0, 0.0));
        let params = PropagationParameters::new(1e-200, 10.0, field.pitch);
        let err = angular_spectrum(&field, &params).unwrap_err();
        assert!(matches!(err, PropagationError::NumericOverflow(_)));
    }
}
