use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::{ArrayViewMut2, Axis, Zip};
use num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{FftDirection, FftPlanner};
use std::cmp::max;
use std::f64::consts::PI;
use unchecked_index::get_unchecked_mut;

/// Smallest length `>= lower_limit` whose only prime factors are 2, 3 and 5.
pub(crate) fn convolution_len(lower_limit: usize) -> usize {
    let mut best = lower_limit.next_power_of_two();
    let mut p5 = 1;
    while p5 < best {
        let mut p35 = p5;
        while p35 < best {
            let mut len = p35;
            while len < lower_limit {
                len *= 2;
            }
            best = best.min(len);
            p35 *= 3;
        }
        p5 *= 5;
    }
    best
}

/// Chirp-z transform along `axis` of every lane, in place.
///
/// Evaluates `X[p] = Σ_k x[k]·exp(−2πi·α·(k − M/2)(p − M/2))` for `p, k` in `0..M`, using
/// `kp = (k² + p² − (p − k)²)/2` to turn it into a linear convolution with the chirp `exp(iπα·n²)`.
/// With `α = 1/M` this is the centered DFT, other values zoom the output grid.
pub(crate) fn czt_axis(mut input: ArrayViewMut2<Complex<f64>>, axis: Axis, alpha: f64) {
    let m = input.len_of(axis);
    let half = (m / 2) as f64;
    let len = convolution_len(2 * m - 1);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft(len, FftDirection::Forward);
    let ifft = planner.plan_fft(len, FftDirection::Inverse);
    let scratch_len = max(
        fft.get_inplace_scratch_len(),
        ifft.get_inplace_scratch_len(),
    );

    // chirp for n in −(M−1)..=(M−1), wrapped so negative n sit at the end of the buffer
    let mut kernel = vec![Complex::zero(); len];
    for n in 0..m {
        let c = Complex::new(0.0, PI * alpha * (n * n) as f64).exp();
        kernel[n] = c;
        if n > 0 {
            kernel[len - n] = c;
        }
    }
    fft.process(&mut kernel);
    let normalisation = 1.0 / len as f64;
    for e in kernel.iter_mut() {
        *e *= normalisation;
    }

    // the same quadratic phase is applied before and after the convolution
    let phases: Vec<_> = (0..m)
        .map(|k| {
            let k = k as f64 - half;
            Complex::new(0.0, -PI * alpha * k * k).exp()
        })
        .collect();

    Zip::from(input.lanes_mut(axis)).into_par_iter().for_each_init(
        || (vec![Complex::zero(); len], vec![Complex::zero(); scratch_len]),
        |(buffer, scratch), lane| {
            let mut lane = lane.0;
            let buffer = buffer.as_mut_slice();

            unsafe {
                for (k, &e) in lane.iter().enumerate() {
                    *get_unchecked_mut(&mut *buffer, k) = e * phases.get_unchecked(k);
                }
            }
            for e in buffer[m..].iter_mut() {
                *e = Complex::zero();
            }

            fft.process_with_scratch(buffer, scratch);
            for (e, k) in buffer.iter_mut().zip(kernel.iter()) {
                *e *= k;
            }
            ifft.process_with_scratch(buffer, scratch);

            unsafe {
                for (p, e) in lane.iter_mut().enumerate() {
                    *e = *buffer.get_unchecked(p) * phases.get_unchecked(p);
                }
            }
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft2::{fft2, fft2_shift_inplace, ifft2_shift_inplace};
    use ndarray::Array2;

    #[test]
    fn convolution_len_is_5_smooth() {
        assert_eq!(convolution_len(1), 1);
        assert_eq!(convolution_len(7), 8);
        assert_eq!(convolution_len(11), 12);
        assert_eq!(convolution_len(127), 128);
        assert_eq!(convolution_len(129), 135);
        assert_eq!(convolution_len(1023), 1024);
        assert_eq!(convolution_len(1025), 1080);
    }

    #[test]
    fn unit_zoom_matches_centred_dft() {
        for &(m, n) in &[(8, 8), (7, 10), (9, 5)] {
            let input = Array2::from_shape_fn((m, n), |(i, j)| {
                Complex::new((i as f64 * 0.7).cos() + j as f64 * 0.1, (j as f64 * 1.3).sin())
            });

            let mut expected = input.clone();
            ifft2_shift_inplace(expected.view_mut());
            let mut expected = fft2(expected);
            fft2_shift_inplace(expected.view_mut());

            let mut actual = input;
            czt_axis(actual.view_mut(), Axis(0), 1.0 / m as f64);
            czt_axis(actual.view_mut(), Axis(1), 1.0 / n as f64);

            for (a, e) in actual.iter().zip(expected.iter()) {
                assert!((a - e).norm() < 1e-9, "{}x{}: {} vs {}", m, n, a, e);
            }
        }
    }

    #[test]
    fn zoom_matches_direct_sum() {
        let m = 12;
        let alpha = 0.03;
        let input = Array2::from_shape_fn((m, 1), |(k, _)| Complex::new(1.0 / (1.0 + k as f64), k as f64 * 0.2));

        let mut actual = input.clone();
        czt_axis(actual.view_mut(), Axis(0), alpha);

        let half = (m / 2) as f64;
        for p in 0..m {
            let expected = (0..m).fold(Complex::zero(), |sum: Complex<f64>, k| {
                let phase = -2.0 * PI * alpha * (k as f64 - half) * (p as f64 - half);
                sum + input[[k, 0]] * Complex::new(0.0, phase).exp()
            });
            assert!((actual[[p, 0]] - expected).norm() < 1e-10);
        }
    }
}
