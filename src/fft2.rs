use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::{Array2, ArrayViewMut1, ArrayViewMut2, Axis, Zip};
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// Unnormalised forward 2D DFT.
pub fn fft2(mut input: Array2<Complex<f64>>) -> Array2<Complex<f64>> {
    _fft2(input.view_mut(), FftDirection::Forward, 1.0);
    input
}

/// Inverse 2D DFT, divided by `M·N` when `normalise` is set.
pub fn ifft2(mut input: Array2<Complex<f64>>, normalise: bool) -> Array2<Complex<f64>> {
    let scale = if normalise {
        1.0 / (input.len() as f64)
    } else {
        1.0
    };
    _fft2(input.view_mut(), FftDirection::Inverse, scale);
    input
}

pub fn _fft2(mut input: ArrayViewMut2<Complex<f64>>, direction: FftDirection, scale: f64) {
    let mut planner = FftPlanner::new();
    let fft_row = planner.plan_fft(input.shape()[1], direction);
    let fft_col = planner.plan_fft(input.shape()[0], direction);

    fft_lanes(input.view_mut(), Axis(1), &fft_row, 1.0);
    fft_lanes(input, Axis(0), &fft_col, scale);
}

/// Runs `fft` over every lane along `axis`, multiplying the output by `scale`.
pub(crate) fn fft_lanes(
    mut input: ArrayViewMut2<Complex<f64>>,
    axis: Axis,
    fft: &Arc<dyn Fft<f64>>,
    scale: f64,
) {
    debug_assert_eq!(input.len_of(axis), fft.len());

    Zip::from(input.lanes_mut(axis)).into_par_iter().for_each_init(
        || {
            (
                vec![Zero::zero(); fft.len()],
                vec![Zero::zero(); fft.get_inplace_scratch_len()],
            )
        },
        |(buffer, scratch), lane| {
            let mut lane = lane.0;
            for (b, &e) in buffer.iter_mut().zip(lane.iter()) {
                *b = e;
            }
            fft.process_with_scratch(buffer, scratch);
            if scale == 1.0 {
                for (e, &b) in lane.iter_mut().zip(buffer.iter()) {
                    *e = b;
                }
            } else {
                for (e, &b) in lane.iter_mut().zip(buffer.iter()) {
                    *e = b * scale;
                }
            }
        },
    );
}

/// Moves the origin (0, 0) to the "center" of the array (M/2, N/2)
///
/// For even array lengths, which have no center value, this moves the value to the next value after the center
pub fn fft2_shift_inplace<T: Copy + Send>(mut input: ArrayViewMut2<T>) {
    Zip::from(input.lanes_mut(Axis(1))).par_for_each(fft_shift_inplace);
    Zip::from(input.lanes_mut(Axis(0))).par_for_each(fft_shift_inplace);
}

/// Moves the "center" of the array (M/2, N/2) to the origin (0, 0)
///
/// Inverts `fft2_shift_inplace` exactly, accounting for the asymmetry of odd arrays
pub fn ifft2_shift_inplace<T: Copy + Send>(mut input: ArrayViewMut2<T>) {
    Zip::from(input.lanes_mut(Axis(1))).par_for_each(ifft_shift_inplace);
    Zip::from(input.lanes_mut(Axis(0))).par_for_each(ifft_shift_inplace);
}

pub fn fft_shift_inplace<T: Copy>(input: ArrayViewMut1<T>) {
    let half = input.len() / 2;
    roll(input, half);
}

pub fn ifft_shift_inplace<T: Copy>(input: ArrayViewMut1<T>) {
    let len = input.len();
    roll(input, len - len / 2);
}

// out[i] = in[(i - shift) mod len]
fn roll<T: Copy>(mut input: ArrayViewMut1<T>, shift: usize) {
    let len = input.len();
    if len < 2 || shift % len == 0 {
        return;
    }
    let shift = shift % len;

    if let Some(slice) = input.as_slice_mut() {
        slice.rotate_right(shift);
        return;
    }

    let temp: Vec<T> = input.iter().cloned().collect();
    for (i, e) in input.iter_mut().enumerate() {
        *e = temp[(i + len - shift) % len];
    }
}
