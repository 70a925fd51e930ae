//! Frequency domain selection of one diffraction order.
//!
//! An off-axis hologram carries its object term on a spatial carrier, which shows up in the spectrum as a
//! lobe away from the zero frequency. Keeping only that lobe and moving it to the centre removes both the
//! zero order and the twin image, and the carrier with them.

use crate::error::{PropagationError, Result};
use crate::field::shape_of;
use crate::fft2::ifft2_shift_inplace;
use crate::{freq_res, spatial_res, Field};
use ndarray::{Array2, Zip};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::cmp::{max, min};

/// Represents a spectrum at a given frequency resolution.
///
/// DC value is centered. That is it is at len/2 on each axis.
#[derive(Clone, Debug)]
pub struct Spectrum {
    pub values: Array2<Complex<f64>>,
    pub freq_res: (f64, f64),
}

impl Spectrum {
    /// Forward FFT of the field, shifted so the zero frequency is centered.
    pub fn from_field(field: &Field) -> Spectrum {
        let mut shifted = field.clone();
        shifted.forward_fft();
        shifted.shift();
        Spectrum {
            freq_res: freq_res(field.values.shape(), field.pitch),
            values: shifted.values,
        }
    }

    /// Modulus image used to locate the order of interest.
    pub fn magnitude(&self) -> Array2<f64> {
        self.values.mapv(|e| e.norm())
    }

    pub fn shape(&self) -> [usize; 2] {
        shape_of(&self.values)
    }

    /// Pitch of the spatial field this spectrum belongs to.
    pub fn spatial_pitch(&self) -> (f64, f64) {
        spatial_res(self.values.shape(), self.freq_res)
    }
}

/// Rectangle in spectrum pixels, `x` along axis 0 and `y` along axis 1.
///
/// The optional mask has shape `[width, height]` and selects a non-rectangular region inside the rectangle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectralRoi {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub mask: Option<Array2<bool>>,
}

impl SpectralRoi {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        SpectralRoi {
            x,
            y,
            width,
            height,
            mask: None,
        }
    }

    /// The whole `[M, N]` grid.
    pub fn full(shape: [usize; 2]) -> Self {
        Self::new(0, 0, shape[0] as i64, shape[1] as i64)
    }

    pub fn with_mask(mut self, mask: Array2<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Integer translation `(a, b)` that moves the rectangle to the centre of an `[M, N]` grid.
    ///
    /// `None` when the rectangle is too far out for the translation to fit in an `i64`.
    pub fn recenter_offset(&self, shape: [usize; 2]) -> Option<(i64, i64)> {
        let offset = |len: usize, start: i64, size: i64| {
            (len as i64)
                .checked_sub(size)?
                .checked_sub(start.checked_mul(2)?)
                .map(|d| d / 2)
        };
        Some((
            offset(shape[0], self.x, self.width)?,
            offset(shape[1], self.y, self.height)?,
        ))
    }

    fn empty(&self, shape: [usize; 2]) -> PropagationError {
        PropagationError::EmptyRoi {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            shape,
        }
    }
}

/// Zeroes everything outside `roi`, moves the kept block to the zero frequency and returns to the spatial domain.
pub fn filter_and_recenter(spectrum: &Spectrum, roi: &SpectralRoi) -> Result<Field> {
    let shape = spectrum.shape();
    let [m, n] = [shape[0] as i64, shape[1] as i64];

    if roi.width <= 0 || roi.height <= 0 {
        return Err(roi.empty(shape));
    }
    if let Some(mask) = &roi.mask {
        if mask.shape() != [roi.width as usize, roi.height as usize] {
            return Err(PropagationError::Dimension {
                expected: [roi.width as usize, roi.height as usize],
                actual: shape_of(mask),
            });
        }
    }

    let (a, b) = roi.recenter_offset(shape).ok_or_else(|| roi.empty(shape))?;
    let (x_end, y_end) = match (roi.x.checked_add(roi.width), roi.y.checked_add(roi.height)) {
        (Some(x_end), Some(y_end)) => (x_end, y_end),
        _ => return Err(roi.empty(shape)),
    };

    // rectangle clipped to the grid
    let i_range = (max(roi.x, 0), min(x_end, m));
    let j_range = (max(roi.y, 0), min(y_end, n));
    if i_range.0 >= i_range.1 || j_range.0 >= j_range.1 {
        return Err(roi.empty(shape));
    }
    if i_range != (roi.x, x_end) || j_range != (roi.y, y_end) {
        tracing::warn!(
            x = roi.x,
            y = roi.y,
            width = roi.width,
            height = roi.height,
            "region of interest clipped to the spectrum"
        );
    }

    let mut values = Array2::zeros(spectrum.values.raw_dim());
    Zip::indexed(&mut values).par_for_each(|(di, dj), e| {
        let i = di as i64 - a;
        let j = dj as i64 - b;
        if i < i_range.0 || i >= i_range.1 || j < j_range.0 || j >= j_range.1 {
            return;
        }
        let keep = match &roi.mask {
            Some(mask) => mask[[(i - roi.x) as usize, (j - roi.y) as usize]],
            None => true,
        };
        if keep {
            *e = spectrum.values[[i as usize, j as usize]];
        }
    });

    ifft2_shift_inplace(values.view_mut());
    let mut field = Field {
        values,
        pitch: spectrum.spatial_pitch(),
    };
    field.inverse_fft(true);
    Ok(field)
}
