//! PSF kernel: a normalized 2-D point-spread function and its convolution
//! operator.

use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{KbmodError, Result};

/// A square, odd-sided, non-negative kernel that sums to 1.
#[derive(Clone, Debug)]
pub struct Psf {
    data: Array2<f32>,
}

impl Psf {
    /// Build a PSF from a single-Gaussian width `sigma` (pixels).
    pub fn gaussian(sigma: f32) -> Self {
        let radius = (sigma * 3.0).ceil().max(1.0) as usize;
        let size = 2 * radius + 1;
        let mut data = Array2::<f32>::zeros((size, size));
        let s2 = 2.0 * sigma * sigma;
        let mut sum = 0.0f32;

        for row in 0..size {
            for col in 0..size {
                let x = col as f32 - radius as f32;
                let y = row as f32 - radius as f32;
                let v = (-(x * x + y * y) / s2).exp();
                data[[row, col]] = v;
                sum += v;
            }
        }
        data.mapv_inplace(|v| v / sum);

        Self { data }
    }

    /// Build a PSF from a caller-supplied kernel. Validates odd side length
    /// and non-negative entries, then renormalizes so the entries sum to 1.
    pub fn from_array(data: Array2<f32>) -> Result<Self> {
        let (h, w) = data.dim();
        if h != w || h % 2 == 0 {
            return Err(KbmodError::ConfigInvalid(format!(
                "PSF must be square with odd side length, got {h}x{w}"
            )));
        }
        if data.iter().any(|&v| v < 0.0 || !v.is_finite()) {
            return Err(KbmodError::ConfigInvalid(
                "PSF entries must be finite and non-negative".into(),
            ));
        }
        let sum: f32 = data.iter().sum();
        if sum <= 0.0 {
            return Err(KbmodError::ConfigInvalid(
                "PSF entries must sum to a positive value".into(),
            ));
        }
        let mut data = data;
        data.mapv_inplace(|v| v / sum);
        Ok(Self { data })
    }

    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn side(&self) -> usize {
        self.data.nrows()
    }

    /// Elementwise square of the kernel. Not renormalized: phi's kernel
    /// need not sum to 1. The PSF is itself symmetric, so
    /// using the kernel directly (rather than its transpose) on both psi
    /// and phi is equivalent to using the transpose, but this must hold by
    /// construction, not by accident — callers should not assume a
    /// non-symmetric kernel would still satisfy the flux-estimator
    /// invariant.
    pub fn square(&self) -> Psf {
        Psf {
            data: self.data.mapv(|v| v * v),
        }
    }
}

/// Convolve `image` with `psf`, extending the image at the borders
/// (clamp-to-edge) rather than zero-padding.
pub fn convolve(image: &Array2<f32>, psf: &Psf) -> Array2<f32> {
    let (h, w) = image.dim();
    let side = psf.side();
    let radius = (side / 2) as isize;
    let kernel = psf.as_array();

    let compute_row = |row: usize| -> Vec<f32> {
        (0..w)
            .map(|col| {
                let mut sum = 0.0f32;
                for kr in 0..side {
                    let src_row =
                        (row as isize + kr as isize - radius).clamp(0, h as isize - 1) as usize;
                    for kc in 0..side {
                        let src_col = (col as isize + kc as isize - radius)
                            .clamp(0, w as isize - 1) as usize;
                        sum += image[[src_row, src_col]] * kernel[[kr, kc]];
                    }
                }
                sum
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(compute_row).collect()
    } else {
        (0..h).map(compute_row).collect()
    };

    let mut result = Array2::<f32>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            result[[row, col]] = val;
        }
    }
    result
}
