//! Converts an [`ImageStack`] into psi (PSF-matched-filtered, variance
//! weighted data) and phi (PSF-squared-filtered inverse variance) images
//! likelihood images.

use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_FRAME_THRESHOLD;
use crate::image_stack::ImageStack;
use crate::psf::{convolve, Psf};

/// Optional per-exposure quantization of a psi or phi image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ByteEncoding {
    None,
    One { min: f32, max: f32 },
    Two { min: f32, max: f32 },
}

impl ByteEncoding {
    pub fn encode(values: &[f32]) -> (Self, Vec<u8>) {
        encode_bytes(values, 1)
    }

    pub fn encode_two(values: &[f32]) -> (Self, Vec<u16>) {
        let (min, max) = min_max(values);
        let scale = if max > min { 65535.0 / (max - min) } else { 0.0 };
        let encoded = values
            .iter()
            .map(|&v| (((v - min) * scale).round().clamp(0.0, 65535.0)) as u16)
            .collect();
        (ByteEncoding::Two { min, max }, encoded)
    }

    pub fn decode_one(&self, byte: u8) -> f32 {
        match self {
            ByteEncoding::One { min, max } if max > min => {
                min + (byte as f32 / 255.0) * (max - min)
            }
            ByteEncoding::One { min, .. } => *min,
            _ => 0.0,
        }
    }

    pub fn decode_two(&self, word: u16) -> f32 {
        match self {
            ByteEncoding::Two { min, max } if max > min => {
                min + (word as f32 / 65535.0) * (max - min)
            }
            ByteEncoding::Two { min, .. } => *min,
            _ => 0.0,
        }
    }
}

fn min_max(values: &[f32]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in values {
        if v < min {
            min = v;
        }
        if v > max {
            max = v;
        }
    }
    if !min.is_finite() || !max.is_finite() {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

fn encode_bytes(values: &[f32], _bytes: usize) -> (ByteEncoding, Vec<u8>) {
    let (min, max) = min_max(values);
    let scale = if max > min { 255.0 / (max - min) } else { 0.0 };
    let encoded = values
        .iter()
        .map(|&v| (((v - min) * scale).round().clamp(0.0, 255.0)) as u8)
        .collect();
    (ByteEncoding::One { min, max }, encoded)
}

/// psi/phi images for every exposure, row-major, exposure-major.
#[derive(Clone, Debug)]
pub struct PsiPhi {
    pub width: usize,
    pub height: usize,
    pub n: usize,
    pub psi: Vec<f32>,
    pub phi: Vec<f32>,
}

impl PsiPhi {
    /// Build psi/phi for every exposure in `stack` using `psf`.
    ///
    /// psi_i = PSF ⋆ (science_i / variance_i), phi_i = PSF² ⋆ (1 / variance_i).
    /// Invalid cells contribute (0, 0) so they never affect a trajectory sum.
    pub fn build(stack: &ImageStack, psf: &Psf) -> Self {
        let (h, w) = (stack.height(), stack.width());
        let n = stack.len();
        let psf_sq = psf.square();

        let build_one = |layer: &crate::image::ImageLayer| -> (Array2<f32>, Array2<f32>) {
            let mut sci_prime = Array2::<f32>::zeros((h, w));
            let mut inv_prime = Array2::<f32>::zeros((h, w));
            for row in 0..h {
                for col in 0..w {
                    if layer.mask[[row, col]] {
                        let var = layer.variance[[row, col]];
                        sci_prime[[row, col]] = layer.science[[row, col]] / var;
                        inv_prime[[row, col]] = 1.0 / var;
                    }
                }
            }
            let psi = convolve(&sci_prime, psf);
            let phi = convolve(&inv_prime, &psf_sq);
            (psi, phi)
        };

        let pairs: Vec<(Array2<f32>, Array2<f32>)> = if n >= PARALLEL_FRAME_THRESHOLD {
            stack.layers().par_iter().map(build_one).collect()
        } else {
            stack.layers().iter().map(build_one).collect()
        };

        let mut psi = vec![0.0f32; n * h * w];
        let mut phi = vec![0.0f32; n * h * w];
        for (i, (psi_i, phi_i)) in pairs.into_iter().enumerate() {
            let base = i * h * w;
            for row in 0..h {
                for col in 0..w {
                    let idx = base + row * w + col;
                    let phi_val = phi_i[[row, col]].max(0.0);
                    psi[idx] = psi_i[[row, col]];
                    phi[idx] = phi_val;
                }
            }
        }

        Self {
            width: w,
            height: h,
            n,
            psi,
            phi,
        }
    }

    #[inline]
    pub fn index(&self, exposure: usize, x: usize, y: usize) -> usize {
        exposure * self.height * self.width + y * self.width + x
    }

    /// Sample (psi, phi) at integer pixel (x, y) for the given exposure,
    /// returning `None` if out of bounds or phi == 0 (no contribution, per
    /// no contribution).
    #[inline]
    pub fn sample(&self, exposure: usize, x: isize, y: isize) -> Option<(f32, f32)> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        let idx = self.index(exposure, x as usize, y as usize);
        let phi = self.phi[idx];
        if phi == 0.0 {
            return None;
        }
        Some((self.psi[idx], phi))
    }
}
