//! Ordered collection of image layers with shared dimensions.

use ndarray::Array2;

use crate::error::{KbmodError, Result};
use crate::image::ImageLayer;

/// An ordered, mjd-ascending sequence of same-sized [`ImageLayer`]s.
#[derive(Clone, Debug)]
pub struct ImageStack {
    layers: Vec<ImageLayer>,
    width: usize,
    height: usize,
}

impl ImageStack {
    pub fn new(mut layers: Vec<ImageLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(KbmodError::EmptyStack);
        }
        let (h, w) = (layers[0].height(), layers[0].width());
        for layer in &layers {
            if layer.height() != h || layer.width() != w {
                return Err(KbmodError::InputInconsistent(format!(
                    "image stack layers must share dimensions: expected {h}x{w}, found {}x{}",
                    layer.height(),
                    layer.width()
                )));
            }
        }
        layers.sort_by(|a, b| a.mjd.total_cmp(&b.mjd));

        Ok(Self {
            layers,
            width: w,
            height: h,
        })
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn layers(&self) -> &[ImageLayer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [ImageLayer] {
        &mut self.layers
    }

    /// Epoch offsets `t_i - t_0` in days, one per layer, ascending.
    pub fn epoch_offsets(&self) -> Vec<f64> {
        let t0 = self.layers[0].mjd;
        self.layers.iter().map(|l| l.mjd - t0).collect()
    }

    /// Duration of the stack, in days, from the first to the last epoch.
    pub fn duration_days(&self) -> f64 {
        self.layers.last().unwrap().mjd - self.layers[0].mjd
    }

    /// Synthesize a pixel-wise mask that rejects any pixel invalid in at
    /// least `min_count` layers.
    pub fn global_mask(&self, min_count: usize) -> Array2<bool> {
        let (h, w) = (self.height, self.width);
        let mut invalid_count = Array2::<usize>::zeros((h, w));
        for layer in &self.layers {
            for ((row, col), &valid) in layer.mask.indexed_iter() {
                if !valid {
                    invalid_count[[row, col]] += 1;
                }
            }
        }
        invalid_count.mapv(|count| count < min_count)
    }

    /// Compute the global mask and OR it into every layer's mask (pixels the
    /// global mask rejects are masked in every layer).
    pub fn apply_global_mask(&mut self, min_count: usize) {
        let accept = self.global_mask(min_count);
        for layer in &mut self.layers {
            for ((row, col), valid) in layer.mask.indexed_iter_mut() {
                if !accept[[row, col]] {
                    *valid = false;
                    layer.science[[row, col]] = f32::NAN;
                }
            }
        }
    }

    /// Dilate each layer's mask by `radius` pixels under the Chebyshev
    /// (chessboard) metric: a pixel becomes invalid if any pixel within
    /// `radius` (in either axis) of it is invalid.
    pub fn grow_mask(&mut self, radius: usize) {
        if radius == 0 {
            return;
        }
        let (h, w) = (self.height, self.width);
        for layer in &mut self.layers {
            let original = layer.mask.clone();
            for row in 0..h {
                for col in 0..w {
                    if !original[[row, col]] {
                        continue;
                    }
                    let r_lo = row.saturating_sub(radius);
                    let r_hi = (row + radius).min(h - 1);
                    let c_lo = col.saturating_sub(radius);
                    let c_hi = (col + radius).min(w - 1);
                    let mut any_invalid = false;
                    'scan: for r in r_lo..=r_hi {
                        for c in c_lo..=c_hi {
                            if !original[[r, c]] {
                                any_invalid = true;
                                break 'scan;
                            }
                        }
                    }
                    if any_invalid {
                        layer.mask[[row, col]] = false;
                        layer.science[[row, col]] = f32::NAN;
                    }
                }
            }
        }
    }
}
