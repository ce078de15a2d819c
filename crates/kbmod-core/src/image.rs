//! A single exposure: pixel grid, validity mask, variance, epoch.

use ndarray::Array2;

use crate::error::{KbmodError, Result};

/// One astronomical exposure. Invariants: science/variance/mask share
/// dimensions, science is NaN wherever mask rejects, mjd is finite.
#[derive(Clone, Debug)]
pub struct ImageLayer {
    pub science: Array2<f32>,
    pub variance: Array2<f32>,
    pub mask: Array2<bool>,
    pub mjd: f64,
}

impl ImageLayer {
    /// Construct a layer, masking science pixels that are invalid or have
    /// non-positive variance.
    pub fn new(
        science: Array2<f32>,
        variance: Array2<f32>,
        mut mask: Array2<bool>,
        mjd: f64,
    ) -> Result<Self> {
        if science.dim() != variance.dim() || science.dim() != mask.dim() {
            return Err(KbmodError::InputInconsistent(
                "science/variance/mask dimensions must match".into(),
            ));
        }
        if !mjd.is_finite() {
            return Err(KbmodError::InputInconsistent(
                "mjd must be finite".into(),
            ));
        }

        let mut science = science;
        for ((m, s), v) in mask.iter_mut().zip(science.iter_mut()).zip(variance.iter()) {
            if !v.is_finite() || *v <= 0.0 || !s.is_finite() {
                *m = false;
            }
            if !*m {
                *s = f32::NAN;
            }
        }

        Ok(Self {
            science,
            variance,
            mask,
            mjd,
        })
    }

    pub fn width(&self) -> usize {
        self.science.ncols()
    }

    pub fn height(&self) -> usize {
        self.science.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_masks_nonpositive_variance() {
        let science = Array2::<f32>::from_elem((2, 2), 1.0);
        let mut variance = Array2::<f32>::from_elem((2, 2), 1.0);
        variance[[0, 0]] = 0.0;
        variance[[1, 1]] = -1.0;
        let mask = Array2::<bool>::from_elem((2, 2), true);
        let layer = ImageLayer::new(science, variance, mask, 59000.0).unwrap();
        assert!(!layer.mask[[0, 0]]);
        assert!(!layer.mask[[1, 1]]);
        assert!(layer.science[[0, 0]].is_nan());
        assert!(layer.mask[[0, 1]]);
    }

    #[test]
    fn new_rejects_dimension_mismatch() {
        let science = Array2::<f32>::zeros((2, 2));
        let variance = Array2::<f32>::from_elem((3, 3), 1.0);
        let mask = Array2::<bool>::from_elem((2, 2), true);
        assert!(ImageLayer::new(science, variance, mask, 0.0).is_err());
    }

    #[test]
    fn new_rejects_non_finite_mjd() {
        let science = Array2::<f32>::zeros((2, 2));
        let variance = Array2::<f32>::from_elem((2, 2), 1.0);
        let mask = Array2::<bool>::from_elem((2, 2), true);
        assert!(ImageLayer::new(science, variance, mask, f64::NAN).is_err());
    }
}
