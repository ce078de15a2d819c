//! The per-candidate trajectory record.

use ndarray::Array2;

/// A linear trajectory candidate across the stack.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory {
    pub x0: i32,
    pub y0: i32,
    pub vx: f64,
    pub vy: f64,
    pub flux: f32,
    pub likelihood: f32,
    pub obs_count: u32,
    /// One entry per exposure in the stack: whether this trajectory samples
    /// a valid (in-bounds, phi > 0, and not sigma-G clipped) observation
    /// there.
    pub obs_valid: Vec<bool>,
    pub stamp: Option<Array2<f32>>,
    /// Per-observation psi samples, aligned with `obs_valid` (0.0 where
    /// invalid).
    pub psi_samples: Vec<f32>,
    /// Per-observation phi samples, aligned with `obs_valid` (0.0 where
    /// invalid).
    pub phi_samples: Vec<f32>,
}

impl Trajectory {
    /// Predicted sub-pixel position at epoch offset `dt` (days).
    pub fn position_at(&self, dt: f64) -> (f64, f64) {
        (self.x0 as f64 + self.vx * dt, self.y0 as f64 + self.vy * dt)
    }

    /// Nearest-integer sample location, round-half-away-from-zero rather
    /// than truncation-toward-zero, to stay symmetric near image edges.
    pub fn sample_position_at(&self, dt: f64) -> (isize, isize) {
        let (x, y) = self.position_at(dt);
        (x.round() as isize, y.round() as isize)
    }

    pub fn obs_count_matches_bits(&self) -> bool {
        self.obs_count as usize == self.obs_valid.iter().filter(|&&v| v).count()
    }
}
