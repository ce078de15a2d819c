//! Enumerates the (angle, speed) candidate grid used by the search kernel
//! Enumerates the (angle, speed) candidate grid used by the search
//! kernel. The resulting velocity set has no dependence on start pixel
//! and is materialized once, then reused for every start pixel.

/// A materialized grid of candidate (vx, vy) velocities, pixels/day.
#[derive(Clone, Debug)]
pub struct TrajectoryGrid {
    velocities: Vec<(f64, f64)>,
}

impl TrajectoryGrid {
    /// Build the outer product of a uniformly spaced angle grid around
    /// `center_angle` (radians) with half-widths `angle_minus`/`angle_plus`
    /// and count `n_angle`, and a uniformly spaced speed grid in
    /// `[v_min, v_max]` with count `n_speed`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        center_angle: f64,
        angle_minus: f64,
        angle_plus: f64,
        n_angle: usize,
        v_min: f64,
        v_max: f64,
        n_speed: usize,
    ) -> Self {
        let angle_lo = center_angle - angle_minus;
        let angle_hi = center_angle + angle_plus;

        let angles: Vec<f64> = linspace(angle_lo, angle_hi, n_angle);
        let speeds: Vec<f64> = linspace(v_min, v_max, n_speed);

        let mut velocities = Vec::with_capacity(n_angle * n_speed);
        for &theta in &angles {
            for &speed in &speeds {
                velocities.push((speed * theta.cos(), speed * theta.sin()));
            }
        }

        Self { velocities }
    }

    pub fn velocities(&self) -> &[(f64, f64)] {
        &self.velocities
    }

    pub fn len(&self) -> usize {
        self.velocities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.velocities.is_empty()
    }
}

fn linspace(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    if count == 1 {
        return vec![lo];
    }
    let step = (hi - lo) / (count - 1) as f64;
    (0..count).map(|i| lo + step * i as f64).collect()
}
