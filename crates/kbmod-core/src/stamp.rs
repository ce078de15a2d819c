//! Postage-stamp construction and shape-based vetoing.

use ndarray::Array2;

use crate::image_stack::ImageStack;
use crate::sigma_g::median;
use crate::trajectory::Trajectory;

/// How per-exposure windows are combined into a single stamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StampType {
    Sum,
    Mean,
    /// Per-pixel median across exposures.
    Median,
    /// Alias of [`StampType::Median`]; the distillation names a distinct
    /// weighted variant but does not specify its weighting, so this falls
    /// back to the plain per-pixel median rather than guess at a scheme.
    CppMedian,
}

/// Coadd the `(2*radius+1)^2` window centered on `traj`'s nearest-integer
/// sampled position at each valid exposure, from the stack's science
/// images. Out-of-bounds samples at a given exposure are skipped for that
/// pixel rather than treated as zero.
pub fn build_stamp(
    traj: &Trajectory,
    stack: &ImageStack,
    radius: usize,
    stamp_type: StampType,
) -> Array2<f32> {
    let side = 2 * radius + 1;
    let (w, h) = (stack.width() as isize, stack.height() as isize);
    let epochs = stack.epoch_offsets();

    let mut columns: Vec<Vec<f32>> = vec![Vec::new(); side * side];

    for (i, &dt) in epochs.iter().enumerate() {
        if !traj.obs_valid.get(i).copied().unwrap_or(true) {
            continue;
        }
        let (cx, cy) = traj.sample_position_at(dt);
        let layer = &stack.layers()[i];
        for dy in 0..side {
            let y = cy - radius as isize + dy as isize;
            if y < 0 || y >= h {
                continue;
            }
            for dx in 0..side {
                let x = cx - radius as isize + dx as isize;
                if x < 0 || x >= w {
                    continue;
                }
                if !layer.mask[[y as usize, x as usize]] {
                    continue;
                }
                let val = layer.science[[y as usize, x as usize]];
                if val.is_finite() {
                    columns[dy * side + dx].push(val);
                }
            }
        }
    }

    let mut stamp = Array2::<f32>::zeros((side, side));
    for dy in 0..side {
        for dx in 0..side {
            let samples = &mut columns[dy * side + dx];
            let value = if samples.is_empty() {
                0.0
            } else {
                match stamp_type {
                    StampType::Sum => samples.iter().sum(),
                    StampType::Mean => samples.iter().sum::<f32>() / samples.len() as f32,
                    StampType::Median | StampType::CppMedian => median(samples),
                }
            };
            stamp[[dy, dx]] = value;
        }
    }
    stamp
}

/// Shape veto thresholds applied to a built stamp.
#[derive(Clone, Copy, Debug)]
pub struct StampFilterParams {
    /// Maximum allowed (dx, dy) offset of the peak pixel from the stamp's
    /// geometric center, in pixels.
    pub peak_offset: (f64, f64),
    /// Upper bounds on `[m_xx, m_yy, m_xy, m_x, m_y]` intensity moments.
    pub mom_lims: [f64; 5],
    /// Minimum fraction of the stamp's total flux the central pixel must
    /// hold.
    pub center_thresh: f64,
}

/// Intensity-weighted moments of a stamp: centroid `(x, y)` relative to the
/// stamp center, plus `[m_xx, m_yy, m_xy, m_x, m_y]` (generalizes the
/// single-region masked-centroid computation to a dense, unmasked window).
pub fn stamp_moments(stamp: &Array2<f32>) -> ((f64, f64), [f64; 5]) {
    let (h, w) = stamp.dim();
    let cx = (w as f64 - 1.0) / 2.0;
    let cy = (h as f64 - 1.0) / 2.0;

    let mut total = 0.0f64;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    for ((row, col), &v) in stamp.indexed_iter() {
        let v = v.max(0.0) as f64;
        total += v;
        sum_x += v * (col as f64 - cx);
        sum_y += v * (row as f64 - cy);
    }
    if total <= 0.0 {
        return ((0.0, 0.0), [0.0; 5]);
    }
    let centroid_x = sum_x / total;
    let centroid_y = sum_y / total;

    let mut m_xx = 0.0f64;
    let mut m_yy = 0.0f64;
    let mut m_xy = 0.0f64;
    for ((row, col), &v) in stamp.indexed_iter() {
        let v = v.max(0.0) as f64;
        let dx = col as f64 - cx - centroid_x;
        let dy = row as f64 - cy - centroid_y;
        m_xx += v * dx * dx;
        m_yy += v * dy * dy;
        m_xy += v * dx * dy;
    }
    m_xx /= total;
    m_yy /= total;
    m_xy /= total;

    (
        (centroid_x, centroid_y),
        [m_xx, m_yy, m_xy, centroid_x, centroid_y],
    )
}

/// Peak pixel offset from the stamp's geometric center, `(dx, dy)`.
pub fn peak_offset(stamp: &Array2<f32>) -> (f64, f64) {
    let (h, w) = stamp.dim();
    let cx = (w as f64 - 1.0) / 2.0;
    let cy = (h as f64 - 1.0) / 2.0;
    let mut best = f32::NEG_INFINITY;
    let mut best_pos = (cx, cy);
    for ((row, col), &v) in stamp.indexed_iter() {
        if v > best {
            best = v;
            best_pos = (col as f64, row as f64);
        }
    }
    (best_pos.0 - cx, best_pos.1 - cy)
}

/// Whether `stamp` passes the shape veto: peak offset within bounds,
/// moments (including centroid) within `mom_lims`, and the central pixel's
/// share of the total flux above `center_thresh`.
pub fn stamp_passes(stamp: &Array2<f32>, params: &StampFilterParams) -> bool {
    let (dx, dy) = peak_offset(stamp);
    if dx.abs() > params.peak_offset.0 || dy.abs() > params.peak_offset.1 {
        return false;
    }
    let (_, moments) = stamp_moments(stamp);
    if !moments.iter().zip(params.mom_lims.iter()).all(|(&m, &lim)| m.abs() <= lim) {
        return false;
    }

    let (h, w) = stamp.dim();
    let total: f64 = stamp.iter().map(|&v| v.max(0.0) as f64).sum();
    if total <= 0.0 {
        return false;
    }
    let center = stamp[[h / 2, w / 2]].max(0.0) as f64;
    center > params.center_thresh * total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageLayer;
    use ndarray::Array2;

    fn stack_with_point(n: usize, w: usize, h: usize, x: usize, y: usize, flux: f32) -> ImageStack {
        let layers = (0..n)
            .map(|i| {
                let mut science = Array2::<f32>::zeros((h, w));
                science[[y, x]] = flux;
                let variance = Array2::<f32>::from_elem((h, w), 1.0);
                let mask = Array2::<bool>::from_elem((h, w), true);
                ImageLayer::new(science, variance, mask, i as f64).unwrap()
            })
            .collect();
        ImageStack::new(layers).unwrap()
    }

    fn stationary_traj(n: usize, x0: i32, y0: i32) -> Trajectory {
        Trajectory {
            x0,
            y0,
            vx: 0.0,
            vy: 0.0,
            flux: 0.0,
            likelihood: 0.0,
            obs_count: n as u32,
            obs_valid: vec![true; n],
            stamp: None,
            psi_samples: vec![0.0; n],
            phi_samples: vec![0.0; n],
        }
    }

    #[test]
    fn sum_stamp_accumulates_flux_across_exposures() {
        let stack = stack_with_point(5, 21, 21, 10, 10, 2.0);
        let traj = stationary_traj(5, 10, 10);
        let stamp = build_stamp(&traj, &stack, 2, StampType::Sum);
        assert_eq!(stamp[[2, 2]], 10.0);
    }

    #[test]
    fn mean_stamp_averages_across_exposures() {
        let stack = stack_with_point(5, 21, 21, 10, 10, 2.0);
        let traj = stationary_traj(5, 10, 10);
        let stamp = build_stamp(&traj, &stack, 2, StampType::Mean);
        assert_eq!(stamp[[2, 2]], 2.0);
    }

    #[test]
    fn median_stamp_rejects_single_outlier_exposure() {
        let mut stack = stack_with_point(5, 21, 21, 10, 10, 2.0);
        stack.layers_mut()[0].science[[10, 10]] = 1000.0;
        let traj = stationary_traj(5, 10, 10);
        let stamp = build_stamp(&traj, &stack, 2, StampType::Median);
        assert_eq!(stamp[[2, 2]], 2.0);
    }

    #[test]
    fn centered_point_source_passes_shape_veto() {
        let stack = stack_with_point(5, 21, 21, 10, 10, 10.0);
        let traj = stationary_traj(5, 10, 10);
        let stamp = build_stamp(&traj, &stack, 5, StampType::Sum);
        let params = StampFilterParams {
            peak_offset: (1.0, 1.0),
            mom_lims: [10.0, 10.0, 10.0, 2.0, 2.0],
            center_thresh: 0.9,
        };
        assert!(stamp_passes(&stamp, &params));
    }

    #[test]
    fn off_center_peak_fails_shape_veto() {
        let stack = stack_with_point(5, 21, 21, 12, 10, 10.0);
        let traj = stationary_traj(5, 10, 10);
        let stamp = build_stamp(&traj, &stack, 5, StampType::Sum);
        let params = StampFilterParams {
            peak_offset: (1.0, 1.0),
            mom_lims: [10.0, 10.0, 10.0, 2.0, 2.0],
            center_thresh: 1.0,
        };
        assert!(!stamp_passes(&stamp, &params));
    }
}
