//! Post-hoc sigma-G clipping over a trajectory's per-observation samples
//! Distinct from the grid search's optional in-kernel pre-filter: this
//! pass runs once per surviving trajectory rather than once per candidate,
//! so it can afford a tighter percentile computation.

use crate::result_list::ResultList;
use crate::sigma_g::{sigma_g_clip_mask, SigmaGParams};
use crate::trajectory::Trajectory;

/// Thresholds applied after sigma-G clipping has recomputed a trajectory's
/// statistics over its surviving observations.
#[derive(Clone, Copy, Debug)]
pub struct FilterParams {
    pub sigma_g: SigmaGParams,
    /// K: minimum surviving observation count after clipping.
    pub num_obs: usize,
    /// L_min: minimum reported likelihood, a floor (not the `max_lh`
    /// ceiling applied in C6 — this is the distinct `lh_level` config key).
    pub lh_level: f32,
}

/// Sigma-G clip `traj`'s observations in place, recompute its aggregate
/// statistics over the survivors, and report whether it still passes the
/// `num_obs`/`lh_level` cutoffs. Returns `false` if the trajectory should be
/// dropped entirely.
pub fn apply_sigma_g(traj: &mut Trajectory, params: &FilterParams) -> bool {
    let n = traj.psi_samples.len();
    debug_assert_eq!(traj.phi_samples.len(), n);
    debug_assert_eq!(traj.obs_valid.len(), n);

    let currently_valid: Vec<usize> = (0..n).filter(|&i| traj.obs_valid[i]).collect();
    if currently_valid.is_empty() {
        return false;
    }

    let ratios: Vec<f32> = currently_valid
        .iter()
        .map(|&i| traj.psi_samples[i] / traj.phi_samples[i].sqrt())
        .collect();
    let keep = sigma_g_clip_mask(&ratios, &params.sigma_g);

    for (&i, keep_i) in currently_valid.iter().zip(keep.iter()) {
        if !keep_i {
            traj.obs_valid[i] = false;
        }
    }

    let mut sum_psi = 0.0f32;
    let mut sum_phi = 0.0f32;
    let mut count = 0u32;
    for i in 0..n {
        if traj.obs_valid[i] {
            sum_psi += traj.psi_samples[i];
            sum_phi += traj.phi_samples[i];
            count += 1;
        }
    }

    if count as usize < params.num_obs || sum_phi <= 0.0 {
        return false;
    }

    let likelihood = sum_psi / sum_phi.sqrt();
    if likelihood < params.lh_level {
        return false;
    }

    traj.obs_count = count;
    traj.likelihood = likelihood;
    traj.flux = sum_psi / sum_phi;
    true
}

/// Apply [`apply_sigma_g`] to every trajectory in `results`, dropping those
/// that no longer pass, then re-sort by likelihood.
pub fn filter_results(results: &mut ResultList, params: &FilterParams) {
    let mut kept: Vec<Trajectory> = results.as_slice().to_vec();
    kept.retain_mut(|traj| apply_sigma_g(traj, params));
    *results = ResultList::from_vec(kept);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traj(psi: Vec<f32>, phi: Vec<f32>) -> Trajectory {
        let n = psi.len();
        Trajectory {
            x0: 0,
            y0: 0,
            vx: 1.0,
            vy: 0.0,
            flux: 0.0,
            likelihood: 0.0,
            obs_count: n as u32,
            obs_valid: vec![true; n],
            stamp: None,
            psi_samples: psi,
            phi_samples: phi,
        }
    }

    #[test]
    fn drops_gross_outlier_observation() {
        let mut psi = vec![10.0f32; 20];
        let phi = vec![1.0f32; 20];
        psi[0] = 100_000.0; // one wild observation among twenty good ones
        let mut t = traj(psi, phi);
        let params = FilterParams {
            sigma_g: SigmaGParams::new(25.0, 75.0),
            num_obs: 1,
            lh_level: 0.0,
        };
        let survives = apply_sigma_g(&mut t, &params);
        assert!(survives);
        assert!(!t.obs_valid[0]);
        assert_eq!(t.obs_count, 19);
    }

    #[test]
    fn drops_trajectory_below_num_obs_after_clipping() {
        let psi = vec![1.0f32, 1.0, 1.0, 1000.0];
        let phi = vec![1.0f32; 4];
        let mut t = traj(psi, phi);
        let params = FilterParams {
            sigma_g: SigmaGParams::new(25.0, 75.0),
            num_obs: 4,
            lh_level: 0.0,
        };
        assert!(!apply_sigma_g(&mut t, &params));
    }

    #[test]
    fn filter_results_removes_rejected_trajectories() {
        let good = traj(vec![10.0; 10], vec![1.0; 10]);
        let mut bad_psi = vec![10.0f32; 10];
        bad_psi[0] = -1_000_000.0;
        let bad = traj(bad_psi, vec![1.0; 10]);

        let mut results = ResultList::from_vec(vec![good, bad]);
        let params = FilterParams {
            sigma_g: SigmaGParams::new(25.0, 75.0),
            num_obs: 9,
            lh_level: 0.0,
        };
        filter_results(&mut results, &params);
        assert_eq!(results.len(), 2);
        for t in results.iter() {
            assert!(t.obs_count >= 9);
        }
    }
}
