//! The grid search kernel: for every (start-pixel, velocity) candidate,
//! samples psi/phi across all exposures and keeps the best per start pixel.

use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::cluster::{cluster_trajectories, ClusterParams};
use crate::config::SearchConfig;
use crate::consts::{DEFAULT_RESULTS_PER_PIXEL, PARALLEL_ROW_THRESHOLD};
use crate::error::{KbmodError, Result};
use crate::filter::{filter_results, FilterParams};
use crate::image_stack::ImageStack;
use crate::psf::Psf;
use crate::psi_phi::PsiPhi;
use crate::result_list::{compare_trajectories, ResultList};
use crate::sigma_g::{sigma_g_clip_mask, SigmaGParams};
use crate::stamp::{build_stamp, stamp_passes, StampFilterParams};
use crate::trajectory::Trajectory;
use crate::trajectory_grid::TrajectoryGrid;

/// Parameters controlling the grid search kernel.
#[derive(Clone, Debug)]
pub struct SearchParams {
    /// K: minimum surviving observations.
    pub num_obs: usize,
    /// L_max: cap that discards obviously-bad scores.
    pub max_lh: f32,
    /// R: number of trajectories retained per start pixel.
    pub results_per_pixel: usize,
    /// When set, sigma-G clipping runs inside the kernel rather than as a
    /// separate post-hoc pass.
    pub sigma_g: Option<SigmaGParams>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            num_obs: 1,
            max_lh: f32::INFINITY,
            results_per_pixel: DEFAULT_RESULTS_PER_PIXEL,
            sigma_g: None,
        }
    }
}

/// Abstraction over the compute device the search kernel runs on, mirroring
/// a CPU/GPU dual-backend split: candidate (start-pixel, velocity) pairs
/// are independent, so a SIMT backend could evaluate them as one work-item
/// each. Only a CPU backend ships today; `gpu` is a reserved feature.
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Run the grid search, returning up to `params.results_per_pixel`
    /// trajectories per start pixel, indexed `[y0 * width + x0]`.
    fn search(
        &self,
        psi_phi: &PsiPhi,
        epochs: &[f64],
        velocities: &[(f64, f64)],
        params: &SearchParams,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<Trajectory>>>;
}

/// Rayon-backed CPU search kernel: one task per row of start pixels, with a
/// fixed-capacity top-R result buffer per pixel that is thread-local
/// within a row (grounded on the row-parallel-with-thread-local-scratch
/// pattern used for sigma-clip stacking).
pub struct CpuSearchBackend;

impl SearchBackend for CpuSearchBackend {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn search(
        &self,
        psi_phi: &PsiPhi,
        epochs: &[f64],
        velocities: &[(f64, f64)],
        params: &SearchParams,
        cancel: &CancelToken,
    ) -> Result<Vec<Vec<Trajectory>>> {
        let (w, h, n) = (psi_phi.width, psi_phi.height, psi_phi.n);
        if epochs.len() != n {
            return Err(KbmodError::InputInconsistent(
                "epoch offsets must have one entry per exposure".into(),
            ));
        }

        let compute_row = |y0: usize| -> Option<Vec<Vec<Trajectory>>> {
            if cancel.is_cancelled() {
                return None;
            }
            let mut psi_buf = vec![0.0f32; n];
            let mut phi_buf = vec![0.0f32; n];
            let mut valid_buf = vec![false; n];

            let mut row_results = Vec::with_capacity(w);
            for x0 in 0..w {
                let mut best: Vec<Trajectory> = Vec::with_capacity(params.results_per_pixel + 1);
                for &(vx, vy) in velocities {
                    if let Some(traj) = score_candidate(
                        psi_phi, epochs, x0 as i32, y0 as i32, vx, vy, params, &mut psi_buf,
                        &mut phi_buf, &mut valid_buf,
                    ) {
                        best.push(traj);
                        if best.len() > params.results_per_pixel {
                            best.sort_by(compare_trajectories);
                            best.truncate(params.results_per_pixel);
                        }
                    }
                }
                best.sort_by(compare_trajectories);
                best.truncate(params.results_per_pixel);
                row_results.push(best);
            }
            Some(row_results)
        };

        let rows: Option<Vec<Vec<Vec<Trajectory>>>> = if h >= PARALLEL_ROW_THRESHOLD {
            (0..h).into_par_iter().map(compute_row).collect()
        } else {
            (0..h).map(compute_row).collect()
        };

        match rows {
            Some(rows) => Ok(rows.into_iter().flatten().collect()),
            None => Err(KbmodError::Cancelled),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn score_candidate(
    psi_phi: &PsiPhi,
    epochs: &[f64],
    x0: i32,
    y0: i32,
    vx: f64,
    vy: f64,
    params: &SearchParams,
    psi_buf: &mut [f32],
    phi_buf: &mut [f32],
    valid_buf: &mut [bool],
) -> Option<Trajectory> {
    let n = epochs.len();

    for i in 0..n {
        let x = (x0 as f64 + vx * epochs[i]).round() as isize;
        let y = (y0 as f64 + vy * epochs[i]).round() as isize;
        match psi_phi.sample(i, x, y) {
            Some((psi, phi)) => {
                psi_buf[i] = psi;
                phi_buf[i] = phi;
                valid_buf[i] = true;
            }
            None => {
                psi_buf[i] = 0.0;
                phi_buf[i] = 0.0;
                valid_buf[i] = false;
            }
        }
    }

    if let Some(sigma_g) = &params.sigma_g {
        let ratios: Vec<f32> = (0..n)
            .filter(|&i| valid_buf[i])
            .map(|i| psi_buf[i] / phi_buf[i].sqrt())
            .collect();
        if !ratios.is_empty() {
            let clip_mask = sigma_g_clip_mask(&ratios, sigma_g);
            let mut clip_iter = clip_mask.into_iter();
            for valid in valid_buf.iter_mut() {
                if *valid {
                    let keep = clip_iter.next().unwrap_or(true);
                    if !keep {
                        *valid = false;
                    }
                }
            }
        }
    }

    let mut sum_psi = 0.0f32;
    let mut sum_phi = 0.0f32;
    let mut count = 0u32;
    for i in 0..n {
        if valid_buf[i] {
            sum_psi += psi_buf[i];
            sum_phi += phi_buf[i];
            count += 1;
        }
    }

    if count as usize < params.num_obs || sum_phi <= 0.0 {
        return None;
    }

    let likelihood = sum_psi / sum_phi.sqrt();
    if likelihood <= 0.0 || likelihood > params.max_lh {
        return None;
    }

    let flux = sum_psi / sum_phi;

    Some(Trajectory {
        x0,
        y0,
        vx,
        vy,
        flux,
        likelihood,
        obs_count: count,
        obs_valid: valid_buf.to_vec(),
        stamp: None,
        psi_samples: psi_buf.to_vec(),
        phi_samples: phi_buf.to_vec(),
    })
}

/// Stage boundaries reported by [`run_search`], one `tracing::info!` event
/// and one `on_stage` callback invocation per stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchStage {
    BuildingPsiPhi,
    Searching,
    FilteringSigmaG,
    FilteringStamps,
    Clustering,
    Done,
}

/// Run the full pipeline: psi/phi construction, grid search, sigma-G
/// filtering, stamp filtering, and clustering, wiring C4 through C9 in
/// sequence (spec's top-level orchestration).
pub fn run_search(
    stack: &ImageStack,
    psf: &Psf,
    config: &SearchConfig,
    backend: &dyn SearchBackend,
    cancel: &CancelToken,
    mut on_stage: impl FnMut(SearchStage),
) -> Result<ResultList> {
    config.validate()?;

    on_stage(SearchStage::BuildingPsiPhi);
    tracing::info!("building psi/phi images");
    let psi_phi = PsiPhi::build(stack, psf);
    let epochs = stack.epoch_offsets();

    let grid = TrajectoryGrid::new(
        config.average_angle,
        config.angle_minus,
        config.angle_plus,
        config.n_angle,
        config.v_min,
        config.v_max,
        config.n_speed,
    );

    on_stage(SearchStage::Searching);
    tracing::info!(n_velocities = grid.len(), "running grid search");
    let search_params = SearchParams {
        num_obs: config.num_obs,
        max_lh: config.max_lh,
        results_per_pixel: config.results_per_pixel,
        sigma_g: config
            .gpu_filter
            .then(|| SigmaGParams::new(config.sigma_g_lims.0, config.sigma_g_lims.1)),
    };
    let per_pixel = backend.search(&psi_phi, &epochs, grid.velocities(), &search_params, cancel)?;
    let mut results = ResultList::from_vec(per_pixel.into_iter().flatten().collect());
    tracing::info!(n_candidates = results.len(), "grid search complete");

    if config.do_sigma_g {
        on_stage(SearchStage::FilteringSigmaG);
        tracing::info!("applying sigma-G result filter");
        let filter_params = FilterParams {
            sigma_g: SigmaGParams::new(config.sigma_g_lims.0, config.sigma_g_lims.1),
            num_obs: config.num_obs,
            lh_level: config.lh_level,
        };
        filter_results(&mut results, &filter_params);
        tracing::info!(n_survivors = results.len(), "sigma-G filter complete");
    }

    if config.do_stamp_filter {
        on_stage(SearchStage::FilteringStamps);
        tracing::info!("applying postage-stamp shape filter");
        let stamp_type = config.stamp_type()?;
        let stamp_params = StampFilterParams {
            peak_offset: config.peak_offset,
            mom_lims: config.mom_lims,
            center_thresh: config.center_thresh,
        };
        for traj in results.iter_mut() {
            traj.stamp = Some(build_stamp(traj, stack, config.stamp_radius, stamp_type));
        }
        results.retain(|traj| {
            stamp_passes(traj.stamp.as_ref().expect("stamp set above"), &stamp_params)
        });
        tracing::info!(n_survivors = results.len(), "stamp filter complete");
    }

    if config.do_clustering {
        on_stage(SearchStage::Clustering);
        tracing::info!("clustering surviving trajectories");
        let cluster_params = ClusterParams {
            width: stack.width() as f64,
            height: stack.height() as f64,
            v_max: config.v_max,
            duration_days: stack.duration_days(),
        };
        cluster_trajectories(
            &mut results,
            config.cluster_feature()?,
            config.cluster_eps,
            config.cluster_min_samples,
            &cluster_params,
        );
        tracing::info!(n_clusters = results.len(), "clustering complete");
    }

    on_stage(SearchStage::Done);
    Ok(results)
}
