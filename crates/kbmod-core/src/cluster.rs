//! Deduplicate near-identical trajectories via DBSCAN.

use crate::result_list::{compare_trajectories, ResultList};

/// Noise label used by [`dbscan`] for points with too few neighbors.
pub const NOISE: i32 = -1;

/// A minimal DBSCAN over `D`-dimensional points, using a naive O(n^2)
/// neighbor query (candidate counts here are bounded by the per-pixel
/// top-R-per-pixel cap applied upstream, so this is not the dominant
/// cost of a search).
/// Returns one cluster label per point; `NOISE` for unclustered points.
pub fn dbscan<const D: usize>(points: &[[f64; D]], eps: f64, min_samples: usize) -> Vec<i32> {
    let n = points.len();
    let mut labels = vec![NOISE; n];
    let mut visited = vec![false; n];
    let mut next_label = 0i32;

    let neighbors = |i: usize| -> Vec<usize> {
        (0..n)
            .filter(|&j| j != i && distance(&points[i], &points[j]) <= eps)
            .collect()
    };

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seeds = neighbors(i);
        if seeds.len() + 1 < min_samples {
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[i] = label;

        let mut stack = seeds;
        while let Some(j) = stack.pop() {
            if !visited[j] {
                visited[j] = true;
                let j_neighbors = neighbors(j);
                if j_neighbors.len() + 1 >= min_samples {
                    stack.extend(j_neighbors.into_iter().filter(|&k| !visited[k]));
                }
            }
            if labels[j] == NOISE {
                labels[j] = label;
            }
        }
    }

    labels
}

fn distance<const D: usize>(a: &[f64; D], b: &[f64; D]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Which coordinates identify "the same object" for clustering purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterFeature {
    /// `(x0, y0, vx, vy)`.
    All,
    /// `(x0, y0)` only — groups trajectories regardless of velocity.
    Position,
    /// Position at the stack's midpoint epoch, `(x0 + vx*T/2, y0 + vy*T/2)`.
    MidPosition,
}

/// Normalization context for [`feature_vector`]: spec.md §4.8's feature
/// vectors are scaled by image size and max speed so `eps` is compared on
/// a roughly `[0, 1]` scale, independent of image resolution.
#[derive(Clone, Copy, Debug)]
pub struct ClusterParams {
    pub width: f64,
    pub height: f64,
    pub v_max: f64,
    pub duration_days: f64,
}

fn feature_vector(
    traj: &crate::trajectory::Trajectory,
    feature: ClusterFeature,
    params: &ClusterParams,
) -> [f64; 4] {
    let v_max = if params.v_max > 0.0 { params.v_max } else { 1.0 };
    match feature {
        ClusterFeature::All => [
            traj.x0 as f64 / params.width,
            traj.y0 as f64 / params.height,
            traj.vx / v_max,
            traj.vy / v_max,
        ],
        ClusterFeature::Position => [traj.x0 as f64 / params.width, traj.y0 as f64 / params.height, 0.0, 0.0],
        ClusterFeature::MidPosition => {
            let (mx, my) = traj.position_at(params.duration_days / 2.0);
            [mx / params.width, my / params.height, 0.0, 0.0]
        }
    }
}

/// Cluster `results` by `feature` and keep only the highest-likelihood
/// trajectory per cluster, dropping the rest in place. Noise points (too
/// isolated to form a cluster) are all kept, matching DBSCAN's convention
/// that noise is not deduplicated against other noise.
pub fn cluster_trajectories(
    results: &mut ResultList,
    feature: ClusterFeature,
    eps: f64,
    min_samples: usize,
    params: &ClusterParams,
) {
    let trajectories = results.as_slice().to_vec();
    if trajectories.is_empty() {
        return;
    }

    let points: Vec<[f64; 4]> = trajectories
        .iter()
        .map(|t| feature_vector(t, feature, params))
        .collect();
    let labels = dbscan(&points, eps, min_samples);

    let mut kept: Vec<usize> = Vec::new();
    let mut best_per_cluster: std::collections::HashMap<i32, usize> = std::collections::HashMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        if label == NOISE {
            kept.push(idx);
            continue;
        }
        match best_per_cluster.get(&label) {
            Some(&current_best) => {
                if compare_trajectories(&trajectories[idx], &trajectories[current_best])
                    == std::cmp::Ordering::Less
                {
                    best_per_cluster.insert(label, idx);
                }
            }
            None => {
                best_per_cluster.insert(label, idx);
            }
        }
    }
    kept.extend(best_per_cluster.values().copied());

    let survivors: Vec<_> = kept.into_iter().map(|i| trajectories[i].clone()).collect();
    *results = ResultList::from_vec(survivors);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbscan_groups_close_points_and_flags_noise() {
        let points: Vec<[f64; 2]> = vec![[0.0, 0.0], [0.5, 0.0], [0.0, 0.5], [50.0, 50.0]];
        let labels = dbscan(&points, 1.0, 3);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], NOISE);
    }

    #[test]
    fn dbscan_respects_min_samples() {
        let points: Vec<[f64; 2]> = vec![[0.0, 0.0], [0.2, 0.0]];
        let labels = dbscan(&points, 1.0, 5);
        assert!(labels.iter().all(|&l| l == NOISE));
    }

    fn traj(x0: i32, vx: f64, likelihood: f32) -> crate::trajectory::Trajectory {
        crate::trajectory::Trajectory {
            x0,
            y0: 0,
            vx,
            vy: 0.0,
            flux: 0.0,
            likelihood,
            obs_count: 10,
            obs_valid: vec![true; 10],
            stamp: None,
            psi_samples: vec![0.0; 10],
            phi_samples: vec![0.0; 10],
        }
    }

    #[test]
    fn keeps_only_best_likelihood_per_cluster() {
        let mut results = ResultList::from_vec(vec![
            traj(10, 1.0, 5.0),
            traj(11, 1.0, 9.0),
            traj(12, 1.0, 7.0),
            traj(200, 1.0, 3.0),
        ]);
        let params = ClusterParams {
            width: 100.0,
            height: 100.0,
            v_max: 1.0,
            duration_days: 10.0,
        };
        cluster_trajectories(&mut results, ClusterFeature::Position, 0.03, 2, &params);
        let xs: Vec<i32> = results.iter().map(|t| t.x0).collect();
        assert!(xs.contains(&11));
        assert!(!xs.contains(&10));
        assert!(!xs.contains(&12));
        assert!(xs.contains(&200));
    }
}
