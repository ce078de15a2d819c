use kbmod_core::cancel::CancelToken;
use kbmod_core::cluster::{cluster_trajectories, ClusterFeature, ClusterParams};
use kbmod_core::config::SearchConfig;
use kbmod_core::image::ImageLayer;
use kbmod_core::image_stack::ImageStack;
use kbmod_core::psf::Psf;
use kbmod_core::result_list::ResultList;
use kbmod_core::search::{run_search, CpuSearchBackend, SearchBackend, SearchParams};
use ndarray::Array2;

fn blank_stack(n: usize, w: usize, h: usize) -> ImageStack {
    let layers = (0..n)
        .map(|i| {
            let science = Array2::<f32>::zeros((h, w));
            let variance = Array2::<f32>::from_elem((h, w), 1.0);
            let mask = Array2::<bool>::from_elem((h, w), true);
            ImageLayer::new(science, variance, mask, i as f64).unwrap()
        })
        .collect();
    ImageStack::new(layers).unwrap()
}

fn inject_trajectory(stack: &mut ImageStack, x0: f64, y0: f64, vx: f64, vy: f64, flux: f32) {
    let w = stack.width();
    let h = stack.height();
    for (i, layer) in stack.layers_mut().iter_mut().enumerate() {
        let x = (x0 + vx * i as f64).round() as isize;
        let y = (y0 + vy * i as f64).round() as isize;
        if x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h {
            layer.science[[y as usize, x as usize]] = flux;
        }
    }
}

fn default_velocity_grid() -> Vec<(f64, f64)> {
    let mut v = Vec::new();
    for vxi in -5..=15 {
        for vyi in -5..=15 {
            v.push((vxi as f64 / 10.0, vyi as f64 / 10.0));
        }
    }
    v
}

/// S1: a single injected source is recovered at (approximately) its true
/// position, velocity, and likelihood.
#[test]
fn s1_recovers_injected_point_source() {
    let mut stack = blank_stack(10, 51, 51);
    inject_trajectory(&mut stack, 25.0, 25.0, 1.0, 0.5, 100.0);
    let psf = Psf::gaussian(1.4);

    let psi_phi = kbmod_core::psi_phi::PsiPhi::build(&stack, &psf);
    let epochs = stack.epoch_offsets();
    let backend = CpuSearchBackend;
    let params = SearchParams {
        num_obs: 5,
        max_lh: 10_000.0,
        results_per_pixel: 4,
        sigma_g: None,
    };
    let cancel = CancelToken::new();
    let per_pixel = backend
        .search(&psi_phi, &epochs, &default_velocity_grid(), &params, &cancel)
        .unwrap();
    let results = ResultList::from_vec(per_pixel.into_iter().flatten().collect());

    let best = results.iter().next().expect("at least one candidate");
    assert_eq!((best.x0, best.y0), (25, 25));
    assert!((best.vx - 1.0).abs() < 0.11);
    assert!((best.vy - 0.5).abs() < 0.11);
    assert_eq!(best.obs_count, 10);

    let expected_lh = (100.0 * 10.0f32.sqrt())
        / (best.phi_samples.iter().sum::<f32>()).sqrt();
    assert!((best.likelihood - expected_lh).abs() / expected_lh < 0.3);
}

/// S2: masking one exposure entirely drops exactly one observation and
/// clears its validity bit, without otherwise disturbing the candidate.
#[test]
fn s2_fully_masked_exposure_drops_one_observation() {
    let mut stack = blank_stack(10, 51, 51);
    inject_trajectory(&mut stack, 25.0, 25.0, 1.0, 0.5, 100.0);
    for bit in stack.layers_mut()[5].mask.iter_mut() {
        *bit = false;
    }
    for px in stack.layers_mut()[5].science.iter_mut() {
        *px = f32::NAN;
    }
    let psf = Psf::gaussian(1.4);

    let psi_phi = kbmod_core::psi_phi::PsiPhi::build(&stack, &psf);
    let epochs = stack.epoch_offsets();
    let backend = CpuSearchBackend;
    let params = SearchParams {
        num_obs: 5,
        max_lh: 10_000.0,
        results_per_pixel: 1,
        sigma_g: None,
    };
    let cancel = CancelToken::new();
    let per_pixel = backend
        .search(&psi_phi, &epochs, &[(1.0, 0.5)], &params, &cancel)
        .unwrap();

    let idx = 25 * 51 + 25;
    let best = &per_pixel[idx][0];
    assert_eq!(best.obs_count, 9);
    assert!(!best.obs_valid[5]);
    assert!(best.obs_count_matches_bits());
}

/// S3: two trajectories separated in feature space by more than eps both
/// survive clustering; brought within eps, only the better one survives.
#[test]
fn s3_clustering_merges_only_within_eps() {
    let traj = |x0: i32, likelihood: f32| kbmod_core::trajectory::Trajectory {
        x0,
        y0: 0,
        vx: 1.0,
        vy: 0.0,
        flux: 0.0,
        likelihood,
        obs_count: 10,
        obs_valid: vec![true; 10],
        stamp: None,
        psi_samples: vec![0.0; 10],
        phi_samples: vec![0.0; 10],
    };

    let params = ClusterParams {
        width: 100.0,
        height: 100.0,
        v_max: 1.0,
        duration_days: 10.0,
    };

    let mut far = ResultList::from_vec(vec![traj(10, 8.0), traj(100, 9.0)]);
    cluster_trajectories(&mut far, ClusterFeature::Position, 0.05, 1, &params);
    assert_eq!(far.len(), 2);

    let mut close = ResultList::from_vec(vec![traj(10, 8.0), traj(12, 9.0)]);
    cluster_trajectories(&mut close, ClusterFeature::Position, 0.05, 1, &params);
    assert_eq!(close.len(), 1);
    assert_eq!(close.iter().next().unwrap().x0, 12);
}

/// S4: an all-zero stack yields no candidates once a positive likelihood
/// floor is required.
#[test]
fn s4_all_zero_stack_yields_no_results() {
    let stack = blank_stack(10, 31, 31);
    let psf = Psf::gaussian(1.4);
    let mut config = SearchConfig::from_toml(
        "num_obs = 1\n\
         n_angle = 3\n\
         n_speed = 3\n\
         v_max = 1.0\n",
    )
    .unwrap();
    config.do_stamp_filter = false;

    let backend = CpuSearchBackend;
    let cancel = CancelToken::new();
    let results = run_search(&stack, &psf, &config, &backend, &cancel, |_| {}).unwrap();
    assert!(results.is_empty());
}

/// S5: a trajectory that leaves the frame partway through the stack is
/// still ranked, with a truncated obs_count reflecting the in-bounds
/// observations only.
#[test]
fn s5_trajectory_leaving_frame_has_truncated_obs_count() {
    let mut stack = blank_stack(10, 21, 21);
    // starts near the right edge and exits around exposure 8
    inject_trajectory(&mut stack, 18.0, 10.0, 1.0, 0.0, 80.0);
    let psf = Psf::gaussian(1.2);

    let psi_phi = kbmod_core::psi_phi::PsiPhi::build(&stack, &psf);
    let epochs = stack.epoch_offsets();
    let backend = CpuSearchBackend;
    let params = SearchParams {
        num_obs: 3,
        max_lh: 10_000.0,
        results_per_pixel: 1,
        sigma_g: None,
    };
    let cancel = CancelToken::new();
    let per_pixel = backend
        .search(&psi_phi, &epochs, &[(1.0, 0.0)], &params, &cancel)
        .unwrap();

    let idx = 10 * 21 + 18;
    let best = &per_pixel[idx][0];
    assert!(best.obs_count < 10);
    assert!(best.obs_count >= 3);
}

/// S6: an unrecognized configuration key is captured rather than rejected,
/// and the search proceeds using defaults for everything else.
#[test]
fn s6_unknown_config_key_is_tolerated() {
    let config = SearchConfig::from_toml("not_a_real_option = true\nnum_obs = 3\n").unwrap();
    assert!(config.extra.contains_key("not_a_real_option"));
    assert_eq!(config.num_obs, 3);
    assert!(config.validate().is_ok());

    let stack = blank_stack(5, 15, 15);
    let psf = Psf::gaussian(1.0);
    let backend = CpuSearchBackend;
    let cancel = CancelToken::new();
    let mut config = config;
    config.do_stamp_filter = false;
    config.n_angle = 2;
    config.n_speed = 2;
    let result = run_search(&stack, &psf, &config, &backend, &cancel, |_| {});
    assert!(result.is_ok());
}
