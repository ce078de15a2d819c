use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use kbmod_core::cancel::CancelToken;
use kbmod_core::config::SearchConfig;
use kbmod_core::image::ImageLayer;
use kbmod_core::image_stack::ImageStack;
use kbmod_core::psf::Psf;
use kbmod_core::search::{run_search, CpuSearchBackend, SearchStage};
use ndarray::Array2;
use serde::Deserialize;

#[derive(Args)]
pub struct RunArgs {
    /// Search configuration (TOML)
    pub config: PathBuf,

    /// Exposure manifest (TOML); see module docs for the format
    #[arg(long)]
    pub manifest: PathBuf,

    /// Number of ranked results to print
    #[arg(long, default_value = "10")]
    pub top: usize,
}

/// A lightweight stand-in for a FITS-backed exposure list: each entry names
/// a raw little-endian f32 science/variance file of `width x height`
/// pixels, row-major. This is a demonstration/testing format only — real
/// astronomical I/O is out of scope here.
#[derive(Deserialize)]
struct Manifest {
    width: usize,
    height: usize,
    exposures: Vec<ManifestExposure>,
}

#[derive(Deserialize)]
struct ManifestExposure {
    mjd: f64,
    science: PathBuf,
    variance: PathBuf,
}

fn read_f32_grid(path: &Path, width: usize, height: usize) -> Result<Array2<f32>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let expected = width * height * 4;
    if bytes.len() != expected {
        anyhow::bail!(
            "{}: expected {expected} bytes for a {width}x{height} f32 grid, found {}",
            path.display(),
            bytes.len()
        );
    }
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Array2::from_shape_vec((height, width), values).context("grid shape mismatch")
}

fn load_stack(manifest_path: &Path) -> Result<ImageStack> {
    let text = std::fs::read_to_string(manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    let manifest: Manifest = toml::from_str(&text).context("invalid manifest")?;

    let mut layers = Vec::with_capacity(manifest.exposures.len());
    for exposure in &manifest.exposures {
        let science = read_f32_grid(&exposure.science, manifest.width, manifest.height)?;
        let variance = read_f32_grid(&exposure.variance, manifest.width, manifest.height)?;
        let mask = Array2::from_elem((manifest.height, manifest.width), true);
        layers.push(ImageLayer::new(science, variance, mask, exposure.mjd)?);
    }
    Ok(ImageStack::new(layers)?)
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config_text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let config = SearchConfig::from_toml(&config_text)?;
    config.validate()?;

    let mut stack = load_stack(&args.manifest)?;
    if config.do_mask {
        stack.apply_global_mask(config.mask_num_images);
        if config.mask_grow > 0 {
            stack.grow_mask(config.mask_grow);
        }
    }
    let psf = Psf::gaussian(config.psf_sigma.max(0.1));
    let backend = CpuSearchBackend;
    let cancel = CancelToken::new();

    println!("{}", style("kbmod search").bold());
    println!("  exposures: {}", stack.len());
    println!("  dimensions: {}x{}", stack.width(), stack.height());
    println!();

    let pb = ProgressBar::new(5);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:24} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );

    let results = run_search(&stack, &psf, &config, &backend, &cancel, |stage| {
        pb.set_message(stage_label(stage));
        pb.set_position(stage_index(stage));
    })?;
    pb.finish_with_message("done");

    println!("\n{}", style(format!("{} trajectories found", results.len())).green());
    for (rank, traj) in results.iter().take(args.top).enumerate() {
        println!(
            "  {:>3}. x0=({:>4},{:>4}) v=({:>7.3},{:>7.3}) lh={:>8.3} n_obs={:>3} flux={:>8.3}",
            rank + 1,
            traj.x0,
            traj.y0,
            traj.vx,
            traj.vy,
            traj.likelihood,
            traj.obs_count,
            traj.flux,
        );
    }

    Ok(())
}

fn stage_label(stage: SearchStage) -> &'static str {
    match stage {
        SearchStage::BuildingPsiPhi => "building psi/phi",
        SearchStage::Searching => "grid search",
        SearchStage::FilteringSigmaG => "sigma-G filter",
        SearchStage::FilteringStamps => "stamp filter",
        SearchStage::Clustering => "clustering",
        SearchStage::Done => "done",
    }
}

fn stage_index(stage: SearchStage) -> u64 {
    match stage {
        SearchStage::BuildingPsiPhi => 0,
        SearchStage::Searching => 1,
        SearchStage::FilteringSigmaG => 2,
        SearchStage::FilteringStamps => 3,
        SearchStage::Clustering => 4,
        SearchStage::Done => 5,
    }
}
