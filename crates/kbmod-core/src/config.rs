//! Immutable search configuration, loadable from TOML.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cluster::ClusterFeature;
use crate::error::{KbmodError, Result};
use crate::stamp::StampType;

fn default_num_obs() -> usize {
    10
}
fn default_max_lh() -> f32 {
    f32::INFINITY
}
fn default_lh_level() -> f32 {
    0.0
}
fn default_results_per_pixel() -> usize {
    crate::consts::DEFAULT_RESULTS_PER_PIXEL
}
fn default_sigma_g_lims() -> (f64, f64) {
    crate::consts::DEFAULT_SIGMA_G_LIMS
}
fn default_center_angle() -> f64 {
    0.0
}
fn default_angle_range() -> f64 {
    std::f64::consts::PI / 8.0
}
fn default_n_angle() -> usize {
    20
}
fn default_v_max() -> f64 {
    20.0
}
fn default_n_speed() -> usize {
    20
}
fn default_stamp_radius() -> usize {
    10
}
fn default_stamp_type() -> String {
    "sum".to_string()
}
fn default_center_thresh() -> f64 {
    0.9
}
fn default_peak_offset() -> (f64, f64) {
    (2.0, 2.0)
}
fn default_mom_lims() -> [f64; 5] {
    [35.5, 35.5, 1.0, 0.8, 0.8]
}
fn default_cluster_type() -> String {
    "all".to_string()
}
fn default_cluster_eps() -> f64 {
    // normalized feature-space scale (x0/width, y0/height, vx/v_max,
    // vy/v_max all roughly in [0, 1]), not raw pixels.
    0.03
}
fn default_cluster_min_samples() -> usize {
    1
}
fn default_mask_num_images() -> usize {
    2
}
fn default_chunk_size() -> usize {
    1_000_000
}
fn default_encode_bytes() -> i32 {
    -1
}
fn default_true() -> bool {
    true
}

/// An immutable, serde-loadable search configuration. Every field has a
/// default so a mostly-empty TOML file is valid; unrecognized keys are
/// captured in `extra` and surfaced as warnings rather than a hard error.
///
/// Every key in this struct is one spec.md §6 names as part of the
/// "exhaustive recognized set." A handful are accepted here but not acted
/// on by this crate's search path, and are documented as such at their
/// field: `mask_*`/`flag_keys`/`repeated_flag_keys` describe a mask-bit
/// interpretation policy that is an external collaborator's concern (the
/// core only exposes the mechanical `ImageStack::global_mask`/`grow_mask`
/// operations, invoked by that collaborator); `encode_psi_bytes`/
/// `encode_phi_bytes`/`chunk_size` describe GPU device-memory management
/// for a SIMT backend this crate does not ship (see DESIGN.md).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// K: minimum surviving observations for a trajectory to be kept.
    #[serde(default = "default_num_obs")]
    pub num_obs: usize,
    /// L_max: cap that discards obviously-bad scores, applied in C6 and
    /// re-checked in C7.
    #[serde(default = "default_max_lh")]
    pub max_lh: f32,
    /// L_min: minimum reported likelihood, applied as a floor in C7.
    #[serde(default = "default_lh_level")]
    pub lh_level: f32,
    /// R: trajectories retained per start pixel by the grid search.
    #[serde(default = "default_results_per_pixel")]
    pub results_per_pixel: usize,

    #[serde(default = "default_true")]
    pub do_sigma_g: bool,
    #[serde(default = "default_sigma_g_lims")]
    pub sigma_g_lims: (f64, f64),
    /// Apply the sigma-G clip inside the C6 kernel (drop candidates before
    /// they are ever emitted) rather than as a post-hoc C7 pass.
    #[serde(default)]
    pub gpu_filter: bool,

    #[serde(default = "default_center_angle")]
    pub average_angle: f64,
    #[serde(default = "default_angle_range")]
    pub angle_minus: f64,
    #[serde(default = "default_angle_range")]
    pub angle_plus: f64,
    #[serde(default = "default_n_angle")]
    pub n_angle: usize,
    #[serde(default)]
    pub v_min: f64,
    #[serde(default = "default_v_max")]
    pub v_max: f64,
    #[serde(default = "default_n_speed")]
    pub n_speed: usize,

    #[serde(default = "default_true")]
    pub do_stamp_filter: bool,
    /// `stamp_type ∈ {sum, mean, median, cpp_median}`; unrecognized values
    /// fail validation rather than silently falling back.
    #[serde(default = "default_stamp_type")]
    pub stamp_type: String,
    #[serde(default = "default_stamp_radius")]
    pub stamp_radius: usize,
    #[serde(default = "default_center_thresh")]
    pub center_thresh: f64,
    #[serde(default = "default_peak_offset")]
    pub peak_offset: (f64, f64),
    #[serde(default = "default_mom_lims")]
    pub mom_lims: [f64; 5],

    #[serde(default = "default_true")]
    pub do_clustering: bool,
    /// `cluster_type ∈ {all, position, mid_position}`.
    #[serde(default = "default_cluster_type")]
    pub cluster_type: String,
    #[serde(default = "default_cluster_eps")]
    pub cluster_eps: f64,
    #[serde(default = "default_cluster_min_samples")]
    pub cluster_min_samples: usize,

    #[serde(default)]
    pub psf_sigma: f32,

    /// Whether the CLI's `run` command applies `ImageStack::global_mask`/
    /// `grow_mask` before building psi/phi. Mask *bit interpretation* (which
    /// raw mask bits are "bad") stays an external collaborator's concern
    /// per spec.md §1; this only toggles the mechanical min-count/grow
    /// pass this crate already implements in C3.
    #[serde(default)]
    pub do_mask: bool,
    #[serde(default = "default_mask_num_images")]
    pub mask_num_images: usize,
    #[serde(default)]
    pub mask_grow: usize,
    /// Reserved: per-bit rejection threshold for an external mask-bit
    /// interpreter. Not consumed by this crate.
    #[serde(default)]
    pub mask_threshold: f64,
    /// Reserved: maps named mask conditions to raw bit values for an
    /// external mask-bit interpreter. Not consumed by this crate.
    #[serde(default)]
    pub mask_bits_dict: HashMap<String, i64>,
    /// Reserved: which named mask conditions are treated as fatal by an
    /// external mask-bit interpreter. Not consumed by this crate.
    #[serde(default)]
    pub flag_keys: Vec<String>,
    /// Reserved: as `flag_keys`, but only rejects a pixel when the named
    /// condition repeats across `mask_num_images` exposures.
    #[serde(default)]
    pub repeated_flag_keys: Vec<String>,

    /// Reserved: GPU device-memory quantization for a SIMT backend this
    /// crate does not ship (`-1` disables; `1`/`2` select byte/u16
    /// encoding). `crate::psi_phi::ByteEncoding` implements the codec; the
    /// CPU backend samples full-precision `f32` directly and never
    /// consumes this field.
    #[serde(default = "default_encode_bytes")]
    pub encode_psi_bytes: i32,
    #[serde(default = "default_encode_bytes")]
    pub encode_phi_bytes: i32,
    /// Reserved: max candidates moved from device to host per batch, for a
    /// GPU backend this crate does not ship.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Unrecognized keys, captured rather than rejected.
    #[serde(flatten)]
    pub extra: HashMap<String, toml::Value>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        toml::from_str("").expect("defaults alone must parse")
    }
}

impl SearchConfig {
    /// Parse a config from TOML text, logging a warning for every
    /// unrecognized key rather than failing.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: SearchConfig =
            toml::from_str(text).map_err(|e| KbmodError::ConfigInvalid(e.to_string()))?;
        for key in config.extra.keys() {
            tracing::warn!(key = %key, "unrecognized configuration key");
        }
        Ok(config)
    }

    pub fn stamp_type(&self) -> Result<StampType> {
        match self.stamp_type.as_str() {
            "sum" => Ok(StampType::Sum),
            "mean" => Ok(StampType::Mean),
            "median" => Ok(StampType::Median),
            "cpp_median" => Ok(StampType::CppMedian),
            other => Err(KbmodError::ConfigInvalid(format!(
                "unrecognized stamp_type {other:?} (expected sum, mean, median, or cpp_median)"
            ))),
        }
    }

    pub fn cluster_feature(&self) -> Result<ClusterFeature> {
        match self.cluster_type.as_str() {
            "all" => Ok(ClusterFeature::All),
            "position" => Ok(ClusterFeature::Position),
            "mid_position" => Ok(ClusterFeature::MidPosition),
            other => Err(KbmodError::ConfigInvalid(format!(
                "unrecognized cluster_type {other:?} (expected all, position, or mid_position)"
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_angle == 0 || self.n_speed == 0 {
            return Err(KbmodError::ConfigInvalid(
                "n_angle and n_speed must be positive".into(),
            ));
        }
        if self.v_max < self.v_min {
            return Err(KbmodError::ConfigInvalid("v_max must be >= v_min".into()));
        }
        if self.lh_level > self.max_lh {
            return Err(KbmodError::ConfigInvalid(
                "lh_level must be <= max_lh".into(),
            ));
        }
        let (lo, hi) = self.sigma_g_lims;
        if !(0.0..100.0).contains(&lo) || !(0.0..=100.0).contains(&hi) || lo >= hi {
            return Err(KbmodError::ConfigInvalid(
                "sigma_g_lims must satisfy 0 <= lo < hi <= 100".into(),
            ));
        }
        if !matches!(self.encode_psi_bytes, -1 | 1 | 2) || !matches!(self.encode_phi_bytes, -1 | 1 | 2) {
            return Err(KbmodError::ConfigInvalid(
                "encode_psi_bytes/encode_phi_bytes must be -1, 1, or 2".into(),
            ));
        }
        self.stamp_type()?;
        self.cluster_feature()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_to_defaults() {
        let config = SearchConfig::from_toml("").unwrap();
        assert_eq!(config.num_obs, 10);
        assert_eq!(
            config.results_per_pixel,
            crate::consts::DEFAULT_RESULTS_PER_PIXEL
        );
        assert_eq!(config.lh_level, 0.0);
        assert_eq!(config.encode_psi_bytes, -1);
        assert!(config.extra.is_empty());
    }

    #[test]
    fn unknown_key_is_captured_not_rejected() {
        let config = SearchConfig::from_toml("mystery_field = 42\nnum_obs = 5\n").unwrap();
        assert_eq!(config.num_obs, 5);
        assert!(config.extra.contains_key("mystery_field"));
    }

    #[test]
    fn every_documented_key_is_recognized() {
        let text = "v_arr_v_min = 0.0\n"; // placeholder not a real key, sanity for flatten
        let config = SearchConfig::from_toml(text).unwrap();
        assert!(config.extra.contains_key("v_arr_v_min"));

        let text = "num_obs = 3\nlh_level = 1.0\nmax_lh = 1e6\nsigmaG_lims_placeholder = true\n\
             gpu_filter = true\nencode_psi_bytes = 1\nencode_phi_bytes = 2\nchunk_size = 10\n\
             do_stamp_filter = true\nstamp_type = \"median\"\nstamp_radius = 5\n\
             center_thresh = 0.5\npeak_offset = [1.0, 1.0]\nmom_lims = [1.0,1.0,1.0,1.0,1.0]\n\
             do_clustering = true\ncluster_type = \"position\"\ncluster_eps = 1.0\n\
             do_mask = true\nmask_num_images = 3\nmask_grow = 2\n";
        let config = SearchConfig::from_toml(text).unwrap();
        assert!(config.extra.contains_key("sigmaG_lims_placeholder"));
        assert_eq!(config.lh_level, 1.0);
        assert_eq!(config.encode_psi_bytes, 1);
        assert!(matches!(config.stamp_type().unwrap(), StampType::Median));
        assert!(matches!(
            config.cluster_feature().unwrap(),
            ClusterFeature::Position
        ));
    }

    #[test]
    fn validate_rejects_empty_angle_grid() {
        let mut config = SearchConfig::from_toml("").unwrap();
        config.n_angle = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_speed_range() {
        let mut config = SearchConfig::from_toml("").unwrap();
        config.v_min = 50.0;
        config.v_max = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_lh_level_above_max_lh() {
        let mut config = SearchConfig::from_toml("").unwrap();
        config.lh_level = 100.0;
        config.max_lh = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unrecognized_stamp_type() {
        let mut config = SearchConfig::from_toml("").unwrap();
        config.stamp_type = "bogus".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_byte_encoding() {
        let mut config = SearchConfig::from_toml("").unwrap();
        config.encode_psi_bytes = 7;
        assert!(config.validate().is_err());
    }
}
