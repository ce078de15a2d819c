//! Shift-and-stack linear trajectory search over a stack of astronomical
//! exposures: ψ/φ likelihood construction, a grid search over linear
//! trajectories, robust result filtering, postage-stamp shape vetoing, and
//! clustering of near-duplicate detections.

pub mod cancel;
pub mod cluster;
pub mod config;
pub mod consts;
pub mod error;
pub mod filter;
pub mod image;
pub mod image_stack;
pub mod psf;
pub mod psi_phi;
pub mod result_list;
pub mod search;
pub mod sigma_g;
pub mod stamp;
pub mod trajectory;
pub mod trajectory_grid;

pub use error::{KbmodError, Result};
