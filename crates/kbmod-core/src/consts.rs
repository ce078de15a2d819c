/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum number of start-pixel rows to use row-level Rayon parallelism in
/// the search kernel. Below this, the sequential path avoids thread-pool
/// dispatch overhead for small stacks and unit tests.
pub const PARALLEL_ROW_THRESHOLD: usize = 32;

/// Minimum exposure count to use exposure-level Rayon parallelism when
/// building psi/phi images.
pub const PARALLEL_FRAME_THRESHOLD: usize = 4;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// Default number of trajectories retained per start pixel by the search
/// kernel (R).
pub const DEFAULT_RESULTS_PER_PIXEL: usize = 8;

/// Default sigma-G clipping percentile band (25th/75th).
pub const DEFAULT_SIGMA_G_LIMS: (f64, f64) = (25.0, 75.0);
