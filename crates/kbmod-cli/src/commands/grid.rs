use anyhow::Result;
use clap::Args;
use kbmod_core::trajectory_grid::TrajectoryGrid;

#[derive(Args)]
pub struct GridArgs {
    #[arg(long, default_value = "0.0")]
    pub center_angle: f64,
    #[arg(long, default_value = "0.3927")]
    pub dtheta_minus: f64,
    #[arg(long, default_value = "0.3927")]
    pub dtheta_plus: f64,
    #[arg(long, default_value = "20")]
    pub n_angle: usize,
    #[arg(long, default_value = "0.0")]
    pub v_min: f64,
    #[arg(long, default_value = "20.0")]
    pub v_max: f64,
    #[arg(long, default_value = "20")]
    pub n_speed: usize,
}

/// Materialize a trajectory grid and print its size plus a few samples
/// (debugging aid).
pub fn run(args: &GridArgs) -> Result<()> {
    let grid = TrajectoryGrid::new(
        args.center_angle,
        args.dtheta_minus,
        args.dtheta_plus,
        args.n_angle,
        args.v_min,
        args.v_max,
        args.n_speed,
    );

    println!("Trajectory grid: {} velocities ({} angles x {} speeds)", grid.len(), args.n_angle, args.n_speed);
    for &(vx, vy) in grid.velocities().iter().take(5) {
        println!("  vx={vx:.4} vy={vy:.4} (speed={:.4})", (vx * vx + vy * vy).sqrt());
    }
    if grid.len() > 5 {
        println!("  ... {} more", grid.len() - 5);
    }
    Ok(())
}
