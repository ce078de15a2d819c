use anyhow::Result;
use clap::Args;
use kbmod_core::psf::Psf;

#[derive(Args)]
pub struct PsfArgs {
    /// Gaussian width, in pixels
    #[arg(long, default_value = "1.4")]
    pub sigma: f32,
}

/// Build a Gaussian PSF and print its kernel (sanity-check tool).
pub fn run(args: &PsfArgs) -> Result<()> {
    let psf = Psf::gaussian(args.sigma);
    println!("PSF: sigma={:.3}, side={}", args.sigma, psf.side());
    for row in psf.as_array().rows() {
        let line: Vec<String> = row.iter().map(|v| format!("{v:.4}")).collect();
        println!("{}", line.join(" "));
    }
    let sum: f32 = psf.as_array().iter().sum();
    println!("\nsum = {sum:.6}");
    Ok(())
}
