use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use kbmod_core::config::SearchConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Config file to validate; prints resolved defaults if omitted
    #[arg(long)]
    pub validate: Option<PathBuf>,
}

/// Load (and optionally validate) a search configuration, printing any
/// unrecognized keys and the fully resolved value set.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = match &args.validate {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            SearchConfig::from_toml(&text)?
        }
        None => SearchConfig::default(),
    };

    config.validate()?;

    if !config.extra.is_empty() {
        println!("Unrecognized keys (ignored):");
        for key in config.extra.keys() {
            println!("  - {key}");
        }
        println!();
    }

    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
