use std::path::Path;

use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use spaceconvert_core::config::{self, ENV_ACCESS_TOKEN, SpaceConvertConfig};

/// Show the effective configuration with the access token hidden
pub fn show(config: &SpaceConvertConfig) -> Result<()> {
    println!("{}", "Current Configuration".bold());
    println!();
    print!("{}", render(config)?);
    Ok(())
}

fn render(config: &SpaceConvertConfig) -> Result<String> {
    toml::to_string_pretty(&config.redacted()).into_diagnostic()
}

/// Write a default configuration file
pub async fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(miette::miette!(
            help = "Pass --force to overwrite it",
            "{} already exists",
            path.display()
        ));
    }

    config::save_config(&SpaceConvertConfig::default(), path).await?;

    println!(
        "{} Wrote default configuration to {}",
        "✓".green(),
        path.display()
    );
    println!();
    println!(
        "Set matrix.access_token in the file (or {}), then run:",
        ENV_ACCESS_TOKEN.bright_cyan()
    );
    println!(
        "  {} --config {} run",
        "spaceconvert".bright_green(),
        path.display()
    );
    Ok(())
}
