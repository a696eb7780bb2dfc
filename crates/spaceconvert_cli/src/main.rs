mod bot;
mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing::info;

use spaceconvert_core::config::{self, SpaceConvertConfig};

#[derive(Parser)]
#[command(name = "spaceconvert")]
#[command(about = "Matrix bot that turns legacy communities into spaces")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the homeserver and answer commands until interrupted
    Run,
    /// Show which account the access token belongs to
    Whoami,
    /// Configuration management
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration (access token hidden)
    Show,
    /// Write a default configuration file
    Init {
        /// Path to write the configuration to
        #[arg(default_value = "spaceconvert.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

async fn load_config(path: Option<&PathBuf>) -> Result<SpaceConvertConfig> {
    let mut config = match path {
        Some(path) => config::load_config(path).await?,
        None => config::load_config_from_standard_locations().await?,
    };
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate("environment")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .rgb_colors(miette::RgbColors::Preferred)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))?;
    miette::set_panic_hook();
    let cli = Cli::parse();

    // `config init` must work before any config exists
    if let Commands::Config {
        cmd: ConfigCommands::Init { path, force },
    } = &cli.command
    {
        return commands::config::init(path, *force).await;
    }

    let config = load_config(cli.config.as_ref()).await?;
    let _guard = logging::init(&config.logging, cli.debug);

    match &cli.config {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => info!("Loaded config from standard locations"),
    }

    match cli.command {
        Commands::Run => bot::run(&config).await,
        Commands::Whoami => commands::whoami::whoami(&config).await,
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => commands::config::show(&config),
            ConfigCommands::Init { .. } => Ok(()),
        },
    }
}
