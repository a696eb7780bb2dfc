use std::sync::Arc;

use miette::Result;
use owo_colors::OwoColorize;
use spaceconvert_core::{BotIdentity, CommandMatcher, MatrixApi, SpaceConvertConfig};

use crate::bot::connect;

/// Print the account behind the access token and the prefixes it answers to
pub async fn whoami(config: &SpaceConvertConfig) -> Result<()> {
    let client = connect(config)?;
    let api: Arc<dyn MatrixApi> = client.clone();
    let identity = BotIdentity::resolve(api.as_ref()).await?;
    let matcher = CommandMatcher::new(&config.bot.command_prefix, &identity);

    println!("{:<14} {}", "Homeserver:".bold(), client.homeserver());
    println!("{:<14} {}", "User:".bold(), identity.user_id().bright_cyan());
    println!(
        "{:<14} {}",
        "Display name:".bold(),
        identity.display_name().unwrap_or("(none)")
    );
    println!("{}", "Answers to:".bold());
    for prefix in matcher.prefixes() {
        println!("  {prefix}");
    }
    Ok(())
}
