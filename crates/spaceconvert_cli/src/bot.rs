//! Wiring for `spaceconvert run`

use std::sync::Arc;

use miette::Result;
use tracing::info;

use spaceconvert_core::{BotIdentity, CommandHandler, MatrixApi, SpaceConvertConfig};
use spaceconvert_matrix::{MatrixClient, SyncLoop};

pub fn connect(config: &SpaceConvertConfig) -> Result<Arc<MatrixClient>> {
    config.require_access_token()?;
    let client = MatrixClient::from_config(&config.matrix)?;
    Ok(Arc::new(client))
}

/// Resolve the bot's identity, then sync until ctrl-c
pub async fn run(config: &SpaceConvertConfig) -> Result<()> {
    let client = connect(config)?;
    let api: Arc<dyn MatrixApi> = client.clone();

    let identity = BotIdentity::resolve(api.as_ref()).await?;
    info!(
        user_id = %identity.user_id(),
        display_name = identity.display_name().unwrap_or_default(),
        homeserver = %client.homeserver(),
        "Starting spaceconvert"
    );

    let handler = CommandHandler::new(api, Arc::new(identity), &config.bot.command_prefix);
    let sync = SyncLoop::new(client, handler, &config.bot);

    sync.run(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received ctrl-c, shutting down");
    })
    .await?;

    Ok(())
}
