//! The bot's own identity, resolved once at startup.

use tracing::{info, warn};

use crate::api::MatrixApi;
use crate::error::Result;
use crate::id::UserId;

/// Immutable description of who the bot is.
///
/// Built once and shared by reference; nothing in the conversion flow
/// re-resolves the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    user_id: UserId,
    display_name: Option<String>,
}

impl BotIdentity {
    pub fn new(user_id: UserId, display_name: Option<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.filter(|name| !name.is_empty()),
        }
    }

    /// Ask the homeserver who we are.
    ///
    /// A failed profile lookup is not fatal: the bot simply won't answer to
    /// its display name.
    pub async fn resolve(api: &dyn MatrixApi) -> Result<Self> {
        let user_id = api.whoami().await?;

        let display_name = match api.display_name(&user_id).await {
            Ok(name) => name,
            Err(e) => {
                warn!(user_id = %user_id, "Could not fetch own profile: {}", e);
                None
            }
        };

        let identity = Self::new(user_id, display_name);
        info!(
            user_id = %identity.user_id,
            display_name = identity.display_name.as_deref().unwrap_or("<none>"),
            "Resolved bot identity"
        );
        Ok(identity)
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn localpart(&self) -> &str {
        self.user_id.localpart()
    }

    pub fn server_name(&self) -> &str {
        self.user_id.server_name()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }
}
