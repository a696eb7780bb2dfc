//! Community → space conversion
//!
//! One invocation runs the guards in [`guards`] and then builds the space:
//!
//! 1. fetch the community profile
//! 2. create the space (name, topic, visibility)
//! 3. copy the avatar
//! 4. attach every community room as a child
//! 5. promote every community admin to 100
//! 6. register the deterministic alias
//! 7. invite the admins
//! 8. demote the bot to 0
//! 9. react with a success marker
//!
//! The bot keeps power level 100 until step 8 because steps 3–7 need it.
//!
//! Nothing is locked between the alias lookup and the alias registration, so
//! two simultaneous invocations for one community can both create a space.

pub mod guards;
mod outcome;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::api::{
    ADMIN_POWER_LEVEL, AVATAR_EVENT, CreateSpace, DEFAULT_POWER_LEVEL, GroupRoom, MatrixApi,
    POWER_LEVELS_EVENT, PowerLevels, SPACE_CHILD_EVENT,
};
use crate::context::BotIdentity;
use crate::error::{CoreError, Result};
use crate::id::{EventId, GroupId, RoomAlias, RoomId, UserId};
use crate::progress::{ProgressMarker, SUCCESS_REACTION, clear_marker};

pub use guards::{Step, space_alias};
pub use outcome::{Outcome, Reply};

/// Unwrap a [`Step`], returning its outcome from the enclosing function on `Stop`.
macro_rules! proceed {
    ($step:expr) => {
        match $step.await? {
            Step::Continue(value) => value,
            Step::Stop(outcome) => return Ok(outcome),
        }
    };
}

/// The triggering message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub room_id: RoomId,
    pub event_id: EventId,
    pub sender: UserId,
}

pub struct Converter<'a> {
    api: &'a dyn MatrixApi,
    identity: &'a BotIdentity,
}

impl<'a> Converter<'a> {
    pub fn new(api: &'a dyn MatrixApi, identity: &'a BotIdentity) -> Self {
        Self { api, identity }
    }

    /// Convert `group`, never failing: faults are logged and become
    /// [`Outcome::Failed`]. The progress marker placed here is cleared on
    /// every path before returning.
    pub async fn run(&self, invocation: &Invocation, group: &GroupId) -> Outcome {
        let marker =
            ProgressMarker::start(self.api, &invocation.room_id, &invocation.event_id).await;

        let outcome = match self.convert(invocation, group).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    group = %group,
                    sender = %invocation.sender,
                    room_id = %invocation.room_id,
                    "Error converting community: {:?}",
                    miette::Report::new(e)
                );
                Outcome::Failed
            }
        };

        clear_marker(self.api, marker).await;
        outcome
    }

    /// An argument that is not a community id can never be joined. It goes
    /// through the same marker lifecycle as [`Converter::run`] and ends as
    /// [`Outcome::JoinFailed`].
    pub async fn run_unparseable(&self, invocation: &Invocation, argument: &str) -> Outcome {
        let marker =
            ProgressMarker::start(self.api, &invocation.room_id, &invocation.event_id).await;
        debug!(argument, sender = %invocation.sender, "Argument is not a community id");
        clear_marker(self.api, marker).await;
        Outcome::JoinFailed
    }

    async fn convert(&self, invocation: &Invocation, group: &GroupId) -> Result<Outcome> {
        let api = self.api;
        let alias = space_alias(group, self.identity.server_name())?;

        proceed!(guards::ensure_not_converted(api, &alias));
        proceed!(guards::ensure_membership(api, group));
        let admins = proceed!(guards::ensure_admin(api, group, &invocation.sender));

        info!(group = %group, sender = %invocation.sender, admins = admins.len(), "Converting community");

        let profile = api.group_profile(group).await?;
        let request = CreateSpace {
            name: profile
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("{}'s Space", invocation.sender)),
            topic: profile.short_description.unwrap_or_default(),
            is_public: profile.is_openly_joinable,
            owners: vec![self.identity.user_id().clone()],
        };
        let space = api.create_space(&request).await?;
        debug!(space = %space, name = %request.name, public = request.is_public, "Created space");

        if let Some(url) = profile.avatar_url.filter(|url| !url.is_empty()) {
            api.send_state(&space, AVATAR_EVENT, "", json!({ "url": url }))
                .await?;
        }

        let rooms = api.group_rooms(group).await?;
        for room in &rooms {
            let server = routing_server(room, &invocation.sender);
            api.send_state(
                &space,
                SPACE_CHILD_EVENT,
                room.room_id.as_str(),
                json!({ "via": [server] }),
            )
            .await?;
            debug!(space = %space, child = %room.room_id, via = %server, "Attached room");
        }

        let mut levels = self.power_levels(&space).await?;
        for admin in &admins {
            levels.set_user(admin, ADMIN_POWER_LEVEL);
        }
        self.write_power_levels(&space, &levels).await?;

        api.create_alias(&alias, &space).await?;

        for admin in admins.iter().filter(|a| *a != self.identity.user_id()) {
            api.invite(&space, admin).await?;
        }

        levels.set_user(self.identity.user_id(), DEFAULT_POWER_LEVEL);
        self.write_power_levels(&space, &levels).await?;

        if let Err(e) = api
            .send_reaction(&invocation.room_id, &invocation.event_id, SUCCESS_REACTION)
            .await
        {
            warn!(room_id = %invocation.room_id, "Could not add success marker: {}", e);
        }

        info!(group = %group, space = %space, alias = %alias, rooms = rooms.len(), "Community converted");
        Ok(Outcome::Converted { space, alias })
    }

    async fn power_levels(&self, space: &RoomId) -> Result<PowerLevels> {
        let content = self.api.get_state(space, POWER_LEVELS_EVENT, "").await?;
        serde_json::from_value(content).map_err(|e| CoreError::serialization("power levels", e))
    }

    async fn write_power_levels(&self, space: &RoomId, levels: &PowerLevels) -> Result<()> {
        let content =
            serde_json::to_value(levels).map_err(|e| CoreError::serialization("power levels", e))?;
        self.api
            .send_state(space, POWER_LEVELS_EVENT, "", content)
            .await?;
        Ok(())
    }
}

/// Server to route through for a child room: its canonical alias's server,
/// falling back to the invoking user's server.
pub fn routing_server(room: &GroupRoom, sender: &UserId) -> String {
    room.canonical_alias
        .as_deref()
        .and_then(|alias| RoomAlias::parse(alias).ok())
        .map(|alias| alias.server_name().to_string())
        .unwrap_or_else(|| sender.server_name().to_string())
}
