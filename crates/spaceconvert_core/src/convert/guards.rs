//! Preconditions checked before anything is created.
//!
//! Each guard answers with a [`Step`]: keep going, or stop with a specific
//! outcome for the user. Errors the guard does not anticipate propagate as
//! faults.

use tracing::{debug, info, warn};

use super::Outcome;
use crate::api::MatrixApi;
use crate::error::Result;
use crate::id::{GroupId, RoomAlias, UserId};

/// Result of one step in the conversion pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Continue(T),
    Stop(Outcome),
}

pub const SPACE_ALIAS_PREFIX: &str = "spaceconvert_";

/// `#spaceconvert_<group with ':' → '_'>:<server>`
pub fn space_alias(group: &GroupId, server_name: &str) -> Result<RoomAlias> {
    RoomAlias::parse(format!(
        "#{SPACE_ALIAS_PREFIX}{}:{server_name}",
        group.as_str().replace(':', "_")
    ))
}

/// Stop if a space already answers to `alias`.
pub async fn ensure_not_converted(api: &dyn MatrixApi, alias: &RoomAlias) -> Result<Step<()>> {
    match api.resolve_alias(alias).await? {
        Some(space) => {
            info!(alias = %alias, space = %space, "Community already converted");
            Ok(Step::Stop(Outcome::AlreadyConverted { space }))
        }
        None => {
            debug!(alias = %alias, "Alias not registered yet");
            Ok(Step::Continue(()))
        }
    }
}

/// Make sure the bot is in the community: join directly, then fall back to
/// accepting an invite.
pub async fn ensure_membership(api: &dyn MatrixApi, group: &GroupId) -> Result<Step<()>> {
    let joined = api.joined_groups().await?;
    if joined.contains(group) {
        debug!(group = %group, "Already a community member");
        return Ok(Step::Continue(()));
    }

    let join_error = match api.join_group(group).await {
        Ok(()) => {
            info!(group = %group, "Joined community");
            return Ok(Step::Continue(()));
        }
        Err(e) => e,
    };
    warn!(group = %group, "Could not join community: {}", join_error);

    match api.accept_group_invite(group).await {
        Ok(()) => {
            info!(group = %group, "Accepted community invite");
            Ok(Step::Continue(()))
        }
        Err(e) => {
            warn!(group = %group, "Could not accept community invite: {}", e);
            Ok(Step::Stop(Outcome::JoinFailed))
        }
    }
}

/// Stop unless `sender` is privileged in the community. Yields every
/// privileged member.
pub async fn ensure_admin(
    api: &dyn MatrixApi,
    group: &GroupId,
    sender: &UserId,
) -> Result<Step<Vec<UserId>>> {
    let admins: Vec<UserId> = api
        .group_users(group)
        .await?
        .into_iter()
        .filter(|member| member.is_privileged)
        .map(|member| member.user_id)
        .collect();

    if admins.contains(sender) {
        Ok(Step::Continue(admins))
    } else {
        info!(group = %group, sender = %sender, "Rejected conversion from non-admin");
        Ok(Step::Stop(Outcome::NotAdmin))
    }
}
