//! The seam between the conversion logic and the homeserver.
//!
//! `MatrixApi` lists every remote capability the bot needs. The HTTP
//! implementation lives in `spaceconvert-matrix`; tests use the recording
//! mock in `test_helpers`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MatrixResult;
use crate::id::{EventId, GroupId, RoomAlias, RoomId, UserId};

pub const POWER_LEVELS_EVENT: &str = "m.room.power_levels";
pub const AVATAR_EVENT: &str = "m.room.avatar";
pub const SPACE_CHILD_EVENT: &str = "m.space.child";

/// Power level of an ordinary participant
pub const DEFAULT_POWER_LEVEL: i64 = 0;
/// Power level granting administrative control
pub const ADMIN_POWER_LEVEL: i64 = 100;

/// Profile of a legacy community
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_openly_joinable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: UserId,
    #[serde(default)]
    pub is_privileged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRoom {
    pub room_id: RoomId,
    #[serde(default)]
    pub canonical_alias: Option<String>,
}

/// Parameters for creating a space room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpace {
    pub name: String,
    pub topic: String,
    pub is_public: bool,
    /// Users given power level 100 at creation time (the bot itself).
    pub owners: Vec<UserId>,
}

/// `m.room.power_levels` content.
///
/// Only the users map is typed; every other field is carried through
/// untouched so rewriting the event does not drop server-set defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerLevels {
    #[serde(default)]
    pub users: BTreeMap<String, i64>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl PowerLevels {
    pub fn set_user(&mut self, user: &UserId, level: i64) {
        self.users.insert(user.to_string(), level);
    }

    pub fn user_level(&self, user: &UserId) -> i64 {
        self.users.get(user.as_str()).copied().unwrap_or_else(|| {
            self.other
                .get("users_default")
                .and_then(Value::as_i64)
                .unwrap_or(DEFAULT_POWER_LEVEL)
        })
    }
}

#[async_trait]
pub trait MatrixApi: Send + Sync {
    /// User id of the authenticated account
    async fn whoami(&self) -> MatrixResult<UserId>;

    async fn display_name(&self, user: &UserId) -> MatrixResult<Option<String>>;

    /// Send an `m.room.message` event with the given content
    async fn send_message(&self, room: &RoomId, content: Value) -> MatrixResult<EventId>;

    /// Annotate an event with a reaction
    async fn send_reaction(
        &self,
        room: &RoomId,
        event: &EventId,
        key: &str,
    ) -> MatrixResult<EventId>;

    async fn redact(&self, room: &RoomId, event: &EventId) -> MatrixResult<()>;

    /// Resolve an alias in the room directory. An unregistered alias is
    /// `Ok(None)`, not an error.
    async fn resolve_alias(&self, alias: &RoomAlias) -> MatrixResult<Option<RoomId>>;

    async fn create_alias(&self, alias: &RoomAlias, room: &RoomId) -> MatrixResult<()>;

    async fn joined_groups(&self) -> MatrixResult<Vec<GroupId>>;

    async fn join_group(&self, group: &GroupId) -> MatrixResult<()>;

    async fn accept_group_invite(&self, group: &GroupId) -> MatrixResult<()>;

    async fn group_profile(&self, group: &GroupId) -> MatrixResult<GroupProfile>;

    async fn group_users(&self, group: &GroupId) -> MatrixResult<Vec<GroupMember>>;

    async fn group_rooms(&self, group: &GroupId) -> MatrixResult<Vec<GroupRoom>>;

    async fn create_space(&self, request: &CreateSpace) -> MatrixResult<RoomId>;

    async fn get_state(
        &self,
        room: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> MatrixResult<Value>;

    async fn send_state(
        &self,
        room: &RoomId,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> MatrixResult<EventId>;

    async fn invite(&self, room: &RoomId, user: &UserId) -> MatrixResult<()>;

    async fn join_room(&self, room: &RoomId) -> MatrixResult<RoomId>;
}
