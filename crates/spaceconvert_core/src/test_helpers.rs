#![cfg(test)]

pub mod matrix {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{Value, json};

    use crate::api::{
        CreateSpace, GroupMember, GroupProfile, GroupRoom, MatrixApi, POWER_LEVELS_EVENT,
    };
    use crate::error::{MatrixError, MatrixResult};
    use crate::id::{EventId, GroupId, RoomAlias, RoomId, UserId};

    /// One recorded call against the mock, in the order it happened.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        SendMessage {
            room: RoomId,
            content: Value,
        },
        SendReaction {
            room: RoomId,
            event: EventId,
            key: String,
        },
        Redact {
            room: RoomId,
            event: EventId,
        },
        ResolveAlias(RoomAlias),
        CreateAlias {
            alias: RoomAlias,
            room: RoomId,
        },
        JoinedGroups,
        JoinGroup(GroupId),
        AcceptGroupInvite(GroupId),
        GroupProfile(GroupId),
        GroupUsers(GroupId),
        GroupRooms(GroupId),
        CreateSpace(CreateSpace),
        GetState {
            room: RoomId,
            event_type: String,
            state_key: String,
        },
        SendState {
            room: RoomId,
            event_type: String,
            state_key: String,
            content: Value,
        },
        Invite {
            room: RoomId,
            user: UserId,
        },
        JoinRoom(RoomId),
    }

    impl Call {
        pub fn name(&self) -> &'static str {
            match self {
                Call::SendMessage { .. } => "send_message",
                Call::SendReaction { .. } => "send_reaction",
                Call::Redact { .. } => "redact",
                Call::ResolveAlias(_) => "resolve_alias",
                Call::CreateAlias { .. } => "create_alias",
                Call::JoinedGroups => "joined_groups",
                Call::JoinGroup(_) => "join_group",
                Call::AcceptGroupInvite(_) => "accept_group_invite",
                Call::GroupProfile(_) => "group_profile",
                Call::GroupUsers(_) => "group_users",
                Call::GroupRooms(_) => "group_rooms",
                Call::CreateSpace(_) => "create_space",
                Call::GetState { .. } => "get_state",
                Call::SendState { .. } => "send_state",
                Call::Invite { .. } => "invite",
                Call::JoinRoom(_) => "join_room",
            }
        }
    }

    /// Remote state of one community
    #[derive(Debug, Clone, Default)]
    pub struct MockGroup {
        pub profile: GroupProfile,
        pub members: Vec<GroupMember>,
        pub rooms: Vec<GroupRoom>,
    }

    impl MockGroup {
        pub fn new(name: &str) -> Self {
            Self {
                profile: GroupProfile {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            }
        }

        pub fn admin(mut self, user: &str) -> Self {
            self.members.push(GroupMember {
                user_id: UserId::parse(user).unwrap(),
                is_privileged: true,
            });
            self
        }

        pub fn member(mut self, user: &str) -> Self {
            self.members.push(GroupMember {
                user_id: UserId::parse(user).unwrap(),
                is_privileged: false,
            });
            self
        }

        pub fn room(mut self, room_id: &str, canonical_alias: Option<&str>) -> Self {
            self.rooms.push(GroupRoom {
                room_id: RoomId::parse(room_id).unwrap(),
                canonical_alias: canonical_alias.map(str::to_string),
            });
            self
        }
    }

    #[derive(Debug, Default)]
    struct MockState {
        calls: Vec<Call>,
        aliases: HashMap<RoomAlias, RoomId>,
        joined_groups: Vec<GroupId>,
        room_state: HashMap<(RoomId, String, String), Value>,
        next_id: u64,
    }

    impl MockState {
        fn next(&mut self) -> u64 {
            self.next_id += 1;
            self.next_id
        }
    }

    /// In-memory homeserver that records every call.
    ///
    /// Communities are configured up front; the mock then behaves like a
    /// server would: aliases resolve once registered, joins succeed only for
    /// open or invited communities, state events are stored per room.
    #[derive(Debug)]
    pub struct MockMatrix {
        user_id: UserId,
        display_name: Option<String>,
        groups: HashMap<GroupId, MockGroup>,
        open_groups: HashSet<GroupId>,
        invited_groups: HashSet<GroupId>,
        failures: HashMap<&'static str, MatrixError>,
        state: Mutex<MockState>,
    }

    impl MockMatrix {
        pub fn new(user_id: &str) -> Self {
            Self {
                user_id: UserId::parse(user_id).unwrap(),
                display_name: None,
                groups: HashMap::new(),
                open_groups: HashSet::new(),
                invited_groups: HashSet::new(),
                failures: HashMap::new(),
                state: Mutex::new(MockState::default()),
            }
        }

        pub fn with_display_name(mut self, name: &str) -> Self {
            self.display_name = Some(name.to_string());
            self
        }

        pub fn with_group(mut self, group: &str, data: MockGroup) -> Self {
            self.groups.insert(GroupId::parse(group).unwrap(), data);
            self
        }

        /// The bot is already a member of `group`
        pub fn joined(self, group: &str) -> Self {
            self.state
                .lock()
                .unwrap()
                .joined_groups
                .push(GroupId::parse(group).unwrap());
            self
        }

        /// Direct joins to `group` succeed
        pub fn open(mut self, group: &str) -> Self {
            self.open_groups.insert(GroupId::parse(group).unwrap());
            self
        }

        /// The bot has a pending invite to `group`
        pub fn invited(mut self, group: &str) -> Self {
            self.invited_groups.insert(GroupId::parse(group).unwrap());
            self
        }

        pub fn with_alias(self, alias: &str, room: &str) -> Self {
            self.state.lock().unwrap().aliases.insert(
                RoomAlias::parse(alias).unwrap(),
                RoomId::parse(room).unwrap(),
            );
            self
        }

        /// Every call of `operation` fails with `error`
        pub fn fail_on(mut self, operation: &'static str, error: MatrixError) -> Self {
            self.failures.insert(operation, error);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn count(&self, operation: &str) -> usize {
            self.calls()
                .iter()
                .filter(|call| call.name() == operation)
                .count()
        }

        /// Index of the first recorded call matching `predicate`
        pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
            self.calls().iter().position(predicate)
        }

        pub fn state_event(&self, room: &RoomId, event_type: &str, state_key: &str) -> Option<Value> {
            self.state
                .lock()
                .unwrap()
                .room_state
                .get(&(room.clone(), event_type.to_string(), state_key.to_string()))
                .cloned()
        }

        pub fn resolve(&self, alias: &str) -> Option<RoomId> {
            self.state
                .lock()
                .unwrap()
                .aliases
                .get(&RoomAlias::parse(alias).unwrap())
                .cloned()
        }

        fn record(&self, call: Call) -> MatrixResult<()> {
            let name = call.name();
            self.state.lock().unwrap().calls.push(call);
            match self.failures.get(name) {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }

        fn group(&self, group: &GroupId) -> MatrixResult<&MockGroup> {
            self.groups.get(group).ok_or_else(|| MatrixError::NotFound {
                message: format!("Group {group} not found"),
            })
        }

        fn new_event_id(&self, prefix: &str) -> EventId {
            let n = self.state.lock().unwrap().next();
            EventId::parse(format!("${prefix}{n}")).unwrap()
        }
    }

    #[async_trait]
    impl MatrixApi for MockMatrix {
        async fn whoami(&self) -> MatrixResult<UserId> {
            Ok(self.user_id.clone())
        }

        async fn display_name(&self, _user: &UserId) -> MatrixResult<Option<String>> {
            match self.failures.get("display_name") {
                Some(error) => Err(error.clone()),
                None => Ok(self.display_name.clone()),
            }
        }

        async fn send_message(&self, room: &RoomId, content: Value) -> MatrixResult<EventId> {
            self.record(Call::SendMessage {
                room: room.clone(),
                content,
            })?;
            Ok(self.new_event_id("message"))
        }

        async fn send_reaction(
            &self,
            room: &RoomId,
            event: &EventId,
            key: &str,
        ) -> MatrixResult<EventId> {
            self.record(Call::SendReaction {
                room: room.clone(),
                event: event.clone(),
                key: key.to_string(),
            })?;
            Ok(self.new_event_id("reaction"))
        }

        async fn redact(&self, room: &RoomId, event: &EventId) -> MatrixResult<()> {
            self.record(Call::Redact {
                room: room.clone(),
                event: event.clone(),
            })
        }

        async fn resolve_alias(&self, alias: &RoomAlias) -> MatrixResult<Option<RoomId>> {
            self.record(Call::ResolveAlias(alias.clone()))?;
            Ok(self.state.lock().unwrap().aliases.get(alias).cloned())
        }

        async fn create_alias(&self, alias: &RoomAlias, room: &RoomId) -> MatrixResult<()> {
            self.record(Call::CreateAlias {
                alias: alias.clone(),
                room: room.clone(),
            })?;
            let mut state = self.state.lock().unwrap();
            if state.aliases.contains_key(alias) {
                return Err(MatrixError::Api {
                    status: 409,
                    errcode: "M_UNKNOWN".to_string(),
                    message: "Room alias already exists".to_string(),
                });
            }
            state.aliases.insert(alias.clone(), room.clone());
            Ok(())
        }

        async fn joined_groups(&self) -> MatrixResult<Vec<GroupId>> {
            self.record(Call::JoinedGroups)?;
            Ok(self.state.lock().unwrap().joined_groups.clone())
        }

        async fn join_group(&self, group: &GroupId) -> MatrixResult<()> {
            self.record(Call::JoinGroup(group.clone()))?;
            if !self.open_groups.contains(group) {
                return Err(MatrixError::Forbidden {
                    message: "Group is not joinable".to_string(),
                });
            }
            self.state.lock().unwrap().joined_groups.push(group.clone());
            Ok(())
        }

        async fn accept_group_invite(&self, group: &GroupId) -> MatrixResult<()> {
            self.record(Call::AcceptGroupInvite(group.clone()))?;
            if !self.invited_groups.contains(group) {
                return Err(MatrixError::Forbidden {
                    message: "No pending invite".to_string(),
                });
            }
            self.state.lock().unwrap().joined_groups.push(group.clone());
            Ok(())
        }

        async fn group_profile(&self, group: &GroupId) -> MatrixResult<GroupProfile> {
            self.record(Call::GroupProfile(group.clone()))?;
            Ok(self.group(group)?.profile.clone())
        }

        async fn group_users(&self, group: &GroupId) -> MatrixResult<Vec<GroupMember>> {
            self.record(Call::GroupUsers(group.clone()))?;
            Ok(self.group(group)?.members.clone())
        }

        async fn group_rooms(&self, group: &GroupId) -> MatrixResult<Vec<GroupRoom>> {
            self.record(Call::GroupRooms(group.clone()))?;
            Ok(self.group(group)?.rooms.clone())
        }

        async fn create_space(&self, request: &CreateSpace) -> MatrixResult<RoomId> {
            self.record(Call::CreateSpace(request.clone()))?;
            let mut state = self.state.lock().unwrap();
            let n = state.next();
            let room = RoomId::parse(format!("!space{n}:{}", self.user_id.server_name())).unwrap();

            let users: serde_json::Map<String, Value> = request
                .owners
                .iter()
                .map(|owner| (owner.to_string(), json!(100)))
                .collect();
            state.room_state.insert(
                (room.clone(), POWER_LEVELS_EVENT.to_string(), String::new()),
                json!({
                    "ban": 50,
                    "events_default": 0,
                    "state_default": 50,
                    "users": users,
                    "users_default": 0
                }),
            );
            Ok(room)
        }

        async fn get_state(
            &self,
            room: &RoomId,
            event_type: &str,
            state_key: &str,
        ) -> MatrixResult<Value> {
            self.record(Call::GetState {
                room: room.clone(),
                event_type: event_type.to_string(),
                state_key: state_key.to_string(),
            })?;
            self.state_event(room, event_type, state_key)
                .ok_or_else(|| MatrixError::NotFound {
                    message: format!("No {event_type} state in {room}"),
                })
        }

        async fn send_state(
            &self,
            room: &RoomId,
            event_type: &str,
            state_key: &str,
            content: Value,
        ) -> MatrixResult<EventId> {
            self.record(Call::SendState {
                room: room.clone(),
                event_type: event_type.to_string(),
                state_key: state_key.to_string(),
                content: content.clone(),
            })?;
            self.state.lock().unwrap().room_state.insert(
                (room.clone(), event_type.to_string(), state_key.to_string()),
                content,
            );
            Ok(self.new_event_id("state"))
        }

        async fn invite(&self, room: &RoomId, user: &UserId) -> MatrixResult<()> {
            self.record(Call::Invite {
                room: room.clone(),
                user: user.clone(),
            })
        }

        async fn join_room(&self, room: &RoomId) -> MatrixResult<RoomId> {
            self.record(Call::JoinRoom(room.clone()))?;
            Ok(room.clone())
        }
    }
}
