//! `MatrixApi` over the client-server HTTP API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use spaceconvert_core::config::MatrixConfig;
use spaceconvert_core::error::{ConfigError, CoreError, MatrixError, MatrixResult};
use spaceconvert_core::{
    CreateSpace, EventId, GroupId, GroupMember, GroupProfile, GroupRoom, MatrixApi, Result,
    RoomAlias, RoomId, UserId,
};

use crate::sync::SyncResponse;

const CLIENT_V3: [&str; 3] = ["_matrix", "client", "v3"];
/// Communities were never stabilised, so they only exist under r0
const CLIENT_R0: [&str; 3] = ["_matrix", "client", "r0"];

const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

pub fn spaceconvert_reqwest_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("spaceconvert/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
}

/// Authenticated connection to one homeserver
#[derive(Clone)]
pub struct MatrixClient {
    http: reqwest::Client,
    homeserver: Url,
    access_token: String,
    request_timeout: Duration,
    max_rate_limit_retries: u32,
}

impl std::fmt::Debug for MatrixClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixClient")
            .field("homeserver", &self.homeserver.as_str())
            .field("access_token", &"<redacted>")
            .field("max_rate_limit_retries", &self.max_rate_limit_retries)
            .finish()
    }
}

impl MatrixClient {
    pub fn new(
        homeserver_url: &str,
        access_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let invalid = |reason: String| CoreError::ConfigurationError {
            config_path: "matrix".to_string(),
            field: "homeserver_url".to_string(),
            expected: "an absolute http(s) URL".to_string(),
            cause: ConfigError::InvalidValue {
                field: "homeserver_url".to_string(),
                reason,
            },
        };

        let homeserver = Url::parse(homeserver_url).map_err(|e| invalid(e.to_string()))?;
        if homeserver.cannot_be_a_base() || !matches!(homeserver.scheme(), "http" | "https") {
            return Err(invalid(format!("{homeserver_url} is not an http(s) URL")));
        }

        let http = spaceconvert_reqwest_client(request_timeout)
            .map_err(|e| MatrixError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            homeserver,
            access_token: access_token.into(),
            request_timeout,
            max_rate_limit_retries: 3,
        })
    }

    pub fn from_config(config: &MatrixConfig) -> Result<Self> {
        let token = config.access_token.as_deref().unwrap_or_default();
        if token.is_empty() {
            return Err(CoreError::missing_config("matrix.access_token", "matrix"));
        }
        Ok(Self::new(
            &config.homeserver_url,
            token,
            Duration::from_secs(config.request_timeout_secs),
        )?
        .with_max_rate_limit_retries(config.max_rate_limit_retries))
    }

    pub fn with_max_rate_limit_retries(mut self, retries: u32) -> Self {
        self.max_rate_limit_retries = retries;
        self
    }

    pub fn homeserver(&self) -> &Url {
        &self.homeserver
    }

    /// Build `<homeserver>/<prefix>/<segments>`, percent-encoding each segment
    pub(crate) fn endpoint(&self, prefix: &[&str], segments: &[&str]) -> MatrixResult<Url> {
        let mut url = self.homeserver.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                MatrixError::Transport(format!("{} cannot be a base URL", self.homeserver))
            })?;
            path.pop_if_empty().extend(prefix).extend(segments);
        }
        Ok(url)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        timeout: Option<Duration>,
    ) -> MatrixResult<T> {
        let mut attempt = 0;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&self.access_token);
            if let Some(body) = &body {
                request = request.json(body);
            }
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            let response = request
                .send()
                .await
                .map_err(|e| MatrixError::Transport(e.to_string()))?;
            let status = response.status();

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| MatrixError::Decode(e.to_string()));
            }

            let text = response.text().await.unwrap_or_default();
            let error = classify_error(status.as_u16(), &text);
            match retry_delay(&error, attempt, self.max_rate_limit_retries) {
                Some(delay) => {
                    attempt += 1;
                    warn!(
                        path = url.path(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    debug!(method = %method, path = url.path(), status = status.as_u16(), "Request failed: {}", error);
                    return Err(error);
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> MatrixResult<T> {
        self.request(Method::GET, url, None, None).await
    }

    async fn put<T: DeserializeOwned>(&self, url: Url, body: Value) -> MatrixResult<T> {
        self.request(Method::PUT, url, Some(body), None).await
    }

    async fn post<T: DeserializeOwned>(&self, url: Url, body: Value) -> MatrixResult<T> {
        self.request(Method::POST, url, Some(body), None).await
    }

    /// One `/sync` request. `timeout` is the server-side long-poll duration.
    pub async fn sync(
        &self,
        since: Option<&str>,
        timeout: Duration,
        filter: Option<&str>,
    ) -> MatrixResult<SyncResponse> {
        let mut url = self.endpoint(&CLIENT_V3, &["sync"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &timeout.as_millis().to_string());
            if let Some(since) = since {
                query.append_pair("since", since);
            }
            if let Some(filter) = filter {
                query.append_pair("filter", filter);
            }
        }
        self.request(
            Method::GET,
            url,
            None,
            Some(timeout + self.request_timeout),
        )
        .await
    }

    async fn send_event(
        &self,
        room: &RoomId,
        event_type: &str,
        content: Value,
    ) -> MatrixResult<EventId> {
        let txn_id = new_txn_id();
        let url = self.endpoint(
            &CLIENT_V3,
            &["rooms", room.as_str(), "send", event_type, &txn_id],
        )?;
        let response: EventIdResponse = self.put(url, content).await?;
        response.event_id()
    }
}

fn new_txn_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errcode: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    retry_after_ms: Option<u64>,
}

/// How long to wait before retrying after `error`, or `None` to give up.
/// Only rate limiting is retried, at most `max_retries` times.
pub(crate) fn retry_delay(error: &MatrixError, attempt: u32, max_retries: u32) -> Option<Duration> {
    match error {
        MatrixError::RateLimited { retry_after_ms } if attempt < max_retries => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Map a non-success response to a `MatrixError`
pub(crate) fn classify_error(status: u16, body: &str) -> MatrixError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let (errcode, message, retry_after_ms) = match parsed {
        Some(body) => (body.errcode, body.error, body.retry_after_ms),
        None => (None, None, None),
    };
    let message = message.unwrap_or_else(|| body.trim().to_string());

    match (status, errcode.as_deref()) {
        (429, _) | (_, Some("M_LIMIT_EXCEEDED")) => MatrixError::RateLimited {
            retry_after_ms: retry_after_ms.unwrap_or(DEFAULT_RETRY_AFTER_MS),
        },
        // a 404 with another errcode (M_UNRECOGNIZED) is an unsupported endpoint
        (404, None) | (_, Some("M_NOT_FOUND")) => MatrixError::NotFound { message },
        (403, _) | (_, Some("M_FORBIDDEN")) => MatrixError::Forbidden { message },
        _ => MatrixError::Api {
            status,
            errcode: errcode.unwrap_or_else(|| "M_UNKNOWN".to_string()),
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct EventIdResponse {
    event_id: String,
}

impl EventIdResponse {
    fn event_id(self) -> MatrixResult<EventId> {
        EventId::parse(self.event_id).map_err(|e| MatrixError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct RoomIdResponse {
    room_id: String,
}

impl RoomIdResponse {
    fn room_id(self) -> MatrixResult<RoomId> {
        RoomId::parse(self.room_id).map_err(|e| MatrixError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct DisplayNameResponse {
    #[serde(default)]
    displayname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JoinedGroupsResponse {
    #[serde(default)]
    groups: Vec<GroupId>,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse<T> {
    #[serde(default = "Vec::new")]
    chunk: Vec<T>,
}

/// `/createRoom` body for a space owned by `request.owners`
pub(crate) fn create_space_body(request: &CreateSpace) -> Value {
    let users: serde_json::Map<String, Value> = request
        .owners
        .iter()
        .map(|owner| (owner.to_string(), json!(100)))
        .collect();

    let (preset, visibility, history) = if request.is_public {
        ("public_chat", "public", "world_readable")
    } else {
        ("private_chat", "private", "shared")
    };

    json!({
        "name": request.name,
        "topic": request.topic,
        "preset": preset,
        "visibility": visibility,
        "creation_content": { "type": "m.space" },
        "initial_state": [{
            "type": "m.room.history_visibility",
            "state_key": "",
            "content": { "history_visibility": history }
        }],
        "power_level_content_override": {
            "ban": 100,
            "events_default": 50,
            "invite": 50,
            "kick": 100,
            "notifications": { "room": 100 },
            "redact": 100,
            "state_default": 100,
            "users": users,
            "users_default": 0
        }
    })
}

#[async_trait]
impl MatrixApi for MatrixClient {
    async fn whoami(&self) -> MatrixResult<UserId> {
        let url = self.endpoint(&CLIENT_V3, &["account", "whoami"])?;
        let response: WhoamiResponse = self.get(url).await?;
        UserId::parse(response.user_id).map_err(|e| MatrixError::Decode(e.to_string()))
    }

    async fn display_name(&self, user: &UserId) -> MatrixResult<Option<String>> {
        let url = self.endpoint(&CLIENT_V3, &["profile", user.as_str(), "displayname"])?;
        match self.get::<DisplayNameResponse>(url).await {
            Ok(response) => Ok(response.displayname),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send_message(&self, room: &RoomId, content: Value) -> MatrixResult<EventId> {
        self.send_event(room, "m.room.message", content).await
    }

    async fn send_reaction(
        &self,
        room: &RoomId,
        event: &EventId,
        key: &str,
    ) -> MatrixResult<EventId> {
        let content = json!({
            "m.relates_to": {
                "rel_type": "m.annotation",
                "event_id": event,
                "key": key
            }
        });
        self.send_event(room, "m.reaction", content).await
    }

    async fn redact(&self, room: &RoomId, event: &EventId) -> MatrixResult<()> {
        let txn_id = new_txn_id();
        let url = self.endpoint(
            &CLIENT_V3,
            &["rooms", room.as_str(), "redact", event.as_str(), &txn_id],
        )?;
        let _: Value = self.put(url, json!({})).await?;
        Ok(())
    }

    async fn resolve_alias(&self, alias: &RoomAlias) -> MatrixResult<Option<RoomId>> {
        let url = self.endpoint(&CLIENT_V3, &["directory", "room", alias.as_str()])?;
        match self.get::<RoomIdResponse>(url).await {
            Ok(response) => response.room_id().map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_alias(&self, alias: &RoomAlias, room: &RoomId) -> MatrixResult<()> {
        let url = self.endpoint(&CLIENT_V3, &["directory", "room", alias.as_str()])?;
        let _: Value = self.put(url, json!({ "room_id": room })).await?;
        Ok(())
    }

    async fn joined_groups(&self) -> MatrixResult<Vec<GroupId>> {
        let url = self.endpoint(&CLIENT_R0, &["joined_groups"])?;
        let response: JoinedGroupsResponse = self.get(url).await?;
        Ok(response.groups)
    }

    async fn join_group(&self, group: &GroupId) -> MatrixResult<()> {
        let url = self.endpoint(&CLIENT_R0, &["groups", group.as_str(), "self", "join"])?;
        let _: Value = self.put(url, json!({})).await?;
        Ok(())
    }

    async fn accept_group_invite(&self, group: &GroupId) -> MatrixResult<()> {
        let url = self.endpoint(
            &CLIENT_R0,
            &["groups", group.as_str(), "self", "accept_invite"],
        )?;
        let _: Value = self.put(url, json!({})).await?;
        Ok(())
    }

    async fn group_profile(&self, group: &GroupId) -> MatrixResult<GroupProfile> {
        let url = self.endpoint(&CLIENT_R0, &["groups", group.as_str(), "profile"])?;
        self.get(url).await
    }

    async fn group_users(&self, group: &GroupId) -> MatrixResult<Vec<GroupMember>> {
        let url = self.endpoint(&CLIENT_R0, &["groups", group.as_str(), "users"])?;
        let response: ChunkResponse<GroupMember> = self.get(url).await?;
        Ok(response.chunk)
    }

    async fn group_rooms(&self, group: &GroupId) -> MatrixResult<Vec<GroupRoom>> {
        let url = self.endpoint(&CLIENT_R0, &["groups", group.as_str(), "rooms"])?;
        let response: ChunkResponse<GroupRoom> = self.get(url).await?;
        Ok(response.chunk)
    }

    async fn create_space(&self, request: &CreateSpace) -> MatrixResult<RoomId> {
        let url = self.endpoint(&CLIENT_V3, &["createRoom"])?;
        let response: RoomIdResponse = self.post(url, create_space_body(request)).await?;
        response.room_id()
    }

    async fn get_state(
        &self,
        room: &RoomId,
        event_type: &str,
        state_key: &str,
    ) -> MatrixResult<Value> {
        let url = self.endpoint(
            &CLIENT_V3,
            &["rooms", room.as_str(), "state", event_type, state_key],
        )?;
        self.get(url).await
    }

    async fn send_state(
        &self,
        room: &RoomId,
        event_type: &str,
        state_key: &str,
        content: Value,
    ) -> MatrixResult<EventId> {
        let url = self.endpoint(
            &CLIENT_V3,
            &["rooms", room.as_str(), "state", event_type, state_key],
        )?;
        let response: EventIdResponse = self.put(url, content).await?;
        response.event_id()
    }

    async fn invite(&self, room: &RoomId, user: &UserId) -> MatrixResult<()> {
        let url = self.endpoint(&CLIENT_V3, &["rooms", room.as_str(), "invite"])?;
        let _: Value = self.post(url, json!({ "user_id": user })).await?;
        Ok(())
    }

    async fn join_room(&self, room: &RoomId) -> MatrixResult<RoomId> {
        let url = self.endpoint(&CLIENT_V3, &["join", room.as_str()])?;
        let response: RoomIdResponse = self.post(url, json!({})).await?;
        response.room_id()
    }
}
