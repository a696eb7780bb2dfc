//! Long-polling `/sync` loop that feeds room messages to the command handler

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use spaceconvert_core::config::BotConfig;
use spaceconvert_core::{
    CommandHandler, EventId, IncomingMessage, MatrixApi, Result, RoomId, UserId,
};

use crate::client::MatrixClient;

const MESSAGE_EVENT: &str = "m.room.message";
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Only the `next_batch` token matters on the first sync
const INITIAL_SYNC_FILTER: &str = r#"{"room":{"timeline":{"limit":1}}}"#;

#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: SyncRooms,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRooms {
    #[serde(default)]
    pub join: HashMap<RoomId, JoinedRoom>,
    #[serde(default)]
    pub invite: HashMap<RoomId, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub unsigned: Value,
}

impl RawEvent {
    /// `None` for anything that is not a well-formed `m.room.message`
    pub fn to_message(&self) -> Option<IncomingMessage> {
        if self.event_type != MESSAGE_EVENT {
            return None;
        }
        let event_id = EventId::parse(self.event_id.clone()?).ok()?;
        let sender = UserId::parse(self.sender.clone()?).ok()?;
        let text = |key: &str| {
            self.content
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Some(IncomingMessage {
            event_id,
            sender,
            msgtype: text("msgtype"),
            body: text("body"),
            redacted: self.unsigned.get("redacted_because").is_some(),
        })
    }
}

impl SyncResponse {
    /// Room messages in timeline order, per joined room
    pub fn messages(&self) -> Vec<(RoomId, IncomingMessage)> {
        self.rooms
            .join
            .iter()
            .flat_map(|(room_id, room)| {
                room.timeline
                    .events
                    .iter()
                    .filter_map(RawEvent::to_message)
                    .map(move |message| (room_id.clone(), message))
            })
            .collect()
    }

    pub fn invited_rooms(&self) -> Vec<RoomId> {
        self.rooms.invite.keys().cloned().collect()
    }
}

/// Handler tasks that have not finished yet
#[derive(Default)]
pub struct InFlight {
    tasks: JoinSet<()>,
}

impl InFlight {
    pub fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks.spawn(task);
    }

    /// Drop the bookkeeping for tasks that already finished
    pub fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join_error(result);
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task to finish
    pub async fn drain(&mut self) {
        if !self.tasks.is_empty() {
            info!(pending = self.tasks.len(), "Waiting for in-flight commands");
        }
        while let Some(result) = self.tasks.join_next().await {
            log_join_error(result);
        }
    }
}

fn log_join_error(result: std::result::Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Command task failed");
    }
}

/// Invited rooms worth trying, skipping ones that already failed to join
pub fn invites_to_join(response: &SyncResponse, failed: &HashSet<RoomId>) -> Vec<RoomId> {
    response
        .invited_rooms()
        .into_iter()
        .filter(|room_id| !failed.contains(room_id))
        .collect()
}

pub struct SyncLoop {
    client: Arc<MatrixClient>,
    handler: CommandHandler,
    timeout: Duration,
    auto_join_invites: bool,
    in_flight: InFlight,
    failed_invites: HashSet<RoomId>,
}

impl SyncLoop {
    pub fn new(client: Arc<MatrixClient>, handler: CommandHandler, config: &BotConfig) -> Self {
        Self {
            client,
            handler,
            timeout: Duration::from_secs(config.sync_timeout_secs),
            auto_join_invites: config.auto_join_invites,
            in_flight: InFlight::default(),
            failed_invites: HashSet::new(),
        }
    }

    /// Sync until `shutdown` resolves, then wait for running commands.
    ///
    /// Messages already in the room history when the bot starts are skipped.
    /// Each new message is handled on its own task so one slow conversion
    /// does not hold up the others.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        let initial = tokio::select! {
            _ = &mut shutdown => return Ok(()),
            initial = self.client.sync(None, Duration::ZERO, Some(INITIAL_SYNC_FILTER)) => initial?,
        };
        self.join_invites(&initial).await;
        let mut since = initial.next_batch;
        info!(user_id = %self.handler.identity().user_id(), "Listening for commands");

        let mut backoff = INITIAL_BACKOFF;
        loop {
            self.in_flight.reap();
            let client = self.client.clone();
            let result = tokio::select! {
                _ = &mut shutdown => break,
                result = client.sync(Some(&since), self.timeout, None) => result,
            };

            match result {
                Ok(response) => {
                    backoff = INITIAL_BACKOFF;
                    self.join_invites(&response).await;
                    self.dispatch(&response);
                    since = response.next_batch;
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "Sync failed, backing off");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        self.in_flight.drain().await;
        info!("Sync loop stopped");
        Ok(())
    }

    fn dispatch(&mut self, response: &SyncResponse) {
        for (room_id, message) in response.messages() {
            debug!(room_id = %room_id, event_id = %message.event_id, "Dispatching message");
            let handler = self.handler.clone();
            self.in_flight.spawn(async move {
                handler.handle_message(&room_id, &message).await;
            });
        }
    }

    async fn join_invites(&mut self, response: &SyncResponse) {
        if !self.auto_join_invites {
            return;
        }
        for room_id in invites_to_join(response, &self.failed_invites) {
            match self.client.join_room(&room_id).await {
                Ok(joined) => info!(room_id = %joined, "Joined room after invite"),
                Err(e) => {
                    error!(room_id = %room_id, error = %e, "Failed to join invited room, not retrying");
                    self.failed_invites.insert(room_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn response(value: Value) -> SyncResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_messages_from_joined_rooms() {
        let sync = response(json!({
            "next_batch": "s72595_4483_1934",
            "rooms": {
                "join": {
                    "!chat:example.org": {
                        "timeline": {
                            "events": [
                                {
                                    "type": "m.room.message",
                                    "event_id": "$first",
                                    "sender": "@alice:example.org",
                                    "content": { "msgtype": "m.text", "body": "!convert +g:example.org" }
                                },
                                {
                                    "type": "m.room.member",
                                    "event_id": "$member",
                                    "sender": "@bob:example.org",
                                    "state_key": "@bob:example.org",
                                    "content": { "membership": "join" }
                                },
                                {
                                    "type": "m.room.message",
                                    "event_id": "$second",
                                    "sender": "@bob:example.org",
                                    "content": {},
                                    "unsigned": { "redacted_because": { "type": "m.room.redaction" } }
                                }
                            ]
                        }
                    }
                }
            }
        }));

        let messages = sync.messages();
        assert_eq!(messages.len(), 2);

        let (room, first) = &messages[0];
        assert_eq!(room.as_str(), "!chat:example.org");
        assert_eq!(first.event_id.as_str(), "$first");
        assert_eq!(first.msgtype, "m.text");
        assert_eq!(first.body, "!convert +g:example.org");
        assert!(!first.redacted);

        let (_, second) = &messages[1];
        assert!(second.redacted);
        assert_eq!(second.body, "");
    }

    #[test]
    fn test_malformed_events_are_skipped() {
        let event: RawEvent = serde_json::from_value(json!({
            "type": "m.room.message",
            "sender": "not-a-user",
            "event_id": "$x",
            "content": { "msgtype": "m.text", "body": "hi" }
        }))
        .unwrap();
        assert!(event.to_message().is_none());

        let event: RawEvent = serde_json::from_value(json!({
            "type": "m.room.message",
            "sender": "@alice:example.org",
            "content": { "msgtype": "m.text", "body": "hi" }
        }))
        .unwrap();
        assert!(event.to_message().is_none());
    }

    #[test]
    fn test_minimal_response_and_invites() {
        let sync = response(json!({ "next_batch": "s1" }));
        assert!(sync.messages().is_empty());
        assert!(sync.invited_rooms().is_empty());

        let sync = response(json!({
            "next_batch": "s2",
            "rooms": { "invite": { "!new:example.org": { "invite_state": { "events": [] } } } }
        }));
        assert_eq!(
            sync.invited_rooms(),
            vec![RoomId::parse("!new:example.org").unwrap()]
        );
    }

    #[tokio::test]
    async fn test_drain_waits_for_running_commands() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let finished = Arc::new(AtomicBool::new(false));
        let mut in_flight = InFlight::default();
        let flag = finished.clone();
        in_flight.spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(in_flight.len(), 1);

        in_flight.drain().await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_reap_drops_finished_tasks_only() {
        let mut in_flight = InFlight::default();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        in_flight.spawn(async {});
        in_flight.spawn(async move {
            let _ = gate.await;
        });

        // let the first task complete
        tokio::time::sleep(Duration::from_millis(20)).await;
        in_flight.reap();
        assert_eq!(in_flight.len(), 1);

        let _ = release.send(());
        in_flight.drain().await;
        assert!(in_flight.is_empty());
    }

    #[test]
    fn test_failed_invites_are_not_retried() {
        let sync = response(json!({
            "next_batch": "s3",
            "rooms": { "invite": {
                "!broken:example.org": {},
                "!fresh:example.org": {}
            } }
        }));
        let failed: HashSet<RoomId> = [RoomId::parse("!broken:example.org").unwrap()]
            .into_iter()
            .collect();

        assert_eq!(
            invites_to_join(&sync, &failed),
            vec![RoomId::parse("!fresh:example.org").unwrap()]
        );
        assert_eq!(invites_to_join(&sync, &HashSet::new()).len(), 2);
    }
}
