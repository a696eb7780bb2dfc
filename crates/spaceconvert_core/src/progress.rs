//! Best-effort "work in progress" reaction on the triggering message

use tracing::{debug, warn};

use crate::api::MatrixApi;
use crate::id::{EventId, RoomId};

pub const PROGRESS_REACTION: &str = "In Progress";
pub const SUCCESS_REACTION: &str = "✅";

/// A placed progress reaction.
///
/// `clear` consumes the marker, so it can be removed at most once.
#[derive(Debug)]
#[must_use = "a placed progress marker should be cleared"]
pub struct ProgressMarker {
    room_id: RoomId,
    reaction_id: EventId,
}

impl ProgressMarker {
    /// React to `event`. Failures are logged and yield no marker.
    pub async fn start(api: &dyn MatrixApi, room_id: &RoomId, event: &EventId) -> Option<Self> {
        match api.send_reaction(room_id, event, PROGRESS_REACTION).await {
            Ok(reaction_id) => {
                debug!(room_id = %room_id, reaction_id = %reaction_id, "Placed progress marker");
                Some(Self {
                    room_id: room_id.clone(),
                    reaction_id,
                })
            }
            Err(e) => {
                warn!(room_id = %room_id, event_id = %event, "Could not place progress marker: {}", e);
                None
            }
        }
    }

    /// Redact the reaction. Failures are logged and otherwise ignored.
    pub async fn clear(self, api: &dyn MatrixApi) {
        if let Err(e) = api.redact(&self.room_id, &self.reaction_id).await {
            warn!(
                room_id = %self.room_id,
                reaction_id = %self.reaction_id,
                "Could not remove progress marker: {}", e
            );
        }
    }

    pub fn reaction_id(&self) -> &EventId {
        &self.reaction_id
    }
}

/// Clear an optional marker.
pub async fn clear_marker(api: &dyn MatrixApi, marker: Option<ProgressMarker>) {
    if let Some(marker) = marker {
        marker.clear(api).await;
    }
}
