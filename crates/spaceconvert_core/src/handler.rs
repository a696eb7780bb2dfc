//! Entry point for room messages

use std::sync::Arc;

use tracing::debug;

use crate::api::MatrixApi;
use crate::command::{Command, CommandMatcher, IncomingMessage};
use crate::context::BotIdentity;
use crate::convert::{Converter, Invocation, Outcome};
use crate::id::RoomId;

/// Matches commands and runs conversions.
///
/// Cheap to clone; the sync loop hands each message to its own task with a
/// clone of the handler.
#[derive(Clone)]
pub struct CommandHandler {
    api: Arc<dyn MatrixApi>,
    identity: Arc<BotIdentity>,
    matcher: Arc<CommandMatcher>,
    command_prefix: Arc<str>,
}

impl CommandHandler {
    pub fn new(api: Arc<dyn MatrixApi>, identity: Arc<BotIdentity>, command_prefix: &str) -> Self {
        let matcher = CommandMatcher::new(command_prefix, &identity);
        Self {
            api,
            identity,
            matcher: Arc::new(matcher),
            command_prefix: Arc::from(command_prefix),
        }
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    /// Handle one room message. Returns the outcome that was reported, or
    /// `None` if the message was not a command.
    pub async fn handle_message(
        &self,
        room_id: &RoomId,
        message: &IncomingMessage,
    ) -> Option<Outcome> {
        let command = self.matcher.parse(message)?;
        debug!(room_id = %room_id, sender = %message.sender, command = ?command, "Matched command");

        let invocation = Invocation {
            room_id: room_id.clone(),
            event_id: message.event_id.clone(),
            sender: message.sender.clone(),
        };
        let converter = Converter::new(self.api.as_ref(), &self.identity);
        let outcome = match (&command, command.group_id()) {
            (Command::Convert { .. }, Some(group)) => converter.run(&invocation, &group).await,
            (Command::Convert { group }, None) => {
                converter.run_unparseable(&invocation, group).await
            }
            (Command::Help, _) => Outcome::Help,
        };

        outcome
            .report(
                self.api.as_ref(),
                room_id,
                &message.event_id,
                &self.command_prefix,
            )
            .await;
        Some(outcome)
    }
}
