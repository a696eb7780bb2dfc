//! Recognising bot invocations in room messages

use crate::context::BotIdentity;
use crate::id::{EventId, GroupId, UserId};

/// The prefix that triggers the bot when nothing else is configured
pub const DEFAULT_COMMAND_PREFIX: &str = "!convert";

/// A room message as delivered by sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub event_id: EventId,
    pub sender: UserId,
    pub msgtype: String,
    pub body: String,
    pub redacted: bool,
}

/// What a matched message asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// No argument given
    Help,
    /// First argument, taken verbatim as a community id
    Convert { group: String },
}

impl Command {
    /// The community id, if the argument parses as one
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Command::Convert { group } => GroupId::parse(group.as_str()).ok(),
            Command::Help => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandMatcher {
    prefixes: Vec<String>,
    own_user_id: UserId,
}

impl CommandMatcher {
    /// Build the prefix list: the command prefix, then `localpart:`,
    /// `display name:` and `@user:server:`.
    pub fn new(command_prefix: &str, identity: &BotIdentity) -> Self {
        let mut prefixes = vec![
            command_prefix.to_string(),
            format!("{}:", identity.localpart()),
        ];
        if let Some(name) = identity.display_name() {
            prefixes.push(format!("{name}:"));
        }
        prefixes.push(format!("{}:", identity.user_id()));

        Self {
            prefixes,
            own_user_id: identity.user_id().clone(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Classify a message. `None` means the message is not for us.
    pub fn parse(&self, message: &IncomingMessage) -> Option<Command> {
        if message.redacted || message.sender == self.own_user_id || message.msgtype != "m.text"
        {
            return None;
        }

        let prefix = self
            .prefixes
            .iter()
            .find(|prefix| message.body.starts_with(prefix.as_str()))?;

        let args: Vec<&str> = message.body[prefix.len()..].trim().split(' ').collect();
        match args.first() {
            Some(first) if !first.is_empty() => Some(Command::Convert {
                group: first.to_string(),
            }),
            _ => Some(Command::Help),
        }
    }
}
