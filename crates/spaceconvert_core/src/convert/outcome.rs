//! The single user-visible result of one invocation

use serde_json::{Value, json};
use tracing::error;

use crate::api::MatrixApi;
use crate::id::{EventId, RoomAlias, RoomId};

/// How an invocation ended. Every branch produces exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No (usable) argument: explain how to use the bot
    Help,
    /// A space already answers to the deterministic alias
    AlreadyConverted { space: RoomId },
    /// Neither joining nor accepting an invite worked
    JoinFailed,
    /// The sender is not a privileged member of the community
    NotAdmin,
    Converted { space: RoomId, alias: RoomAlias },
    /// Unexpected fault, already logged
    Failed,
}

/// Text of a reply, with an optional HTML rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub msgtype: &'static str,
    pub body: String,
    pub html: Option<String>,
}

impl Reply {
    fn notice(body: impl Into<String>) -> Self {
        Self {
            msgtype: "m.notice",
            body: body.into(),
            html: None,
        }
    }

    fn html_notice(body: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            msgtype: "m.notice",
            body: body.into(),
            html: Some(html.into()),
        }
    }

    fn text(body: impl Into<String>) -> Self {
        Self {
            msgtype: "m.text",
            body: body.into(),
            html: None,
        }
    }

    /// `m.room.message` content replying to `in_reply_to`
    pub fn to_content(&self, in_reply_to: &EventId) -> Value {
        let mut content = json!({
            "msgtype": self.msgtype,
            "body": self.body,
            "m.relates_to": {
                "m.in_reply_to": { "event_id": in_reply_to }
            }
        });
        if let Some(html) = &self.html {
            content["format"] = json!("org.matrix.custom.html");
            content["formatted_body"] = json!(html);
        }
        content
    }
}

impl Outcome {
    pub fn reply(&self, command_prefix: &str) -> Reply {
        match self {
            Outcome::Help => Reply::html_notice(
                format!(
                    "This bot's sole purpose is to convert communities to spaces. \
                     Use {command_prefix} +group:example.org to convert."
                ),
                format!(
                    "This bot's sole purpose is to convert communities to spaces. \
                     Use <code>{command_prefix} +group:example.org</code> to convert."
                ),
            ),
            Outcome::AlreadyConverted { .. } => Reply::text(
                "It appears as though that community has already been converted to a Space. \
                 If this is incorrect, please contact the bot administrator.",
            ),
            Outcome::JoinFailed => Reply::notice(
                "There was an error joining your community. \
                 Please invite me to your community then try again.",
            ),
            Outcome::NotAdmin => Reply::notice("Sorry, you are not an admin of that community."),
            Outcome::Converted { .. } => Reply::html_notice(
                "Your community is now a space! I've made you admin, but have not invited \
                 your community's members just in case you'd like to change some settings \
                 first. Inviting your community members is a task left to you: typically the \
                 Space is advertised within your community rooms so people can join at their \
                 own leisure.",
                "Your community is now a space! I've made you admin, but <b>have not</b> \
                 invited your community's members just in case you'd like to change some \
                 settings first. Inviting your community members is a task left to you: \
                 typically the Space is advertised within your community rooms so people can \
                 join at their own leisure.",
            ),
            Outcome::Failed => Reply::notice("There was an error processing your command"),
        }
    }

    /// Send the reply. A failed send is logged; nothing else is reported.
    pub async fn report(
        &self,
        api: &dyn MatrixApi,
        room_id: &RoomId,
        in_reply_to: &EventId,
        command_prefix: &str,
    ) {
        let content = self.reply(command_prefix).to_content(in_reply_to);
        if let Err(e) = api.send_message(room_id, content).await {
            error!(room_id = %room_id, outcome = ?self, "Failed to send reply: {}", e);
        }
    }
}
