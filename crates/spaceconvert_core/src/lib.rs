//! SpaceConvert Core - community to space conversion
//!
//! This crate holds everything about converting a legacy Matrix community
//! (`+group:server`) into a space that does not depend on a particular HTTP
//! stack: identifiers, the [`MatrixApi`] seam, command matching, the
//! conversion pipeline, and configuration.
//!
//! The bot's identity is resolved once at startup ([`BotIdentity::resolve`])
//! and passed in explicitly. There is no global state.

pub mod api;
pub mod command;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod handler;
pub mod id;
pub mod progress;

#[cfg(test)]
pub mod test_helpers;

pub use api::{CreateSpace, GroupMember, GroupProfile, GroupRoom, MatrixApi, PowerLevels};
pub use command::{Command, CommandMatcher, IncomingMessage};
pub use config::SpaceConvertConfig;
pub use context::BotIdentity;
pub use convert::{Converter, Invocation, Outcome};
pub use error::{ConfigError, CoreError, MatrixError, MatrixResult, Result};
pub use handler::CommandHandler;
pub use id::{EventId, GroupId, RoomAlias, RoomId, UserId};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        BotIdentity, CommandHandler, CoreError, EventId, GroupId, IncomingMessage, MatrixApi,
        MatrixError, MatrixResult, Result, RoomAlias, RoomId, SpaceConvertConfig, UserId,
    };
}
