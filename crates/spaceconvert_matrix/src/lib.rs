//! Matrix transport for spaceconvert
//!
//! [`MatrixClient`] implements [`spaceconvert_core::MatrixApi`] over the
//! client-server HTTP API with reqwest. [`SyncLoop`] long-polls `/sync` and
//! hands new room messages to a [`spaceconvert_core::CommandHandler`].

pub mod client;
pub mod sync;

pub use client::MatrixClient;
pub use sync::{SyncLoop, SyncResponse};
