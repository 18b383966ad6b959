//! Data contracts for the command bus.
//!
//! A [`Command`] is the single payload type that flows through the mailbox.
//! This crate owns its typed model, the JSON wire codec (including the
//! compatibility shim for historical field names), and the content
//! [`CommandSignature`] pollers use to recognise a command they already
//! delivered. Nothing here touches the filesystem.

mod command;
mod signature;
mod wire;

pub use command::{
    actions, BotRegistration, BuildWallParams, CameraShot, Command, CommandKind, Params,
    ProjectInput, RecordingRequest, TaskReport, WorkAssignment, BROADCAST_TARGET,
};
pub use signature::{CommandSignature, FnvHasher};
pub use wire::{decode_mailbox, CommandDecodeError, EMPTY_MAILBOX};
