//! Core of the command bus: a single-slot mailbox shared by independent bot
//! processes.
//!
//! A [`Publisher`] overwrites the slot; every [`Poller`] reads it on its own
//! interval, delivers content it has not seen before to its one handler, and
//! clears the slot. The slot holds at most one pending command, so a second
//! publish before anyone polls replaces the first.

pub mod bot;
pub mod config;
mod file_store;
mod memory_store;
pub mod poller;
mod publisher;
mod store;

pub use bot::BotBehavior;
pub use config::{load_bus_config, load_bus_config_from_env, BusConfig, BusConfigError, BusConfigMetadata};
pub use file_store::FileMailbox;
pub use memory_store::MemoryMailbox;
pub use poller::{
    shutdown_on, CommandHandler, HandlerError, PollOutcome, PollStats, Poller, TargetFilter,
};
pub use publisher::{PublishError, Publisher};
pub use store::{MailboxError, MailboxReadError, MailboxSlot, MailboxStore};

pub use bus_runtime::{Command, CommandKind, CommandSignature};
