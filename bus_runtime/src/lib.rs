//! Shared runtime utilities for the command bus.
//!
//! This crate re-exports the data contracts from `bus_schema` and adds helpers
//! that operate on those types without touching mailbox storage.

pub use bus_schema::*;

pub mod command_text;

pub use command_text::{parse_command_line, CommandParseError};
