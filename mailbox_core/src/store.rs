use std::io;
use std::sync::Arc;

use bus_runtime::{decode_mailbox, Command, CommandDecodeError, EMPTY_MAILBOX};
use thiserror::Error;
use tracing::debug;

/// What a read of the mailbox observed.
#[derive(Debug, Clone, PartialEq)]
pub enum MailboxSlot {
    Empty,
    Pending(Command),
}

impl MailboxSlot {
    pub fn is_empty(&self) -> bool {
        matches!(self, MailboxSlot::Empty)
    }

    pub fn command(&self) -> Option<&Command> {
        match self {
            MailboxSlot::Pending(command) => Some(command),
            MailboxSlot::Empty => None,
        }
    }

    pub fn into_command(self) -> Option<Command> {
        match self {
            MailboxSlot::Pending(command) => Some(command),
            MailboxSlot::Empty => None,
        }
    }
}

/// Failure of an explicit, attended write (`publish` or `clear`).
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("failed to encode {action} for mailbox {location}: {source}")]
    Encode {
        location: String,
        action: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write mailbox {location}: {source}")]
    Write {
        location: String,
        #[source]
        source: io::Error,
    },
}

/// Failure observed while reading; [`MailboxStore::read`] folds these into
/// [`MailboxSlot::Empty`].
#[derive(Debug, Error)]
pub enum MailboxReadError {
    #[error("failed to read mailbox {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
    #[error("undecodable content in mailbox {location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: CommandDecodeError,
    },
}

/// Single-slot storage for one pending command.
///
/// Backends supply raw text access; the command semantics (canonical
/// encoding, empty sentinel, fail-open reads) live in the provided methods so
/// every backend behaves the same.
pub trait MailboxStore: Send + Sync {
    /// Label for logs and errors (a path, or `memory`).
    fn location(&self) -> String;

    /// Raw slot content, or `None` when nothing was ever written.
    fn load_text(&self) -> io::Result<Option<String>>;

    /// Replace the whole slot. Readers must see either the old or the new text.
    fn store_text(&self, text: &str) -> io::Result<()>;

    /// Overwrite the slot with `command`. Any unconsumed command is lost.
    fn publish(&self, command: &Command) -> Result<(), MailboxError> {
        let text = command
            .to_json_pretty()
            .map_err(|source| MailboxError::Encode {
                location: self.location(),
                action: command.action().to_string(),
                source,
            })?;
        self.store_text(&text)
            .map_err(|source| MailboxError::Write {
                location: self.location(),
                source,
            })?;
        debug!(
            target: "command_bus::mailbox",
            location = %self.location(),
            action = command.action(),
            target_bot = command.target.as_deref().unwrap_or("-"),
            "mailbox.published"
        );
        Ok(())
    }

    /// Reset the slot to the empty sentinel. Clearing an empty slot is fine.
    fn clear(&self) -> Result<(), MailboxError> {
        self.store_text(EMPTY_MAILBOX)
            .map_err(|source| MailboxError::Write {
                location: self.location(),
                source,
            })
    }

    /// Read the slot, keeping apart "nothing pending" and "could not read".
    fn read_slot(&self) -> Result<MailboxSlot, MailboxReadError> {
        let text = self.load_text().map_err(|source| MailboxReadError::Io {
            location: self.location(),
            source,
        })?;
        let Some(text) = text else {
            return Ok(MailboxSlot::Empty);
        };
        match decode_mailbox(&text) {
            Ok(Some(command)) => Ok(MailboxSlot::Pending(command)),
            Ok(None) => Ok(MailboxSlot::Empty),
            Err(source) => Err(MailboxReadError::Decode {
                location: self.location(),
                source,
            }),
        }
    }

    /// Read the slot, treating any read or decode failure as empty.
    ///
    /// Concurrent pollers can race a writer, so a missing or half-written
    /// slot must never stop a poll loop.
    fn read(&self) -> MailboxSlot {
        match self.read_slot() {
            Ok(slot) => slot,
            Err(err) => {
                debug!(
                    target: "command_bus::mailbox",
                    error = %err,
                    "mailbox.read_degraded=empty"
                );
                MailboxSlot::Empty
            }
        }
    }
}

impl<S: MailboxStore + ?Sized> MailboxStore for Arc<S> {
    fn location(&self) -> String {
        (**self).location()
    }

    fn load_text(&self) -> io::Result<Option<String>> {
        (**self).load_text()
    }

    fn store_text(&self, text: &str) -> io::Result<()> {
        (**self).store_text(text)
    }
}
