use bus_runtime::{Command, CommandDecodeError, Params};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::store::{MailboxError, MailboxStore};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid command: {0}")]
    Invalid(#[from] CommandDecodeError),
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// Write side of the mailbox.
///
/// Publishing never waits for delivery; a command still pending in the slot is
/// overwritten.
#[derive(Debug, Clone)]
pub struct Publisher<S> {
    store: S,
}

impl<S: MailboxStore> Publisher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publish(&self, command: &Command) -> Result<(), MailboxError> {
        self.store.publish(command)
    }

    /// Build a command from a verb, an optional recipient and a params bag,
    /// then publish it. Returns what was written.
    ///
    /// Known verbs are validated against their payload shape before anything
    /// touches the slot.
    pub fn send(
        &self,
        action: &str,
        target: Option<&str>,
        params: Params,
    ) -> Result<Command, PublishError> {
        let mut object = Params::new();
        object.insert("action".to_string(), JsonValue::String(action.to_string()));
        if let Some(target) = target {
            object.insert("target".to_string(), JsonValue::String(target.to_string()));
        }
        object.insert("params".to_string(), JsonValue::Object(params));
        let command = Command::from_wire_object(object)?;
        self.store.publish(&command)?;
        Ok(command)
    }
}
