#![allow(dead_code)]

use std::sync::Arc;

use mailbox_core::{Command, FileMailbox, HandlerError};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Mailbox file inside a fresh temporary directory. Keep the `TempDir` alive
/// for as long as the mailbox is used.
pub fn temp_mailbox() -> (TempDir, FileMailbox) {
    let dir = TempDir::new().expect("temp dir");
    let mailbox = FileMailbox::new(dir.path().join("bus").join("commands.json"));
    (dir, mailbox)
}

pub type Inbox = Arc<Mutex<Vec<Command>>>;

/// Handler that records every command it receives into `inbox`.
pub fn recorder(inbox: Inbox) -> impl FnMut(&Command) -> Result<(), HandlerError> + Send {
    move |command: &Command| -> Result<(), HandlerError> {
        inbox.lock().push(command.clone());
        Ok(())
    }
}
