use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::store::MailboxStore;

/// In-process mailbox. Clones share one slot.
///
/// Holds raw text rather than a decoded command so tests can plant corrupt
/// content exactly as a racing writer would leave it on disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailbox {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current raw content, `None` if never written.
    pub fn raw(&self) -> Option<String> {
        self.slot.lock().clone()
    }
}

impl MailboxStore for MemoryMailbox {
    fn location(&self) -> String {
        "memory".to_string()
    }

    fn load_text(&self) -> io::Result<Option<String>> {
        Ok(self.slot.lock().clone())
    }

    fn store_text(&self, text: &str) -> io::Result<()> {
        *self.slot.lock() = Some(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MailboxSlot;
    use bus_runtime::{Command, CommandKind, EMPTY_MAILBOX};

    #[test]
    fn publish_then_read_returns_the_command() {
        let mailbox = MemoryMailbox::new();
        let command = Command::targeted("farmer_01", CommandKind::Ping);
        mailbox.publish(&command).expect("publish");
        assert_eq!(mailbox.read(), MailboxSlot::Pending(command));
    }

    #[test]
    fn last_publish_wins() {
        let mailbox = MemoryMailbox::new();
        let first = Command::new(CommandKind::Pause);
        let second = Command::new(CommandKind::Resume);
        mailbox.publish(&first).expect("publish first");
        mailbox.publish(&second).expect("publish second");
        assert_eq!(mailbox.read(), MailboxSlot::Pending(second));
    }

    #[test]
    fn clones_share_the_slot() {
        let mailbox = MemoryMailbox::new();
        let other_process = mailbox.clone();
        mailbox
            .publish(&Command::new(CommandKind::Ping))
            .expect("publish");
        other_process.clear().expect("clear");
        assert_eq!(mailbox.raw().as_deref(), Some(EMPTY_MAILBOX));
        assert!(mailbox.read().is_empty());
    }

    #[test]
    fn corrupt_text_reads_as_empty() {
        let mailbox = MemoryMailbox::new();
        mailbox.store_text("not json at all").expect("seed");
        assert!(mailbox.read_slot().is_err());
        assert_eq!(mailbox.read(), MailboxSlot::Empty);
    }
}
