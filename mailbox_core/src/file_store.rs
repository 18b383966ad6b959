use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::store::MailboxStore;

/// Mailbox backed by one JSON file shared between processes.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the mailbox, so a concurrent reader sees the old or the new content
/// and never a partial write.
#[derive(Debug, Clone)]
pub struct FileMailbox {
    path: PathBuf,
}

impl FileMailbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl MailboxStore for FileMailbox {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load_text(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn store_text(&self, text: &str) -> io::Result<()> {
        let directory = self.directory();
        fs::create_dir_all(directory)?;
        let mut temp = NamedTempFile::new_in(directory)?;
        temp.write_all(text.as_bytes())?;
        temp.flush()?;
        temp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}
