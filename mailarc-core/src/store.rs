//! Local message store.
//!
//! One directory per remote folder, one file per message:
//!
//! ```text
//! <root>/<account>/
//!   INBOX/
//!     101.eml
//!     102.eml
//!   Archive/
//!     2024/
//!       7.eml
//! ```
//!
//! A record is "present" when the file exists and is non-empty. Zero-byte
//! files are left in place and simply downloaded again.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::MessageId;

/// Extension of raw message files.
pub const RAW_EXTENSION: &str = "eml";

/// Suffix used while a download is being written.
const TMP_SUFFIX: &str = "tmp";

/// A raw message file on disk.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Identifier (file stem).
    pub id: MessageId,
    /// Full path to the message file.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

impl StoredMessage {
    /// Read the raw message bytes.
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    pub fn is_present(&self) -> bool {
        self.size > 0
    }

    /// File name, e.g. `101.eml`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, RAW_EXTENSION)
    }
}

/// Message files of a single folder.
#[derive(Debug, Clone)]
pub struct MessageStore {
    dir: PathBuf,
}

impl MessageStore {
    /// Open the store for a folder directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `id`.
    pub fn path_for(&self, id: &MessageId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RAW_EXTENSION))
    }

    /// Whether a complete (non-empty) record exists for `id`.
    pub fn is_present(&self, id: &MessageId) -> bool {
        fs::metadata(self.path_for(id))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// Write a downloaded message.
    ///
    /// Goes through a temporary file so an interrupted write never leaves a
    /// non-empty partial record behind.
    pub fn write(&self, id: &MessageId, content: &[u8]) -> Result<StoredMessage> {
        let path = self.path_for(id);
        let tmp_path = self
            .dir
            .join(format!("{}.{}.{}", id, RAW_EXTENSION, TMP_SUFFIX));

        let mut file = File::create(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &path)?;

        Ok(StoredMessage {
            id: id.clone(),
            path,
            size: content.len() as u64,
        })
    }

    /// Delete the record for `id`. Returns false if there was none.
    pub fn remove(&self, id: &MessageId) -> Result<bool> {
        let path = self.path_for(id);
        if path.is_file() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// All message files in this directory (not recursive), ordered by id.
    pub fn list(&self) -> Result<Vec<StoredMessage>> {
        let mut messages = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RAW_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            messages.push(StoredMessage {
                id: MessageId::new(stem),
                size: entry.metadata()?.len(),
                path,
            });
        }

        messages.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(messages)
    }

    /// Identifier -> present-and-non-empty, for every record on disk.
    pub fn presence(&self) -> Result<HashMap<MessageId, bool>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|msg| {
                let present = msg.is_present();
                (msg.id, present)
            })
            .collect())
    }

    /// Identifiers of every record on disk, including empty ones.
    pub fn local_ids(&self) -> Result<Vec<MessageId>> {
        Ok(self.list()?.into_iter().map(|msg| msg.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, MessageStore) {
        let temp = TempDir::new().unwrap();
        let store = MessageStore::open(temp.path().join("INBOX")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_open_creates_dir() {
        let (_temp, store) = test_store();
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_write_and_list() {
        let (_temp, store) = test_store();
        store.write(&MessageId::from(10), b"Subject: b\r\n\r\nB").unwrap();
        store.write(&MessageId::from(9), b"Subject: a\r\n\r\nA").unwrap();

        let messages = store.list().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id.as_str(), "9");
        assert_eq!(messages[1].id.as_str(), "10");
        assert_eq!(messages[0].file_name(), "9.eml");
        assert_eq!(messages[1].read_bytes().unwrap(), b"Subject: b\r\n\r\nB");
    }

    #[test]
    fn test_write_leaves_no_tmp_file() {
        let (_temp, store) = test_store();
        store.write(&MessageId::from(1), b"x").unwrap();
        let names: Vec<String> = fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["1.eml".to_string()]);
    }

    #[test]
    fn test_empty_file_is_not_present() {
        let (_temp, store) = test_store();
        let id = MessageId::from(5);
        File::create(store.path_for(&id)).unwrap();

        assert!(!store.is_present(&id));
        let presence = store.presence().unwrap();
        assert_eq!(presence.get(&id), Some(&false));
        assert_eq!(store.local_ids().unwrap(), vec![id]);
    }

    #[test]
    fn test_ignores_other_files() {
        let (_temp, store) = test_store();
        fs::write(store.dir().join("INBOX.mbox"), b"From x").unwrap();
        fs::create_dir(store.dir().join("Sub")).unwrap();
        store.write(&MessageId::from(1), b"x").unwrap();

        assert_eq!(store.local_ids().unwrap(), vec![MessageId::from(1)]);
    }

    #[test]
    fn test_remove() {
        let (_temp, store) = test_store();
        let id = MessageId::from(3);
        store.write(&id, b"x").unwrap();
        assert!(store.remove(&id).unwrap());
        assert!(!store.remove(&id).unwrap());
        assert!(!store.is_present(&id));
    }
}
