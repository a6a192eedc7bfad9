//! Mbox export of a stored folder tree.
//!
//! Every directory that holds raw messages gets its own container named
//! after the directory, placed inside it (`Archive/2024/2024.mbox`).
//! Containers are append-only: exporting twice appends every message twice.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::store::MessageStore;

/// Extension of exported containers.
pub const MBOX_EXTENSION: &str = "mbox";

/// Sender written on separator lines.
const SEPARATOR_SENDER: &str = "MAILER-DAEMON";

/// What an export pass wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    /// Containers written to, in walk order.
    pub containers: Vec<PathBuf>,
    /// Messages appended across all containers.
    pub messages: usize,
}

/// Append every message under `dir` (recursively) to per-directory containers.
pub fn export_folder(dir: &Path) -> Result<ExportReport> {
    if !dir.is_dir() {
        return Err(Error::Path(format!("not a directory: {}", dir.display())));
    }

    let mut report = ExportReport::default();

    // Pre-order, depth-first; each directory is handled before its children.
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_dir() {
            append_directory(entry.path(), &mut report)?;
        }
    }

    info!(
        "exported {} messages into {} mbox files",
        report.messages,
        report.containers.len()
    );
    Ok(report)
}

/// Like [`export_folder`], without descending into subdirectories.
pub fn export_directory(dir: &Path) -> Result<ExportReport> {
    if !dir.is_dir() {
        return Err(Error::Path(format!("not a directory: {}", dir.display())));
    }
    let mut report = ExportReport::default();
    append_directory(dir, &mut report)?;
    Ok(report)
}

fn append_directory(dir: &Path, report: &mut ExportReport) -> Result<()> {
    let messages = MessageStore::open(dir)?.list()?;
    if messages.is_empty() {
        return Ok(());
    }

    let container = container_path(dir);
    let mut writer = MboxWriter::append(&container)?;
    for message in &messages {
        writer.add(&message.read_bytes()?)?;
    }
    writer.finish()?;

    debug!(
        "appended {} messages to {}",
        messages.len(),
        container.display()
    );
    report.messages += messages.len();
    report.containers.push(container);
    Ok(())
}

/// `<dir>/<basename of dir>.mbox`.
pub fn container_path(dir: &Path) -> PathBuf {
    let base = dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "mailbox".to_string());
    dir.join(format!("{base}.{MBOX_EXTENSION}"))
}

/// Appends messages to one mbox file.
pub struct MboxWriter {
    out: BufWriter<File>,
}

impl MboxWriter {
    pub fn append(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Append one raw message as a single entry.
    pub fn add(&mut self, raw: &[u8]) -> Result<()> {
        let stamp = Utc::now().format("%a %b %e %H:%M:%S %Y");
        writeln!(self.out, "From {SEPARATOR_SENDER} {stamp}")?;
        self.out.write_all(&encode_entry(raw))?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Message body as stored in the container: LF line endings, `From ` lines
/// escaped, terminated by a blank line.
fn encode_entry(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 16);

    for line in raw.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.starts_with(b"From ") {
            out.push(b'>');
        }
        out.extend_from_slice(line);
        out.push(b'\n');
    }

    // split() yields a trailing empty line when the message ends in a newline
    if raw.ends_with(b"\n") {
        out.pop();
    }
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.push(b'\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageId;
    use tempfile::TempDir;

    fn entries(mbox: &str) -> usize {
        mbox.lines().filter(|l| l.starts_with("From MAILER-DAEMON ")).count()
    }

    #[test]
    fn test_encode_entry_escapes_from_lines() {
        let raw = b"Subject: hi\r\n\r\nFrom here on\r\nbye\r\n";
        let encoded = String::from_utf8(encode_entry(raw)).unwrap();
        assert_eq!(encoded, "Subject: hi\n\n>From here on\nbye\n\n");
    }

    #[test]
    fn test_encode_entry_without_trailing_newline() {
        let encoded = String::from_utf8(encode_entry(b"Subject: x\n\nbody")).unwrap();
        assert_eq!(encoded, "Subject: x\n\nbody\n\n");
    }

    #[test]
    fn test_container_path() {
        let path = container_path(Path::new("acct/Archive/2024"));
        assert_eq!(path, Path::new("acct/Archive/2024/2024.mbox"));
    }

    #[test]
    fn test_export_nested_folders() {
        let temp = TempDir::new().unwrap();
        let inbox = MessageStore::open(temp.path().join("INBOX")).unwrap();
        inbox.write(&MessageId::from(1), b"Subject: a\r\n\r\nA\r\n").unwrap();
        inbox.write(&MessageId::from(2), b"Subject: b\r\n\r\nB\r\n").unwrap();
        let nested = MessageStore::open(temp.path().join("INBOX").join("Sub")).unwrap();
        nested.write(&MessageId::from(7), b"Subject: c\r\n\r\nC\r\n").unwrap();

        let report = export_folder(&temp.path().join("INBOX")).unwrap();
        assert_eq!(report.messages, 3);
        assert_eq!(
            report.containers,
            vec![
                temp.path().join("INBOX").join("INBOX.mbox"),
                temp.path().join("INBOX").join("Sub").join("Sub.mbox"),
            ]
        );

        let top = fs::read_to_string(&report.containers[0]).unwrap();
        assert_eq!(entries(&top), 2);
        assert!(top.contains("Subject: a\n\nA\n"));
        assert!(!top.contains("Subject: c"));

        let sub = fs::read_to_string(&report.containers[1]).unwrap();
        assert_eq!(entries(&sub), 1);
    }

    #[test]
    fn test_export_twice_appends_duplicates() {
        let temp = TempDir::new().unwrap();
        let store = MessageStore::open(temp.path().join("Sent")).unwrap();
        store.write(&MessageId::from(1), b"Subject: a\r\n\r\nA\r\n").unwrap();

        export_folder(store.dir()).unwrap();
        let report = export_folder(store.dir()).unwrap();

        let mbox = fs::read_to_string(&report.containers[0]).unwrap();
        assert_eq!(entries(&mbox), 2);
    }

    #[test]
    fn test_export_skips_dirs_without_messages() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("Empty").join("Deeper")).unwrap();
        let report = export_folder(&temp.path().join("Empty")).unwrap();
        assert_eq!(report, ExportReport::default());
        assert!(!container_path(&temp.path().join("Empty")).exists());
    }

    #[test]
    fn test_export_directory_ignores_children() {
        let temp = TempDir::new().unwrap();
        let top = MessageStore::open(temp.path().join("Archive")).unwrap();
        top.write(&MessageId::from(3), b"Subject: top\r\n\r\nT\r\n").unwrap();
        let child = MessageStore::open(temp.path().join("Archive").join("2024")).unwrap();
        child.write(&MessageId::from(4), b"Subject: child\r\n\r\nC\r\n").unwrap();

        let report = export_directory(top.dir()).unwrap();
        assert_eq!(report.messages, 1);
        assert_eq!(report.containers, vec![container_path(top.dir())]);
        assert!(!container_path(child.dir()).exists());
    }

    #[test]
    fn test_export_missing_dir_errors() {
        let temp = TempDir::new().unwrap();
        assert!(export_folder(&temp.path().join("nope")).is_err());
    }
}
