//! mailarc-core: Core library for mailarc - a personal IMAP mailbox archiver.
//!
//! This crate provides:
//! - Configuration management
//! - Remote mailbox access over IMAP
//! - Incremental folder sync into a local message store
//! - Mbox export of stored folders
//! - Message decoding into text, HTML and attachments
//! - Batched HTML digests of decoded messages

pub mod archive;
pub mod archiver;
pub mod config;
pub mod decode;
pub mod digest;
pub mod error;
pub mod folder;
pub mod html;
pub mod paths;
pub mod remote;
pub mod store;
pub mod sync;
pub mod types;

pub use archive::{ExportReport, export_directory, export_folder};
pub use archiver::{Archiver, FolderReport, RunOptions, RunReport, SkippedFolder};
pub use config::AppConfig;
pub use decode::{DecodeOptions, DecodeReport, DecodedMessage, decode, decode_folder};
pub use digest::{Digest, Markers, digest_inputs, render};
pub use error::{Error, Result};
pub use folder::{FolderFilter, FolderInfo, FolderName};
pub use paths::{AppPaths, ArchiveLayout};
pub use remote::{ImapSession, RemoteMailbox};
pub use store::MessageStore;
pub use sync::{Reconciliation, prune_stale, reconcile};
pub use types::{FolderStats, MessageId, SearchCriteria};
