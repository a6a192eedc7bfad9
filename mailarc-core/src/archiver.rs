//! One archiving pass over every folder of an account.
//!
//! Folder listing failures end the pass. Anything that goes wrong inside a
//! folder is logged and the pass moves on to the next folder; a message
//! that cannot be fetched is counted and the folder continues.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

use crate::archive::{ExportReport, export_directory};
use crate::config::AppConfig;
use crate::decode::{DecodeOptions, DecodeReport, decode_folder, remove_outputs};
use crate::digest::{Digest, Markers, render};
use crate::error::Result;
use crate::folder::{FolderFilter, FolderName};
use crate::paths::ArchiveLayout;
use crate::remote::RemoteMailbox;
use crate::store::{MessageStore, RAW_EXTENSION};
use crate::sync::{prune_stale, reconcile};
use crate::types::{FolderStats, MessageId, SearchCriteria};

/// Everything a pass needs besides the remote session.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub layout: ArchiveLayout,
    /// Delimiter assumed for folders the server reports without one.
    pub delimiter: String,
    pub filter: FolderFilter,
    pub criteria: SearchCriteria,
    pub prune: bool,
    pub mbox: bool,
    /// Decode stored messages after syncing when set.
    pub decode: Option<DecodeOptions>,
    pub batch_size: usize,
    pub markers: Markers,
}

impl RunOptions {
    /// Options for `account` as configured, with `today` anchoring `max_age_days`.
    pub fn from_config(config: &AppConfig, account: &str, today: NaiveDate) -> Result<Self> {
        let layout = ArchiveLayout::new(config.archive_root()?, account, &config.decode.output_dir);
        Ok(Self {
            layout,
            delimiter: config.imap.delimiter.clone(),
            filter: FolderFilter::new(
                config.filters.include.clone(),
                config.filters.exclude.clone(),
            ),
            criteria: SearchCriteria::select(
                config.filters.unseen,
                config.filters.max_age_days,
                today,
            ),
            prune: config.archive.prune,
            mbox: config.archive.mbox,
            decode: config.decode.enabled.then(|| config.decode.options()),
            batch_size: config.digest.batch_size,
            markers: config.digest.markers(),
        })
    }
}

/// Result of syncing one folder.
#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
    /// Canonical (`/`-joined) folder name.
    pub name: String,
    pub path: PathBuf,
    pub stats: FolderStats,
    pub export: Option<ExportReport>,
    pub decode: Option<DecodeReport>,
    pub digest: Option<Digest>,
}

/// A folder the pass did not sync, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFolder {
    pub name: String,
    pub reason: String,
}

/// Result of a whole pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub folders: Vec<FolderReport>,
    pub skipped: Vec<SkippedFolder>,
}

impl RunReport {
    /// Counters summed over all synced folders.
    pub fn totals(&self) -> FolderStats {
        self.folders
            .iter()
            .fold(FolderStats::default(), |mut acc, folder| {
                acc.saved += folder.stats.saved;
                acc.skipped += folder.stats.skipped;
                acc.failed += folder.stats.failed;
                acc.removed += folder.stats.removed;
                acc.total += folder.stats.total;
                acc
            })
    }
}

/// Drives one pass against a remote session.
pub struct Archiver<'a, R: RemoteMailbox> {
    remote: &'a mut R,
    opts: &'a RunOptions,
}

impl<'a, R: RemoteMailbox> Archiver<'a, R> {
    pub fn new(remote: &'a mut R, opts: &'a RunOptions) -> Self {
        Self { remote, opts }
    }

    pub fn run(&mut self) -> Result<RunReport> {
        self.run_with(|_| {})
    }

    /// Run the pass, calling `on_folder` as soon as each folder is done.
    pub fn run_with<F>(&mut self, mut on_folder: F) -> Result<RunReport>
    where
        F: FnMut(&FolderReport),
    {
        let folders = self.remote.list_folders()?;
        let account_dir = self.opts.layout.account_dir();
        fs::create_dir_all(&account_dir)?;
        info!("found {} folders", folders.len());

        if self.opts.prune && self.opts.criteria != SearchCriteria::All {
            warn!(
                "pruning with search '{}' removes local messages outside the search",
                self.opts.criteria.to_imap_query()
            );
        }

        let mut report = RunReport::default();
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();

        for info in folders {
            let name = info.folder_name(&self.opts.delimiter);
            let canonical = name.canonical();

            if !self.opts.filter.allows(&canonical) {
                debug!("folder {canonical} filtered out");
                continue;
            }
            if !info.selectable {
                debug!("folder {canonical} cannot be selected");
                report.skipped.push(SkippedFolder {
                    name: canonical,
                    reason: "not selectable".to_string(),
                });
                continue;
            }

            let dir = name.local_path(&account_dir);
            if let Some(owner) = claimed.get(&dir) {
                warn!(
                    "folder {} maps to {} which is already used by {owner}; skipping",
                    info.name,
                    dir.display()
                );
                report.skipped.push(SkippedFolder {
                    name: canonical,
                    reason: format!("local directory already used by {owner}"),
                });
                continue;
            }
            claimed.insert(dir.clone(), info.name.clone());

            match self.sync_folder(&name, dir) {
                Ok(folder) => {
                    on_folder(&folder);
                    report.folders.push(folder);
                }
                Err(err) => {
                    warn!("skipping folder {canonical}: {err}");
                    report.skipped.push(SkippedFolder {
                        name: canonical,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    fn sync_folder(&mut self, name: &FolderName, dir: PathBuf) -> Result<FolderReport> {
        let canonical = name.canonical();
        info!("downloading contents of mailbox {canonical}");

        let store = MessageStore::open(&dir)?;
        self.remote.select_folder(name.raw())?;
        let remote_ids = self.remote.search(self.opts.criteria)?;

        let mut stats = self.download(&store, &remote_ids)?;
        if self.opts.prune {
            stats.removed = self.prune(&store, &remote_ids)?;
        }

        let export = if self.opts.mbox {
            match export_directory(store.dir()) {
                Ok(export) => Some(export),
                Err(err) => {
                    warn!("mbox export of {canonical} failed: {err}");
                    None
                }
            }
        } else {
            None
        };

        let (decode, digest) = match self.opts.decode {
            Some(decode_opts) => self.decode(&store, decode_opts, &canonical),
            None => (None, None),
        };

        Ok(FolderReport {
            name: canonical,
            path: dir,
            stats,
            export,
            decode,
            digest,
        })
    }

    fn download(&mut self, store: &MessageStore, remote_ids: &[MessageId]) -> Result<FolderStats> {
        let plan = reconcile(remote_ids, &store.presence()?);
        let mut stats = FolderStats {
            total: remote_ids.len(),
            skipped: plan.to_skip.len(),
            ..Default::default()
        };

        for id in &plan.to_download {
            let result = self
                .remote
                .fetch_raw(id)
                .and_then(|raw| store.write(id, &raw));
            match result {
                Ok(stored) => {
                    debug!("saved {} ({} bytes)", stored.path.display(), stored.size);
                    stats.saved += 1;
                }
                Err(err) => {
                    warn!("failed to download message {id}: {err}");
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Remove local messages gone from the server, along with their decoded files.
    fn prune(&self, store: &MessageStore, remote_ids: &[MessageId]) -> Result<usize> {
        let decoded_dir = self.opts.layout.decoded_dir_for(store.dir());
        let mut removed = 0;
        for id in prune_stale(remote_ids, &store.local_ids()?) {
            match store.remove(&id) {
                Ok(true) => {
                    debug!("removed stale message {id}");
                    removed += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!("failed to remove stale message {id}: {err}");
                    continue;
                }
            }
            if decoded_dir.is_dir() {
                let file_name = format!("{id}.{RAW_EXTENSION}");
                if let Err(err) = remove_outputs(&decoded_dir, &file_name) {
                    warn!("failed to remove decoded files of {id}: {err}");
                }
            }
        }
        Ok(removed)
    }

    fn decode(
        &self,
        store: &MessageStore,
        decode_opts: DecodeOptions,
        canonical: &str,
    ) -> (Option<DecodeReport>, Option<Digest>) {
        let out_dir = self.opts.layout.decoded_dir_for(store.dir());
        let report = match decode_folder(store, &out_dir, decode_opts) {
            Ok(report) => report,
            Err(err) => {
                warn!("decoding {canonical} failed: {err}");
                return (None, None);
            }
        };

        if !decode_opts.html {
            return (Some(report), None);
        }

        let digest = match render(
            &out_dir,
            &report.html_files,
            self.opts.batch_size,
            &self.opts.markers,
        ) {
            Ok(digest) => Some(digest),
            Err(err) => {
                warn!("digest for {canonical} failed: {err}");
                None
            }
        };
        (Some(report), digest)
    }
}
