//! Configuration management for mailarc.

use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::decode::DecodeOptions;
use crate::digest::{DEFAULT_BATCH_SIZE, Markers};
use crate::error::{Error, Result};
use crate::folder::DEFAULT_DELIMITER;
use crate::paths::{AppPaths, expand_str_path};

const APP_NAME: &str = "mailarc";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mail server connection.
    pub imap: ImapConfig,
    /// Local archive layout and post-processing.
    pub archive: ArchiveConfig,
    /// Message decoding.
    pub decode: DecodeConfig,
    /// Digest pages.
    pub digest: DigestConfig,
    /// Folder and message selection.
    pub filters: FilterConfig,
}

/// IMAP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    /// Hierarchy separator assumed when the server reports none.
    pub delimiter: String,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: "imap.yandex.com".to_string(),
            port: 993,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

/// Archive settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Directory holding `<account>/` and the decoded output; defaults to the
    /// current directory.
    pub root: Option<String>,
    /// Fold each folder into an mbox file after downloading.
    pub mbox: bool,
    /// Delete local messages that are gone from the server.
    pub prune: bool,
}

/// Decode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Decode messages after downloading.
    pub enabled: bool,
    pub text: bool,
    pub html: bool,
    pub attachments: bool,
    /// Output directory, relative to the archive root.
    pub output_dir: String,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: true,
            html: true,
            attachments: false,
            output_dir: "txt".to_string(),
        }
    }
}

impl DecodeConfig {
    pub fn options(&self) -> DecodeOptions {
        DecodeOptions {
            text: self.text,
            html: self.html,
            attachments: self.attachments,
        }
    }
}

/// Digest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DigestConfig {
    /// Letters per batch page.
    pub batch_size: usize,
    pub start_marker: String,
    pub end_marker: String,
    pub title: String,
}

impl Default for DigestConfig {
    fn default() -> Self {
        let markers = Markers::default();
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            start_marker: markers.start,
            end_marker: markers.end,
            title: markers.title,
        }
    }
}

impl DigestConfig {
    pub fn markers(&self) -> Markers {
        Markers {
            start: self.start_marker.clone(),
            end: self.end_marker.clone(),
            title: self.title.clone(),
        }
    }
}

/// Selection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Only these folders (canonical names) when set.
    pub include: Option<Vec<String>>,
    /// Never these folders; wins over `include`.
    pub exclude: Vec<String>,
    /// Only messages newer than this many days.
    pub max_age_days: Option<u32>,
    /// Only unseen messages; wins over `max_age_days`.
    pub unseen: bool,
}

impl AppConfig {
    /// Load configuration from paths with environment overlay.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        let env_prefix = env_prefix();
        let mut builder = Config::builder()
            .add_source(
                File::from(paths.global_config.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                File::from(paths.local_config.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(&env_prefix).separator("__"));

        if let Some(cli_cfg) = &paths.cli_config {
            builder = builder.add_source(
                File::from(cli_cfg.as_path())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        let defaults = AppConfig::default();
        builder = builder
            .set_default("imap.host", defaults.imap.host)?
            .set_default("imap.port", i64::from(defaults.imap.port))?
            .set_default("imap.delimiter", defaults.imap.delimiter)?
            .set_default("decode.output_dir", defaults.decode.output_dir)?
            .set_default("digest.batch_size", defaults.digest.batch_size as i64)?;

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.digest.batch_size == 0 {
            return Err(Error::Config("digest.batch_size must be at least 1".into()));
        }
        if self.imap.host.trim().is_empty() {
            return Err(Error::Config("imap.host must not be empty".into()));
        }
        Ok(())
    }

    /// Archive root, with `~` and variables expanded.
    pub fn archive_root(&self) -> Result<PathBuf> {
        match &self.archive.root {
            Some(root) => expand_str_path(root),
            None => Ok(PathBuf::from(".")),
        }
    }

    /// Write default config to a path.
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("creating config directory {parent:?}: {e}")))?;
        }
        let cfg = AppConfig::default();
        let toml = toml::to_string_pretty(&cfg)
            .map_err(|e| Error::Config(format!("serializing default config: {e}")))?;
        let mut content = String::new();
        content.push_str("# mailarc configuration\n");
        content.push_str(
            "# Place this file at $XDG_CONFIG_HOME/mailarc/config.toml (or ~/.config/mailarc/config.toml)\n\n",
        );
        content.push_str(&toml);
        content.push('\n');
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("writing config file to {}: {e}", path.display())))
    }

    /// Ensure default config exists, creating it if necessary.
    pub fn ensure_default(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        Self::write_default(path)
    }
}

/// Generate environment variable prefix from app name.
fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
