//! Path discovery and management for mailarc.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const APP_NAME: &str = "mailarc";

/// Application config file locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Global config file path (e.g., ~/.config/mailarc/config.toml)
    pub global_config: PathBuf,
    /// Local config file path (current directory config.toml)
    pub local_config: PathBuf,
    /// CLI-specified config file path
    pub cli_config: Option<PathBuf>,
}

impl AppPaths {
    /// Discover application paths based on XDG conventions and CLI options.
    pub fn discover(cli_config: Option<PathBuf>) -> Result<Self> {
        let global_config = default_config_dir()?.join("config.toml");
        let local_config = env::current_dir()
            .map_err(|e| Error::Path(format!("determining current directory: {e}")))?
            .join("config.toml");
        let cli_config = cli_config.map(expand_path).transpose()?;

        Ok(Self {
            global_config,
            local_config,
            cli_config,
        })
    }
}

/// Directory layout of one account's archive under a root.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
    account: String,
    decoded_dir: String,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>, account: &str, decoded_dir: &str) -> Self {
        Self {
            root: root.into(),
            account: account.to_string(),
            decoded_dir: decoded_dir.to_string(),
        }
    }

    /// `<root>/<account>`: raw messages, one directory per folder.
    pub fn account_dir(&self) -> PathBuf {
        self.root.join(&self.account)
    }

    /// `<root>/<decoded>/<account>`: decoded bodies and digests, mirroring the
    /// folder structure.
    pub fn decoded_account_dir(&self) -> PathBuf {
        self.root.join(&self.decoded_dir).join(&self.account)
    }

    /// Decoded counterpart of a raw folder directory.
    pub fn decoded_dir_for(&self, raw_dir: &Path) -> PathBuf {
        match raw_dir.strip_prefix(&self.root) {
            Ok(relative) => self.root.join(&self.decoded_dir).join(relative),
            Err(_) => self.root.join(&self.decoded_dir).join(raw_dir),
        }
    }
}

/// Expand shell variables and tilde in a path.
pub fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        expand_str_path(text)
    } else {
        Ok(path)
    }
}

/// Expand shell variables and tilde in a path string.
pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded =
        shellexpand::full(text).map_err(|e| Error::Path(format!("expanding path: {e}")))?;
    Ok(PathBuf::from(expanded.to_string()))
}

/// Get the default config directory following XDG conventions.
pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        let mut path = PathBuf::from(dir);
        path.push(APP_NAME);
        return Ok(path);
    }
    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| Error::Path("unable to determine configuration directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_paths_discover() {
        let paths = AppPaths::discover(None).unwrap();
        assert!(paths.global_config.ends_with("config.toml"));
        assert!(paths.local_config.ends_with("config.toml"));
        assert!(paths.cli_config.is_none());
    }

    #[test]
    fn test_archive_layout() {
        let layout = ArchiveLayout::new("/data", "me@example.com", "txt");
        assert_eq!(layout.account_dir(), PathBuf::from("/data/me@example.com"));
        assert_eq!(
            layout.decoded_account_dir(),
            PathBuf::from("/data/txt/me@example.com")
        );
        assert_eq!(
            layout.decoded_dir_for(Path::new("/data/me@example.com/Archive/2024")),
            PathBuf::from("/data/txt/me@example.com/Archive/2024")
        );
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_str_path("~/test").unwrap();
        assert!(!expanded.to_string_lossy().contains('~'));
    }
}
