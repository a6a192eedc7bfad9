//! Remote folder names and their local directory mapping.

use std::path::{Path, PathBuf};

/// Hierarchy separator used when the server does not report one.
pub const DEFAULT_DELIMITER: &str = "|";

/// A folder as reported by the server's LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    /// Name exactly as the server sent it; used for SELECT.
    pub name: String,
    /// Hierarchy separator, if the server reported one.
    pub delimiter: Option<String>,
    /// False for `\Noselect` containers.
    pub selectable: bool,
}

impl FolderInfo {
    pub fn new(name: impl Into<String>, delimiter: Option<&str>) -> Self {
        Self {
            name: name.into(),
            delimiter: delimiter.map(str::to_string),
            selectable: true,
        }
    }

    /// Resolve the local naming for this folder.
    pub fn folder_name(&self, fallback_delimiter: &str) -> FolderName {
        let delimiter = self.delimiter.as_deref().unwrap_or(fallback_delimiter);
        FolderName::parse(&self.name, delimiter)
    }
}

/// Local view of a remote folder name.
///
/// Forward slashes inside the server name are replaced with `_` before the
/// name is split on the server's hierarchy delimiter. Segments that would
/// step outside the account directory become `_`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderName {
    raw: String,
    segments: Vec<String>,
}

impl FolderName {
    pub fn parse(raw: &str, delimiter: &str) -> Self {
        let decoded = utf7_imap::decode_utf7_imap(raw.to_string());
        let sanitized = if delimiter == "/" {
            decoded
        } else {
            decoded.replace('/', "_")
        };

        let segments = if delimiter.is_empty() {
            vec![sanitize_segment(&sanitized)]
        } else {
            sanitized.split(delimiter).map(sanitize_segment).collect()
        };

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// Server-side name, used to select the folder.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Local path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Display name, segments joined with `/`. Include/exclude lists match on this.
    pub fn canonical(&self) -> String {
        self.segments.join("/")
    }

    /// Directory for this folder under `base`.
    pub fn local_path(&self, base: &Path) -> PathBuf {
        self.segments
            .iter()
            .fold(base.to_path_buf(), |path, segment| path.join(segment))
    }
}

fn sanitize_segment(segment: &str) -> String {
    match segment.trim() {
        "" | "." | ".." => "_".to_string(),
        _ => segment.replace(['\\', '\0'], "_"),
    }
}

/// Include/exclude selection over canonical folder names.
///
/// Both lists are evaluated; exclude wins when a folder is in both.
#[derive(Debug, Clone, Default)]
pub struct FolderFilter {
    include: Option<Vec<String>>,
    exclude: Vec<String>,
}

impl FolderFilter {
    pub fn new(include: Option<Vec<String>>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn allows(&self, canonical: &str) -> bool {
        if self.exclude.iter().any(|name| name == canonical) {
            return false;
        }
        match &self.include {
            Some(include) => include.iter().any(|name| name == canonical),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_hierarchy() {
        let name = FolderName::parse("Archive|2024", "|");
        assert_eq!(name.segments(), &["Archive".to_string(), "2024".to_string()]);
        assert_eq!(name.canonical(), "Archive/2024");
        assert_eq!(name.raw(), "Archive|2024");
    }

    #[test]
    fn test_slash_is_sanitized() {
        let name = FolderName::parse("Work/Projects|Q1", "|");
        assert_eq!(
            name.segments(),
            &["Work_Projects".to_string(), "Q1".to_string()]
        );
        assert_eq!(name.canonical(), "Work_Projects/Q1");
    }

    #[test]
    fn test_slash_delimiter_splits() {
        let name = FolderName::parse("INBOX/Sub", "/");
        assert_eq!(name.segments(), &["INBOX".to_string(), "Sub".to_string()]);
    }

    #[test]
    fn test_traversal_segments_neutralized() {
        let name = FolderName::parse("..|etc", "|");
        assert_eq!(name.segments(), &["_".to_string(), "etc".to_string()]);
    }

    #[test]
    fn test_modified_utf7_decoded() {
        // "Отправленные"
        let name = FolderName::parse("&BB4EQgQ,BEAEMAQyBDsENQQ9BD0ESwQ1-", "|");
        assert_eq!(name.canonical(), "Отправленные");
    }

    #[test]
    fn test_local_path() {
        let name = FolderName::parse("Archive|2024", "|");
        let path = name.local_path(Path::new("user@example.com"));
        assert_eq!(path, Path::new("user@example.com").join("Archive").join("2024"));
    }

    #[test]
    fn test_folder_info_fallback_delimiter() {
        let info = FolderInfo::new("A.B", Some("."));
        assert_eq!(info.folder_name("|").canonical(), "A/B");
        let info = FolderInfo::new("A|B", None);
        assert_eq!(info.folder_name("|").canonical(), "A/B");
    }

    #[test]
    fn test_filter_exclude_wins() {
        let filter = FolderFilter::new(
            Some(vec!["INBOX".to_string(), "Spam".to_string()]),
            vec!["Spam".to_string()],
        );
        assert!(filter.allows("INBOX"));
        assert!(!filter.allows("Spam"));
        assert!(!filter.allows("Sent"));
    }

    #[test]
    fn test_filter_default_allows_all() {
        let filter = FolderFilter::default();
        assert!(filter.allows("anything"));
    }
}
