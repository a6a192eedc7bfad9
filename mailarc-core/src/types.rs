//! Common types used across mailarc.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-folder message identifier assigned by the server (an IMAP UID).
///
/// Only unique within one folder. Used as the stem of the local file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u32> for MessageId {
    fn from(uid: u32) -> Self {
        Self(uid.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// Numeric ids sort numerically so "9" comes before "10".
impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<u64>(), other.0.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Folder-scoped search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCriteria {
    All,
    Since(NaiveDate),
    Unseen,
}

impl SearchCriteria {
    /// Pick the filter from the configured options.
    ///
    /// Unseen wins over a date cutoff, which wins over everything.
    pub fn select(unseen: bool, max_age_days: Option<u32>, today: NaiveDate) -> Self {
        if unseen {
            return SearchCriteria::Unseen;
        }
        match max_age_days {
            Some(days) if days > 0 => {
                let cutoff = today - chrono::Duration::days(i64::from(days));
                SearchCriteria::Since(cutoff)
            }
            _ => SearchCriteria::All,
        }
    }

    /// IMAP SEARCH query text.
    pub fn to_imap_query(&self) -> String {
        match self {
            SearchCriteria::All => "ALL".to_string(),
            SearchCriteria::Since(date) => format!("SINCE {}", date.format("%d-%b-%Y")),
            SearchCriteria::Unseen => "UNSEEN".to_string(),
        }
    }
}

/// Outcome counters for one folder pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub removed: usize,
    pub total: usize,
}

impl fmt::Display for FolderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  Saved: {}\n  Skipped: {}\n  Failed: {}\n  Removed: {}\n  Total: {}",
            self.saved, self.skipped, self.failed, self.removed, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_numeric_order() {
        let mut ids: Vec<MessageId> = ["10", "9", "100", "abc", "2"]
            .into_iter()
            .map(MessageId::from)
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(sorted, vec!["2", "9", "10", "100", "abc"]);
    }

    #[test]
    fn test_search_priority() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(
            SearchCriteria::select(true, Some(7), today),
            SearchCriteria::Unseen
        );
        assert_eq!(
            SearchCriteria::select(false, Some(7), today),
            SearchCriteria::Since(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap())
        );
        assert_eq!(SearchCriteria::select(false, None, today), SearchCriteria::All);
        assert_eq!(
            SearchCriteria::select(false, Some(0), today),
            SearchCriteria::All
        );
    }

    #[test]
    fn test_imap_query() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        assert_eq!(SearchCriteria::Since(date).to_imap_query(), "SINCE 08-Mar-2024");
        assert_eq!(SearchCriteria::All.to_imap_query(), "ALL");
        assert_eq!(SearchCriteria::Unseen.to_imap_query(), "UNSEEN");
    }

    #[test]
    fn test_stats_display() {
        let stats = FolderStats {
            saved: 1,
            skipped: 2,
            failed: 0,
            removed: 3,
            total: 3,
        };
        let text = stats.to_string();
        assert!(text.contains("Saved: 1"));
        assert!(text.contains("Removed: 3"));
    }
}
