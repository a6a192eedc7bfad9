//! Reconciliation of remote and local identifier sets for one folder.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::MessageId;

/// What to do with each remote identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Identifiers to fetch, in remote listing order.
    pub to_download: Vec<MessageId>,
    /// Identifiers already stored locally with content.
    pub to_skip: HashSet<MessageId>,
}

/// Split `remote` into downloads and skips.
///
/// An identifier is skipped iff `presence` marks it present and non-empty.
/// Duplicates in `remote` are queued once.
pub fn reconcile(remote: &[MessageId], presence: &HashMap<MessageId, bool>) -> Reconciliation {
    let mut result = Reconciliation::default();
    let mut queued = HashSet::new();

    for id in remote {
        if presence.get(id).copied().unwrap_or(false) {
            result.to_skip.insert(id.clone());
        } else if queued.insert(id) {
            result.to_download.push(id.clone());
        }
    }

    result
}

/// Local identifiers that are no longer on the server (`local \ remote`).
pub fn prune_stale(remote: &[MessageId], local: &[MessageId]) -> BTreeSet<MessageId> {
    let remote: HashSet<&MessageId> = remote.iter().collect();
    local
        .iter()
        .filter(|id| !remote.contains(id))
        .cloned()
        .collect()
}
