//! Incremental maintenance of the in-memory history list.

use crate::snapshot::Snapshot;
use tracing::debug;

/// Upper bound on retained history, roughly one full trading day of captures.
pub const HISTORY_CAP: usize = 5000;

/// Whether `latest` differs from the last snapshot seen.
///
/// A `latest` without an id is compared by timestamp only.
pub fn is_new_data(previous: Option<&Snapshot>, latest: &Snapshot) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    let id_changed = latest.id.is_some() && previous.id != latest.id;
    id_changed || previous.timestamp != latest.timestamp
}

fn is_same_record(existing: &Snapshot, latest: &Snapshot) -> bool {
    let same_id = matches!((&existing.id, &latest.id), (Some(a), Some(b)) if a == b);
    same_id || existing.timestamp == latest.timestamp
}

/// Append `latest` to `history` unless it is already present, then trim the
/// oldest records beyond `cap`. Returns whether `latest` was appended.
pub fn merge_latest(history: &mut Vec<Snapshot>, latest: Snapshot, cap: usize) -> bool {
    if history.iter().any(|existing| is_same_record(existing, &latest)) {
        debug!(timestamp = %latest.timestamp, "latest snapshot already in history");
        return false;
    }

    history.push(latest);

    if history.len() > cap {
        let excess = history.len() - cap;
        history.drain(..excess);
    }

    true
}
