//! Explicit ordering of snapshot sequences.
//!
//! Stages that depend on chronology take an [`OldestFirst`] sequence, and the
//! newest-first display order is always an explicit reversal of one. Predecessors
//! are looked up through [`Chronology`], never inferred from a display index.

use crate::snapshot::Snapshot;
use chrono::TimeZone;
use tracing::warn;

/// Borrowed snapshots in chronological order, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OldestFirst<'a>(Vec<&'a Snapshot>);

impl<'a> OldestFirst<'a> {
    /// Wrap history delivered by the data source, which is sorted oldest to newest.
    pub fn from_oldest_first(snapshots: &'a [Snapshot]) -> Self {
        Self(snapshots.iter().collect())
    }

    /// Wrap history expected to be sorted oldest to newest, re-sorting it if it is not.
    ///
    /// The sort is stable and keyed by the parsed instant; snapshots with a malformed
    /// timestamp sort ahead of all others. Already-ordered input is kept as is.
    pub fn chronological<Tz: TimeZone>(snapshots: &'a [Snapshot], tz: &Tz) -> Self {
        let in_order = snapshots
            .iter()
            .filter_map(|snapshot| snapshot.instant_in(tz))
            .is_sorted();
        if in_order {
            return Self::from_oldest_first(snapshots);
        }

        warn!(records = snapshots.len(), "history out of chronological order, sorting");
        let mut sorted: Vec<&'a Snapshot> = snapshots.iter().collect();
        sorted.sort_by_cached_key(|snapshot| snapshot.instant_in(tz));
        Self(sorted)
    }

    /// Reverse a newest-first sequence into chronological order.
    pub fn from_newest_first<I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = &'a Snapshot>,
    {
        let mut snapshots: Vec<&'a Snapshot> = snapshots.into_iter().collect();
        snapshots.reverse();
        Self(snapshots)
    }

    pub(crate) fn from_vec(snapshots: Vec<&'a Snapshot>) -> Self {
        Self(snapshots)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'a Snapshot> + ExactSizeIterator + '_ {
        self.0.iter().copied()
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &'a Snapshot> + '_ {
        self.0.iter().rev().copied()
    }

    pub fn as_slice(&self) -> &[&'a Snapshot] {
        &self.0
    }
}

/// Predecessor lookup over a filtered, deduplicated oldest-first sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chronology<'a> {
    snapshots: OldestFirst<'a>,
}

impl<'a> Chronology<'a> {
    pub fn new(snapshots: OldestFirst<'a>) -> Self {
        Self { snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The chronologically older neighbour of the snapshot at `index`.
    pub fn predecessor_of(&self, index: usize) -> Option<&'a Snapshot> {
        if index >= self.snapshots.len() {
            return None;
        }
        let previous = index.checked_sub(1)?;
        self.snapshots.as_slice().get(previous).copied()
    }

    /// Each snapshot paired with its predecessor, oldest first.
    pub fn with_predecessors(
        &self,
    ) -> impl Iterator<Item = (&'a Snapshot, Option<&'a Snapshot>)> + '_ {
        self.snapshots
            .iter()
            .enumerate()
            .map(|(index, snapshot)| (snapshot, self.predecessor_of(index)))
    }
}
