//! Change-based deduplication of consecutive snapshots.
//!
//! Polling often captures the chain several times without any open interest
//! moving. Only the OI columns matter for this view, so a snapshot is dropped
//! when none of the strikes in its own window changed OI on either leg relative
//! to the last snapshot kept.

use crate::{
    chronology::OldestFirst,
    snapshot::{Leg, Snapshot},
    strike::StrikeSelector,
};
use tracing::debug;

/// Collapse runs of snapshots with no visible OI change, keeping the oldest of each run.
///
/// The first snapshot is always kept as the baseline. The output is chronological
/// and running it through this function again removes nothing.
pub fn dedup_unchanged<'a>(snapshots: &OldestFirst<'a>, selector: &StrikeSelector) -> OldestFirst<'a> {
    let mut kept: Vec<&'a Snapshot> = Vec::with_capacity(snapshots.len());

    for current in snapshots.iter() {
        match kept.last().copied() {
            None => kept.push(current),
            Some(baseline) if has_oi_change(current, baseline, selector) => kept.push(current),
            Some(_) => {}
        }
    }

    debug!(
        input = snapshots.len(),
        kept = kept.len(),
        "deduplicated unchanged snapshots"
    );

    OldestFirst::from_vec(kept)
}

/// True if any strike in `current`'s window shows a different CE or PE open interest
/// than `baseline`. Missing records and legs count as 0.
pub fn has_oi_change(current: &Snapshot, baseline: &Snapshot, selector: &StrikeSelector) -> bool {
    selector
        .window(current.spot_price)
        .strikes
        .into_iter()
        .any(|strike| {
            Leg::ALL
                .into_iter()
                .any(|leg| current.oi_at(strike, leg) != baseline.oi_at(strike, leg))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::LegQuote;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snapshot(minute: u32, spot: Decimal, chain: &[(Decimal, i64, i64)]) -> Snapshot {
        chain.iter().fold(
            Snapshot::new(format!("2024-01-15T04:{minute:02}:00Z"), spot),
            |snapshot, &(strike, call_oi, put_oi)| {
                snapshot.with_strike(strike, LegQuote::new(call_oi, 0), LegQuote::new(put_oi, 0))
            },
        )
    }

    fn selector() -> StrikeSelector {
        StrikeSelector::new(3, dec!(50)).unwrap()
    }

    fn minutes(snapshots: &OldestFirst<'_>) -> Vec<String> {
        snapshots.iter().map(|s| s.timestamp[14..16].to_string()).collect()
    }

    #[test]
    fn test_dedup_keeps_baseline_and_changes() {
        let chain = [(dec!(21950), 100, 200), (dec!(22000), 300, 400), (dec!(22050), 500, 600)];
        let mut changed = chain;
        changed[1].2 = 450;

        let history = vec![
            snapshot(0, dec!(22010), &chain),
            // Same OI, volume-only tick
            snapshot(1, dec!(22010), &chain)
                .with_strike(dec!(22000), LegQuote::new(300, 99), LegQuote::new(400, 99)),
            snapshot(2, dec!(22010), &changed),
            snapshot(3, dec!(22010), &changed),
            snapshot(4, dec!(22010), &chain),
        ];

        let kept = dedup_unchanged(&OldestFirst::from_oldest_first(&history), &selector());

        assert_eq!(minutes(&kept), vec!["00", "02", "04"]);
    }

    #[test]
    fn test_dedup_compares_against_last_kept() {
        // 01 drifts by one contract from 00 and is kept, 02 equals 01 and is dropped
        let history = vec![
            snapshot(0, dec!(22000), &[(dec!(22000), 100, 100)]),
            snapshot(1, dec!(22000), &[(dec!(22000), 101, 100)]),
            snapshot(2, dec!(22000), &[(dec!(22000), 101, 100)]),
        ];

        let kept = dedup_unchanged(&OldestFirst::from_oldest_first(&history), &selector());

        assert_eq!(minutes(&kept), vec!["00", "01"]);
    }

    #[test]
    fn test_dedup_window_follows_current_spot() {
        // Only 22200 changes. It is outside the window of 01 (spot 22000) but inside
        // the window of 02 (spot 22210)
        let base = [(dec!(22000), 100, 100), (dec!(22200), 100, 100)];
        let moved = [(dec!(22000), 100, 100), (dec!(22200), 150, 100)];
        let history = vec![
            snapshot(0, dec!(22000), &base),
            snapshot(1, dec!(22000), &moved),
            snapshot(2, dec!(22210), &moved),
        ];

        let kept = dedup_unchanged(&OldestFirst::from_oldest_first(&history), &selector());

        assert_eq!(minutes(&kept), vec!["00", "02"]);
    }

    #[test]
    fn test_dedup_missing_record_counts_as_zero() {
        let history = vec![
            snapshot(0, dec!(22000), &[]),
            snapshot(1, dec!(22000), &[(dec!(22000), 0, 0)]),
            snapshot(2, dec!(22000), &[(dec!(22000), 0, 5)]),
        ];

        let kept = dedup_unchanged(&OldestFirst::from_oldest_first(&history), &selector());

        assert_eq!(minutes(&kept), vec!["00", "02"]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let history: Vec<Snapshot> = [100, 100, 120, 120, 120, 90, 90, 130]
            .into_iter()
            .enumerate()
            .map(|(minute, oi)| {
                snapshot(
                    minute as u32,
                    dec!(22000) + Decimal::from(minute as i64 * 20),
                    &[(dec!(22000), oi, 50), (dec!(22050), 70, oi), (dec!(22100), 10, 10)],
                )
            })
            .collect();

        let once = dedup_unchanged(&OldestFirst::from_oldest_first(&history), &selector());
        let twice = dedup_unchanged(&once, &selector());

        assert_eq!(once, twice);
        assert!(once.len() < history.len());
    }

    #[test]
    fn test_dedup_empty() {
        assert!(dedup_unchanged(&OldestFirst::default(), &selector()).is_empty());
    }
}
