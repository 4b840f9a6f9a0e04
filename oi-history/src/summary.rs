use crate::{chronology::OldestFirst, diff::put_call_ratio, snapshot::Snapshot};
use chrono::TimeZone;
use itertools::{Itertools, MinMaxResult};
use std::fmt;

/// Chain-wide OI totals of one snapshot, as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct OiSummaryRow {
    pub time_label: String,
    pub call_oi: i64,
    pub put_oi: i64,
    pub pcr: f64,
}

impl OiSummaryRow {
    pub fn from_snapshot<Tz>(snapshot: &Snapshot, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let totals = snapshot.chain_totals;
        Self {
            time_label: snapshot.time_label(tz),
            call_oi: totals.call_oi,
            put_oi: totals.put_oi,
            pcr: put_call_ratio(totals.call_oi, totals.put_oi),
        }
    }
}

/// Summary rows for the visible history, newest first.
pub fn oi_summary<Tz>(snapshots: &OldestFirst<'_>, tz: &Tz) -> Vec<OiSummaryRow>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    snapshots
        .newest_first()
        .map(|snapshot| OiSummaryRow::from_snapshot(snapshot, tz))
        .collect()
}

/// Smallest and largest CE or PE total across `rows`, for chart axis bounds.
pub fn oi_bounds(rows: &[OiSummaryRow]) -> Option<(i64, i64)> {
    match rows.iter().flat_map(|row| [row.call_oi, row.put_oi]).minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(value) => Some((value, value)),
        MinMaxResult::MinMax(min, max) => Some((min, max)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn history() -> Vec<Snapshot> {
        vec![
            Snapshot::new("2024-01-15T04:00:00Z", dec!(22000)).with_chain_totals(100_000, 150_000),
            Snapshot::new("2024-01-15T04:05:00Z", dec!(22000)).with_chain_totals(0, 90_000),
            Snapshot::new("bad", dec!(22000)).with_chain_totals(120_000, 60_000),
        ]
    }

    #[test]
    fn test_oi_summary_newest_first() {
        let history = history();
        let rows = oi_summary(&OldestFirst::from_oldest_first(&history), &Utc);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].time_label, "Unknown Time");
        assert_eq!(rows[0].pcr, 0.5);
        assert_eq!(rows[1].time_label, "04:05:00");
        assert_eq!(rows[1].pcr, 0.0);
        assert_eq!(rows[2].time_label, "04:00:00");
        assert_eq!(rows[2].pcr, 1.5);
    }

    #[test]
    fn test_oi_bounds() {
        let history = history();
        let rows = oi_summary(&OldestFirst::from_oldest_first(&history), &Utc);

        assert_eq!(oi_bounds(&rows), Some((0, 150_000)));
        assert_eq!(oi_bounds(&rows[..0]), None);
    }
}
