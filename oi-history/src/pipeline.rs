//! Filter → deduplicate → diff, as a single pure pass over borrowed history.

use crate::{
    chronology::{Chronology, OldestFirst},
    dedup::dedup_unchanged,
    diff::{SnapshotDiff, diff_snapshot},
    error::HistoryError,
    snapshot::Snapshot,
    strike::{DEFAULT_STRIKE_COUNT, DEFAULT_STRIKE_STEP, StrikeSelector},
    window::{HistoryQuery, filter_window},
};
use chrono::{DateTime, TimeZone};
use rust_decimal::Decimal;
use tracing::debug;

/// Default contract multiplier applied to OI values.
pub const DEFAULT_LOT_SIZE: u32 = 65;

/// Immutable settings shared by every pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub selector: StrikeSelector,
    pub lot_size: Decimal,
}

impl PipelineConfig {
    pub fn new(strike_count: usize, strike_step: Decimal, lot_size: Decimal) -> Result<Self, HistoryError> {
        if lot_size <= Decimal::ZERO {
            return Err(HistoryError::InvalidConfig(format!(
                "lot size {lot_size} must be positive"
            )));
        }

        Ok(Self {
            selector: StrikeSelector::new(strike_count, strike_step)?,
            lot_size,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            selector: StrikeSelector::default(),
            lot_size: Decimal::from(DEFAULT_LOT_SIZE),
        }
    }
}

/// Derives a [`HistoryView`] from the in-memory history.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryPipeline {
    config: PipelineConfig,
}

impl HistoryPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over `history`, expected oldest to newest and re-sorted if not.
    ///
    /// `now` fixes both "today" and the local time zone for the window filter.
    pub fn run<'a, Tz: TimeZone>(
        &self,
        history: &'a [Snapshot],
        query: &HistoryQuery,
        now: &DateTime<Tz>,
    ) -> HistoryView<'a> {
        let ordered = OldestFirst::chronological(history, &now.timezone());
        let visible = filter_window(&ordered, query, now);
        let deduped = dedup_unchanged(&visible, &self.config.selector);
        let chronology = Chronology::new(deduped);

        let diffs: Vec<SnapshotDiff<'a>> = chronology
            .with_predecessors()
            .map(|(snapshot, predecessor)| {
                diff_snapshot(snapshot, predecessor, &self.config.selector, self.config.lot_size)
            })
            .collect();

        debug!(
            history = history.len(),
            visible = visible.len(),
            rows = diffs.len(),
            ?query,
            "ran history pipeline"
        );

        HistoryView { visible, diffs }
    }
}

/// Output of one pipeline run.
///
/// Both the table and the CSV export read the same `diffs`; only their order differs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryView<'a> {
    visible: OldestFirst<'a>,
    diffs: Vec<SnapshotDiff<'a>>,
}

impl<'a> HistoryView<'a> {
    /// Filtered history before deduplication, oldest first.
    pub fn visible(&self) -> &OldestFirst<'a> {
        &self.visible
    }

    /// Deduplicated snapshot diffs, oldest first. Export order.
    pub fn diffs(&self) -> &[SnapshotDiff<'a>] {
        &self.diffs
    }

    /// Deduplicated snapshot diffs, newest first. Table order.
    pub fn table_rows(&self) -> impl ExactSizeIterator<Item = &SnapshotDiff<'a>> + '_ {
        self.diffs.iter().rev()
    }

    pub fn latest(&self) -> Option<&SnapshotDiff<'a>> {
        self.diffs.last()
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{snapshot::LegQuote, window::TimeFilter};
    use chrono::{FixedOffset, NaiveDate};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-15T15:00:00+05:30").unwrap()
    }

    fn snapshot(time: &str, call_oi: i64) -> Snapshot {
        Snapshot::new(format!("2024-01-15T{time}+05:30"), dec!(22000)).with_strike(
            dec!(22000),
            LegQuote::new(call_oi, 0),
            LegQuote::new(500, 0),
        )
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new(3, dec!(50), dec!(65)).unwrap()
    }

    #[test]
    fn test_pipeline_config_validation() {
        assert!(PipelineConfig::new(5, dec!(50), dec!(65)).is_ok());
        assert!(matches!(
            PipelineConfig::new(5, dec!(50), dec!(0)),
            Err(HistoryError::InvalidConfig(_))
        ));
        assert!(PipelineConfig::new(4, dec!(50), dec!(65)).is_err());
        assert_eq!(PipelineConfig::default().lot_size, dec!(65));
        assert_eq!(PipelineConfig::default().selector.count(), 5);
    }

    #[test]
    fn test_pipeline_empty_history() {
        let view = HistoryPipeline::new(config()).run(&[], &HistoryQuery::default(), &now());

        assert!(view.is_empty());
        assert!(view.visible().is_empty());
        assert_eq!(view.table_rows().count(), 0);
        assert!(view.latest().is_none());
    }

    #[test]
    fn test_pipeline_predecessor_is_last_kept_visible() {
        let history = vec![
            // Filtered out by the one hour lookback
            snapshot("13:00:00", 900),
            snapshot("14:10:00", 1000),
            // No OI change, deduplicated away
            snapshot("14:20:00", 1000),
            snapshot("14:30:00", 1200),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 1, 15);
        let query = HistoryQuery::new(today, Some(TimeFilter::LastHour));

        let view = HistoryPipeline::new(config()).run(&history, &query, &now());

        assert_eq!(view.visible().len(), 3);
        assert_eq!(view.len(), 2);

        let oldest = &view.diffs()[0];
        assert_eq!(oldest.snapshot.timestamp, "2024-01-15T14:10:00+05:30");
        assert!(!oldest.has_predecessor);
        assert!(!oldest.strikes[1].has_prev());

        let newest = view.table_rows().next().unwrap();
        assert_eq!(newest.snapshot.timestamp, "2024-01-15T14:30:00+05:30");
        assert_eq!(newest.strikes[1].call.oi_change.delta, 200);
        assert_eq!(newest.strikes[1].call.oi_change_pct, 20.0);
        assert_eq!(view.latest(), Some(newest));
    }

    #[test]
    fn test_pipeline_orders_history_before_diffing() {
        let history = vec![snapshot("14:30:00", 1200), snapshot("14:10:00", 1000)];

        let view = HistoryPipeline::new(config()).run(&history, &HistoryQuery::default(), &now());

        assert_eq!(view.diffs()[0].snapshot.timestamp, "2024-01-15T14:10:00+05:30");
        let newest = view.latest().unwrap();
        assert_eq!(newest.snapshot.timestamp, "2024-01-15T14:30:00+05:30");
        assert_eq!(newest.strikes[1].call.oi_change.delta, 200);
    }

    #[test]
    fn test_pipeline_leaves_history_untouched() {
        let history = vec![snapshot("14:10:00", 1000), snapshot("14:30:00", 1200)];
        let before = history.clone();

        let _ = HistoryPipeline::default().run(&history, &HistoryQuery::default(), &now());

        assert_eq!(history, before);
    }
}
