//! # OI History
//! Processing pipeline for options-chain open interest snapshot history.
//!
//! Given the in-memory history of chain snapshots (oldest first), the pipeline
//! - filters it by calendar day and relative lookback ([`window`]),
//! - drops snapshots with no visible OI movement ([`dedup`]),
//! - derives per-strike changes against the previous kept snapshot and per-leg
//!   aggregates ([`diff`]).
//!
//! The resulting [`HistoryView`] backs both the newest-first table and the
//! oldest-first CSV [`export`], so the two can never disagree.
//!
//! ```ignore
//! let pipeline = HistoryPipeline::new(PipelineConfig::new(5, dec!(50), dec!(65))?);
//! let view = pipeline.run(&history, &HistoryQuery::new(Some(today), None), &Local::now());
//! for row in view.table_rows() { /* render */ }
//! ```

/// All [`Error`](std::error::Error)s generated in `oi-history`.
pub mod error;

/// Wire-compatible [`Snapshot`] data model.
pub mod snapshot;

/// ATM strike and strike window selection.
pub mod strike;

/// Explicit oldest-first ordering and predecessor lookup.
pub mod chronology;

pub mod window;
pub mod dedup;
pub mod diff;
pub mod export;

/// Chain-wide OI totals and put/call ratio per snapshot.
pub mod summary;

pub mod merge;
pub mod pipeline;

pub use chronology::{Chronology, OldestFirst};
pub use diff::{Change, LegDiff, LegTotals, SnapshotDiff, StrikeDiff};
pub use error::HistoryError;
pub use export::{ExportRow, export_file_name, export_rows, write_csv};
pub use merge::{HISTORY_CAP, is_new_data, merge_latest};
pub use pipeline::{DEFAULT_LOT_SIZE, HistoryPipeline, HistoryView, PipelineConfig};
pub use snapshot::{Leg, LegQuote, Snapshot, StrikeRecord};
pub use strike::{StrikeSelector, StrikeWindow};
pub use summary::{OiSummaryRow, oi_summary};
pub use window::{HistoryQuery, TimeFilter};
