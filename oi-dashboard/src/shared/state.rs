//! Dashboard state owned by the terminal UI
//!
//! Holds the raw history list and the user's selections. Everything shown on
//! screen is derived from it afresh through [`HistoryPipeline`] on each render.

use super::{
    config::{ColumnVisibility, DashboardConfig, Symbol, next_date, step_strike_count},
    export::write_export,
    poller::{ConnectionStatus, PollCommand, PollEvent},
};
use chrono::{DateTime, NaiveDate, TimeZone};
use oi_history::{
    HISTORY_CAP, HistoryError, HistoryPipeline, HistoryQuery, HistoryView, OiSummaryRow,
    PipelineConfig, Snapshot, export_file_name, export_rows, merge_latest, oi_summary,
};
use rust_decimal::Decimal;
use std::{fmt, path::PathBuf};
use tracing::{debug, info};

/// Mutable dashboard state
#[derive(Debug, Clone)]
pub struct DashboardState {
    /// Snapshots for the current symbol and query, oldest first
    pub history: Vec<Snapshot>,
    /// Most recent snapshot reported by the poller
    pub latest: Option<Snapshot>,
    pub symbol: Symbol,
    pub query: HistoryQuery,
    pub strike_count: usize,
    pub strike_step: Decimal,
    pub lot_size: Decimal,
    pub columns: ColumnVisibility,
    pub show_summary: bool,
    pub status: ConnectionStatus,
    /// Generation of the active query, bumped on every reset
    pub generation: u64,
    pub export_dir: PathBuf,
    /// One-line feedback shown in the footer
    pub message: Option<String>,
}

impl DashboardState {
    pub fn new(config: &DashboardConfig) -> Self {
        Self {
            history: Vec::new(),
            latest: None,
            symbol: config.symbol,
            query: config.query,
            strike_count: config.strike_count,
            strike_step: config.strike_step,
            lot_size: config.lot_size,
            columns: ColumnVisibility::default(),
            show_summary: true,
            status: ConnectionStatus::Connecting,
            generation: 0,
            export_dir: config.export_dir.clone(),
            message: None,
        }
    }

    /// Apply a poller event, ignoring events for a superseded query
    ///
    /// Returns whether the event was applied.
    pub fn apply(&mut self, event: PollEvent) -> bool {
        if event.generation() != self.generation {
            debug!(
                event_generation = event.generation(),
                generation = self.generation,
                "dropping stale poll event"
            );
            return false;
        }

        match event {
            PollEvent::Latest { snapshot, .. } => {
                self.latest = Some(snapshot);
            }
            PollEvent::History { snapshots, kind, .. } => {
                debug!(records = snapshots.len(), ?kind, "replacing history");
                self.history = snapshots;
                if self.history.len() > HISTORY_CAP {
                    let excess = self.history.len() - HISTORY_CAP;
                    self.history.drain(..excess);
                }
            }
            PollEvent::Append { snapshot, .. } => {
                merge_latest(&mut self.history, snapshot, HISTORY_CAP);
            }
        }
        true
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    /// Start a new generation, clearing data that belongs to the old query
    fn reset(&mut self) -> PollCommand {
        self.generation += 1;
        self.history.clear();
        self.latest = None;

        info!(
            generation = self.generation,
            symbol = %self.symbol,
            query = ?self.query,
            "query changed"
        );

        PollCommand::Reset {
            generation: self.generation,
            symbol: self.symbol,
            query: self.query,
        }
    }

    /// Switch to the next symbol
    pub fn cycle_symbol(&mut self) -> PollCommand {
        self.symbol = self.symbol.next();
        self.reset()
    }

    /// Step through the date selector
    pub fn cycle_date(&mut self, today: NaiveDate) -> PollCommand {
        self.query.selected_date = next_date(self.query.selected_date, today);
        self.reset()
    }

    /// Step through the relative time filter
    pub fn cycle_time_filter(&mut self) -> PollCommand {
        self.query.time_filter = Some(self.query.time_filter.unwrap_or_default().next());
        self.reset()
    }

    /// Widen or narrow the strike window. Purely a view change, no refetch.
    pub fn step_strike_count(&mut self, increase: bool) {
        self.strike_count = step_strike_count(self.strike_count, increase);
    }

    pub fn toggle_column(&mut self, key: u8) -> bool {
        self.columns.toggle(key)
    }

    pub fn toggle_summary(&mut self) {
        self.show_summary = !self.show_summary;
    }

    /// Pipeline for the current strike window and lot size
    pub fn pipeline(&self) -> Result<HistoryPipeline, HistoryError> {
        PipelineConfig::new(self.strike_count, self.strike_step, self.lot_size).map(HistoryPipeline::new)
    }

    /// Derive the current view of the history
    pub fn view<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<HistoryView<'_>, HistoryError> {
        Ok(self.pipeline()?.run(&self.history, &self.query, now))
    }

    /// Chain-wide OI summary of the visible history, newest first
    pub fn summary<Tz>(&self, view: &HistoryView<'_>, tz: &Tz) -> Vec<OiSummaryRow>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        oi_summary(view.visible(), tz)
    }

    /// Write the current view to a CSV file in the export directory
    pub fn export<Tz>(&self, now: &DateTime<Tz>) -> Result<PathBuf, HistoryError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let view = self.view(now)?;
        let rows = export_rows(&view, &now.timezone());
        let file_name = export_file_name(self.query.selected_date, now.date_naive());

        write_export(&self.export_dir, &file_name, &rows)
    }
}
