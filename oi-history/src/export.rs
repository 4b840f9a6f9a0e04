//! CSV export of a [`HistoryView`].
//!
//! Rows are read from the same [`SnapshotDiff`]s the table renders, oldest first,
//! one row per strike of each snapshot's window.

use crate::{
    diff::{SnapshotDiff, StrikeDiff},
    error::HistoryError,
    pipeline::HistoryView,
};
use chrono::{NaiveDate, TimeZone};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{fmt, io::Write};
use tracing::debug;

/// Column headers, in file order. Written even when there are no rows.
pub const EXPORT_HEADERS: [&str; 20] = [
    "Timestamp",
    "NSE Time",
    "Spot Price",
    "Strike Price",
    "CE OI",
    "CE OI Change",
    "CE OI Change %",
    "CE OI Value",
    "CE Volume",
    "CE Vol Change",
    "CE IV",
    "CE LTP",
    "PE LTP",
    "PE IV",
    "PE Volume",
    "PE Vol Change",
    "PE OI Value",
    "PE OI",
    "PE OI Change",
    "PE OI Change %",
];

/// One exported line. Absent IV and LTP serialise as empty cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "NSE Time")]
    pub nse_time: String,
    #[serde(rename = "Spot Price")]
    pub spot_price: Decimal,
    #[serde(rename = "Strike Price")]
    pub strike_price: Decimal,
    #[serde(rename = "CE OI")]
    pub ce_oi: i64,
    #[serde(rename = "CE OI Change")]
    pub ce_oi_change: i64,
    #[serde(rename = "CE OI Change %")]
    pub ce_oi_change_pct: f64,
    #[serde(rename = "CE OI Value")]
    pub ce_oi_value: Decimal,
    #[serde(rename = "CE Volume")]
    pub ce_volume: i64,
    #[serde(rename = "CE Vol Change")]
    pub ce_volume_change: i64,
    #[serde(rename = "CE IV")]
    pub ce_iv: Option<f64>,
    #[serde(rename = "CE LTP")]
    pub ce_ltp: Option<f64>,
    #[serde(rename = "PE LTP")]
    pub pe_ltp: Option<f64>,
    #[serde(rename = "PE IV")]
    pub pe_iv: Option<f64>,
    #[serde(rename = "PE Volume")]
    pub pe_volume: i64,
    #[serde(rename = "PE Vol Change")]
    pub pe_volume_change: i64,
    #[serde(rename = "PE OI Value")]
    pub pe_oi_value: Decimal,
    #[serde(rename = "PE OI")]
    pub pe_oi: i64,
    #[serde(rename = "PE OI Change")]
    pub pe_oi_change: i64,
    #[serde(rename = "PE OI Change %")]
    pub pe_oi_change_pct: f64,
}

impl ExportRow {
    pub fn new<Tz>(diff: &SnapshotDiff<'_>, strike: &StrikeDiff, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let snapshot = diff.snapshot;
        let StrikeDiff { call, put, .. } = strike;

        Self {
            timestamp: snapshot.datetime_label(tz),
            nse_time: snapshot.nse_timestamp.clone().unwrap_or_default(),
            spot_price: snapshot.spot_price,
            strike_price: strike.strike,
            ce_oi: call.open_interest,
            ce_oi_change: call.oi_change.delta,
            ce_oi_change_pct: call.oi_change_pct,
            ce_oi_value: call.oi_value,
            ce_volume: call.volume,
            ce_volume_change: call.volume_change.delta,
            ce_iv: call.implied_volatility,
            ce_ltp: call.last_price,
            pe_ltp: put.last_price,
            pe_iv: put.implied_volatility,
            pe_volume: put.volume,
            pe_volume_change: put.volume_change.delta,
            pe_oi_value: put.oi_value,
            pe_oi: put.open_interest,
            pe_oi_change: put.oi_change.delta,
            pe_oi_change_pct: put.oi_change_pct,
        }
    }
}

/// Export rows for `view`, oldest snapshot first, strikes ascending.
pub fn export_rows<Tz>(view: &HistoryView<'_>, tz: &Tz) -> Vec<ExportRow>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    view.diffs()
        .iter()
        .flat_map(|diff| diff.strikes.iter().map(move |strike| ExportRow::new(diff, strike, tz)))
        .collect()
}

/// Write the header and `rows` as CSV.
pub fn write_csv<W: Write>(writer: W, rows: &[ExportRow]) -> Result<(), HistoryError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

    writer.write_record(EXPORT_HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    debug!(rows = rows.len(), "wrote csv export");
    Ok(())
}

/// `oi_history_<date>.csv`, dated by the active date filter or `today`.
pub fn export_file_name(selected_date: Option<NaiveDate>, today: NaiveDate) -> String {
    let date = selected_date.unwrap_or(today);
    format!("oi_history_{}.csv", date.format("%Y-%m-%d"))
}
