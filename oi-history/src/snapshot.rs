//! Option-chain snapshot data model.
//!
//! These types match the JSON records served by the history API
//! (`/api/latest`, `/api/history`). Every numeric field is optional on the wire;
//! accessors apply the defaults the pipeline relies on.

use crate::error::HistoryError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::{collections::BTreeMap, fmt};

/// Label shown in place of a timestamp that does not parse.
pub const UNKNOWN_TIME: &str = "Unknown Time";

/// Option leg of a strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Leg {
    #[display("CE")]
    Call,
    #[display("PE")]
    Put,
}

impl Leg {
    pub const ALL: [Leg; 2] = [Leg::Call, Leg::Put];
}

/// One side (call or put) of one strike in one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegQuote {
    #[serde(default, deserialize_with = "de_count")]
    pub open_interest: Option<i64>,
    #[serde(default, deserialize_with = "de_count")]
    pub total_traded_volume: Option<i64>,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
    #[serde(default)]
    pub last_price: Option<f64>,
    /// Server-reported OI change, only used when no predecessor is visible.
    #[serde(default, deserialize_with = "de_count")]
    pub diff_open_interest: Option<i64>,
    /// Server-reported volume change, only used when no predecessor is visible.
    #[serde(default, deserialize_with = "de_count")]
    pub diff_total_traded_volume: Option<i64>,
}

impl LegQuote {
    pub fn new(open_interest: i64, total_traded_volume: i64) -> Self {
        Self {
            open_interest: Some(open_interest),
            total_traded_volume: Some(total_traded_volume),
            ..Default::default()
        }
    }

    pub fn with_iv(mut self, implied_volatility: f64) -> Self {
        self.implied_volatility = Some(implied_volatility);
        self
    }

    pub fn with_ltp(mut self, last_price: f64) -> Self {
        self.last_price = Some(last_price);
        self
    }

    pub fn with_reported_diff(mut self, open_interest: i64, volume: i64) -> Self {
        self.diff_open_interest = Some(open_interest);
        self.diff_total_traded_volume = Some(volume);
        self
    }

    /// Open interest, absent treated as 0.
    pub fn oi(&self) -> i64 {
        self.open_interest.unwrap_or(0)
    }

    /// Traded volume, absent treated as 0.
    pub fn volume(&self) -> i64 {
        self.total_traded_volume.unwrap_or(0)
    }
}

/// Call and put quotes for a single strike.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrikeRecord {
    #[serde(rename = "strikePrice")]
    pub strike_price: Decimal,
    #[serde(rename = "CE", default)]
    pub call: Option<LegQuote>,
    #[serde(rename = "PE", default)]
    pub put: Option<LegQuote>,
}

impl StrikeRecord {
    pub fn leg(&self, leg: Leg) -> Option<&LegQuote> {
        match leg {
            Leg::Call => self.call.as_ref(),
            Leg::Put => self.put.as_ref(),
        }
    }
}

/// Chain-wide OI totals reported by the server (`filtered.CE.totOI`, `filtered.PE.totOI`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainTotals {
    pub call_oi: i64,
    pub put_oi: i64,
}

/// One timestamped capture of the option chain.
///
/// Snapshots are immutable once decoded; the pipeline only ever borrows them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "SnapshotRecord")]
pub struct Snapshot {
    /// Opaque record id (`_id`), used to detect duplicates when merging history.
    pub id: Option<String>,
    /// Raw timestamp as delivered; see [`Snapshot::instant_in`].
    pub timestamp: String,
    /// Exchange-reported time label.
    pub nse_timestamp: Option<String>,
    /// Underlying value, 0 when absent.
    pub spot_price: Decimal,
    /// At most one record per strike price.
    pub strikes: BTreeMap<Decimal, StrikeRecord>,
    pub chain_totals: ChainTotals,
}

impl Snapshot {
    pub fn new(timestamp: impl Into<String>, spot_price: Decimal) -> Self {
        Self {
            id: None,
            timestamp: timestamp.into(),
            nse_timestamp: None,
            spot_price,
            strikes: BTreeMap::new(),
            chain_totals: ChainTotals::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_nse_timestamp(mut self, label: impl Into<String>) -> Self {
        self.nse_timestamp = Some(label.into());
        self
    }

    pub fn with_chain_totals(mut self, call_oi: i64, put_oi: i64) -> Self {
        self.chain_totals = ChainTotals { call_oi, put_oi };
        self
    }

    /// Insert a strike record, replacing any existing record for the same strike.
    pub fn with_strike(mut self, strike_price: Decimal, call: LegQuote, put: LegQuote) -> Self {
        self.strikes.insert(
            strike_price,
            StrikeRecord {
                strike_price,
                call: Some(call),
                put: Some(put),
            },
        );
        self
    }

    pub fn record(&self, strike: Decimal) -> Option<&StrikeRecord> {
        self.strikes.get(&strike)
    }

    pub fn quote(&self, strike: Decimal, leg: Leg) -> Option<&LegQuote> {
        self.record(strike).and_then(|record| record.leg(leg))
    }

    /// Open interest for a strike/leg, missing record or leg treated as 0.
    pub fn oi_at(&self, strike: Decimal, leg: Leg) -> i64 {
        self.quote(strike, leg).map(LegQuote::oi).unwrap_or(0)
    }

    /// Traded volume for a strike/leg, missing record or leg treated as 0.
    pub fn volume_at(&self, strike: Decimal, leg: Leg) -> i64 {
        self.quote(strike, leg).map(LegQuote::volume).unwrap_or(0)
    }

    /// The instant this snapshot was taken, expressed in `tz`.
    ///
    /// Returns `None` for a malformed timestamp.
    pub fn instant_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        parse_timestamp(&self.timestamp, tz).ok()
    }

    /// `HH:MM:SS` in `tz`, or [`UNKNOWN_TIME`].
    pub fn time_label<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: fmt::Display,
    {
        self.format_instant(tz, "%H:%M:%S")
    }

    /// `YYYY-MM-DD HH:MM:SS` in `tz`, or [`UNKNOWN_TIME`].
    pub fn datetime_label<Tz: TimeZone>(&self, tz: &Tz) -> String
    where
        Tz::Offset: fmt::Display,
    {
        self.format_instant(tz, "%Y-%m-%d %H:%M:%S")
    }

    fn format_instant<Tz: TimeZone>(&self, tz: &Tz, pattern: &str) -> String
    where
        Tz::Offset: fmt::Display,
    {
        match self.instant_in(tz) {
            Some(instant) => instant.format(pattern).to_string(),
            None => UNKNOWN_TIME.to_string(),
        }
    }
}

/// Parse a snapshot timestamp.
///
/// Accepts RFC 3339 instants, offset-less date-times (read as wall-clock time in `tz`)
/// and bare dates (read as UTC midnight).
pub fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Result<DateTime<Tz>, HistoryError> {
    let raw = raw.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(tz));
    }

    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, pattern) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| HistoryError::MalformedTimestamp(raw.to_string()));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc
            .from_utc_datetime(&date.and_time(NaiveTime::MIN))
            .with_timezone(tz));
    }

    Err(HistoryError::MalformedTimestamp(raw.to_string()))
}

/// Wire shape of a history record.
#[derive(Debug, Deserialize)]
struct SnapshotRecord {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    data: SnapshotData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotData {
    #[serde(default)]
    nse_timestamp: Option<String>,
    #[serde(default)]
    records: Option<ChainRecords>,
    #[serde(default)]
    filtered: Option<FilteredTotals>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainRecords {
    #[serde(default)]
    underlying_value: Option<Decimal>,
    #[serde(default)]
    data: Option<Vec<StrikeRecord>>,
}

#[derive(Debug, Default, Deserialize)]
struct FilteredTotals {
    #[serde(rename = "CE", default)]
    call: Option<LegTotal>,
    #[serde(rename = "PE", default)]
    put: Option<LegTotal>,
}

#[derive(Debug, Default, Deserialize)]
struct LegTotal {
    #[serde(rename = "totOI", default, deserialize_with = "de_count")]
    tot_oi: Option<i64>,
}

impl From<SnapshotRecord> for Snapshot {
    fn from(record: SnapshotRecord) -> Self {
        let SnapshotData {
            nse_timestamp,
            records,
            filtered,
        } = record.data;
        let records = records.unwrap_or_default();

        // First occurrence of a strike wins
        let mut strikes = BTreeMap::new();
        for strike in records.data.unwrap_or_default() {
            strikes.entry(strike.strike_price).or_insert(strike);
        }

        let filtered = filtered.unwrap_or_default();
        let total = |leg: Option<LegTotal>| leg.and_then(|leg| leg.tot_oi).unwrap_or(0);

        Self {
            id: record.id,
            timestamp: record.timestamp,
            nse_timestamp,
            spot_price: records.underlying_value.unwrap_or(Decimal::ZERO),
            strikes,
            chain_totals: ChainTotals {
                call_oi: total(filtered.call),
                put_oi: total(filtered.put),
            },
        }
    }
}

/// Integer counts arrive as JSON integers or integral floats.
///
/// Fractional or out-of-range floats are rejected rather than truncated.
fn de_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Int(i64),
        Float(f64),
    }

    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Int(value)) => Ok(Some(value)),
        Some(Count::Float(value)) if value.fract() == 0.0 && value >= -LIMIT && value < LIMIT => {
            Ok(Some(value as i64))
        }
        Some(Count::Float(value)) => Err(serde::de::Error::custom(format!(
            "count {value} is not an integer in range"
        ))),
    }
}
