//! Date and relative-time windowing of snapshot history.

use crate::{chronology::OldestFirst, snapshot::Snapshot};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use derive_more::Display;
use tracing::debug;

/// Relative time filter selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum TimeFilter {
    #[display("1h")]
    LastHour,
    #[display("3h")]
    LastThreeHours,
    #[display("6h")]
    LastSixHours,
    /// Any unrecognised non-`all` value falls back to a day.
    #[display("24h")]
    LastDay,
    #[default]
    #[display("all")]
    All,
}

impl TimeFilter {
    /// Options offered to the user, in cycling order.
    pub const CHOICES: [TimeFilter; 4] = [
        TimeFilter::LastHour,
        TimeFilter::LastThreeHours,
        TimeFilter::LastSixHours,
        TimeFilter::All,
    ];

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "1h" => TimeFilter::LastHour,
            "3h" => TimeFilter::LastThreeHours,
            "6h" => TimeFilter::LastSixHours,
            "all" | "" => TimeFilter::All,
            _ => TimeFilter::LastDay,
        }
    }

    /// Lookback duration, `None` for [`TimeFilter::All`].
    pub fn lookback(&self) -> Option<TimeDelta> {
        self.hours_back().map(|hours| TimeDelta::hours(i64::from(hours)))
    }

    fn hours_back(&self) -> Option<u32> {
        match self {
            TimeFilter::LastHour => Some(1),
            TimeFilter::LastThreeHours => Some(3),
            TimeFilter::LastSixHours => Some(6),
            TimeFilter::LastDay => Some(24),
            TimeFilter::All => None,
        }
    }

    /// Hours understood by the history API's `hours` parameter.
    pub fn api_hours(&self) -> Option<u32> {
        match self {
            TimeFilter::LastDay | TimeFilter::All => None,
            other => other.hours_back(),
        }
    }

    pub fn next(&self) -> Self {
        let position = Self::CHOICES.iter().position(|choice| choice == self);
        match position {
            Some(index) => Self::CHOICES[(index + 1) % Self::CHOICES.len()],
            None => TimeFilter::All,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeFilter::LastHour => "Last 1 Hour",
            TimeFilter::LastThreeHours => "Last 3 Hours",
            TimeFilter::LastSixHours => "Last 6 Hours",
            TimeFilter::LastDay => "Last 24 Hours",
            TimeFilter::All => "All Time",
        }
    }
}

impl From<&str> for TimeFilter {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// The `(date, relative-time)` filter pair applied before deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Local calendar day, `None` for all time.
    pub selected_date: Option<NaiveDate>,
    pub time_filter: Option<TimeFilter>,
}

impl HistoryQuery {
    pub fn new(selected_date: Option<NaiveDate>, time_filter: Option<TimeFilter>) -> Self {
        Self {
            selected_date,
            time_filter,
        }
    }

    /// True when a date other than `today` is selected.
    pub fn is_past_date(&self, today: NaiveDate) -> bool {
        self.selected_date.is_some_and(|date| date != today)
    }

    /// The relative lookback that actually applies on `today`.
    ///
    /// Relative filters are meaningless for a past day and are ignored there.
    pub fn effective_lookback(&self, today: NaiveDate) -> Option<TimeDelta> {
        if self.is_past_date(today) {
            return None;
        }
        self.time_filter.and_then(|filter| filter.lookback())
    }
}

/// Keep the snapshots of `snapshots` visible under `query` at `now`.
///
/// The local time zone is the zone of `now`. Input order is preserved. Snapshots
/// whose timestamp does not parse fail every active predicate.
pub fn filter_window<'a, Tz: TimeZone>(
    snapshots: &OldestFirst<'a>,
    query: &HistoryQuery,
    now: &DateTime<Tz>,
) -> OldestFirst<'a> {
    let tz = now.timezone();
    let day_bounds = query.selected_date.map(day_bounds);
    let cutoff = query
        .effective_lookback(now.date_naive())
        .map(|lookback| now.clone() - lookback);

    if day_bounds.is_none() && cutoff.is_none() {
        return snapshots.clone();
    }

    let visible: Vec<&'a Snapshot> = snapshots
        .iter()
        .filter(|snapshot| {
            let Some(instant) = snapshot.instant_in(&tz) else {
                return false;
            };

            let in_day = day_bounds.is_none_or(|(start, end)| {
                let local = instant.naive_local();
                local >= start && local <= end
            });
            let in_lookback = cutoff.as_ref().is_none_or(|cutoff| &instant >= cutoff);

            in_day && in_lookback
        })
        .collect();

    debug!(
        input = snapshots.len(),
        visible = visible.len(),
        "applied history window"
    );

    OldestFirst::from_vec(visible)
}

/// `[00:00:00, 23:59:59]` of `date`, both inclusive.
fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    (start, start + TimeDelta::seconds(86_399))
}
