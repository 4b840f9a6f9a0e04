//! Per-strike differentials and per-snapshot aggregates.
//!
//! Deltas are taken against the logical predecessor in the filtered, deduplicated
//! sequence. Only when no predecessor is visible does the server-reported change
//! (`diffOpenInterest`, `diffTotalTradedVolume`) stand in for it.

use crate::{
    snapshot::{Leg, LegQuote, Snapshot},
    strike::{StrikeSelector, StrikeWindow},
};
use rust_decimal::Decimal;

/// OI values are quoted in lakhs of the lot-size-scaled count.
pub const NOTIONAL_DIVISOR: i64 = 100_000;

/// Monetary OI figure: `open_interest * lot_size / 100000`, exact.
pub fn oi_value(open_interest: i64, lot_size: Decimal) -> Decimal {
    Decimal::from(open_interest) * lot_size / Decimal::from(NOTIONAL_DIVISOR)
}

/// `delta / (current - delta) * 100`, exactly 0 when the base is 0.
pub fn pct_change(current: i64, delta: i64) -> f64 {
    let base = current.saturating_sub(delta);
    if base == 0 {
        0.0
    } else {
        delta as f64 / base as f64 * 100.0
    }
}

fn saturating_sum<I: IntoIterator<Item = i64>>(values: I) -> i64 {
    values.into_iter().fold(0, i64::saturating_add)
}

/// Weighted average `Σ(iv * oi) / Σ(oi)` over points with IV and OI both positive.
///
/// Returns 0 when no point qualifies.
pub fn weighted_iv<I>(points: I) -> f64
where
    I: IntoIterator<Item = (Option<f64>, i64)>,
{
    let mut sum_product = 0.0;
    let mut sum_weight = 0.0;

    for (iv, oi) in points {
        match iv {
            Some(iv) if iv > 0.0 && oi > 0 => {
                sum_product += iv * oi as f64;
                sum_weight += oi as f64;
            }
            _ => {}
        }
    }

    if sum_weight > 0.0 {
        sum_product / sum_weight
    } else {
        0.0
    }
}

/// A delta and whether it is meaningful.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Change {
    pub delta: i64,
    pub has_prev: bool,
}

impl Change {
    /// Predecessor value first, then the server-reported delta, else no change.
    pub fn resolve(current: i64, previous: Option<i64>, reported: Option<i64>) -> Self {
        match (previous, reported) {
            (Some(previous), _) => Self {
                delta: current.saturating_sub(previous),
                has_prev: true,
            },
            (None, Some(reported)) => Self {
                delta: reported,
                has_prev: true,
            },
            (None, None) => Self::default(),
        }
    }
}

/// Derived figures for one leg of one strike.
#[derive(Debug, Clone, PartialEq)]
pub struct LegDiff {
    pub open_interest: i64,
    pub oi_change: Change,
    pub oi_change_pct: f64,
    pub oi_value: Decimal,
    pub oi_change_value: Decimal,
    pub volume: i64,
    pub volume_change: Change,
    /// Absent values render as a placeholder and never enter aggregates.
    pub implied_volatility: Option<f64>,
    pub last_price: Option<f64>,
}

impl LegDiff {
    fn compute(
        quote: Option<&LegQuote>,
        previous: Option<Option<&LegQuote>>,
        lot_size: Decimal,
    ) -> Self {
        let open_interest = quote.map(LegQuote::oi).unwrap_or(0);
        let volume = quote.map(LegQuote::volume).unwrap_or(0);

        // Outer None: no predecessor snapshot. Inner None: predecessor lacks the leg
        let previous_oi = previous.map(|leg| leg.map(LegQuote::oi).unwrap_or(0));
        let previous_volume = previous.map(|leg| leg.map(LegQuote::volume).unwrap_or(0));

        let oi_change = Change::resolve(
            open_interest,
            previous_oi,
            quote.and_then(|quote| quote.diff_open_interest),
        );
        let volume_change = Change::resolve(
            volume,
            previous_volume,
            quote.and_then(|quote| quote.diff_total_traded_volume),
        );

        Self {
            open_interest,
            oi_change,
            oi_change_pct: pct_change(open_interest, oi_change.delta),
            oi_value: oi_value(open_interest, lot_size),
            oi_change_value: oi_value(oi_change.delta, lot_size),
            volume,
            volume_change,
            implied_volatility: quote.and_then(|quote| quote.implied_volatility),
            last_price: quote.and_then(|quote| quote.last_price),
        }
    }
}

/// Derived figures for one strike of a snapshot's window.
#[derive(Debug, Clone, PartialEq)]
pub struct StrikeDiff {
    pub strike: Decimal,
    pub is_atm: bool,
    /// Whether the chain carries a record for this strike at all.
    pub present: bool,
    pub call: LegDiff,
    pub put: LegDiff,
}

impl StrikeDiff {
    pub fn leg(&self, leg: Leg) -> &LegDiff {
        match leg {
            Leg::Call => &self.call,
            Leg::Put => &self.put,
        }
    }

    /// Whether any delta shown for this strike is meaningful.
    pub fn has_prev(&self) -> bool {
        self.call.oi_change.has_prev || self.put.oi_change.has_prev
    }
}

/// Sums over a snapshot's strike window for one leg.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegTotals {
    pub open_interest: i64,
    pub oi_change: i64,
    pub volume: i64,
    pub volume_change: i64,
    pub weighted_iv: f64,
    pub oi_value: Decimal,
    pub oi_change_value: Decimal,
}

impl LegTotals {
    fn from_strikes(strikes: &[StrikeDiff], leg: Leg, lot_size: Decimal) -> Self {
        let legs = move || strikes.iter().map(move |strike| strike.leg(leg));

        let open_interest = saturating_sum(legs().map(|diff| diff.open_interest));
        let oi_change = saturating_sum(legs().map(|diff| diff.oi_change.delta));

        Self {
            open_interest,
            oi_change,
            volume: saturating_sum(legs().map(|diff| diff.volume)),
            volume_change: saturating_sum(legs().map(|diff| diff.volume_change.delta)),
            weighted_iv: weighted_iv(legs().map(|diff| (diff.implied_volatility, diff.open_interest))),
            oi_value: oi_value(open_interest, lot_size),
            oi_change_value: oi_value(oi_change, lot_size),
        }
    }
}

/// DiffEngine output for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDiff<'a> {
    pub snapshot: &'a Snapshot,
    pub has_predecessor: bool,
    pub window: StrikeWindow,
    pub strikes: Vec<StrikeDiff>,
    pub call_totals: LegTotals,
    pub put_totals: LegTotals,
}

impl<'a> SnapshotDiff<'a> {
    pub fn totals(&self, leg: Leg) -> &LegTotals {
        match leg {
            Leg::Call => &self.call_totals,
            Leg::Put => &self.put_totals,
        }
    }

    /// Put/call ratio over the window, 0 when there is no call OI.
    pub fn pcr(&self) -> f64 {
        put_call_ratio(self.call_totals.open_interest, self.put_totals.open_interest)
    }

    /// Share of combined window OI held by `leg`, in percent.
    pub fn share_pct(&self, leg: Leg) -> f64 {
        let combined = self.call_totals.open_interest.saturating_add(self.put_totals.open_interest);
        if combined == 0 {
            return 0.0;
        }
        self.totals(leg).open_interest as f64 / combined as f64 * 100.0
    }

    /// Largest single-leg OI in the window, used to scale OI bars.
    pub fn max_leg_oi(&self) -> i64 {
        self.strikes
            .iter()
            .map(|strike| strike.call.open_interest.max(strike.put.open_interest))
            .max()
            .unwrap_or(0)
    }
}

/// Put OI divided by call OI, 0 when there is no call OI.
pub fn put_call_ratio(call_oi: i64, put_oi: i64) -> f64 {
    if call_oi > 0 {
        put_oi as f64 / call_oi as f64
    } else {
        0.0
    }
}

/// Compute per-strike diffs and aggregates for `snapshot` over its own window.
///
/// `predecessor` is the chronologically older neighbour in the active
/// (filtered, deduplicated) sequence.
pub fn diff_snapshot<'a>(
    snapshot: &'a Snapshot,
    predecessor: Option<&Snapshot>,
    selector: &StrikeSelector,
    lot_size: Decimal,
) -> SnapshotDiff<'a> {
    let window = selector.window(snapshot.spot_price);

    let strikes: Vec<StrikeDiff> = window
        .strikes
        .iter()
        .map(|&strike| {
            let leg_diff = |leg: Leg| {
                LegDiff::compute(
                    snapshot.quote(strike, leg),
                    predecessor.map(|previous| previous.quote(strike, leg)),
                    lot_size,
                )
            };

            StrikeDiff {
                strike,
                is_atm: strike == window.atm,
                present: snapshot.record(strike).is_some(),
                call: leg_diff(Leg::Call),
                put: leg_diff(Leg::Put),
            }
        })
        .collect();

    let call_totals = LegTotals::from_strikes(&strikes, Leg::Call, lot_size);
    let put_totals = LegTotals::from_strikes(&strikes, Leg::Put, lot_size);

    SnapshotDiff {
        snapshot,
        has_predecessor: predecessor.is_some(),
        window,
        strikes,
        call_totals,
        put_totals,
    }
}
