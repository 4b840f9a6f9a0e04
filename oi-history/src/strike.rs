//! At-the-money strike selection.
//!
//! The table, the CSV export and the change deduplicator all derive their strike
//! windows from [`StrikeSelector`], so a snapshot always shows the same strikes
//! wherever it is rendered.

use crate::error::HistoryError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Default distance between listed strikes.
pub const DEFAULT_STRIKE_STEP: u32 = 50;

/// Default number of strikes shown around the ATM strike.
pub const DEFAULT_STRIKE_COUNT: usize = 5;

/// Round `spot` to the nearest multiple of `step`, ties away from zero.
///
/// A non-positive `step` leaves `spot` unchanged.
pub fn nearest_strike(spot: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return spot;
    }

    match spot.checked_div(step) {
        Some(ratio) => ratio.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step,
        None => spot,
    }
}

/// `count` strikes centred on `atm`, ascending.
pub fn strike_window(atm: Decimal, count: usize, step: Decimal) -> Result<Vec<Decimal>, HistoryError> {
    validate(count, step)?;
    Ok(window_unchecked(atm, count, step))
}

fn validate(count: usize, step: Decimal) -> Result<(), HistoryError> {
    if count == 0 || count % 2 == 0 {
        return Err(HistoryError::InvalidConfig(format!(
            "strike count {count} must be odd and at least 1"
        )));
    }
    if step <= Decimal::ZERO {
        return Err(HistoryError::InvalidConfig(format!(
            "strike step {step} must be positive"
        )));
    }
    Ok(())
}

fn window_unchecked(atm: Decimal, count: usize, step: Decimal) -> Vec<Decimal> {
    let half = ((count - 1) / 2) as i64;
    (-half..=half)
        .map(|offset| atm + Decimal::from(offset) * step)
        .collect()
}

/// Strikes selected around the ATM strike of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrikeWindow {
    pub atm: Decimal,
    pub strikes: Vec<Decimal>,
}

impl StrikeWindow {
    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }
}

/// Validated strike window definition `(count, step)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeSelector {
    count: usize,
    step: Decimal,
}

impl StrikeSelector {
    /// Fails with [`HistoryError::InvalidConfig`] unless `count` is odd and `step` positive.
    pub fn new(count: usize, step: Decimal) -> Result<Self, HistoryError> {
        validate(count, step)?;
        Ok(Self { count, step })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn step(&self) -> Decimal {
        self.step
    }

    pub fn atm(&self, spot: Decimal) -> Decimal {
        nearest_strike(spot, self.step)
    }

    /// Window around the ATM strike for `spot`.
    pub fn window(&self, spot: Decimal) -> StrikeWindow {
        let atm = self.atm(spot);
        StrikeWindow {
            atm,
            strikes: window_unchecked(atm, self.count, self.step),
        }
    }
}

impl Default for StrikeSelector {
    fn default() -> Self {
        Self {
            count: DEFAULT_STRIKE_COUNT,
            step: Decimal::from(DEFAULT_STRIKE_STEP),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_nearest_strike() {
        struct TestCase {
            spot: Decimal,
            step: Decimal,
            expected: Decimal,
        }

        let tests = vec![
            TestCase {
                // TC0: rounds down
                spot: dec!(22012.35),
                step: dec!(50),
                expected: dec!(22000),
            },
            TestCase {
                // TC1: rounds up
                spot: dec!(22038),
                step: dec!(50),
                expected: dec!(22050),
            },
            TestCase {
                // TC2: exact midpoint rounds away from zero
                spot: dec!(22025),
                step: dec!(50),
                expected: dec!(22050),
            },
            TestCase {
                // TC3: negative midpoint rounds away from zero
                spot: dec!(-75),
                step: dec!(50),
                expected: dec!(-100),
            },
            TestCase {
                // TC4: zero spot
                spot: dec!(0),
                step: dec!(50),
                expected: dec!(0),
            },
            TestCase {
                // TC5: BANKNIFTY style step
                spot: dec!(47960),
                step: dec!(100),
                expected: dec!(48000),
            },
            TestCase {
                // TC6: non-positive step leaves spot unchanged
                spot: dec!(22012.35),
                step: dec!(0),
                expected: dec!(22012.35),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = nearest_strike(test.spot, test.step);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_strike_window_symmetry() {
        for count in [1usize, 3, 5, 7, 9, 21] {
            let window = strike_window(dec!(22000), count, dec!(50)).unwrap();

            assert_eq!(window.len(), count);
            assert!(window.windows(2).all(|pair| pair[0] < pair[1]));
            assert_eq!(window[(count - 1) / 2], dec!(22000));
            assert_eq!(window[0] + window[count - 1], dec!(44000));
        }
    }

    #[test]
    fn test_strike_window_values() {
        assert_eq!(
            strike_window(dec!(22000), 5, dec!(50)).unwrap(),
            vec![dec!(21900), dec!(21950), dec!(22000), dec!(22050), dec!(22100)]
        );
    }

    #[test]
    fn test_strike_window_rejects_invalid_config() {
        for (count, step) in [(0, dec!(50)), (4, dec!(50)), (5, dec!(0)), (5, dec!(-50))] {
            let result = strike_window(dec!(22000), count, step);
            assert!(
                matches!(result, Err(HistoryError::InvalidConfig(_))),
                "count {count} step {step} should fail"
            );
            assert!(StrikeSelector::new(count, step).is_err());
        }
    }

    #[test]
    fn test_selector_window_from_spot() {
        let selector = StrikeSelector::new(3, dec!(50)).unwrap();
        let window = selector.window(dec!(22012.35));

        assert_eq!(window.atm, dec!(22000));
        assert_eq!(window.strikes, vec![dec!(21950), dec!(22000), dec!(22050)]);
    }

    #[test]
    fn test_selector_default() {
        let selector = StrikeSelector::default();
        assert_eq!(selector.count(), 5);
        assert_eq!(selector.step(), dec!(50));
    }
}
