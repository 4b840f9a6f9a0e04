//! Environment-driven configuration for the dashboard and the exporter
//!
//! Every setting has a default, so an empty environment yields a working
//! NIFTY dashboard against a local API server.

use chrono::{NaiveDate, TimeDelta};
use derive_more::Display;
use oi_history::{
    DEFAULT_LOT_SIZE, HistoryError, HistoryQuery, PipelineConfig, TimeFilter,
    strike::{DEFAULT_STRIKE_COUNT, DEFAULT_STRIKE_STEP},
};
use rust_decimal::Decimal;
use std::{path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use url::Url;

pub const ENV_API_URL: &str = "OI_API_URL";
pub const ENV_SYMBOL: &str = "OI_SYMBOL";
pub const ENV_LOT_SIZE: &str = "OI_LOT_SIZE";
pub const ENV_STRIKE_COUNT: &str = "OI_STRIKE_COUNT";
pub const ENV_STRIKE_STEP: &str = "OI_STRIKE_STEP";
pub const ENV_REFRESH_SECS: &str = "OI_REFRESH_SECS";
pub const ENV_FULL_FETCH_DELAY_SECS: &str = "OI_FULL_FETCH_DELAY_SECS";
pub const ENV_EXPORT_DIR: &str = "OI_EXPORT_DIR";
pub const ENV_LOG_FILE: &str = "OI_LOG_FILE";
pub const ENV_DATE: &str = "OI_DATE";
pub const ENV_TIME_FILTER: &str = "OI_TIME_FILTER";

const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_LOG_FILE: &str = "oi-dashboard.log";

/// Strike counts selectable from the dashboard with `+`/`-`
pub const STRIKE_COUNT_CHOICES: [usize; 4] = [3, 5, 7, 9];

/// Number of calendar days offered by the date selector, today included
pub const DATE_OPTION_DAYS: i64 = 7;

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid API url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Index symbols served by the history API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display)]
pub enum Symbol {
    #[default]
    #[display("NIFTY")]
    Nifty,
    #[display("BANKNIFTY")]
    BankNifty,
    #[display("FINNIFTY")]
    FinNifty,
}

impl Symbol {
    pub const ALL: [Symbol; 3] = [Symbol::Nifty, Symbol::BankNifty, Symbol::FinNifty];

    /// Case-insensitive parse of the API symbol name
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|symbol| symbol.as_str().eq_ignore_ascii_case(raw))
    }

    /// Name used in API query strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::Nifty => "NIFTY",
            Symbol::BankNifty => "BANKNIFTY",
            Symbol::FinNifty => "FINNIFTY",
        }
    }

    /// Next symbol in selector order, wrapping around
    pub fn next(&self) -> Self {
        match self {
            Symbol::Nifty => Symbol::BankNifty,
            Symbol::BankNifty => Symbol::FinNifty,
            Symbol::FinNifty => Symbol::Nifty,
        }
    }
}

/// Which optional column groups the history table shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnVisibility {
    pub oi: bool,
    pub oi_value: bool,
    pub volume: bool,
    pub iv: bool,
    pub ltp: bool,
}

impl Default for ColumnVisibility {
    /// Everything except the OI value columns
    fn default() -> Self {
        Self {
            oi: true,
            oi_value: false,
            volume: true,
            iv: true,
            ltp: true,
        }
    }
}

impl ColumnVisibility {
    /// Toggle column group `1..=5` (OI, OI value, volume, IV, LTP)
    ///
    /// Returns false for an unknown key.
    pub fn toggle(&mut self, key: u8) -> bool {
        let column = match key {
            1 => &mut self.oi,
            2 => &mut self.oi_value,
            3 => &mut self.volume,
            4 => &mut self.iv,
            5 => &mut self.ltp,
            _ => return false,
        };
        *column = !*column;
        true
    }
}

/// Next strike count up or down the selector, saturating at either end
pub fn step_strike_count(current: usize, increase: bool) -> usize {
    let position = STRIKE_COUNT_CHOICES
        .iter()
        .position(|&count| count == current);

    match (position, increase) {
        (Some(index), true) => STRIKE_COUNT_CHOICES[(index + 1).min(STRIKE_COUNT_CHOICES.len() - 1)],
        (Some(index), false) => STRIKE_COUNT_CHOICES[index.saturating_sub(1)],
        // Off-menu counts from the environment snap to the nearest choice in that direction
        (None, true) => STRIKE_COUNT_CHOICES
            .into_iter()
            .find(|&count| count > current)
            .unwrap_or(current),
        (None, false) => STRIKE_COUNT_CHOICES
            .into_iter()
            .rev()
            .find(|&count| count < current)
            .unwrap_or(current),
    }
}

/// Date selector options: the last [`DATE_OPTION_DAYS`] days, newest first, then all time (`None`)
pub fn date_options(today: NaiveDate) -> Vec<Option<NaiveDate>> {
    (0..DATE_OPTION_DAYS)
        .map(|days_back| today.checked_sub_signed(TimeDelta::days(days_back)))
        .chain(std::iter::once(None))
        .collect()
}

/// Advance the date selector, wrapping from all time back to today
pub fn next_date(current: Option<NaiveDate>, today: NaiveDate) -> Option<NaiveDate> {
    let options = date_options(today);
    match options.iter().position(|option| *option == current) {
        Some(index) => options[(index + 1) % options.len()],
        None => Some(today),
    }
}

/// Human label for a date selection
pub fn date_label(date: Option<NaiveDate>, today: NaiveDate) -> String {
    match date {
        Some(date) if date == today => format!("{} (Today)", date.format("%Y-%m-%d")),
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => "All Time".to_string(),
    }
}

/// Dashboard configuration, read once at start-up
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Base URL of the history API
    pub api_url: Url,
    /// Initially selected symbol
    pub symbol: Symbol,
    /// Initial strike window size, always odd
    pub strike_count: usize,
    /// Distance between listed strikes
    pub strike_step: Decimal,
    /// Contract multiplier for OI values
    pub lot_size: Decimal,
    /// Background poll interval
    pub refresh_interval: Duration,
    /// Delay before the full history fetch after start-up or a symbol change
    pub full_fetch_delay: Duration,
    /// Directory CSV exports are written to
    pub export_dir: PathBuf,
    /// Log file used by the terminal UI
    pub log_file: PathBuf,
    /// Initial date and time filter
    pub query: HistoryQuery,
}

impl DashboardConfig {
    /// Read configuration from the process environment
    pub fn from_env(today: NaiveDate) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), today)
    }

    /// Read configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F, today: NaiveDate) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_url = parse_api_url(&var(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()))?;

        let symbol = match var(ENV_SYMBOL) {
            Some(raw) => Symbol::parse(&raw).ok_or(ConfigError::InvalidValue {
                name: ENV_SYMBOL,
                value: raw,
            })?,
            None => Symbol::default(),
        };

        let strike_count = parse_or(var(ENV_STRIKE_COUNT), ENV_STRIKE_COUNT, DEFAULT_STRIKE_COUNT)?;
        let strike_step = parse_or(
            var(ENV_STRIKE_STEP),
            ENV_STRIKE_STEP,
            Decimal::from(DEFAULT_STRIKE_STEP),
        )?;
        let lot_size = parse_or(var(ENV_LOT_SIZE), ENV_LOT_SIZE, Decimal::from(DEFAULT_LOT_SIZE))?;
        let refresh_secs: u64 = parse_or(var(ENV_REFRESH_SECS), ENV_REFRESH_SECS, 5)?;
        let full_fetch_delay_secs: u64 =
            parse_or(var(ENV_FULL_FETCH_DELAY_SECS), ENV_FULL_FETCH_DELAY_SECS, 10)?;

        if refresh_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: ENV_REFRESH_SECS,
                value: refresh_secs.to_string(),
            });
        }

        let selected_date = match var(ENV_DATE) {
            None => Some(today),
            Some(raw) if raw.trim().eq_ignore_ascii_case("all") => None,
            Some(raw) => Some(NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                ConfigError::InvalidValue {
                    name: ENV_DATE,
                    value: raw.clone(),
                }
            })?),
        };
        let time_filter = var(ENV_TIME_FILTER)
            .map(|raw| TimeFilter::parse(&raw))
            .unwrap_or_default();

        let config = Self {
            api_url,
            symbol,
            strike_count,
            strike_step,
            lot_size,
            refresh_interval: Duration::from_secs(refresh_secs),
            full_fetch_delay: Duration::from_secs(full_fetch_delay_secs),
            export_dir: PathBuf::from(var(ENV_EXPORT_DIR).unwrap_or_else(|| ".".to_string())),
            log_file: PathBuf::from(var(ENV_LOG_FILE).unwrap_or_else(|| DEFAULT_LOG_FILE.to_string())),
            query: HistoryQuery::new(selected_date, Some(time_filter)),
        };

        // Fail fast on an unusable strike window or lot size
        config.pipeline_config()?;

        Ok(config)
    }

    /// Validated pipeline settings for the configured strike window and lot size
    pub fn pipeline_config(&self) -> Result<PipelineConfig, HistoryError> {
        PipelineConfig::new(self.strike_count, self.strike_step, self.lot_size)
    }
}

/// Parse the API base URL, normalised to end with `/` so endpoints join beneath it
pub fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn config_from(vars: &[(&str, &str)]) -> Result<DashboardConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        DashboardConfig::from_lookup(|name| vars.get(name).cloned(), today())
    }

    #[test]
    fn test_default_config() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:5000/");
        assert_eq!(config.symbol, Symbol::Nifty);
        assert_eq!(config.strike_count, 5);
        assert_eq!(config.strike_step, dec!(50));
        assert_eq!(config.lot_size, dec!(65));
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.full_fetch_delay, Duration::from_secs(10));
        assert_eq!(config.export_dir, PathBuf::from("."));
        assert_eq!(config.log_file, PathBuf::from("oi-dashboard.log"));
        assert_eq!(config.query, HistoryQuery::new(Some(today()), Some(TimeFilter::All)));
    }

    #[test]
    fn test_config_overrides() {
        let config = config_from(&[
            (ENV_API_URL, "https://oi.example.com/v1"),
            (ENV_SYMBOL, "banknifty"),
            (ENV_STRIKE_COUNT, "7"),
            (ENV_STRIKE_STEP, "100"),
            (ENV_LOT_SIZE, "15"),
            (ENV_REFRESH_SECS, "2"),
            (ENV_DATE, "all"),
            (ENV_TIME_FILTER, "3h"),
        ])
        .unwrap();

        assert_eq!(config.api_url.as_str(), "https://oi.example.com/v1/");
        assert_eq!(config.symbol, Symbol::BankNifty);
        assert_eq!(config.strike_count, 7);
        assert_eq!(config.strike_step, dec!(100));
        assert_eq!(config.lot_size, dec!(15));
        assert_eq!(config.refresh_interval, Duration::from_secs(2));
        assert_eq!(config.query, HistoryQuery::new(None, Some(TimeFilter::LastThreeHours)));
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        struct TestCase {
            vars: Vec<(&'static str, &'static str)>,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: even strike count
                vars: vec![(ENV_STRIKE_COUNT, "4")],
                expected: "invalid configuration: strike count 4 must be odd and at least 1",
            },
            TestCase {
                // TC1: unparseable number
                vars: vec![(ENV_LOT_SIZE, "sixty-five")],
                expected: "invalid value for OI_LOT_SIZE: \"sixty-five\"",
            },
            TestCase {
                // TC2: unknown symbol
                vars: vec![(ENV_SYMBOL, "SENSEX")],
                expected: "invalid value for OI_SYMBOL: \"SENSEX\"",
            },
            TestCase {
                // TC3: malformed date
                vars: vec![(ENV_DATE, "15/01/2024")],
                expected: "invalid value for OI_DATE: \"15/01/2024\"",
            },
            TestCase {
                // TC4: zero lot size
                vars: vec![(ENV_LOT_SIZE, "0")],
                expected: "invalid configuration: lot size 0 must be positive",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = config_from(&test.vars).unwrap_err().to_string();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_symbol_cycle_and_parse() {
        assert_eq!(Symbol::Nifty.next(), Symbol::BankNifty);
        assert_eq!(Symbol::FinNifty.next(), Symbol::Nifty);
        assert_eq!(Symbol::parse(" finnifty "), Some(Symbol::FinNifty));
        assert_eq!(Symbol::parse("SENSEX"), None);
        assert_eq!(Symbol::BankNifty.to_string(), "BANKNIFTY");
    }

    #[test]
    fn test_step_strike_count() {
        assert_eq!(step_strike_count(5, true), 7);
        assert_eq!(step_strike_count(9, true), 9);
        assert_eq!(step_strike_count(5, false), 3);
        assert_eq!(step_strike_count(3, false), 3);
        assert_eq!(step_strike_count(11, false), 9);
        assert_eq!(step_strike_count(1, true), 3);
    }

    #[test]
    fn test_date_options_cycle() {
        let options = date_options(today());

        assert_eq!(options.len(), 8);
        assert_eq!(options[0], Some(today()));
        assert_eq!(options[6], NaiveDate::from_ymd_opt(2024, 1, 9));
        assert_eq!(options[7], None);

        assert_eq!(next_date(Some(today()), today()), NaiveDate::from_ymd_opt(2024, 1, 14));
        assert_eq!(next_date(options[6], today()), None);
        assert_eq!(next_date(None, today()), Some(today()));
        // Stale selection from an older day
        assert_eq!(
            next_date(NaiveDate::from_ymd_opt(2023, 12, 1), today()),
            Some(today())
        );
        assert_eq!(date_label(None, today()), "All Time");
        assert_eq!(date_label(Some(today()), today()), "2024-01-15 (Today)");
    }

    #[test]
    fn test_column_visibility_toggle() {
        let mut columns = ColumnVisibility::default();
        assert!(columns.oi && columns.volume && columns.iv && columns.ltp);
        assert!(!columns.oi_value);

        assert!(columns.toggle(2));
        assert!(columns.oi_value);
        assert!(columns.toggle(3));
        assert!(!columns.volume);
        assert!(columns.toggle(3));
        assert!(columns.volume);
        assert!(!columns.toggle(9));
    }
}
