use thiserror::Error;

/// All errors generated in `oi-history`.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed snapshot timestamp: {0:?}")]
    MalformedTimestamp(String),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("export IO failed: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    /// Determine if the caller can carry on with a placeholder instead of failing.
    ///
    /// A malformed timestamp only degrades the display of a single snapshot, whereas
    /// an invalid strike window or a failed export must be surfaced.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_recoverable(&self) -> bool {
        match self {
            HistoryError::MalformedTimestamp(_) => true,
            _ => false,
        }
    }
}
