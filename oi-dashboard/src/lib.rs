/// OI Dashboard - Shared Library
///
/// Common functionality for the two binaries:
/// - oi-dashboard: live terminal view of option-chain OI history
/// - oi-export: one-shot CSV export of the same history view
///
/// The library includes:
/// - Environment configuration and the symbol/date/column selectors
/// - HTTP client and background poller for the history API
/// - Dashboard state and its ratatui rendering
pub mod shared;

pub use shared::client::{ApiClient, ClientError, FetchKind, HistoryRequest, SnapshotSource};
pub use shared::config::{ColumnVisibility, ConfigError, DashboardConfig, Symbol};
pub use shared::export::write_export;
pub use shared::logging::{init_file_logging, init_stderr_logging};
pub use shared::poller::{
    ConnectionStatus, PollCommand, PollEvent, Poller, PollerConfig, PollerHandle,
};
pub use shared::state::DashboardState;
pub use shared::widget::render_dashboard;
