/// OI Export
///
/// Fetches the full history for the configured symbol, date and time filter,
/// runs it through the same pipeline as the dashboard and writes the CSV.
use std::error::Error;

use chrono::Local;
use oi_dashboard::{
    ApiClient, DashboardConfig, DashboardState, FetchKind, HistoryRequest, PollEvent,
    SnapshotSource, init_stderr_logging,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_stderr_logging();

    let now = Local::now();
    let config = DashboardConfig::from_env(now.date_naive())?;
    let client = ApiClient::new(config.api_url.clone())?;

    let request = HistoryRequest::new(config.symbol, config.query, FetchKind::Full);
    let snapshots = client.history(&request).await?;
    info!(
        symbol = %config.symbol,
        records = snapshots.len(),
        "fetched history"
    );

    let mut state = DashboardState::new(&config);
    state.apply(PollEvent::History {
        generation: state.generation,
        kind: FetchKind::Full,
        snapshots,
    });

    let path = state.export(&now)?;
    println!("{}", path.display());

    Ok(())
}
