//! Background polling of the history API
//!
//! The poller runs on its own task. It fetches the latest snapshot on every tick,
//! loads history when it has none or when asked to, and appends new snapshots
//! otherwise. Results are tagged with the generation of the query they were
//! requested for so that the dashboard can drop answers to superseded queries.

use super::{
    client::{ClientError, FetchKind, HistoryRequest, SnapshotSource},
    config::Symbol,
};
use oi_history::{HistoryQuery, Snapshot, is_new_data};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

/// Poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between background polls of the latest snapshot
    pub refresh_interval: Duration,
    /// Delay before the one-off full history fetch after start-up or a symbol change
    pub full_fetch_delay: Duration,
    /// Maximum buffered events
    pub channel_buffer_size: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5),
            full_fetch_delay: Duration::from_secs(10),
            channel_buffer_size: 64,
        }
    }
}

impl PollerConfig {
    /// Set refresh interval
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set delayed full fetch
    pub fn with_full_fetch_delay(mut self, delay: Duration) -> Self {
        self.full_fetch_delay = delay;
        self
    }

    /// Set channel buffer size
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }
}

/// Requests from the dashboard to the poller
#[derive(Debug, Clone, PartialEq)]
pub enum PollCommand {
    /// Manual refresh: latest snapshot plus a quick history reload
    Refresh,
    /// Latest snapshot plus a full history reload
    FetchAll,
    /// Symbol or filter changed: start over with a new generation
    Reset {
        generation: u64,
        symbol: Symbol,
        query: HistoryQuery,
    },
}

/// Results delivered to the dashboard
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// A snapshot that differs from the last one seen
    Latest { generation: u64, snapshot: Snapshot },
    /// Replacement history, oldest first
    History {
        generation: u64,
        kind: FetchKind,
        snapshots: Vec<Snapshot>,
    },
    /// New snapshot to merge into the existing history
    Append { generation: u64, snapshot: Snapshot },
}

impl PollEvent {
    pub fn generation(&self) -> u64 {
        match self {
            PollEvent::Latest { generation, .. }
            | PollEvent::History { generation, .. }
            | PollEvent::Append { generation, .. } => *generation,
        }
    }
}

/// Connection status of the history API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Handles returned by [`Poller::start`]
#[derive(Debug)]
pub struct PollerHandle {
    pub commands: mpsc::Sender<PollCommand>,
    pub events: mpsc::Receiver<PollEvent>,
    pub status: watch::Receiver<ConnectionStatus>,
}

/// Polls a [`SnapshotSource`] on a tokio task
pub struct Poller<S> {
    source: Arc<S>,
    config: PollerConfig,
    symbol: Symbol,
    query: HistoryQuery,
}

impl<S> Poller<S>
where
    S: SnapshotSource + 'static,
{
    pub fn new(source: Arc<S>, config: PollerConfig, symbol: Symbol, query: HistoryQuery) -> Self {
        Self {
            source,
            config,
            symbol,
            query,
        }
    }

    /// Spawn the polling task, starting at generation 0
    pub fn start(self) -> PollerHandle {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_buffer_size);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);

        tokio::spawn(run_poll_loop(self, command_rx, event_tx, status_tx));

        PollerHandle {
            commands: command_tx,
            events: event_rx,
            status: status_rx,
        }
    }
}

/// Why a poll was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollMode {
    Background,
    Manual,
    Full,
}

/// Poller-side view of the current query
#[derive(Debug)]
struct PollSession {
    generation: u64,
    symbol: Symbol,
    query: HistoryQuery,
    previous: Option<Snapshot>,
    history_loaded: bool,
}

impl PollSession {
    fn new(generation: u64, symbol: Symbol, query: HistoryQuery) -> Self {
        Self {
            generation,
            symbol,
            query,
            previous: None,
            history_loaded: false,
        }
    }
}

/// Dashboard hung up
#[derive(Debug)]
struct Closed;

async fn run_poll_loop<S>(
    poller: Poller<S>,
    mut command_rx: mpsc::Receiver<PollCommand>,
    event_tx: mpsc::Sender<PollEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
) where
    S: SnapshotSource + 'static,
{
    let Poller {
        source,
        config,
        symbol,
        query,
    } = poller;

    info!(%symbol, ?query, "starting history poller");

    let mut session = PollSession::new(0, symbol, query);

    let mut refresh = tokio::time::interval_at(
        Instant::now() + config.refresh_interval,
        config.refresh_interval,
    );
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let full_fetch = tokio::time::sleep(config.full_fetch_delay);
    tokio::pin!(full_fetch);
    let mut full_fetch_pending = true;

    if poll(source.as_ref(), &mut session, PollMode::Manual, &event_tx, &status_tx)
        .await
        .is_err()
    {
        return;
    }

    loop {
        let mode = tokio::select! {
            _ = refresh.tick() => PollMode::Background,
            _ = &mut full_fetch, if full_fetch_pending => {
                debug!("running delayed full history fetch");
                full_fetch_pending = false;
                PollMode::Full
            }
            command = command_rx.recv() => match command {
                None => break,
                Some(PollCommand::Refresh) => {
                    refresh.reset();
                    PollMode::Manual
                }
                Some(PollCommand::FetchAll) => PollMode::Full,
                Some(PollCommand::Reset { generation, symbol, query }) => {
                    let symbol_changed = symbol != session.symbol;
                    session = PollSession::new(generation, symbol, query);

                    if symbol_changed {
                        full_fetch.as_mut().reset(Instant::now() + config.full_fetch_delay);
                        full_fetch_pending = true;
                    }
                    refresh.reset();
                    PollMode::Manual
                }
            },
        };

        if poll(source.as_ref(), &mut session, mode, &event_tx, &status_tx)
            .await
            .is_err()
        {
            break;
        }
    }

    info!("history poller stopped");
}

/// One poll cycle. Fetch failures are logged and reported through `status_tx`.
async fn poll<S>(
    source: &S,
    session: &mut PollSession,
    mode: PollMode,
    event_tx: &mpsc::Sender<PollEvent>,
    status_tx: &watch::Sender<ConnectionStatus>,
) -> Result<(), Closed>
where
    S: SnapshotSource + ?Sized,
{
    match fetch(source, session, mode).await {
        Ok(events) => {
            let _ = status_tx.send(ConnectionStatus::Connected);
            for event in events {
                event_tx.send(event).await.map_err(|_| Closed)?;
            }
        }
        Err(error) => {
            warn!(%error, symbol = %session.symbol, ?mode, "history API poll failed");
            let _ = status_tx.send(ConnectionStatus::Disconnected);
        }
    }
    Ok(())
}

async fn fetch<S>(
    source: &S,
    session: &mut PollSession,
    mode: PollMode,
) -> Result<Vec<PollEvent>, ClientError>
where
    S: SnapshotSource + ?Sized,
{
    let Some(latest) = source.latest(session.symbol).await? else {
        debug!(symbol = %session.symbol, "no snapshot available yet");
        return Ok(Vec::new());
    };

    if !is_new_data(session.previous.as_ref(), &latest) && mode != PollMode::Full {
        debug!(timestamp = %latest.timestamp, "no changes detected");
        return Ok(Vec::new());
    }

    session.previous = Some(latest.clone());
    let generation = session.generation;
    let mut events = vec![PollEvent::Latest {
        generation,
        snapshot: latest.clone(),
    }];

    if !session.history_loaded || mode != PollMode::Background {
        let kind = match mode {
            PollMode::Full => FetchKind::Full,
            PollMode::Background | PollMode::Manual => FetchKind::Quick,
        };
        let request = HistoryRequest::new(session.symbol, session.query, kind);
        let snapshots = source.history(&request).await?;

        info!(
            symbol = %session.symbol,
            ?kind,
            records = snapshots.len(),
            "fetched history"
        );

        session.history_loaded = true;
        events.push(PollEvent::History {
            generation,
            kind,
            snapshots,
        });
    } else {
        events.push(PollEvent::Append {
            generation,
            snapshot: latest,
        });
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oi_history::TimeFilter;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Serves a scripted sequence of latest snapshots and records history requests
    #[derive(Default)]
    struct ScriptedSource {
        latest: Mutex<Vec<Option<Snapshot>>>,
        requests: Mutex<Vec<HistoryRequest>>,
        fail_latest: Mutex<bool>,
    }

    impl ScriptedSource {
        fn new(latest: Vec<Option<Snapshot>>) -> Self {
            Self {
                latest: Mutex::new(latest),
                ..Default::default()
            }
        }

        fn requests(&self) -> Vec<HistoryRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn latest(&self, _: Symbol) -> Result<Option<Snapshot>, ClientError> {
            if *self.fail_latest.lock().unwrap() {
                return Err(ClientError::Status {
                    status: 503,
                    url: "http://test/api/latest".to_string(),
                });
            }
            let mut latest = self.latest.lock().unwrap();
            // The last scripted answer repeats once the script runs out
            Ok(match latest.len() {
                0 => None,
                1 => latest[0].clone(),
                _ => latest.remove(0),
            })
        }

        async fn history(&self, request: &HistoryRequest) -> Result<Vec<Snapshot>, ClientError> {
            self.requests.lock().unwrap().push(*request);
            Ok(vec![snapshot("a", "2024-01-15T04:00:00Z")])
        }
    }

    fn snapshot(id: &str, timestamp: &str) -> Snapshot {
        Snapshot::new(timestamp, dec!(22000)).with_id(id)
    }

    fn query() -> HistoryQuery {
        HistoryQuery::new(None, Some(TimeFilter::All))
    }

    #[tokio::test]
    async fn test_fetch_loads_history_then_appends() {
        let source = ScriptedSource::new(vec![
            Some(snapshot("a", "2024-01-15T04:00:00Z")),
            Some(snapshot("a", "2024-01-15T04:00:00Z")),
            Some(snapshot("b", "2024-01-15T04:00:05Z")),
        ]);
        let mut session = PollSession::new(3, Symbol::Nifty, query());

        // First poll has no history yet
        let events = fetch(&source, &mut session, PollMode::Background).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PollEvent::Latest { generation: 3, .. }));
        assert!(matches!(
            events[1],
            PollEvent::History { generation: 3, kind: FetchKind::Quick, .. }
        ));

        // Unchanged latest
        let events = fetch(&source, &mut session, PollMode::Background).await.unwrap();
        assert!(events.is_empty());

        // New latest is appended
        let events = fetch(&source, &mut session, PollMode::Background).await.unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            PollEvent::Append { snapshot, .. } => assert_eq!(snapshot.id.as_deref(), Some("b")),
            other => panic!("expected append, got {other:?}"),
        }

        assert_eq!(source.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_full_forces_reload() {
        let source = ScriptedSource::new(vec![Some(snapshot("a", "2024-01-15T04:00:00Z"))]);
        let mut session = PollSession::new(0, Symbol::BankNifty, query());

        fetch(&source, &mut session, PollMode::Manual).await.unwrap();
        let events = fetch(&source, &mut session, PollMode::Full).await.unwrap();

        assert_eq!(events.len(), 2);
        let requests = source.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].kind, FetchKind::Quick);
        assert_eq!(requests[1].kind, FetchKind::Full);
        assert_eq!(requests[1].symbol, Symbol::BankNifty);
    }

    #[tokio::test]
    async fn test_fetch_without_latest() {
        let source = ScriptedSource::new(vec![None]);
        let mut session = PollSession::new(0, Symbol::Nifty, query());

        let events = fetch(&source, &mut session, PollMode::Manual).await.unwrap();

        assert!(events.is_empty());
        assert!(source.requests().is_empty());
        assert!(!session.history_loaded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_reset_tags_new_generation() {
        let source = Arc::new(ScriptedSource::new(vec![Some(snapshot("a", "2024-01-15T04:00:00Z"))]));
        let config = PollerConfig::default()
            .with_refresh_interval(Duration::from_secs(60))
            .with_full_fetch_delay(Duration::from_secs(600));
        let mut handle = Poller::new(Arc::clone(&source), config, Symbol::Nifty, query()).start();

        let first = handle.events.recv().await.unwrap();
        assert_eq!(first.generation(), 0);
        let _history = handle.events.recv().await.unwrap();

        handle
            .commands
            .send(PollCommand::Reset {
                generation: 1,
                symbol: Symbol::Nifty,
                query: HistoryQuery::new(None, Some(TimeFilter::LastHour)),
            })
            .await
            .unwrap();

        // Reset clears the last seen snapshot, so the same latest is reported again
        let latest = handle.events.recv().await.unwrap();
        assert!(matches!(latest, PollEvent::Latest { generation: 1, .. }));
        let history = handle.events.recv().await.unwrap();
        assert!(matches!(history, PollEvent::History { generation: 1, .. }));

        assert_eq!(*handle.status.borrow(), ConnectionStatus::Connected);
        assert_eq!(source.requests()[1].query.time_filter, Some(TimeFilter::LastHour));
    }

    #[tokio::test]
    async fn test_poll_reports_disconnect() {
        let source = ScriptedSource::new(vec![]);
        *source.fail_latest.lock().unwrap() = true;
        let mut session = PollSession::new(0, Symbol::Nifty, query());
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);

        poll(&source, &mut session, PollMode::Manual, &event_tx, &status_tx)
            .await
            .unwrap();

        assert_eq!(*status_rx.borrow(), ConnectionStatus::Disconnected);
        assert!(event_rx.try_recv().is_err());
    }

    #[test]
    fn test_poller_config_builder() {
        let config = PollerConfig::default()
            .with_refresh_interval(Duration::from_secs(2))
            .with_full_fetch_delay(Duration::from_secs(30))
            .with_channel_buffer_size(8);

        assert_eq!(config.refresh_interval, Duration::from_secs(2));
        assert_eq!(config.full_fetch_delay, Duration::from_secs(30));
        assert_eq!(config.channel_buffer_size, 8);
    }
}
