/// OI Dashboard
///
/// Live terminal view of option-chain open interest history. Polls the history
/// API in the background and redraws the strike window on every tick.
use std::{
    error::Error,
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Local;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use oi_dashboard::{
    ApiClient, DashboardConfig, DashboardState, PollCommand, Poller, PollerConfig,
    init_file_logging, render_dashboard,
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = DashboardConfig::from_env(Local::now().date_naive())?;
    init_file_logging(&config.log_file)?;
    info!(
        api_url = %config.api_url,
        symbol = %config.symbol,
        strike_count = config.strike_count,
        "starting oi-dashboard"
    );

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    let client = Arc::new(ApiClient::new(config.api_url.clone())?);
    let poller_config = PollerConfig::default()
        .with_refresh_interval(config.refresh_interval)
        .with_full_fetch_delay(config.full_fetch_delay);
    let handle = Poller::new(client, poller_config, config.symbol, config.query).start();
    let commands = handle.commands;
    let mut event_rx = handle.events;
    let mut status_rx = handle.status;

    let state = Arc::new(Mutex::new(DashboardState::new(&config)));

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let mut guard = state.lock().await;
                guard.apply(event);
            }
        });
    }

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                state.lock().await.set_status(status);
            }
        });
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut last_tick = Instant::now();

    loop {
        {
            let guard = state.lock().await;
            let now = Local::now();
            terminal.draw(|f| render_dashboard(f, &guard, &now))?;
        }

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                let today = Local::now().date_naive();
                let command = {
                    let mut guard = state.lock().await;
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char('r') => Some(PollCommand::Refresh),
                        KeyCode::Char('f') => Some(PollCommand::FetchAll),
                        KeyCode::Char('s') => Some(guard.cycle_symbol()),
                        KeyCode::Char('d') => Some(guard.cycle_date(today)),
                        KeyCode::Char('t') => Some(guard.cycle_time_filter()),
                        KeyCode::Char('+') | KeyCode::Char('=') => {
                            guard.step_strike_count(true);
                            None
                        }
                        KeyCode::Char('-') => {
                            guard.step_strike_count(false);
                            None
                        }
                        KeyCode::Char('h') => {
                            guard.toggle_summary();
                            None
                        }
                        KeyCode::Char('e') => {
                            let message = match guard.export(&Local::now()) {
                                Ok(path) => format!("Exported {}", path.display()),
                                Err(err) => {
                                    error!(%err, "export failed");
                                    format!("Export failed: {err}")
                                }
                            };
                            guard.message = Some(message);
                            None
                        }
                        KeyCode::Char(c) => {
                            if let Some(digit) = c.to_digit(10) {
                                guard.toggle_column(digit as u8);
                            }
                            None
                        }
                        _ => None,
                    }
                };

                if let Some(command) = command {
                    if commands.send(command).await.is_err() {
                        warn!("poller stopped, command dropped");
                    }
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            last_tick = Instant::now();
        }
    }

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    info!("oi-dashboard stopped");

    Ok(())
}
