//! Ratatui rendering of the dashboard
//!
//! Table content is built as plain strings first ([`table_lines`]) and styled
//! afterwards, so the numbers on screen can be checked against the CSV export.

use super::{
    config::{ColumnVisibility, date_label},
    poller::ConnectionStatus,
    state::DashboardState,
};
use chrono::{DateTime, TimeZone};
use itertools::Itertools;
use oi_history::{
    Change, HistoryView, Leg, LegDiff, LegTotals, OiSummaryRow, SnapshotDiff,
    diff::put_call_ratio, summary::oi_bounds,
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table},
};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::fmt;

const C_CALL: Color = Color::Rgb(220, 100, 100);
const C_PUT: Color = Color::Rgb(100, 220, 100);
const C_ATM: Color = Color::Rgb(220, 200, 90);
const C_DIM: Color = Color::Rgb(120, 120, 120);
const C_BRIGHT: Color = Color::Rgb(220, 220, 220);
const C_ACCENT: Color = Color::Rgb(100, 180, 220);

/// Width of each half of the OI bar column
pub const BAR_WIDTH: usize = 8;

/// Placeholder for values without a meaningful predecessor or quote
pub const PLACEHOLDER: &str = "-";

/// Per-leg table columns, in call-side order. The put side mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegColumn {
    Oi,
    OiChange,
    OiValue,
    OiValueChange,
    Volume,
    VolumeChange,
    Iv,
    Ltp,
}

impl LegColumn {
    const CALL_ORDER: [LegColumn; 8] = [
        LegColumn::Oi,
        LegColumn::OiChange,
        LegColumn::OiValue,
        LegColumn::OiValueChange,
        LegColumn::Volume,
        LegColumn::VolumeChange,
        LegColumn::Iv,
        LegColumn::Ltp,
    ];

    /// Visible columns for `leg`, mirrored around the strike for puts
    pub fn visible(leg: Leg, columns: &ColumnVisibility) -> Vec<LegColumn> {
        let visible = Self::CALL_ORDER
            .into_iter()
            .filter(|column| column.is_visible(columns));
        match leg {
            Leg::Call => visible.collect(),
            Leg::Put => visible.rev().collect(),
        }
    }

    fn is_visible(&self, columns: &ColumnVisibility) -> bool {
        match self {
            LegColumn::Oi | LegColumn::OiChange => columns.oi,
            LegColumn::OiValue | LegColumn::OiValueChange => columns.oi_value,
            LegColumn::Volume | LegColumn::VolumeChange => columns.volume,
            LegColumn::Iv => columns.iv,
            LegColumn::Ltp => columns.ltp,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            LegColumn::Oi => "OI",
            LegColumn::OiChange => "OI Chg",
            LegColumn::OiValue => "Val(L)",
            LegColumn::OiValueChange => "Val Chg",
            LegColumn::Volume => "Vol",
            LegColumn::VolumeChange => "Vol Chg",
            LegColumn::Iv => "IV",
            LegColumn::Ltp => "LTP",
        }
    }

    fn width(&self) -> u16 {
        match self {
            LegColumn::Oi => 11,
            LegColumn::OiChange => 18,
            LegColumn::OiValue | LegColumn::OiValueChange => 9,
            LegColumn::Volume => 12,
            LegColumn::VolumeChange => 11,
            LegColumn::Iv => 7,
            LegColumn::Ltp => 9,
        }
    }

    fn strike_cell(&self, leg: &LegDiff) -> String {
        match self {
            LegColumn::Oi => format_count(leg.open_interest),
            LegColumn::OiChange => format_oi_change(&leg.oi_change, leg.oi_change_pct),
            LegColumn::OiValue => format_lakhs(leg.oi_value),
            LegColumn::OiValueChange if leg.oi_change.has_prev => format_signed_lakhs(leg.oi_change_value),
            LegColumn::Volume => format_count(leg.volume),
            LegColumn::VolumeChange if leg.volume_change.has_prev => format_signed(leg.volume_change.delta),
            LegColumn::OiValueChange | LegColumn::VolumeChange => PLACEHOLDER.to_string(),
            LegColumn::Iv => format_optional(leg.implied_volatility),
            LegColumn::Ltp => format_optional(leg.last_price),
        }
    }

    fn totals_cell(&self, totals: &LegTotals) -> String {
        match self {
            LegColumn::Oi => format_count(totals.open_interest),
            LegColumn::OiChange => format_signed(totals.oi_change),
            LegColumn::OiValue => format_lakhs(totals.oi_value),
            LegColumn::OiValueChange => format_signed_lakhs(totals.oi_change_value),
            LegColumn::Volume => format_count(totals.volume),
            LegColumn::VolumeChange => format_signed(totals.volume_change),
            LegColumn::Iv => format!("{:.2}", totals.weighted_iv),
            LegColumn::Ltp => String::new(),
        }
    }
}

/// Kind of a history table line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Strike { is_atm: bool, has_prev: bool },
    Totals,
}

/// One unstyled history table line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLine {
    pub kind: LineKind,
    pub cells: Vec<String>,
}

/// Header labels matching [`table_lines`] cells
pub fn column_headers(columns: &ColumnVisibility) -> Vec<String> {
    let leg_headers = |leg: Leg| {
        LegColumn::visible(leg, columns)
            .into_iter()
            .map(move |column| format!("{leg} {}", column.label()))
    };

    std::iter::once("Time".to_string())
        .chain(leg_headers(Leg::Call))
        .chain(std::iter::once("Strike".to_string()))
        .chain(leg_headers(Leg::Put))
        .chain(std::iter::once("CE | PE OI".to_string()))
        .collect()
}

fn column_widths(columns: &ColumnVisibility) -> Vec<Constraint> {
    let leg_widths = |leg: Leg| {
        LegColumn::visible(leg, columns)
            .into_iter()
            .map(|column| Constraint::Length(column.width()))
    };

    std::iter::once(Constraint::Length(10))
        .chain(leg_widths(Leg::Call))
        .chain(std::iter::once(Constraint::Length(9)))
        .chain(leg_widths(Leg::Put))
        .chain(std::iter::once(Constraint::Min((BAR_WIDTH * 2 + 1) as u16)))
        .collect()
}

/// History table lines, newest snapshot first, each followed by its totals line
pub fn table_lines<Tz>(view: &HistoryView<'_>, columns: &ColumnVisibility, tz: &Tz) -> Vec<TableLine>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    view.table_rows()
        .flat_map(|diff| snapshot_lines(diff, columns, tz))
        .collect()
}

fn snapshot_lines<Tz>(diff: &SnapshotDiff<'_>, columns: &ColumnVisibility, tz: &Tz) -> Vec<TableLine>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let call_columns = LegColumn::visible(Leg::Call, columns);
    let put_columns = LegColumn::visible(Leg::Put, columns);
    let max_oi = diff.max_leg_oi();
    let time_label = diff.snapshot.time_label(tz);

    let mut lines: Vec<TableLine> = diff
        .strikes
        .iter()
        .enumerate()
        .map(|(index, strike)| {
            let time = if index == 0 { time_label.clone() } else { String::new() };
            let mut cells = vec![time];
            cells.extend(call_columns.iter().map(|column| column.strike_cell(&strike.call)));
            cells.push(strike.strike.normalize().to_string());
            cells.extend(put_columns.iter().map(|column| column.strike_cell(&strike.put)));
            cells.push(oi_bar(strike.call.open_interest, strike.put.open_interest, max_oi));

            TableLine {
                kind: LineKind::Strike {
                    is_atm: strike.is_atm,
                    has_prev: strike.has_prev(),
                },
                cells,
            }
        })
        .collect();

    let mut totals = vec![String::new()];
    totals.extend(call_columns.iter().map(|column| column.totals_cell(&diff.call_totals)));
    totals.push("TOTAL".to_string());
    totals.extend(put_columns.iter().map(|column| column.totals_cell(&diff.put_totals)));
    totals.push(format!(
        "PCR {:.2} ({:.1}% | {:.1}%)",
        diff.pcr(),
        diff.share_pct(Leg::Call),
        diff.share_pct(Leg::Put)
    ));
    lines.push(TableLine {
        kind: LineKind::Totals,
        cells: totals,
    });

    lines
}

/// Render the whole dashboard
pub fn render_dashboard<Tz>(f: &mut Frame, state: &DashboardState, now: &DateTime<Tz>)
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Header
            Constraint::Min(8),    // History
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    let view = match state.view(now) {
        Ok(view) => view,
        Err(error) => {
            let message = Paragraph::new(Span::styled(error.to_string(), Style::default().fg(C_CALL)))
                .block(Block::default().borders(Borders::ALL).title(" ERROR "));
            f.render_widget(message, f.area());
            return;
        }
    };
    let tz = now.timezone();

    render_header(f, chunks[0], state, &view, now);

    if state.show_summary {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(chunks[1]);
        render_history(f, body[0], state, &view, &tz);
        render_summary(f, body[1], &state.summary(&view, &tz));
    } else {
        render_history(f, chunks[1], state, &view, &tz);
    }

    render_footer(f, chunks[2], state);
}

fn render_header<Tz>(f: &mut Frame, area: Rect, state: &DashboardState, view: &HistoryView<'_>, now: &DateTime<Tz>)
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let tz = now.timezone();
    let today = now.date_naive();

    let (status_text, status_color) = match state.status {
        ConnectionStatus::Connected => ("● LIVE", C_PUT),
        ConnectionStatus::Connecting => ("○ CONNECTING", C_ATM),
        ConnectionStatus::Disconnected => ("○ OFFLINE", C_CALL),
    };

    let spot = state
        .latest
        .as_ref()
        .map(|latest| latest.spot_price)
        .or_else(|| view.latest().map(|diff| diff.snapshot.spot_price));
    let spot_text = spot
        .map(|spot| format_decimal_grouped(spot.round_dp(2)))
        .unwrap_or_else(|| "N/A".to_string());
    let atm_text = view
        .latest()
        .map(|diff| diff.window.atm.normalize().to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string());

    let totals = state.latest.as_ref().map(|latest| latest.chain_totals).unwrap_or_default();
    let updated = state
        .latest
        .as_ref()
        .map(|latest| latest.time_label(&tz))
        .unwrap_or_else(|| "Never".to_string());
    let nse_time = state
        .latest
        .as_ref()
        .and_then(|latest| latest.nse_timestamp.clone())
        .unwrap_or_else(|| PLACEHOLDER.to_string());

    let time_filter = state.query.time_filter.unwrap_or_default();
    let time_text = if state.query.is_past_date(today) && time_filter.lookback().is_some() {
        format!("{} (ignored for past date)", time_filter.label())
    } else {
        time_filter.label().to_string()
    };

    let label = |text: &'static str| Span::styled(text, Style::default().fg(C_DIM));
    let value = |text: String| Span::styled(text, Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD));

    let lines = vec![
        Line::from(vec![
            Span::styled(
                format!("{} ", state.symbol),
                Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD),
            ),
            label(" Spot "),
            value(spot_text),
            label("  ATM "),
            value(atm_text),
            label("  "),
            Span::styled(status_text, Style::default().fg(status_color)),
            label("  Clock "),
            value(now.format("%H:%M:%S").to_string()),
        ]),
        Line::from(vec![
            label("CE OI "),
            Span::styled(format_count(totals.call_oi), Style::default().fg(C_CALL)),
            label("  PE OI "),
            Span::styled(format_count(totals.put_oi), Style::default().fg(C_PUT)),
            label("  PCR "),
            value(format!("{:.2}", put_call_ratio(totals.call_oi, totals.put_oi))),
            label("  Updated "),
            value(updated),
            label("  NSE "),
            value(nse_time),
        ]),
        Line::from(vec![
            label("Date "),
            value(date_label(state.query.selected_date, today)),
            label("  Time "),
            value(time_text),
            label("  Strikes "),
            value(state.strike_count.to_string()),
            label("  Rows "),
            value(format!(
                "{} changed / {} visible / {} loaded",
                view.len(),
                view.visible().len(),
                state.history.len()
            )),
        ]),
    ];

    let block = Block::default()
        .title(" OI DASHBOARD ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(status_color));

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_history<Tz>(f: &mut Frame, area: Rect, state: &DashboardState, view: &HistoryView<'_>, tz: &Tz)
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let block = Block::default()
        .title(" OI HISTORY (newest first) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_ACCENT));

    if view.is_empty() {
        let text = if state.history.is_empty() {
            "Waiting for history..."
        } else {
            "No snapshots match the current filters"
        };
        f.render_widget(
            Paragraph::new(Span::styled(text, Style::default().fg(C_DIM))).block(block),
            area,
        );
        return;
    }

    let header = Row::new(column_headers(&state.columns).into_iter().map(|header| {
        Cell::from(header).style(Style::default().fg(C_ATM).add_modifier(Modifier::BOLD))
    }));

    let rows = table_lines(view, &state.columns, tz).into_iter().map(|line| {
        let style = match line.kind {
            LineKind::Strike { is_atm: true, .. } => Style::default().fg(C_ATM).add_modifier(Modifier::BOLD),
            LineKind::Strike { has_prev: false, .. } => Style::default().fg(C_DIM),
            LineKind::Strike { .. } => Style::default().fg(C_BRIGHT),
            LineKind::Totals => Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD),
        };
        Row::new(line.cells.into_iter().map(Cell::from)).style(style)
    });

    let table = Table::new(rows, column_widths(&state.columns))
        .header(header)
        .block(block);

    f.render_widget(table, area);
}

fn render_summary(f: &mut Frame, area: Rect, rows: &[OiSummaryRow]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let header = Row::new(["Time", "CE OI", "PE OI", "PCR"].into_iter().map(|header| {
        Cell::from(header).style(Style::default().fg(C_ATM).add_modifier(Modifier::BOLD))
    }));
    let table_rows = rows.iter().map(|row| {
        Row::new(vec![
            Cell::from(row.time_label.clone()).style(Style::default().fg(C_DIM)),
            Cell::from(format_count(row.call_oi)).style(Style::default().fg(C_CALL)),
            Cell::from(format_count(row.put_oi)).style(Style::default().fg(C_PUT)),
            Cell::from(format!("{:.2}", row.pcr)).style(Style::default().fg(C_BRIGHT)),
        ])
    });
    let table = Table::new(
        table_rows,
        [
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(" OI SUMMARY ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(C_ACCENT)),
    );
    f.render_widget(table, chunks[0]);

    render_summary_chart(f, chunks[1], rows);
}

fn render_summary_chart(f: &mut Frame, area: Rect, rows: &[OiSummaryRow]) {
    let block = Block::default()
        .title(" TOTAL OI ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(C_ACCENT));

    let Some((min, max)) = oi_bounds(rows) else {
        f.render_widget(
            Paragraph::new(Span::styled("No data", Style::default().fg(C_DIM))).block(block),
            area,
        );
        return;
    };

    let (call_points, put_points) = chart_points(rows);
    let datasets = vec![
        Dataset::default()
            .name("CE")
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(C_CALL))
            .data(&call_points),
        Dataset::default()
            .name("PE")
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(C_PUT))
            .data(&put_points),
    ];

    let oldest = rows.last().map(|row| row.time_label.clone()).unwrap_or_default();
    let newest = rows.first().map(|row| row.time_label.clone()).unwrap_or_default();
    let x_max = rows.len().saturating_sub(1).max(1) as f64;

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(Style::default().fg(C_DIM))
                .bounds([0.0, x_max])
                .labels(vec![Span::raw(oldest), Span::raw(newest)]),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(C_DIM))
                .bounds([min as f64, max.max(min + 1) as f64])
                .labels(vec![Span::raw(format_compact(min)), Span::raw(format_compact(max))]),
        );

    f.render_widget(chart, area);
}

/// Chart series `(index, OI)` in chronological order from newest-first summary rows
pub fn chart_points(rows: &[OiSummaryRow]) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    rows.iter()
        .rev()
        .enumerate()
        .map(|(index, row)| ((index as f64, row.call_oi as f64), (index as f64, row.put_oi as f64)))
        .unzip()
}

fn render_footer(f: &mut Frame, area: Rect, state: &DashboardState) {
    let mut spans = vec![Span::styled(
        "q quit  r refresh  f fetch all  s symbol  +/- strikes  d date  t time  1-5 columns  h summary  e export",
        Style::default().fg(C_DIM),
    )];
    if let Some(message) = &state.message {
        spans.push(Span::styled(format!("  │ {message}"), Style::default().fg(C_ATM)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Integer with thousands separators, e.g. `1,234,567`
pub fn format_count(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let grouped: String = digits
        .chars()
        .rev()
        .chunks(3)
        .into_iter()
        .map(|chunk| chunk.collect::<String>())
        .join(",")
        .chars()
        .rev()
        .collect();

    if value < 0 { format!("-{grouped}") } else { grouped }
}

/// Count with an explicit sign, `0` unsigned
pub fn format_signed(value: i64) -> String {
    if value > 0 {
        format!("+{}", format_count(value))
    } else {
        format_count(value)
    }
}

/// `+200 (+20.0%)`, or the placeholder without a meaningful predecessor
pub fn format_oi_change(change: &Change, pct: f64) -> String {
    if !change.has_prev {
        return PLACEHOLDER.to_string();
    }
    format!("{} ({:+.1}%)", format_signed(change.delta), pct)
}

/// Lakh value to two decimals
pub fn format_lakhs(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// Lakh value to two decimals with an explicit sign
pub fn format_signed_lakhs(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    if rounded > Decimal::ZERO {
        format!("+{rounded:.2}")
    } else {
        format!("{rounded:.2}")
    }
}

/// Optional quote to two decimals
pub fn format_optional(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.2}"))
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Decimal with grouped integer digits, e.g. `22,012.35`
pub fn format_decimal_grouped(value: Decimal) -> String {
    let integer = value.trunc();
    let fraction = (value - integer).abs();
    let integer = format_count(integer.to_i64().unwrap_or_default());
    let sign = if value < Decimal::ZERO && !integer.starts_with('-') { "-" } else { "" };

    if fraction.is_zero() {
        format!("{sign}{integer}")
    } else {
        let fraction = fraction.normalize().to_string();
        format!("{sign}{integer}{}", fraction.trim_start_matches('0'))
    }
}

/// Compact axis label: `1.5M`, `250K`
pub fn format_compact(value: i64) -> String {
    let abs = value.unsigned_abs() as f64;
    let sign = if value < 0 { "-" } else { "" };
    if abs >= 1_000_000.0 {
        format!("{sign}{:.1}M", abs / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("{sign}{:.0}K", abs / 1_000.0)
    } else {
        value.to_string()
    }
}

/// Bars are scaled to the window maximum plus this headroom
pub const BAR_HEADROOM: f64 = 1.05;

/// Full-bar value for a window whose largest leg OI is `max_oi`, never below 1
pub fn bar_scale(max_oi: i64) -> f64 {
    (max_oi as f64 * BAR_HEADROOM).max(1.0)
}

/// Whole cells filled by `value` on a `width`-cell bar where `scale` is a full bar
pub fn bar_fill(value: i64, scale: f64, width: usize) -> usize {
    if value <= 0 {
        return 0;
    }
    let fill = (value as f64 / scale * width as f64).floor() as usize;
    fill.min(width)
}

/// Back-to-back bar: call OI grows left from the divider, put OI grows right
fn oi_bar(call_oi: i64, put_oi: i64, max_oi: i64) -> String {
    let scale = bar_scale(max_oi);
    let call = bar_fill(call_oi, scale, BAR_WIDTH);
    let put = bar_fill(put_oi, scale, BAR_WIDTH);
    format!(
        "{}{}│{}{}",
        " ".repeat(BAR_WIDTH - call),
        "█".repeat(call),
        "█".repeat(put),
        " ".repeat(BAR_WIDTH - put)
    )
}
