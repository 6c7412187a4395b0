use chrono::{DateTime, Utc};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, BorderType, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use ratatui::Frame;
use std::time::Instant;

use crate::app::{App, FilterField, InputMode, LayoutMode};
use crate::controller::Phase;
use crate::filter::{is_helicopter, is_military, FilterStats};
use crate::map::{self, MapTheme};
use crate::model::{AircraftRecord, ServiceHealth};

struct Theme {
    accent: Color,
    warn: Color,
    danger: Color,
    ok: Color,
    dim: Color,
    heli: Color,
    military: Color,
    highlight_fg: Color,
    highlight_bg: Color,
    row_even_bg: Color,
    row_odd_bg: Color,
    header_bg: Color,
    panel_bg: Color,
}

const THEME: Theme = Theme {
    accent: Color::Cyan,
    warn: Color::Yellow,
    danger: Color::Red,
    ok: Color::Green,
    dim: Color::DarkGray,
    heli: Color::LightGreen,
    military: Color::LightRed,
    highlight_fg: Color::Black,
    highlight_bg: Color::Rgb(200, 200, 200),
    row_even_bg: Color::Rgb(20, 20, 24),
    row_odd_bg: Color::Rgb(12, 12, 16),
    header_bg: Color::Rgb(24, 24, 28),
    panel_bg: Color::Rgb(18, 18, 22),
};

pub fn ui(f: &mut Frame, app: &mut App, indices: &[usize]) {
    let size = f.area();
    let now = Instant::now();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(6),
            Constraint::Length(2),
        ])
        .split(size);

    render_header(f, chunks[0], app, now);
    match app.layout_mode {
        LayoutMode::Full => render_full_body(f, chunks[1], app, indices),
        LayoutMode::Compact => render_table(f, chunks[1], app, indices),
        LayoutMode::Map => render_map(f, chunks[1], app, indices),
    }
    render_status_bar(f, chunks[2], app, indices, now);

    match app.input_mode {
        InputMode::Help => render_help_menu(f, size),
        InputMode::Filters => render_filter_editor(f, size, app),
        InputMode::Stats => render_region_stats(f, size, app),
        InputMode::Normal | InputMode::Search => {}
    }
}

fn render_full_body(f: &mut Frame, area: Rect, app: &mut App, indices: &[usize]) {
    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(58), Constraint::Percentage(42)])
        .split(area);

    render_table(f, body[0], app, indices);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(12)])
        .split(body[1]);

    render_map(f, side[0], app, indices);
    render_details(f, side[1], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App, now: Instant) {
    let state = app.state();
    let (conn_text, conn_color) = if state.online {
        ("ONLINE", THEME.ok)
    } else {
        ("OFFLINE", THEME.danger)
    };
    let health = state
        .system_status
        .as_ref()
        .map(|s| s.health())
        .unwrap_or(ServiceHealth::Unknown);
    let health_color = match health {
        ServiceHealth::Healthy => THEME.ok,
        ServiceHealth::Degraded => THEME.warn,
        ServiceHealth::Offline => THEME.danger,
        ServiceHealth::Unknown => THEME.dim,
    };
    let cadence = if app.auto_refresh {
        format!("AUTO {}s", app.interval.as_secs())
    } else {
        "AUTO off".to_string()
    };
    let version = state
        .system_status
        .as_ref()
        .and_then(|s| s.version.clone())
        .map(|v| format!(" v{v}"))
        .unwrap_or_default();

    let line_top = Line::from(vec![
        Span::styled(
            "FLIGHT DASH",
            Style::default()
                .fg(THEME.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(
            format!("REGION {}", state.current_region.to_ascii_uppercase()),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(conn_text, Style::default().fg(conn_color)),
        Span::raw(" | "),
        Span::styled(
            format!("API {}{version}", health.label()),
            Style::default().fg(health_color),
        ),
        Span::raw(" | "),
        Span::raw(cadence),
        Span::raw(" | "),
        Span::styled(
            format!("FEED {}", app.feed().label()),
            Style::default().fg(THEME.dim),
        ),
        Span::raw(" | "),
        Span::styled(
            format!("VIEW {}", app.layout_mode.label()),
            Style::default().fg(THEME.dim),
        ),
    ]);

    let line_bottom = Line::from(phase_spans(app, now));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(format!("FEED {}", app.base_url));
    let paragraph = Paragraph::new(vec![line_top, line_bottom])
        .block(block)
        .style(Style::default().bg(THEME.panel_bg));
    f.render_widget(paragraph, area);
}

fn phase_spans(app: &App, now: Instant) -> Vec<Span<'static>> {
    let state = app.state();
    let mut spans = vec![Span::styled(
        state.phase.label(),
        Style::default()
            .fg(phase_color(state.phase))
            .add_modifier(Modifier::BOLD),
    )];
    if state.loading {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            "Loading flight data...",
            Style::default().fg(THEME.warn),
        ));
    }
    if let Some(err) = &state.error {
        spans.push(Span::raw(" | "));
        let mut text = err.message.clone();
        if state.phase == Phase::Backoff {
            if let Some(secs) = state.retry_in(now) {
                text = format!("Rate limited. Retrying in {secs}s.");
            }
        } else if let Some(status) = err.status {
            if !text.contains(&status.to_string()) {
                text = format!("{text} ({status})");
            }
        }
        spans.push(Span::styled(
            text,
            Style::default().fg(THEME.danger).add_modifier(Modifier::BOLD),
        ));
        if let Some(endpoint) = &err.endpoint {
            spans.push(Span::styled(
                format!(" {endpoint}"),
                Style::default().fg(THEME.dim),
            ));
        }
    }
    spans
}

fn phase_color(phase: Phase) -> Color {
    match phase {
        Phase::Ready => THEME.ok,
        Phase::Loading | Phase::Idle => THEME.warn,
        Phase::Backoff => THEME.warn,
        Phase::Failed | Phase::Stopped => THEME.danger,
    }
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App, indices: &[usize]) {
    let headers = ["CALLSIGN", "HEX", "TYPE", "ALT", "SPD", "DIST", "SEEN", "SRC"];
    let header_cells = headers.iter().map(|label| {
        Cell::from(*label).style(
            Style::default()
                .fg(THEME.accent)
                .bg(THEME.header_bg)
                .add_modifier(Modifier::BOLD),
        )
    });
    let header = Row::new(header_cells)
        .style(Style::default().bg(THEME.header_bg))
        .height(1);

    let selected = app.selected_hex.clone();
    let rows: Vec<Row> = indices
        .iter()
        .filter_map(|idx| app.state.dataset.get(*idx))
        .enumerate()
        .map(|(i, ac)| {
            let mut style = if i % 2 == 0 {
                Style::default().bg(THEME.row_even_bg)
            } else {
                Style::default().bg(THEME.row_odd_bg)
            };
            if selected
                .as_deref()
                .is_some_and(|hex| hex.eq_ignore_ascii_case(&ac.hex))
            {
                style = style.fg(THEME.accent).add_modifier(Modifier::BOLD);
            } else if is_military(ac) {
                style = style.fg(THEME.military);
            } else if is_helicopter(ac) {
                style = style.fg(THEME.heli);
            }
            let cells = vec![
                Cell::from(ac.label()),
                Cell::from(ac.hex.to_ascii_uppercase()),
                Cell::from(fmt_text(ac.model.as_deref().or(ac.typecode.as_deref()))),
                Cell::from(format_altitude(ac.alt_baro)),
                Cell::from(format_speed(ac.gs)),
                Cell::from(format_distance(ac.distance_miles)),
                Cell::from(Span::styled(
                    format_seen(ac.seen),
                    Style::default().fg(seen_color(ac.seen)),
                )),
                Cell::from(fmt_text(ac.data_source.as_deref())),
            ];
            Row::new(cells).style(style)
        })
        .collect();

    let constraints = [
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Min(8),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Length(5),
        Constraint::Length(8),
    ];

    let title = if app.state.loading && app.state.dataset.is_empty() {
        "AIRCRAFT (loading)".to_string()
    } else {
        format!("AIRCRAFT {}", indices.len())
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .title(title)
        .style(Style::default().bg(THEME.panel_bg));

    let table = Table::new(rows, constraints)
        .header(header)
        .block(block)
        .column_spacing(1)
        .style(Style::default().bg(THEME.panel_bg))
        .row_highlight_style(
            Style::default()
                .fg(THEME.highlight_fg)
                .bg(THEME.highlight_bg)
                .add_modifier(Modifier::BOLD),
        );

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_map(f: &mut Frame, area: Rect, app: &App, indices: &[usize]) {
    let records = app.visible_records(indices);
    let frame = app.map_frame();
    let theme = MapTheme {
        accent: THEME.accent,
        dim: THEME.dim,
        heli: THEME.heli,
        military: THEME.military,
        selected: Color::White,
        panel_bg: THEME.panel_bg,
    };
    map::render(f, area, &records, &frame, app.selected_hex.as_deref(), theme);
}

fn render_details(f: &mut Frame, area: Rect, app: &App) {
    let lines = match app.selected_aircraft() {
        Some(ac) => detail_lines(ac),
        None if app.selected_hex.is_some() => vec![Line::from(Span::styled(
            "Selected aircraft is no longer tracked",
            Style::default().fg(THEME.dim),
        ))],
        None => vec![Line::from(Span::styled(
            "Press Enter to select an aircraft",
            Style::default().fg(THEME.dim),
        ))],
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .title("DETAILS");
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .style(Style::default().bg(THEME.panel_bg));
    f.render_widget(paragraph, area);
}

fn detail_lines(ac: &AircraftRecord) -> Vec<Line<'static>> {
    let mut badges = Vec::new();
    if is_helicopter(ac) {
        badges.push(Span::styled(" HELI", Style::default().fg(THEME.heli)));
    }
    if is_military(ac) {
        badges.push(Span::styled(" MIL", Style::default().fg(THEME.military)));
    }
    let mut title = vec![Span::styled(
        ac.label(),
        Style::default()
            .fg(THEME.accent)
            .add_modifier(Modifier::BOLD),
    )];
    title.extend(badges);

    let position = match ac.position() {
        Some((lat, lon)) => format!("{lat:.4}, {lon:.4}"),
        None => "N/A".to_string(),
    };
    vec![
        Line::from(title),
        detail("Hex", ac.hex.to_ascii_uppercase()),
        detail("Reg", fmt_text(ac.registration.as_deref())),
        detail(
            "Aircraft",
            fmt_text(ac.model.as_deref().or(ac.aircraft_type.as_deref())),
        ),
        detail("Operator", fmt_text(ac.operator.as_deref().or(ac.owner.as_deref()))),
        detail(
            "Alt / Spd",
            format!("{} / {}", format_altitude(ac.alt_baro), format_speed(ac.gs)),
        ),
        detail("Track", format_track(ac.track)),
        detail("Squawk", fmt_text(ac.squawk.as_deref())),
        detail("Position", position),
        detail(
            "Seen",
            format!("{} ({})", format_seen(ac.seen), fmt_text(ac.data_source.as_deref())),
        ),
    ]
}

fn detail(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<10}"), Style::default().fg(THEME.dim)),
        Span::raw(value),
    ])
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App, indices: &[usize], now: Instant) {
    let stats: FilterStats = app.stats(indices);
    let avg = stats
        .avg_altitude
        .map(|alt| format_altitude(Some(alt)))
        .unwrap_or_else(|| "--".to_string());
    let mut top = vec![
        Span::styled(
            format!("{}/{} aircraft", stats.visible, stats.total),
            Style::default().fg(Color::White),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{} heli", stats.helicopters),
            Style::default().fg(THEME.heli),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{} mil", stats.military),
            Style::default().fg(THEME.military),
        ),
        Span::raw("  "),
        Span::raw(format!("{} commercial", stats.commercial)),
        Span::raw("  "),
        Span::raw(format!("avg {avg}")),
        Span::raw("  "),
        Span::styled(
            format!("updated {}", format_last_update(app.state().last_update, Utc::now())),
            Style::default().fg(THEME.dim),
        ),
    ];
    let filters = active_filters(app);
    if !filters.is_empty() {
        top.push(Span::raw("  "));
        top.push(Span::styled(
            format!("FILTER {filters}"),
            Style::default().fg(THEME.warn),
        ));
    }

    let bottom = match app.input_mode {
        InputMode::Search => Line::from(vec![
            Span::styled("SEARCH ", Style::default().fg(THEME.accent)),
            Span::raw(format!("{}_", app.search_edit)),
            Span::styled(
                "  Enter apply  Esc cancel  Ctrl+U clear",
                Style::default().fg(THEME.dim),
            ),
        ]),
        _ => {
            let mut spans = vec![Span::styled(
                "q quit  r refresh  g region  p auto  [ ] interval  / search  H heli  M mil  G ground  f filters  c clear  i stats  l layout  e/E export  x server csv  ? help",
                Style::default().fg(THEME.dim),
            )];
            if let Some(notice) = app.active_notice(now) {
                let color = if notice.error { THEME.danger } else { THEME.accent };
                spans.push(Span::raw("  "));
                spans.push(Span::styled(
                    notice.message.clone(),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ));
            }
            Line::from(spans)
        }
    };

    let paragraph =
        Paragraph::new(vec![Line::from(top), bottom]).style(Style::default().bg(THEME.panel_bg));
    f.render_widget(paragraph, area);
}

fn active_filters(app: &App) -> String {
    let mut parts = Vec::new();
    if let Some(search) = &app.filters.search {
        parts.push(format!("\"{search}\""));
    }
    if app.filters.helicopters_only {
        parts.push("heli".to_string());
    }
    if app.filters.military_only {
        parts.push("mil".to_string());
    }
    if app.filters.on_ground == Some(false) {
        parts.push("airborne".to_string());
    }
    let bounds = FilterField::ALL
        .iter()
        .filter(|field| !field.current(&app.filters).is_empty())
        .count();
    if bounds > 0 {
        parts.push(format!("+{bounds} bounds"));
    }
    parts.join(" ")
}

fn render_help_menu(f: &mut Frame, area: Rect) {
    let popup = centered_rect(60, 25, area);
    f.render_widget(Clear, popup);

    let section = |title: &'static str| {
        Line::from(Span::styled(
            title,
            Style::default().fg(THEME.dim).add_modifier(Modifier::BOLD),
        ))
    };
    let lines = vec![
        section("Navigation"),
        Line::from("  Up/Down    Move cursor"),
        Line::from("  Enter      Select / deselect aircraft"),
        Line::from(""),
        section("Data"),
        Line::from("  r          Refresh now"),
        Line::from("  g          Next region"),
        Line::from("  p          Auto-refresh on/off"),
        Line::from("  [ / ]      Shorter / longer refresh interval"),
        Line::from(""),
        section("Filters"),
        Line::from("  /          Search callsign, reg, operator, hex, model"),
        Line::from("  H / M      Helicopters only / military only"),
        Line::from("  G          Airborne only"),
        Line::from("  f          Edit altitude, speed, distance, type, source"),
        Line::from("  c          Clear filters"),
        Line::from(""),
        section("Display & Export"),
        Line::from("  l          Layout (full/compact/map)"),
        Line::from("  e / E      Export visible rows CSV / JSON"),
        Line::from("  x          Save server tabular CSV"),
        Line::from("  i          Region stats"),
        Line::from("  q          Quit"),
        Line::from(""),
        Line::from(Span::styled(
            "Press Esc to close",
            Style::default().fg(THEME.dim),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("HELP");
    let paragraph = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: true })
        .style(Style::default().bg(THEME.panel_bg));
    f.render_widget(paragraph, popup);
}

fn render_filter_editor(f: &mut Frame, area: Rect, app: &App) {
    let popup = centered_rect(56, FilterField::ALL.len() as u16 + 5, area);
    f.render_widget(Clear, popup);

    let mut lines: Vec<Line> = FilterField::ALL
        .iter()
        .enumerate()
        .map(|(pos, field)| {
            let selected = pos == app.filter_cursor;
            let value = if selected && app.filter_editing {
                format!("{}_", app.filter_edit)
            } else {
                let current = field.current(&app.filters);
                if current.is_empty() {
                    "any".to_string()
                } else {
                    current
                }
            };
            let style = if selected {
                Style::default()
                    .fg(THEME.highlight_fg)
                    .bg(THEME.highlight_bg)
            } else {
                Style::default()
            };
            Line::from(Span::styled(format!(" {:<20}{value}", field.label()), style))
        })
        .collect();
    lines.push(Line::from(""));
    let hint = if app.filter_editing {
        "Enter apply  Esc cancel  Ctrl+U clear"
    } else {
        "Up/Down move  Enter edit  Esc close"
    };
    lines.push(Line::from(Span::styled(hint, Style::default().fg(THEME.dim))));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title("FILTERS");
    let paragraph = Paragraph::new(lines)
        .block(block)
        .style(Style::default().bg(THEME.panel_bg));
    f.render_widget(paragraph, popup);
}

fn render_region_stats(f: &mut Frame, area: Rect, app: &App) {
    let Some(stats) = app.region_stats.as_ref() else {
        return;
    };
    let popup = centered_rect(56, stats.rows.len().min(30) as u16 + 4, area);
    f.render_widget(Clear, popup);

    let mut lines: Vec<Line> = stats
        .rows
        .iter()
        .map(|(label, value)| {
            Line::from(vec![
                Span::styled(format!(" {label:<28}"), Style::default().fg(THEME.dim)),
                Span::raw(value.clone()),
            ])
        })
        .collect();
    if lines.is_empty() {
        lines.push(Line::from(" No stats reported"));
    }
    lines.push(Line::from(Span::styled(
        "Press Esc to close",
        Style::default().fg(THEME.dim),
    )));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(format!("STATS {}", stats.region.to_ascii_uppercase()));
    let paragraph = Paragraph::new(lines)
        .block(block)
        .style(Style::default().bg(THEME.panel_bg));
    f.render_widget(paragraph, popup);
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let height = height.min(area.height.saturating_sub(2)).max(3);
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(height),
            Constraint::Min(1),
        ])
        .split(area);
    let vertical = popup_layout[1];
    let width = (vertical.width * percent_x / 100).max(20);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(width),
            Constraint::Min(1),
        ])
        .split(vertical);
    horizontal[1]
}

fn seen_color(seen: Option<f64>) -> Color {
    match seen {
        Some(s) if s > 120.0 => THEME.danger,
        Some(s) if s > 60.0 => THEME.warn,
        Some(_) => THEME.ok,
        None => THEME.dim,
    }
}

fn fmt_text(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => "--".to_string(),
    }
}

/// `12,500ft`; `N/A` when absent.
pub fn format_altitude(alt: Option<i64>) -> String {
    let Some(alt) = alt else {
        return "N/A".to_string();
    };
    let digits = alt.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if alt < 0 { "-" } else { "" };
    format!("{sign}{grouped}ft")
}

pub fn format_speed(speed: Option<f64>) -> String {
    match speed.filter(|s| s.is_finite()) {
        Some(s) => format!("{}kts", s.round() as i64),
        None => "N/A".to_string(),
    }
}

fn format_distance(distance: Option<f64>) -> String {
    match distance.filter(|d| d.is_finite()) {
        Some(d) => format!("{d:.1}mi"),
        None => "--".to_string(),
    }
}

fn format_track(track: Option<f64>) -> String {
    match track.filter(|t| t.is_finite()) {
        Some(t) => format!("{:03.0}°", t.rem_euclid(360.0)),
        None => "--".to_string(),
    }
}

/// Seconds since last message, rounded: `42s`, `3m`, `2h`.
pub fn format_seen(seen: Option<f64>) -> String {
    let Some(seen) = seen.filter(|s| s.is_finite()) else {
        return "--".to_string();
    };
    let seen = seen.max(0.0);
    if seen < 60.0 {
        format!("{}s", seen.round() as u64)
    } else if seen < 3600.0 {
        format!("{}m", (seen / 60.0).round() as u64)
    } else {
        format!("{}h", (seen / 3600.0).round() as u64)
    }
}

/// `Never`, `Xs ago`, `Xm ago` or `Xh ago`; clock skew reads as `0s ago`.
pub fn format_last_update(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(last) = last else {
        return "Never".to_string();
    };
    let diff = (now - last).num_seconds();
    if diff < 0 {
        "0s ago".to_string()
    } else if diff < 60 {
        format!("{diff}s ago")
    } else if diff < 3600 {
        format!("{}m ago", diff / 60)
    } else {
        format!("{}h ago", diff / 3600)
    }
}
