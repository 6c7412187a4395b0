use anyhow::Result;
use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::app::{App, InputMode};
use crate::export;
use crate::poller::PollerHandle;
use crate::ui;

/// Results from threads spawned off the UI loop.
enum Background {
    Notice(String, bool),
    Stats { region: String, value: Value },
}

type BackgroundTx = Sender<Background>;

pub fn init_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;
    Ok(())
}

pub fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut app: App,
    handle: PollerHandle,
    source: Arc<ApiClient>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let (background_tx, background_rx): (BackgroundTx, Receiver<Background>) = mpsc::channel();

    loop {
        if let Some(state) = handle.latest() {
            app.apply_state(state);
        }
        while let Ok(message) = background_rx.try_recv() {
            match message {
                Background::Notice(text, error) => app.set_notice(text, error),
                Background::Stats { region, value } => app.show_region_stats(region, &value),
            }
        }

        let indices = app.visible_indices();
        app.restore_selection_by_key(&indices);
        app.clamp_selection_to(indices.len());
        app.update_selection_key(&indices);

        terminal.draw(|f| ui::ui(f, &mut app, &indices))?;

        if !event::poll(tick_rate)? {
            continue;
        }
        match event::read()? {
            Event::Key(key) if key.kind != KeyEventKind::Release => {
                let quit = match app.input_mode {
                    InputMode::Normal => {
                        handle_normal_key(&mut app, &indices, &handle, &source, &background_tx, key)
                    }
                    InputMode::Search => {
                        handle_search_key(&mut app, key);
                        false
                    }
                    InputMode::Help => {
                        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
                            app.close_help();
                        }
                        false
                    }
                    InputMode::Filters => {
                        handle_filter_key(&mut app, key);
                        false
                    }
                    InputMode::Stats => {
                        if matches!(key.code, KeyCode::Esc | KeyCode::Char('i') | KeyCode::Char('q')) {
                            app.close_stats();
                        }
                        false
                    }
                };
                if quit {
                    handle.stop();
                    return Ok(());
                }
            }
            Event::FocusGained => handle.set_visible(true),
            Event::FocusLost => handle.set_visible(false),
            _ => {}
        }
    }
}

fn handle_normal_key(
    app: &mut App,
    indices: &[usize],
    handle: &PollerHandle,
    source: &Arc<ApiClient>,
    background_tx: &BackgroundTx,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Down => {
            app.next_row(indices.len());
            app.update_selection_key(indices);
        }
        KeyCode::Up => {
            app.previous_row(indices.len());
            app.update_selection_key(indices);
        }
        KeyCode::Enter => app.toggle_selected(indices),
        KeyCode::Char('r') => handle.refresh(),
        KeyCode::Char('g') => {
            if let Some(region) = app.next_region() {
                app.begin_region_change(&region);
                handle.set_region(&region);
            }
        }
        KeyCode::Char('p') => handle.set_interval(app.toggle_auto_refresh()),
        KeyCode::Char('[') => handle.set_interval(app.step_interval(false)),
        KeyCode::Char(']') => handle.set_interval(app.step_interval(true)),
        KeyCode::Char('/') => app.start_search(),
        KeyCode::Char('H') => {
            app.toggle_helicopters();
            handle.set_feed(app.feed());
        }
        KeyCode::Char('M') => app.toggle_military(),
        KeyCode::Char('G') => app.toggle_ground(),
        KeyCode::Char('c') => {
            app.clear_filters();
            handle.set_feed(app.feed());
        }
        KeyCode::Char('f') => app.open_filters(),
        KeyCode::Char('i') => {
            spawn_region_stats(app, Arc::clone(source), background_tx.clone());
            app.set_notice("Loading region stats...".to_string(), false);
        }
        KeyCode::Char('l') => app.toggle_layout(),
        KeyCode::Char('?') => app.open_help(),
        KeyCode::Char('e') => {
            let region = app.state().current_region.clone();
            let records = app.visible_records(indices);
            let result = export::export_csv(&app.export_dir, &region, &records);
            report_export(app, result);
        }
        KeyCode::Char('E') => {
            let region = app.state().current_region.clone();
            let records = app.visible_records(indices);
            let result = export::export_json(&app.export_dir, &region, &records);
            report_export(app, result);
        }
        KeyCode::Char('x') => {
            spawn_tabular_export(app, Arc::clone(source), background_tx.clone());
            app.set_notice("Downloading server CSV...".to_string(), false);
        }
        _ => {}
    }
    false
}

fn handle_search_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.apply_search(),
        KeyCode::Esc => app.cancel_search(),
        KeyCode::Backspace => app.backspace_search(),
        KeyCode::Char(ch) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if ch == 'u' {
                app.search_edit.clear();
            }
        }
        KeyCode::Char(ch) => app.push_search_char(ch),
        _ => {}
    }
}

fn handle_filter_key(app: &mut App, key: KeyEvent) {
    if app.filter_editing {
        match key.code {
            KeyCode::Enter => app.apply_filter_edit(),
            KeyCode::Esc => app.cancel_filter_edit(),
            KeyCode::Backspace => app.backspace_filter(),
            KeyCode::Char(ch) if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if ch == 'u' {
                    app.filter_edit.clear();
                }
            }
            KeyCode::Char(ch) => app.push_filter_char(ch),
            _ => {}
        }
        return;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Char('f') | KeyCode::Char('q') => app.close_filters(),
        KeyCode::Down | KeyCode::Char('j') => app.next_filter_field(),
        KeyCode::Up | KeyCode::Char('k') => app.previous_filter_field(),
        KeyCode::Enter => app.start_filter_edit(),
        _ => {}
    }
}

fn report_export(app: &mut App, result: Result<std::path::PathBuf>) {
    match result {
        Ok(path) => {
            info!("exported {}", path.display());
            app.set_notice(format!("Exported {}", path.display()), false);
        }
        Err(err) => {
            warn!("export failed: {err:#}");
            app.set_notice(format!("Export failed: {err}"), true);
        }
    }
}

/// Fetches the server-rendered CSV off the UI thread and reports back
/// through `background_tx`.
fn spawn_tabular_export(app: &App, source: Arc<ApiClient>, background_tx: BackgroundTx) {
    let region = app.state().current_region.clone();
    let dir = app.export_dir.clone();
    let helicopters = app.filters.helicopters_only;
    thread::spawn(move || {
        let (kind, body) = if helicopters {
            ("choppers", source.fetch_helicopters_tabular(&region))
        } else {
            ("flights", source.fetch_flights_tabular(&region))
        };
        let (text, error) = match body {
            Ok(body) => match export::save_tabular(&dir, &region, kind, &body) {
                Ok(path) => {
                    info!("saved tabular export {}", path.display());
                    (format!("Saved {}", path.display()), false)
                }
                Err(err) => {
                    warn!("tabular save failed: {err:#}");
                    (format!("Export failed: {err}"), true)
                }
            },
            Err(err) => {
                warn!("tabular fetch failed: {err}");
                (format!("Server CSV failed: {}", err.message), true)
            }
        };
        let _ = background_tx.send(Background::Notice(text, error));
    });
}

fn spawn_region_stats(app: &App, source: Arc<ApiClient>, background_tx: BackgroundTx) {
    let region = app.state().current_region.clone();
    thread::spawn(move || {
        let message = match source.fetch_region_stats(&region) {
            Ok(value) => {
                info!("region stats loaded for {region}");
                Background::Stats { region, value }
            }
            Err(err) => {
                warn!("region stats failed: {err}");
                Background::Notice(format!("Region stats failed: {}", err.message), true)
            }
        };
        let _ = background_tx.send(message);
    });
}
