use ratatui::widgets::TableState;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

use serde_json::Value;

use crate::config::Config;
use crate::controller::{Feed, RefreshState};
use crate::filter::{filter_indices, FilterCriteria, FilterStats};
use crate::map::MapFrame;
use crate::model::{region_id, AircraftRecord};

pub const INTERVAL_PRESETS: [Duration; 5] = [
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(15),
    Duration::from_secs(30),
    Duration::from_secs(60),
];

const NOTICE_TTL: Duration = Duration::from_secs(6);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
    Help,
    Filters,
    Stats,
}

/// Criteria editable from the filter popup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterField {
    AltitudeMin,
    AltitudeMax,
    SpeedMin,
    SpeedMax,
    DistanceMax,
    AircraftType,
    DataSource,
}

impl FilterField {
    pub const ALL: [FilterField; 7] = [
        FilterField::AltitudeMin,
        FilterField::AltitudeMax,
        FilterField::SpeedMin,
        FilterField::SpeedMax,
        FilterField::DistanceMax,
        FilterField::AircraftType,
        FilterField::DataSource,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FilterField::AltitudeMin => "Min altitude (ft)",
            FilterField::AltitudeMax => "Max altitude (ft)",
            FilterField::SpeedMin => "Min speed (kts)",
            FilterField::SpeedMax => "Max speed (kts)",
            FilterField::DistanceMax => "Max distance (mi)",
            FilterField::AircraftType => "Aircraft types",
            FilterField::DataSource => "Data sources",
        }
    }

    /// Current value as edit text; empty when the criterion is unset.
    pub fn current(self, filters: &FilterCriteria) -> String {
        fn num<T: ToString>(value: Option<T>) -> String {
            value.map(|v| v.to_string()).unwrap_or_default()
        }
        match self {
            FilterField::AltitudeMin => num(filters.altitude_min),
            FilterField::AltitudeMax => num(filters.altitude_max),
            FilterField::SpeedMin => num(filters.speed_min),
            FilterField::SpeedMax => num(filters.speed_max),
            FilterField::DistanceMax => num(filters.distance_max),
            FilterField::AircraftType => filters.aircraft_type.join(","),
            FilterField::DataSource => filters.data_source.join(","),
        }
    }

    /// Parses `text` into the criterion. Empty text clears it; lists are
    /// comma separated.
    pub fn apply(self, filters: &mut FilterCriteria, text: &str) -> Result<(), String> {
        let text = text.trim();
        match self {
            FilterField::AltitudeMin => filters.altitude_min = parse_altitude(text)?,
            FilterField::AltitudeMax => filters.altitude_max = parse_altitude(text)?,
            FilterField::SpeedMin => filters.speed_min = parse_bound(text)?,
            FilterField::SpeedMax => filters.speed_max = parse_bound(text)?,
            FilterField::DistanceMax => filters.distance_max = parse_bound(text)?,
            FilterField::AircraftType => filters.aircraft_type = split_list(text),
            FilterField::DataSource => filters.data_source = split_list(text),
        }
        Ok(())
    }
}

fn parse_altitude(text: &str) -> Result<Option<i64>, String> {
    if text.is_empty() {
        return Ok(None);
    }
    text.replace(',', "")
        .parse::<i64>()
        .map(Some)
        .map_err(|_| format!("not a whole number of feet: {text}"))
}

fn parse_bound(text: &str) -> Result<Option<f64>, String> {
    if text.is_empty() {
        return Ok(None);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        _ => Err(format!("not a non-negative number: {text}")),
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Flattens a region stats payload into label/value rows. Nested objects
/// get dotted labels; arrays show their length.
pub fn stats_rows(value: &Value) -> Vec<(String, String)> {
    fn walk(prefix: &str, value: &Value, rows: &mut Vec<(String, String)>) {
        match value {
            Value::Object(map) => {
                for (key, inner) in map {
                    let label = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    walk(&label, inner, rows);
                }
            }
            Value::Array(items) => rows.push((prefix.to_string(), format!("{} items", items.len()))),
            Value::String(text) => rows.push((prefix.to_string(), text.clone())),
            Value::Null => rows.push((prefix.to_string(), "N/A".to_string())),
            other => rows.push((prefix.to_string(), other.to_string())),
        }
    }
    let mut rows = Vec::new();
    walk("", value, &mut rows);
    rows
}

/// Region stats fetched on demand for the stats popup.
#[derive(Clone, Debug)]
pub struct RegionStats {
    pub region: String,
    pub rows: Vec<(String, String)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutMode {
    Full,
    Compact,
    Map,
}

impl LayoutMode {
    pub fn next(self) -> Self {
        match self {
            LayoutMode::Full => LayoutMode::Compact,
            LayoutMode::Compact => LayoutMode::Map,
            LayoutMode::Map => LayoutMode::Full,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LayoutMode::Full => "FULL",
            LayoutMode::Compact => "COMPACT",
            LayoutMode::Map => "MAP",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => LayoutMode::Compact,
            "map" | "radar" => LayoutMode::Map,
            _ => LayoutMode::Full,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Notice {
    pub message: String,
    pub error: bool,
    pub at: Instant,
}

/// Terminal-side view state. The authoritative flight data lives in the
/// latest [`RefreshState`] published by the poller.
#[derive(Debug)]
pub struct App {
    pub(crate) state: RefreshState,
    pub(crate) filters: FilterCriteria,
    pub(crate) input_mode: InputMode,
    pub(crate) search_edit: String,
    pub(crate) filter_cursor: usize,
    pub(crate) filter_edit: String,
    pub(crate) filter_editing: bool,
    pub(crate) region_stats: Option<RegionStats>,
    pub(crate) regions: Vec<String>,
    pub(crate) table_state: TableState,
    pub(crate) cursor_key: Option<String>,
    pub(crate) selected_hex: Option<String>,
    pub(crate) layout_mode: LayoutMode,
    pub(crate) auto_refresh: bool,
    pub(crate) interval: Duration,
    pub(crate) map_center: (f64, f64),
    pub(crate) map_zoom: u8,
    pub(crate) export_dir: PathBuf,
    pub(crate) base_url: String,
    pub(crate) notice: Option<Notice>,
}

impl App {
    pub fn new(config: &Config) -> Self {
        let filters = config.filter_criteria();
        let mut regions = config.regions.clone();
        if !regions.contains(&config.region) {
            regions.insert(0, config.region.clone());
        }
        Self {
            state: RefreshState::new(&config.region),
            filters,
            input_mode: InputMode::Normal,
            search_edit: String::new(),
            filter_cursor: 0,
            filter_edit: String::new(),
            filter_editing: false,
            region_stats: None,
            regions,
            table_state: TableState::default(),
            cursor_key: None,
            selected_hex: None,
            layout_mode: LayoutMode::from_str(&config.layout),
            auto_refresh: config.auto_refresh,
            interval: config.refresh,
            map_center: (config.map_center_lat, config.map_center_lon),
            map_zoom: config.map_zoom,
            export_dir: PathBuf::from(&config.export_dir),
            base_url: config.base_url.clone(),
            notice: None,
        }
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    /// Replaces the view of the refresh state and learns any new enabled
    /// regions the API reported.
    pub fn apply_state(&mut self, state: RefreshState) {
        for region in state.regions.iter().filter(|r| r.enabled) {
            let id = region.id();
            if !id.is_empty() && !self.regions.contains(&id) {
                debug!("region discovered: {id}");
                self.regions.push(id);
            }
        }
        if !self.regions.contains(&state.current_region) {
            self.regions.push(state.current_region.clone());
        }
        self.state = state;
    }

    pub fn visible_indices(&self) -> Vec<usize> {
        filter_indices(&self.state.dataset, &self.filters)
    }

    pub fn visible_records(&self, indices: &[usize]) -> Vec<&AircraftRecord> {
        indices
            .iter()
            .filter_map(|idx| self.state.dataset.get(*idx))
            .collect()
    }

    pub fn stats(&self, indices: &[usize]) -> FilterStats {
        FilterStats::compute(&self.state.dataset, &self.visible_records(indices))
    }

    pub fn map_frame(&self) -> MapFrame {
        MapFrame::for_region(self.state.region_info.as_ref(), self.map_center, self.map_zoom)
    }

    pub fn next_row(&mut self, visible_len: usize) {
        if visible_len == 0 {
            return;
        }
        let idx = self.table_state.selected().unwrap_or(0);
        let next = if idx + 1 >= visible_len { 0 } else { idx + 1 };
        self.table_state.select(Some(next));
    }

    pub fn previous_row(&mut self, visible_len: usize) {
        if visible_len == 0 {
            return;
        }
        let idx = self.table_state.selected().unwrap_or(0);
        let prev = if idx == 0 { visible_len - 1 } else { idx - 1 };
        self.table_state.select(Some(prev));
    }

    pub fn clamp_selection_to(&mut self, visible_len: usize) {
        if visible_len == 0 {
            self.table_state.select(None);
        } else if let Some(selected) = self.table_state.selected() {
            if selected >= visible_len {
                self.table_state.select(Some(visible_len - 1));
            }
        } else {
            self.table_state.select(Some(0));
        }
    }

    /// Puts the cursor back on the same aircraft after the rows moved.
    pub fn restore_selection_by_key(&mut self, indices: &[usize]) {
        let Some(key) = self.cursor_key.as_deref() else {
            return;
        };
        let pos = indices.iter().position(|idx| {
            self.state
                .dataset
                .get(*idx)
                .is_some_and(|ac| ac.hex.eq_ignore_ascii_case(key))
        });
        match pos {
            Some(pos) => self.table_state.select(Some(pos)),
            None => self.cursor_key = None,
        }
    }

    pub fn update_selection_key(&mut self, indices: &[usize]) {
        self.cursor_key = self
            .table_state
            .selected()
            .and_then(|pos| indices.get(pos))
            .and_then(|idx| self.state.dataset.get(*idx))
            .map(|ac| ac.hex.to_ascii_lowercase());
    }

    /// Selects the aircraft under the cursor, or clears the selection when it
    /// is already selected.
    pub fn toggle_selected(&mut self, indices: &[usize]) {
        let under_cursor = self
            .table_state
            .selected()
            .and_then(|pos| indices.get(pos))
            .and_then(|idx| self.state.dataset.get(*idx))
            .map(|ac| ac.hex.to_ascii_lowercase());
        if under_cursor.is_some() && under_cursor == self.selected_hex {
            self.selected_hex = None;
        } else if under_cursor.is_some() {
            self.selected_hex = under_cursor;
        }
    }

    /// The selected aircraft as of the latest snapshot. Selection is by hex
    /// and survives refreshes; `None` once the aircraft drops out.
    pub fn selected_aircraft(&self) -> Option<&AircraftRecord> {
        let hex = self.selected_hex.as_deref()?;
        self.state
            .dataset
            .iter()
            .find(|ac| ac.hex.eq_ignore_ascii_case(hex))
    }

    /// Region after the current one in the known list, wrapping around.
    pub fn next_region(&self) -> Option<String> {
        if self.regions.len() < 2 {
            return None;
        }
        let current = region_id(&self.state.current_region);
        let pos = self
            .regions
            .iter()
            .position(|r| region_id(r) == current)
            .map(|pos| pos + 1)
            .unwrap_or(0);
        Some(self.regions[pos % self.regions.len()].clone())
    }

    pub fn begin_region_change(&mut self, region: &str) {
        self.selected_hex = None;
        self.cursor_key = None;
        self.table_state.select(None);
        self.set_notice(format!("Region {region}"), false);
    }

    /// Feed the poller should fetch for the current filters.
    pub fn feed(&self) -> Feed {
        if self.filters.helicopters_only {
            Feed::Helicopters
        } else {
            Feed::Flights
        }
    }

    pub fn toggle_helicopters(&mut self) {
        self.filters.helicopters_only = !self.filters.helicopters_only;
    }

    pub fn toggle_military(&mut self) {
        self.filters.military_only = !self.filters.military_only;
    }

    /// Cycles the explicit on-ground criterion: off, airborne only, off.
    /// Ground traffic stays hidden either way.
    pub fn toggle_ground(&mut self) {
        self.filters.on_ground = match self.filters.on_ground {
            None => Some(false),
            Some(_) => None,
        };
    }

    pub fn clear_filters(&mut self) {
        self.filters = FilterCriteria::default();
        self.search_edit.clear();
        debug!("filters cleared");
    }

    pub fn start_search(&mut self) {
        self.search_edit = self.filters.search.clone().unwrap_or_default();
        self.input_mode = InputMode::Search;
    }

    pub fn apply_search(&mut self) {
        let term = self.search_edit.trim().to_string();
        self.filters.search = if term.is_empty() { None } else { Some(term) };
        self.input_mode = InputMode::Normal;
        debug!("search applied");
    }

    pub fn cancel_search(&mut self) {
        self.search_edit.clear();
        self.input_mode = InputMode::Normal;
    }

    pub fn push_search_char(&mut self, ch: char) {
        self.search_edit.push(ch);
    }

    pub fn backspace_search(&mut self) {
        self.search_edit.pop();
    }

    /// Interval for the refresh controller; zero while auto-refresh is off.
    pub fn poll_interval(&self) -> Duration {
        if self.auto_refresh {
            self.interval
        } else {
            Duration::ZERO
        }
    }

    pub fn toggle_auto_refresh(&mut self) -> Duration {
        self.auto_refresh = !self.auto_refresh;
        self.poll_interval()
    }

    /// Steps to the next longer preset (`forward`) or shorter one. Turns
    /// auto-refresh back on.
    pub fn step_interval(&mut self, forward: bool) -> Duration {
        let pos = INTERVAL_PRESETS
            .iter()
            .position(|p| *p >= self.interval)
            .unwrap_or(INTERVAL_PRESETS.len() - 1);
        let exact = INTERVAL_PRESETS[pos] == self.interval;
        let target = if forward {
            if exact {
                (pos + 1).min(INTERVAL_PRESETS.len() - 1)
            } else {
                pos
            }
        } else {
            pos.saturating_sub(1)
        };
        self.interval = INTERVAL_PRESETS[target];
        self.auto_refresh = true;
        self.poll_interval()
    }

    pub fn open_filters(&mut self) {
        self.filter_cursor = 0;
        self.filter_editing = false;
        self.filter_edit.clear();
        self.input_mode = InputMode::Filters;
        debug!("open filter editor");
    }

    pub fn close_filters(&mut self) {
        self.filter_editing = false;
        self.filter_edit.clear();
        self.input_mode = InputMode::Normal;
    }

    pub fn filter_field(&self) -> FilterField {
        FilterField::ALL[self.filter_cursor % FilterField::ALL.len()]
    }

    pub fn next_filter_field(&mut self) {
        self.filter_cursor = (self.filter_cursor + 1) % FilterField::ALL.len();
    }

    pub fn previous_filter_field(&mut self) {
        if self.filter_cursor == 0 {
            self.filter_cursor = FilterField::ALL.len() - 1;
        } else {
            self.filter_cursor -= 1;
        }
    }

    pub fn start_filter_edit(&mut self) {
        self.filter_edit = self.filter_field().current(&self.filters);
        self.filter_editing = true;
    }

    pub fn cancel_filter_edit(&mut self) {
        self.filter_editing = false;
        self.filter_edit.clear();
    }

    /// Writes the edit buffer into the field under the cursor. A value that
    /// does not parse leaves the criterion unchanged and raises a notice.
    pub fn apply_filter_edit(&mut self) {
        let field = self.filter_field();
        match field.apply(&mut self.filters, &self.filter_edit) {
            Ok(()) => {
                debug!("filter {:?} set", field);
                self.filter_editing = false;
                self.filter_edit.clear();
            }
            Err(err) => self.set_notice(format!("{}: {err}", field.label()), true),
        }
    }

    pub fn push_filter_char(&mut self, ch: char) {
        self.filter_edit.push(ch);
    }

    pub fn backspace_filter(&mut self) {
        self.filter_edit.pop();
    }

    pub fn show_region_stats(&mut self, region: String, value: &Value) {
        self.region_stats = Some(RegionStats {
            region,
            rows: stats_rows(value),
        });
        self.input_mode = InputMode::Stats;
    }

    pub fn close_stats(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    pub fn toggle_layout(&mut self) {
        self.layout_mode = self.layout_mode.next();
    }

    pub fn open_help(&mut self) {
        self.input_mode = InputMode::Help;
    }

    pub fn close_help(&mut self) {
        self.input_mode = InputMode::Normal;
    }

    pub fn set_notice(&mut self, message: String, error: bool) {
        self.notice = Some(Notice {
            message,
            error,
            at: Instant::now(),
        });
    }

    pub fn active_notice(&self, now: Instant) -> Option<&Notice> {
        self.notice
            .as_ref()
            .filter(|n| now.saturating_duration_since(n.at) <= NOTICE_TTL)
    }
}
