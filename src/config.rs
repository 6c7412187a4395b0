use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::filter::FilterCriteria;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REGION: &str = "etex";
pub const DEFAULT_REFRESH_MS: u64 = 15_000;
pub const DEFAULT_AUTO_REFRESH: bool = true;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ALLOW_HTTP: bool = true;
pub const DEFAULT_HEALTH_PROBE_SECS: u64 = 30;
pub const DEFAULT_MAP_CENTER_LAT: f64 = 32.3513;
pub const DEFAULT_MAP_CENTER_LON: f64 = -95.3011;
pub const DEFAULT_MAP_ZOOM: u8 = 8;
pub const DEFAULT_EXPORT_DIR: &str = "exports";
pub const DEFAULT_LOG_FILE: &str = "flight-dash.log";
pub const DEFAULT_CONFIG_FILE: &str = "flight-dash.toml";

const MIN_REFRESH_MS: u64 = 1000;
const MIN_TIMEOUT_SECS: u64 = 2;
const MAX_MAP_ZOOM: u8 = 18;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub region: String,
    pub regions: Vec<String>,
    pub refresh: Duration,
    pub auto_refresh: bool,
    pub timeout: Duration,
    pub insecure: bool,
    pub allow_http: bool,
    pub allow_insecure: bool,
    pub health_probe: Duration,
    pub map_center_lat: f64,
    pub map_center_lon: f64,
    pub map_zoom: u8,
    pub helicopters_only: bool,
    pub military_only: bool,
    pub altitude_min: Option<i64>,
    pub altitude_max: Option<i64>,
    pub speed_min: Option<f64>,
    pub speed_max: Option<f64>,
    pub distance_max: Option<f64>,
    pub aircraft_types: Vec<String>,
    pub data_sources: Vec<String>,
    pub export_dir: String,
    pub log_enabled: bool,
    pub log_level: String,
    pub log_file: String,
    pub layout: String,
    pub config_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            region: DEFAULT_REGION.to_string(),
            regions: vec![DEFAULT_REGION.to_string()],
            refresh: Duration::from_millis(DEFAULT_REFRESH_MS),
            auto_refresh: DEFAULT_AUTO_REFRESH,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            insecure: false,
            allow_http: DEFAULT_ALLOW_HTTP,
            allow_insecure: false,
            health_probe: Duration::from_secs(DEFAULT_HEALTH_PROBE_SECS),
            map_center_lat: DEFAULT_MAP_CENTER_LAT,
            map_center_lon: DEFAULT_MAP_CENTER_LON,
            map_zoom: DEFAULT_MAP_ZOOM,
            helicopters_only: false,
            military_only: false,
            altitude_min: None,
            altitude_max: None,
            speed_min: None,
            speed_max: None,
            distance_max: None,
            aircraft_types: Vec::new(),
            data_sources: Vec::new(),
            export_dir: DEFAULT_EXPORT_DIR.to_string(),
            log_enabled: false,
            log_level: "info".to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
            layout: "full".to_string(),
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }
}

impl Config {
    /// Interval handed to the refresh controller; zero means auto-refresh off.
    pub fn poll_interval(&self) -> Duration {
        if self.auto_refresh {
            self.refresh
        } else {
            Duration::ZERO
        }
    }

    /// Startup filters for the aircraft list.
    pub fn filter_criteria(&self) -> FilterCriteria {
        FilterCriteria {
            altitude_min: self.altitude_min,
            altitude_max: self.altitude_max,
            speed_min: self.speed_min,
            speed_max: self.speed_max,
            distance_max: self.distance_max,
            aircraft_type: self.aircraft_types.clone(),
            data_source: self.data_sources.clone(),
            helicopters_only: self.helicopters_only,
            military_only: self.military_only,
            ..FilterCriteria::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    region: Option<String>,
    regions: Option<Vec<String>>,
    refresh_ms: Option<u64>,
    auto_refresh: Option<bool>,
    timeout_secs: Option<u64>,
    insecure: Option<bool>,
    allow_http: Option<bool>,
    allow_insecure: Option<bool>,
    health_probe_secs: Option<u64>,
    map_center_lat: Option<f64>,
    map_center_lon: Option<f64>,
    map_zoom: Option<u8>,
    helicopters_only: Option<bool>,
    military_only: Option<bool>,
    altitude_min: Option<i64>,
    altitude_max: Option<i64>,
    speed_min: Option<f64>,
    speed_max: Option<f64>,
    distance_max: Option<f64>,
    aircraft_types: Option<Vec<String>>,
    data_sources: Option<Vec<String>>,
    export_dir: Option<String>,
    log_enabled: Option<bool>,
    log_level: Option<String>,
    log_file: Option<String>,
    layout: Option<String>,
}

pub fn parse_args() -> Result<Config> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        std::process::exit(0);
    }
    parse_from(&args)
}

fn parse_from(args: &[String]) -> Result<Config> {
    let mut explicit_config: Option<PathBuf> = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--config needs a value"))?;
            explicit_config = Some(PathBuf::from(value));
        }
    }

    let env_config = env::var("FLIGHT_DASH_CONFIG").ok().map(PathBuf::from);
    let config_path = explicit_config
        .clone()
        .or(env_config)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = Config::default();
    if config_path.exists() {
        let file_config = load_file_config(&config_path)?;
        apply_file_config(&mut config, file_config);
    } else if explicit_config.is_some() {
        return Err(anyhow!("Config file not found: {}", config_path.display()));
    }
    config.config_path = config_path;

    apply_env(&mut config);
    apply_cli(&mut config, args)?;
    normalize(&mut config);
    validate_security(&config)?;
    Ok(config)
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

fn apply_file_config(target: &mut Config, file: FileConfig) {
    if let Some(base_url) = file.base_url {
        target.base_url = base_url;
    }
    if let Some(region) = file.region {
        target.region = region;
    }
    if let Some(regions) = file.regions {
        target.regions = regions;
    }
    if let Some(ms) = file.refresh_ms {
        target.refresh = Duration::from_millis(ms);
    }
    if let Some(auto) = file.auto_refresh {
        target.auto_refresh = auto;
    }
    if let Some(secs) = file.timeout_secs {
        target.timeout = Duration::from_secs(secs);
    }
    if let Some(insecure) = file.insecure {
        target.insecure = insecure;
    }
    if let Some(allow_http) = file.allow_http {
        target.allow_http = allow_http;
    }
    if let Some(allow_insecure) = file.allow_insecure {
        target.allow_insecure = allow_insecure;
    }
    if let Some(secs) = file.health_probe_secs {
        target.health_probe = Duration::from_secs(secs);
    }
    if let Some(lat) = file.map_center_lat {
        target.map_center_lat = lat;
    }
    if let Some(lon) = file.map_center_lon {
        target.map_center_lon = lon;
    }
    if let Some(zoom) = file.map_zoom {
        target.map_zoom = zoom;
    }
    if let Some(value) = file.helicopters_only {
        target.helicopters_only = value;
    }
    if let Some(value) = file.military_only {
        target.military_only = value;
    }
    if file.altitude_min.is_some() {
        target.altitude_min = file.altitude_min;
    }
    if file.altitude_max.is_some() {
        target.altitude_max = file.altitude_max;
    }
    if file.speed_min.is_some() {
        target.speed_min = file.speed_min;
    }
    if file.speed_max.is_some() {
        target.speed_max = file.speed_max;
    }
    if file.distance_max.is_some() {
        target.distance_max = file.distance_max;
    }
    if let Some(types) = file.aircraft_types {
        target.aircraft_types = types;
    }
    if let Some(sources) = file.data_sources {
        target.data_sources = sources;
    }
    if let Some(dir) = file.export_dir {
        target.export_dir = dir;
    }
    if let Some(enabled) = file.log_enabled {
        target.log_enabled = enabled;
    }
    if let Some(level) = file.log_level {
        target.log_level = level;
    }
    if let Some(path) = file.log_file {
        target.log_file = path;
    }
    if let Some(layout) = file.layout {
        target.layout = layout;
    }
}

fn apply_env(config: &mut Config) {
    if let Ok(value) = env::var("FLIGHT_DASH_BASE_URL") {
        config.base_url = value;
    }
    if let Ok(value) = env::var("FLIGHT_DASH_REGION") {
        config.region = value;
    }
    if let Ok(value) = env::var("FLIGHT_DASH_REGIONS") {
        let regions = split_list(&value);
        if !regions.is_empty() {
            config.regions = regions;
        }
    }
    if let Ok(value) = env::var("FLIGHT_DASH_REFRESH_MS") {
        if let Ok(ms) = value.parse::<u64>() {
            config.refresh = Duration::from_millis(ms);
        }
    }
    if let Ok(value) = env::var("FLIGHT_DASH_AUTO_REFRESH") {
        config.auto_refresh = truthy(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_TIMEOUT") {
        if let Ok(secs) = value.parse::<u64>() {
            config.timeout = Duration::from_secs(secs);
        }
    }
    if let Ok(value) = env::var("FLIGHT_DASH_INSECURE") {
        config.insecure = truthy(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_ALLOW_HTTP") {
        config.allow_http = truthy(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_ALLOW_INSECURE") {
        config.allow_insecure = truthy(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_HEALTH_PROBE") {
        if let Ok(secs) = value.parse::<u64>() {
            config.health_probe = Duration::from_secs(secs);
        }
    }
    if let Ok(value) = env::var("FLIGHT_DASH_MAP_CENTER_LAT") {
        if let Ok(lat) = value.parse::<f64>() {
            config.map_center_lat = lat;
        }
    }
    if let Ok(value) = env::var("FLIGHT_DASH_MAP_CENTER_LON") {
        if let Ok(lon) = value.parse::<f64>() {
            config.map_center_lon = lon;
        }
    }
    if let Ok(value) = env::var("FLIGHT_DASH_MAP_ZOOM") {
        if let Ok(zoom) = value.parse::<u8>() {
            config.map_zoom = zoom;
        }
    }
    if let Ok(value) = env::var("FLIGHT_DASH_HELICOPTERS_ONLY") {
        config.helicopters_only = truthy(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_MILITARY_ONLY") {
        config.military_only = truthy(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_ALTITUDE_MIN") {
        config.altitude_min = value.trim().parse().ok();
    }
    if let Ok(value) = env::var("FLIGHT_DASH_ALTITUDE_MAX") {
        config.altitude_max = value.trim().parse().ok();
    }
    if let Ok(value) = env::var("FLIGHT_DASH_SPEED_MIN") {
        config.speed_min = value.trim().parse().ok();
    }
    if let Ok(value) = env::var("FLIGHT_DASH_SPEED_MAX") {
        config.speed_max = value.trim().parse().ok();
    }
    if let Ok(value) = env::var("FLIGHT_DASH_DISTANCE_MAX") {
        config.distance_max = value.trim().parse().ok();
    }
    if let Ok(value) = env::var("FLIGHT_DASH_AIRCRAFT_TYPES") {
        config.aircraft_types = split_list(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_DATA_SOURCES") {
        config.data_sources = split_list(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_EXPORT_DIR") {
        config.export_dir = value;
    }
    if let Ok(value) = env::var("FLIGHT_DASH_LOG_ENABLED") {
        config.log_enabled = truthy(&value);
    }
    if let Ok(value) = env::var("FLIGHT_DASH_LOG_LEVEL") {
        config.log_level = value;
    }
    if let Ok(value) = env::var("FLIGHT_DASH_LOG_FILE") {
        config.log_file = value;
    }
    if let Ok(value) = env::var("FLIGHT_DASH_LAYOUT") {
        config.layout = value;
    }
}

fn apply_cli(config: &mut Config, args: &[String]) -> Result<()> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .map(|v| v.to_string())
                .ok_or_else(|| anyhow!("{name} needs a value"))
        };
        match arg.as_str() {
            "--config" => {
                value("--config")?;
            }
            "--url" => config.base_url = value("--url")?,
            "--region" => config.region = value("--region")?,
            "--regions" => config.regions = split_list(&value("--regions")?),
            "--refresh-ms" => {
                let ms: u64 = value("--refresh-ms")?
                    .parse()
                    .context("--refresh-ms expects milliseconds")?;
                config.refresh = Duration::from_millis(ms);
            }
            "--no-auto-refresh" => config.auto_refresh = false,
            "--auto-refresh" => config.auto_refresh = true,
            "--timeout" => {
                let secs: u64 = value("--timeout")?
                    .parse()
                    .context("--timeout expects seconds")?;
                config.timeout = Duration::from_secs(secs);
            }
            "--insecure" => config.insecure = true,
            "--allow-http" => config.allow_http = true,
            "--allow-insecure" => config.allow_insecure = true,
            "--health-probe" => {
                let secs: u64 = value("--health-probe")?
                    .parse()
                    .context("--health-probe expects seconds")?;
                config.health_probe = Duration::from_secs(secs);
            }
            "--map-lat" => {
                config.map_center_lat = value("--map-lat")?
                    .parse()
                    .context("--map-lat expects degrees")?;
            }
            "--map-lon" => {
                config.map_center_lon = value("--map-lon")?
                    .parse()
                    .context("--map-lon expects degrees")?;
            }
            "--map-zoom" => {
                config.map_zoom = value("--map-zoom")?
                    .parse()
                    .context("--map-zoom expects a zoom level")?;
            }
            "--helicopters" => config.helicopters_only = true,
            "--military" => config.military_only = true,
            "--alt-min" => {
                config.altitude_min = Some(
                    value("--alt-min")?
                        .parse()
                        .context("--alt-min expects feet")?,
                );
            }
            "--alt-max" => {
                config.altitude_max = Some(
                    value("--alt-max")?
                        .parse()
                        .context("--alt-max expects feet")?,
                );
            }
            "--speed-min" => {
                config.speed_min = Some(
                    value("--speed-min")?
                        .parse()
                        .context("--speed-min expects knots")?,
                );
            }
            "--speed-max" => {
                config.speed_max = Some(
                    value("--speed-max")?
                        .parse()
                        .context("--speed-max expects knots")?,
                );
            }
            "--max-distance" => {
                config.distance_max = Some(
                    value("--max-distance")?
                        .parse()
                        .context("--max-distance expects miles")?,
                );
            }
            "--types" => config.aircraft_types = split_list(&value("--types")?),
            "--sources" => config.data_sources = split_list(&value("--sources")?),
            "--export-dir" => config.export_dir = value("--export-dir")?,
            "--log" => config.log_enabled = true,
            "--no-log" => config.log_enabled = false,
            "--log-level" => config.log_level = value("--log-level")?,
            "--log-file" => config.log_file = value("--log-file")?,
            "--layout" => config.layout = value("--layout")?,
            other => return Err(anyhow!("Unknown argument: {other}")),
        }
    }
    Ok(())
}

fn normalize(config: &mut Config) {
    config.base_url = config.base_url.trim().trim_end_matches('/').to_string();
    config.region = config.region.trim().to_ascii_lowercase();
    if config.region.is_empty() {
        config.region = DEFAULT_REGION.to_string();
    }
    config.regions = config
        .regions
        .iter()
        .map(|r| r.trim().to_ascii_lowercase())
        .filter(|r| !r.is_empty())
        .collect();
    if !config.regions.contains(&config.region) {
        config.regions.insert(0, config.region.clone());
    }
    // refresh_ms = 0 is the same as turning auto-refresh off
    if config.refresh.is_zero() {
        config.auto_refresh = false;
        config.refresh = Duration::from_millis(DEFAULT_REFRESH_MS);
    } else if config.refresh < Duration::from_millis(MIN_REFRESH_MS) {
        config.refresh = Duration::from_millis(MIN_REFRESH_MS);
    }
    if config.timeout < Duration::from_secs(MIN_TIMEOUT_SECS) {
        config.timeout = Duration::from_secs(MIN_TIMEOUT_SECS);
    }
    config.map_zoom = config.map_zoom.min(MAX_MAP_ZOOM);
    let finite = |v: Option<f64>| v.filter(|v| v.is_finite() && *v >= 0.0);
    config.speed_min = finite(config.speed_min);
    config.speed_max = finite(config.speed_max);
    config.distance_max = finite(config.distance_max);
    if let (Some(min), Some(max)) = (config.altitude_min, config.altitude_max) {
        if min > max {
            config.altitude_min = Some(max);
            config.altitude_max = Some(min);
        }
    }
    if let (Some(min), Some(max)) = (config.speed_min, config.speed_max) {
        if min > max {
            config.speed_min = Some(max);
            config.speed_max = Some(min);
        }
    }
    config.aircraft_types = clean_list(&config.aircraft_types);
    config.data_sources = clean_list(&config.data_sources);
    if !(-90.0..=90.0).contains(&config.map_center_lat)
        || !(-180.0..=180.0).contains(&config.map_center_lon)
    {
        config.map_center_lat = DEFAULT_MAP_CENTER_LAT;
        config.map_center_lon = DEFAULT_MAP_CENTER_LON;
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn print_help() {
    println!("flight-dash");
    println!("Usage: flight-dash [--url URL] [--region ID] [--regions ID,ID,...]");
    println!("       [--refresh-ms MS] [--auto-refresh] [--no-auto-refresh] [--timeout SECS]");
    println!("       [--insecure] [--allow-http] [--allow-insecure] [--health-probe SECS]");
    println!("       [--map-lat LAT] [--map-lon LON] [--map-zoom N]");
    println!("       [--helicopters] [--military] [--alt-min FT] [--alt-max FT]");
    println!("       [--speed-min KTS] [--speed-max KTS] [--max-distance MI]");
    println!("       [--types T,T,...] [--sources S,S,...] [--export-dir PATH]");
    println!("       [--log] [--no-log] [--log-level LEVEL] [--log-file PATH]");
    println!("       [--layout full|compact|map] [--config PATH]");
    println!("Environment: FLIGHT_DASH_BASE_URL overrides the API base URL");
    println!("Environment: FLIGHT_DASH_REGION / FLIGHT_DASH_REGIONS select regions");
    println!("Environment: FLIGHT_DASH_REFRESH_MS / FLIGHT_DASH_AUTO_REFRESH control polling");
    println!("Environment: FLIGHT_DASH_TIMEOUT sets the request timeout in seconds");
    println!("Environment: FLIGHT_DASH_ALLOW_HTTP=0 refuses http:// URLs");
    println!("Environment: FLIGHT_DASH_INSECURE / FLIGHT_DASH_ALLOW_INSECURE control TLS checks");
    println!("Environment: FLIGHT_DASH_HEALTH_PROBE sets the connectivity probe (0 disables)");
    println!("Environment: FLIGHT_DASH_MAP_CENTER_LAT/LON/ZOOM set the default map frame");
    println!("Environment: FLIGHT_DASH_HELICOPTERS_ONLY / FLIGHT_DASH_MILITARY_ONLY preset filters");
    println!("Environment: FLIGHT_DASH_ALTITUDE_MIN/MAX, FLIGHT_DASH_SPEED_MIN/MAX, FLIGHT_DASH_DISTANCE_MAX bound the list");
    println!("Environment: FLIGHT_DASH_AIRCRAFT_TYPES / FLIGHT_DASH_DATA_SOURCES take comma lists");
    println!("Environment: FLIGHT_DASH_EXPORT_DIR sets where exports are written");
    println!("Environment: FLIGHT_DASH_LOG_ENABLED/LEVEL/FILE configure logging");
    println!("Environment: FLIGHT_DASH_CONFIG overrides config path");
    println!("Keys: q quit | up/down move | enter select | r refresh | g region | p auto-refresh");
    println!("      [ ] interval | / search | f filters | H helicopters | M military | G ground");
    println!("      c clear | i region stats | l layout | e export csv | E export json");
    println!("      x server csv | ? help");
}

fn validate_security(config: &Config) -> Result<()> {
    let url = config.base_url.trim().to_ascii_lowercase();
    if url.starts_with("http://") && !config.allow_http {
        return Err(anyhow!(
            "Refusing insecure http URL (set allow_http=true or FLIGHT_DASH_ALLOW_HTTP=1 to override)"
        ));
    }
    if config.insecure && !config.allow_insecure {
        return Err(anyhow!(
            "Refusing --insecure without explicit allow_insecure=true or FLIGHT_DASH_ALLOW_INSECURE=1"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        dir.push(format!("flight-dash-config-test-{suffix}"));
        let _ = fs::create_dir_all(&dir);
        dir.push(name);
        dir
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_allows_http_url() {
        let cfg = Config::default();
        assert!(validate_security(&cfg).is_ok());
        assert_eq!(cfg.poll_interval(), Duration::from_millis(15_000));
    }

    #[test]
    fn http_url_rejected_when_disabled() {
        let cfg = Config {
            allow_http: false,
            ..Config::default()
        };
        let err = validate_security(&cfg).unwrap_err();
        assert!(err.to_string().contains("Refusing insecure http URL"));

        let cfg = Config {
            insecure: true,
            ..Config::default()
        };
        assert!(validate_security(&cfg).is_err());
    }

    #[test]
    fn load_file_config_parses_values() {
        let path = temp_file("config.toml");
        let content = r#"
base_url = "https://flights.example.test/"
region = "wtex"
regions = ["etex", "wtex", "socal"]
refresh_ms = 5000
timeout_secs = 4
health_probe_secs = 0
map_center_lat = 34.05
map_center_lon = -118.25
map_zoom = 10
helicopters_only = true
export_dir = "out"
log_enabled = true
log_level = "debug"
layout = "map"
"#;
        fs::write(&path, content).unwrap();
        let cfg = load_file_config(&path).unwrap();
        assert_eq!(cfg.base_url.as_deref(), Some("https://flights.example.test/"));
        assert_eq!(cfg.region.as_deref(), Some("wtex"));
        assert_eq!(cfg.regions.as_ref().map(|r| r.len()), Some(3));
        assert_eq!(cfg.refresh_ms, Some(5000));
        assert_eq!(cfg.timeout_secs, Some(4));
        assert_eq!(cfg.health_probe_secs, Some(0));
        assert_eq!(cfg.map_zoom, Some(10));
        assert_eq!(cfg.helicopters_only, Some(true));
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));

        let result = parse_from(&args(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(result.base_url, "https://flights.example.test");
        assert_eq!(result.region, "wtex");
        assert_eq!(result.refresh, Duration::from_millis(5000));
        assert!(result.health_probe.is_zero());
        assert_eq!(result.layout, "map");
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let path = temp_file("absent.toml");
        let err = parse_from(&args(&["--config", path.to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn cli_flags_override_and_clamp() {
        let path = temp_file("empty.toml");
        fs::write(&path, "").unwrap();
        let cfg = parse_from(&args(&[
            "--config",
            path.to_str().unwrap(),
            "--region",
            " SoCal ",
            "--refresh-ms",
            "200",
            "--timeout",
            "0",
            "--map-zoom",
            "40",
            "--military",
        ]))
        .unwrap();
        assert_eq!(cfg.region, "socal");
        assert_eq!(cfg.regions.first().map(String::as_str), Some("socal"));
        assert_eq!(cfg.refresh, Duration::from_millis(1000));
        assert_eq!(cfg.timeout, Duration::from_secs(2));
        assert_eq!(cfg.map_zoom, 18);
        assert!(cfg.military_only);
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn filter_bounds_from_file_and_flags() {
        let path = temp_file("filters.toml");
        fs::write(
            &path,
            r#"
altitude_min = 30000
altitude_max = 1000
speed_max = 250.0
distance_max = -5.0
aircraft_types = ["B738", " "]
data_sources = ["dump1090"]
"#,
        )
        .unwrap();
        let cfg = parse_from(&args(&[
            "--config",
            path.to_str().unwrap(),
            "--speed-min",
            "90",
            "--sources",
            "dump1090, opensky",
        ]))
        .unwrap();
        // reversed bounds are swapped, negative distance dropped
        assert_eq!(cfg.altitude_min, Some(1000));
        assert_eq!(cfg.altitude_max, Some(30000));
        assert_eq!(cfg.speed_min, Some(90.0));
        assert_eq!(cfg.speed_max, Some(250.0));
        assert_eq!(cfg.distance_max, None);
        assert_eq!(cfg.aircraft_types, vec!["B738".to_string()]);
        assert_eq!(
            cfg.data_sources,
            vec!["dump1090".to_string(), "opensky".to_string()]
        );

        let criteria = cfg.filter_criteria();
        assert_eq!(criteria.altitude_min, Some(1000));
        assert_eq!(criteria.speed_max, Some(250.0));
        assert_eq!(criteria.aircraft_type, vec!["B738".to_string()]);
        assert_eq!(criteria.data_source.len(), 2);
        assert!(criteria.search.is_none());
        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn zero_refresh_disables_auto_refresh() {
        let mut cfg = Config {
            refresh: Duration::ZERO,
            ..Config::default()
        };
        normalize(&mut cfg);
        assert!(!cfg.auto_refresh);
        assert!(cfg.poll_interval().is_zero());
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let mut cfg = Config::default();
        let err = apply_cli(&mut cfg, &args(&["--frobnicate"])).unwrap_err();
        assert!(err.to_string().contains("Unknown argument"));
        assert!(apply_cli(&mut cfg, &args(&["--url"])).is_err());
    }

    #[test]
    fn truthy_values() {
        assert!(truthy("1"));
        assert!(truthy("Yes"));
        assert!(!truthy("off"));
        assert_eq!(split_list("etex, ,wtex"), vec!["etex", "wtex"]);
    }
}
