use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AircraftRecord {
    #[serde(default, deserialize_with = "de_string_from_any")]
    pub hex: String,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub flight: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub lon: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64_from_any")]
    pub alt_baro: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_i64_from_any")]
    pub alt_geom: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub gs: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub track: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i64_from_any")]
    pub baro_rate: Option<i64>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub squawk: Option<String>,
    #[serde(default, deserialize_with = "de_bool_from_any")]
    pub on_ground: bool,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub seen: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub rssi: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_u64_from_any")]
    pub messages: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub distance_miles: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub data_source: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub registration: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub operator: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub manufacturer: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub typecode: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub aircraft_type: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub icao_aircraft_class: Option<String>,
}

impl AircraftRecord {
    /// Position suitable for plotting, or `None` when either coordinate is
    /// missing, non-finite or out of range.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) if valid_coordinate(lat, lon) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn callsign(&self) -> Option<&str> {
        self.flight
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Callsign when present, otherwise the upper-cased hex.
    pub fn label(&self) -> String {
        self.callsign()
            .map(|value| value.to_string())
            .unwrap_or_else(|| self.hex.to_ascii_uppercase())
    }
}

pub fn valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Coordinate {
    #[serde(default, deserialize_with = "de_f64_from_any")]
    pub lat: f64,
    #[serde(default, deserialize_with = "de_f64_from_any")]
    pub lon: f64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RegionCollector {
    #[serde(rename = "type", default, deserialize_with = "de_string_from_any")]
    pub kind: String,
    #[serde(default, deserialize_with = "de_bool_from_any")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "de_string_from_any")]
    pub url: String,
    #[serde(default, deserialize_with = "de_opt_string_from_any")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RegionDescriptor {
    #[serde(default, deserialize_with = "de_string_from_any")]
    pub name: String,
    #[serde(default = "default_enabled", deserialize_with = "de_bool_from_any")]
    pub enabled: bool,
    #[serde(default)]
    pub center: Option<Coordinate>,
    #[serde(default, deserialize_with = "de_opt_f64_from_any")]
    pub radius_miles: Option<f64>,
    #[serde(default)]
    pub collectors: Vec<RegionCollector>,
}

fn default_enabled() -> bool {
    true
}

impl RegionDescriptor {
    /// Identifier used in `/api/v1/{region}/...` paths.
    pub fn id(&self) -> String {
        region_id(&self.name)
    }
}

pub fn region_id(name: &str) -> String {
    name.split_whitespace()
        .collect::<String>()
        .to_ascii_lowercase()
}

pub fn find_region<'a>(regions: &'a [RegionDescriptor], id: &str) -> Option<&'a RegionDescriptor> {
    let wanted = region_id(id);
    regions.iter().find(|region| region.id() == wanted)
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CollectorStatus {
    #[serde(deserialize_with = "de_bool_from_any")]
    pub enabled: bool,
    #[serde(deserialize_with = "de_opt_string_from_any")]
    pub last_successful_collection: Option<String>,
    #[serde(deserialize_with = "de_opt_string_from_any")]
    pub last_error: Option<String>,
    #[serde(deserialize_with = "de_u64_from_any")]
    pub error_count: u64,
    #[serde(deserialize_with = "de_u64_from_any")]
    pub aircraft_count: u64,
    #[serde(deserialize_with = "de_string_from_any")]
    pub status: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApiCredits {
    #[serde(deserialize_with = "de_opt_i64_from_any")]
    pub opensky_remaining: Option<i64>,
    #[serde(deserialize_with = "de_opt_i64_from_any")]
    pub opensky_limit: Option<i64>,
    #[serde(deserialize_with = "de_opt_string_from_any")]
    pub opensky_reset_time: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceHealth {
    Healthy,
    Degraded,
    Offline,
    Unknown,
}

impl ServiceHealth {
    pub fn label(self) -> &'static str {
        match self {
            ServiceHealth::Healthy => "HEALTHY",
            ServiceHealth::Degraded => "DEGRADED",
            ServiceHealth::Offline => "OFFLINE",
            ServiceHealth::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SystemStatus {
    #[serde(deserialize_with = "de_string_from_any")]
    pub status: String,
    #[serde(deserialize_with = "de_collectors")]
    pub collectors: BTreeMap<String, CollectorStatus>,
    pub api_credits: Option<ApiCredits>,
    #[serde(deserialize_with = "de_opt_f64_from_any")]
    pub uptime: Option<f64>,
    #[serde(deserialize_with = "de_opt_string_from_any")]
    pub version: Option<String>,
}

impl SystemStatus {
    pub fn health(&self) -> ServiceHealth {
        match self.status.trim().to_ascii_lowercase().as_str() {
            "healthy" => ServiceHealth::Healthy,
            "degraded" => ServiceHealth::Degraded,
            "offline" => ServiceHealth::Offline,
            _ => ServiceHealth::Unknown,
        }
    }

    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

/// Accepts a bare array or an object carrying an `aircraft` (or `ac`) array.
/// Any other shape yields an empty list; undecodable entries are skipped.
pub fn normalize_aircraft_payload(value: Value) -> Vec<AircraftRecord> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("aircraft").or_else(|| map.remove("ac")) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<AircraftRecord>(item).ok())
        .filter(|ac| !ac.hex.trim().is_empty())
        .collect()
}

/// Accepts `{regions: [...], total_regions}` or a bare array.
pub fn normalize_regions_payload(value: Value) -> Vec<RegionDescriptor> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("regions") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RegionDescriptor>(item).ok())
        .collect()
}

fn de_collectors<'de, D>(deserializer: D) -> Result<BTreeMap<String, CollectorStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut out = BTreeMap::new();
    if let Value::Object(map) = Value::deserialize(deserializer)? {
        for (name, entry) in map {
            if !entry.is_object() {
                continue;
            }
            if let Ok(status) = serde_json::from_value::<CollectorStatus>(entry) {
                out.insert(name, status);
            }
        }
    }
    Ok(out)
}

fn de_string_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_string_from_any(deserializer)?.unwrap_or_default())
}

fn de_opt_string_from_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        _ => Ok(None),
    }
}

fn de_bool_from_any<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Ok(flag),
        Value::Number(number) => Ok(number.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        Value::String(text) => Ok(matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )),
        _ => Ok(false),
    }
}

fn de_f64_from_any<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_f64_from_any(deserializer)?.unwrap_or(0.0))
}

fn de_u64_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_opt_u64_from_any(deserializer)?.unwrap_or(0))
}

fn de_opt_i64_from_any<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => {
            if let Some(value) = number.as_i64() {
                Ok(Some(value))
            } else if let Some(value) = number.as_f64() {
                Ok(Some(value as i64))
            } else {
                Ok(None)
            }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else if let Ok(value) = trimmed.parse::<i64>() {
                Ok(Some(value))
            } else if let Ok(value) = trimmed.parse::<f64>() {
                Ok(Some(value).filter(|v| v.is_finite()).map(|v| v as i64))
            } else {
                // dump1090 reports "ground" for alt_baro
                Ok(None)
            }
        }
        Value::Null => Ok(None),
        other => Err(serde::de::Error::custom(format!(
            "expected number or null, got {other}"
        ))),
    }
}

fn de_opt_f64_from_any<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => number
            .as_f64()
            .map(|v| Some(v).filter(|v| v.is_finite()))
            .ok_or_else(|| serde::de::Error::custom("expected float-compatible number")),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else if let Ok(value) = trimmed.parse::<f64>() {
                Ok(Some(value).filter(|v| v.is_finite()))
            } else {
                Ok(None)
            }
        }
        Value::Null => Ok(None),
        other => Err(serde::de::Error::custom(format!(
            "expected number or null, got {other}"
        ))),
    }
}

fn de_opt_u64_from_any<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(number) => {
            if let Some(value) = number.as_u64() {
                Ok(Some(value))
            } else if let Some(value) = number.as_f64() {
                Ok(Some(value.max(0.0) as u64))
            } else {
                Ok(None)
            }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else if let Ok(value) = trimmed.parse::<u64>() {
                Ok(Some(value))
            } else if let Ok(value) = trimmed.parse::<f64>() {
                Ok(Some(value.max(0.0) as u64))
            } else {
                Ok(None)
            }
        }
        Value::Null => Ok(None),
        other => Err(serde::de::Error::custom(format!(
            "expected number or null, got {other}"
        ))),
    }
}
