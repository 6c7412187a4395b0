use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::AircraftRecord;

const CSV_HEADER: &str =
    "hex,flight,registration,model,operator,lat,lon,alt_baro,gs,track,squawk,distance_miles,seen,data_source";

#[derive(Serialize)]
struct JsonExport<'a> {
    region: &'a str,
    exported_at: String,
    count: usize,
    aircraft: &'a [&'a AircraftRecord],
}

/// Writes the visible rows as CSV and returns the file written.
pub fn export_csv(dir: &Path, region: &str, records: &[&AircraftRecord]) -> Result<PathBuf> {
    let path = export_path(dir, &snapshot_name(region, "csv"))?;

    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for ac in records {
        lines.push(
            [
                csv_field(Some(ac.hex.as_str())),
                csv_field(ac.callsign()),
                csv_field(ac.registration.as_deref()),
                csv_field(ac.model.as_deref()),
                csv_field(ac.operator.as_deref()),
                opt_f64(ac.lat, 5),
                opt_f64(ac.lon, 5),
                ac.alt_baro.map(|v| v.to_string()).unwrap_or_default(),
                opt_f64(ac.gs, 1),
                opt_f64(ac.track, 1),
                csv_field(ac.squawk.as_deref()),
                opt_f64(ac.distance_miles, 1),
                opt_f64(ac.seen, 1),
                csv_field(ac.data_source.as_deref()),
            ]
            .join(","),
        );
    }

    fs::write(&path, lines.join("\n"))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn export_json(dir: &Path, region: &str, records: &[&AircraftRecord]) -> Result<PathBuf> {
    let path = export_path(dir, &snapshot_name(region, "json"))?;
    let payload = JsonExport {
        region,
        exported_at: crate::error::now_rfc3339(),
        count: records.len(),
        aircraft: records,
    };
    let body = serde_json::to_string_pretty(&payload)?;
    fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Saves a server-rendered tabular body (`flights` or `choppers`) verbatim.
pub fn save_tabular(dir: &Path, region: &str, kind: &str, body: &str) -> Result<PathBuf> {
    let filename = format!(
        "{}-{}-{}.csv",
        safe_component(region),
        kind,
        Local::now().format("%Y%m%d-%H%M%S")
    );
    let path = export_path(dir, &filename)?;
    fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn snapshot_name(region: &str, ext: &str) -> String {
    format!(
        "flights-{}-{}.{ext}",
        safe_component(region),
        Local::now().format("%Y%m%d-%H%M%S")
    )
}

fn safe_component(value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "region".to_string()
    } else {
        cleaned
    }
}

fn opt_f64(value: Option<f64>, precision: usize) -> String {
    value
        .filter(|v| v.is_finite())
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_default()
}

fn csv_field(value: Option<&str>) -> String {
    let text = value.unwrap_or("");
    if text.contains(',') || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn export_path(dir: &Path, filename: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(filename);
    Ok(if path.exists() { unique_path(&path) } else { path })
}

fn unique_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("export");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let mut i = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{stem}-{i}")
        } else {
            format!("{stem}-{i}.{ext}")
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{csv_field, export_csv, export_json, save_tabular};
    use crate::model::AircraftRecord;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(name: &str) -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("flight-dash-{name}-{suffix}"))
    }

    fn sample() -> AircraftRecord {
        AircraftRecord {
            hex: "a1b2c3".to_string(),
            flight: Some("SWA123 ".to_string()),
            operator: Some("Acme, Inc".to_string()),
            lat: Some(32.5),
            lon: Some(-95.25),
            alt_baro: Some(12500),
            ..AircraftRecord::default()
        }
    }

    #[test]
    fn csv_quotes_fields_with_commas() {
        assert_eq!(csv_field(Some("a,b")), "\"a,b\"");
        assert_eq!(csv_field(Some("say \"hi\"")), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field(None), "");
    }

    #[test]
    fn csv_export_writes_rows_and_never_overwrites() {
        let dir = temp_dir("csv");
        let ac = sample();
        let first = export_csv(&dir, "etex", &[&ac]).unwrap();
        let second = export_csv(&dir, "etex", &[&ac]).unwrap();
        assert_ne!(first, second);

        let body = fs::read_to_string(&first).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("hex,flight,"));
        assert!(lines[1].starts_with("a1b2c3,SWA123,,,\"Acme, Inc\",32.50000,-95.25000,12500,"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_export_wraps_records() {
        let dir = temp_dir("json");
        let ac = sample();
        let path = export_json(&dir, "etex", &[&ac]).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["region"], "etex");
        assert_eq!(value["count"], 1);
        assert_eq!(value["aircraft"][0]["hex"], "a1b2c3");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn tabular_body_saved_verbatim() {
        let dir = temp_dir("tabular");
        let body = "hex,flight\nabc,TEST1\n";
        let path = save_tabular(&dir, "../etex", "choppers", body).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("etex-choppers-"));
        assert_eq!(fs::read_to_string(&path).unwrap(), body);
        let _ = fs::remove_dir_all(&dir);
    }
}
