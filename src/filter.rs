use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::model::AircraftRecord;

const MILITARY_HEX_PREFIXES: [&str; 2] = ["AE", "43"];
const MILITARY_OPERATOR_KEYWORDS: [&str; 4] = ["air force", "navy", "army", "military"];

/// Independent optional predicates. The default value filters nothing
/// beyond the unconditional on-ground exclusion.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FilterCriteria {
    pub search: Option<String>,
    pub aircraft_type: Vec<String>,
    pub altitude_min: Option<i64>,
    pub altitude_max: Option<i64>,
    pub speed_min: Option<f64>,
    pub speed_max: Option<f64>,
    pub distance_max: Option<f64>,
    pub on_ground: Option<bool>,
    pub data_source: Vec<String>,
    pub helicopters_only: bool,
    pub military_only: bool,
}

impl FilterCriteria {
    pub fn is_default(&self) -> bool {
        *self == FilterCriteria::default()
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }
}

pub fn is_helicopter(ac: &AircraftRecord) -> bool {
    ac.icao_aircraft_class
        .as_deref()
        .is_some_and(|class| class.starts_with('H'))
}

pub fn is_military(ac: &AircraftRecord) -> bool {
    let hex = ac.hex.to_ascii_uppercase();
    if MILITARY_HEX_PREFIXES.iter().any(|p| hex.starts_with(p)) {
        return true;
    }
    if let Some(operator) = ac.operator.as_deref() {
        let operator = operator.to_lowercase();
        if MILITARY_OPERATOR_KEYWORDS
            .iter()
            .any(|kw| operator.contains(kw))
        {
            return true;
        }
    }
    ac.registration
        .as_deref()
        .is_some_and(|reg| reg.starts_with("M-"))
}

pub fn is_commercial(ac: &AircraftRecord) -> bool {
    if is_helicopter(ac) || is_military(ac) {
        return false;
    }
    match ac.operator.as_deref() {
        Some(op) if !op.is_empty() => !op.to_lowercase().contains("private"),
        _ => false,
    }
}

/// Applies `criteria` to `dataset` and returns the survivors ordered by
/// distance, then by freshness. Pure: same input, same output.
pub fn apply_filters<'a>(
    dataset: &'a [AircraftRecord],
    criteria: &FilterCriteria,
) -> Vec<&'a AircraftRecord> {
    filter_indices(dataset, criteria)
        .into_iter()
        .map(|idx| &dataset[idx])
        .collect()
}

/// Same as [`apply_filters`], as positions into `dataset`.
pub fn filter_indices(dataset: &[AircraftRecord], criteria: &FilterCriteria) -> Vec<usize> {
    let search = criteria.search_term();
    let types: Vec<String> = criteria
        .aircraft_type
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let mut out: Vec<usize> = dataset
        .iter()
        .enumerate()
        .filter(|(_, ac)| matches(ac, criteria, search.as_deref(), &types))
        .map(|(idx, _)| idx)
        .collect();
    out.sort_by(|a, b| compare_records(&dataset[*a], &dataset[*b]));
    out
}

fn matches(
    ac: &AircraftRecord,
    criteria: &FilterCriteria,
    search: Option<&str>,
    types: &[String],
) -> bool {
    if ac.on_ground {
        return false;
    }

    if let Some(term) = search {
        let haystacks = [
            ac.flight.as_deref(),
            ac.registration.as_deref(),
            ac.operator.as_deref(),
            Some(ac.hex.as_str()),
            ac.model.as_deref(),
        ];
        if !haystacks.iter().any(|value| contains_ci(*value, term)) {
            return false;
        }
    }

    if !types.is_empty() {
        let hit = types.iter().any(|t| {
            contains_ci(ac.model.as_deref(), t)
                || contains_ci(ac.aircraft_type.as_deref(), t)
                || contains_ci(ac.typecode.as_deref(), t)
        });
        if !hit {
            return false;
        }
    }

    if let (Some(min), Some(alt)) = (criteria.altitude_min, ac.alt_baro) {
        if alt < min {
            return false;
        }
    }
    if let (Some(max), Some(alt)) = (criteria.altitude_max, ac.alt_baro) {
        if alt > max {
            return false;
        }
    }
    if let (Some(min), Some(gs)) = (criteria.speed_min, ac.gs) {
        if gs < min {
            return false;
        }
    }
    if let (Some(max), Some(gs)) = (criteria.speed_max, ac.gs) {
        if gs > max {
            return false;
        }
    }
    if let (Some(max), Some(dist)) = (criteria.distance_max, ac.distance_miles) {
        if dist > max {
            return false;
        }
    }

    if let Some(on_ground) = criteria.on_ground {
        if ac.on_ground != on_ground {
            return false;
        }
    }

    if !criteria.data_source.is_empty() {
        let allowed = ac
            .data_source
            .as_deref()
            .is_some_and(|src| criteria.data_source.iter().any(|d| d == src));
        if !allowed {
            return false;
        }
    }

    if criteria.helicopters_only && !is_helicopter(ac) {
        return false;
    }
    if criteria.military_only && !is_military(ac) {
        return false;
    }
    true
}

fn contains_ci(value: Option<&str>, needle: &str) -> bool {
    value
        .map(|v| v.to_lowercase().contains(needle))
        .unwrap_or(false)
}

// Non-finite values count as missing so the order stays total.
fn compare_records(a: &AircraftRecord, b: &AircraftRecord) -> Ordering {
    let finite = |v: Option<f64>| v.filter(|v| v.is_finite());
    match (finite(a.distance_miles), finite(b.distance_miles)) {
        (Some(da), Some(db)) => da.total_cmp(&db),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => {
            let sa = finite(a.seen).unwrap_or(f64::INFINITY);
            let sb = finite(b.seen).unwrap_or(f64::INFINITY);
            sa.total_cmp(&sb)
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterStats {
    pub total: usize,
    pub visible: usize,
    pub helicopters: usize,
    pub military: usize,
    pub commercial: usize,
    pub avg_altitude: Option<i64>,
}

impl FilterStats {
    /// Counts are taken over the unfiltered dataset; the average altitude
    /// over what is visible.
    pub fn compute(dataset: &[AircraftRecord], visible: &[&AircraftRecord]) -> Self {
        let avg_altitude = if visible.is_empty() {
            None
        } else {
            let sum: i64 = visible.iter().map(|ac| ac.alt_baro.unwrap_or(0)).sum();
            Some((sum as f64 / visible.len() as f64).round() as i64)
        };
        Self {
            total: dataset.len(),
            visible: visible.len(),
            helicopters: dataset.iter().filter(|ac| is_helicopter(ac)).count(),
            military: dataset.iter().filter(|ac| is_military(ac)).count(),
            commercial: dataset.iter().filter(|ac| is_commercial(ac)).count(),
            avg_altitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_filters, is_commercial, is_military, FilterCriteria, FilterStats};
    use crate::model::AircraftRecord;

    fn ac(hex: &str) -> AircraftRecord {
        AircraftRecord {
            hex: hex.to_string(),
            ..AircraftRecord::default()
        }
    }

    fn hexes(list: &[&AircraftRecord]) -> Vec<String> {
        list.iter().map(|ac| ac.hex.clone()).collect()
    }

    #[test]
    fn sorts_by_distance_then_seen() {
        let a = AircraftRecord { distance_miles: Some(5.0), ..ac("a") };
        let b = AircraftRecord { distance_miles: Some(2.0), ..ac("b") };
        let c = AircraftRecord { seen: Some(10.0), ..ac("c") };
        let d = AircraftRecord { seen: Some(5.0), ..ac("d") };
        let data = vec![a, b, c, d];
        let out = apply_filters(&data, &FilterCriteria::default());
        assert_eq!(hexes(&out), vec!["b", "a", "d", "c"]);
    }

    #[test]
    fn nan_distance_keeps_sort_total() {
        let payload: Vec<serde_json::Value> = (0..200)
            .map(|i| {
                if i % 7 == 0 {
                    serde_json::json!({ "hex": format!("x{i}"), "distance_miles": "NaN", "seen": i })
                } else {
                    serde_json::json!({ "hex": format!("x{i}"), "distance_miles": ((i * 37) % 101) as f64 })
                }
            })
            .collect();
        let data = crate::model::normalize_aircraft_payload(serde_json::Value::Array(payload));
        assert_eq!(data.len(), 200);
        let out = apply_filters(&data, &FilterCriteria::default());

        let distances: Vec<f64> = out.iter().filter_map(|ac| ac.distance_miles).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
        let first_missing = out
            .iter()
            .position(|ac| ac.distance_miles.is_none())
            .unwrap();
        assert!(out[first_missing..].iter().all(|ac| ac.distance_miles.is_none()));

        // records built in code bypass the deserializer
        let bad = AircraftRecord { distance_miles: Some(f64::NAN), seen: Some(1.0), ..ac("bad") };
        let near = AircraftRecord { distance_miles: Some(1.0), ..ac("near") };
        let far = AircraftRecord { distance_miles: Some(9.0), ..ac("far") };
        let data = vec![far, bad, near];
        let out = apply_filters(&data, &FilterCriteria::default());
        assert_eq!(hexes(&out), vec!["near", "far", "bad"]);
    }

    #[test]
    fn ground_aircraft_never_visible() {
        let grounded = AircraftRecord {
            on_ground: true,
            flight: Some("SWA1".to_string()),
            ..ac("abc123")
        };
        let data = vec![grounded];
        let criteria = FilterCriteria {
            search: Some("swa".to_string()),
            ..FilterCriteria::default()
        };
        assert!(apply_filters(&data, &criteria).is_empty());
        assert!(apply_filters(&data, &FilterCriteria::default()).is_empty());

        let explicit = FilterCriteria {
            on_ground: Some(true),
            ..FilterCriteria::default()
        };
        assert!(apply_filters(&data, &explicit).is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let data = vec![
            AircraftRecord { distance_miles: Some(9.0), alt_baro: Some(3000), ..ac("a1") },
            AircraftRecord { seen: Some(1.0), alt_baro: Some(12000), ..ac("a2") },
            AircraftRecord { distance_miles: Some(1.0), alt_baro: Some(500), ..ac("a3") },
        ];
        let criteria = FilterCriteria {
            altitude_min: Some(1000),
            ..FilterCriteria::default()
        };
        let first = hexes(&apply_filters(&data, &criteria));
        let second = hexes(&apply_filters(&data, &criteria));
        assert_eq!(first, second);
        assert_eq!(first, vec!["a1", "a2"]);
    }

    #[test]
    fn search_is_trimmed_and_case_insensitive() {
        let data = vec![
            AircraftRecord { registration: Some("N123AB".to_string()), ..ac("aaa111") },
            AircraftRecord { operator: Some("Delta Air Lines".to_string()), ..ac("bbb222") },
            AircraftRecord { model: Some("Bell 407".to_string()), ..ac("ccc333") },
        ];
        let find = |term: &str| {
            let criteria = FilterCriteria {
                search: Some(term.to_string()),
                ..FilterCriteria::default()
            };
            hexes(&apply_filters(&data, &criteria))
        };
        assert_eq!(find("  n123 "), vec!["aaa111"]);
        assert_eq!(find("DELTA"), vec!["bbb222"]);
        assert_eq!(find("bell"), vec!["ccc333"]);
        assert_eq!(find("BBB2"), vec!["bbb222"]);
        assert_eq!(find("   ").len(), 3);
    }

    #[test]
    fn bounds_skip_records_without_values() {
        let data = vec![
            AircraftRecord { alt_baro: Some(500), gs: Some(90.0), ..ac("low") },
            AircraftRecord { alt_baro: Some(30000), gs: Some(450.0), distance_miles: Some(80.0), ..ac("high") },
            ac("unknown"),
        ];
        let criteria = FilterCriteria {
            altitude_min: Some(1000),
            speed_max: Some(500.0),
            distance_max: Some(100.0),
            ..FilterCriteria::default()
        };
        let mut got = hexes(&apply_filters(&data, &criteria));
        got.sort();
        assert_eq!(got, vec!["high", "unknown"]);

        let tight = FilterCriteria {
            distance_max: Some(50.0),
            ..FilterCriteria::default()
        };
        let mut got = hexes(&apply_filters(&data, &tight));
        got.sort();
        assert_eq!(got, vec!["low", "unknown"]);
    }

    #[test]
    fn type_source_and_class_filters() {
        let heli = AircraftRecord {
            icao_aircraft_class: Some("H1T".to_string()),
            typecode: Some("EC35".to_string()),
            data_source: Some("opensky".to_string()),
            ..ac("h1")
        };
        let jet = AircraftRecord {
            icao_aircraft_class: Some("L2J".to_string()),
            model: Some("Boeing 737".to_string()),
            data_source: Some("dump1090".to_string()),
            ..ac("j1")
        };
        let mil = AircraftRecord {
            operator: Some("United States Air Force".to_string()),
            ..ac("a0b1c2")
        };
        let data = vec![heli, jet, mil];

        let helis = FilterCriteria { helicopters_only: true, ..FilterCriteria::default() };
        assert_eq!(hexes(&apply_filters(&data, &helis)), vec!["h1"]);

        let military = FilterCriteria { military_only: true, ..FilterCriteria::default() };
        assert_eq!(hexes(&apply_filters(&data, &military)), vec!["a0b1c2"]);

        let types = FilterCriteria {
            aircraft_type: vec!["737".to_string(), "ec35".to_string()],
            ..FilterCriteria::default()
        };
        let mut got = hexes(&apply_filters(&data, &types));
        got.sort();
        assert_eq!(got, vec!["h1", "j1"]);

        let sources = FilterCriteria {
            data_source: vec!["dump1090".to_string()],
            ..FilterCriteria::default()
        };
        assert_eq!(hexes(&apply_filters(&data, &sources)), vec!["j1"]);
    }

    #[test]
    fn classification_rules() {
        assert!(is_military(&ac("ae01ff")));
        assert!(is_military(&ac("43c0de")));
        assert!(is_military(&AircraftRecord {
            registration: Some("M-ABCD".to_string()),
            ..ac("400000")
        }));
        assert!(!is_military(&ac("a12345")));

        let airline = AircraftRecord {
            operator: Some("Southwest Airlines".to_string()),
            ..ac("a12345")
        };
        assert!(is_commercial(&airline));
        let private = AircraftRecord {
            operator: Some("Private owner".to_string()),
            ..ac("a12346")
        };
        assert!(!is_commercial(&private));
    }

    #[test]
    fn stats_count_unfiltered_dataset() {
        let data = vec![
            AircraftRecord {
                icao_aircraft_class: Some("H1T".to_string()),
                alt_baro: Some(1000),
                ..ac("h1")
            },
            AircraftRecord { alt_baro: Some(3000), ..ac("ae0001") },
            AircraftRecord { on_ground: true, ..ac("g1") },
        ];
        let visible = apply_filters(&data, &FilterCriteria::default());
        let stats = FilterStats::compute(&data, &visible);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.visible, 2);
        assert_eq!(stats.helicopters, 1);
        assert_eq!(stats.military, 1);
        assert_eq!(stats.avg_altitude, Some(2000));
    }
}
