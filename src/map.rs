use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::symbols::Marker;
use ratatui::text::{Line as TextLine, Span};
use ratatui::widgets::canvas::{Canvas, Circle, Line as CanvasLine, Points};
use ratatui::widgets::{Block, BorderType, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::filter::{is_helicopter, is_military};
use crate::model::{AircraftRecord, RegionDescriptor};

const EARTH_RADIUS_MI: f64 = 3958.8;
const MIN_RANGE_MI: f64 = 5.0;
// half-width of the view at zoom 13, doubling per level out
const ZOOM_13_RANGE_MI: f64 = 12.5;

#[derive(Clone, Copy)]
pub struct MapTheme {
    pub accent: Color,
    pub dim: Color,
    pub heli: Color,
    pub military: Color,
    pub selected: Color,
    pub panel_bg: Color,
}

/// Region framing: zoom level for a coverage radius in miles.
pub fn zoom_from_radius(radius_miles: f64) -> u8 {
    if radius_miles >= 200.0 {
        9
    } else if radius_miles >= 120.0 {
        10
    } else if radius_miles >= 80.0 {
        11
    } else if radius_miles >= 50.0 {
        12
    } else {
        13
    }
}

pub fn range_for_zoom(zoom: u8) -> f64 {
    let steps = 13i32 - i32::from(zoom);
    (ZOOM_13_RANGE_MI * 2f64.powi(steps)).max(MIN_RANGE_MI)
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapFrame {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    pub range_miles: f64,
    pub label: String,
}

impl MapFrame {
    /// Frames the region descriptor when it has a usable center, otherwise
    /// the configured default view.
    pub fn for_region(
        region: Option<&RegionDescriptor>,
        default_center: (f64, f64),
        default_zoom: u8,
    ) -> Self {
        let framed = region.and_then(|r| {
            let center = r.center?;
            if !crate::model::valid_coordinate(center.lat, center.lon) {
                return None;
            }
            Some((r, center))
        });
        match framed {
            Some((region, center)) => {
                let (zoom, range_miles) = match region.radius_miles {
                    Some(radius) if radius.is_finite() && radius > 0.0 => {
                        (zoom_from_radius(radius), radius.max(MIN_RANGE_MI))
                    }
                    _ => (default_zoom, range_for_zoom(default_zoom)),
                };
                Self {
                    center_lat: center.lat,
                    center_lon: center.lon,
                    zoom,
                    range_miles,
                    label: region.name.clone(),
                }
            }
            None => Self {
                center_lat: default_center.0,
                center_lon: default_center.1,
                zoom: default_zoom,
                range_miles: range_for_zoom(default_zoom),
                label: "default view".to_string(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MapPoint {
    pub x: f64,
    pub y: f64,
    pub selected: bool,
    pub heli: bool,
    pub military: bool,
}

/// East/north offsets in miles from the frame center. Records without a
/// valid position are skipped here only; they stay in the table and stats.
pub fn project(
    aircraft: &[&AircraftRecord],
    frame: &MapFrame,
    selected: Option<&str>,
) -> Vec<MapPoint> {
    let mut points = Vec::with_capacity(aircraft.len());
    for ac in aircraft {
        let Some((lat, lon)) = ac.position() else {
            continue;
        };
        let dist = distance_mi(frame.center_lat, frame.center_lon, lat, lon);
        if dist > frame.range_miles {
            continue;
        }
        let bearing = bearing_deg(frame.center_lat, frame.center_lon, lat, lon).to_radians();
        points.push(MapPoint {
            x: dist * bearing.sin(),
            y: dist * bearing.cos(),
            selected: selected.is_some_and(|hex| hex.eq_ignore_ascii_case(&ac.hex)),
            heli: is_helicopter(ac),
            military: is_military(ac),
        });
    }
    points
}

pub fn render(
    f: &mut Frame,
    area: Rect,
    aircraft: &[&AircraftRecord],
    frame: &MapFrame,
    selected: Option<&str>,
    theme: MapTheme,
) {
    let points = project(aircraft, frame, selected);
    let title = format!(
        "MAP {} | z{} | {:.0} mi | {} plotted",
        frame.label,
        frame.zoom,
        frame.range_miles,
        points.len()
    );
    if area.width < 8 || area.height < 6 {
        render_message(f, area, &title, "Map area too small", theme);
        return;
    }
    if points.is_empty() {
        render_message(f, area, &title, "No position data", theme);
        return;
    }

    let range = frame.range_miles;
    let mut plain = Vec::new();
    let mut heli = Vec::new();
    let mut military = Vec::new();
    let mut chosen = Vec::new();
    for point in &points {
        let coord = (point.x, point.y);
        if point.selected {
            chosen.push(coord);
        } else if point.military {
            military.push(coord);
        } else if point.heli {
            heli.push(coord);
        } else {
            plain.push(coord);
        }
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .title(title);
    let canvas = Canvas::default()
        .block(block)
        .x_bounds([-range, range])
        .y_bounds([-range, range])
        .background_color(theme.panel_bg)
        .marker(Marker::Braille)
        .paint(|ctx| {
            for i in 1..=3 {
                ctx.draw(&Circle {
                    x: 0.0,
                    y: 0.0,
                    radius: range * (i as f64 / 3.0),
                    color: theme.dim,
                });
            }
            ctx.draw(&CanvasLine {
                x1: -range,
                y1: 0.0,
                x2: range,
                y2: 0.0,
                color: theme.dim,
            });
            ctx.draw(&CanvasLine {
                x1: 0.0,
                y1: -range,
                x2: 0.0,
                y2: range,
                color: theme.dim,
            });
            for (coords, color) in [
                (&plain, theme.accent),
                (&heli, theme.heli),
                (&military, theme.military),
                (&chosen, theme.selected),
            ] {
                if !coords.is_empty() {
                    ctx.draw(&Points {
                        coords: coords.as_slice(),
                        color,
                    });
                }
            }
        });
    f.render_widget(canvas, area);
}

fn render_message(f: &mut Frame, area: Rect, title: &str, message: &str, theme: MapTheme) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Plain)
        .title(title.to_string());
    let paragraph = Paragraph::new(vec![TextLine::from(Span::styled(
        message.to_string(),
        Style::default().fg(theme.dim),
    ))])
    .block(block)
    .wrap(Wrap { trim: true })
    .style(Style::default().bg(theme.panel_bg));
    f.render_widget(paragraph, area);
}

pub fn distance_mi(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_MI
}

fn bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::{distance_mi, project, range_for_zoom, zoom_from_radius, MapFrame};
    use crate::model::{AircraftRecord, Coordinate, RegionDescriptor};

    fn at(hex: &str, lat: Option<f64>, lon: Option<f64>) -> AircraftRecord {
        AircraftRecord {
            hex: hex.to_string(),
            lat,
            lon,
            ..AircraftRecord::default()
        }
    }

    fn frame() -> MapFrame {
        MapFrame::for_region(None, (32.3513, -95.3011), 10)
    }

    #[test]
    fn zoom_thresholds() {
        assert_eq!(zoom_from_radius(250.0), 9);
        assert_eq!(zoom_from_radius(200.0), 9);
        assert_eq!(zoom_from_radius(150.0), 10);
        assert_eq!(zoom_from_radius(80.0), 11);
        assert_eq!(zoom_from_radius(50.0), 12);
        assert_eq!(zoom_from_radius(10.0), 13);
    }

    #[test]
    fn frame_uses_region_center_and_radius() {
        let region = RegionDescriptor {
            name: "socal".to_string(),
            enabled: true,
            center: Some(Coordinate { lat: 34.05, lon: -118.25 }),
            radius_miles: Some(120.0),
            collectors: Vec::new(),
        };
        let frame = MapFrame::for_region(Some(&region), (32.3513, -95.3011), 8);
        assert_eq!(frame.zoom, 10);
        assert_eq!(frame.center_lat, 34.05);
        assert_eq!(frame.range_miles, 120.0);

        let fallback = MapFrame::for_region(None, (32.3513, -95.3011), 8);
        assert_eq!(fallback.zoom, 8);
        assert_eq!(fallback.range_miles, range_for_zoom(8));
    }

    #[test]
    fn invalid_coordinates_are_not_plotted() {
        let good = at("good", Some(32.40), Some(-95.30));
        let missing = at("missing", None, Some(-95.30));
        let bad_lat = at("badlat", Some(95.0), Some(-95.30));
        let nan = at("nan", Some(f64::NAN), Some(-95.30));
        let list = vec![&good, &missing, &bad_lat, &nan];
        let points = project(&list, &frame(), Some("GOOD"));
        assert_eq!(points.len(), 1);
        assert!(points[0].selected);
        assert!(points[0].y > 0.0);
    }

    #[test]
    fn points_outside_range_are_clipped() {
        let far = at("far", Some(40.0), Some(-75.0));
        let list = vec![&far];
        assert!(project(&list, &frame(), None).is_empty());
    }

    #[test]
    fn distance_is_in_statute_miles() {
        let d = distance_mi(32.0, -95.0, 33.0, -95.0);
        assert!((d - 69.1).abs() < 0.5);
    }
}
