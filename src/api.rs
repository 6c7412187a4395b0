use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, EXPIRES, PRAGMA};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, ErrorKind};
use crate::filter::is_helicopter;
use crate::model::{
    normalize_aircraft_payload, normalize_regions_payload, AircraftRecord, RegionDescriptor,
    SystemStatus,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// What the poller needs from the flight API.
pub trait FlightSource: Send + Sync {
    fn fetch_aircraft(&self, region: &str) -> Result<Vec<AircraftRecord>, ApiError>;

    /// Helicopter-only feed. Sources without a dedicated endpoint narrow
    /// the full feed.
    fn fetch_helicopters(&self, region: &str) -> Result<Vec<AircraftRecord>, ApiError> {
        self.fetch_aircraft(region)
            .map(|list| list.into_iter().filter(is_helicopter).collect())
    }

    fn fetch_system_status(&self) -> Result<SystemStatus, ApiError>;
    fn fetch_regions(&self) -> Result<Vec<RegionDescriptor>, ApiError>;
    fn check_health(&self) -> bool;
}

#[derive(Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    seq: AtomicU64,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, insecure: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(EXPIRES, HeaderValue::from_static("0"));

        let client = Client::builder()
            .danger_accept_invalid_certs(insecure)
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        Ok(Self {
            client,
            base_url,
            timeout,
            seq: AtomicU64::new(0),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn fetch_region_stats(&self, region: &str) -> Result<Value, ApiError> {
        self.get_json(&format!("/api/v1/{}/stats", region_segment(region)))
    }

    pub fn fetch_flights_tabular(&self, region: &str) -> Result<String, ApiError> {
        let path = format!("/api/v1/{}/flights/tabular", region_segment(region));
        self.get_text(&path, Some("text/csv"))
    }

    pub fn fetch_helicopters_tabular(&self, region: &str) -> Result<String, ApiError> {
        let path = format!("/api/v1/{}/choppers/tabular", region_segment(region));
        self.get_text(&path, Some("text/csv"))
    }

    /// Full URL for `path` with a fresh `_t` cache-busting parameter.
    fn endpoint_url(&self, path: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path)).map_err(|err| {
            ApiError::new(ErrorKind::Network, format!("Invalid URL: {err}")).with_endpoint(path)
        })?;
        url.query_pairs_mut()
            .append_pair("_t", &self.cache_buster());
        Ok(url)
    }

    fn cache_buster(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}{:04}", Utc::now().timestamp_millis(), seq % 10_000)
    }

    fn send(&self, path: &str, accept: Option<&str>) -> Result<Response, ApiError> {
        let url = self.endpoint_url(path)?;
        debug!("GET {url}");
        let mut req = self.client.get(url);
        if let Some(accept) = accept {
            req = req.header(ACCEPT, accept);
        }
        let resp = req.send().map_err(|err| self.transport_error(path, &err))?;
        let status = resp.status();
        if !status.is_success() {
            warn!("GET {path} -> {status}");
            return Err(ApiError::from_status(status.as_u16(), path));
        }
        debug!("GET {path} -> {status}");
        Ok(resp)
    }

    fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let body = self.get_text(path, Some("application/json"))?;
        serde_json::from_str(&body).map_err(|err| {
            ApiError::new(ErrorKind::Malformed, format!("Invalid JSON: {err}")).with_endpoint(path)
        })
    }

    fn get_text(&self, path: &str, accept: Option<&str>) -> Result<String, ApiError> {
        let resp = self.send(path, accept)?;
        resp.text().map_err(|err| self.transport_error(path, &err))
    }

    fn transport_error(&self, path: &str, err: &reqwest::Error) -> ApiError {
        let message = if err.is_timeout() {
            format!("Request timed out after {}s", self.timeout.as_secs())
        } else {
            err.to_string()
        };
        ApiError::new(ErrorKind::Network, message).with_endpoint(path)
    }
}

impl FlightSource for ApiClient {
    fn fetch_aircraft(&self, region: &str) -> Result<Vec<AircraftRecord>, ApiError> {
        let path = format!("/api/v1/{}/flights", region_segment(region));
        self.get_json(&path).map(normalize_aircraft_payload)
    }

    fn fetch_helicopters(&self, region: &str) -> Result<Vec<AircraftRecord>, ApiError> {
        let path = format!("/api/v1/{}/choppers", region_segment(region));
        self.get_json(&path).map(normalize_aircraft_payload)
    }

    fn fetch_system_status(&self) -> Result<SystemStatus, ApiError> {
        self.get_json("/api/v1/status").map(SystemStatus::from_value)
    }

    fn fetch_regions(&self) -> Result<Vec<RegionDescriptor>, ApiError> {
        self.get_json("/api/v1/regions")
            .map(normalize_regions_payload)
    }

    fn check_health(&self) -> bool {
        match self.send("/health", Some("application/json")) {
            Ok(_) => true,
            Err(err) => {
                debug!("health check failed: {err}");
                false
            }
        }
    }
}

fn region_segment(region: &str) -> String {
    region
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase()
}


#[cfg(all(test, feature = "net-tests"))]
mod net_tests {
    use super::{ApiClient, FlightSource};
    use crate::error::ErrorKind;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn serve_once(status: &str, content_type: &str, body: &str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let _ = tx.send(request.lines().next().unwrap_or("").to_string());
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (format!("http://{addr}"), rx)
    }

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5), false).unwrap()
    }

    #[test]
    fn fetch_aircraft_envelope() {
        let body = r#"{"aircraft":[{"hex":"abc123","lat":32.1,"lon":-95.2}],"count":1}"#;
        let (base, rx) = serve_once("200 OK", "application/json", body);
        let aircraft = client(&base).fetch_aircraft("etex").unwrap();
        assert_eq!(aircraft.len(), 1);
        assert_eq!(aircraft[0].hex, "abc123");
        let line = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(line.starts_with("GET /api/v1/etex/flights?_t="));
    }

    #[test]
    fn fetch_helicopters_reads_choppers_endpoint() {
        let body = r#"{"ac":[{"hex":"h0a1b2","icao_aircraft_class":"H1T"},{"bad":1}]}"#;
        let (base, rx) = serve_once("200 OK", "application/json", body);
        let aircraft = client(&base).fetch_helicopters(" ETEX ").unwrap();
        assert_eq!(aircraft.len(), 1);
        assert_eq!(aircraft[0].hex, "h0a1b2");
        let line = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(line.starts_with("GET /api/v1/etex/choppers?_t="));
    }

    #[test]
    fn fetch_region_stats_returns_raw_json() {
        let body = r#"{"total_aircraft":12,"helicopters":2,"sources":{"dump1090":10}}"#;
        let (base, rx) = serve_once("200 OK", "application/json", body);
        let stats = client(&base).fetch_region_stats("socal").unwrap();
        assert_eq!(stats["total_aircraft"], 12);
        assert_eq!(stats["sources"]["dump1090"], 10);
        let line = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(line.starts_with("GET /api/v1/socal/stats?_t="));
    }

    #[test]
    fn rate_limit_maps_to_kind() {
        let (base, _rx) = serve_once("429 Too Many Requests", "application/json", "{}");
        let err = client(&base).fetch_aircraft("etex").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.endpoint.as_deref(), Some("/api/v1/etex/flights"));
    }

    #[test]
    fn garbage_body_is_malformed() {
        let (base, _rx) = serve_once("200 OK", "text/html", "<html>oops</html>");
        let err = client(&base).fetch_regions().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Malformed);
    }

    #[test]
    fn unreachable_server_is_network_error() {
        let err = client("http://127.0.0.1:1").fetch_aircraft("etex").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Network);
        assert!(!client("http://127.0.0.1:1").check_health());
    }
}
