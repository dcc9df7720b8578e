//! Core data types for the Trishula scan pipeline
//!
//! The result aggregator (`ScanResult`) is owned by the controller running
//! its target and mutated through append-only `add_*` methods; consumers
//! read it only once it has reached a terminal status. Serde field names
//! follow the stable consumer-facing JSON shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use uuid::Uuid;

/// Supported transport protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

/// Port states reported by the discovery layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortState::Open => "open",
            PortState::Closed => "closed",
            PortState::Filtered => "filtered",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Single scan target: an IPv4 address plus an optional pinned port list.
///
/// When `ports` is `None` the discoverer falls back to its preset working
/// set. The port list is canonicalized (sorted, deduplicated) at
/// construction so targets compare by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTarget {
    pub ip: Ipv4Addr,
    pub ports: Option<Vec<u16>>,
}

impl ScanTarget {
    #[inline]
    #[must_use]
    pub fn new(ip: Ipv4Addr) -> Self {
        Self { ip, ports: None }
    }

    #[must_use]
    pub fn with_ports(ip: Ipv4Addr, mut ports: Vec<u16>) -> Self {
        ports.sort_unstable();
        ports.dedup();
        Self {
            ip,
            ports: Some(ports),
        }
    }

    /// Whether the caller pinned an explicit port list.
    #[inline]
    #[must_use]
    pub fn has_explicit_ports(&self) -> bool {
        self.ports.is_some()
    }

    #[inline]
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.ip.is_private()
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ports {
            Some(ports) => write!(f, "{} ({} ports)", self.ip, ports.len()),
            None => write!(f, "{}", self.ip),
        }
    }
}

/// One discovered port, enriched by the banner phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: u16,
    pub protocol: Protocol,
    pub state: PortState,
    pub service: Option<String>,
    pub version: Option<String>,
    pub banner: Option<String>,
    pub confidence: f32,
}

impl PortInfo {
    /// A freshly discovered open TCP port, not yet classified.
    #[inline]
    #[must_use]
    pub fn open(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
            state: PortState::Open,
            service: None,
            version: None,
            banner: None,
            confidence: 0.0,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_service<S: Into<String>>(mut self, service: S) -> Self {
        self.service = Some(service.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = Some(version.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_banner<S: Into<String>>(mut self, banner: S) -> Self {
        self.banner = Some(banner.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.state, PortState::Open)
    }
}

/// One confirmed HTTP/HTTPS endpoint.
///
/// `technologies` is retained for wire compatibility and always left empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpInfo {
    pub url: String,
    pub status_code: u16,
    pub title: Option<String>,
    pub server: Option<String>,
    pub headers: HashMap<String, String>,
    pub technologies: Vec<String>,
    pub is_https: bool,
    pub redirect_url: Option<String>,
    pub content_length: Option<u64>,
    pub response_time: f64,
}

impl HttpInfo {
    #[must_use]
    pub fn new<S: Into<String>>(url: S, status_code: u16, is_https: bool) -> Self {
        Self {
            url: url.into(),
            status_code,
            title: None,
            server: None,
            headers: HashMap::new(),
            technologies: Vec::new(),
            is_https,
            redirect_url: None,
            content_length: None,
            response_time: 0.0,
        }
    }

    /// Port component of the endpoint URL, when one is present.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        let rest = self.url.split("://").nth(1)?;
        let authority = rest.split('/').next()?;
        let port = authority.rsplit(':').next()?;
        port.parse().ok()
    }
}

/// One probed well-known path on an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryInfo {
    pub path: String,
    pub status_code: u16,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub is_admin: bool,
    pub response_time: f64,
}

impl DirectoryInfo {
    #[must_use]
    pub fn new<S: Into<String>>(path: S, status_code: u16) -> Self {
        Self {
            path: path.into(),
            status_code,
            content_length: None,
            content_type: None,
            title: None,
            is_admin: false,
            response_time: 0.0,
        }
    }
}

/// Aggregate counters kept in step with the result lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub open_ports_count: usize,
    pub http_services_count: usize,
    pub admin_directories_count: usize,
    pub admin_interfaces_count: usize,
}

/// The per-target result aggregator.
///
/// Constructed once per target and owned by the controller driving it;
/// every layer appends through the `add_*` methods so the summary counters
/// never drift from the lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub target: ScanTarget,
    pub status: ScanStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "scan_duration")]
    pub duration: Option<f64>,
    pub open_ports: Vec<PortInfo>,
    pub http_services: Vec<HttpInfo>,
    pub admin_directories: Vec<DirectoryInfo>,
    pub summary: ScanSummary,
    pub error_message: Option<String>,
}

impl ScanResult {
    #[must_use]
    pub fn new(target: ScanTarget) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            target,
            status: ScanStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            open_ports: Vec::new(),
            http_services: Vec::new(),
            admin_directories: Vec::new(),
            summary: ScanSummary::default(),
            error_message: None,
        }
    }

    pub fn add_port(&mut self, port: PortInfo) {
        self.open_ports.push(port);
        self.summary.open_ports_count = self.open_ports.len();
    }

    /// Replace the whole port set (escalation supersedes the preset pass).
    pub fn replace_ports(&mut self, ports: Vec<PortInfo>) {
        self.open_ports = ports;
        self.summary.open_ports_count = self.open_ports.len();
    }

    /// Sort ascending and drop duplicate port numbers at a layer boundary.
    pub fn finalize_ports(&mut self) {
        self.open_ports.sort_by_key(|p| p.port);
        self.open_ports.dedup_by_key(|p| p.port);
        self.summary.open_ports_count = self.open_ports.len();
    }

    pub fn add_http_service(&mut self, http: HttpInfo) {
        self.http_services.push(http);
        self.summary.http_services_count = self.http_services.len();
    }

    pub fn add_admin_directory(&mut self, dir: DirectoryInfo) {
        if dir.is_admin {
            self.summary.admin_interfaces_count += 1;
        }
        self.admin_directories.push(dir);
        self.summary.admin_directories_count = self.admin_directories.len();
    }

    pub fn mark_running(&mut self) {
        if self.status == ScanStatus::Pending {
            self.status = ScanStatus::Running;
            self.start_time = Utc::now();
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = ScanStatus::Completed;
        self.finish();
    }

    /// A completed result never regresses to failed.
    pub fn mark_failed<S: Into<String>>(&mut self, error: S) {
        if self.status == ScanStatus::Completed {
            return;
        }
        self.status = ScanStatus::Failed;
        self.error_message = Some(error.into());
        self.finish();
    }

    fn finish(&mut self) {
        let end = Utc::now();
        self.end_time = Some(end);
        self.duration = Some(
            (end - self.start_time)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        );
    }

    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ScanStatus::Completed | ScanStatus::Failed)
    }
}

/// A batch scan request as transport shells hand it to the engine. Layer
/// names are carried as strings on the wire and validated by the engine
/// before any scan starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub targets: Vec<ScanTarget>,
    #[serde(default = "default_scan_layers")]
    pub scan_layers: Vec<String>,
}

fn default_scan_layers() -> Vec<String> {
    vec![
        "port_scan".to_string(),
        "http_detection".to_string(),
        "web_probe".to_string(),
    ]
}

impl ScanRequest {
    #[must_use]
    pub fn new(targets: Vec<ScanTarget>) -> Self {
        Self {
            targets,
            scan_layers: default_scan_layers(),
        }
    }

    #[must_use]
    pub fn with_layers(mut self, layers: Vec<String>) -> Self {
        self.scan_layers = layers;
        self
    }
}

/// Batch-level answer to a [`ScanRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub scan_id: Uuid,
    pub status: ScanStatus,
    pub message: String,
    pub results: Vec<ScanResult>,
    pub total_targets: usize,
    pub completed_targets: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ScanTarget {
        ScanTarget::new(Ipv4Addr::new(192, 168, 1, 1))
    }

    #[test]
    fn target_ports_canonicalized() {
        let t = ScanTarget::with_ports(Ipv4Addr::LOCALHOST, vec![443, 80, 443, 22]);
        assert_eq!(t.ports, Some(vec![22, 80, 443]));

        let same = ScanTarget::with_ports(Ipv4Addr::LOCALHOST, vec![22, 80, 443]);
        assert_eq!(t, same);
    }

    #[test]
    fn port_info_builders() {
        let p = PortInfo::open(22)
            .with_service("ssh")
            .with_version("ssh-2.0")
            .with_confidence(1.4);
        assert!(p.is_open());
        assert_eq!(p.service.as_deref(), Some("ssh"));
        assert_eq!(p.confidence, 1.0);
    }

    #[test]
    fn http_info_port_extraction() {
        let h = HttpInfo::new("http://10.0.0.1:8080/", 200, false);
        assert_eq!(h.port(), Some(8080));

        let h = HttpInfo::new("https://10.0.0.1:443/", 200, true);
        assert_eq!(h.port(), Some(443));
    }

    #[test]
    fn result_counters_track_lists() {
        let mut r = ScanResult::new(target());
        r.add_port(PortInfo::open(80));
        r.add_port(PortInfo::open(22));
        assert_eq!(r.summary.open_ports_count, 2);

        r.add_admin_directory(DirectoryInfo {
            is_admin: true,
            ..DirectoryInfo::new("/admin", 200)
        });
        r.add_admin_directory(DirectoryInfo::new("/api", 200));
        assert_eq!(r.summary.admin_directories_count, 2);
        assert_eq!(r.summary.admin_interfaces_count, 1);
    }

    #[test]
    fn finalize_sorts_and_dedups() {
        let mut r = ScanResult::new(target());
        r.add_port(PortInfo::open(443));
        r.add_port(PortInfo::open(22));
        r.add_port(PortInfo::open(443));
        r.finalize_ports();

        let ports: Vec<u16> = r.open_ports.iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![22, 443]);
        assert_eq!(r.summary.open_ports_count, 2);
    }

    #[test]
    fn completed_never_becomes_failed() {
        let mut r = ScanResult::new(target());
        r.mark_running();
        r.mark_completed();
        assert!(r.is_terminal());
        assert!(r.duration.is_some());

        r.mark_failed("late failure");
        assert_eq!(r.status, ScanStatus::Completed);
        assert!(r.error_message.is_none());
    }

    #[test]
    fn request_defaults_to_all_layers() {
        let request = ScanRequest::new(vec![target()]);
        assert_eq!(
            request.scan_layers,
            vec!["port_scan", "http_detection", "web_probe"]
        );

        let partial = ScanRequest::new(vec![target()]).with_layers(vec!["port_scan".into()]);
        assert_eq!(partial.scan_layers, vec!["port_scan"]);
    }

    #[test]
    fn request_deserializes_with_missing_layers() {
        let request: ScanRequest =
            serde_json::from_str(r#"{"targets": [{"ip": "10.0.0.1", "ports": null}]}"#).unwrap();
        assert_eq!(request.targets.len(), 1);
        assert_eq!(request.scan_layers.len(), 3);
    }

    #[test]
    fn serialized_shape_uses_stable_names() {
        let mut r = ScanResult::new(target());
        r.mark_completed();
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("scan_duration").is_some());
        assert!(json.get("summary").is_some());
        assert_eq!(json["status"], "completed");
    }
}
