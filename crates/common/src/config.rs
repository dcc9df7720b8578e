//! Process-wide scan configuration
//!
//! Every component takes a `ScanConfig` by reference and never mutates it.
//! The option set is closed: anything tunable in the engine is a named
//! field here, validated up front so invalid values are rejected before a
//! scan starts.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ports that receive an HTTP nudge when a passive banner read stays silent.
pub const HTTP_NUDGE_PORTS: &[u16] = &[
    80, 8080, 8000, 8001, 8008, 8081, 8082, 8888, 9000, 9090, 9999,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Dense range swept by the fast helper, e.g. `"1-1000"`.
    pub preset_port_range: String,
    /// Sparse high-value extras unioned with the range.
    pub preset_extra_ports: Vec<u16>,
    /// Ports treated as HTTP candidates even without a banner match.
    pub web_ports: Vec<u16>,

    pub smart_scan_enabled: bool,
    /// Below this open-port count the preset sweep escalates to 1-65535.
    pub smart_scan_threshold: usize,

    // Sweep helper tuning
    pub sweep_timeout_ms: u64,
    pub sweep_batch_size: u32,
    pub sweep_tries: u32,
    pub sweep_ulimit: u32,

    // Banner capture bounds
    pub banner_timeout_s: f64,
    pub banner_max_bytes: usize,

    // HTTP client tuning
    pub http_timeout_s: f64,
    pub http_max_redirects: u32,
    pub http_user_agent: String,

    // Directory probing (layer 3)
    pub directory_scan_enabled: bool,
    pub directory_concurrency: usize,
    pub directory_timeout_s: f64,

    /// Batch-mode upper bound on simultaneously scanned targets.
    pub max_concurrent_targets: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            preset_port_range: "1-1000".to_string(),
            preset_extra_ports: default_preset_extras(),
            web_ports: vec![
                80, 443, 8080, 8443, 3000, 4000, 5000, 8000, 8081, 8082, 9000, 9090,
            ],
            smart_scan_enabled: true,
            smart_scan_threshold: 3,
            sweep_timeout_ms: 10_000,
            sweep_batch_size: 65_535,
            sweep_tries: 1,
            sweep_ulimit: 8_192,
            banner_timeout_s: 5.0,
            banner_max_bytes: 1024,
            http_timeout_s: 10.0,
            http_max_redirects: 3,
            http_user_agent: "Mozilla/5.0 (compatible; PortScanner/1.0)".to_string(),
            directory_scan_enabled: true,
            directory_concurrency: 10,
            directory_timeout_s: 5.0,
            max_concurrent_targets: 5,
        }
    }
}

impl ScanConfig {
    /// Reject invalid settings before any scan begins.
    pub fn validate(&self) -> Result<(), ScanError> {
        parse_port_spec(&self.preset_port_range)?;
        if self.preset_extra_ports.contains(&0) || self.web_ports.contains(&0) {
            return Err(ScanError::ConfigInvalid("port 0 is not scannable".into()));
        }
        if self.smart_scan_threshold == 0 {
            return Err(ScanError::ConfigInvalid(
                "smart_scan_threshold must be at least 1".into(),
            ));
        }
        if self.sweep_timeout_ms == 0 {
            return Err(ScanError::ConfigInvalid(
                "sweep_timeout_ms must be positive".into(),
            ));
        }
        if self.sweep_batch_size == 0 {
            return Err(ScanError::ConfigInvalid(
                "sweep_batch_size must be positive".into(),
            ));
        }
        if self.banner_timeout_s <= 0.0 || self.http_timeout_s <= 0.0 || self.directory_timeout_s <= 0.0
        {
            return Err(ScanError::ConfigInvalid(
                "timeouts must be positive".into(),
            ));
        }
        if self.banner_max_bytes == 0 {
            return Err(ScanError::ConfigInvalid(
                "banner_max_bytes must be positive".into(),
            ));
        }
        if self.directory_concurrency == 0 {
            return Err(ScanError::ConfigInvalid(
                "directory_concurrency must be at least 1".into(),
            ));
        }
        if self.max_concurrent_targets == 0 {
            return Err(ScanError::ConfigInvalid(
                "max_concurrent_targets must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn banner_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.banner_timeout_s)
    }

    #[inline]
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.http_timeout_s)
    }

    #[inline]
    #[must_use]
    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.directory_timeout_s)
    }
}

/// Parse a port spec: a `lo-hi` range, a comma list, or a single port.
/// Port 0 is rejected everywhere.
pub fn parse_port_spec(spec: &str) -> Result<Vec<u16>, ScanError> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(ScanError::ConfigInvalid("empty port spec".into()));
    }

    let mut ports = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u16 = lo
                .trim()
                .parse()
                .map_err(|_| ScanError::ConfigInvalid(format!("bad port range start: {part}")))?;
            let hi: u16 = hi
                .trim()
                .parse()
                .map_err(|_| ScanError::ConfigInvalid(format!("bad port range end: {part}")))?;
            if lo == 0 || lo > hi {
                return Err(ScanError::ConfigInvalid(format!("bad port range: {part}")));
            }
            ports.extend(lo..=hi);
        } else {
            let port: u16 = part
                .parse()
                .map_err(|_| ScanError::ConfigInvalid(format!("bad port: {part}")))?;
            if port == 0 {
                return Err(ScanError::ConfigInvalid("port 0 is not scannable".into()));
            }
            ports.push(port);
        }
    }

    if ports.is_empty() {
        return Err(ScanError::ConfigInvalid("empty port spec".into()));
    }
    Ok(ports)
}

/// High-value ports the preset sweep always covers on top of the dense
/// range: databases, alt-web, VPN, VNC, remote admin, known malware/C2,
/// directory/auth infrastructure, and SIP.
fn default_preset_extras() -> Vec<u16> {
    let mut ports: Vec<u16> = vec![
        // Databases
        1433, 3306, 5432, 6379, 27017, 1521, 5984, 7000, 7001, 9200, 9300,
        // Web service extras
        8000, 8001, 8008, 8081, 8082, 8888, 9000, 9090, 9999,
        // VPN
        1194, 1723, 4500, 51820, 500,
        // Remote management tools
        6568, 5938, 6129, 6130, 6131, 6132, 6133, 6783, 6784, 6785, 8040, 8041, 8200,
        // High-value attack surface and known C2/backdoor listeners
        666, 1080, 1170, 1234, 1243, 1337, 1981, 1999, 2001, 2222, 2989, 3000, 3024, 3030, 3128,
        3129, 3200, 3410, 4000, 4041, 4092, 4444, 4433, 4567, 4590, 4782, 5000, 5001, 5096, 5321,
        5400, 5500, 5556, 5650, 5651, 5655, 6666, 6667, 7070, 7096, 7443, 7444, 7474, 7687, 8022,
        8080, 8848, 8999, 9050, 9051, 9631, 9988, 10002, 10110, 10426, 10666, 12122, 12345, 12346,
        17300, 20034, 21802, 27374, 30662, 31335, 31337, 31338, 31785, 31789, 35000, 48101, 50050,
        53531, 54320, 55553, 57230, 61466, 65000,
        // SNMP, LDAP, Kerberos, RADIUS
        161, 162, 389, 636, 88, 464, 749, 750, 1812, 1813,
        // SIP
        5060, 5061,
    ];
    // VNC displays
    ports.extend(5800..=5810);
    ports.extend(5900..=5910);
    ports
}
