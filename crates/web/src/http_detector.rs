//! Layer 2: HTTP service fingerprinting
//!
//! Candidate ports are scored against the detection rule table; anything at
//! or above the threshold gets one `GET /` per scheme until something
//! answers. Redirects are captured, never followed.

use crate::rules::{http_detection_rules, HttpDetectionRule};
use crate::{build_client, content_length_of, extract_title, ACCEPT_HEADER};
use reqwest::Client;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};
use trishula_common::{HttpInfo, PortInfo, ScanConfig, ScanError};

const CANDIDATE_THRESHOLD: f32 = 0.3;
const SERVICE_LABEL_SCORE: f32 = 0.5;
const WEB_PORT_SCORE: f32 = 0.3;
const NON_STANDARD_PORT_SCORE: f32 = 0.3;
const PORT_HINT_SCORE: f32 = 0.1;

const HTTP_SERVICE_LABELS: &[&str] = &["http", "https", "http-alt", "https-alt"];

/// Ports that qualify as HTTP candidates on their own, independent of the
/// configured web-port set.
const NON_STANDARD_HTTP_PORTS: &[u16] = &[3000, 4000, 5000, 8000, 8081, 8082, 9000, 9090];

pub struct HttpFingerprinter {
    config: Arc<ScanConfig>,
    client: Client,
    rules: Vec<HttpDetectionRule>,
}

impl HttpFingerprinter {
    pub fn new(config: Arc<ScanConfig>) -> Result<Self, ScanError> {
        let client = build_client(&config, config.http_timeout())?;
        Ok(Self {
            config,
            client,
            rules: http_detection_rules()?,
        })
    }

    /// Fingerprint every candidate among `ports`; one `HttpInfo` per port
    /// that answered on some scheme, in completion order.
    pub async fn detect(&self, ip: Ipv4Addr, ports: &[PortInfo]) -> Vec<HttpInfo> {
        let candidates: Vec<&PortInfo> = ports
            .iter()
            .filter(|p| self.candidate_score(p) >= CANDIDATE_THRESHOLD)
            .collect();

        if candidates.is_empty() {
            debug!("{ip}: no HTTP candidates");
            return Vec::new();
        }
        info!(
            "{ip}: probing {} HTTP candidates: {:?}",
            candidates.len(),
            candidates.iter().map(|p| p.port).collect::<Vec<_>>()
        );

        let (tx, mut rx) = mpsc::channel::<HttpInfo>(candidates.len());
        for candidate in candidates {
            let tx = tx.clone();
            let client = self.client.clone();
            let port = candidate.port;
            let banner = candidate.banner.clone();

            tokio::spawn(async move {
                for scheme in scheme_order(port, banner.as_deref()) {
                    if let Some(http) = probe_url(&client, scheme, ip, port).await {
                        let _ = tx.send(http).await;
                        return;
                    }
                }
            });
        }
        drop(tx);

        let mut services = Vec::new();
        while let Some(http) = rx.recv().await {
            services.push(http);
        }
        services
    }

    /// Additive candidate score: a prior HTTP-ish service label, membership
    /// in the configured web-port set, the fixed non-standard HTTP ports,
    /// rule port hints, and the first matching banner pattern per rule.
    fn candidate_score(&self, info: &PortInfo) -> f32 {
        let mut score = 0.0;

        if info
            .service
            .as_deref()
            .is_some_and(|s| HTTP_SERVICE_LABELS.contains(&s))
        {
            score += SERVICE_LABEL_SCORE;
        }
        if self.config.web_ports.contains(&info.port) {
            score += WEB_PORT_SCORE;
        }
        if NON_STANDARD_HTTP_PORTS.contains(&info.port) {
            score += NON_STANDARD_PORT_SCORE;
        }

        for rule in &self.rules {
            if rule.port_hints.contains(&info.port) {
                score += PORT_HINT_SCORE;
            }
            if let Some(banner) = info.banner.as_deref() {
                if rule.banner_patterns.iter().any(|p| p.is_match(banner)) {
                    score += rule.confidence_boost;
                }
            }
        }
        score
    }
}

/// HTTPS first for TLS-default ports or `ssl`-bearing banners.
fn scheme_order(port: u16, banner: Option<&str>) -> [&'static str; 2] {
    let ssl_hint = banner.is_some_and(|b| b.to_lowercase().contains("ssl"));
    if port == 443 || port == 8443 || ssl_hint {
        ["https", "http"]
    } else {
        ["http", "https"]
    }
}

/// One `GET /`; any HTTP response at all confirms the scheme.
async fn probe_url(client: &Client, scheme: &str, ip: Ipv4Addr, port: u16) -> Option<HttpInfo> {
    let url = format!("{scheme}://{ip}:{port}/");
    let start = Instant::now();

    let response = match client
        .get(&url)
        .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            debug!("probe failed for {url}: {e}");
            return None;
        }
    };

    let status = response.status();
    let headers = response.headers().clone();

    let mut http = HttpInfo::new(url.as_str(), status.as_u16(), scheme == "https");
    http.response_time = start.elapsed().as_secs_f64();
    http.content_length = content_length_of(&headers);
    http.server = headers
        .get(reqwest::header::SERVER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if status.is_redirection() {
        http.redirect_url = headers
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            http.headers.insert(name.to_string(), value.to_string());
        }
    }

    if status.as_u16() == 200 {
        if let Ok(body) = response.text().await {
            http.title = extract_title(&body);
        }
    }

    debug!("{url} answered {status}");
    Some(http)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fingerprinter() -> HttpFingerprinter {
        HttpFingerprinter::new(Arc::new(ScanConfig {
            http_timeout_s: 2.0,
            ..ScanConfig::default()
        }))
        .unwrap()
    }

    async fn http_server(response: String) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let response = Arc::new(response);
        tokio::spawn(async move {
            loop {
                if let Ok((mut stream, _)) = listener.accept().await {
                    let response = Arc::clone(&response);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = stream.read(&mut buf).await;
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    });
                }
            }
        });
        port
    }

    #[test]
    fn ssh_port_is_not_a_candidate() {
        let fp = fingerprinter();
        let info = PortInfo::open(22)
            .with_service("ssh")
            .with_banner("SSH-2.0-OpenSSH_8.9");
        assert!(fp.candidate_score(&info) < CANDIDATE_THRESHOLD);
    }

    #[test]
    fn http_banner_scores_over_threshold() {
        let fp = fingerprinter();
        let info = PortInfo::open(12000).with_banner("HTTP/1.1 200 OK\r\nContent-Type: text/html");
        assert!(fp.candidate_score(&info) >= CANDIDATE_THRESHOLD);
    }

    #[test]
    fn silent_web_port_is_a_candidate() {
        let fp = fingerprinter();
        let info = PortInfo::open(4000);
        assert!(fp.candidate_score(&info) >= CANDIDATE_THRESHOLD);

        let silent_oddball = PortInfo::open(12000);
        assert!(fp.candidate_score(&silent_oddball) < CANDIDATE_THRESHOLD);
    }

    #[test]
    fn non_standard_ports_stay_candidates_with_narrowed_web_ports() {
        // the fixed list holds even when the configured web ports do not
        // cover it
        let fp = HttpFingerprinter::new(Arc::new(ScanConfig {
            web_ports: vec![80, 443],
            ..ScanConfig::default()
        }))
        .unwrap();

        for &port in NON_STANDARD_HTTP_PORTS {
            let info = PortInfo::open(port);
            assert!(
                fp.candidate_score(&info) >= CANDIDATE_THRESHOLD,
                "port {port} should be a candidate"
            );
        }
        assert!(fp.candidate_score(&PortInfo::open(12000)) < CANDIDATE_THRESHOLD);
    }

    #[test]
    fn scheme_preference() {
        assert_eq!(scheme_order(443, None), ["https", "http"]);
        assert_eq!(scheme_order(8443, None), ["https", "http"]);
        assert_eq!(scheme_order(80, None), ["http", "https"]);
        assert_eq!(scheme_order(8080, Some("OpenSSL ready")), ["https", "http"]);
    }

    #[tokio::test]
    async fn probe_captures_status_server_and_title() {
        let body = "<html><head><title>Device Portal</title></head><body>hi</body></html>";
        let response = format!(
            "HTTP/1.1 200 OK\r\nServer: nginx/1.18.0\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let port = http_server(response).await;

        let fp = fingerprinter();
        let ports = vec![PortInfo::open(port).with_banner("HTTP/1.1 200 OK")];
        let services = fp.detect(Ipv4Addr::LOCALHOST, &ports).await;

        assert_eq!(services.len(), 1);
        let http = &services[0];
        assert_eq!(http.status_code, 200);
        assert!(!http.is_https);
        assert_eq!(http.server.as_deref(), Some("nginx/1.18.0"));
        assert_eq!(http.title.as_deref(), Some("Device Portal"));
        assert_eq!(http.content_length, Some(69));
        assert!(http.response_time > 0.0);
        assert!(http.headers.contains_key("content-type"));
    }

    #[tokio::test]
    async fn redirect_is_reported_not_chased() {
        let port = http_server(
            "HTTP/1.1 302 Found\r\nLocation: https://example.test/login\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let fp = fingerprinter();
        let ports = vec![PortInfo::open(port).with_banner("HTTP/1.1 302 Found")];
        let services = fp.detect(Ipv4Addr::LOCALHOST, &ports).await;

        assert_eq!(services.len(), 1);
        let http = &services[0];
        assert_eq!(http.status_code, 302);
        assert_eq!(
            http.redirect_url.as_deref(),
            Some("https://example.test/login")
        );
        assert!(http.title.is_none());
    }

    #[tokio::test]
    async fn dead_candidate_yields_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fp = fingerprinter();
        let ports = vec![PortInfo::open(port).with_banner("HTTP/1.1 200 OK")];
        let services = fp.detect(Ipv4Addr::LOCALHOST, &ports).await;
        assert!(services.is_empty());
    }
}
