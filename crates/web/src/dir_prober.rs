//! Layer 3: directory probing of confirmed HTTP endpoints
//!
//! The scan set is the union of every applicable rule's paths; a response
//! survives only if its status and declared length clear the meaningful
//! filter. Admin classification is monotonic on the path string.

use crate::rules::{admin_directory_rules, AdminDirectoryRule};
use crate::{build_client, content_length_of, extract_title, ACCEPT_HEADER};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info};
use trishula_common::{DirectoryInfo, HttpInfo, ScanConfig, ScanError};

const MEANINGFUL_STATUS: &[u16] = &[200, 201, 301, 302, 401, 403, 500, 503];
const MIN_CONTENT_LENGTH: u64 = 50;
const MAX_CONTENT_LENGTH: u64 = 1_048_576;

const ADMIN_PATH_KEYWORDS: &[&str] = &[
    "admin", "manage", "control", "panel", "dashboard", "console", "backend", "login",
];

const ADMIN_CONTENT_KEYWORDS: &[&str] = &[
    "administration", "admin panel", "control panel", "management console", "dashboard", "login",
    "username", "password", "sign in", "log in", "administrative", "manager", "control",
];

static PASSWORD_INPUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<input[^>]*type=["']password["']"#).unwrap());
static LOGIN_FORM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<form[^>]*action[^>]*login").unwrap());

pub struct DirectoryProber {
    config: Arc<ScanConfig>,
    client: Client,
    rules: Vec<AdminDirectoryRule>,
}

impl DirectoryProber {
    pub fn new(config: Arc<ScanConfig>) -> Result<Self, ScanError> {
        let client = build_client(&config, config.directory_timeout())?;
        Ok(Self {
            config,
            client,
            rules: admin_directory_rules(),
        })
    }

    /// Probe every endpoint's applicable path set; results are flattened in
    /// completion order.
    pub async fn probe_all(&self, services: &[HttpInfo]) -> Vec<DirectoryInfo> {
        if !self.config.directory_scan_enabled {
            info!("directory scan disabled");
            return Vec::new();
        }

        let endpoint_cap = Arc::new(Semaphore::new(self.config.directory_concurrency));
        let (tx, mut rx) = mpsc::channel::<Vec<DirectoryInfo>>(services.len().max(1));

        for service in services {
            let paths = self.applicable_paths(service);
            debug!("{}: {} paths selected", service.url, paths.len());

            let Ok(permit) = endpoint_cap.clone().acquire_owned().await else {
                break;
            };
            let tx = tx.clone();
            let client = self.client.clone();
            let base_url = service.url.clone();
            let concurrency = self.config.directory_concurrency;

            tokio::spawn(async move {
                let _permit = permit;
                let found = probe_endpoint(&client, &base_url, &paths, concurrency).await;
                let _ = tx.send(found).await;
            });
        }
        drop(tx);

        let mut directories = Vec::new();
        while let Some(found) = rx.recv().await {
            directories.extend(found);
        }
        info!("directory probing found {} paths", directories.len());
        directories
    }

    /// Union of the paths of every applicable rule, first-seen order.
    fn applicable_paths(&self, service: &HttpInfo) -> Vec<&'static str> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        for rule in &self.rules {
            if !rule_applies(rule, service) {
                continue;
            }
            for &path in rule.paths {
                if seen.insert(path) {
                    paths.push(path);
                }
            }
        }
        paths
    }
}

/// `Generic` always applies; otherwise any indicator must appear
/// (case-insensitive substring) in the server header, title, a header
/// value, or a technologies entry.
fn rule_applies(rule: &AdminDirectoryRule, service: &HttpInfo) -> bool {
    if rule.indicators.is_empty() {
        return rule.technology == "Generic";
    }

    let server = service.server.as_deref().unwrap_or("").to_lowercase();
    let title = service.title.as_deref().unwrap_or("").to_lowercase();

    rule.indicators.iter().any(|indicator| {
        server.contains(indicator)
            || title.contains(indicator)
            || service
                .headers
                .values()
                .any(|v| v.to_lowercase().contains(indicator))
            || service
                .technologies
                .iter()
                .any(|t| t.to_lowercase().contains(indicator))
    })
}

async fn probe_endpoint(
    client: &Client,
    base_url: &str,
    paths: &[&'static str],
    concurrency: usize,
) -> Vec<DirectoryInfo> {
    let Ok(base) = url::Url::parse(base_url) else {
        return Vec::new();
    };

    let path_cap = Arc::new(Semaphore::new(concurrency));
    let (tx, mut rx) = mpsc::channel::<DirectoryInfo>(paths.len().max(1));

    for &path in paths {
        let Ok(url) = base.join(path) else {
            continue;
        };
        let Ok(permit) = path_cap.clone().acquire_owned().await else {
            break;
        };
        let tx = tx.clone();
        let client = client.clone();

        tokio::spawn(async move {
            let _permit = permit;
            if let Some(dir) = probe_path(&client, url, path).await {
                let _ = tx.send(dir).await;
            }
        });
    }
    drop(tx);

    let mut found = Vec::new();
    while let Some(dir) = rx.recv().await {
        found.push(dir);
    }
    found
}

async fn probe_path(client: &Client, url: url::Url, path: &str) -> Option<DirectoryInfo> {
    let start = Instant::now();
    let response = client
        .get(url.clone())
        .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
        .send()
        .await
        .ok()?;

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let content_length = content_length_of(&headers);

    if !is_meaningful(status, content_length) {
        return None;
    }

    let mut dir = DirectoryInfo::new(path, status);
    dir.response_time = start.elapsed().as_secs_f64();
    dir.content_length = content_length;
    dir.content_type = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    dir.is_admin = path_is_admin(path);
    if status == 200 {
        if let Ok(body) = response.text().await {
            dir.title = extract_title(&body);
            dir.is_admin = dir.is_admin || body_is_admin(&body);
        }
    }

    debug!("kept {url} ({status})");
    Some(dir)
}

/// Status must be in the interesting set; a declared, parseable length
/// outside 50 bytes..=1 MiB drops the response even on 200.
fn is_meaningful(status: u16, content_length: Option<u64>) -> bool {
    if !MEANINGFUL_STATUS.contains(&status) {
        return false;
    }
    match content_length {
        Some(length) => (MIN_CONTENT_LENGTH..=MAX_CONTENT_LENGTH).contains(&length),
        None => true,
    }
}

fn path_is_admin(path: &str) -> bool {
    let path = path.to_lowercase();
    ADMIN_PATH_KEYWORDS.iter().any(|kw| path.contains(kw))
}

fn body_is_admin(body: &str) -> bool {
    let lower = body.to_lowercase();
    ADMIN_CONTENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
        || PASSWORD_INPUT_RE.is_match(body)
        || LOGIN_FORM_RE.is_match(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn prober() -> DirectoryProber {
        DirectoryProber::new(Arc::new(ScanConfig {
            directory_timeout_s: 2.0,
            ..ScanConfig::default()
        }))
        .unwrap()
    }

    fn endpoint(server: Option<&str>) -> HttpInfo {
        let mut http = HttpInfo::new("http://10.0.0.1:80/", 200, false);
        http.server = server.map(str::to_string);
        http
    }

    #[test]
    fn generic_rule_always_applies() {
        let prober = prober();
        let paths = prober.applicable_paths(&endpoint(None));
        assert!(paths.contains(&"/admin"));
        // no indicator matched, so no tomcat-only path
        assert!(!paths.contains(&"/manager/html"));
    }

    #[test]
    fn server_header_selects_technology_rule() {
        let prober = prober();
        let paths = prober.applicable_paths(&endpoint(Some("Apache-Coyote/1.1")));
        assert!(paths.contains(&"/manager/html"));
        assert!(paths.contains(&"/host-manager"));
    }

    #[test]
    fn header_value_and_title_match_indicators() {
        let rules = admin_directory_rules();
        let php = rules.iter().find(|r| r.technology == "PHP").unwrap();

        let mut service = endpoint(None);
        service
            .headers
            .insert("x-powered-by".into(), "PHP/8.1.2".into());
        assert!(rule_applies(php, &service));

        let grafana = rules.iter().find(|r| r.technology == "Grafana").unwrap();
        let mut service = endpoint(None);
        service.title = Some("Grafana sign in".into());
        assert!(rule_applies(grafana, &service));
        assert!(!rule_applies(grafana, &endpoint(Some("nginx"))));
    }

    #[test]
    fn paths_are_deduplicated_across_rules() {
        let prober = prober();
        // Generic and Tomcat both carry /admin
        let paths = prober.applicable_paths(&endpoint(Some("Tomcat/9")));
        let admin_count = paths.iter().filter(|&&p| p == "/admin").count();
        assert_eq!(admin_count, 1);
    }

    #[test]
    fn meaningful_filter_boundaries() {
        assert!(is_meaningful(200, None));
        assert!(is_meaningful(200, Some(50)));
        assert!(is_meaningful(200, Some(1_048_576)));
        assert!(is_meaningful(401, Some(1000)));
        assert!(is_meaningful(503, None));

        assert!(!is_meaningful(200, Some(49)));
        assert!(!is_meaningful(200, Some(1_048_577)));
        assert!(!is_meaningful(404, None));
        assert!(!is_meaningful(204, Some(100)));
    }

    #[test]
    fn path_admin_classification_is_monotonic() {
        assert!(path_is_admin("/wp-admin"));
        assert!(path_is_admin("/Manager/html"));
        assert!(path_is_admin("/login.php"));
        assert!(path_is_admin("/dashboard/"));
        assert!(!path_is_admin("/api/v1"));
        assert!(!path_is_admin("/backup.sql"));
    }

    #[test]
    fn body_admin_classification() {
        assert!(body_is_admin("<h1>Control Panel</h1>"));
        assert!(body_is_admin(r#"<input name="pw" type="password">"#));
        assert!(body_is_admin(r#"<form method="post" action="/wp-login.php">"#));
        assert!(!body_is_admin("<p>plain page about nothing</p>"));
    }

    async fn routing_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                if let Ok((mut stream, _)) = listener.accept().await {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let n = stream.read(&mut buf).await.unwrap_or(0);
                        let request = String::from_utf8_lossy(&buf[..n]);
                        let path = request
                            .split_whitespace()
                            .nth(1)
                            .unwrap_or("/")
                            .to_string();

                        let response = if path == "/wp-admin" {
                            let body = format!(
                                "<html><head><title>Login</title></head><body>{}<form action=\"wp-login.php\"><input type=\"password\"></form></body></html>",
                                " ".repeat(16)
                            );
                            format!(
                                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                body.len(),
                                body
                            )
                        } else if path == "/panel" {
                            // meaningful status but suspiciously tiny
                            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nsmall".to_string()
                        } else {
                            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                        };
                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    });
                }
            }
        });
        port
    }

    #[tokio::test]
    async fn admin_panel_discovery_end_to_end() {
        let port = routing_server().await;
        let mut service = HttpInfo::new(format!("http://{}:{}/", Ipv4Addr::LOCALHOST, port), 200, false);
        service.server = Some("nginx/1.18.0".into());

        let prober = prober();
        let found = prober.probe_all(&[service]).await;

        let wp_admin = found.iter().find(|d| d.path == "/wp-admin").unwrap();
        assert_eq!(wp_admin.status_code, 200);
        assert!(wp_admin.is_admin);
        assert_eq!(wp_admin.title.as_deref(), Some("Login"));

        // tiny 200 dropped by the length window, 404s dropped by status
        assert!(found.iter().all(|d| d.path != "/panel"));
        assert!(found.iter().all(|d| d.status_code != 404));
    }

    #[tokio::test]
    async fn disabled_scan_returns_nothing() {
        let prober = DirectoryProber::new(Arc::new(ScanConfig {
            directory_scan_enabled: false,
            ..ScanConfig::default()
        }))
        .unwrap();
        let service = HttpInfo::new("http://127.0.0.1:1/", 200, false);
        assert!(prober.probe_all(&[service]).await.is_empty());
    }
}
