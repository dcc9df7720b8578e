//! Detection rule tables
//!
//! Plain data compiled once at engine construction and shared read-only. A
//! pattern that fails to compile is a startup error, never a mid-scan one.

use regex::Regex;
use trishula_common::ScanError;

/// One HTTP-candidate heuristic.
pub struct HttpDetectionRule {
    pub name: &'static str,
    pub description: &'static str,
    pub banner_patterns: Vec<Regex>,
    pub port_hints: &'static [u16],
    pub confidence_boost: f32,
    pub priority: u8,
}

fn compile(rule: &'static str, patterns: &[&str]) -> Result<Vec<Regex>, ScanError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){p}"))
                .map_err(|e| ScanError::RuleCompilation(format!("{rule}: {e}")))
        })
        .collect()
}

/// The HTTP candidate rule table, priority-ordered.
pub fn http_detection_rules() -> Result<Vec<HttpDetectionRule>, ScanError> {
    let mut rules = vec![
        HttpDetectionRule {
            name: "Standard HTTP Response",
            description: "standard HTTP response markers",
            banner_patterns: compile(
                "Standard HTTP Response",
                &[
                    r"HTTP/\d\.\d",
                    r"200 OK",
                    r"404 Not Found",
                    r"500 Internal Server Error",
                ],
            )?,
            port_hints: &[80, 443, 8080, 8443],
            confidence_boost: 0.3,
            priority: 1,
        },
        HttpDetectionRule {
            name: "Server Header",
            description: "HTTP Server header",
            banner_patterns: compile(
                "Server Header",
                &[
                    r"Server:\s*(nginx|apache|iis|tomcat|jetty)",
                    r"Server:\s*Microsoft-IIS",
                ],
            )?,
            port_hints: &[],
            confidence_boost: 0.4,
            priority: 1,
        },
        HttpDetectionRule {
            name: "Content-Type Header",
            description: "HTTP Content-Type header",
            banner_patterns: compile(
                "Content-Type Header",
                &[
                    r"Content-Type:\s*text/html",
                    r"Content-Type:\s*application/json",
                    r"Content-Type:\s*text/plain",
                ],
            )?,
            port_hints: &[],
            confidence_boost: 0.2,
            priority: 2,
        },
        HttpDetectionRule {
            name: "Web Application Servers",
            description: "application server banners",
            banner_patterns: compile(
                "Web Application Servers",
                &[r"Jetty", r"Tomcat", r"WebLogic", r"WebSphere", r"JBoss", r"Undertow"],
            )?,
            port_hints: &[8080, 8443, 9080, 9443],
            confidence_boost: 0.3,
            priority: 1,
        },
        HttpDetectionRule {
            name: "Reverse Proxy",
            description: "reverse proxy headers",
            banner_patterns: compile(
                "Reverse Proxy",
                &[
                    r"Via:\s*",
                    r"X-Forwarded-For:",
                    r"X-Real-IP:",
                    r"CloudFlare",
                    r"X-Served-By:",
                ],
            )?,
            port_hints: &[80, 443],
            confidence_boost: 0.2,
            priority: 2,
        },
        HttpDetectionRule {
            name: "Non-Standard HTTP Ports",
            description: "HTTP on non-standard ports",
            banner_patterns: compile("Non-Standard HTTP Ports", &[r"HTTP/\d\.\d"])?,
            port_hints: &[3000, 4000, 5000, 8000, 8081, 8082, 9000, 9090],
            confidence_boost: 0.4,
            priority: 1,
        },
    ];
    rules.sort_by_key(|r| r.priority);
    Ok(rules)
}

/// One technology's well-known administrative paths plus the indicators
/// that make it applicable to an endpoint.
pub struct AdminDirectoryRule {
    pub technology: &'static str,
    pub paths: &'static [&'static str],
    pub indicators: &'static [&'static str],
    pub priority: u8,
}

/// The admin-directory rule table, priority-ordered. `Generic` applies to
/// every endpoint; the rest require an indicator match.
pub fn admin_directory_rules() -> Vec<AdminDirectoryRule> {
    let mut rules = vec![
        AdminDirectoryRule {
            technology: "Generic",
            paths: &[
                "/admin", "/admin/", "/administrator", "/administrator/",
                "/manage", "/manage/", "/management", "/management/",
                "/panel", "/panel/", "/control", "/control/",
                "/backend", "/backend/", "/dashboard", "/dashboard/",
                "/login", "/login.php", "/login.html", "/login.jsp",
                "/admin.php", "/admin.html", "/admin.jsp",
                "/wp-admin", "/wp-admin/", "/wp-login.php",
                "/phpmyadmin", "/phpmyadmin/", "/pma/",
                "/adminer", "/adminer.php",
            ],
            indicators: &[],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "Apache Tomcat",
            paths: &[
                "/manager", "/manager/", "/manager/html",
                "/host-manager", "/host-manager/",
                "/admin", "/admin/", "/admin/index.jsp",
            ],
            indicators: &["tomcat", "apache-coyote", "catalina"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "JBoss",
            paths: &[
                "/admin-console", "/admin-console/",
                "/jmx-console", "/jmx-console/",
                "/web-console", "/web-console/",
                "/status", "/status/",
            ],
            indicators: &["jboss", "wildfly"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "WebLogic",
            paths: &["/console", "/console/", "/em", "/em/", "/wls-exporter", "/wls-exporter/"],
            indicators: &["weblogic"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "Nginx",
            paths: &["/nginx_status", "/status", "/server-status", "/server-info"],
            indicators: &["nginx"],
            priority: 2,
        },
        AdminDirectoryRule {
            technology: "Apache",
            paths: &["/server-status", "/server-info", "/server-statistics", "/status"],
            indicators: &["apache"],
            priority: 2,
        },
        AdminDirectoryRule {
            technology: "PHP",
            paths: &[
                "/phpinfo.php", "/info.php", "/test.php",
                "/phpmyadmin", "/phpmyadmin/",
                "/adminer.php", "/db.php",
            ],
            indicators: &["php", "x-powered-by: php"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "WordPress",
            paths: &[
                "/wp-admin", "/wp-admin/", "/wp-login.php",
                "/wp-content/", "/wp-includes/",
                "/xmlrpc.php", "/readme.html",
            ],
            indicators: &["wordpress", "wp-content", "wp-includes"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "Jenkins",
            paths: &["/", "/login", "/manage", "/configure", "/script", "/systemInfo", "/asynchPeople"],
            indicators: &["jenkins", "hudson"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "GitLab",
            paths: &["/admin", "/admin/", "/users/sign_in", "/explore", "/help", "/api/v4"],
            indicators: &["gitlab"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "Grafana",
            paths: &["/login", "/admin", "/api/health", "/api/admin/stats", "/public/build/"],
            indicators: &["grafana"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "Elastic",
            paths: &["/", "/_cluster/health", "/_cat/nodes", "/_plugin/head/", "/app/kibana"],
            indicators: &["elasticsearch", "kibana", "elastic"],
            priority: 1,
        },
        AdminDirectoryRule {
            technology: "API Endpoints",
            paths: &[
                "/api", "/api/", "/api/v1", "/api/v2",
                "/rest", "/rest/", "/graphql",
                "/swagger", "/swagger-ui", "/docs",
                "/openapi.json", "/api-docs",
            ],
            indicators: &["api", "rest", "json"],
            priority: 2,
        },
        AdminDirectoryRule {
            technology: "Backup Files",
            paths: &[
                "/backup", "/backup/", "/backups", "/backups/",
                "/dump", "/dump/", "/export", "/export/",
                "/backup.sql", "/dump.sql", "/database.sql",
                "/config.bak", "/web.config.bak",
            ],
            indicators: &[],
            priority: 3,
        },
    ];
    rules.sort_by_key(|r| r.priority);
    rules
}
