//! Service detection based on port numbers and banner content
//!
//! Confidence is additive: a port-table match alone is worth 0.4, a banner
//! rule adds 0.3, an extracted version adds 0.2, capped at 1.0. Banner-derived
//! labels always override the port-table label.

use once_cell::sync::Lazy;
use regex::Regex;

const PORT_MATCH_SCORE: f32 = 0.4;
const BANNER_RULE_SCORE: f32 = 0.3;
const VERSION_SCORE: f32 = 0.2;

static SERVER_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)server:\s*([^\r\n]+)").unwrap());
static SSH_VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)ssh-[\d.]+").unwrap());
static VERSION_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:v|version)?\s*(\d+\.\d+(?:\.\d+)?(?:\.\d+)?)").unwrap());

/// Loose version-number scrape for banners without a structured field.
fn extract_version_number(text: &str) -> Option<String> {
    VERSION_NUMBER_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Outcome of classifying one port.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceGuess {
    pub service: String,
    pub version: Option<String>,
    pub confidence: f32,
    /// Set when the label denotes a known-malicious listener.
    pub threat: Option<&'static str>,
}

impl ServiceGuess {
    fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            version: None,
            confidence: 0.0,
            threat: None,
        }
    }
}

/// Identify a service from the port number alone.
#[must_use]
pub fn service_for_port(port: u16) -> Option<ServiceGuess> {
    let (service, threat): (&str, Option<&'static str>) = match port {
        // Well-known assignments
        21 => ("ftp", None),
        22 => ("ssh", None),
        23 => ("telnet", None),
        25 => ("smtp", None),
        53 => ("dns", None),
        80 => ("http", None),
        110 => ("pop3", None),
        135 => ("msrpc", None),
        139 => ("netbios-ssn", None),
        143 => ("imap", None),
        443 => ("https", None),
        445 => ("smb", None),
        993 => ("imaps", None),
        995 => ("pop3s", None),

        // Databases
        1433 => ("mssql", None),
        1521 => ("oracle", None),
        3306 => ("mysql", None),
        5432 => ("postgresql", None),
        6379 => ("redis", None),
        27017 => ("mongodb", None),
        9200 => ("elasticsearch", None),

        3389 => ("rdp", None),

        // VPN
        500 => ("ike", None),
        1194 => ("openvpn", None),
        1723 => ("pptp", None),
        4500 => ("ipsec", None),
        51820 => ("wireguard", None),

        // VNC displays
        5800..=5810 => ("vnc-http", None),
        5900..=5910 => ("vnc", None),

        // Remote management tools
        5938 => ("teamviewer", None),
        6129 => ("dameware", None),
        6568 => ("anydesk", None),
        8200 => ("gotomypc", None),

        // Known malware, backdoor, and C2 listeners
        666 => ("malware", Some("multiple malware families")),
        1080 => ("socks-proxy", Some("SOCKS proxy abuse")),
        1234 => ("ultors-trojan", Some("Ultors trojan")),
        1243 => ("subseven", Some("SubSeven backdoor")),
        1337 => ("hacker-tools", Some("Empire/CrackMapExec tooling")),
        2222 => ("c2-channel", Some("DoHC2/ExternalC2/Qakbot C2")),
        3000 => ("beef-panel", Some("BeEF HTTP panel")),
        4444 => ("metasploit", Some("Metasploit default listener")),
        6666 => ("irc-botnet", Some("IRC botnet")),
        6667 => ("irc", Some("possible IRC botnet")),
        8080 => ("http-proxy", Some("HTTP proxy abuse")),
        9050 => ("tor-socks", Some("Tor SOCKS proxy")),
        12345 => ("netbus", Some("NetBus trojan")),
        31337 => ("elite-tools", Some("SliverC2/Back Orifice")),
        50050 => ("cobaltstrike", Some("CobaltStrike TeamServer")),

        _ => return None,
    };

    let mut guess = ServiceGuess::new(service);
    guess.threat = threat;
    Some(guess)
}

/// Banner-content rules; the first matching rule wins.
fn classify_banner(banner: &str) -> Option<ServiceGuess> {
    let lower = banner.to_lowercase();

    // C2 strings take precedence over protocol heuristics
    if lower.contains("morte c2") {
        let mut guess = ServiceGuess::new("morte-c2");
        guess.threat = Some("C2 server");
        return Some(guess);
    }
    if lower.contains("usoppgo") || lower.contains("king of snipers") {
        let mut guess = ServiceGuess::new("usoppgo-ftp");
        guess.threat = Some("suspicious FTP service");
        return Some(guess);
    }
    if lower.contains("cobaltstrike") || lower.contains("beacon") {
        let mut guess = ServiceGuess::new("cobaltstrike");
        guess.threat = Some("CobaltStrike");
        return Some(guess);
    }

    if lower.contains("http/") || lower.contains("server:") {
        let mut guess = ServiceGuess::new("http");
        if let Some(caps) = SERVER_HEADER_RE.captures(banner) {
            guess.version = Some(caps[1].trim().to_string());
        }
        return Some(guess);
    }

    if lower.contains("ssh-") {
        let mut guess = ServiceGuess::new("ssh");
        if let Some(m) = SSH_VERSION_RE.find(&lower) {
            guess.version = Some(m.as_str().to_string());
        }
        return Some(guess);
    }

    if lower.contains("220 ") {
        if lower.contains("smtp") || lower.contains("mail") {
            let mut guess = ServiceGuess::new("smtp");
            guess.version = extract_version_number(&lower);
            return Some(guess);
        }
        if lower.contains("ftp") {
            let mut guess = ServiceGuess::new("ftp");
            guess.version = extract_version_number(&lower);
            return Some(guess);
        }
    }

    // Mail retrieval greetings
    if lower.starts_with("+ok") || lower.contains("pop3") {
        return Some(ServiceGuess::new("pop3"));
    }
    if lower.starts_with("* ok") || lower.contains("imap") {
        return Some(ServiceGuess::new("imap"));
    }

    // Datastore greetings
    if lower.contains("mysql") {
        let mut guess = ServiceGuess::new("mysql");
        guess.version = extract_version_number(&lower);
        return Some(guess);
    }
    if lower.contains("postgresql") {
        let mut guess = ServiceGuess::new("postgresql");
        guess.version = extract_version_number(&lower);
        return Some(guess);
    }
    if lower.contains("redis") {
        let mut guess = ServiceGuess::new("redis");
        guess.version = extract_version_number(&lower);
        return Some(guess);
    }
    if lower.contains("mongodb") {
        let mut guess = ServiceGuess::new("mongodb");
        guess.version = extract_version_number(&lower);
        return Some(guess);
    }
    if lower.contains("elasticsearch") {
        let mut guess = ServiceGuess::new("elasticsearch");
        guess.version = extract_version_number(&lower);
        return Some(guess);
    }

    // Remote access
    if let Some(rest) = lower.strip_prefix("rfb ") {
        let mut guess = ServiceGuess::new("vnc");
        guess.version = rest.split_whitespace().next().map(str::to_string);
        return Some(guess);
    }
    if lower.contains("telnet") || lower.contains("login:") {
        return Some(ServiceGuess::new("telnet"));
    }

    None
}

/// Combined classification: port table plus banner rules with additive
/// confidence. Returns `None` when neither pass produced a label.
#[must_use]
pub fn classify(port: u16, banner: Option<&str>) -> Option<ServiceGuess> {
    let port_guess = service_for_port(port);
    let banner_guess = banner.and_then(classify_banner);

    let mut confidence = 0.0;
    if port_guess.is_some() {
        confidence += PORT_MATCH_SCORE;
    }

    let mut guess = match (banner_guess, port_guess) {
        (Some(mut from_banner), from_port) => {
            confidence += BANNER_RULE_SCORE;
            // a banner label overrides the port label, but a threat noted
            // by the port table survives a non-threat banner match
            from_banner.threat = from_banner
                .threat
                .or(from_port.and_then(|g| g.threat));
            from_banner
        }
        (None, Some(from_port)) => from_port,
        (None, None) => return None,
    };

    if guess.version.is_some() {
        confidence += VERSION_SCORE;
    }
    guess.confidence = confidence.min(1.0);
    Some(guess)
}
