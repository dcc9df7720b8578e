//! Target resolver - expansion of target strings into IPv4 addresses
//!
//! Takes a comma-separated target string and expands it into a
//! deduplicated list of IPv4 addresses. Supported token forms:
//! - single IPv4 address: "203.0.113.7"
//! - CIDR: "192.168.1.0/24"
//! - range: "192.168.1.1-192.168.1.10"
//! - hostname: "example.com" (IPv4 answers only)

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

/// CIDR blocks above this host count are refused unless overridden.
const MAX_CIDR_HOSTS: u64 = 4096;

const LARGE_CIDR_ENV: &str = "TRISHULA_ALLOW_LARGE_CIDR";

pub struct TargetResolver;

impl TargetResolver {
    /// Resolve a comma-separated target string into unique IPv4 addresses.
    /// DNS resolution runs inside `spawn_blocking` to keep the runtime
    /// unblocked.
    pub async fn resolve_targets(targets: &str) -> Result<Vec<Ipv4Addr>> {
        if targets.trim().is_empty() {
            anyhow::bail!("no targets specified");
        }

        let mut ips: Vec<Ipv4Addr> = Vec::new();
        let mut hostnames: Vec<String> = Vec::new();

        for token in targets.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            if let Ok(net) = token.parse::<Ipv4Net>() {
                let prefix = net.prefix_len();
                let host_count: u64 = if prefix >= 32 { 1 } else { 1 << (32 - prefix) };
                let allow_large = std::env::var(LARGE_CIDR_ENV)
                    .map(|v| v == "1")
                    .unwrap_or(false);
                if host_count > MAX_CIDR_HOSTS && !allow_large {
                    anyhow::bail!(
                        "CIDR {net} expands to {host_count} hosts, above the {MAX_CIDR_HOSTS} limit; set {LARGE_CIDR_ENV}=1 to override"
                    );
                }
                for addr in net.hosts() {
                    push_unique(&mut ips, addr);
                }
                continue;
            }

            if token.contains('-') {
                if let Ok(range) = parse_ip_range(token) {
                    for ip in range {
                        push_unique(&mut ips, ip);
                    }
                    continue;
                }
            }

            if let Ok(ip) = token.parse::<Ipv4Addr>() {
                push_unique(&mut ips, ip);
                continue;
            }

            hostnames.push(token.to_string());
        }

        if !hostnames.is_empty() {
            let resolved: Vec<Vec<Ipv4Addr>> = tokio::task::spawn_blocking(move || {
                hostnames
                    .into_iter()
                    .map(|host| match (host.as_str(), 0u16).to_socket_addrs() {
                        Ok(addrs) => addrs
                            .filter_map(|a| match a.ip() {
                                IpAddr::V4(v4) => Some(v4),
                                IpAddr::V6(_) => None,
                            })
                            .collect(),
                        Err(_) => Vec::new(),
                    })
                    .collect()
            })
            .await
            .context("blocking DNS resolution failed")?;

            for ip in resolved.into_iter().flatten() {
                push_unique(&mut ips, ip);
            }
        }

        if ips.is_empty() {
            anyhow::bail!("no valid IPv4 addresses found in targets");
        }
        Ok(ips)
    }
}

fn push_unique(ips: &mut Vec<Ipv4Addr>, ip: Ipv4Addr) {
    if !ips.contains(&ip) {
        ips.push(ip);
    }
}

fn parse_ip_range(range: &str) -> Result<Vec<Ipv4Addr>> {
    let (start, end) = range
        .split_once('-')
        .context(format!("invalid IP range: {range}"))?;
    let start: Ipv4Addr = start
        .trim()
        .parse()
        .context(format!("invalid start IP: {start}"))?;
    let end: Ipv4Addr = end.trim().parse().context(format!("invalid end IP: {end}"))?;

    let start = u32::from(start);
    let end = u32::from(end);
    if start > end {
        anyhow::bail!("invalid IP range: start > end");
    }
    Ok((start..=end).map(Ipv4Addr::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_single_ip() {
        let ips = TargetResolver::resolve_targets("203.0.113.7").await.unwrap();
        assert_eq!(ips, vec![Ipv4Addr::new(203, 0, 113, 7)]);
    }

    #[tokio::test]
    async fn resolve_comma_list_dedups() {
        let ips = TargetResolver::resolve_targets("10.0.0.1, 10.0.0.2, 10.0.0.1")
            .await
            .unwrap();
        assert_eq!(ips.len(), 2);
    }

    #[tokio::test]
    async fn resolve_cidr() {
        let ips = TargetResolver::resolve_targets("192.168.1.0/30").await.unwrap();
        assert!(!ips.is_empty());
        assert!(ips.iter().all(|ip| ip.octets()[2] == 1));
    }

    #[tokio::test]
    async fn resolve_range() {
        let ips = TargetResolver::resolve_targets("192.168.1.1-192.168.1.3")
            .await
            .unwrap();
        assert_eq!(ips.len(), 3);
    }

    #[tokio::test]
    async fn oversized_cidr_rejected() {
        std::env::remove_var(LARGE_CIDR_ENV);
        assert!(TargetResolver::resolve_targets("10.0.0.0/16").await.is_err());
    }

    #[tokio::test]
    async fn reversed_range_rejected() {
        assert!(TargetResolver::resolve_targets("10.0.0.9-10.0.0.1").await.is_err());
    }

    #[tokio::test]
    async fn empty_input_rejected() {
        assert!(TargetResolver::resolve_targets("").await.is_err());
        assert!(TargetResolver::resolve_targets(" , ,").await.is_err());
    }
}
