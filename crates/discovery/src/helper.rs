//! External fast-sweep helper driver
//!
//! Resolves a platform-specific helper binary (project-local `bin/` first,
//! then `$PATH`), invokes it with greppable output, and parses its
//! `<ip> -> [p1,p2,...]` result line. Any failure here is recoverable: the
//! caller falls through to the in-process connect scan.

use crate::ports::PortSet;
use crate::Sweeper;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::debug;
use trishula_common::{ScanConfig, ScanError};

/// Helper binary base name; platform-suffixed inside `bin/`.
const HELPER_NAME: &str = "rustscan";

/// Local bin directory searched before `$PATH`.
const LOCAL_BIN_DIR: &str = "bin";

pub struct HelperSweep {
    path: PathBuf,
    config: Arc<ScanConfig>,
}

impl HelperSweep {
    /// Locate the helper binary, local `bin/` first, then `$PATH`.
    #[must_use]
    pub fn locate(config: Arc<ScanConfig>) -> Option<Self> {
        let path = local_helper_path().or_else(path_helper)?;
        Some(Self { path, config })
    }

    /// Build a driver for a known binary path (used by tests).
    #[must_use]
    pub fn with_path(path: PathBuf, config: Arc<ScanConfig>) -> Self {
        Self { path, config }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn build_args(&self, ip: Ipv4Addr, set: &PortSet) -> Vec<String> {
        let mut args = vec![
            "-a".into(),
            ip.to_string(),
            "-t".into(),
            self.config.sweep_timeout_ms.to_string(),
            "-b".into(),
            self.config.sweep_batch_size.to_string(),
            "--tries".into(),
            self.config.sweep_tries.to_string(),
            "--ulimit".into(),
            self.config.sweep_ulimit.to_string(),
            "-g".into(),
            "--scan-order".into(),
            "serial".into(),
        ];
        match set {
            PortSet::List(ports) => {
                args.push("-p".into());
                args.push(
                    ports
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                );
            }
            PortSet::Range(lo, hi) => {
                args.push("-r".into());
                args.push(format!("{lo}-{hi}"));
            }
        }
        args
    }
}

#[async_trait]
impl Sweeper for HelperSweep {
    async fn sweep(&self, ip: Ipv4Addr, set: &PortSet) -> Result<Vec<u16>, ScanError> {
        let args = self.build_args(ip, set);
        debug!("invoking sweep helper: {} ports={}", self.path.display(), set.len());

        let output = Command::new(&self.path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScanError::HelperUnavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::HelperUnavailable(format!(
                "exit {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_greppable(&String::from_utf8_lossy(&output.stdout))
    }

    fn name(&self) -> &'static str {
        "helper-sweep"
    }
}

/// Parse greppable output lines of the form `<ip> -> [p1,p2,...]`.
///
/// An empty result is a legitimate "no open ports" answer; output that
/// carries result-shaped lines none of which parse is malformed.
pub fn parse_greppable(output: &str) -> Result<Vec<u16>, ScanError> {
    let mut ports = Vec::new();
    let mut saw_result_line = false;

    for line in output.lines() {
        let line = line.trim();
        if !line.contains("->") {
            continue;
        }
        saw_result_line = true;

        let Some(bracketed) = line
            .split('[')
            .nth(1)
            .and_then(|rest| rest.split(']').next())
        else {
            continue;
        };
        for token in bracketed.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Ok(port) = token.parse::<u16>() {
                if port != 0 {
                    ports.push(port);
                }
            }
        }
    }

    if saw_result_line && ports.is_empty() {
        return Err(ScanError::HelperMalformedOutput(
            output.chars().take(120).collect(),
        ));
    }

    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Installation report for the sweep helper, for diagnostics surfaces.
#[derive(Debug, Clone)]
pub struct HelperStatus {
    pub platform_filename: &'static str,
    pub local_path: Option<PathBuf>,
    pub path_binary: Option<PathBuf>,
    pub resolved: Option<PathBuf>,
    pub version: Option<String>,
}

impl HelperStatus {
    #[must_use]
    pub fn available(&self) -> bool {
        self.resolved.is_some() && self.version.is_some()
    }
}

/// Report where (and whether) the helper binary can be found and whether
/// it actually runs. Never fails; absence is a state, not an error.
pub async fn check_installation() -> HelperStatus {
    let local_path = local_helper_path();
    let path_binary = path_helper();
    let resolved = local_path.clone().or_else(|| path_binary.clone());

    let version = match &resolved {
        Some(path) => verify_helper(path).await,
        None => None,
    };

    HelperStatus {
        platform_filename: platform_helper_filename(),
        local_path,
        path_binary,
        resolved,
        version,
    }
}

const VERIFY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Run `--version` against a candidate binary; `None` means unusable.
async fn verify_helper(path: &Path) -> Option<String> {
    let output = tokio::time::timeout(
        VERIFY_TIMEOUT,
        Command::new(path).arg("--version").output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

fn platform_helper_filename() -> &'static str {
    if cfg!(target_os = "windows") {
        "rustscan-windows-x64.exe"
    } else if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "rustscan-macos-arm64"
        } else {
            "rustscan-macos-x64"
        }
    } else {
        "rustscan-linux-x64"
    }
}

fn local_helper_path() -> Option<PathBuf> {
    let path = PathBuf::from(LOCAL_BIN_DIR).join(platform_helper_filename());
    path.is_file().then_some(path)
}

fn path_helper() -> Option<PathBuf> {
    let exe = if cfg!(target_os = "windows") {
        format!("{HELPER_NAME}.exe")
    } else {
        HELPER_NAME.to_string()
    };
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(&exe))
            .find(|candidate| candidate.is_file())
    })
}
