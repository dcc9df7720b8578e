//! Working-set resolution for a layer-1 sweep

use trishula_common::config::parse_port_spec;
use trishula_common::{ScanConfig, ScanError};

pub const FULL_SWEEP_START: u16 = 1;
pub const FULL_SWEEP_END: u16 = 65_535;

/// The set of candidate ports for one sweep.
///
/// A dense range is kept symbolic so the helper can receive it as `-r lo-hi`
/// instead of an enormous comma list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSet {
    /// Explicit or preset port list, deduplicated and sorted.
    List(Vec<u16>),
    /// Inclusive dense range.
    Range(u16, u16),
}

impl PortSet {
    /// Caller-pinned ports.
    #[must_use]
    pub fn explicit(mut ports: Vec<u16>) -> Self {
        ports.retain(|&p| p != 0);
        ports.sort_unstable();
        ports.dedup();
        PortSet::List(ports)
    }

    /// The preset working set: `expand(preset_port_range) ∪ preset_extra_ports`.
    pub fn preset(config: &ScanConfig) -> Result<Self, ScanError> {
        let mut ports = parse_port_spec(&config.preset_port_range)?;
        ports.extend(config.preset_extra_ports.iter().copied());
        ports.retain(|&p| p != 0);
        ports.sort_unstable();
        ports.dedup();
        Ok(PortSet::List(ports))
    }

    /// The exhaustive 1-65535 sweep.
    #[must_use]
    pub const fn full() -> Self {
        PortSet::Range(FULL_SWEEP_START, FULL_SWEEP_END)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            PortSet::List(ports) => ports.len(),
            PortSet::Range(lo, hi) => (*hi as usize) - (*lo as usize) + 1,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materialize the candidate ports for the in-process scanner.
    #[must_use]
    pub fn expand(&self) -> Vec<u16> {
        match self {
            PortSet::List(ports) => ports.clone(),
            PortSet::Range(lo, hi) => (*lo..=*hi).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dedups_and_sorts() {
        let set = PortSet::explicit(vec![443, 80, 0, 443, 22]);
        assert_eq!(set, PortSet::List(vec![22, 80, 443]));
    }

    #[test]
    fn preset_unions_range_and_extras() {
        let config = ScanConfig {
            preset_port_range: "1-100".into(),
            preset_extra_ports: vec![8080, 50, 3306],
            ..ScanConfig::default()
        };
        let set = PortSet::preset(&config).unwrap();
        let ports = set.expand();
        // 1-100 plus the two extras outside the range; 50 deduplicated away
        assert_eq!(ports.len(), 102);
        assert!(ports.contains(&3306));
        assert!(ports.contains(&8080));
        assert!(ports.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn preset_rejects_bad_range() {
        let config = ScanConfig {
            preset_port_range: "oops".into(),
            ..ScanConfig::default()
        };
        assert!(PortSet::preset(&config).is_err());
    }

    #[test]
    fn full_sweep_bounds() {
        let set = PortSet::full();
        assert_eq!(set.len(), 65_535);
        let ports = set.expand();
        assert_eq!(ports.first(), Some(&1));
        assert_eq!(ports.last(), Some(&65_535));
    }
}
