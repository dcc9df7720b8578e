//! Fingerprint engine - service identification for discovered ports
//!
//! Combines two passes:
//! - Port-based lookup against a table of well-known assignments,
//!   including VPN, VNC, remote-admin, and known malware/C2 listeners.
//! - Banner-based rules that override the port label when they match.

mod service_detector;

pub use service_detector::{classify, service_for_port, ServiceGuess};
