//! Trishula Common - shared types and configuration
//!
//! This crate provides the data model, tunable configuration, and error
//! types used across the Trishula scan pipeline.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::ScanConfig;
pub use error::ScanError;
pub use types::{
    DirectoryInfo, HttpInfo, PortInfo, PortState, Protocol, ScanRequest, ScanResponse, ScanResult,
    ScanStatus, ScanSummary, ScanTarget,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
