//! Error types for the Trishula engine
//!
//! Per-probe network failures (timeouts, refusals, resets, decode errors)
//! are swallowed by the layer that sees them and never appear here; these
//! variants cover the failures the engine or its caller actually has to
//! react to.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("sweep helper unavailable: {0}")]
    HelperUnavailable(String),

    #[error("sweep helper produced unparseable output: {0}")]
    HelperMalformedOutput(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("rule compilation failed: {0}")]
    RuleCompilation(String),

    #[error("internal error: {0}")]
    Internal(String),
}
