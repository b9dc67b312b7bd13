//! Sync error types.

use std::time::Duration;

use crate::db::StoreError;

/// The sync target cannot be used. Raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Sync not configured. Pass a base URL or set sync.base_url in the config.")]
    MissingBaseUrl,
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error(
        "Base URL '{0}' points at this device; loopback addresses are not allowed in production"
    )]
    LoopbackInProduction(String),
}

/// A single remote call failed. Halts the current drain pass.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Server returned status {status}")]
    Status { status: u16, body: String },
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors returned from a drain.
///
/// Per-item remote failures are not errors; they end up in the
/// [`DrainReport`](super::DrainReport).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
