//! Error types for the sync and query paths.
//!
//! Plumbing (config loading, server startup, connector I/O) uses
//! `anyhow`. The two places where callers branch on the failure kind get
//! typed enums: a re-index cycle reports a [`SyncError`] in its
//! `reindex_failed` event, and a query distinguishes a bad request from a
//! degraded backend via [`QueryError`].

use thiserror::Error;

/// Why a re-index cycle failed.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Reading the source document failed or timed out.
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    /// The embedding provider failed, timed out, or returned malformed output.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// An index store operation failed or timed out.
    #[error("index store error: {0}")]
    IndexStore(String),

    /// No permission level could be resolved for the document.
    #[error("permission config error: {0}")]
    PermissionConfig(String),
}

impl SyncError {
    /// Short machine-readable tag, used in logs and as the prefix of the
    /// `reason` field of `reindex_failed` events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientIo(_) => "transient_io",
            Self::Embedding(_) => "embedding",
            Self::IndexStore(_) => "index_store",
            Self::PermissionConfig(_) => "permission_config",
        }
    }

    /// Event-facing reason string: `"<kind>: <detail>"`.
    pub fn reason(&self) -> String {
        let detail = match self {
            Self::TransientIo(m)
            | Self::Embedding(m)
            | Self::IndexStore(m)
            | Self::PermissionConfig(m) => m,
        };
        format!("{}: {}", self.kind(), detail)
    }
}

/// Query failures that are not reported as a degraded result.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),
}
