//! Fault types for keyward.
//!
//! Only infrastructure faults live here. Business outcomes such as an
//! unknown license or a machine mismatch are plain values returned by the
//! [`Authority`](crate::authority::Authority), never errors.

use thiserror::Error;

/// Infrastructure faults surfaced to the transport layer.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Missing or invalid server configuration (including a missing admin secret).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The backing store failed or is unreachable.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Any other server-side failure.
    #[error("server error: {0}")]
    ServerError(String),
}

pub type LicenseResult<T> = Result<T, LicenseError>;
