//! Error taxonomy for the probing/state-propagation core.
//!
//! Hand-written enums rather than a derive-macro error crate: the reference
//! service this core is adapted from does the same (see
//! `storage::error::StorageError` in the sibling monitoring project), and the
//! taxonomy here is small enough that a manual `Display` stays legible.

use std::fmt;

/// Errors produced while executing a single probe.
#[derive(Debug, Clone)]
pub enum ProbeError {
    Timeout,
    Dns(String),
    Transport(String),
    TlsError(String),
    StatusMismatch { expected: String, got: u16 },
    KeywordMissing(String),
    KeywordForbidden(String),
    InvalidConfig(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout => write!(f, "probe timed out"),
            ProbeError::Dns(msg) => write!(f, "DNS resolution failed: {msg}"),
            ProbeError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProbeError::TlsError(msg) => write!(f, "TLS error: {msg}"),
            ProbeError::StatusMismatch { expected, got } => {
                write!(f, "expected status {expected}, got {got}")
            }
            ProbeError::KeywordMissing(kw) => write!(f, "response did not contain '{kw}'"),
            ProbeError::KeywordForbidden(kw) => write!(f, "response contained forbidden '{kw}'"),
            ProbeError::InvalidConfig(msg) => write!(f, "invalid monitor configuration: {msg}"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Errors from the persistence adapter.
#[derive(Debug)]
pub enum StoreError {
    Conflict(String),
    NotFound(String),
    Transient(String),
    ParseError(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict(msg) => write!(f, "store conflict: {msg}"),
            StoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            StoreError::Transient(msg) => write!(f, "transient store error: {msg}"),
            StoreError::ParseError(msg) => write!(f, "malformed persisted column: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound("query returned no rows".to_string())
            }
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(err.to_string())
            }
            rusqlite::Error::SqliteFailure(ref e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StoreError::Transient(err.to_string())
            }
            other => StoreError::Transient(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::ParseError(err.to_string())
    }
}

/// Errors from the webhook dispatcher.
#[derive(Debug)]
pub enum DispatchError {
    NonRetryable4xx(u16),
    RetryableTransport5xx(String),
    Timeout,
    SignatureConfigMissing(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NonRetryable4xx(code) => write!(f, "non-retryable {code} response"),
            DispatchError::RetryableTransport5xx(msg) => {
                write!(f, "retryable transport/5xx error: {msg}")
            }
            DispatchError::Timeout => write!(f, "webhook delivery timed out"),
            DispatchError::SignatureConfigMissing(secret_ref) => {
                write!(f, "signing enabled but secret_ref '{secret_ref}' is not set")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Errors from lease acquisition.
#[derive(Debug)]
pub enum LeaseError {
    NotAcquired,
    Store(StoreError),
}

impl fmt::Display for LeaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseError::NotAcquired => write!(f, "lease not acquired"),
            LeaseError::Store(e) => write!(f, "lease store error: {e}"),
        }
    }
}

impl std::error::Error for LeaseError {}

impl From<StoreError> for LeaseError {
    fn from(err: StoreError) -> Self {
        LeaseError::Store(err)
    }
}

impl From<LeaseError> for StoreError {
    fn from(err: LeaseError) -> Self {
        match err {
            LeaseError::Store(e) => e,
            LeaseError::NotAcquired => StoreError::Conflict("lease not acquired".to_string()),
        }
    }
}

/// Errors bubbled only to the (out-of-core) admin API surface.
#[derive(Debug, Clone)]
pub enum ValidationError {
    Invalid(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Invalid(msg) => write!(f, "validation error: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors from the daily rollup/retention batch.
#[derive(Debug)]
pub enum RollupError {
    Store(StoreError),
    Lease(LeaseError),
}

impl fmt::Display for RollupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollupError::Store(e) => write!(f, "rollup store error: {e}"),
            RollupError::Lease(e) => write!(f, "rollup lease error: {e}"),
        }
    }
}

impl std::error::Error for RollupError {}

impl From<StoreError> for RollupError {
    fn from(err: StoreError) -> Self {
        RollupError::Store(err)
    }
}

impl From<LeaseError> for RollupError {
    fn from(err: LeaseError) -> Self {
        RollupError::Lease(err)
    }
}
