//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Errors are `Clone` because a single settled load outcome is handed to
/// every caller that coalesced onto it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Durable key-value storage could not be read or written.
    Storage(String),
    /// A queued item could not be encoded or decoded.
    Serialization(String),
    /// The remote sink rejected a submission or could not be reached.
    Network(String),
    /// A coalesced load exceeded its time bound.
    Timeout(String),
    /// A loader failed for a domain reason.
    Loader(String),
    /// A shared load produced a different type than the caller expected.
    TypeMismatch(String),
    /// A feedback report is missing required content.
    Validation(String),
    /// The task driving a load went away before it settled.
    Cancelled(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error means the remote sink did not accept an item.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Whether this error is the load time bound firing.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Storage(msg) => write!(f, "storage: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Network(msg) => write!(f, "network: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Loader(msg) => write!(f, "loader: {msg}"),
            Self::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
