//! Error types for the ledger

use crate::types::EntityId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or semantically invalid input
    #[error("{0}")]
    InvalidPayload(String),

    /// Referenced entity does not exist
    #[error("{entity} with id={id} not found")]
    NotFound {
        /// Entity kind ("User", "Milestone", ...)
        entity: &'static str,
        /// Identifier as supplied by the caller
        id: String,
    },

    /// Balance too low for a debit
    #[error("Insufficient tokens: required {required}, available {available}")]
    InsufficientTokens {
        /// Tokens the operation needs
        required: u64,
        /// Tokens the user holds
        available: u64,
    },

    /// Reward has no redemptions left
    #[error("Reward {0} is no longer available")]
    RewardUnavailable(EntityId),

    /// Caller lacks the role required for a command
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Caller-facing classification of domain errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad input, including insufficient balance and exhausted rewards
    InvalidPayload,
    /// Unknown identifier
    NotFound,
    /// Role check failed
    Unauthorized,
}

impl ErrorKind {
    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidPayload => "invalid_payload",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
        }
    }
}

impl Error {
    /// Shorthand for a missing entity
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classify a domain error. Infrastructure failures return `None` and are
    /// treated as fatal by the request façade.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::InvalidPayload(_)
            | Error::InsufficientTokens { .. }
            | Error::RewardUnavailable(_) => Some(ErrorKind::InvalidPayload),
            Error::NotFound { .. } => Some(ErrorKind::NotFound),
            Error::Unauthorized(_) => Some(ErrorKind::Unauthorized),
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Concurrency(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Metrics(_) => None,
        }
    }

    /// True for store/actor/config failures
    pub fn is_fatal(&self) -> bool {
        self.kind().is_none()
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_are_classified() {
        let err = Error::InsufficientTokens {
            required: 60,
            available: 50,
        };
        assert_eq!(err.kind(), Some(ErrorKind::InvalidPayload));
        assert_eq!(
            err.to_string(),
            "Insufficient tokens: required 60, available 50"
        );

        let err = Error::not_found("User", "0b6c2e4e-8f59-4d1c-9a38-1f0e5c7d2a11");
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert!(err.to_string().starts_with("User with id="));
    }

    #[test]
    fn test_infrastructure_errors_are_fatal() {
        assert!(Error::Storage("disk gone".into()).is_fatal());
        assert!(Error::Concurrency("closed".into()).is_fatal());
        assert!(!Error::InvalidPayload("bad".into()).is_fatal());
    }
}
