//! Error types for state loading, saving and verification.

use std::time::Duration;

use crate::encrypter::EncryptionError;
use crate::signer::SignatureError;
use crate::wireguard::ValidationError;

/// State errors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The loaded structure does not have the shape of a signed envelope.
    #[error("invalid data: {message}")]
    InvalidData {
        message: String,
        #[source]
        source: Option<Box<StateError>>,
    },

    /// Source does not exist.
    #[error("source not found: {locator}")]
    NotFound { locator: String },

    /// Filesystem error other than a missing source.
    #[error("I/O error on {locator}: {message}")]
    Io { locator: String, message: String },

    /// Source content could not be parsed.
    #[error("failed to parse {locator}: {message}")]
    Parse { locator: String, message: String },

    /// No loader or saver handles this locator.
    #[error("unsupported source: {locator}")]
    UnsupportedSource { locator: String },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Server answered with a status other than success or 404.
    #[error("HTTP {status} from {locator}{}", status_detail(.message))]
    HttpStatus {
        locator: String,
        status: u16,
        message: String,
    },

    /// Loading did not finish before the deadline.
    #[error("loading {locator} timed out after {after:?}")]
    Timeout { locator: String, after: Duration },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Signature verification failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// A validated record rejected its input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Secret fields could not be sealed or opened.
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
}

impl StateError {
    /// Shape error without an underlying cause.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
            source: None,
        }
    }

    /// Shape error caused by another failure.
    pub fn invalid_data_caused_by(message: impl Into<String>, cause: StateError) -> Self {
        Self::InvalidData {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Build an error from an I/O failure, keeping `NotFound` distinct.
    pub fn from_io(locator: impl Into<String>, err: &std::io::Error) -> Self {
        let locator = locator.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { locator }
        } else {
            Self::Io {
                locator,
                message: err.to_string(),
            }
        }
    }

    /// Whether the error means the source is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the error is a trust violation reported by the signer.
    pub fn is_signature_failure(&self) -> bool {
        matches!(self, Self::Signature(_))
    }

    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 1,
            Self::Config { .. } => 1,
            Self::UnsupportedSource { .. } => 1,

            Self::InvalidData { .. } => 2,
            Self::Parse { .. } => 2,

            Self::Validation(_) => 3,

            // Trust violations
            Self::Signature(_) => 4,
            Self::Encryption(EncryptionError::DecryptionFailed { .. }) => 4,

            Self::Encryption(EncryptionError::Key { .. }) => 1,
            Self::Encryption(_) => 2,

            Self::Io { .. } => 5,
            Self::Network { .. } => 5,
            Self::HttpStatus { .. } => 5,
            Self::Timeout { .. } => 5,
        }
    }

    /// Whether an HTTP fetch may be retried after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

fn status_detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(": {}", message)
    }
}

impl From<reqwest::Error> for StateError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;
