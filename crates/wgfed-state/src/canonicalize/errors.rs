//! Canonicalization errors and document limits.

/// Maximum nesting depth of a state document.
pub const MAX_DEPTH: usize = 50;

/// Maximum number of keys in a single mapping.
pub const MAX_KEYS_PER_MAPPING: usize = 10_000;

/// Maximum string length (1MB).
pub const MAX_STRING_LENGTH: usize = 1_024 * 1_024;

/// Maximum document size (10MB).
pub const MAX_TOTAL_SIZE: usize = 10 * 1_024 * 1_024;

/// Largest integer that survives a round trip through an IEEE 754 double.
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_992; // 2^53

/// Smallest integer that survives a round trip through an IEEE 754 double.
pub const MIN_SAFE_INTEGER: i64 = -9_007_199_254_740_992; // -2^53

/// Reasons a document cannot be brought to canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalizeError {
    /// YAML anchor (`&name`).
    AnchorFound { position: String },

    /// YAML alias (`*name`).
    AliasFound { position: String },

    /// YAML tag (`!!str`, `!custom`).
    TagFound { tag: String },

    /// Same key twice in one mapping.
    DuplicateKey { key: String },

    /// Mapping key that is not a string.
    NonStringKey { key: String },

    /// Floats have no stable canonical form across producers.
    FloatNotAllowed { value: String },

    /// Integer outside ±2^53.
    IntegerOutOfRange { value: String },

    MaxDepthExceeded { depth: usize },

    MaxKeysExceeded { count: usize },

    StringTooLong { length: usize },

    InputTooLarge { size: usize },

    /// Document is not syntactically valid.
    ParseError { message: String },

    /// JCS serialization failed.
    SerializeError { message: String },
}

impl std::fmt::Display for CanonicalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnchorFound { position } => write!(f, "YAML anchor found at {}", position),
            Self::AliasFound { position } => write!(f, "YAML alias found at {}", position),
            Self::TagFound { tag } => write!(f, "YAML tag not allowed: {}", tag),
            Self::DuplicateKey { key } => write!(f, "duplicate key: {}", key),
            Self::NonStringKey { key } => write!(f, "mapping keys must be strings, got {}", key),
            Self::FloatNotAllowed { value } => write!(f, "float values not allowed: {}", value),
            Self::IntegerOutOfRange { value } => {
                write!(f, "integer {} out of safe range (±2^53)", value)
            }
            Self::MaxDepthExceeded { depth } => {
                write!(f, "nesting depth {} exceeds limit {}", depth, MAX_DEPTH)
            }
            Self::MaxKeysExceeded { count } => write!(
                f,
                "mapping has {} keys, exceeds limit {}",
                count, MAX_KEYS_PER_MAPPING
            ),
            Self::StringTooLong { length } => write!(
                f,
                "string length {} exceeds limit {}",
                length, MAX_STRING_LENGTH
            ),
            Self::InputTooLarge { size } => {
                write!(f, "input size {} exceeds limit {}", size, MAX_TOTAL_SIZE)
            }
            Self::ParseError { message } => write!(f, "parse error: {}", message),
            Self::SerializeError { message } => write!(f, "canonical JSON error: {}", message),
        }
    }
}

impl std::error::Error for CanonicalizeError {}

/// Result type for canonicalization.
pub type CanonicalizeResult<T> = Result<T, CanonicalizeError>;
