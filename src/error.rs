use thiserror::Error;

/// Main error type for the chain report indexer
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Chain query error: {0}")]
    ChainQuery(ChainQueryError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Failures talking to the chain node (JSON-RPC or GraphQL)
#[derive(Error, Debug)]
pub enum ChainQueryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The node answered, but the payload could not be decoded
    #[error("Malformed response: {0}")]
    Malformed(#[from] DecodeError),

    #[error("RPC method error: code={code}, message={message}")]
    Method { code: i64, message: String },

    #[error("GraphQL query failed: {0}")]
    GraphQl(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Rate limit exceeded, retry after {seconds} seconds")]
    RateLimit { seconds: u64 },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Malformed or unexpected data in a chain response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid hex in field {field}: {value:?}")]
    InvalidHex { field: String, value: String },

    #[error("invalid length for field {field}: expected {expected} bytes, got {got}")]
    InvalidLength {
        field: String,
        expected: usize,
        got: usize,
    },

    #[error("hex number with leading zero digits in field {field}: {value:?}")]
    LeadingZero { field: String, value: String },

    #[error("hex number > 64 bits in field {field}: {value:?}")]
    Overflow { field: String, value: String },

    #[error("empty hex string in field {field}")]
    Empty { field: String },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("unexpected shape in {field}: {reason}")]
    UnexpectedShape { field: String, reason: String },
}

impl DecodeError {
    /// Classify a serde failure while deserializing `field`.
    pub fn from_serde(field: &str, err: &serde_json::Error) -> Self {
        let message = err.to_string();
        match message
            .strip_prefix("missing field `")
            .and_then(|rest| rest.split('`').next())
        {
            Some(name) => DecodeError::MissingField(format!("{}.{}", field, name)),
            None => DecodeError::UnexpectedShape {
                field: field.to_string(),
                reason: message,
            },
        }
    }
}

/// Store failures
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

impl From<ChainQueryError> for IndexerError {
    fn from(err: ChainQueryError) -> Self {
        match err {
            ChainQueryError::Malformed(e) => IndexerError::Decode(e),
            other => IndexerError::ChainQuery(other),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// High priority errors that affect functionality
    High,
    /// Medium priority errors that may affect performance
    Medium,
    /// Low priority errors that are mostly informational
    Low,
}

/// Errors that a retry policy can reason about.
pub trait Recoverable: std::fmt::Display {
    fn is_recoverable(&self) -> bool;
    fn retry_delay(&self) -> Option<u64>;
}

impl ChainQueryError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ChainQueryError::Connection(_) => ErrorSeverity::High,
            ChainQueryError::Timeout { .. } | ChainQueryError::RateLimit { .. } => {
                ErrorSeverity::Medium
            }
            ChainQueryError::NotFound(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

impl Recoverable for ChainQueryError {
    fn is_recoverable(&self) -> bool {
        match self {
            ChainQueryError::Timeout { .. } => true,
            ChainQueryError::RateLimit { .. } => true,
            ChainQueryError::Connection(_) => true,
            ChainQueryError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    fn retry_delay(&self) -> Option<u64> {
        if !self.is_recoverable() {
            return None;
        }

        match self {
            ChainQueryError::RateLimit { seconds } => Some(*seconds),
            ChainQueryError::Timeout { .. } => Some(5),
            ChainQueryError::Connection(_) => Some(10),
            _ => Some(5),
        }
    }
}

impl IndexerError {
    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            IndexerError::Config(_) => ErrorSeverity::Critical,
            IndexerError::Persistence(PersistenceError::Sqlite(_)) => ErrorSeverity::Critical,
            IndexerError::Persistence(PersistenceError::Corrupt(_)) => ErrorSeverity::Critical,
            IndexerError::Decode(_) => ErrorSeverity::High,
            IndexerError::ChainQuery(e) => e.severity(),
            IndexerError::Persistence(PersistenceError::NotFound(_)) => ErrorSeverity::Low,
            IndexerError::Persistence(_) => ErrorSeverity::High,
        }
    }
}

impl Recoverable for IndexerError {
    fn is_recoverable(&self) -> bool {
        match self {
            IndexerError::ChainQuery(e) => e.is_recoverable(),
            IndexerError::Persistence(PersistenceError::Lock(_)) => true,

            // A malformed record stays malformed no matter how often it is fetched
            IndexerError::Decode(_) => false,
            IndexerError::Config(_) => false,
            _ => false,
        }
    }

    fn retry_delay(&self) -> Option<u64> {
        match self {
            IndexerError::ChainQuery(e) => e.retry_delay(),
            IndexerError::Persistence(PersistenceError::Lock(_)) => Some(1),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for IndexerError {
    fn from(err: rusqlite::Error) -> Self {
        IndexerError::Persistence(PersistenceError::Sqlite(err))
    }
}
