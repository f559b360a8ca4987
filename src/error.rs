/// Error types for the sing-geoip library
use std::fmt;

/// Result type alias for database build operations
pub type Result<T> = std::result::Result<T, GeoIpError>;

/// Main error type for building, loading and encoding databases
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoIpError {
    /// Malformed address bytes or prefix length
    InvalidPrefix(String),

    /// Existing database was built for a different schema
    FormatMismatch {
        /// Schema name this engine expects
        expected: String,
        /// Schema name declared by the file
        found: String,
    },

    /// Existing database is truncated or cannot be decoded
    CorruptData(String),

    /// Encoded output would not be addressable with the configured record size
    EncodingOverflow {
        /// Largest pointer value the output would need
        required: u64,
        /// Largest pointer value the record size can hold
        limit: u64,
    },

    /// I/O errors
    Io(String),

    /// Malformed driver input (country lists, options)
    InvalidInput(String),
}

impl fmt::Display for GeoIpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoIpError::InvalidPrefix(msg) => write!(f, "Invalid prefix: {}", msg),
            GeoIpError::FormatMismatch { expected, found } => write!(
                f,
                "Database type mismatch: expected '{}', found '{}'",
                expected, found
            ),
            GeoIpError::CorruptData(msg) => write!(f, "Corrupt database: {}", msg),
            GeoIpError::EncodingOverflow { required, limit } => write!(
                f,
                "Encoding overflow: pointer {} exceeds record limit {}",
                required, limit
            ),
            GeoIpError::Io(msg) => write!(f, "I/O error: {}", msg),
            GeoIpError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for GeoIpError {}

impl From<std::io::Error> for GeoIpError {
    fn from(err: std::io::Error) -> Self {
        GeoIpError::Io(err.to_string())
    }
}
