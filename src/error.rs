//! Error handling for the Shelly Cloud logger.
//!
//! Per-device failures ([`FetchError`], [`NormalizationError`], [`StorageError`])
//! are recovered inside a poll cycle. Only [`ShellyError::Config`] is fatal.

/// A specialized `Result` type for logger operations.
pub type Result<T> = std::result::Result<T, ShellyError>;

/// The main error type for the logger.
#[derive(Debug, thiserror::Error)]
pub enum ShellyError {
    /// Configuration is missing or invalid; the process cannot proceed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fetching a device status failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A status payload could not be interpreted
    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    /// Writing a point to the time-series store failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The cloud API answered, but reported a failure
    #[error("Shelly Cloud API error: {0}")]
    Api(String),

    /// HTTP client construction or request failed outside the per-device path
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ShellyError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new API error
    pub fn api_error(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Whether the error should stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Io(_) | Self::Yaml(_))
    }
}

/// Failure to obtain a raw status for one device.
///
/// Non-success responses, transport failures, timeouts and empty responses
/// all collapse into [`FetchError::Unreachable`]; the reason is kept for logging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("device unreachable: {0}")]
    Unreachable(String),
}

impl FetchError {
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::Unreachable(reason.into())
    }
}

/// Failure to interpret a raw status payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    #[error("malformed status payload: {0}")]
    MalformedResponse(String),
}

impl NormalizationError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse(reason.into())
    }
}

/// Failure to persist a point.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The request never produced a response
    #[error("storage transport error: {0}")]
    Transport(String),

    /// The database answered with a non-success status
    #[error("storage rejected write (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The point has nothing the database can accept
    #[error("cannot encode point: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_problems_are_fatal() {
        assert!(ShellyError::config_error("no devices").is_fatal());
        assert!(!ShellyError::from(FetchError::unreachable("HTTP 500")).is_fatal());
        assert!(!ShellyError::from(NormalizationError::malformed("status")).is_fatal());
        assert!(!ShellyError::from(StorageError::Transport("refused".into())).is_fatal());
    }

    #[test]
    fn test_stage_errors_display_their_reason() {
        let err: ShellyError = FetchError::unreachable("timed out").into();
        assert_eq!(err.to_string(), "device unreachable: timed out");

        let err = StorageError::Rejected {
            status: 401,
            body: "unauthorized".into(),
        };
        assert!(err.to_string().contains("401"));
    }
}
