use thiserror::Error;

/// Top-level error type for Wayfarer.
///
/// Subsystem crates define their own error types and implement
/// `From<WayfarerError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WayfarerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Voice error: {0}")]
    Voice(String),
}

impl From<toml::de::Error> for WayfarerError {
    fn from(err: toml::de::Error) -> Self {
        WayfarerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for WayfarerError {
    fn from(err: toml::ser::Error) -> Self {
        WayfarerError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for WayfarerError {
    fn from(err: serde_json::Error) -> Self {
        WayfarerError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Wayfarer operations.
pub type Result<T> = std::result::Result<T, WayfarerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WayfarerError::Config("missing api key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing api key");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WayfarerError = io_err.into();
        assert!(matches!(err, WayfarerError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<Vec<u8>>("not json").unwrap_err();
        let err: WayfarerError = json_err.into();
        assert!(matches!(err, WayfarerError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: WayfarerError = toml_err.into();
        assert!(matches!(err, WayfarerError::Config(_)));
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(WayfarerError, &str)> = vec![
            (
                WayfarerError::Storage("db locked".to_string()),
                "Storage error: db locked",
            ),
            (
                WayfarerError::Serialization("bad json".to_string()),
                "Serialization error: bad json",
            ),
            (
                WayfarerError::Voice("no engine".to_string()),
                "Voice error: no engine",
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }
}
