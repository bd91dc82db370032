//! Error types for mailrag

use thiserror::Error;

/// Main error type for mailrag
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Search engine error: {0}")]
    Search(String),

    #[error("Mailbox provider error: {0}")]
    Provider(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for mailrag
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Search(_) => "SEARCH_ERROR",
            Error::Provider(_) => "PROVIDER_ERROR",
            Error::Embedding(_) => "EMBEDDING_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error came from a remote collaborator rather than local input
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::Search(_) | Error::Provider(_) | Error::Embedding(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Validation("k".into()).code(), "VALIDATION_ERROR");
        assert_eq!(Error::Search("down".into()).code(), "SEARCH_ERROR");
        assert_eq!(
            Error::Other(anyhow::anyhow!("boom")).code(),
            "INTERNAL_ERROR"
        );
    }

    #[test]
    fn test_is_remote() {
        assert!(Error::Provider("401".into()).is_remote());
        assert!(!Error::Config("missing".into()).is_remote());
    }

    #[test]
    fn test_json_error_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().starts_with("JSON error"));
    }
}
