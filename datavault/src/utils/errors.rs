//! Custom error types for DataVault.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataVaultError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Staging error for {path}: {source}")]
    Staging {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("{provider} API error {code}: {message}")]
    Api {
        provider: &'static str,
        code: i64,
        message: String,
    },

    #[error("{0} backend not initialized")]
    Uninitialized(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("No backends configured")]
    NoBackends,

    #[error("All uploads failed ({0} backends attempted)")]
    AllBackendsFailed(usize),
}

impl DataVaultError {
    /// True when the error came from a cancellation request rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DataVaultError::Cancelled)
    }

    pub(crate) fn staging(path: &std::path::Path, source: std::io::Error) -> Self {
        DataVaultError::Staging {
            path: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataVaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(DataVaultError::Cancelled.is_cancelled());
        assert!(!DataVaultError::NoBackends.is_cancelled());
        assert!(!DataVaultError::Uninitialized("pCloud".into()).is_cancelled());
    }

    #[test]
    fn test_api_error_display() {
        let err = DataVaultError::Api {
            provider: "pCloud",
            code: 2004,
            message: "File or folder alredy exists.".into(),
        };
        assert_eq!(err.to_string(), "pCloud API error 2004: File or folder alredy exists.");
    }
}
