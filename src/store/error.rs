//! Error types for persistence operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing the data directory.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error (create, read, write, rename, remove).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A value could not be encoded as JSON.
    #[error("failed to encode {path}: {source}")]
    Encode {
        /// The destination path.
        path: PathBuf,
        /// The underlying serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// A file exists but does not contain the expected JSON.
    #[error(
        "corrupt data in {path}: {source}\n  Suggestion: Move the file aside; it will be recreated on the next save"
    )]
    Corrupt {
        /// The unreadable file.
        path: PathBuf,
        /// The underlying parser error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an encoding error.
    pub fn encode(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Encode {
            path: path.into(),
            source,
        }
    }

    /// Creates a corrupt-file error.
    pub fn corrupt(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = StoreError::io(
            "/data/Titles/x.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/data/Titles/x.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_corrupt_error_has_suggestion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = StoreError::corrupt("/data/download_state.json", parse_err);
        let msg = err.to_string();
        assert!(msg.contains("corrupt"));
        assert!(msg.contains("Suggestion"));
    }
}
