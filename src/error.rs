//! Centralized error handling for mdpane
//!
//! This module provides a unified error type that covers all error scenarios
//! in the crate: file I/O, configuration, markdown tokenization, and diagram
//! resolution.

use log::warn;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Custom Result Type Alias
// ─────────────────────────────────────────────────────────────────────────────

/// A specialized `Result` type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The centralized error type for the crate.
#[derive(Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // File I/O Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Generic I/O error wrapper
    Io(io::Error),

    /// Failed to write file contents
    FileWrite { path: PathBuf, source: io::Error },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to load configuration file
    ConfigLoad {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to save configuration file
    ConfigSave {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to parse configuration (invalid JSON/format)
    ConfigParse {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration directory not found or inaccessible
    ConfigDirNotFound,

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// An extension produced a token that does not describe the input it consumed
    Tokenize {
        extension: &'static str,
        message: String,
    },

    /// An external diagram renderer failed or returned unusable output
    DiagramResolution {
        language: &'static str,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An external diagram renderer did not answer in time
    DiagramTimeout {
        language: &'static str,
        timeout: Duration,
    },

    /// Serialization reached an extension token that was never resolved
    UnresolvedToken { name: &'static str },

    /// A token names an extension that is not registered with the pipeline
    UnknownExtension { name: &'static str },

    // ─────────────────────────────────────────────────────────────────────────
    // Application Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Generic application error with a message
    Application(String),
}

impl Error {
    /// Build a diagram resolution error without an underlying cause.
    pub fn diagram(language: &'static str, message: impl Into<String>) -> Self {
        Error::DiagramResolution {
            language,
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error came out of the diagram resolution stage.
    pub fn is_diagram_failure(&self) -> bool {
        matches!(
            self,
            Error::DiagramResolution { .. } | Error::DiagramTimeout { .. }
        )
    }
}

// Implement From traits for convenient error conversion
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigParse {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Display trait implementation for user-friendly error messages
// ─────────────────────────────────────────────────────────────────────────────
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // File I/O Errors
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::FileWrite { path, source } => {
                write!(f, "Failed to write '{}': {}", path.display(), source)
            }

            // Configuration Errors
            Error::ConfigLoad { path, source } => {
                write!(
                    f,
                    "Failed to load configuration from '{}': {}",
                    path.display(),
                    source
                )
            }
            Error::ConfigSave { path, source } => {
                write!(
                    f,
                    "Failed to save configuration to '{}': {}",
                    path.display(),
                    source
                )
            }
            Error::ConfigParse { message, .. } => {
                write!(f, "Invalid configuration format: {}", message)
            }
            Error::ConfigDirNotFound => {
                write!(f, "Configuration directory not found")
            }

            // Rendering Errors
            Error::Tokenize { extension, message } => {
                write!(f, "Extension '{}' failed to tokenize: {}", extension, message)
            }
            Error::DiagramResolution {
                language, message, ..
            } => {
                write!(f, "Failed to render {} diagram: {}", language, message)
            }
            Error::DiagramTimeout { language, timeout } => {
                write!(
                    f,
                    "{} renderer did not respond within {} ms",
                    language,
                    timeout.as_millis()
                )
            }
            Error::UnresolvedToken { name } => {
                write!(f, "Token '{}' was serialized before it was resolved", name)
            }
            Error::UnknownExtension { name } => {
                write!(f, "No extension registered for token '{}'", name)
            }

            // Application Errors
            Error::Application(msg) => write!(f, "{}", msg),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// std::error::Error trait implementation for error chaining
// ─────────────────────────────────────────────────────────────────────────────
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::FileWrite { source, .. } => Some(source),
            Error::ConfigLoad { source, .. } => Some(source.as_ref()),
            Error::ConfigSave { source, .. } => Some(source.as_ref()),
            Error::ConfigParse { source, .. } | Error::DiagramResolution { source, .. } => source
                .as_ref()
                .map(|s| s.as_ref() as &(dyn std::error::Error + 'static)),
            Error::ConfigDirNotFound
            | Error::Tokenize { .. }
            | Error::DiagramTimeout { .. }
            | Error::UnresolvedToken { .. }
            | Error::UnknownExtension { .. }
            | Error::Application(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graceful Degradation Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Extension trait for Result to support graceful degradation.
pub trait ResultExt<T> {
    /// If the result is an error, log it at warning level and return the provided default.
    fn unwrap_or_warn_default(self, default: T, context: &str) -> T;
}

impl<T> ResultExt<T> for Result<T> {
    fn unwrap_or_warn_default(self, default: T, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                warn!("{}: {}. Using default.", context, err);
                default
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_creation() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test error");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_result: std::result::Result<String, _> = serde_json::from_str("invalid json");
        let err = Error::from(json_result.unwrap_err());
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_display_diagram_error() {
        let err = Error::diagram("plantuml", "exit status 1");
        let msg = format!("{}", err);
        assert_eq!(msg, "Failed to render plantuml diagram: exit status 1");
        assert!(err.is_diagram_failure());
    }

    #[test]
    fn test_display_timeout() {
        let err = Error::DiagramTimeout {
            language: "mermaid",
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "mermaid renderer did not respond within 250 ms"
        );
        assert!(err.is_diagram_failure());
    }

    #[test]
    fn test_unresolved_is_not_diagram_failure() {
        let err = Error::UnresolvedToken { name: "inline-math" };
        assert!(!err.is_diagram_failure());
        assert!(err.to_string().contains("inline-math"));
    }

    #[test]
    fn test_display_config_dir_not_found() {
        let err = Error::ConfigDirNotFound;
        let msg = format!("{}", err);
        assert_eq!(msg, "Configuration directory not found");
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error as StdError;
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err = Error::DiagramResolution {
            language: "plantuml",
            message: "write failed".to_string(),
            source: Some(Box::new(io_err)),
        };
        assert!(err.source().is_some());

        let err = Error::Tokenize {
            extension: "inline-math",
            message: "empty".to_string(),
        };
        assert!(err.source().is_none());
    }

    #[test]
    fn test_unwrap_or_warn_default_ok() {
        let result: super::Result<i32> = Ok(42);
        let value = result.unwrap_or_warn_default(0, "test context");
        assert_eq!(value, 42);
    }

    #[test]
    fn test_unwrap_or_warn_default_err() {
        let result: super::Result<i32> = Err(Error::Application("test".to_string()));
        let value = result.unwrap_or_warn_default(0, "test context");
        assert_eq!(value, 0);
    }
}
