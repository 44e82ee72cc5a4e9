//! Error handling module for the setup engine
//!
//! Provides centralized error handling with proper error types using thiserror.
//! The taxonomy mirrors how failures surface to the caller:
//!
//! - `Config` - the setup document is missing or unparseable (fatal, before execution)
//! - `Validation` - selection or install path rejected before execution starts
//! - `Command` - a single command failed (escalates only for required commands)
//! - `Unsupported` - the engine cannot interpret a command at all (always fatal)
//! - `Unknown` - any other fault caught at the top of a run

use thiserror::Error;

/// Main error type for the setup engine
#[derive(Error, Debug)]
pub enum SetupError {
    /// IO errors (file operations, report export, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing, structural validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (selection, install path, license, disk space)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A command's action failed
    #[error("Command '{command_id}' failed: {message}")]
    Command { command_id: String, message: String },

    /// The engine cannot execute this command at all
    #[error("Command '{command_id}' cannot be executed: {reason}")]
    Unsupported { command_id: String, reason: String },

    /// Install state machine transition errors
    #[error("Status transition error: {0}")]
    StatusTransition(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected faults (catch-all for the top-level run)
    #[error("{0}")]
    Unknown(String),
}

/// Result type alias for setup engine operations
pub type Result<T> = std::result::Result<T, SetupError>;

// Convenient error constructors
impl SetupError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a command error
    pub fn command(command_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Command {
            command_id: command_id.into(),
            message: msg.into(),
        }
    }

    /// Create an unsupported-command error
    pub fn unsupported(command_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            command_id: command_id.into(),
            reason: reason.into(),
        }
    }

    /// Category recorded in the state's error list
    pub fn kind(&self) -> crate::types::ErrorKind {
        use crate::types::ErrorKind;
        match self {
            Self::Io(_) => ErrorKind::FileSystem,
            Self::Config(_) | Self::Json(_) | Self::Unsupported { .. } => {
                ErrorKind::Configuration
            }
            Self::Validation(_) => ErrorKind::Validation,
            Self::Command { .. } => ErrorKind::Command,
            Self::StatusTransition(_) | Self::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = SetupError::config("missing setup.json");
        assert_eq!(err.to_string(), "Configuration error: missing setup.json");

        let err = SetupError::validation("no component selected");
        assert_eq!(err.to_string(), "Validation error: no component selected");

        let err = SetupError::unsupported("plugin", "no handler 'foo'");
        assert_eq!(
            err.to_string(),
            "Command 'plugin' cannot be executed: no handler 'foo'"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SetupError = io_err.into();
        assert!(matches!(err, SetupError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::FileSystem);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(SetupError::config("x").kind(), ErrorKind::Configuration);
        assert_eq!(SetupError::command("c", "boom").kind(), ErrorKind::Command);
        assert_eq!(SetupError::unsupported("c", "?").kind(), ErrorKind::Configuration);
        assert_eq!(SetupError::Unknown("?".to_string()).kind(), ErrorKind::Unknown);
    }
}
