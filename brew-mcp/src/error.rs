//! Error taxonomy for catalog loading, tool registration and command execution

use std::time::Duration;
use thiserror::Error;

/// Problems with the command table itself. Fatal at startup.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("no such command: {0}")]
    UnknownCommand(String),

    #[error("command name must not be empty")]
    EmptyName,

    #[error("duplicate command name: {0}")]
    DuplicateCommand(String),

    #[error("command '{0}' has no description")]
    MissingDescription(String),

    #[error("command '{command}' declares '{name}' more than once")]
    DuplicateParameter { command: String, name: String },

    #[error("command '{command}' option '{name}' has invalid flag '{flag}'")]
    InvalidFlag {
        command: String,
        name: String,
        flag: String,
    },

    #[error("command '{command}' declares required parameter '{param}' after an optional one")]
    RequiredAfterOptional { command: String, param: String },
}

/// A catalog entry could not be turned into a registered tool. Fatal at startup.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("tool '{0}' has no description")]
    MissingDescription(String),

    #[error("tool '{tool}' has an invalid input schema: {reason}")]
    InvalidSchema { tool: String, reason: String },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Per-invocation failures. Always surfaced to the caller, never fatal.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("missing required argument: {param}")]
    MissingArgument { param: String },

    #[error("invalid argument '{param}': {reason}")]
    InvalidArgument { param: String, reason: String },

    #[error(
        "'{binary}' was not found on the search path. Install Homebrew (https://brew.sh) \
         and make sure `{binary}` is on PATH"
    )]
    BinaryNotFound { binary: String },

    #[error("command `{command}` timed out after {}", format_duration(.timeout))]
    Timeout { command: String, timeout: Duration },

    #[error("command `{command}` was cancelled")]
    Cancelled { command: String },

    #[error("{message}")]
    NonZeroExit { exit_code: i32, message: String },

    #[error("failed to spawn '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while running command: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors a registered tool reports back through the registry.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

fn format_duration(duration: &Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{} seconds", duration.as_secs())
    } else {
        format!("{} ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_message() {
        let err = ExecError::Cancelled {
            command: "brew upgrade".into(),
        };
        assert_eq!(err.to_string(), "command `brew upgrade` was cancelled");
    }

    #[test]
    fn test_timeout_message_whole_seconds() {
        let err = ExecError::Timeout {
            command: "brew install wget".into(),
            timeout: Duration::from_secs(60),
        };
        assert_eq!(
            err.to_string(),
            "command `brew install wget` timed out after 60 seconds"
        );
    }

    #[test]
    fn test_timeout_message_millis() {
        let err = ExecError::Timeout {
            command: "brew update".into(),
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().ends_with("after 250 ms"));
    }

    #[test]
    fn test_non_zero_exit_displays_message_only() {
        let err = ExecError::NonZeroExit {
            exit_code: 1,
            message: "bad formula".into(),
        };
        assert_eq!(err.to_string(), "bad formula");
    }

    #[test]
    fn test_binary_not_found_mentions_remedy() {
        let err = ExecError::BinaryNotFound {
            binary: "brew".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("https://brew.sh"));
        assert!(msg.contains("PATH"));
    }

    #[test]
    fn test_tool_error_wraps_exec_transparently() {
        let err: ToolError = ExecError::MissingArgument {
            param: "packages".into(),
        }
        .into();
        assert_eq!(err.to_string(), "missing required argument: packages");
    }
}
