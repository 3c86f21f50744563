//! Error types shared by the dockling crates.
//!
//! Errors are split by where they originate:
//! - [`EngineError`]: a single call against the container engine failed.
//! - [`DocklingError`]: what callers of the library see, carrying the identity
//!   of the container, command, image or network involved.

use std::io;
use thiserror::Error;

/// Result alias used throughout dockling.
pub type DocklingResult<T> = Result<T, DocklingError>;

/// Result alias for raw engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of a single container engine API call.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced container, exec, image or network does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The engine answered with an error status.
    #[error("engine API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The engine could not be reached or the connection broke down.
    #[error("transport: {0}")]
    Transport(String),

    /// I/O failure on an engine connection.
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// The engine answered with something we cannot make sense of.
    #[error("unexpected engine response: {0}")]
    Unexpected(String),
}

impl EngineError {
    /// Check whether this error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
            || matches!(self, EngineError::Api { status: 404, .. })
    }
}

/// Errors surfaced by the dockling library.
#[derive(Debug, Error)]
pub enum DocklingError {
    /// An option was rejected before any engine call was made.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The container to execute a command in cannot be inspected.
    #[error("cannot execute into container {container}: {source}")]
    Precondition {
        container: String,
        #[source]
        source: EngineError,
    },

    /// An engine call failed; `context` names the operation and entity.
    #[error("{context}: {source}")]
    Engine {
        context: String,
        #[source]
        source: EngineError,
    },

    /// Checking for or pulling an image failed.
    #[error("image {reference}: {source}")]
    Image {
        reference: String,
        #[source]
        source: EngineError,
    },

    /// The container is in a state from which it will not get a PID anymore.
    #[error("cannot determine PID of container {container} in state {status:?}")]
    TerminalState { container: String, status: String },

    /// The executed command finished before its PID could be picked up.
    #[error("command has already terminated")]
    AlreadyTerminated,

    /// The engine still reports a command as running after its streams closed.
    #[error("command execution {exec} still alive when it should not")]
    StillRunning { exec: String },

    /// The caller cancelled while we were waiting or polling.
    #[error("operation cancelled")]
    Cancelled,
}

impl DocklingError {
    /// Wrap an engine error with the operation and entity it concerns.
    pub fn engine(context: impl Into<String>, source: EngineError) -> Self {
        DocklingError::Engine {
            context: context.into(),
            source,
        }
    }

    /// Check whether this error was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DocklingError::Cancelled)
    }

    /// Check whether the underlying engine error reports a missing entity.
    pub fn is_not_found(&self) -> bool {
        match self {
            DocklingError::Precondition { source, .. }
            | DocklingError::Engine { source, .. }
            | DocklingError::Image { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected_through_wrapping() {
        let err = DocklingError::engine(
            "cannot inspect container \"foo\"/0123456789",
            EngineError::NotFound("foo".into()),
        );
        assert!(err.is_not_found());

        let err = DocklingError::engine(
            "cannot start container",
            EngineError::Api {
                status: 404,
                message: "no such container".into(),
            },
        );
        assert!(err.is_not_found());

        let err = DocklingError::engine(
            "cannot start container",
            EngineError::Api {
                status: 500,
                message: "boom".into(),
            },
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn already_terminated_message_is_stable() {
        assert_eq!(
            DocklingError::AlreadyTerminated.to_string(),
            "command has already terminated"
        );
    }
}
