// src/error.rs - Top-level console error and its operator-facing taxonomy
use crate::backend::TransportError;
use crate::config::ConfigError;
use crate::macros::{PlayerError, RecorderError, StoreError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error("recording '{0}' captured no frames; nothing was saved")]
    EmptyRecording(String),
    #[error("{0} requires confirmation")]
    ConfirmationRequired(String),
    #[error("invalid request body: {0}")]
    InvalidRequest(String),
}

/// How a failure is presented to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UserActionConflict,
    EmptyInput,
    TransportFailure,
    MalformedImport,
    LookupMiss,
    Storage,
    Confirmation,
    InvalidRequest,
    Internal,
}

impl ConsoleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsoleError::Config(_) => ErrorKind::Internal,
            ConsoleError::Transport(_) => ErrorKind::TransportFailure,
            ConsoleError::Store(e) => match e {
                StoreError::InvalidFormat(_) => ErrorKind::MalformedImport,
                StoreError::IndexOutOfRange { .. } => ErrorKind::LookupMiss,
                StoreError::Storage(_) | StoreError::Encode(_) => ErrorKind::Storage,
            },
            ConsoleError::Recorder(e) => match e {
                RecorderError::AlreadyRecording | RecorderError::NotRecording => ErrorKind::UserActionConflict,
                RecorderError::Store(_) => ErrorKind::Storage,
            },
            ConsoleError::Player(e) => match e {
                PlayerError::PlaybackInProgress => ErrorKind::UserActionConflict,
                PlayerError::MacroNotFound(_) => ErrorKind::LookupMiss,
                PlayerError::EmptyMacro(_) => ErrorKind::EmptyInput,
                PlayerError::Aborted(_) => ErrorKind::Internal,
            },
            ConsoleError::EmptyRecording(_) => ErrorKind::EmptyInput,
            ConsoleError::ConfirmationRequired(_) => ErrorKind::Confirmation,
            ConsoleError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::InvalidFormat;

    #[test]
    fn test_taxonomy() {
        assert_eq!(
            ConsoleError::from(RecorderError::AlreadyRecording).kind(),
            ErrorKind::UserActionConflict
        );
        assert_eq!(
            ConsoleError::from(PlayerError::MacroNotFound("ghost".into())).kind(),
            ErrorKind::LookupMiss
        );
        assert_eq!(
            ConsoleError::from(StoreError::from(InvalidFormat("x".into()))).kind(),
            ErrorKind::MalformedImport
        );
        assert_eq!(ConsoleError::from(TransportError::NoState).kind(), ErrorKind::TransportFailure);
        assert_eq!(ConsoleError::EmptyRecording("Macro-1".into()).kind(), ErrorKind::EmptyInput);
    }
}
