//! Package staging through the `pm install-create` / `install-write` /
//! `install-commit` session protocol.

mod multiple;
mod session;

pub use multiple::{InstallMultiple, InstallOutcome, InstallPhase};
pub use session::{InstallSession, SessionState, StagedFile};

use crate::{Error, ThisError, shell::ShellError};

/// Failure marker the package manager prints when a required split is absent.
pub const INSTALL_FAILED_MISSING_SPLIT: &str = "INSTALL_FAILED_MISSING_SPLIT";

///
/// SessionError
///

#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("install-abandon failed for session {id}: {output}")]
    AbandonFailed { id: String, output: String },

    #[error("install-commit failed for session {id}: {output}")]
    CommitFailed { id: String, output: String },

    #[error("install-create failed: {output}")]
    CreateFailed { output: String },

    #[error("install failed during {phase}: {output}")]
    InstallFailed { phase: InstallPhase, output: String },

    #[error("cannot {op} a session in state {state}")]
    InvalidTransition { op: &'static str, state: SessionState },

    #[error("no session id in install-create output: {output}")]
    MissingSessionId { output: String },

    #[error("install-remove failed for session {id}: {output}")]
    RemoveFailed { id: String, output: String },

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error("cannot stage '{path}': {reason}")]
    StageFile { path: String, reason: String },

    #[error("install was expected to fail with '{expected}' but failed during {phase}: {output}")]
    UnexpectedFailure {
        expected: String,
        phase: InstallPhase,
        output: String,
    },

    #[error("install was expected to fail with '{expected}' but succeeded")]
    UnexpectedSuccess { expected: String },

    #[error("install-write of '{name}' failed for session {id}: {output}")]
    WriteFailed {
        id: String,
        name: String,
        output: String,
    },
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Shell(e) => e.into(),
            SessionError::InvalidTransition { .. } => Self::session(err.to_string()),
            SessionError::UnexpectedFailure { .. } | SessionError::UnexpectedSuccess { .. } => {
                Self::assertion(err.to_string())
            }
            SessionError::StageFile { .. } => Self::harness(err.to_string()),
            _ => Self::shell(err.to_string()),
        }
    }
}
