use crate::command::ExitCode;
use crate::parser::ParseError;
use std::io;
use thiserror::Error;

/// Everything that can go wrong between reading a line and finishing its pipeline.
///
/// Stage-level variants render as `<stage-name>: <message>`, which is exactly
/// what the shell prints before returning to the prompt.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{0}: command not found")]
    CommandNotFound(String),

    /// The process could not be spawned at all.
    #[error("{name}: {source}")]
    Launch { name: String, source: io::Error },

    /// Non-zero exit status, or death by a signal other than SIGPIPE.
    #[error("{name}: exited with status {code}")]
    StageFailed { name: String, code: ExitCode },

    /// Conduit, relay or redirect file failure.
    #[error("{name}: {source}")]
    Io { name: String, source: io::Error },

    /// A builtin failed. The builtin has already written this message to its
    /// own stderr.
    #[error("{name}: {error:#}")]
    Builtin { name: String, error: anyhow::Error },

    /// Killed because another stage failed first. Never reported.
    #[error("{0}: cancelled")]
    Cancelled(String),
}

impl ShellError {
    pub fn io(name: impl Into<String>, source: io::Error) -> Self {
        ShellError::Io {
            name: name.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ShellError::Cancelled(_))
    }

    /// Whether the failing stage already printed this error itself.
    pub fn is_reported(&self) -> bool {
        matches!(self, ShellError::Builtin { .. })
    }
}
