//! Error handling for archstep
//!
//! Core modules return [`InstallError`]. Steps and the orchestrator wrap these
//! in `anyhow` with context; `main` digs the original `InstallError` back out of
//! the chain to pick the exit code.

use thiserror::Error;

/// Main error type for the installer
#[derive(Error, Debug)]
pub enum InstallError {
    /// IO errors (progress file, target filesystem, terminal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Interactive prompt failed (no TTY, interrupted read)
    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// Configuration errors (validation, missing keys)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Progress file errors that cannot be recovered by discarding the file
    #[error("Progress error: {0}")]
    Progress(String),

    /// The program could not be spawned because it does not exist
    #[error("Command not found: {program}")]
    CommandNotFound { program: String },

    /// The program ran and exited unsuccessfully after all attempts
    #[error("Command failed after {attempts} attempt(s) (exit code {}): {command}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        attempts: u32,
        stdout: String,
        stderr: String,
    },

    /// A critical verification failed and the user chose not to continue
    #[error("Aborted after failed verification: {check}")]
    VerificationAborted { check: String },

    /// The user declined a confirmation; not a failure
    #[error("Declined by user: {prompt}")]
    Declined { prompt: String },

    /// Step sequencing errors
    #[error("Install transition error: {0}")]
    InstallTransition(String),
}

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, InstallError>;

impl InstallError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a progress error
    pub fn progress(msg: impl Into<String>) -> Self {
        Self::Progress(msg.into())
    }

    /// Create a declined-confirmation error
    pub fn declined(prompt: impl Into<String>) -> Self {
        Self::Declined {
            prompt: prompt.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Declining a confirmation ends the run cleanly; everything else is a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Declined { .. } => 0,
            _ => 1,
        }
    }

    /// Find the first `InstallError` in an `anyhow` chain.
    pub fn find_in(err: &anyhow::Error) -> Option<&InstallError> {
        err.chain().find_map(|cause| cause.downcast_ref::<InstallError>())
    }
}
