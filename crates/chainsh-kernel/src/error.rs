//! Error types for parsing, validation and orchestration.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for orchestrator operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// The command line could not be split into stages and redirects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("multiple standard-output redirects ({count} found, at most 1 allowed)")]
    MultipleStdoutRedirects { count: usize },
    #[error("multiple error-output redirects ({count} found, at most 1 allowed)")]
    MultipleStderrRedirects { count: usize },
}

/// Errors surfaced synchronously to callers of the orchestrator.
///
/// Failures inside a running stage are not errors at this level; they are
/// reported as [`chainsh_types::StageStatus::Failed`] in the stage outcome.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("invalid command: {}", reasons.join(", "))]
    InvalidCommand { reasons: Vec<String> },
    #[error("cannot open redirect target {}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("pipeline is already running")]
    AlreadyRunning,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Validation reasons, when construction failed validation.
    pub fn reasons(&self) -> &[String] {
        match self {
            PipelineError::InvalidCommand { reasons } => reasons,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_command_lists_every_reason() {
        let err = PipelineError::InvalidCommand {
            reasons: vec!["stage 1 has no program".into(), "stage 2 has no program".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid command: stage 1 has no program, stage 2 has no program"
        );
        assert_eq!(err.reasons().len(), 2);
    }

    #[test]
    fn parse_errors_convert() {
        let err: PipelineError = ParseError::MultipleStdoutRedirects { count: 2 }.into();
        assert!(matches!(err, PipelineError::Parse(_)));
        assert!(err.reasons().is_empty());
    }
}
