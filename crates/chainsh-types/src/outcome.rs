//! Results reported by finished pipeline stages.

use std::sync::Arc;

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// The process ran and exited. Signal terminations are reported as
    /// `128 + signal`, the way shells do.
    Exited { code: i32 },
    /// The process could not be spawned, or its I/O or wait failed.
    Failed { reason: String },
    /// The stage was killed by `stop`.
    Stopped,
}

impl StageStatus {
    /// True when the process exited with code 0.
    pub fn success(&self) -> bool {
        matches!(self, StageStatus::Exited { code: 0 })
    }

    /// Exit code, if the process ran to completion.
    pub fn code(&self) -> Option<i32> {
        match self {
            StageStatus::Exited { code } => Some(*code),
            _ => None,
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Exited { code } => write!(f, "exited with code {}", code),
            StageStatus::Failed { reason } => write!(f, "failed: {}", reason),
            StageStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything a stage hands back to the orchestrator when it finishes.
///
/// `stdout` is shared: the next stage reads it as its input without copying.
/// Both line buffers are empty for a stream that was redirected to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// Position of the stage in the pipeline.
    pub index: usize,
    /// Program name and arguments the stage ran with.
    pub argv: Vec<String>,
    pub status: StageStatus,
    pub stdout: Arc<Vec<String>>,
    pub stderr: Vec<String>,
}

impl StageOutcome {
    /// An outcome with no captured output.
    pub fn new(index: usize, argv: Vec<String>, status: StageStatus) -> Self {
        Self {
            index,
            argv,
            status,
            stdout: Arc::new(Vec::new()),
            stderr: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status.success()
    }
}
