//! Validation issues and formatting.

use std::fmt;

/// Categorizes validation issues for filtering and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    /// The pipeline has no stages at all.
    NoStages,
    /// A pipe segment with no program (`a || b`, leading or trailing `|`).
    EmptyStage,
    /// A redirect with nothing after it (`ls >`).
    EmptyRedirectTarget,
}

impl IssueCode {
    /// Returns a short code string for the issue.
    pub fn code(&self) -> &'static str {
        match self {
            IssueCode::NoStages => "E001",
            IssueCode::EmptyStage => "E002",
            IssueCode::EmptyRedirectTarget => "E003",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A problem found in a parsed pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Issue category code.
    pub code: IssueCode,
    /// Human-readable message.
    pub message: String,
    /// Stage the issue refers to, if any (0-based).
    pub stage: Option<usize>,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
        }
    }

    /// Attach the stage index.
    pub fn at_stage(mut self, index: usize) -> Self {
        self.stage = Some(index);
        self
    }

    /// Format as `error[E002]: stage 2 has no program`.
    pub fn format(&self) -> String {
        format!("error[{}]: {}", self.code, self.message)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
