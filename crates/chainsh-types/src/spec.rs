//! Parsed pipeline description.

use std::fmt;
use std::path::{Path, PathBuf};

/// One program invocation within a pipeline: program name followed by its arguments.
///
/// A stage produced from an empty segment (`a || b`, `""`) has no tokens.
/// The parser allows that; validation rejects it before anything runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    argv: Vec<String>,
}

impl Stage {
    /// Create a stage from its tokens.
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// All tokens, program name first.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The program name, if the stage has any tokens.
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    /// Arguments after the program name.
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

impl<S: Into<String>> FromIterator<S> for Stage {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

/// The immutable result of parsing a command line.
///
/// `stdout_path` applies to the final stage only; `stderr_path` applies to
/// every stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSpec {
    stages: Vec<Stage>,
    stdout_path: Option<PathBuf>,
    stderr_path: Option<PathBuf>,
}

impl PipelineSpec {
    /// Create a spec with no redirects.
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            stdout_path: None,
            stderr_path: None,
        }
    }

    /// Set the standard-output redirect target.
    pub fn with_stdout_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_path = Some(path.into());
        self
    }

    /// Set the error-output redirect target.
    pub fn with_stderr_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr_path = Some(path.into());
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stdout_path(&self) -> Option<&Path> {
        self.stdout_path.as_deref()
    }

    pub fn stderr_path(&self) -> Option<&Path> {
        self.stderr_path.as_deref()
    }
}

impl fmt::Display for PipelineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<String> = self.stages.iter().map(ToString::to_string).collect();
        write!(f, "{}", stages.join(" | "))?;
        if let Some(path) = &self.stdout_path {
            write!(f, " > {}", path.display())?;
        }
        if let Some(path) = &self.stderr_path {
            write!(f, " 2> {}", path.display())?;
        }
        Ok(())
    }
}
