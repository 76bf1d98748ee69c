//! chainsh-kernel: runs `a | b > out 2> err` pipelines without a shell.
//!
//! This crate provides:
//!
//! - **Parser**: splits a command line into stages and redirect targets
//! - **Validator**: structural checks with coded issues
//! - **Scheduler**: stage processes and the orchestrator that chains them
//! - **Config**: spawn settings loaded from `~/.config/chainsh/config.toml`

pub mod config;
pub mod error;
pub mod parser;
pub mod scheduler;
pub mod validator;

pub use config::OrchestratorConfig;
pub use error::{ParseError, PipelineError, PipelineResult};
pub use parser::{parse, parse_pipeline_file};
pub use scheduler::{Orchestrator, PipelineEvent};
pub use validator::{IssueCode, ValidationIssue, ValidationReport, validate};

// Data types, for callers that only depend on the kernel
pub use chainsh_types::{PipelineSpec, Stage, StageOutcome, StageStatus};
