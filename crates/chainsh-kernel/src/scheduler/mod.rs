//! Scheduler module for chainsh — stage processes and the orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Orchestrator                           │
//! │   start ─▶ spawn stage 0                                     │
//! │                 │ StageMessage (mpsc)                        │
//! │                 ▼                                            │
//! │            driver task ─▶ spawn stage 1 (stdin = stage 0 out)│
//! │                 │ StageMessage                               │
//! │                 ▼                                            │
//! │            driver task ─▶ … ─▶ idle (watch: running=false)   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stages never overlap. Each buffers its whole output before the next one
//! starts.

mod orchestrator;
mod sink;
mod stage;

pub use orchestrator::{Orchestrator, PipelineEvent};
pub use sink::{FileSink, LineSink, RedirectMode};
pub use stage::{StageHandle, StageMessage, StageProcess};
