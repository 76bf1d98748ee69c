//! Pipeline orchestrator: runs stages one after another.
//!
//! ```text
//!   idle ──start──▶ running(cursor=0) ──stage 0 done──▶ running(cursor=1) ─ … ─▶ idle
//!     ▲                                                                       │
//!     └───────────────────────────── stop ───────────────────────────────────┘
//! ```
//!
//! Each run owns a driver task that receives completion messages from stage
//! tasks and advances the cursor. `start`, `stop` and the driver all mutate
//! state under the same mutex, so a `stop` racing a completion is resolved
//! by whoever takes the lock first; the loser sees `running == false` (or a
//! newer generation) and does nothing.

use std::sync::Arc;

use chainsh_types::{PipelineSpec, StageOutcome, StageStatus};
use tokio::sync::{Mutex, broadcast, mpsc, watch};

use super::sink::RedirectMode;
use super::stage::{StageHandle, StageMessage, StageProcess};
use crate::config::OrchestratorConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::parser::parse;
use crate::validator::validate;

/// Progress notifications for observers of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A stage's process was launched.
    StageStarted { index: usize, program: String },
    /// A stage completed and reported its status.
    StageFinished { index: usize, status: StageStatus },
    /// The orchestrator returned to idle. `completed` is false after `stop`
    /// or when a later stage's redirect could not be opened.
    Idle { completed: bool },
}

#[derive(Debug, Default)]
struct State {
    running: bool,
    /// Index of the next stage to spawn.
    cursor: usize,
    /// Bumped on every start; completions from older runs are dropped.
    generation: u64,
    current: Option<StageHandle>,
    /// Present only while running.
    completions: Option<mpsc::UnboundedSender<StageMessage>>,
    outcomes: Vec<StageOutcome>,
}

struct Shared {
    spec: Arc<PipelineSpec>,
    config: Arc<OrchestratorConfig>,
    state: Mutex<State>,
    running: watch::Sender<bool>,
    events: broadcast::Sender<PipelineEvent>,
}

/// Parses, validates and runs a pipeline command line.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> chainsh_kernel::PipelineResult<()> {
/// use chainsh_kernel::Orchestrator;
///
/// let pipeline = Orchestrator::new("echo A | wc -l")?;
/// pipeline.start().await?;
/// pipeline.wait().await;
/// assert_eq!(pipeline.stdout_lines().await.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Build an orchestrator with default configuration.
    pub fn new(command: &str) -> PipelineResult<Self> {
        Self::with_config(command, OrchestratorConfig::default())
    }

    /// Build an orchestrator with the given configuration.
    pub fn with_config(command: &str, config: OrchestratorConfig) -> PipelineResult<Self> {
        let spec = parse(command)?;
        Self::from_spec(spec, config)
    }

    /// Build an orchestrator from an already parsed pipeline.
    pub fn from_spec(spec: PipelineSpec, config: OrchestratorConfig) -> PipelineResult<Self> {
        let report = validate(&spec);
        if !report.is_valid() {
            return Err(PipelineError::InvalidCommand {
                reasons: report.reasons(),
            });
        }

        let (running, _) = watch::channel(false);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Ok(Self {
            shared: Arc::new(Shared {
                spec: Arc::new(spec),
                config: Arc::new(config),
                state: Mutex::new(State::default()),
                running,
                events,
            }),
        })
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.shared.spec
    }

    pub fn is_running(&self) -> bool {
        *self.shared.running.borrow()
    }

    /// Receive [`PipelineEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    /// Spawn the first stage and return immediately.
    ///
    /// Fails if a run is in progress, or if a redirect file for the first
    /// stage cannot be opened; in the latter case nothing is spawned and the
    /// orchestrator stays idle.
    #[tracing::instrument(level = "info", skip(self), fields(pipeline = %self.shared.spec), err)]
    pub async fn start(&self) -> PipelineResult<()> {
        let mut state = self.shared.state.lock().await;
        if state.running {
            return Err(PipelineError::AlreadyRunning);
        }

        let (completions, receiver) = mpsc::unbounded_channel();
        state.running = true;
        state.cursor = 0;
        state.generation += 1;
        state.outcomes.clear();
        state.completions = Some(completions);
        self.shared.running.send_replace(true);

        if let Err(e) = self.shared.process_next_stage(&mut state) {
            self.shared.reset(&mut state, false);
            return Err(e);
        }

        tokio::spawn(drive(self.shared.clone(), state.generation, receiver));
        Ok(())
    }

    /// Kill the running stage and go idle, skipping the remaining stages.
    ///
    /// Safe to call when idle or more than once.
    pub async fn stop(&self) {
        let mut state = self.shared.state.lock().await;
        if !state.running {
            return;
        }

        if let Some(mut current) = state.current.take() {
            tracing::info!(stage = current.index(), "stopping pipeline");
            if let Some(outcome) = current.stop().await {
                self.shared.record(&mut state, outcome);
            }
        }
        self.shared.reset(&mut state, false);
    }

    /// Wait until the orchestrator is idle.
    pub async fn wait(&self) {
        let mut running = self.shared.running.subscribe();
        // Err only if the sender is gone, and it lives as long as `self`.
        let _ = running.wait_for(|running| !*running).await;
    }

    /// Outcomes of the current or most recent run, in stage order.
    pub async fn outcomes(&self) -> Vec<StageOutcome> {
        self.shared.state.lock().await.outcomes.clone()
    }

    /// Outcome of the final stage, once it has finished.
    pub async fn final_outcome(&self) -> Option<StageOutcome> {
        let last = self.shared.spec.stage_count().checked_sub(1)?;
        let state = self.shared.state.lock().await;
        state.outcomes.iter().find(|o| o.index == last).cloned()
    }

    /// Final stage's stdout lines. Empty when redirected to a file.
    pub async fn stdout_lines(&self) -> Vec<String> {
        self.final_outcome()
            .await
            .map(|o| o.stdout.to_vec())
            .unwrap_or_default()
    }

    /// Final stage's stderr lines. Empty when redirected to a file.
    pub async fn stderr_lines(&self) -> Vec<String> {
        self.final_outcome()
            .await
            .map(|o| o.stderr)
            .unwrap_or_default()
    }
}

impl Shared {
    /// Spawn the stage under the cursor, or go idle if none are left.
    fn process_next_stage(&self, state: &mut State) -> PipelineResult<()> {
        if !state.running {
            return Ok(());
        }

        let index = state.cursor;
        let Some(stage) = self.spec.stages().get(index) else {
            tracing::info!(stages = index, "pipeline finished");
            self.reset(state, true);
            return Ok(());
        };
        let Some(completions) = state.completions.clone() else {
            return Ok(());
        };

        let mut process = StageProcess::new(index, stage, self.config.clone());

        if let Some(path) = self.spec.stderr_path() {
            // Later stages append so every stage's error output survives.
            let mode = if index == 0 {
                RedirectMode::Truncate
            } else {
                RedirectMode::Append
            };
            process.set_stderr_file(path, mode)?;
        }

        if let Some(previous) = state.outcomes.last() {
            process.set_input(previous.stdout.clone());
        }

        if index + 1 == self.spec.stage_count()
            && let Some(path) = self.spec.stdout_path()
        {
            process.set_stdout_file(path)?;
        }

        let program = stage.program().unwrap_or_default().to_string();
        tracing::debug!(stage = index, program = %program, "starting stage");

        state.current = Some(process.spawn(state.generation, completions));
        state.cursor += 1;
        let _ = self
            .events
            .send(PipelineEvent::StageStarted { index, program });

        Ok(())
    }

    fn record(&self, state: &mut State, outcome: StageOutcome) {
        tracing::debug!(stage = outcome.index, status = %outcome.status, "stage completed");
        let _ = self.events.send(PipelineEvent::StageFinished {
            index: outcome.index,
            status: outcome.status.clone(),
        });
        state.outcomes.push(outcome);
    }

    fn reset(&self, state: &mut State, completed: bool) {
        state.running = false;
        state.cursor = 0;
        state.current = None;
        state.completions = None;
        self.running.send_replace(false);
        let _ = self.events.send(PipelineEvent::Idle { completed });
    }
}

/// Advance the run each time a stage reports completion.
///
/// Exits once the run goes idle: the state drops its sender on reset, and
/// the last stage task drops the other one when it returns.
async fn drive(
    shared: Arc<Shared>,
    generation: u64,
    mut receiver: mpsc::UnboundedReceiver<StageMessage>,
) {
    while let Some(message) = receiver.recv().await {
        let mut state = shared.state.lock().await;
        if !state.running || state.generation != generation || message.generation != generation {
            tracing::trace!(stage = message.outcome.index, "ignoring completion from stopped run");
            break;
        }

        shared.record(&mut state, message.outcome);
        if let Err(e) = shared.process_next_stage(&mut state) {
            tracing::warn!(error = %e, stage = state.cursor, "cannot start next stage");
            shared.reset(&mut state, false);
        }
        if !state.running {
            break;
        }
    }
}
