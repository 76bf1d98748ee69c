//! chainsh CLI entry point.
//!
//! Usage:
//!   chainsh <command>            # Run a pipeline and print its output
//!   chainsh -c <command>         # Same, explicit
//!   chainsh -f <file>            # Run the pipeline written in a file
//!   chainsh --parse <command>    # Show how a command is parsed

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use chainsh_kernel::{
    Orchestrator, OrchestratorConfig, PipelineError, PipelineSpec, StageStatus, parse,
    parse_pipeline_file,
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

/// What the user asked for.
enum Mode {
    Run(String),
    RunFile(PathBuf),
    Parse(String),
    Help,
    Version,
}

struct Args {
    mode: Mode,
    config: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut config = None;
    let mut mode = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if let Some(path) = arg.strip_prefix("--config=") {
            config = Some(path.into());
            continue;
        }
        let next = match arg.as_str() {
            "-h" | "--help" => Mode::Help,
            "-V" | "--version" => Mode::Version,
            "-c" => Mode::Run(iter.next().context("-c requires a command argument")?.clone()),
            "-f" => Mode::RunFile(iter.next().context("-f requires a file argument")?.into()),
            "--parse" => Mode::Parse(iter.next().context("--parse requires a command argument")?.clone()),
            "--config" => {
                config = Some(iter.next().context("--config requires a path")?.into());
                continue;
            }
            other if other.starts_with('-') => bail!("Unknown option: {other}"),
            command => Mode::Run(command.to_string()),
        };
        if mode.replace(next).is_some() {
            bail!("Only one command may be given");
        }
    }

    Ok(Args {
        mode: mode.unwrap_or(Mode::Help),
        config,
    })
}

fn run() -> Result<ExitCode> {
    let argv: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("Run 'chainsh --help' for usage.");
            return Ok(ExitCode::FAILURE);
        }
    };

    let spec = match args.mode {
        Mode::Help => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        Mode::Version => {
            println!("chainsh {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        Mode::Parse(command) => return Ok(print_parse(&command)),
        Mode::Run(command) => parse(&command).map_err(PipelineError::from),
        Mode::RunFile(path) => parse_pipeline_file(&path),
    };

    let config = OrchestratorConfig::resolve(args.config.as_deref())?;

    let pipeline = match spec.and_then(|spec| Orchestrator::from_spec(spec, config)) {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(report_error(&e)),
    };

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(run_pipeline(&pipeline))
}

/// Start the pipeline, wait for it (or Ctrl-C), and print the final output.
async fn run_pipeline(pipeline: &Orchestrator) -> Result<ExitCode> {
    if let Err(e) = pipeline.start().await {
        return Ok(report_error(&e));
    }

    tokio::select! {
        _ = pipeline.wait() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("interrupted, stopping pipeline");
            pipeline.stop().await;
        }
    }

    for line in pipeline.stdout_lines().await {
        println!("{line}");
    }
    for line in pipeline.stderr_lines().await {
        eprintln!("{line}");
    }

    let code = match pipeline.final_outcome().await.map(|o| o.status) {
        Some(StageStatus::Exited { code }) => u8::try_from(code).unwrap_or(1),
        Some(StageStatus::Failed { reason }) => {
            eprintln!("chainsh: {reason}");
            127
        }
        // Stopped before the last stage finished.
        Some(StageStatus::Stopped) | None => 130,
    };
    Ok(ExitCode::from(code))
}

fn report_error(err: &PipelineError) -> ExitCode {
    match err {
        PipelineError::InvalidCommand { reasons } => {
            eprintln!("Invalid command:");
            for reason in reasons {
                eprintln!("  - {reason}");
            }
        }
        other => eprintln!("chainsh: {other}"),
    }
    ExitCode::FAILURE
}

fn print_parse(command: &str) -> ExitCode {
    match parse(command) {
        Ok(spec) => {
            print!("{}", describe(&spec));
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e.into()),
    }
}

fn describe(spec: &PipelineSpec) -> String {
    let mut out = String::new();
    for stage in spec.stages() {
        out.push_str(&format!("Program call: {stage}\n"));
    }
    if let Some(path) = spec.stdout_path() {
        out.push_str(&format!("Standard output: {}\n", path.display()));
    }
    if let Some(path) = spec.stderr_path() {
        out.push_str(&format!("Error output: {}\n", path.display()));
    }
    out
}

fn print_help() {
    println!(r#"chainsh v{}

Usage:
  chainsh <command>            Run a pipeline and print its output
  chainsh -c <command>         Run a pipeline (explicit form)
  chainsh -f <file>            Run the pipeline in a file
  chainsh --parse <command>    Show stages and redirects without running

Options:
  --config <path>              Config file (default: ~/.config/chainsh/config.toml)
  -h, --help                   Show this help
  -V, --version                Show version

Syntax:
  a | b                        stdout of a feeds stdin of b
  cmd > path                   final stage's stdout goes to path
  cmd 2> path                  every stage's stderr goes to path

Examples:
  chainsh 'ls -l | sort | head -n 3'
  chainsh 'echo hi | wc -c > count.txt 2> errors.txt'
"#, env!("CARGO_PKG_VERSION"));
}
