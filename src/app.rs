//! Run entry point
//!
//! Wires the pieces together: resolve targets, start the scheduler, consume
//! completions in the aggregator and print the final output. All settings
//! come from the [`RunConfig`] passed in; nothing here reads global state.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::aggregator::{Aggregator, RunState};
use crate::cli::OutputFormat;
use crate::config::RunConfig;
use crate::error::EXIT_FAILED;
use crate::presenter::{render_json, render_report, summary_line, LiveView};
use crate::prober::Prober;
use crate::resolver::{resolve, ProbeRequest};
use crate::scheduler::Scheduler;

/// Message printed when no target survives resolution
pub const NOTHING_TO_DO: &str = "Nothing to do: no targets configured for the selected environments";

/// Outcome of [`execute`] before anything is printed
#[derive(Debug)]
pub enum RunReport {
    /// The resolved request list was empty; the scheduler never ran
    NothingToDo,
    /// Probing ran; the state holds every collected result
    Completed {
        state: RunState,
        display_failed: bool,
    },
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunReport::NothingToDo => EXIT_FAILED,
            RunReport::Completed { state, .. } => state.exit_code(),
        }
    }
}

/// Resolves, probes and aggregates without printing the final report
///
/// `interrupt` resolving cancels outstanding probes; results gathered until
/// then are kept. Configuration errors are returned before any network
/// activity.
pub async fn execute<F: Future>(config: &RunConfig, interrupt: F) -> Result<RunReport> {
    let requests = resolve(
        &config.targets,
        config.environments.as_ref(),
        config.default_port,
    )
    .await
    .context("Failed to resolve targets")?;

    if requests.is_empty() {
        info!("Empty query... nothing to do");
        return Ok(RunReport::NothingToDo);
    }

    let prober = Arc::new(Prober::from_config(config)?);
    let scheduler = Scheduler::new(prober, config.concurrency);
    let requests: Arc<[ProbeRequest]> = requests.into();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let completions = scheduler.run(requests.to_vec(), cancel_rx);

    let live = (!config.silent).then(|| LiveView::spawn(Arc::clone(&requests)));
    let outcome = Aggregator::new(requests.len(), live)
        .collect(completions, interrupt, cancel_tx)
        .await;

    Ok(RunReport::Completed {
        state: outcome.state,
        display_failed: outcome.display_failed,
    })
}

/// Runs a full check and prints its output, returning the exit code
pub async fn run<F: Future>(config: &RunConfig, interrupt: F) -> Result<i32> {
    if config.silent && config.output == OutputFormat::Table {
        eprintln!("Processing query!");
    }

    let report = execute(config, interrupt).await?;

    match &report {
        RunReport::NothingToDo => println!("{}", NOTHING_TO_DO),
        RunReport::Completed {
            state,
            display_failed,
        } => match config.output {
            OutputFormat::Json => println!(
                "{}",
                render_json(state).context("Failed to serialize results")?
            ),
            OutputFormat::Table if config.silent || *display_failed => {
                print!("{}", render_report(state))
            }
            OutputFormat::Table => println!("{}", summary_line(&state.summary(), state.cancelled)),
        },
    }

    Ok(report.exit_code())
}
