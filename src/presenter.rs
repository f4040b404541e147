//! Terminal presentation
//!
//! Two surfaces exist. The [`LiveView`] redraws an environment-grouped table
//! in place from snapshots published by the aggregator. The final report is a
//! plain listing grouped by environment and status, followed by a pass/fail
//! summary; it is printed in silent mode and whenever the live view fails.

use console::{style, truncate_str, Term};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::aggregator::{RunState, RunSummary};
use crate::certificate::Status;
use crate::prober::ProbeResult;
use crate::resolver::ProbeRequest;

const DETAIL_WIDTH: usize = 60;
const ISSUER_WIDTH: usize = 32;

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Environment")]
    environment: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Expires")]
    expires: String,
    #[tabled(rename = "Days")]
    days: String,
    #[tabled(rename = "Issuer")]
    issuer: String,
    #[tabled(rename = "Details")]
    details: String,
}

impl TargetRow {
    fn pending(request: &ProbeRequest) -> Self {
        Self {
            environment: request.environment.clone(),
            target: request.hostname.clone(),
            status: "pending".to_string(),
            expires: String::new(),
            days: String::new(),
            issuer: String::new(),
            details: String::new(),
        }
    }

    /// `compact` shortens issuer and details to fit a live frame
    fn from_result(result: &ProbeResult, compact: bool) -> Self {
        let details = result
            .error_detail
            .as_deref()
            .or(result.chain_issue.as_deref())
            .unwrap_or_default();
        let fit = |text: &str, width: usize| {
            if compact {
                truncate_str(text, width, "…").into_owned()
            } else {
                text.to_string()
            }
        };

        Self {
            environment: result.request.environment.clone(),
            target: result.request.hostname.clone(),
            status: result.status.to_string(),
            expires: result
                .not_after()
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_default(),
            days: result
                .days_remaining()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            issuer: result
                .certificate
                .as_ref()
                .map(|c| fit(&c.issuer, ISSUER_WIDTH))
                .unwrap_or_default(),
            details: fit(details, DETAIL_WIDTH),
        }
    }
}

/// Blanks repeated environment names so each group is labelled once
fn group_labels(rows: &mut [TargetRow]) {
    let mut previous: Option<String> = None;
    for row in rows.iter_mut() {
        if previous.as_deref() == Some(row.environment.as_str()) {
            row.environment.clear();
        } else {
            previous = Some(row.environment.clone());
        }
    }
}

/// Environments in first-seen order of the given requests
fn environment_order<'a>(requests: impl Iterator<Item = &'a ProbeRequest>) -> Vec<&'a str> {
    let mut order: Vec<&str> = Vec::new();
    for request in requests {
        if !order.contains(&request.environment.as_str()) {
            order.push(&request.environment);
        }
    }
    order
}

/// Renders one frame of the live view
///
/// At most `max_rows` target rows are shown; the rest are summarised in a
/// trailing line.
pub fn render_live(requests: &[ProbeRequest], state: &RunState, max_rows: usize) -> String {
    let by_index: HashMap<usize, &ProbeResult> =
        state.results.iter().map(|r| (r.request.index, r)).collect();

    let mut ordered: Vec<&ProbeRequest> = Vec::with_capacity(requests.len());
    for environment in environment_order(requests.iter()) {
        ordered.extend(requests.iter().filter(|r| r.environment == environment));
    }

    let mut rows: Vec<TargetRow> = ordered
        .iter()
        .take(max_rows)
        .map(|request| match by_index.get(&request.index) {
            Some(result) => TargetRow::from_result(result, true),
            None => TargetRow::pending(request),
        })
        .collect();
    group_labels(&mut rows);

    let mut frame = format!(
        "{} {}/{}\n",
        style("Checking certificates").cyan().bold(),
        state.completed,
        state.total
    );
    frame.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    frame.push('\n');
    if ordered.len() > max_rows {
        frame.push_str(&format!("… and {} more targets\n", ordered.len() - max_rows));
    }
    frame
}

/// Renders the closing frame of the live view, listing every target
pub fn render_final(requests: &[ProbeRequest], state: &RunState) -> String {
    render_live(requests, state, usize::MAX)
}

/// Renders the final report grouped by environment, then by status
pub fn render_report(state: &RunState) -> String {
    let results = state.ordered_results();
    let mut report = String::new();

    for environment in environment_order(results.iter().map(|r| &r.request)) {
        let mut in_env: Vec<&ProbeResult> = results
            .iter()
            .copied()
            .filter(|r| r.request.environment == environment)
            .collect();
        in_env.sort_by_key(|r| {
            let rank = Status::ALL.iter().position(|s| *s == r.status);
            (rank, r.request.index)
        });

        let mut rows: Vec<TargetRow> = in_env
            .iter()
            .map(|r| TargetRow::from_result(r, false))
            .collect();
        group_labels(&mut rows);

        report.push_str(&format!(
            "\n{}\n",
            style(format!("━━━ {} ━━━", environment)).cyan().bold()
        ));
        report.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        report.push('\n');
    }

    report.push('\n');
    report.push_str(&summary_line(&state.summary(), state.cancelled));
    report.push('\n');
    report
}

/// One-line pass/fail summary
pub fn summary_line(summary: &RunSummary, cancelled: bool) -> String {
    let mut line = format!(
        "{} targets checked: {} passed ({} warnings), {} failed",
        summary.completed,
        style(summary.passed).green(),
        style(summary.warnings).yellow(),
        style(summary.failed).red()
    );

    if summary.chain_issues > 0 {
        line.push_str(&format!(", {} with chain issues", summary.chain_issues));
    }

    let breakdown: Vec<String> = Status::ALL
        .iter()
        .filter_map(|s| summary.by_status.get(s).map(|n| format!("{} {}", n, s)))
        .collect();
    if !breakdown.is_empty() {
        line.push_str(&format!(" [{}]", breakdown.join(", ")));
    }

    if cancelled {
        line.push_str(&format!(
            "\n{} after {}/{} probes",
            style("Interrupted").red().bold(),
            summary.completed,
            summary.total
        ));
    }
    line
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: RunSummary,
    #[serde(flatten)]
    state: &'a RunState,
}

/// Renders the final run state as a JSON document
pub fn render_json(state: &RunState) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        summary: state.summary(),
        state,
    })
}

/// Live, in-place table of the run
///
/// The render loop runs on its own task and only ever sees the latest
/// snapshot, so a slow terminal delays frames, never results.
pub struct LiveView {
    tx: watch::Sender<Arc<RunState>>,
    handle: JoinHandle<io::Result<()>>,
}

impl LiveView {
    /// Starts the render task on stdout
    pub fn spawn(requests: Arc<[ProbeRequest]>) -> Self {
        Self::spawn_on(Term::stdout(), requests)
    }

    pub fn spawn_on(term: Term, requests: Arc<[ProbeRequest]>) -> Self {
        let (tx, rx) = watch::channel(Arc::new(RunState::new(requests.len())));
        let handle = tokio::spawn(render_loop(term, requests, rx));
        Self { tx, handle }
    }

    /// Publishes a snapshot; `false` once the render task has stopped
    pub fn publish(&self, state: &RunState) -> bool {
        self.tx.send(Arc::new(state.clone())).is_ok()
    }

    /// Draws the final state and waits for the render task
    pub async fn finish(self, state: &RunState) -> io::Result<()> {
        let _ = self.tx.send(Arc::new(state.clone()));
        drop(self.tx);
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        }
    }

    /// Stops the render task without a final frame
    pub fn abandon(self) {
        self.handle.abort();
    }
}

async fn render_loop(
    term: Term,
    requests: Arc<[ProbeRequest]>,
    mut rx: watch::Receiver<Arc<RunState>>,
) -> io::Result<()> {
    if !term.is_term() {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "output is not a terminal",
        ));
    }

    term.hide_cursor()?;
    let mut drawn = 0usize;

    let result = loop {
        let snapshot = Arc::clone(&rx.borrow_and_update());
        let (height, _) = term.size();
        let max_rows = usize::from(height).saturating_sub(8).max(3);

        if let Err(e) = redraw(&term, &mut drawn, &render_live(&requests, &snapshot, max_rows)) {
            break Err(e);
        }

        if rx.changed().await.is_err() {
            // The closing frame is not capped to the screen height
            let last = Arc::clone(&rx.borrow());
            debug!("Live view closed after {} completions", last.completed);
            break redraw(&term, &mut drawn, &render_final(&requests, &last));
        }
    };

    let _ = term.show_cursor();
    result
}

/// Replaces the previously drawn frame with `frame`
fn redraw(term: &Term, drawn: &mut usize, frame: &str) -> io::Result<()> {
    if *drawn > 0 {
        term.clear_last_lines(*drawn)?;
    }
    term.write_str(frame)?;
    *drawn = frame.lines().count();
    Ok(())
}

/// A terminal handle backed by an unlinked temp file, never a TTY
#[cfg(test)]
pub(crate) fn file_backed_term() -> Term {
    let path = std::env::temp_dir().join(format!("ssl_checker_term_{}", uuid::Uuid::new_v4()));
    let write = std::fs::File::create(&path).unwrap();
    let read = std::fs::File::open(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    Term::read_write_pair(read, write)
}
