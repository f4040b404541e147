//! Result aggregation
//!
//! The [`Aggregator`] is the single consumer of the completion stream and the
//! only writer of [`RunState`]. It publishes snapshots to the live view on a
//! fixed tick rather than per completion, so rendering never sits on the
//! delivery path.

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::certificate::Status;
use crate::error::{EXIT_FAILED, EXIT_INTERRUPTED, EXIT_OK};
use crate::presenter::LiveView;
use crate::prober::ProbeResult;

/// Interval between live view snapshots
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(100);

/// Aggregate state of one run
///
/// Invariants: `completed <= total` and `results.len() == completed`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunState {
    pub total: usize,
    pub completed: usize,
    /// Results in arrival order
    pub results: Vec<ProbeResult>,
    /// Set when the run was interrupted before every probe reported
    pub cancelled: bool,
    #[serde(skip)]
    seen: HashSet<usize>,
}

impl RunState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Records a completion
    ///
    /// Returns `false` and leaves the state untouched for a result whose
    /// request was already recorded or that would exceed `total`.
    pub fn record(&mut self, result: ProbeResult) -> bool {
        if self.completed >= self.total || !self.seen.insert(result.request.index) {
            warn!(
                "Ignoring unexpected result for {} (request #{})",
                result.request.endpoint, result.request.index
            );
            return false;
        }
        self.completed += 1;
        self.results.push(result);
        true
    }

    /// Whether every request has reported
    pub fn is_terminal(&self) -> bool {
        self.completed == self.total
    }

    /// Result for a request index, if it has completed
    pub fn result_for(&self, index: usize) -> Option<&ProbeResult> {
        self.results.iter().find(|r| r.request.index == index)
    }

    /// Results ordered by request position
    pub fn ordered_results(&self) -> Vec<&ProbeResult> {
        let mut results: Vec<&ProbeResult> = self.results.iter().collect();
        results.sort_by_key(|r| r.request.index);
        results
    }

    pub fn summary(&self) -> RunSummary {
        let mut by_status = BTreeMap::new();
        for result in &self.results {
            *by_status.entry(result.status).or_insert(0) += 1;
        }

        let count = |pred: fn(Status) -> bool| {
            self.results.iter().filter(|r| pred(r.status)).count()
        };

        RunSummary {
            total: self.total,
            completed: self.completed,
            passed: count(|s| !s.is_failure()),
            warnings: count(Status::is_warning),
            failed: count(Status::is_failure),
            chain_issues: self.results.iter().filter(|r| r.chain_issue.is_some()).count(),
            by_status,
        }
    }

    /// Process exit code for this run
    ///
    /// Interrupted runs exit with 130; otherwise any expired, unreachable or
    /// timed out target fails the run. Warnings never do.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            EXIT_INTERRUPTED
        } else if self.results.iter().any(|r| r.status.is_failure()) {
            EXIT_FAILED
        } else {
            EXIT_OK
        }
    }
}

/// Counts derived from a [`RunState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    /// Results that do not fail the run, warnings included
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    pub chain_issues: usize,
    pub by_status: BTreeMap<Status, usize>,
}

/// How a run ended
#[derive(Debug)]
pub struct Outcome {
    pub state: RunState,
    /// The live view failed and the caller must fall back to the final report
    pub display_failed: bool,
}

/// Single consumer of probe completions
pub struct Aggregator {
    state: RunState,
    live: Option<LiveView>,
}

impl Aggregator {
    /// Creates an aggregator for `total` requests, optionally driving a live view
    pub fn new(total: usize, live: Option<LiveView>) -> Self {
        Self {
            state: RunState::new(total),
            live,
        }
    }

    /// Consumes completions until the stream ends
    ///
    /// When `interrupt` resolves, cancellation is broadcast on `cancel` and
    /// the remaining tail of the stream is still drained, so every result
    /// delivered before the scheduler stopped is kept.
    pub async fn collect<S, F>(
        mut self,
        mut completions: S,
        interrupt: F,
        cancel: watch::Sender<bool>,
    ) -> Outcome
    where
        S: Stream<Item = ProbeResult> + Unpin,
        F: Future,
    {
        let mut interrupt = std::pin::pin!(interrupt);
        let mut interrupted = false;
        let mut dirty = false;
        let mut display_failed = false;
        let mut ticker = tokio::time::interval(PUBLISH_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    warn!(
                        "Interrupted with {}/{} probes complete",
                        self.state.completed, self.state.total
                    );
                    let _ = cancel.send(true);
                }

                next = completions.next() => {
                    let Some(result) = next else { break };
                    debug!(
                        "Completion {}/{}: {} {}",
                        self.state.completed + 1,
                        self.state.total,
                        result.request.endpoint,
                        result.status
                    );
                    dirty |= self.state.record(result);
                }

                _ = ticker.tick(), if dirty && self.live.is_some() => {
                    dirty = false;
                    self.publish(&mut display_failed);
                }
            }
        }

        self.state.cancelled = interrupted && !self.state.is_terminal();

        if let Some(live) = self.live.take() {
            if let Err(e) = live.finish(&self.state).await {
                warn!("Live view failed, falling back to the final report: {}", e);
                display_failed = true;
            }
        }

        info!(
            "Run finished: {}/{} completed{}",
            self.state.completed,
            self.state.total,
            if self.state.cancelled { " (interrupted)" } else { "" }
        );

        Outcome {
            state: self.state,
            display_failed,
        }
    }

    fn publish(&mut self, display_failed: &mut bool) {
        let Some(live) = &self.live else { return };
        if !live.publish(&self.state) {
            // The render task is gone; keep collecting without it
            *display_failed = true;
            if let Some(live) = self.live.take() {
                live.abandon();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::file_backed_term;
    use crate::resolver::ProbeRequest;
    use crate::validation::Endpoint;
    use chrono::Utc;
    use std::sync::Arc;
    use tokio_stream::wrappers::ReceiverStream;

    fn result(index: usize, status: Status) -> ProbeResult {
        ProbeResult {
            request: ProbeRequest {
                index,
                environment: "prod".to_string(),
                hostname: format!("host{}.example.com", index),
                endpoint: Endpoint {
                    host: format!("host{}.example.com", index),
                    port: 443,
                },
            },
            status,
            certificate: None,
            chain_issue: None,
            error_detail: None,
            peer: None,
            elapsed_ms: 1,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_keeps_invariants() {
        let mut state = RunState::new(2);
        assert!(!state.is_terminal());
        assert!(state.record(result(1, Status::Valid)));
        assert!(!state.record(result(1, Status::Valid)), "duplicate index");
        assert!(state.record(result(0, Status::Timeout)));
        assert!(!state.record(result(2, Status::Valid)), "beyond total");

        assert_eq!(state.completed, 2);
        assert_eq!(state.results.len(), state.completed);
        assert!(state.is_terminal());

        let order: Vec<usize> = state.ordered_results().iter().map(|r| r.request.index).collect();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_summary_counts() {
        let mut state = RunState::new(4);
        state.record(result(0, Status::Valid));
        state.record(result(1, Status::ExpiringSoon));
        state.record(result(2, Status::Expired));
        state.record(result(3, Status::NotYetValid));

        let summary = state.summary();
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.warnings, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.by_status.get(&Status::Expired), Some(&1));
        assert_eq!(summary.by_status.get(&Status::Timeout), None);
    }

    #[test]
    fn test_exit_code_policy() {
        let mut state = RunState::new(2);
        state.record(result(0, Status::Valid));
        state.record(result(1, Status::ExpiringSoon));
        assert_eq!(state.exit_code(), EXIT_OK);

        let mut state = RunState::new(1);
        state.record(result(0, Status::ConnectionError));
        assert_eq!(state.exit_code(), EXIT_FAILED);

        let mut state = RunState::new(3);
        state.record(result(0, Status::Valid));
        state.cancelled = true;
        assert_eq!(state.exit_code(), EXIT_INTERRUPTED);
    }

    #[tokio::test]
    async fn test_collect_drains_stream() {
        let results = vec![
            result(2, Status::Valid),
            result(0, Status::Expired),
            result(1, Status::Timeout),
        ];
        let (cancel_tx, _cancel_rx) = watch::channel(false);

        let outcome = Aggregator::new(3, None)
            .collect(
                futures::stream::iter(results),
                std::future::pending::<()>(),
                cancel_tx,
            )
            .await;

        assert!(outcome.state.is_terminal());
        assert!(!outcome.state.cancelled);
        assert!(!outcome.display_failed);
        assert_eq!(outcome.state.exit_code(), EXIT_FAILED);
    }

    #[tokio::test]
    async fn test_interrupt_broadcasts_cancellation() {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tx.send(result(0, Status::Valid)).await.unwrap();

        // The stream stays open until the cancellation is observed
        let mut watcher = cancel_rx.clone();
        tokio::spawn(async move {
            let _ = watcher.wait_for(|cancelled| *cancelled).await;
            drop(tx);
        });

        let outcome = Aggregator::new(3, None)
            .collect(
                ReceiverStream::new(rx),
                tokio::time::sleep(Duration::from_millis(50)),
                cancel_tx,
            )
            .await;

        assert!(*cancel_rx.borrow());
        assert!(outcome.state.cancelled);
        assert_eq!(outcome.state.completed, 1);
        assert_eq!(outcome.state.exit_code(), EXIT_INTERRUPTED);
    }

    #[tokio::test]
    async fn test_display_failure_keeps_every_result() {
        let results: Vec<ProbeResult> = (0..4)
            .map(|i| result(i, if i % 2 == 0 { Status::Valid } else { Status::Timeout }))
            .collect();
        let requests: Arc<[ProbeRequest]> = results.iter().map(|r| r.request.clone()).collect();
        let live = LiveView::spawn_on(file_backed_term(), requests);

        // Spaced past the publish interval so snapshots are pushed between results
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tokio::spawn(async move {
            for r in results.into_iter().rev() {
                tokio::time::sleep(PUBLISH_INTERVAL + Duration::from_millis(20)).await;
                if tx.send(r).await.is_err() {
                    break;
                }
            }
        });

        let (cancel_tx, _cancel_rx) = watch::channel(false);
        let outcome = Aggregator::new(4, Some(live))
            .collect(ReceiverStream::new(rx), std::future::pending::<()>(), cancel_tx)
            .await;

        assert!(outcome.display_failed);
        assert!(outcome.state.is_terminal());
        assert!(!outcome.state.cancelled);
        let indices: Vec<usize> = outcome
            .state
            .ordered_results()
            .iter()
            .map(|r| r.request.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(outcome.state.exit_code(), EXIT_FAILED);
    }

    #[tokio::test]
    async fn test_failed_finish_falls_back_to_report() {
        let results = vec![result(0, Status::Valid), result(1, Status::Expired)];
        let requests: Arc<[ProbeRequest]> = results.iter().map(|r| r.request.clone()).collect();
        let live = LiveView::spawn_on(file_backed_term(), requests);
        let (cancel_tx, _cancel_rx) = watch::channel(false);

        let outcome = Aggregator::new(2, Some(live))
            .collect(
                futures::stream::iter(results),
                std::future::pending::<()>(),
                cancel_tx,
            )
            .await;

        assert!(outcome.display_failed);
        assert_eq!(outcome.state.completed, 2);
        assert_eq!(
            outcome.state.result_for(1).map(|r| r.status),
            Some(Status::Expired)
        );
    }
}
