//! Probe scheduling
//!
//! Requests are fed into a bounded pool (`buffer_unordered`) so that at most
//! `concurrency` probes are in flight. Completions are forwarded to a single
//! channel in completion order; the consumer owns any ordering concerns.

use futures::{stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, info_span, Instrument};

use crate::prober::{ProbeResult, Prober};
use crate::resolver::ProbeRequest;

/// Fans probe requests out to a bounded number of concurrent probes
pub struct Scheduler {
    prober: Arc<Prober>,
    concurrency: usize,
}

impl Scheduler {
    /// Creates a scheduler with the given in-flight ceiling
    pub fn new(prober: Arc<Prober>, concurrency: usize) -> Self {
        Self {
            prober,
            concurrency: concurrency.max(1),
        }
    }

    /// Effective pool size for a run of `total` requests
    pub fn pool_size(&self, total: usize) -> usize {
        self.concurrency.min(total).max(1)
    }

    /// Starts probing and returns the stream of completions
    ///
    /// The stream yields exactly one result per request unless `cancel` flips
    /// to `true`, in which case outstanding probes are dropped (closing their
    /// connections) and the stream ends after the results already delivered.
    /// A dropped cancellation sender does not cancel the run.
    pub fn run(
        &self,
        requests: Vec<ProbeRequest>,
        mut cancel: watch::Receiver<bool>,
    ) -> ReceiverStream<ProbeResult> {
        let total = requests.len();
        let pool_size = self.pool_size(total);
        // Sized to hold every result so probes never wait on a slow consumer
        let (tx, rx) = mpsc::channel(total.max(1));
        let prober = Arc::clone(&self.prober);

        info!(
            "Scheduling {} probes with {} concurrent slots, {:?} timeout each",
            total,
            pool_size,
            prober.timeout()
        );

        tokio::spawn(async move {
            if *cancel.borrow_and_update() {
                info!("Run cancelled before probing started");
                return;
            }

            let mut completions = stream::iter(requests)
                .map(move |request| {
                    let prober = Arc::clone(&prober);
                    let span = info_span!(
                        "probe",
                        environment = %request.environment,
                        host = %request.endpoint
                    );
                    async move { prober.probe(request).await }.instrument(span)
                })
                .buffer_unordered(pool_size);

            let mut cancellable = true;
            let mut delivered = 0usize;

            loop {
                tokio::select! {
                    biased;

                    changed = cancel.changed(), if cancellable => {
                        match changed {
                            Ok(()) if *cancel.borrow() => {
                                info!(
                                    "Cancellation requested, abandoning {} outstanding probes",
                                    total - delivered
                                );
                                break;
                            }
                            Ok(()) => {}
                            Err(_) => cancellable = false,
                        }
                    }

                    next = completions.next() => {
                        let Some(result) = next else { break };
                        delivered += 1;
                        if tx.send(result).await.is_err() {
                            debug!("Result consumer dropped, stopping scheduler");
                            break;
                        }
                    }
                }
            }

            debug!("Scheduler finished after delivering {} of {} results", delivered, total);
        });

        ReceiverStream::new(rx)
    }
}
