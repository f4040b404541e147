mod common;

use anyhow::Result;
use futures::StreamExt;
use ssl_checker::certificate::Status;
use ssl_checker::prober::{ProbeResult, Prober};
use ssl_checker::scheduler::Scheduler;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use common::{closed_port, request, silent_listener};

fn scheduler(timeout: Duration, concurrency: usize) -> Result<Scheduler> {
    let prober = Prober::new(timeout, chrono::Duration::days(30))?;
    Ok(Scheduler::new(Arc::new(prober), concurrency))
}

#[tokio::test]
async fn test_every_request_yields_exactly_one_result() -> Result<()> {
    let refused = closed_port().await?;
    let (_listener, silent) = silent_listener().await?;

    let requests = vec![
        request(0, "prod", &refused.to_string()),
        request(1, "prod", &silent.to_string()),
        request(2, "staging", &refused.to_string()),
        request(3, "staging", &silent.to_string()),
        request(4, "staging", &refused.to_string()),
    ];

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let results: Vec<ProbeResult> = scheduler(Duration::from_secs(1), 2)?
        .run(requests.clone(), cancel_rx)
        .collect()
        .await;

    assert_eq!(results.len(), requests.len());
    let indices: HashSet<usize> = results.iter().map(|r| r.request.index).collect();
    assert_eq!(indices.len(), requests.len());

    for result in &results {
        let expected = if result.request.endpoint.port == silent.port() {
            Status::Timeout
        } else {
            Status::ConnectionError
        };
        assert_eq!(result.status, expected, "{}", result.request.hostname);
    }
    Ok(())
}

#[tokio::test]
async fn test_pool_size_is_bounded() -> Result<()> {
    let scheduler = scheduler(Duration::from_secs(1), 50)?;
    assert_eq!(scheduler.pool_size(3), 3);
    assert_eq!(scheduler.pool_size(500), 50);
    assert_eq!(scheduler.pool_size(0), 1);
    Ok(())
}

#[tokio::test]
async fn test_timeouts_are_per_probe_not_global() -> Result<()> {
    let (_listener, silent) = silent_listener().await?;
    let requests: Vec<_> = (0..4)
        .map(|i| request(i, "prod", &silent.to_string()))
        .collect();

    // Two slots and four hung targets: two waves of one timeout each
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let start = Instant::now();
    let results: Vec<ProbeResult> = scheduler(Duration::from_millis(500), 2)?
        .run(requests, cancel_rx)
        .collect()
        .await;
    let elapsed = start.elapsed();

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.status == Status::Timeout));
    assert!(elapsed >= Duration::from_millis(1000), "took {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "took {:?}", elapsed);
    Ok(())
}

#[tokio::test]
async fn test_cancellation_abandons_outstanding_probes() -> Result<()> {
    let (_listener, silent) = silent_listener().await?;
    let requests: Vec<_> = (0..3)
        .map(|i| request(i, "prod", &silent.to_string()))
        .collect();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut completions = scheduler(Duration::from_secs(30), 3)?.run(requests, cancel_rx);

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel_tx.send(true)?;

    let start = Instant::now();
    let mut delivered = 0;
    while completions.next().await.is_some() {
        delivered += 1;
    }

    assert_eq!(delivered, 0, "no result is fabricated for abandoned probes");
    assert!(start.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[tokio::test]
async fn test_dropped_cancel_sender_does_not_cancel() -> Result<()> {
    let refused = closed_port().await?;
    let (cancel_tx, cancel_rx) = watch::channel(false);
    drop(cancel_tx);

    let results: Vec<ProbeResult> = scheduler(Duration::from_secs(1), 4)?
        .run(vec![request(0, "prod", &refused.to_string())], cancel_rx)
        .collect()
        .await;

    assert_eq!(results.len(), 1);
    Ok(())
}
