//! Chunked batch executor.
//!
//! Items are split into consecutive chunks of `limit` elements. A chunk runs
//! all of its operations concurrently and the next chunk starts only after
//! every member of the current one has finished, so at most `limit`
//! operations are ever in flight. A slow member stalls the following chunk.
//!
//! Operation failures and panics are captured per item and never abort the
//! batch. Results come back in input order.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::error::BatchError;

/// Outcome of one batch item.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem<R> {
    /// Position of the item in the input sequence.
    pub index: usize,
    /// The operation's value, or a description of its failure.
    pub outcome: Result<R, String>,
}

impl<R> BatchItem<R> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Aggregate counts over a finished batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / total`, or 0 for an empty batch.
    pub success_rate: f64,
}

impl BatchSummary {
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(successful: usize, total: usize) -> Self {
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };
        Self {
            total,
            successful,
            failed: total - successful,
            success_rate,
        }
    }
}

/// All item outcomes of a batch, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<R> {
    pub items: Vec<BatchItem<R>>,
}

impl<R> BatchReport<R> {
    pub fn summary(&self) -> BatchSummary {
        let successful = self.items.iter().filter(|i| i.is_success()).count();
        BatchSummary::from_counts(successful, self.items.len())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Runs `op` over `items` with at most `limit` operations in flight.
///
/// `op` receives the item's input index alongside the item. Fails before
/// starting any work when `limit` is not positive.
pub async fn run_batch<T, R, F, Fut>(
    items: Vec<T>,
    limit: i64,
    op: F,
) -> Result<BatchReport<R>, BatchError>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    let chunk_size = usize::try_from(limit)
        .ok()
        .filter(|&n| n > 0)
        .ok_or(BatchError::InvalidConcurrency { limit })?;

    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut pending = items.into_iter().enumerate().peekable();

    while pending.peek().is_some() {
        let chunk: Vec<(usize, T)> = pending.by_ref().take(chunk_size).collect();
        debug!(
            name: "batch.chunk",
            first = chunk.first().map_or(0, |(i, _)| *i),
            size = chunk.len(),
            total,
            "Running batch chunk"
        );

        let running = chunk.into_iter().map(|(index, item)| {
            let fut = op(index, item);
            async move {
                let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(format!("{e:#}")),
                    Err(panic) => Err(panic_message(panic.as_ref())),
                };
                BatchItem { index, outcome }
            }
        });

        results.extend(join_all(running).await);
    }

    Ok(BatchReport { items: results })
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn non_positive_limit_fails_before_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        for limit in [0, -3] {
            let calls = Arc::clone(&calls);
            let err = run_batch(vec![1, 2], limit, move |_, x: i32| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(x) }
            })
            .await
            .unwrap_err();
            assert_eq!(err, BatchError::InvalidConcurrency { limit });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_input_order_and_bounds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let delays: Vec<u64> = vec![50, 10, 40, 5, 30, 20, 1];

        let report = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            run_batch(delays.clone(), 3, move |index, delay| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok((index, delay))
                }
            })
            .await
            .unwrap()
        };

        assert_eq!(report.len(), delays.len());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        for (position, item) in report.items.iter().enumerate() {
            assert_eq!(item.index, position);
            assert_eq!(item.outcome, Ok((position, delays[position])));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn next_chunk_waits_for_slowest_member() {
        let started = Arc::new(std::sync::Mutex::new(Vec::new()));
        let begin = tokio::time::Instant::now();

        {
            let started = Arc::clone(&started);
            run_batch(vec![100_u64, 1, 1], 2, move |index, delay| {
                let started = Arc::clone(&started);
                async move {
                    started.lock().unwrap().push((index, begin.elapsed()));
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    Ok(())
                }
            })
            .await
            .unwrap();
        }

        let started = started.lock().unwrap();
        let third = started.iter().find(|(i, _)| *i == 2).unwrap().1;
        assert!(third >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn failures_and_panics_are_isolated() {
        let report = run_batch(vec![0, 1, 2, 3], 2, |_, x: u32| async move {
            match x {
                1 => Err(anyhow::anyhow!("boom")),
                2 => panic!("bad item"),
                _ => Ok(x * 10),
            }
        })
        .await
        .unwrap();

        let outcomes: Vec<_> = report.items.iter().map(|i| i.outcome.clone()).collect();
        assert_eq!(
            outcomes,
            vec![
                Ok(0),
                Err("boom".to_string()),
                Err("panicked: bad item".to_string()),
                Ok(30)
            ]
        );

        let summary = report.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 2);
        assert!((summary.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn empty_batch_has_zero_rate() {
        let report = run_batch(Vec::<u8>::new(), 4, |_, x| async move { Ok(x) })
            .await
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.summary(), BatchSummary::from_counts(0, 0));
        assert!(report.summary().success_rate.abs() < f64::EPSILON);
    }
}
