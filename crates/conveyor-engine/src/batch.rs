//! Bounded-concurrency batch execution.
//!
//! Items are processed in fixed-size batches. Within a batch every item
//! runs concurrently; between batches the processor pauses for a fixed
//! delay so downstream services are not flooded. Results come back in
//! input order, one per item, failures included.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tracing::info;

use conveyor_core::DiagnosticSink;

/// Success/failure tally over one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn tally<U, E>(results: &[std::result::Result<U, E>]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

/// Process `items` in batches of `batch_size`, waiting `delay` between
/// batches (but not after the last). `op` produces a future per item; an
/// `Err` counts as that item's result but never cancels its batch
/// siblings. A zero batch size is treated as one.
pub async fn process_batches<T, U, F, Fut, E>(
    items: Vec<T>,
    mut op: F,
    batch_size: usize,
    delay: Duration,
    diag: &dyn DiagnosticSink,
) -> Vec<std::result::Result<U, E>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = std::result::Result<U, E>>,
    E: std::fmt::Display,
{
    let batch_size = batch_size.max(1);
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut remaining = items.into_iter();

    loop {
        let batch: Vec<T> = remaining.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        if !results.is_empty() {
            diag.emit(&format!(
                "processed {} of {total}, pausing before next batch",
                results.len()
            ));
            tokio::time::sleep(delay).await;
        }

        for result in join_all(batch.into_iter().map(&mut op)).await {
            if let Err(e) = &result {
                diag.emit(&format!("batch item failed: {e}"));
            }
            results.push(result);
        }
    }

    let report = BatchReport::tally(&results);
    info!(
        "📦 batch run complete: {} ok, {} failed",
        report.succeeded, report.failed
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    struct NullSink;
    impl DiagnosticSink for NullSink {
        fn emit(&self, _message: &str) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_concurrency_and_inter_batch_delay() {
        let peak = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let starts = Arc::new(Mutex::new(Vec::new()));
        let delay = Duration::from_millis(100);

        let results = process_batches(
            vec![1, 2, 3, 4, 5],
            |n| {
                let peak = peak.clone();
                let active = active.clone();
                let starts = starts.clone();
                async move {
                    starts.lock().unwrap().push((n, Instant::now()));
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok::<usize, std::io::Error>(n * 2)
                }
            },
            3,
            delay,
            &NullSink,
        )
        .await;

        // Every item processed, results in input order.
        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![2, 4, 6, 8, 10]);
        assert_eq!(peak.load(Ordering::SeqCst), 3);

        // Items 1-3 all start before items 4-5, and at least the delay
        // elapses between the last start of batch one and the first start
        // of batch two.
        let starts = starts.lock().unwrap();
        let batch1_last = starts
            .iter()
            .filter(|(n, _)| *n <= 3)
            .map(|(_, t)| *t)
            .max()
            .unwrap();
        let batch2_first = starts
            .iter()
            .filter(|(n, _)| *n > 3)
            .map(|(_, t)| *t)
            .min()
            .unwrap();
        assert!(batch2_first >= batch1_last + delay);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_kept_in_order_not_fatal() {
        let results = process_batches(
            vec![1, 2, 3, 4],
            |n| async move {
                if n % 2 == 0 {
                    Err(std::io::Error::other("even"))
                } else {
                    Ok(n)
                }
            },
            2,
            Duration::from_millis(1),
            &NullSink,
        )
        .await;

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok() && results[2].is_ok());
        assert!(results[1].is_err() && results[3].is_err());
        let report = BatchReport::tally(&results);
        assert_eq!(report, BatchReport { succeeded: 2, failed: 2 });
    }

    #[tokio::test]
    async fn test_zero_batch_size_treated_as_one() {
        let results = process_batches(
            vec![1, 2],
            |n| async move { Ok::<usize, std::io::Error>(n) },
            0,
            Duration::from_millis(0),
            &NullSink,
        )
        .await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results = process_batches(
            Vec::<u8>::new(),
            |_| async { Ok::<(), std::io::Error>(()) },
            3,
            Duration::from_millis(0),
            &NullSink,
        )
        .await;
        assert!(results.is_empty());
    }
}
