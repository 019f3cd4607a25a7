//! Bounded parallel map: the engine's concurrency primitive.
//!
//! Runs an async function over N items with at most K invocations
//! outstanding at any instant, returning results in input order. Supports
//! K >= N (fully parallel), K = 1 (fully sequential), and cooperative
//! cancellation: once the flag is set no new invocation starts; in-flight
//! invocations are allowed to finish.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::models::errors::{EngineError, EngineResult};

/// Cloneable cancellation flag shared between a run and its caller.
///
/// Setting the flag is sticky for the lifetime of the run; the engine
/// observes it at batch boundaries, the pool before starting each item.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Invoke `f` on every item with at most `limit` invocations in flight.
///
/// The returned vector has one slot per input item, in input order:
/// `Some(result)` for items that ran, `None` for items skipped because the
/// cancel flag was set before their slot came up. Classification beyond the
/// limit waits for a semaphore permit.
///
/// The only error paths are faults in the machinery itself: a worker panic
/// or a failed join aborts the whole map with a fatal scheduler error.
pub async fn bounded_map<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    cancel: CancelFlag,
    f: F,
) -> EngineResult<Vec<Option<R>>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let f = Arc::new(f);

    let handles: Vec<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let f = f.clone();
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| EngineError::pool_closed())?;
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                Ok(Some(f(index, item).await))
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for joined in join_all(handles).await {
        match joined {
            Ok(Ok(slot)) => results.push(slot),
            Ok(Err(e)) => return Err(e),
            Err(join_err) if join_err.is_panic() => {
                return Err(EngineError::worker_panic(format!(
                    "Worker task panicked: {}",
                    join_err
                )));
            }
            Err(join_err) => return Err(EngineError::join_failed(join_err)),
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Track the high-water mark of concurrent invocations
    fn instrumented(
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    ) -> impl Fn(usize, usize) -> std::pin::Pin<Box<dyn Future<Output = usize> + Send>>
           + Send
           + Sync
           + 'static {
        move |_, item| {
            let active = active.clone();
            let peak = peak.clone();
            Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                item * 2
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_limit() {
        for limit in [1usize, 3, 5] {
            let active = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let results = bounded_map(
                (0..20).collect::<Vec<usize>>(),
                limit,
                CancelFlag::new(),
                instrumented(active.clone(), peak.clone()),
            )
            .await
            .unwrap();

            assert_eq!(results.len(), 20);
            assert!(
                peak.load(Ordering::SeqCst) <= limit,
                "peak {} exceeded limit {}",
                peak.load(Ordering::SeqCst),
                limit
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_limit_above_item_count_is_fully_parallel() {
        let results = bounded_map(
            (0..5).collect::<Vec<usize>>(),
            64,
            CancelFlag::new(),
            |_, item: usize| async move { item + 1 },
        )
        .await
        .unwrap();

        let values: Vec<usize> = results.into_iter().flatten().collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_results_preserve_input_order() {
        // Earlier items sleep longer, so completion order is reversed;
        // the returned order must still match the input.
        let results = bounded_map(
            vec![30u64, 20, 10],
            3,
            CancelFlag::new(),
            |index, delay_ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                index
            },
        )
        .await
        .unwrap();

        let indices: Vec<usize> = results.into_iter().flatten().collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_sequential_limit_one() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_ref = order.clone();

        bounded_map(
            (0..6).collect::<Vec<usize>>(),
            1,
            CancelFlag::new(),
            move |index, _item: usize| {
                let order = order_ref.clone();
                async move {
                    order.lock().unwrap().push(index);
                }
            },
        )
        .await
        .unwrap();

        // With one permit, invocation order is spawn order
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_cancel_skips_unstarted_items() {
        let cancel = CancelFlag::new();
        let started = Arc::new(AtomicUsize::new(0));

        let cancel_inner = cancel.clone();
        let started_ref = started.clone();
        let results = bounded_map(
            (0..10).collect::<Vec<usize>>(),
            1,
            cancel.clone(),
            move |index, item: usize| {
                let cancel = cancel_inner.clone();
                let started = started_ref.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    if index == 2 {
                        cancel.cancel();
                    }
                    item
                }
            },
        )
        .await
        .unwrap();

        // Items 0..=2 ran; everything after the cancel was skipped
        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 3);
        assert_eq!(results.iter().filter(|r| r.is_none()).count(), 7);
    }

    #[tokio::test]
    async fn test_worker_panic_is_fatal() {
        let result = bounded_map(
            (0..4).collect::<Vec<usize>>(),
            2,
            CancelFlag::new(),
            |_, item: usize| async move {
                if item == 2 {
                    panic!("worker blew up");
                }
                item
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.code_str(), "SCHED_WORKER_PANIC");
    }

    #[tokio::test]
    async fn test_empty_input_returns_empty() {
        let results = bounded_map(
            Vec::<usize>::new(),
            4,
            CancelFlag::new(),
            |_, item: usize| async move { item },
        )
        .await
        .unwrap();
        assert!(results.is_empty());
    }
}
