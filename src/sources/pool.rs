// Bounded worker pool: N tasks pull from one shared queue until it drains.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;

/// Runs `work` over `items` with at most `concurrency` in flight. Output order is unspecified.
/// A panicking worker loses only the items it had taken.
pub async fn run_pool<T, R, F, Fut>(items: Vec<T>, concurrency: usize, work: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }
    let workers = concurrency.max(1).min(items.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let work = Arc::new(work);

    let handles = (0..workers).map(|worker_id| {
        let queue = queue.clone();
        let work = work.clone();
        tokio::spawn(async move {
            let mut out = Vec::new();
            loop {
                let next = match queue.lock() {
                    Ok(mut q) => q.pop_front(),
                    Err(_) => None,
                };
                let Some(item) = next else { break };
                out.push(work(item).await);
            }
            tracing::trace!(worker_id, completed = out.len(), "pool worker drained");
            out
        })
    });

    let mut results = Vec::new();
    for joined in join_all(handles).await {
        match joined {
            Ok(batch) => results.extend(batch),
            Err(e) => tracing::warn!(error = %e, "pool worker failed"),
        }
    }
    results
}
