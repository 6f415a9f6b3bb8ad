// Copyright © DRL Mirror Contributors
// SPDX-License-Identifier: Apache-2.0

//! A mutex-guarded slot holding an optional shared future. Concurrent
//! callers that arrive while a task is in flight attach to it and
//! receive its result identically; the slot clears itself once the
//! task completes so the next caller starts fresh.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex as AsyncMutex;

/// Ensures at most one `T`-producing task runs at a time. `T` must be
/// `Clone` through an `Arc` wrapper (the runner's output is always
/// `Arc<T>`) so even non-`Clone` outcomes (like a `Result` carrying a
/// foreign error) can be fanned out to every waiter.
pub struct SingleFlightRunner<T> {
    slot: AsyncMutex<Option<Shared<BoxFuture<'static, Arc<T>>>>>,
}

impl<T> Default for SingleFlightRunner<T> {
    fn default() -> Self {
        Self {
            slot: AsyncMutex::new(None),
        }
    }
}

impl<T: Send + Sync + 'static> SingleFlightRunner<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `spawn`'s future if no task is currently in flight;
    /// otherwise attaches to the in-flight task. `spawn` is only
    /// invoked when this call actually starts a new task.
    pub async fn run_single_task<F, Fut>(this: Arc<Self>, spawn: F) -> Arc<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut guard = this.slot.lock().await;
        if let Some(existing) = guard.as_ref() {
            let shared = existing.clone();
            drop(guard);
            return shared.await;
        }

        let runner = Arc::clone(&this);
        let task = spawn();
        let shared: Shared<BoxFuture<'static, Arc<T>>> = async move {
            let result = Arc::new(task.await);
            // Clear the slot before returning so the next caller
            // starts a fresh task rather than re-attaching to this one.
            *runner.slot.lock().await = None;
            result
        }
        .boxed()
        .shared();

        *guard = Some(shared.clone());
        drop(guard);
        shared.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_task_and_result() {
        let runner = Arc::new(SingleFlightRunner::<u32>::new());
        let spawn_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let runner = Arc::clone(&runner);
            let spawn_count = Arc::clone(&spawn_count);
            handles.push(tokio::spawn(async move {
                SingleFlightRunner::run_single_task(runner, move || {
                    let spawn_count = Arc::clone(&spawn_count);
                    async move {
                        spawn_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        42
                    }
                })
                .await
            }));
        }

        for handle in handles {
            assert_eq!(*handle.await.unwrap(), 42);
        }
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slot_clears_so_a_later_call_spawns_again() {
        let runner = Arc::new(SingleFlightRunner::<u32>::new());
        let spawn_count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let spawn_count = Arc::clone(&spawn_count);
            let result = SingleFlightRunner::run_single_task(Arc::clone(&runner), move || async move {
                spawn_count.fetch_add(1, Ordering::SeqCst);
                7
            })
            .await;
            assert_eq!(*result, 7);
        }

        assert_eq!(spawn_count.load(Ordering::SeqCst), 2);
    }
}
