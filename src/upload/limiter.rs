//! Bounded-concurrency task runner with cooperative cancellation

use std::collections::VecDeque;
use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{UploadError, UploadResult};

/// Runs at most `max_concurrent` tasks at a time in submission order.
///
/// Tasks are plain futures and do nothing until dispatched. Once the cancellation
/// token fires, queued tasks are settled as `Cancelled` without being started; tasks
/// already running are expected to observe the same token and finish on their own.
pub struct ConcurrencyLimiter<'a, T> {
    queue: VecDeque<(usize, BoxFuture<'a, UploadResult<T>>)>,
    running: FuturesUnordered<BoxFuture<'a, (usize, UploadResult<T>)>>,
    skipped: VecDeque<usize>,
    max_concurrent: usize,
    total: usize,
    cancel: CancellationToken,
}

impl<'a, T: Send + 'a> ConcurrencyLimiter<'a, T> {
    pub fn new<I, F>(tasks: I, max_concurrent: usize, cancel: CancellationToken) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = UploadResult<T>> + Send + 'a,
    {
        let queue: VecDeque<_> = tasks
            .into_iter()
            .enumerate()
            .map(|(i, task)| (i, task.boxed()))
            .collect();
        let total = queue.len();

        Self {
            queue,
            running: FuturesUnordered::new(),
            skipped: VecDeque::new(),
            max_concurrent: max_concurrent.max(1),
            total,
            cancel,
        }
    }

    /// Number of submitted tasks
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Tasks currently running
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    /// True once every task has produced an outcome
    pub fn is_finished(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty() && self.skipped.is_empty()
    }

    /// Start queued tasks up to the concurrency bound and return their indices.
    /// After cancellation nothing new starts; the rest of the queue is settled as cancelled.
    pub fn dispatch(&mut self) -> Vec<usize> {
        if self.cancel.is_cancelled() {
            self.skipped.extend(self.queue.drain(..).map(|(i, _)| i));
            return Vec::new();
        }

        let mut started = Vec::new();
        while self.running.len() < self.max_concurrent {
            let Some((index, task)) = self.queue.pop_front() else {
                break;
            };
            self.running.push(async move { (index, task.await) }.boxed());
            started.push(index);
        }
        started
    }

    /// Wait for the next task outcome, in completion order.
    /// Returns `None` once every task has been reported.
    pub async fn next_completed(&mut self) -> Option<(usize, UploadResult<T>)> {
        self.dispatch();

        if let Some(index) = self.skipped.pop_front() {
            return Some((index, Err(UploadError::Cancelled)));
        }

        self.running.next().await
    }
}

/// Run every task with bounded concurrency and return outcomes in submission order
pub async fn run_all<'a, T, I, F>(
    tasks: I,
    max_concurrent: usize,
    cancel: CancellationToken,
) -> Vec<UploadResult<T>>
where
    T: Send + 'a,
    I: IntoIterator<Item = F>,
    F: Future<Output = UploadResult<T>> + Send + 'a,
{
    let mut limiter = ConcurrencyLimiter::new(tasks, max_concurrent, cancel);
    let mut results: Vec<Option<UploadResult<T>>> = (0..limiter.len()).map(|_| None).collect();

    while let Some((index, result)) = limiter.next_completed().await {
        results[index] = Some(result);
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or(Err(UploadError::Cancelled)))
        .collect()
}
