use crate::config::PoolConfig;
use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::num::NonZeroUsize;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Concurrency used when no maximum is configured: twice the available parallelism
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        * 2
}

/// Runs queued operations with at most `maximum` of them in flight
///
/// Operations start in submission order. Each completion admits the next
/// queued operation, so the pool never exceeds its maximum and never polls.
/// Results come back in submission order regardless of completion order.
pub struct WorkerPool<T> {
    maximum: Option<usize>,
    tasks: VecDeque<BoxFuture<'static, T>>,
}

impl<T: Send + 'static> Default for WorkerPool<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Creates an empty pool
    ///
    /// `None` (or `Some(0)`) uses [`default_max_workers`].
    pub fn new(maximum: Option<usize>) -> Self {
        Self {
            maximum: maximum.filter(|&max| max > 0),
            tasks: VecDeque::new(),
        }
    }

    /// Creates an empty pool sized from configuration
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.max_workers)
    }

    /// Queues an operation; nothing runs until [`run`](Self::run)
    pub fn add_task<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.tasks.push_back(task.boxed());
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The effective concurrency limit
    pub fn maximum(&self) -> usize {
        self.maximum.unwrap_or_else(default_max_workers)
    }

    /// Runs every queued operation and collects the results
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<T>)` - One result per task, in submission order
    /// * `Err(Ao3Error::Join)` - A task panicked
    pub async fn run(mut self) -> Result<Vec<T>> {
        let maximum = self.maximum();
        let count = self.tasks.len();
        debug!(tasks = count, maximum, "Starting worker pool");

        let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
        let mut active = JoinSet::new();
        let mut next_index = 0;

        loop {
            while active.len() < maximum {
                let Some(task) = self.tasks.pop_front() else {
                    break;
                };
                let index = next_index;
                next_index += 1;
                active.spawn(async move { (index, task.await) });
            }

            match active.join_next().await {
                Some(joined) => {
                    let (index, value) = joined?;
                    results[index] = Some(value);
                }
                None => break,
            }
        }

        info!(tasks = count, "Worker pool finished");
        Ok(results.into_iter().flatten().collect())
    }
}

/// Loads pages `1..=pages` and concatenates their entries in page order
pub(crate) async fn load_pages<T, F, Fut>(
    pages: u32,
    threaded: bool,
    max_workers: Option<usize>,
    load: F,
) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    let mut items = Vec::new();
    if threaded {
        let mut pool = WorkerPool::new(max_workers);
        for page in 1..=pages {
            pool.add_task(load(page));
        }
        for page in pool.run().await? {
            items.extend(page?);
        }
    } else {
        for page in 1..=pages {
            items.extend(load(page).await?);
        }
    }
    Ok(items)
}
