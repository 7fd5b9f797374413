//! Sliding-window request budget
//!
//! Every outbound request awaits [`RequestBudget::acquire`] before it is sent.
//! The budget remembers when recent requests were issued and, once the window
//! is full, sleeps until the oldest of them falls out of it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{trace, warn};

/// Requests the archive tolerates per window before answering with 429
pub const ARCHIVE_REQUESTS_PER_WINDOW: u32 = 12;

/// Default length of the rolling window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct BudgetLimits {
    /// `None` disables limiting
    max_requests: Option<u32>,
    window: Duration,
}

/// Rate limiter shared by every request issued through a gateway
///
/// The whole trim-check-wait-append sequence runs under one async mutex, so
/// callers that find the window full queue up behind the sleeping one and are
/// admitted in arrival order.
#[derive(Debug)]
pub struct RequestBudget {
    limits: RwLock<BudgetLimits>,
    issued: Mutex<VecDeque<Instant>>,
    total: AtomicU64,
}

impl Default for RequestBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl RequestBudget {
    /// Creates a budget allowing `max_requests` per `window`
    ///
    /// A maximum of `None` or `Some(0)` disables limiting.
    pub fn new(max_requests: Option<u32>, window: Duration) -> Self {
        Self {
            limits: RwLock::new(BudgetLimits {
                max_requests: max_requests.filter(|&max| max > 0),
                window,
            }),
            issued: Mutex::new(VecDeque::new()),
            total: AtomicU64::new(0),
        }
    }

    /// Creates a budget that never blocks
    pub fn unlimited() -> Self {
        Self::new(None, DEFAULT_WINDOW)
    }

    /// Creates a budget with the archive's known limit of 12 requests per minute
    pub fn archive() -> Self {
        Self::new(Some(ARCHIVE_REQUESTS_PER_WINDOW), DEFAULT_WINDOW)
    }

    /// Waits until one more request fits in the window, then records it
    pub async fn acquire(&self) {
        let mut issued = self.issued.lock().await;
        let limits = self.limits();

        let Some(max) = limits.max_requests else {
            self.total.fetch_add(1, Ordering::Relaxed);
            return;
        };
        let max = max as usize;

        let now = Instant::now();
        while let Some(&oldest) = issued.front() {
            if now.duration_since(oldest) >= limits.window {
                issued.pop_front();
            } else {
                break;
            }
        }

        // Loops rather than waits once so a lowered maximum still holds
        while issued.len() >= max {
            let Some(&oldest) = issued.front() else {
                break;
            };
            let wait = (oldest + limits.window).saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                warn!(
                    wait_ms = wait.as_millis() as u64,
                    in_window = issued.len(),
                    max,
                    "Request budget exhausted, waiting for a slot"
                );
                tokio::time::sleep(wait).await;
            }
            issued.pop_front();
        }

        issued.push_back(Instant::now());
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(total, in_window = issued.len(), "Request admitted");
    }

    /// Sets the maximum number of requests per window
    ///
    /// `None` or `Some(0)` disables limiting. Affects subsequent calls only.
    pub fn set_max_requests(&self, max_requests: Option<u32>) {
        let mut limits = self.limits.write().unwrap_or_else(PoisonError::into_inner);
        limits.max_requests = max_requests.filter(|&max| max > 0);
    }

    /// Sets the length of the rolling window
    pub fn set_window(&self, window: Duration) {
        let mut limits = self.limits.write().unwrap_or_else(PoisonError::into_inner);
        limits.window = window;
    }

    /// Switches between the archive's known limit and no limit at all
    pub fn limit_requests(&self, limit: bool) {
        let mut limits = self.limits.write().unwrap_or_else(PoisonError::into_inner);
        if limit {
            limits.max_requests = Some(ARCHIVE_REQUESTS_PER_WINDOW);
            limits.window = DEFAULT_WINDOW;
        } else {
            limits.max_requests = None;
        }
    }

    pub fn max_requests(&self) -> Option<u32> {
        self.limits().max_requests
    }

    pub fn window(&self) -> Duration {
        self.limits().window
    }

    pub fn is_limited(&self) -> bool {
        self.limits().max_requests.is_some()
    }

    /// Number of requests admitted since the budget was created
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Number of recorded requests still inside the current window
    pub async fn in_window(&self) -> usize {
        let issued = self.issued.lock().await;
        let window = self.limits().window;
        let now = Instant::now();
        issued
            .iter()
            .filter(|&&at| now.duration_since(at) < window)
            .count()
    }

    fn limits(&self) -> BudgetLimits {
        *self.limits.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_waits() {
        let budget = RequestBudget::unlimited();
        let start = Instant::now();
        for _ in 0..100 {
            budget.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(budget.total(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_blocks_when_full() {
        let budget = RequestBudget::new(Some(3), Duration::from_secs(10));
        let start = Instant::now();

        for _ in 0..3 {
            budget.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        budget.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(budget.total(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_requests_span_window() {
        let max = 4;
        let window = Duration::from_secs(5);
        let budget = RequestBudget::new(Some(max), window);

        let mut stamps = Vec::new();
        for _ in 0..20 {
            budget.acquire().await;
            stamps.push(Instant::now());
            tokio::time::advance(Duration::from_millis(700)).await;
        }

        for pair in stamps.windows(max as usize + 1) {
            let span = pair[max as usize].duration_since(pair[0]);
            assert!(span >= window, "{} requests within {:?}", max + 1, span);
        }
        assert_eq!(budget.total(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_requests_expire() {
        let budget = RequestBudget::new(Some(2), Duration::from_secs(1));
        budget.acquire().await;
        budget.acquire().await;
        assert_eq!(budget.in_window().await, 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(budget.in_window().await, 0);

        let start = Instant::now();
        budget.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_maximum_means_unlimited() {
        let budget = RequestBudget::new(Some(0), Duration::from_secs(60));
        assert!(!budget.is_limited());

        budget.set_max_requests(Some(2));
        assert!(budget.is_limited());
        budget.set_max_requests(Some(0));
        assert!(!budget.is_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lowering_maximum_still_holds() {
        let budget = RequestBudget::new(Some(5), Duration::from_secs(10));
        for _ in 0..5 {
            budget.acquire().await;
        }

        budget.set_max_requests(Some(2));
        let start = Instant::now();
        budget.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(budget.in_window().await <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_requests_preset() {
        let budget = RequestBudget::unlimited();
        budget.limit_requests(true);
        assert_eq!(budget.max_requests(), Some(ARCHIVE_REQUESTS_PER_WINDOW));
        assert_eq!(budget.window(), DEFAULT_WINDOW);

        budget.limit_requests(false);
        assert_eq!(budget.max_requests(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_respect_budget() {
        let budget = std::sync::Arc::new(RequestBudget::new(Some(3), Duration::from_secs(6)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..7 {
            let budget = budget.clone();
            handles.push(tokio::spawn(async move {
                budget.acquire().await;
                Instant::now()
            }));
        }

        let mut stamps = Vec::new();
        for handle in handles {
            stamps.push(handle.await.unwrap());
        }
        stamps.sort();

        for pair in stamps.windows(4) {
            assert!(pair[3].duration_since(pair[0]) >= Duration::from_secs(6));
        }
        assert!(start.elapsed() >= Duration::from_secs(12));
        assert_eq!(budget.total(), 7);
    }
}
