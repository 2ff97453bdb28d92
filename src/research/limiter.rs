//! Admission gate shared by every branch of a research run.
//!
//! A [`ConcurrencyLimiter`] bounds how many search branches run at once.
//! Unlike a plain semaphore its capacity can be moved at runtime: a branch
//! about to recurse grows the budget by one for the lifetime of a
//! [`CapacityBoost`], so the subtree it spawns gets its own admission room
//! while the parent keeps its slot.
//!
//! Waiters are served in FIFO order. A released slot is handed directly to
//! the next waiter, so a late arrival can never overtake a queued one.
//! Lowering the capacity below the number of slots in flight takes effect
//! lazily: nothing is revoked, new admissions simply stall until enough
//! permits have been returned.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

#[derive(Debug)]
struct LimiterState {
    capacity: usize,
    in_flight: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl LimiterState {
    /// Hand free slots to queued waiters. Waiters that gave up are skipped.
    fn admit_waiters(&mut self) {
        while self.in_flight < self.capacity {
            let Some(waiter) = self.waiters.pop_front() else {
                return;
            };
            if waiter.send(()).is_ok() {
                self.in_flight += 1;
            }
        }
    }
}

/// Counting admission gate with adjustable capacity.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    state: Mutex<LimiterState>,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting `capacity` concurrent holders.
    pub fn new(capacity: usize) -> AppResult<Self> {
        if capacity == 0 {
            return Err(AppError::Config {
                message: "concurrency limiter capacity must be at least 1".to_string(),
            });
        }
        Ok(Self {
            state: Mutex::new(LimiterState {
                capacity,
                in_flight: 0,
                waiters: VecDeque::new(),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        // Counters stay consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Number of permits currently held.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Number of tasks queued in [`acquire`](Self::acquire).
    pub fn waiting(&self) -> usize {
        self.lock().waiters.iter().filter(|w| !w.is_closed()).count()
    }

    /// Wait for a free slot and take it.
    pub async fn acquire(self: &Arc<Self>) -> LimiterPermit {
        let receiver = {
            let mut state = self.lock();
            state.waiters.retain(|w| !w.is_closed());
            if state.waiters.is_empty() && state.in_flight < state.capacity {
                state.in_flight += 1;
                return LimiterPermit::new(Arc::clone(self));
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            debug!(
                in_flight = state.in_flight,
                capacity = state.capacity,
                waiting = state.waiters.len(),
                "Waiting for concurrency slot"
            );
            receiver
        };

        let mut pending = PendingAcquire {
            limiter: Arc::clone(self),
            receiver: Some(receiver),
        };
        pending.wait().await
    }

    /// Raise the capacity by `by` and wake waiters that now fit.
    pub fn increase_capacity(&self, by: usize) {
        let mut state = self.lock();
        state.capacity += by;
        state.admit_waiters();
        debug!(capacity = state.capacity, "Concurrency capacity increased");
    }

    /// Lower the capacity by `by`.
    ///
    /// Fails with [`AppError::Config`] if the capacity would drop below 1.
    /// Slots already in flight are left alone.
    pub fn decrease_capacity(&self, by: usize) -> AppResult<()> {
        let mut state = self.lock();
        if by >= state.capacity {
            return Err(AppError::Config {
                message: format!(
                    "cannot decrease concurrency capacity {} by {}",
                    state.capacity, by
                ),
            });
        }
        state.capacity -= by;
        debug!(
            capacity = state.capacity,
            in_flight = state.in_flight,
            "Concurrency capacity decreased"
        );
        Ok(())
    }

    /// Grow the capacity by one until the returned guard is dropped.
    pub fn boost(self: &Arc<Self>) -> CapacityBoost {
        self.increase_capacity(1);
        CapacityBoost {
            limiter: Arc::clone(self),
        }
    }

    fn release_slot(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.admit_waiters();
    }
}

/// Future state of a queued [`ConcurrencyLimiter::acquire`] call.
///
/// If the caller stops waiting after a slot was already handed over, the
/// slot goes back to the limiter on drop.
struct PendingAcquire {
    limiter: Arc<ConcurrencyLimiter>,
    receiver: Option<oneshot::Receiver<()>>,
}

impl PendingAcquire {
    async fn wait(&mut self) -> LimiterPermit {
        if let Some(receiver) = self.receiver.as_mut() {
            // The sender lives in the limiter's queue, which outlives us.
            let _ = receiver.await;
        }
        self.receiver = None;
        LimiterPermit::new(Arc::clone(&self.limiter))
    }
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
            if receiver.try_recv().is_ok() {
                self.limiter.release_slot();
            }
        }
    }
}

/// A held slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct LimiterPermit {
    limiter: Option<Arc<ConcurrencyLimiter>>,
}

impl LimiterPermit {
    fn new(limiter: Arc<ConcurrencyLimiter>) -> Self {
        Self {
            limiter: Some(limiter),
        }
    }

    /// Release the slot now.
    pub fn release(mut self) {
        if let Some(limiter) = self.limiter.take() {
            limiter.release_slot();
        }
    }
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        if let Some(limiter) = self.limiter.take() {
            limiter.release_slot();
        }
    }
}

/// Temporary +1 on a limiter's capacity, undone on drop.
#[derive(Debug)]
pub struct CapacityBoost {
    limiter: Arc<ConcurrencyLimiter>,
}

impl Drop for CapacityBoost {
    fn drop(&mut self) {
        if let Err(e) = self.limiter.decrease_capacity(1) {
            warn!(error = %e, "Failed to restore concurrency capacity");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn limiter(capacity: usize) -> Arc<ConcurrencyLimiter> {
        Arc::new(ConcurrencyLimiter::new(capacity).unwrap())
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[test]
    fn test_zero_capacity_is_config_error() {
        let err = ConcurrencyLimiter::new(0).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
        assert!(err.is_fatal());
    }

    // ========================================================================
    // Admission
    // ========================================================================

    #[tokio::test]
    async fn test_acquire_within_capacity() {
        let limiter = limiter(2);
        let a = limiter.acquire().await;
        let b = limiter.acquire().await;
        assert_eq!(limiter.in_flight(), 2);

        drop(a);
        assert_eq!(limiter.in_flight(), 1);
        b.release();
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_acquire_blocks_at_capacity() {
        let limiter = limiter(1);
        let held = limiter.acquire().await;

        let blocked = timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err());
        // The timed-out waiter must not leak a slot or a queue entry.
        assert_eq!(limiter.in_flight(), 1);
        assert_eq!(limiter.waiting(), 0);

        drop(held);
        let next = timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(next.is_ok());
    }

    #[tokio::test]
    async fn test_release_hands_slot_to_waiter() {
        let limiter = limiter(1);
        let held = limiter.acquire().await;

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let _permit = limiter.acquire().await;
            })
        };
        while limiter.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        drop(held);
        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_waiters_are_fifo() {
        let limiter = limiter(1);
        let held = limiter.acquire().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for i in 0..3 {
            let task_limiter = Arc::clone(&limiter);
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let _permit = task_limiter.acquire().await;
                tx.send(i).unwrap();
            }));
            while limiter.waiting() < i + 1 {
                tokio::task::yield_now().await;
            }
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        let order: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    // ========================================================================
    // Capacity adjustment
    // ========================================================================

    #[tokio::test]
    async fn test_increase_wakes_waiter() {
        let limiter = limiter(1);
        let _held = limiter.acquire().await;

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
        };
        while limiter.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        limiter.increase_capacity(1);
        let permit = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(limiter.in_flight(), 2);
        drop(permit);
    }

    #[tokio::test]
    async fn test_decrease_defers_until_release() {
        let limiter = limiter(2);
        let a = limiter.acquire().await;
        let b = limiter.acquire().await;

        limiter.decrease_capacity(1).unwrap();
        assert_eq!(limiter.capacity(), 1);
        assert_eq!(limiter.in_flight(), 2);

        drop(a);
        // Still at the new capacity with one holder.
        let blocked = timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(blocked.is_err());

        drop(b);
        let next = timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(next.is_ok());
    }

    #[test]
    fn test_decrease_below_one_is_rejected() {
        let limiter = limiter(2);
        assert!(limiter.decrease_capacity(1).is_ok());
        let err = limiter.decrease_capacity(1).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
        assert_eq!(limiter.capacity(), 1);
    }

    #[tokio::test]
    async fn test_boost_restores_capacity_on_drop() {
        let limiter = limiter(2);
        {
            let _boost = limiter.boost();
            assert_eq!(limiter.capacity(), 3);
        }
        assert_eq!(limiter.capacity(), 2);
    }

    #[tokio::test]
    async fn test_boost_restored_when_task_panics() {
        let limiter = limiter(1);
        let task = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let _boost = limiter.boost();
                panic!("recursive call failed");
            })
        };
        assert!(task.await.is_err());
        assert_eq!(limiter.capacity(), 1);
    }

    #[tokio::test]
    async fn test_boost_lets_nested_work_in() {
        let limiter = limiter(1);
        let _outer = limiter.acquire().await;

        let _boost = limiter.boost();
        let inner = timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(inner.is_ok());
    }

    #[tokio::test]
    async fn test_sibling_not_blocked_by_boosted_branch() {
        let limiter = limiter(2);
        // One branch holds its slot, a boost and a nested slot.
        let _branch = limiter.acquire().await;
        let _boost = limiter.boost();
        let _nested = limiter.acquire().await;
        assert_eq!(limiter.in_flight(), 2);

        let sibling = timeout(Duration::from_millis(50), limiter.acquire()).await;
        assert!(sibling.is_ok());
        assert_eq!(limiter.in_flight(), 3);
        assert_eq!(limiter.waiting(), 0);
    }
}
