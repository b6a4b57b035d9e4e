//! Engineer pool: a bounded, FIFO-fair counter of repair engineers.
//!
//! Availability lives in a fair [`Semaphore`]; a separate atomic tracks how
//! many units are currently held so the pool can check its own books.
//! A unit is represented by an [`EngineerGuard`] and goes back to the pool
//! when the guard is dropped, whatever path the holder exits by.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("engineer pool invariant violated: available={available} held={held} capacity={capacity}")]
    InvariantViolated {
        available: usize,
        held: usize,
        capacity: usize,
    },
    #[error("engineer pool closed")]
    Closed,
}

/// Shared handle to the engineer pool. Clones refer to the same pool.
#[derive(Debug, Clone)]
pub struct EngineerPool {
    semaphore: Arc<Semaphore>,
    held: Arc<AtomicUsize>,
    capacity: usize,
}

impl EngineerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            held: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Engineers free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Engineers currently out on a visit.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::Acquire)
    }

    /// `available` must never exceed `capacity`, and neither may `held`.
    pub fn check_invariant(&self) -> Result<(), PoolError> {
        let available = self.available();
        let held = self.held();
        if available > self.capacity || held > self.capacity {
            return Err(self.violation(available, held));
        }
        Ok(())
    }

    /// Stricter check for when no acquire or release is in progress:
    /// every unit is either available or held.
    pub fn check_quiescent(&self) -> Result<(), PoolError> {
        self.check_invariant()?;
        let available = self.available();
        let held = self.held();
        if available + held != self.capacity {
            return Err(self.violation(available, held));
        }
        Ok(())
    }

    /// Wait for a free engineer. Waiters are served in arrival order.
    pub async fn acquire(&self) -> Result<EngineerGuard, PoolError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        Ok(self.guard(permit))
    }

    /// Take a free engineer without waiting.
    #[cfg(test)]
    pub fn try_acquire(&self) -> Option<EngineerGuard> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.guard(permit))
    }

    fn guard(&self, permit: OwnedSemaphorePermit) -> EngineerGuard {
        self.held.fetch_add(1, Ordering::AcqRel);
        EngineerGuard {
            _permit: permit,
            held: Arc::clone(&self.held),
        }
    }

    const fn violation(&self, available: usize, held: usize) -> PoolError {
        PoolError::InvariantViolated {
            available,
            held,
            capacity: self.capacity,
        }
    }
}

/// One engineer taken from the pool. Dropping it returns the engineer.
#[derive(Debug)]
pub struct EngineerGuard {
    _permit: OwnedSemaphorePermit,
    held: Arc<AtomicUsize>,
}

impl Drop for EngineerGuard {
    fn drop(&mut self) {
        // The permit field is dropped after this, so `held` never dips
        // below the true count while `available` catches up.
        self.held.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_acquire_and_release_balance() {
        let pool = EngineerPool::new(2);
        assert_eq!(pool.available(), 2);

        let a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.held(), 2);
        assert!(pool.try_acquire().is_none());
        pool.check_quiescent().unwrap();

        drop(a);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.held(), 1);
        drop(b);
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.held(), 0);
        pool.check_quiescent().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_served_in_order() {
        let pool = EngineerPool::new(1);
        let first = pool.acquire().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for n in 0..3u32 {
            let pool = pool.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let guard = pool.acquire().await.unwrap();
                tx.send(n).unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                drop(guard);
            });
            // Let each waiter enqueue before spawning the next.
            tokio::task::yield_now().await;
        }
        drop(tx);

        assert_eq!(pool.available(), 0);
        drop(first);

        let mut order = Vec::new();
        while let Some(n) = rx.recv().await {
            order.push(n);
        }
        assert_eq!(order, vec![0, 1, 2]);
        pool.check_quiescent().unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_guard_dropped_in_panic_still_releases() {
        let pool = EngineerPool::new(1);
        let cloned = pool.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_acquire().unwrap();
            panic!("visit blew up");
        }));
        assert!(result.is_err());
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.held(), 0);
    }

    #[test]
    fn test_invariant_error_reports_counts() {
        let pool = EngineerPool::new(3);
        let err = pool.violation(4, 0);
        assert_eq!(
            err,
            PoolError::InvariantViolated {
                available: 4,
                held: 0,
                capacity: 3
            }
        );
        assert!(err.to_string().contains("capacity=3"));
    }
}
