//! Process-wide limit on concurrently running builds.

use duci_core::{Error, Result};
use std::sync::{Arc, OnceLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Counting gate shared by every job in the process.
///
/// The capacity is set exactly once; waiters are admitted in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGate {
    inner: Arc<OnceLock<Pool>>,
}

#[derive(Debug)]
struct Pool {
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

/// A held slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct GateSlot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// A gate with `capacity` slots.
    pub fn new(capacity: usize) -> Result<Self> {
        let gate = Self::unconfigured();
        gate.configure(capacity)?;
        Ok(gate)
    }

    /// A gate whose capacity is set later with [`configure`](Self::configure).
    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Set the capacity. Fails if it was already set or is zero.
    pub fn configure(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        let mut installed = false;
        self.inner.get_or_init(|| {
            installed = true;
            Pool {
                capacity,
                semaphore: Arc::new(Semaphore::new(capacity)),
            }
        });
        if !installed {
            return Err(Error::Config("concurrency gate is already configured".to_string()));
        }
        debug!(capacity, "Concurrency gate configured");
        Ok(())
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<GateSlot> {
        let pool = self.pool()?;
        let permit = pool
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Internal("concurrency gate closed".to_string()))?;
        Ok(GateSlot { _permit: permit })
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.get().map(|p| p.capacity)
    }

    /// Slots currently held.
    pub fn running(&self) -> usize {
        self.inner
            .get()
            .map(|p| p.capacity - p.semaphore.available_permits())
            .unwrap_or(0)
    }

    fn pool(&self) -> Result<&Pool> {
        self.inner
            .get()
            .ok_or_else(|| Error::Config("concurrency gate is not configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_second_configure_rejected() {
        let gate = ConcurrencyGate::new(2).unwrap();
        let err = gate.configure(4).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(gate.capacity(), Some(2));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(ConcurrencyGate::new(0), Err(Error::Config(_))));
        let gate = ConcurrencyGate::unconfigured();
        assert!(gate.configure(0).is_err());
        assert!(gate.configure(1).is_ok());
    }

    #[test]
    fn test_clones_share_configuration() {
        let gate = ConcurrencyGate::unconfigured();
        let clone = gate.clone();
        gate.configure(3).unwrap();
        assert_eq!(clone.capacity(), Some(3));
        assert!(clone.configure(1).is_err());
    }

    #[tokio::test]
    async fn test_acquire_unconfigured_is_error() {
        let gate = ConcurrencyGate::unconfigured();
        assert!(matches!(gate.acquire().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_n_plus_one_blocks_until_release() {
        let gate = ConcurrencyGate::new(2).unwrap();

        let first = gate.acquire().await.unwrap();
        let _second = gate.acquire().await.unwrap();
        assert_eq!(gate.running(), 2);

        let third = timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(third.is_err(), "third acquire should block at capacity");
        assert_eq!(gate.running(), 2);

        drop(first);
        let third = timeout(Duration::from_secs(1), gate.acquire())
            .await
            .expect("slot should free up after release")
            .unwrap();
        assert_eq!(gate.running(), 2);
        drop(third);
        assert_eq!(gate.running(), 1);
    }

    #[tokio::test]
    async fn test_waiters_admitted_in_arrival_order() {
        let gate = ConcurrencyGate::new(1).unwrap();
        let held = gate.acquire().await.unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let gate = gate.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _slot = gate.acquire().await.unwrap();
                order.lock().unwrap().push(i);
            }));
            // Let each waiter enqueue before the next one arrives.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
