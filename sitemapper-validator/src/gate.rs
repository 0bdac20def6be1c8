//! Counting admission gates for crawl tasks.

use crate::error::{Result, ValidateError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A semaphore that also tracks how many holders are in flight and the highest
/// count seen, so callers can check the bound was honored.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    capacity: usize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            capacity,
        }
    }

    /// Wait for a slot. The slot is released when the returned permit drops.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ValidateError::Other(format!("admission gate closed: {}", e)))?;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        Ok(GatePermit {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous holders so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Guard that releases its gate slot when dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_are_released_on_drop() {
        let gate = AdmissionGate::new(2);
        let first = gate.acquire().await.unwrap();
        let second = gate.acquire().await.unwrap();
        assert_eq!(gate.in_flight(), 2);

        drop(first);
        assert_eq!(gate.in_flight(), 1);
        let _third = gate.acquire().await.unwrap();
        drop(second);

        assert_eq!(gate.in_flight(), 1);
        assert_eq!(gate.peak(), 2);
    }

    #[tokio::test]
    async fn test_peak_never_exceeds_capacity() {
        let gate = AdmissionGate::new(3);
        let mut handles = Vec::new();
        for _ in 0..12 {
            let permit = gate.acquire().await.unwrap();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(gate.in_flight(), 0);
        assert!(gate.peak() <= 3);
        assert!(gate.peak() >= 1);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(AdmissionGate::new(0).capacity(), 1);
    }
}
