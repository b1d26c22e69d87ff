//! Bounded worker pool shared by the crawl and extraction phases
//!
//! A pool owns `size` slots, each with its own resource (for extraction an
//! HTTP session). A caller waits for a free slot, then moves the returned
//! [`Slot`] into a spawned task; dropping the slot hands it back. At most
//! `size` slots are ever out at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct Shared<R> {
    resources: Vec<R>,
    /// Indices of slots not currently handed out
    free: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Fixed-size pool of worker slots
pub struct WorkerPool<R = ()> {
    semaphore: Arc<Semaphore>,
    shared: Arc<Shared<R>>,
}

impl<R> Clone for WorkerPool<R> {
    fn clone(&self) -> Self {
        Self {
            semaphore: Arc::clone(&self.semaphore),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl WorkerPool<()> {
    /// Creates a pool whose slots carry no resource
    pub fn new(size: usize) -> Self {
        Self::with_resources(vec![(); size.max(1)])
    }
}

impl<R> WorkerPool<R> {
    /// Creates a pool with one slot per resource
    ///
    /// An empty vector is a programming error and is caught by config
    /// validation before a pool is ever built.
    pub fn with_resources(resources: Vec<R>) -> Self {
        let size = resources.len();
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            shared: Arc::new(Shared {
                resources,
                free: Mutex::new((0..size).rev().collect()),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Builds a pool of `size` slots, creating each slot's resource with `make`
    pub fn try_build<E>(size: usize, mut make: impl FnMut(usize) -> Result<R, E>) -> Result<Self, E> {
        let resources = (0..size).map(&mut make).collect::<Result<Vec<_>, E>>()?;
        Ok(Self::with_resources(resources))
    }

    /// Number of slots
    pub fn size(&self) -> usize {
        self.shared.resources.len()
    }

    /// Slots currently handed out
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever handed out at once
    pub fn peak(&self) -> usize {
        self.shared.peak.load(Ordering::SeqCst)
    }

    /// Waits until a slot is free and claims it
    ///
    /// Returns `None` only if the pool has been closed.
    pub async fn acquire(&self) -> Option<Slot<R>> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;

        let index = self
            .shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()?;

        let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak.fetch_max(now, Ordering::SeqCst);

        Some(Slot {
            index,
            shared: Arc::clone(&self.shared),
            _permit: permit,
        })
    }
}

/// A claimed worker slot
///
/// The slot is returned to the pool when dropped.
pub struct Slot<R> {
    index: usize,
    shared: Arc<Shared<R>>,
    _permit: OwnedSemaphorePermit,
}

impl<R> Slot<R> {
    /// The resource owned by this slot
    pub fn resource(&self) -> &R {
        &self.shared.resources[self.index]
    }
}

impl<R> Drop for Slot<R> {
    fn drop(&mut self) {
        // Runs before `_permit` is released, so the index is free again
        // before another waiter can claim the permit.
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.shared
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.index);
    }
}
