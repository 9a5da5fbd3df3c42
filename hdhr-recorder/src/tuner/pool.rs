//! Priority pool of idle tuners.
//!
//! The pool holds the tuners that are not currently recording. A recording
//! takes the idle tuner with the lowest priority value and hands it back when
//! it is done. The pool never blocks: when every tuner is busy, `acquire`
//! returns `None` and the caller gives up on that recording.
//!
//! Invariant: idle tuners plus tuners held by recordings always equal the
//! configured set. Releasing a tuner twice, or one that was never acquired,
//! breaks this invariant and is a caller bug.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::ops::Deref;
use std::sync::Arc;

use hdhr_schedule::TunerDescriptor;
use log::debug;
use parking_lot::Mutex;

/// A tuner with its tie-break position.
#[derive(Debug, Clone)]
struct PoolEntry {
    /// Declaration order, used when priorities are equal.
    order: usize,
    tuner: TunerDescriptor,
}

impl PoolEntry {
    fn key(&self) -> (i32, usize) {
        (self.tuner.priority, self.order)
    }
}

impl PartialEq for PoolEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for PoolEntry {}

impl PartialOrd for PoolEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PoolEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Pool of idle tuners, ordered by priority.
#[derive(Debug)]
pub struct TunerPool {
    /// Min-heap of idle tuners.
    idle: Mutex<BinaryHeap<Reverse<PoolEntry>>>,
    /// The configured tuner set, in declaration order.
    configured: Vec<TunerDescriptor>,
}

impl TunerPool {
    /// Create a pool holding every configured tuner.
    pub fn new(tuners: impl IntoIterator<Item = TunerDescriptor>) -> Self {
        let configured: Vec<TunerDescriptor> = tuners.into_iter().collect();
        let idle = configured
            .iter()
            .cloned()
            .enumerate()
            .map(|(order, tuner)| Reverse(PoolEntry { order, tuner }))
            .collect();

        Self {
            idle: Mutex::new(idle),
            configured,
        }
    }

    /// Take the idle tuner with the lowest priority, if any.
    pub fn acquire(&self) -> Option<TunerDescriptor> {
        let entry = self.idle.lock().pop().map(|Reverse(entry)| entry.tuner);
        match &entry {
            Some(tuner) => debug!("TunerPool: acquired ({})", tuner),
            None => debug!("TunerPool: no idle tuner"),
        }
        entry
    }

    /// Return a tuner to the pool.
    pub fn release(&self, tuner: TunerDescriptor) {
        let order = self
            .configured
            .iter()
            .position(|t| *t == tuner)
            .unwrap_or(self.configured.len());
        debug!("TunerPool: released ({})", tuner);
        self.idle.lock().push(Reverse(PoolEntry { order, tuner }));
    }

    /// Acquire a tuner wrapped in a guard that releases it on drop.
    pub fn lease(self: &Arc<Self>) -> Option<TunerLease> {
        self.acquire().map(|tuner| TunerLease {
            pool: Arc::clone(self),
            tuner: Some(tuner),
        })
    }

    /// Number of idle tuners.
    pub fn available(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of configured tuners.
    pub fn capacity(&self) -> usize {
        self.configured.len()
    }

    /// Idle tuners in allocation order.
    pub fn idle_tuners(&self) -> Vec<TunerDescriptor> {
        let mut entries: Vec<PoolEntry> = self
            .idle
            .lock()
            .iter()
            .map(|Reverse(entry)| entry.clone())
            .collect();
        entries.sort();
        entries.into_iter().map(|entry| entry.tuner).collect()
    }
}

/// Guard for an acquired tuner.
///
/// The tuner goes back to its pool when the guard is dropped, including
/// when the holder unwinds.
#[derive(Debug)]
pub struct TunerLease {
    pool: Arc<TunerPool>,
    tuner: Option<TunerDescriptor>,
}

impl TunerLease {
    pub fn tuner(&self) -> &TunerDescriptor {
        // Only `Drop` takes the tuner out.
        self.tuner.as_ref().unwrap_or_else(|| unreachable!("lease already released"))
    }
}

impl Deref for TunerLease {
    type Target = TunerDescriptor;

    fn deref(&self) -> &Self::Target {
        self.tuner()
    }
}

impl Drop for TunerLease {
    fn drop(&mut self) {
        if let Some(tuner) = self.tuner.take() {
            self.pool.release(tuner);
        }
    }
}
