//! Claim-once input slots.
//!
//! Deliveries for different inputs of one node can race on different pool
//! threads. Each slot is claimed with a compare-and-set, so a second
//! delivery for the same input is detected no matter how it interleaves,
//! and exactly one delivery observes the set becoming complete.

use featureflow_core::{GraphError, GraphResult, NodeId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Slot<D> {
    claimed: AtomicBool,
    value: Mutex<Option<Arc<D>>>,
}

impl<D> Slot<D> {
    fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            value: Mutex::new(None),
        }
    }
}

/// Fixed set of inputs indexed by subscription id
pub struct FanIn<D> {
    node: NodeId,
    slots: Vec<Slot<D>>,
    filled: AtomicUsize,
}

impl<D> FanIn<D> {
    /// Create `size` empty slots for `node`
    #[must_use]
    pub fn new(node: NodeId, size: usize) -> Self {
        Self {
            node,
            slots: (0..size).map(|_| Slot::new()).collect(),
            filled: AtomicUsize::new(0),
        }
    }

    /// Number of slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots delivered so far
    #[must_use]
    pub fn filled(&self) -> usize {
        self.filled.load(Ordering::Acquire)
    }

    /// Store the input for `sub_id`
    ///
    /// Returns `true` for the one delivery that completes the set.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::SubIdOutOfRange`] or
    /// [`GraphError::DuplicateDelivery`]
    pub fn deliver(&self, sub_id: usize, data: Arc<D>) -> GraphResult<bool> {
        let slot = self.slots.get(sub_id).ok_or(GraphError::SubIdOutOfRange {
            node: self.node,
            sub_id,
            expected: self.slots.len(),
        })?;

        if slot
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GraphError::DuplicateDelivery {
                node: self.node,
                sub_id,
            });
        }

        *lock(&slot.value) = Some(data);
        let before = self.filled.fetch_add(1, Ordering::AcqRel);
        Ok(before + 1 == self.slots.len())
    }

    /// Remove the input for `sub_id`
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::MissingDelivery`] if the slot is empty
    pub fn take(&self, sub_id: usize) -> GraphResult<Arc<D>> {
        self.slots
            .get(sub_id)
            .and_then(|slot| lock(&slot.value).take())
            .ok_or(GraphError::MissingDelivery {
                node: self.node,
                sub_id,
            })
    }

    /// Remove every input, in subscription order
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::MissingDelivery`] for the first empty slot
    pub fn take_all(&self) -> GraphResult<Vec<Arc<D>>> {
        (0..self.slots.len())
            .map(|sub_id| self.take(sub_id))
            .collect()
    }
}
