//! Fixed-capacity pool of equally sized transform buffers.
//!
//! Slots are allocated lazily up to the capacity and recycled when a
//! [`PoolSlot`] is dropped or explicitly released. What happens when every
//! slot is checked out is governed by [`ExhaustionPolicy`].

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::ExhaustionPolicy;
use crate::error::{Result, StitchError};

/// Source of the memory behind pool slots.
pub trait DeviceAllocator<T>: Send + Sync {
    fn allocate(&self, slot_len: usize) -> Result<T>;
}

/// Plain host memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostAllocator;

impl<T: Clone + Default + Send> DeviceAllocator<Vec<T>> for HostAllocator {
    fn allocate(&self, slot_len: usize) -> Result<Vec<T>> {
        Ok(vec![T::default(); slot_len])
    }
}

struct PoolState<T> {
    free: Vec<T>,
    allocated: usize,
}

pub struct BufferPool<T> {
    allocator: Box<dyn DeviceAllocator<T>>,
    capacity: usize,
    slot_len: usize,
    policy: ExhaustionPolicy,
    state: Mutex<PoolState<T>>,
    returned: Condvar,
}

impl<T: Send> BufferPool<T> {
    pub fn new(
        allocator: Box<dyn DeviceAllocator<T>>,
        capacity: usize,
        slot_len: usize,
        policy: ExhaustionPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            allocator,
            capacity,
            slot_len,
            policy,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                allocated: 0,
            }),
            returned: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_len(&self) -> usize {
        self.slot_len
    }

    /// Slots currently checked out.
    pub fn in_use(&self) -> usize {
        let state = self.lock();
        state.allocated - state.free.len()
    }

    /// Slots that have ever been allocated.
    pub fn allocated(&self) -> usize {
        self.lock().allocated
    }

    /// Take a slot, allocating a new one while under capacity.
    pub fn checkout(self: &Arc<Self>) -> Result<PoolSlot<T>> {
        let deadline = match self.policy {
            ExhaustionPolicy::Block {
                timeout_ms: Some(ms),
            } => Some(Instant::now() + Duration::from_millis(ms)),
            _ => None,
        };

        let mut state = self.lock();
        loop {
            if let Some(item) = state.free.pop() {
                return Ok(self.wrap(item));
            }

            if state.allocated < self.capacity {
                state.allocated += 1;
                drop(state);
                return match self.allocator.allocate(self.slot_len) {
                    Ok(item) => Ok(self.wrap(item)),
                    Err(e) => {
                        self.lock().allocated -= 1;
                        Err(e)
                    }
                };
            }

            state = match (self.policy, deadline) {
                (ExhaustionPolicy::FailFast, _) => {
                    return Err(StitchError::PoolExhausted {
                        capacity: self.capacity,
                    })
                }
                (ExhaustionPolicy::Block { .. }, None) => self
                    .returned
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                (ExhaustionPolicy::Block { .. }, Some(deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::warn!(capacity = self.capacity, "Transform pool wait timed out");
                        return Err(StitchError::PoolExhausted {
                            capacity: self.capacity,
                        });
                    }
                    self.returned
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Return a slot early; equivalent to dropping it.
    pub fn release(&self, slot: PoolSlot<T>) {
        drop(slot);
    }

    fn wrap(self: &Arc<Self>, item: T) -> PoolSlot<T> {
        PoolSlot {
            item: Some(item),
            pool: Arc::clone(self),
        }
    }

    fn give_back(&self, item: T) {
        self.lock().free.push(item);
        self.returned.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A checked-out slot. Dereferences to the buffer and goes back to the pool
/// on drop.
pub struct PoolSlot<T: Send> {
    item: Option<T>,
    pool: Arc<BufferPool<T>>,
}

impl<T: Send> Deref for PoolSlot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("slot is populated until drop")
    }
}

impl<T: Send> DerefMut for PoolSlot<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("slot is populated until drop")
    }
}

impl<T: Send> Drop for PoolSlot<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.give_back(item);
        }
    }
}

impl<T: Send> fmt::Debug for PoolSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSlot")
            .field("capacity", &self.pool.capacity)
            .field("slot_len", &self.pool.slot_len)
            .finish()
    }
}
