// src/gpu/ring_pool.rs
//! Fixed-capacity ring pool for transient per-frame objects.
//!
//! - **Zero steady-state allocation**: every slot is built once by the factory
//!   and afterwards only updated in place.
//! - **Lock-free cursor**: a single `fetch_add` hands out slots round-robin,
//!   so two threads never receive the same ticket.
//! - **Lifetime contract**: a lease is valid until the pool has handed out
//!   `capacity` more allocations, after which its slot is silently reused.
//!   With stale detection enabled every access re-checks the slot generation
//!   and fails with [`StateError::StaleSlot`] instead of reading recycled data.
//! - **Guards**: a guard from [`PoolLease::read`]/[`PoolLease::write`] must be
//!   dropped before the pool wraps onto its slot. With stale detection the
//!   recycling allocation fails with `StaleSlot`; without it the allocation
//!   waits for the guard, which deadlocks when the same thread holds it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;
use log::{trace, warn};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, StateError};

/// Slots per pool when the caller does not choose.
pub const DEFAULT_POOL_CAPACITY: usize = 4096;

struct Slot<T> {
    /// Lap (ticket / capacity) of the allocation currently owning the slot.
    lap: AtomicU64,
    value: RwLock<T>,
}

pub struct RingPool<T> {
    slots: Box<[Slot<T>]>,
    cursor: CachePadded<AtomicU64>,
    detect_stale: bool,
}

impl<T> RingPool<T> {
    /// Pre-builds `capacity` slots with `factory`. Stale detection follows the
    /// build profile (on with debug assertions).
    pub fn new(capacity: usize, factory: impl FnMut() -> T) -> Result<Self> {
        Self::with_stale_detection(capacity, cfg!(debug_assertions), factory)
    }

    pub fn with_default_capacity(factory: impl FnMut() -> T) -> Self {
        let mut factory = factory;
        Self::build(DEFAULT_POOL_CAPACITY, cfg!(debug_assertions), &mut factory)
    }

    pub fn with_stale_detection(
        capacity: usize,
        detect_stale: bool,
        factory: impl FnMut() -> T,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(StateError::out_of_range("pool capacity", 0, 1, usize::MAX));
        }
        let mut factory = factory;
        Ok(Self::build(capacity, detect_stale, &mut factory))
    }

    fn build(capacity: usize, detect_stale: bool, factory: &mut impl FnMut() -> T) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                lap: AtomicU64::new(0),
                value: RwLock::new(factory()),
            })
            .collect();
        Self {
            slots,
            cursor: CachePadded::new(AtomicU64::new(0)),
            detect_stale,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total number of allocations handed out so far.
    #[inline]
    pub fn allocations(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn detects_stale_slots(&self) -> bool {
        self.detect_stale
    }

    /// Takes the next slot round-robin and lets `update` overwrite it in place.
    ///
    /// The ticket is consumed even when the allocation fails.
    pub fn allocate(&self, update: impl FnOnce(&mut T)) -> Result<PoolLease<'_, T>> {
        let capacity = self.slots.len() as u64;
        let ticket = self.cursor.fetch_add(1, Ordering::Relaxed);
        let index = (ticket % capacity) as usize;
        let lap = ticket / capacity;

        if index == 0 && lap > 0 {
            trace!("ring pool wrapped (lap {}, capacity {})", lap, capacity);
        }

        let slot = &self.slots[index];
        {
            let mut value = if self.detect_stale {
                match slot.value.try_write() {
                    Some(value) => value,
                    None => {
                        let held = slot.lap.load(Ordering::Acquire);
                        warn!(
                            "pool slot {} still borrowed at lap {} while recycling for lap {}",
                            index, held, lap
                        );
                        return Err(StateError::StaleSlot {
                            index,
                            leased: held,
                            current: lap,
                        });
                    }
                }
            } else {
                slot.value.write()
            };
            // A thread holding a later ticket for this slot may have won the
            // lock first. Its write stands and this lease is born stale.
            if lap >= slot.lap.load(Ordering::Acquire) {
                update(&mut value);
                slot.lap.store(lap, Ordering::Release);
            }
        }

        Ok(PoolLease {
            pool: self,
            index,
            lap,
        })
    }

    fn check(&self, index: usize, leased: u64, current: u64) -> Result<()> {
        if self.detect_stale && leased != current {
            warn!(
                "stale pool slot {} touched (lease lap {}, slot lap {})",
                index, leased, current
            );
            return Err(StateError::StaleSlot {
                index,
                leased,
                current,
            });
        }
        Ok(())
    }
}

impl<T> fmt::Debug for RingPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingPool")
            .field("capacity", &self.capacity())
            .field("allocations", &self.allocations())
            .field("detect_stale", &self.detect_stale)
            .finish()
    }
}

/// A slot handed out by [`RingPool::allocate`].
///
/// The lease borrows the pool, but the slot itself is shared with every later
/// lease that lands on the same index; see the module docs for the lifetime
/// contract.
pub struct PoolLease<'p, T> {
    pool: &'p RingPool<T>,
    index: usize,
    lap: u64,
}

impl<'p, T> PoolLease<'p, T> {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// How many times the pool had wrapped when this lease was handed out.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.lap
    }

    pub fn is_stale(&self) -> bool {
        self.pool.slots[self.index].lap.load(Ordering::Acquire) != self.lap
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'p, T>> {
        let slot = &self.pool.slots[self.index];
        let guard = slot.value.read();
        self.pool.check(self.index, self.lap, slot.lap.load(Ordering::Acquire))?;
        Ok(guard)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'p, T>> {
        let slot = &self.pool.slots[self.index];
        let guard = slot.value.write();
        self.pool.check(self.index, self.lap, slot.lap.load(Ordering::Acquire))?;
        Ok(guard)
    }
}

impl<T> fmt::Debug for PoolLease<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolLease")
            .field("index", &self.index)
            .field("generation", &self.lap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn zero_capacity_is_rejected() {
        let err = RingPool::new(0, || 0u32).unwrap_err();
        assert!(err.is_out_of_range());
    }

    #[test]
    fn factory_runs_once_per_slot() {
        let built = AtomicUsize::new(0);
        let pool = RingPool::new(8, || built.fetch_add(1, Ordering::Relaxed)).unwrap();
        for _ in 0..100 {
            pool.allocate(|_| {}).unwrap();
        }
        assert_eq!(built.load(Ordering::Relaxed), 8);
        assert_eq!(pool.allocations(), 100);
    }

    #[test]
    fn round_robin_order() {
        let pool = RingPool::new(4, || 0u32).unwrap();
        let indices: Vec<usize> = (0..5).map(|_| pool.allocate(|_| {}).unwrap().index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0]);
    }

    #[test]
    fn update_overwrites_in_place() {
        let pool = RingPool::new(2, Vec::<u32>::new).unwrap();
        let lease = pool
            .allocate(|v| {
                v.clear();
                v.extend([1, 2, 3]);
            })
            .unwrap();
        assert_eq!(*lease.read().unwrap(), vec![1, 2, 3]);
        lease.write().unwrap().push(4);
        assert_eq!(lease.read().unwrap().len(), 4);
    }

    #[test]
    fn recycled_slot_is_detected() {
        let pool = RingPool::with_stale_detection(2, true, || 0u32).unwrap();
        let first = pool.allocate(|v| *v = 1).unwrap();
        assert!(!first.is_stale());
        pool.allocate(|v| *v = 2).unwrap();
        let third = pool.allocate(|v| *v = 3).unwrap();

        assert_eq!(third.index(), first.index());
        assert_eq!(third.generation(), 1);
        assert!(first.is_stale());
        let err = first.read().unwrap_err();
        assert_eq!(
            err,
            StateError::StaleSlot {
                index: 0,
                leased: 0,
                current: 1
            }
        );
        assert!(first.write().is_err());
        assert_eq!(*third.read().unwrap(), 3);
    }

    #[test]
    fn silent_overwrite_without_detection() {
        let pool = RingPool::with_stale_detection(1, false, || 0u32).unwrap();
        let first = pool.allocate(|v| *v = 1).unwrap();
        pool.allocate(|v| *v = 2).unwrap();
        assert!(first.is_stale());
        assert_eq!(*first.read().unwrap(), 2);
    }

    #[test]
    fn recycling_a_borrowed_slot_fails_fast() {
        let pool = RingPool::with_stale_detection(1, true, || 0u32).unwrap();
        let first = pool.allocate(|v| *v = 1).unwrap();
        let guard = first.read().unwrap();

        let err = pool.allocate(|v| *v = 2).unwrap_err();
        assert_eq!(
            err,
            StateError::StaleSlot {
                index: 0,
                leased: 0,
                current: 1
            }
        );
        assert_eq!(*guard, 1);
        drop(guard);

        let third = pool.allocate(|v| *v = 3).unwrap();
        assert_eq!(third.generation(), 2);
        assert_eq!(pool.allocations(), 3);
        assert!(first.read().unwrap_err().is_stale_slot());
        assert_eq!(*third.read().unwrap(), 3);
    }

    #[test]
    fn concurrent_allocations_get_distinct_tickets() {
        let pool = RingPool::new(1024, || 0usize).unwrap();
        let seen = parking_lot::Mutex::new(HashSet::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..256 {
                        let lease = pool.allocate(|_| {}).unwrap();
                        assert!(seen.lock().insert(lease.index()));
                    }
                });
            }
        });
        assert_eq!(seen.lock().len(), 1024);
        assert_eq!(pool.allocations(), 1024);
    }
}
