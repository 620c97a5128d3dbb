// src/builder.rs
//! Fluent builder for state values.
//!
//! A builder owns one mutable *working* instance that is reused across builds.
//! Each state module adds its own domain setters on `StateBuilder<ItsState>`;
//! this file only carries the parts every kind shares.
//!
//! Builders are not thread-safe: use one per thread (or lock externally).

use std::sync::Arc;

use crate::cache::StateCache;
use crate::error::Result;
use crate::gpu::ring_pool::{PoolLease, RingPool};
use crate::states::StateValue;

#[derive(Debug)]
pub struct StateBuilder<S: StateValue> {
    pub(crate) working: S,
}

impl<S: StateValue> StateBuilder<S> {
    /// Starts from the kind's well-known default.
    pub fn new() -> Self {
        Self {
            working: S::preset_default().clone(),
        }
    }

    /// Resets the working fields to the well-known default (copied, not shared).
    pub fn clear(&mut self) -> &mut Self {
        self.working.assign_fields(S::preset_default());
        self
    }

    /// Copies every field of `state` into the working instance; `None` acts like [`clear`](Self::clear).
    pub fn reset_to(&mut self, state: Option<&S>) -> &mut Self {
        match state {
            Some(state) => self.working.assign_fields(state),
            None => {
                self.clear();
            }
        }
        self
    }

    /// The current working configuration.
    pub fn working(&self) -> &S {
        &self.working
    }

    /// Snapshots the working configuration into a new, unshared instance.
    pub fn build(&self) -> S {
        self.working.clone()
    }

    /// Snapshots the working configuration into a recycled pool slot.
    ///
    /// The lease is only valid until the pool hands out `capacity` more slots.
    pub fn build_pooled<'p>(&self, pool: &'p RingPool<S>) -> Result<PoolLease<'p, S>> {
        pool.allocate(|slot| slot.assign_fields(&self.working))
    }

    /// Returns the shared canonical instance for the working configuration.
    ///
    /// Nothing is allocated when an equal state is already cached.
    pub fn build_cached(&self, cache: &StateCache<S>) -> Result<Arc<S>> {
        cache.cache_ref(&self.working)
    }
}

impl<S: StateValue> Default for StateBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HeadlessDevice;
    use crate::states::{CullMode, FillMode, RasterState};

    #[test]
    fn working_instance_is_never_locked() {
        let builder = StateBuilder::<RasterState>::new();
        assert!(!builder.working().is_locked());
        assert!(RasterState::preset_default().is_locked());
        assert_ne!(builder.working().id(), RasterState::preset_default().id());
    }

    #[test]
    fn clear_copies_defaults_by_value() {
        let mut builder = StateBuilder::<RasterState>::new();
        builder.cull_mode(CullMode::None, None).fill_mode(FillMode::Wireframe);
        assert_ne!(builder.working(), RasterState::preset_default());

        builder.clear();
        assert_eq!(builder.working(), RasterState::preset_default());
        assert!(!builder.working().is_locked());
    }

    #[test]
    fn reset_to_none_behaves_like_clear() {
        let mut builder = StateBuilder::<RasterState>::new();
        builder.reset_to(Some(&RasterState::wireframe()));
        assert_eq!(builder.working().fill_mode(), FillMode::Wireframe);

        builder.reset_to(None);
        assert_eq!(builder.working(), RasterState::preset_default());
    }

    #[test]
    fn snapshots_are_isolated_from_later_changes() {
        let mut builder = StateBuilder::<RasterState>::new();
        builder.cull_mode(CullMode::Front, Some(true));
        let first = builder.build();

        builder.cull_mode(CullMode::None, Some(false)).fill_mode(FillMode::Wireframe);
        assert_eq!(first.cull_mode(), CullMode::Front);
        assert!(first.is_front_counter_clockwise());
        assert_eq!(first.fill_mode(), FillMode::Solid);
    }

    #[test]
    fn pooled_builds_snapshot_into_slots() {
        let pool = RingPool::new(4, RasterState::default).unwrap();
        let mut builder = StateBuilder::<RasterState>::new();
        builder.cull_mode(CullMode::Front, None);
        let lease = builder.build_pooled(&pool).unwrap();

        builder.cull_mode(CullMode::None, None);
        assert_eq!(lease.read().unwrap().cull_mode(), CullMode::Front);
        assert_eq!(lease.index(), 0);
    }

    #[test]
    fn cached_builds_share_one_instance() {
        let cache = StateCache::<RasterState>::new(HeadlessDevice::shared());
        let mut builder = StateBuilder::<RasterState>::new();
        builder.fill_mode(FillMode::Wireframe);

        let a = builder.build_cached(&cache).unwrap();
        let b = builder.build_cached(&cache).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_locked());
        // The working copy stays private and mutable.
        assert!(!builder.working().is_locked());
    }
}
