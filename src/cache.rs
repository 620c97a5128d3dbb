// src/cache.rs
//! Equality-keyed cache of canonical, shared state instances.
//!
//! - **Deduplication**: at most one live instance per distinct configuration.
//!   Two structurally equal candidates always resolve to the same `Arc`.
//! - **Linearizable**: lookups take the read lock, misses re-check under the
//!   write lock before inserting, so racing threads converge on one winner.
//! - **Native objects**: created through the [`StateDevice`] exactly once per
//!   canonical entry, at insertion time, and released when the last instance
//!   sharing them is dropped.
//! - **Grow-only**: nothing is evicted; [`StateCache::clear`] is the only way
//!   to drop entries.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;
use xxhash_rust::xxh3::Xxh3;

use crate::device::{NativeObject, StateDevice};
use crate::error::Result;
use crate::states::StateValue;

/// Snapshot of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub clears: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    clears: AtomicU64,
}

/// Structural key: xxh3 over the value's `Hash` (header excluded).
fn structural_key<S: Hash>(state: &S) -> u64 {
    let mut hasher = Xxh3::new();
    state.hash(&mut hasher);
    hasher.finish()
}

/// Produces the native object of a new canonical entry. Lets a cache share
/// objects between entries instead of creating one per entry.
pub type NativeFactory<S> = Box<dyn Fn(&S, &str) -> Result<Option<Arc<NativeObject>>> + Send + Sync>;

pub struct StateCache<S: StateValue> {
    device: Arc<dyn StateDevice>,
    entries: RwLock<HashMap<u64, Vec<Arc<S>>>>,
    counters: Counters,
    seed_presets: bool,
    native_factory: Option<NativeFactory<S>>,
}

impl<S: StateValue> StateCache<S> {
    /// An empty cache.
    pub fn new(device: Arc<dyn StateDevice>) -> Self {
        Self {
            device,
            entries: RwLock::new(HashMap::new()),
            counters: Counters::default(),
            seed_presets: false,
            native_factory: None,
        }
    }

    /// Routes native object creation through `factory`. Set it before the
    /// cache is shared.
    pub fn with_native_factory(mut self, factory: NativeFactory<S>) -> Self {
        self.native_factory = Some(factory);
        self
    }

    /// A cache pre-populated with the kind's well-known presets. The presets
    /// come back after every [`clear`](Self::clear).
    pub fn with_presets(device: Arc<dyn StateDevice>) -> Result<Self> {
        let mut cache = Self::new(device);
        cache.seed_presets = true;
        cache.seed()?;
        Ok(cache)
    }

    fn seed(&self) -> Result<()> {
        for preset in S::presets() {
            self.cache(preset)?;
        }
        Ok(())
    }

    #[inline]
    pub fn device(&self) -> &Arc<dyn StateDevice> {
        &self.device
    }

    /// Returns the canonical instance equal to `candidate`, registering the
    /// candidate itself (locked) when none exists yet.
    pub fn cache(&self, candidate: S) -> Result<Arc<S>> {
        self.resolve(Cow::Owned(candidate))
    }

    /// Like [`cache`](Self::cache) but only clones `candidate` on a miss.
    pub fn cache_ref(&self, candidate: &S) -> Result<Arc<S>> {
        self.resolve(Cow::Borrowed(candidate))
    }

    /// Canonicalizes an already shared instance. Canonical instances are
    /// returned as is; a uniquely owned miss is registered without copying.
    pub fn cache_shared(&self, state: Arc<S>) -> Result<Arc<S>> {
        if let Some(found) = self.lookup(&state) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }
        match Arc::try_unwrap(state) {
            Ok(owned) => self.resolve(Cow::Owned(owned)),
            Err(shared) => self.resolve(Cow::Borrowed(&*shared)),
        }
    }

    /// The canonical instance equal to `candidate`, if any. Does not touch the
    /// hit/miss counters.
    pub fn find(&self, candidate: &S) -> Option<Arc<S>> {
        self.lookup(candidate)
    }

    /// `true` when `state` is the very instance this cache hands out.
    pub fn is_canonical(&self, state: &Arc<S>) -> bool {
        self.lookup(state).is_some_and(|found| Arc::ptr_eq(&found, state))
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            entries: self.len(),
            clears: self.counters.clears.load(Ordering::Relaxed),
        }
    }

    /// Drops every canonical entry and reseeds the presets when the cache was
    /// built with them. Instances already handed out stay valid and locked.
    pub fn clear(&self) -> Result<()> {
        let dropped = {
            let mut entries = self.entries.write();
            let dropped: usize = entries.values().map(Vec::len).sum();
            entries.clear();
            dropped
        };
        self.counters.clears.fetch_add(1, Ordering::Relaxed);
        info!("{} state cache cleared ({} entries dropped)", S::KIND, dropped);
        if self.seed_presets {
            self.seed()?;
        }
        Ok(())
    }

    fn lookup(&self, candidate: &S) -> Option<Arc<S>> {
        self.lookup_key(structural_key(candidate), candidate)
    }

    fn resolve(&self, candidate: Cow<'_, S>) -> Result<Arc<S>> {
        let key = structural_key(&*candidate);

        if let Some(found) = self.lookup_key(key, &candidate) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }

        let mut entries = self.entries.write();
        // Another thread may have inserted between the two locks.
        let raced = entries
            .get(&key)
            .and_then(|bucket| bucket.iter().find(|s| ***s == *candidate))
            .cloned();
        if let Some(found) = raced {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }

        let mut value = candidate.into_owned();
        if value.header().native_object().is_none() {
            let label = value.debug_name();
            let native = self.create_native(&value, &label)?;
            value.header_mut().set_native(native);
        }
        value.lock();

        debug!("registered canonical {} (bucket {:016x})", value.debug_name(), key);
        let shared = Arc::new(value);
        entries.entry(key).or_default().push(Arc::clone(&shared));
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        Ok(shared)
    }

    fn create_native(&self, value: &S, label: &str) -> Result<Option<Arc<NativeObject>>> {
        if let Some(factory) = &self.native_factory {
            return factory(value, label);
        }
        let handle = value.create_native(self.device.as_ref(), label)?;
        Ok(handle.map(|handle| Arc::new(NativeObject::new(Arc::clone(&self.device), S::NATIVE_KIND, handle))))
    }

    fn lookup_key(&self, key: u64, candidate: &S) -> Option<Arc<S>> {
        let entries = self.entries.read();
        entries
            .get(&key)
            .and_then(|bucket| bucket.iter().find(|s| ***s == *candidate))
            .cloned()
    }
}

impl<S: StateValue> fmt::Debug for StateCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCache")
            .field("kind", &S::KIND)
            .field("stats", &self.stats())
            .finish()
    }
}
