// src/states/mod.rs
//! Immutable, value-comparable pipeline state descriptors.
//!
//! Every state kind embeds a [`StateHeader`] carrying a diagnostic id, the lock
//! flag and the native handle the device produced for it. The header never
//! takes part in equality or hashing, and copies never inherit it: a clone is a
//! fresh, unlocked instance with a new id.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::{NativeHandle, NativeObject, StateDevice};
use crate::error::{Result, StateError};

pub mod blend;
pub mod depth_stencil;
pub mod raster;
pub mod sampler;
pub mod types;

pub use blend::BlendState;
pub use depth_stencil::{DepthStencilState, StencilFace};
pub use raster::RasterState;
pub use sampler::{SamplerState, MAX_ANISOTROPY};
pub use types::*;

// ============================================================================
// Identity
// ============================================================================

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic, process-wide id used for debug labels only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(u64);

impl StateId {
    fn next() -> Self {
        StateId(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of state object, used in labels and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    Blend,
    DepthStencil,
    Raster,
    Sampler,
    Pipeline,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Blend => "blend",
            StateKind::DepthStencil => "depth/stencil",
            StateKind::Raster => "raster",
            StateKind::Sampler => "sampler",
            StateKind::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Header
// ============================================================================

/// Identity, lock flag and native handle shared by every state kind.
#[doc(hidden)]
#[derive(Debug)]
pub struct StateHeader {
    id: StateId,
    locked: bool,
    native: Option<Arc<NativeObject>>,
}

impl StateHeader {
    pub(crate) fn new() -> Self {
        Self {
            id: StateId::next(),
            locked: false,
            native: None,
        }
    }

    #[inline]
    pub(crate) fn check_unlocked(&self, kind: StateKind) -> Result<()> {
        if self.locked {
            return Err(StateError::Immutable { kind, id: self.id });
        }
        Ok(())
    }

    pub(crate) fn set_native(&mut self, native: Option<Arc<NativeObject>>) {
        self.native = native;
    }

    pub(crate) fn native_object(&self) -> Option<&Arc<NativeObject>> {
        self.native.as_ref()
    }
}

impl Default for StateHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateHeader {
    // A copy is a new object: new id, unlocked, no native object yet.
    fn clone(&self) -> Self {
        Self::new()
    }
}

// ============================================================================
// StateValue
// ============================================================================

/// Common contract of every cacheable state kind.
///
/// Equality and hashing are structural (all configurable fields) and ignore the
/// header. Implementations short-circuit on reference equality.
pub trait StateValue: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    const KIND: StateKind;

    /// Kind of the native object the device creates for this state.
    const NATIVE_KIND: StateKind = Self::KIND;

    #[doc(hidden)]
    fn header(&self) -> &StateHeader;

    #[doc(hidden)]
    fn header_mut(&mut self) -> &mut StateHeader;

    /// Overwrites every configurable field with the ones from `other`,
    /// regardless of the lock. Only used on privately owned working objects
    /// and pool slots.
    #[doc(hidden)]
    fn assign_fields(&mut self, other: &Self);

    /// The well-known default instance (locked).
    fn preset_default() -> &'static Self;

    /// Well-known instances a cache is seeded with.
    fn presets() -> Vec<Self> {
        vec![locked(Self::preset_default().clone())]
    }

    /// Asks the device for the native object backing this state, if the kind
    /// has one of its own.
    fn create_native(&self, device: &dyn StateDevice, label: &str) -> Result<Option<NativeHandle>>;

    fn id(&self) -> StateId {
        self.header().id
    }

    fn is_locked(&self) -> bool {
        self.header().locked
    }

    /// Makes the instance immutable. There is no way back.
    fn lock(&mut self) {
        self.header_mut().locked = true;
    }

    fn native(&self) -> Option<NativeHandle> {
        self.header().native.as_ref().map(|native| native.handle())
    }

    fn debug_name(&self) -> String {
        format!("{} state #{}", Self::KIND, self.id())
    }

    /// Copies all fields from `other`; fails without any change when locked.
    fn copy_from(&mut self, other: &Self) -> Result<()> {
        self.header().check_unlocked(Self::KIND)?;
        self.assign_fields(other);
        Ok(())
    }
}

/// Builds a locked preset from a plain field initializer.
pub(crate) fn locked<S: StateValue>(mut state: S) -> S {
    state.lock();
    state
}
