// src/device.rs
//! Native device seam.
//!
//! State values never talk to a graphics API directly. The first time a value
//! becomes canonical (inserted into a [`StateCache`](crate::cache::StateCache))
//! the cache asks a [`StateDevice`] for the matching native object and keeps
//! it in the value's header as a [`NativeObject`]. The device is told to
//! release the handle once the last owner of that object is gone.
//!
//! [`HeadlessDevice`] is a counting implementation used by tests, tools and the
//! demo binary.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use log::debug;

use crate::error::{Result, StateError};
use crate::states::{BlendState, DepthStencilState, RasterState, SamplerState, StateKind};

/// Opaque id of a native state object owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Everything the device needs to compile the combined blend object of a
/// pipeline.
#[derive(Debug, Clone, Copy)]
pub struct BlendDescription<'a> {
    pub alpha_to_coverage: bool,
    pub independent_blend: bool,
    /// Render target blend states of the dirty span, starting at `first_slot`.
    pub render_targets: &'a [Option<Arc<BlendState>>],
    pub first_slot: usize,
}

/// Creates native state objects. Implementations must be thread-safe: caches
/// call into the device from whichever thread inserts first.
pub trait StateDevice: Send + Sync {
    fn create_blend_state(&self, desc: &BlendDescription<'_>, label: &str) -> Result<NativeHandle>;

    fn create_depth_stencil_state(&self, state: &DepthStencilState, label: &str) -> Result<NativeHandle>;

    fn create_raster_state(&self, state: &RasterState, label: &str) -> Result<NativeHandle>;

    fn create_sampler_state(&self, state: &SamplerState, label: &str) -> Result<NativeHandle>;

    /// Destroys a native object. Called exactly once per created handle.
    fn release(&self, kind: StateKind, handle: NativeHandle);
}

/// Owning wrapper around a created handle; dropping the last reference
/// releases it on the device.
pub struct NativeObject {
    device: Arc<dyn StateDevice>,
    kind: StateKind,
    handle: NativeHandle,
}

impl NativeObject {
    pub fn new(device: Arc<dyn StateDevice>, kind: StateKind, handle: NativeHandle) -> Self {
        Self { device, kind, handle }
    }

    #[inline]
    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    #[inline]
    pub fn kind(&self) -> StateKind {
        self.kind
    }
}

impl Drop for NativeObject {
    fn drop(&mut self) {
        self.device.release(self.kind, self.handle);
    }
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .finish()
    }
}

// ============================================================================
// Headless device
// ============================================================================

const KIND_COUNT: usize = 5;

fn kind_index(kind: StateKind) -> usize {
    match kind {
        StateKind::Blend => 0,
        StateKind::DepthStencil => 1,
        StateKind::Raster => 2,
        StateKind::Sampler => 3,
        StateKind::Pipeline => 4,
    }
}

/// Device without a GPU: hands out sequential handles and counts creations
/// and releases.
#[derive(Debug, Default)]
pub struct HeadlessDevice {
    next_handle: AtomicU64,
    created: [AtomicUsize; KIND_COUNT],
    released: [AtomicUsize; KIND_COUNT],
    failing: AtomicBool,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of native objects created for `kind` so far.
    pub fn created(&self, kind: StateKind) -> usize {
        self.created[kind_index(kind)].load(Ordering::Relaxed)
    }

    pub fn total_created(&self) -> usize {
        self.created.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Number of native objects of `kind` released so far.
    pub fn released(&self, kind: StateKind) -> usize {
        self.released[kind_index(kind)].load(Ordering::Relaxed)
    }

    /// Objects of `kind` created and not yet released.
    pub fn live(&self, kind: StateKind) -> usize {
        self.created(kind) - self.released(kind)
    }

    /// Makes every following creation fail with a device error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    fn issue(&self, kind: StateKind, label: &str) -> Result<NativeHandle> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(StateError::device(format!("cannot create {label}")));
        }
        let handle = NativeHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.created[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
        debug!("headless device: created {} object {} for {}", kind, handle.raw(), label);
        Ok(handle)
    }
}

impl StateDevice for HeadlessDevice {
    fn create_blend_state(&self, desc: &BlendDescription<'_>, label: &str) -> Result<NativeHandle> {
        debug!(
            "blend object with {} render target(s) from slot {}",
            desc.render_targets.len(),
            desc.first_slot
        );
        self.issue(StateKind::Blend, label)
    }

    fn create_depth_stencil_state(&self, _state: &DepthStencilState, label: &str) -> Result<NativeHandle> {
        self.issue(StateKind::DepthStencil, label)
    }

    fn create_raster_state(&self, _state: &RasterState, label: &str) -> Result<NativeHandle> {
        self.issue(StateKind::Raster, label)
    }

    fn create_sampler_state(&self, _state: &SamplerState, label: &str) -> Result<NativeHandle> {
        self.issue(StateKind::Sampler, label)
    }

    fn release(&self, kind: StateKind, handle: NativeHandle) {
        self.released[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
        debug!("headless device: released {} object {}", kind, handle.raw());
    }
}
