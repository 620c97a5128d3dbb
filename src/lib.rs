// src/lib.rs
//! Pipeline state caching and pooled allocation.
//!
//! - **State values** ([`states`]): blend, depth/stencil, raster and sampler
//!   descriptors with structural equality and a lock flag.
//! - **Builders** ([`builder`]): one reusable working instance per builder,
//!   snapshotted into an owned value, a pool slot or a cached instance.
//! - **Caches** ([`cache`]): at most one shared, locked instance per distinct
//!   configuration, safe under concurrent use.
//! - **Ring pools** ([`gpu::ring_pool`]): fixed-capacity, zero-allocation
//!   recycling for per-frame objects, with optional stale-slot detection.
//! - **Composites** ([`pipeline`], [`draw_call`]): pipeline states keyed by
//!   member identity and pooled draw calls, tracked by [`state_tracker`].
//!
//! Everything hangs off a [`GraphicsStates`] context bound to a
//! [`StateDevice`].

pub mod builder;
pub mod cache;
pub mod config;
pub mod device;
pub mod dirty;
pub mod draw_call;
pub mod error;
pub mod gpu;
pub mod graphics;
pub mod pipeline;
pub mod state_tracker;
pub mod states;

pub use builder::StateBuilder;
pub use cache::{CacheStats, NativeFactory, StateCache};
pub use config::StateConfig;
pub use device::{BlendDescription, HeadlessDevice, NativeHandle, NativeObject, StateDevice};
pub use dirty::DirtyArray;
pub use draw_call::{DrawCall, DrawCallBuilder, MAX_SAMPLER_SLOTS};
pub use error::{Result, StateError};
pub use gpu::{PoolLease, RingPool, DEFAULT_POOL_CAPACITY};
pub use graphics::{GraphicsStates, GraphicsStatesBuilder, GraphicsStats};
pub use pipeline::{
    PipelineState, PipelineStateBuilder, PrimitiveTopology, Shader, ShaderStage, MAX_RENDER_TARGETS,
};
pub use state_tracker::{StateChanges, StateTracker};
pub use states::{
    BlendState, DepthStencilState, RasterState, SamplerState, StateId, StateKind, StateValue,
};
